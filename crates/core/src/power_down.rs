//! Per-rank power-down / self-refresh entry and exit policy.
//!
//! Grounded on spec §4.4 (no original-source power-down file was retrieved
//! in the pack, unlike refresh/scheduler/cmdmux) and on the shape of
//! `RefreshManagerAllBank`'s `sleeping` flag and `triggerInterruption`
//! call, which is the refresh manager's half of this interaction.

use crate::bank_machine::BankMachine;
use crate::command::Command;
use crate::config::PowerDownPolicy;
use crate::memspec::MemSpec;

/// Whether the rank is awake, power-down-entered (remembering whether any
/// bank was active when it entered, to pick the matching exit command), or
/// in self-refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Awake,
    PoweredDown { was_active: bool },
    SelfRefreshed,
}

/// Per-rank power-down/self-refresh state machine.
#[derive(Debug)]
pub struct PowerDownManager {
    policy: PowerDownPolicy,
    state: State,
    /// Cycle the rank most recently became fully idle (cleared whenever any
    /// bank on the rank is busy).
    idle_since: Option<u64>,
    /// Cycle the rank entered power-down (used to decide when to deepen
    /// into self-refresh).
    power_down_since: Option<u64>,
    idle_threshold: u64,
    self_refresh_threshold: u64,
}

impl PowerDownManager {
    /// `idle_threshold`/`self_refresh_threshold` are expressed in cycles;
    /// both default to `t_cke`-scaled multiples when `0` is passed, so a
    /// caller can seed this straight from `MemSpec` minimum dwell times.
    #[must_use]
    pub fn new(policy: PowerDownPolicy, mem_spec: &MemSpec, idle_threshold: u64, self_refresh_threshold: u64) -> Self {
        Self {
            policy,
            state: State::Awake,
            idle_since: None,
            power_down_since: None,
            idle_threshold: if idle_threshold == 0 { u64::from(mem_spec.t_cke) * 4 } else { idle_threshold },
            self_refresh_threshold: if self_refresh_threshold == 0 {
                u64::from(mem_spec.t_cksre) * 8
            } else {
                self_refresh_threshold
            },
        }
    }

    /// `true` once the rank has entered power-down or self-refresh (the
    /// `RefreshManager` consults this to know it must interrupt first).
    #[must_use]
    pub const fn is_sleeping(&self) -> bool {
        !matches!(self.state, State::Awake)
    }

    /// Evaluates whether this rank should enter power-down or deepen into
    /// self-refresh this cycle. `refresh_imminent` suppresses entry (the
    /// `Controller` passes whether the rank's `RefreshManager` trigger is
    /// due soon).
    pub fn evaluate(&mut self, now: u64, banks: &[BankMachine], refresh_imminent: bool) -> Option<Command> {
        if matches!(self.policy, PowerDownPolicy::NoPowerDown) {
            return None;
        }

        let all_idle = banks.iter().all(BankMachine::is_idle);
        if !all_idle {
            self.idle_since = None;
            return None;
        }
        if self.idle_since.is_none() {
            self.idle_since = Some(now);
        }

        match self.state {
            State::Awake => {
                if refresh_imminent {
                    return None;
                }
                let idle_for = now - self.idle_since.unwrap_or(now);
                if idle_for < self.idle_threshold {
                    return None;
                }
                let was_active = banks.iter().any(BankMachine::is_activated);
                self.state = State::PoweredDown { was_active };
                self.power_down_since = Some(now);
                Some(if was_active { Command::Pdea } else { Command::Pdep })
            }
            State::PoweredDown { .. } => {
                let asleep_for = now - self.power_down_since.unwrap_or(now);
                if asleep_for >= self.self_refresh_threshold {
                    self.state = State::SelfRefreshed;
                    Some(Command::Srefen)
                } else {
                    None
                }
            }
            State::SelfRefreshed => None,
        }
    }

    /// What [`Self::trigger_interruption`] would return without committing
    /// the exit transition, so the `Controller` can offer it to `CmdMux` as
    /// a candidate before the exit is actually issued.
    #[must_use]
    pub const fn pending_interruption_command(&self) -> Option<Command> {
        match self.state {
            State::Awake => None,
            State::PoweredDown { was_active: true } => Some(Command::Pdxa),
            State::PoweredDown { was_active: false } => Some(Command::Pdxp),
            State::SelfRefreshed => Some(Command::Srefex),
        }
    }

    /// Called by the `RefreshManager` before issuing a refresh, and by the
    /// `Scheduler` on admission of new traffic: forces an exit if the rank
    /// is currently asleep. Returns the exit command to issue, if any.
    pub fn trigger_interruption(&mut self) -> Option<Command> {
        match self.state {
            State::Awake => None,
            State::PoweredDown { was_active } => {
                self.state = State::Awake;
                self.idle_since = None;
                self.power_down_since = None;
                Some(if was_active { Command::Pdxa } else { Command::Pdxp })
            }
            State::SelfRefreshed => {
                self.state = State::Awake;
                self.idle_since = None;
                Some(Command::Srefex)
            }
        }
    }

    /// Updates bookkeeping after an observed command (mainly to clear idle
    /// tracking when traffic resumes without going through
    /// `trigger_interruption`, e.g. after a plain `ACT`).
    pub fn update(&mut self, command: Command) {
        if matches!(command, Command::Act) {
            self.idle_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PagePolicy;

    fn idle_rank(count: u32) -> Vec<BankMachine> {
        (0..count).map(|id| BankMachine::new(id, PagePolicy::Open)).collect()
    }

    #[test]
    fn no_power_down_policy_never_proposes_a_command() {
        let mem_spec = MemSpec::ddr4_default();
        let mut manager = PowerDownManager::new(PowerDownPolicy::NoPowerDown, &mem_spec, 10, 100);
        let banks = idle_rank(4);
        assert_eq!(manager.evaluate(1000, &banks, false), None);
    }

    #[test]
    fn staggered_policy_enters_precharge_power_down_after_idle_threshold() {
        let mem_spec = MemSpec::ddr4_default();
        let mut manager = PowerDownManager::new(PowerDownPolicy::Staggered, &mem_spec, 10, 100);
        let banks = idle_rank(4);
        assert_eq!(manager.evaluate(0, &banks, false), None);
        assert_eq!(manager.evaluate(10, &banks, false), Some(Command::Pdep));
    }

    #[test]
    fn refresh_imminent_suppresses_entry() {
        let mem_spec = MemSpec::ddr4_default();
        let mut manager = PowerDownManager::new(PowerDownPolicy::Staggered, &mem_spec, 10, 100);
        let banks = idle_rank(4);
        manager.evaluate(0, &banks, false);
        assert_eq!(manager.evaluate(10, &banks, true), None);
    }

    #[test]
    fn interruption_exits_to_the_matching_command() {
        let mem_spec = MemSpec::ddr4_default();
        let mut manager = PowerDownManager::new(PowerDownPolicy::Staggered, &mem_spec, 10, 100);
        let mut banks = idle_rank(4);
        banks[0].on_issued(Command::Act, Some(0));
        banks[0].on_transition_complete();
        manager.evaluate(0, &banks, false);
        assert_eq!(manager.evaluate(10, &banks, false), Some(Command::Pdea));
        assert_eq!(manager.trigger_interruption(), Some(Command::Pdxa));
        assert!(!manager.is_sleeping());
    }
}
