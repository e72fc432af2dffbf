//! Per-bank state machine: tracks whether a bank is idle, has an open row,
//! or is mid-transition, and decides the next command a queued payload
//! should issue as, given the configured [`PagePolicy`].

use crate::command::{Command, Operation};
use crate::config::PagePolicy;
use crate::payload::Payload;

/// The state of one bank, independent of what is queued for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    /// No row open, no command pending.
    Idle,
    /// `ACT` issued, row not yet readable (`tRCD` in flight).
    Activating,
    /// Row open and readable/writable.
    Activated,
    /// `PRE`/`PREA` issued, bank not yet idle (`tRP` in flight).
    Precharging,
    /// Refresh in flight on this bank.
    Refreshing,
    /// Power-down entered on this bank's rank.
    PoweredDown,
    /// Self-refresh entered on this bank's rank.
    SelfRefreshed,
    /// Refresh management (`RFM`) in flight.
    RefreshManaging,
    /// Blocked by the `RefreshManager` (forced refresh or `RAA` threshold);
    /// reverts to the pre-block state once the refresh completes.
    Blocked,
}

impl BankState {
    /// `true` if the bank currently has an open row.
    #[must_use]
    pub const fn has_open_row(self) -> bool {
        matches!(self, BankState::Activated)
    }

    /// `true` if the bank is free to accept a new `ACT`.
    #[must_use]
    pub const fn can_activate(self) -> bool {
        matches!(self, BankState::Idle)
    }
}

/// One bank's queue of pending payloads plus its row state. The
/// [`crate::scheduler::Scheduler`] owns per-bank queues; this type is
/// purely the state-machine half described in spec §4.1 — it decides *what
/// command* a bank should issue next, never *which payload* to pick (that
/// is the scheduler's job).
#[derive(Debug, Clone)]
pub struct BankMachine {
    bank_id: u32,
    state: BankState,
    open_row: Option<u32>,
    page_policy: PagePolicy,
    /// Set when `on_issued` sees an auto-precharge command; the next
    /// `tick` should transition to `Precharging` without a separate `PRE`.
    auto_precharging: bool,
    /// State to restore on `unblock`/`PDXA`/`PDXP`, set by [`Self::block`]
    /// or a power-down-entry command.
    saved_state: Option<BankState>,
    /// Rolling activation accumulator (RAA) consulted by `RefreshManager`'s
    /// refresh-management (RFM) policy; incremented on `ACT`, cleared on
    /// `RFMAB`/`RFMPB`.
    raa: u32,
}

impl BankMachine {
    /// Creates an idle bank machine.
    #[must_use]
    pub const fn new(bank_id: u32, page_policy: PagePolicy) -> Self {
        Self {
            bank_id,
            state: BankState::Idle,
            open_row: None,
            page_policy,
            auto_precharging: false,
            saved_state: None,
            raa: 0,
        }
    }

    /// This bank's index within the channel.
    #[must_use]
    pub const fn bank_id(&self) -> u32 {
        self.bank_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BankState {
        self.state
    }

    /// The currently open row, if any.
    #[must_use]
    pub const fn open_row(&self) -> Option<u32> {
        self.open_row
    }

    /// `true` if this bank is idle (no row open, nothing in flight).
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, BankState::Idle)
    }

    /// `true` if this bank has an open, readable/writable row.
    #[must_use]
    pub const fn is_activated(&self) -> bool {
        matches!(self.state, BankState::Activated)
    }

    /// `true` if this bank currently has `row` open.
    #[must_use]
    pub fn has_row_open(&self, row: u32) -> bool {
        self.state.has_open_row() && self.open_row == Some(row)
    }

    /// Rolling activation accumulator, consulted by the `RefreshManager`'s
    /// `RAAIMT`/`RAAMMT` thresholds.
    #[must_use]
    pub const fn raa(&self) -> u32 {
        self.raa
    }

    /// `true` if the `RefreshManager` has forced this bank closed for a
    /// refresh or refresh-management command.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self.state, BankState::Blocked)
    }

    /// Forces this bank into [`BankState::Blocked`], remembering the state
    /// to restore in [`Self::unblock`]. A bank already blocked is
    /// unaffected (the `RefreshManager` may call `block` on every bank on
    /// the rank every cycle the forcing condition holds).
    pub fn block(&mut self) {
        if !matches!(self.state, BankState::Blocked) {
            self.saved_state = Some(self.state);
            self.state = BankState::Blocked;
        }
    }

    /// Releases a [`Self::block`], restoring the state it was blocked from.
    pub fn unblock(&mut self) {
        if let BankState::Blocked = self.state {
            self.state = self.saved_state.take().unwrap_or(BankState::Idle);
        }
    }

    /// Decides the command a candidate payload should issue as, given this
    /// bank's current row state and page policy. Returns `None` if the
    /// bank cannot accept any command for this payload right now (e.g. a
    /// conflicting row is open and must be closed first — the caller is
    /// expected to have already precharged in that case, since this method
    /// only resolves `ACT` vs `CAS`, not cross-row conflicts).
    #[must_use]
    pub fn next_command_for(&self, payload: &Payload, further_row_hit_queued: bool) -> Option<Command> {
        let Some(coords) = payload.controller_meta().map(|meta| meta.coordinates) else {
            return None;
        };
        match self.state {
            BankState::Idle => Some(Command::Act),
            BankState::Activated if self.open_row == Some(coords.row) => {
                Some(self.cas_command(payload.operation(), further_row_hit_queued))
            }
            _ => None,
        }
    }

    fn cas_command(&self, operation: Operation, further_row_hit_queued: bool) -> Command {
        let keep_open = match self.page_policy {
            PagePolicy::Open => true,
            PagePolicy::Closed => false,
            PagePolicy::OpenAdaptive | PagePolicy::ClosedAdaptive => further_row_hit_queued,
        };
        if keep_open {
            operation.plain_command()
        } else {
            operation.auto_precharge_command()
        }
    }

    /// Updates bank state in response to a command the controller actually
    /// issued against this bank. Mirrors `BankMachine::update` in the
    /// original: RAS/refresh/power-down commands drive the state machine
    /// directly, CAS commands only matter for their `is_auto_precharge`
    /// flag.
    pub fn on_issued(&mut self, command: Command, row: Option<u32>) {
        match command {
            Command::Act => {
                self.state = BankState::Activating;
                self.open_row = row;
                self.raa += 1;
            }
            Command::Prepb | Command::Preab => {
                self.state = BankState::Precharging;
                self.open_row = None;
            }
            Command::Refab | Command::Refpb | Command::Refp2b | Command::Refsb => {
                self.state = BankState::Refreshing;
                self.open_row = None;
            }
            Command::Rfmab | Command::Rfmpb => {
                self.state = BankState::RefreshManaging;
                self.raa = 0;
            }
            Command::Pdea | Command::Pdep => {
                self.saved_state = Some(self.state);
                self.state = BankState::PoweredDown;
            }
            Command::Pdxa | Command::Pdxp => {
                self.state = self.saved_state.take().unwrap_or(BankState::Idle);
            }
            Command::Srefen => {
                self.state = BankState::SelfRefreshed;
                self.open_row = None;
            }
            Command::Srefex => {
                self.state = BankState::Idle;
            }
            Command::Rd | Command::Wr | Command::Mwr => {
                self.auto_precharging = false;
            }
            Command::Rda | Command::Wra | Command::Mwra => {
                self.auto_precharging = true;
            }
            Command::Nop => {}
        }
    }

    /// Advances state once an in-flight transition's timing has elapsed
    /// (`ACT` → `Activated`, `PRE`/auto-precharge → `Idle`, refresh →
    /// `Idle`). The `Checker` is the source of truth for *when* this may
    /// happen; this method just performs the transition.
    pub fn on_transition_complete(&mut self) {
        self.state = match self.state {
            BankState::Activating => {
                if self.auto_precharging {
                    BankState::Precharging
                } else {
                    BankState::Activated
                }
            }
            BankState::Precharging | BankState::Refreshing | BankState::RefreshManaging => {
                self.auto_precharging = false;
                BankState::Idle
            }
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Coordinates;
    use crate::payload::ControllerMeta;

    fn payload_at(row: u32, operation: Operation) -> Payload {
        let payload = Payload::new(1, operation, 0, 64, 0);
        payload.set_controller_meta(ControllerMeta {
            coordinates: Coordinates { row, ..Coordinates::default() },
            resolved_command: None,
        });
        payload
    }

    #[test]
    fn idle_bank_requests_activate() {
        let bank = BankMachine::new(0, PagePolicy::Open);
        let payload = payload_at(5, Operation::Read);
        assert_eq!(bank.next_command_for(&payload, false), Some(Command::Act));
    }

    #[test]
    fn open_policy_keeps_row_open_after_cas() {
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        assert_eq!(bank.state(), BankState::Activated);
        let payload = payload_at(5, Operation::Read);
        assert_eq!(bank.next_command_for(&payload, false), Some(Command::Rd));
    }

    #[test]
    fn closed_policy_always_auto_precharges() {
        let mut bank = BankMachine::new(0, PagePolicy::Closed);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        let payload = payload_at(5, Operation::Write);
        assert_eq!(bank.next_command_for(&payload, true), Some(Command::Wra));
    }

    #[test]
    fn open_adaptive_precharges_when_no_further_hit_is_queued() {
        let mut bank = BankMachine::new(0, PagePolicy::OpenAdaptive);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        let payload = payload_at(5, Operation::Read);
        assert_eq!(bank.next_command_for(&payload, false), Some(Command::Rda));
        assert_eq!(bank.next_command_for(&payload, true), Some(Command::Rd));
    }

    #[test]
    fn mismatched_row_yields_no_command() {
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        let payload = payload_at(6, Operation::Read);
        assert_eq!(bank.next_command_for(&payload, false), None);
    }

    #[test]
    fn auto_precharge_transitions_straight_to_idle() {
        let mut bank = BankMachine::new(0, PagePolicy::Closed);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        bank.on_issued(Command::Rda, Some(5));
        bank.on_transition_complete();
        assert!(bank.is_idle());
    }

    #[test]
    fn block_and_unblock_restores_prior_state() {
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        assert_eq!(bank.state(), BankState::Activated);
        bank.block();
        assert!(bank.is_blocked());
        let payload = payload_at(5, Operation::Read);
        assert_eq!(bank.next_command_for(&payload, false), None);
        bank.unblock();
        assert_eq!(bank.state(), BankState::Activated);
    }

    #[test]
    fn power_down_exit_restores_the_entry_state_not_always_activated() {
        let mut idle_bank = BankMachine::new(0, PagePolicy::Open);
        idle_bank.on_issued(Command::Pdep, None);
        assert_eq!(idle_bank.state(), BankState::PoweredDown);
        idle_bank.on_issued(Command::Pdxp, None);
        assert!(idle_bank.is_idle());

        let mut active_bank = BankMachine::new(0, PagePolicy::Open);
        active_bank.on_issued(Command::Act, Some(5));
        active_bank.on_transition_complete();
        active_bank.on_issued(Command::Pdea, None);
        assert_eq!(active_bank.state(), BankState::PoweredDown);
        active_bank.on_issued(Command::Pdxa, None);
        assert_eq!(active_bank.state(), BankState::Activated);
    }

    #[test]
    fn act_increments_raa_and_rfm_clears_it() {
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(1));
        bank.on_issued(Command::Act, Some(2));
        assert_eq!(bank.raa(), 2);
        bank.on_issued(Command::Rfmab, None);
        assert_eq!(bank.raa(), 0);
    }
}
