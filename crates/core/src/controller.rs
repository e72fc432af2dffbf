//! Per-channel controller: wires the address decoder, bank machines,
//! scheduler, refresh and power-down managers, checker, command mux and
//! response queue into the event-driven loop described by spec §4.8.
//!
//! Grounded on `original_source/.../controller/Controller.cpp`'s
//! `controllerMethod`: gather one candidate per eligible collaborator, hand
//! them to the configured `CmdMux`, and apply the winner to every
//! collaborator that needs to know. The source's SC_METHOD sensitivity list
//! (re-triggered by any collaborator's notification) is generalized here
//! into [`Kernel::schedule_at`] wake-ups keyed on the next cycle *any*
//! collaborator could have something to propose.

use std::collections::BinaryHeap;
use std::cmp::Reverse;

use crate::address::{AddressDecoder, Coordinates};
use crate::bank_machine::BankMachine;
use crate::checker::Checker;
use crate::cmdmux::{Candidate, CandidateSource, CmdMux};
use crate::command::{Command, Operation};
use crate::config::Config;
use crate::error::DramResult;
use crate::initiator::Request;
use crate::kernel::{Cycles, Event, Kernel};
use crate::memspec::MemSpec;
use crate::payload::{Payload, PayloadId};
use crate::power_down::PowerDownManager;
use crate::refresh::{RefreshCandidate, RefreshManager};
use crate::response_queue::ResponseQueue;
use crate::scheduler::Scheduler;

/// Cycles a command leaves a bank in a transient state (`Activating`,
/// `Precharging`, `Refreshing`, `RefreshManaging`) before
/// [`BankMachine::on_transition_complete`] is due. `None` for commands that
/// settle their bank state immediately in `on_issued` (CAS commands,
/// power-down/self-refresh entry and exit, `NOP`).
///
/// `ACT`'s dwell time is approximated as `t_rcd_rd`: the `Checker` is the
/// authority on exactly when a CAS command may legally follow (`t_rcd_rd`
/// vs `t_rcd_wr`), so this only has to be "not later than the earliest
/// legal CAS" to avoid the bank machine itself vetoing a command the
/// `Checker` would otherwise allow. Refresh-management (`RFM`) commands
/// have no dedicated duration field in `MemSpec`; `t_rfcpb` is reused as the
/// closest standard-defined management-window approximation.
fn transition_delay(command: Command, spec: &MemSpec) -> Option<u32> {
    match command {
        Command::Act => Some(spec.t_rcd_rd),
        Command::Prepb | Command::Preab => Some(spec.t_rp),
        Command::Refab => Some(spec.t_rfc),
        Command::Refpb | Command::Refp2b => {
            Some(if spec.t_rfcpb > 0 { spec.t_rfcpb } else { spec.t_rfc })
        }
        Command::Refsb => Some(if spec.t_rfcsb > 0 { spec.t_rfcsb } else { spec.t_rfc }),
        Command::Rfmab | Command::Rfmpb => Some(spec.t_rfcpb.max(1)),
        _ => None,
    }
}

/// Flattens a per-rank local bank index into the channel-wide bank index
/// the `Checker`'s per-bank tables are indexed by.
fn global_bank(banks_per_channel: u32, rank: u32, local_bank: usize) -> usize {
    rank as usize * banks_per_channel as usize + local_bank
}

fn rank_range(banks_per_channel: u32, rank: u32) -> std::ops::Range<usize> {
    let base = rank as usize * banks_per_channel as usize;
    base..base + banks_per_channel as usize
}

fn bank_coords(channel: u32, banks_per_group: u32, rank: u32, local_bank: usize) -> Coordinates {
    let banks_per_group = banks_per_group.max(1);
    let bank_group = local_bank as u32 / banks_per_group;
    let bank = local_bank as u32 % banks_per_group;
    Coordinates { channel, rank, bank_group, bank, row: 0, column: 0, byte: 0 }
}

/// Priority class handed to [`crate::config::CmdMuxPolicy::Strict`]: lower
/// issues first. Mirrors `CmdMuxStrict`'s fixed ordering (refresh,
/// power-down, then ordinary traffic).
fn priority_for(source: CandidateSource, command: Command) -> u8 {
    match source {
        CandidateSource::Refresh(_) => 0,
        CandidateSource::PowerDown(_) => 1,
        CandidateSource::Bank(_) => {
            if command.is_cas() {
                2
            } else {
                3
            }
        }
    }
}

struct PendingTransition {
    due: Cycles,
    bank: usize,
}

struct PendingCompletion {
    due: Cycles,
    payload: Payload,
}

/// One DRAM channel's complete command-generation pipeline.
pub struct Controller {
    channel_index: u32,
    mem_spec: MemSpec,
    decoder: AddressDecoder,
    banks_per_channel: u32,
    ranks_per_channel: u32,
    banks: Vec<BankMachine>,
    scheduler: Scheduler,
    refresh: Vec<RefreshManager>,
    power_down: Vec<PowerDownManager>,
    checker: Checker,
    cmd_mux: CmdMux,
    response_queue: ResponseQueue,
    next_payload_id: PayloadId,
    admitted: u64,
    completed: u64,
    pending_transitions: Vec<PendingTransition>,
    pending_completions: Vec<PendingCompletion>,
}

impl Controller {
    /// Builds a controller for one channel from a validated configuration.
    pub fn new(config: &Config, channel_index: u32) -> DramResult<Self> {
        config.validate()?;
        let mem_spec = config.mem_spec;
        let decoder = AddressDecoder::new(&config.address_mapping, &mem_spec)?;

        let banks_per_channel = mem_spec.banks_per_channel;
        let ranks_per_channel = mem_spec.ranks_per_channel;
        let total_banks = (banks_per_channel * ranks_per_channel) as usize;

        let banks = (0..total_banks as u32)
            .map(|id| BankMachine::new(id, config.controller.page_policy))
            .collect();

        let scheduler = Scheduler::new(&config.controller, total_banks as u32);

        let refresh = (0..ranks_per_channel)
            .map(|rank| {
                RefreshManager::new(
                    config.controller.refresh_policy,
                    &mem_spec,
                    rank,
                    config.controller.max_postponed_refreshes,
                    config.controller.max_pulledin_refreshes,
                )
            })
            .collect();

        let power_down = (0..ranks_per_channel)
            .map(|_| PowerDownManager::new(config.controller.power_down_policy, &mem_spec, 0, 0))
            .collect();

        Ok(Self {
            channel_index,
            mem_spec,
            decoder,
            banks_per_channel,
            ranks_per_channel,
            banks,
            scheduler,
            refresh,
            power_down,
            checker: Checker::new(&mem_spec),
            cmd_mux: CmdMux::new(config.controller.cmd_mux_policy),
            response_queue: ResponseQueue::new(config.controller.response_queue_policy),
            next_payload_id: 0,
            admitted: 0,
            completed: 0,
            pending_transitions: Vec::new(),
            pending_completions: Vec::new(),
        })
    }

    /// This controller's channel index, for routing [`Event::channel`]
    /// wake-ups back to the right controller in a multi-channel host.
    #[must_use]
    pub const fn channel_index(&self) -> u32 {
        self.channel_index
    }

    /// Attempts to admit `request` at `now`. Returns `false` if the
    /// destination bank's buffer is full — backpressure, not an error (spec
    /// §7): the caller holds the initiator off and retries later.
    pub fn offer(&mut self, request: &Request, now: Cycles) -> DramResult<bool> {
        let (operation, address, length) = match request {
            Request::Read { address, length } => (Operation::Read, *address, *length),
            Request::Write { address, length, .. } => (Operation::Write, *address, *length),
            Request::Stop => return Ok(false),
        };

        let coords = self.decoder.decode(address)?;
        let local_bank = (coords.bank_group * self.mem_spec.banks_per_group() + coords.bank) as usize;
        let global = global_bank(self.banks_per_channel, coords.rank, local_bank);

        if !self.scheduler.can_admit(global, operation) {
            return Ok(false);
        }

        let payload = Payload::new(self.next_payload_id, operation, address, length, now);
        self.next_payload_id += 1;
        payload.set_controller_meta(crate::payload::ControllerMeta { coordinates: coords, resolved_command: None });
        self.scheduler.admit(global, payload);
        self.admitted += 1;
        tracing::trace!(channel = self.channel_index, rank = coords.rank, address, "admitted request");

        // New traffic wakes a sleeping rank (spec §4.4): `advance` already
        // checks `rank_has_pending` on every sleeping rank and, when it's
        // true, offers the rank's `pending_interruption_command` as a
        // regular candidate, so the exit is arbitrated through `CmdMux` and
        // timed by `Checker` like any other command rather than being
        // forced through here.

        Ok(true)
    }

    /// Pops completed payloads ready to hand back to the initiator at
    /// `now`.
    pub fn drain_responses(&mut self, now: Cycles) -> Vec<Payload> {
        let mut drained = Vec::new();
        while let Some(payload) = self.response_queue.pop(|p| p.arbiter_meta().completion_cycle.is_some_and(|c| c <= now)) {
            drained.push(payload);
        }
        drained
    }

    /// Total payloads admitted / completed so far, for progress reporting.
    #[must_use]
    pub const fn counters(&self) -> (u64, u64) {
        (self.admitted, self.completed)
    }

    fn rank_has_pending(&self, rank: u32) -> bool {
        let depths = self.scheduler.buffer_depth();
        rank_range(self.banks_per_channel, rank).any(|g| depths[g] > 0)
    }

    /// Runs one cycle's worth of work: drains due bank transitions and
    /// completions, gathers this cycle's candidates, lets `CmdMux` pick a
    /// winner, applies it, and schedules this channel's next wake-up on
    /// `kernel`.
    pub fn advance(&mut self, now: Cycles, kernel: &mut impl Kernel) {
        self.drain_transitions(now);
        self.completed += self.drain_due_completions(now) as u64;

        let channel = self.channel_index;
        let banks_per_channel = self.banks_per_channel;
        let banks_per_group = self.mem_spec.banks_per_group();
        let t_rcd_rd = u64::from(self.mem_spec.t_rcd_rd);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut refresh_candidates: Vec<Option<RefreshCandidate>> = vec![None; self.ranks_per_channel as usize];

        for rank in 0..self.ranks_per_channel {
            let range = rank_range(banks_per_channel, rank);
            let refresh_imminent = now + t_rcd_rd >= self.refresh[rank as usize].time_for_next_trigger();

            let rank_banks_mut = &mut self.banks[range.clone()];
            if let Some(candidate) = self.refresh[rank as usize].evaluate(now, rank_banks_mut) {
                let earliest = candidate
                    .banks
                    .iter()
                    .map(|&b| {
                        let coords = bank_coords(channel, banks_per_group, rank, b);
                        self.checker.earliest_time(candidate.command, coords, now)
                    })
                    .max()
                    .unwrap_or(now);
                candidates.push(Candidate {
                    command: candidate.command,
                    earliest_time: earliest,
                    payload: None,
                    priority: priority_for(CandidateSource::Refresh(rank), candidate.command),
                    source: CandidateSource::Refresh(rank),
                });
                refresh_candidates[rank as usize] = Some(candidate);
            }

            if self.power_down[rank as usize].is_sleeping() {
                if self.rank_has_pending(rank) || refresh_imminent {
                    if let Some(command) = self.power_down[rank as usize].pending_interruption_command() {
                        let coords = bank_coords(channel, banks_per_group, rank, 0);
                        let earliest = self.checker.earliest_time(command, coords, now);
                        candidates.push(Candidate {
                            command,
                            earliest_time: earliest,
                            payload: None,
                            priority: priority_for(CandidateSource::PowerDown(rank), command),
                            source: CandidateSource::PowerDown(rank),
                        });
                    }
                }
                // Sleeping and nothing wants to wake this rank: no bank
                // candidates are possible either, skip straight to the next
                // rank.
                if !self.rank_has_pending(rank) && !refresh_imminent {
                    continue;
                }
            } else if !self.rank_has_pending(rank) {
                let rank_banks = &self.banks[range.clone()];
                if let Some(command) = self.power_down[rank as usize].evaluate(now, rank_banks, refresh_imminent) {
                    let coords = bank_coords(channel, banks_per_group, rank, 0);
                    let earliest = self.checker.earliest_time(command, coords, now);
                    candidates.push(Candidate {
                        command,
                        earliest_time: earliest,
                        payload: None,
                        priority: priority_for(CandidateSource::PowerDown(rank), command),
                        source: CandidateSource::PowerDown(rank),
                    });
                }
            }

            for local_bank in 0..banks_per_channel as usize {
                let global = global_bank(banks_per_channel, rank, local_bank);
                if self.banks[global].is_blocked() {
                    continue;
                }
                let Some(payload) = self.scheduler.get_next(&self.banks[global]) else { continue };
                let Some(meta) = payload.controller_meta() else { continue };
                let coords = meta.coordinates;

                let command = if self.banks[global].is_idle() {
                    Command::Act
                } else if self.banks[global].is_activated() {
                    if self.banks[global].has_row_open(coords.row) {
                        let further = self.scheduler.has_further_row_hit(global, coords.row, payload.operation());
                        let Some(cmd) = self.banks[global].next_command_for(payload, further) else { continue };
                        cmd
                    } else {
                        Command::Prepb
                    }
                } else {
                    continue;
                };

                let earliest = self.checker.earliest_time(command, coords, now);
                candidates.push(Candidate {
                    command,
                    earliest_time: earliest,
                    payload: Some(payload.clone()),
                    priority: priority_for(CandidateSource::Bank(global), command),
                    source: CandidateSource::Bank(global),
                });
            }
        }

        let mem_spec = self.mem_spec;
        let winner = self.cmd_mux.select(&candidates, now, |c| u64::from(mem_spec.command_bus_length(c)));

        if let Some(winner) = winner {
            self.apply(&winner, now, &refresh_candidates);
        }

        let next_wake = self.next_wake_time(now, &candidates);
        kernel.schedule_at(next_wake, Event { channel: self.channel_index });
    }

    fn apply(&mut self, winner: &Candidate, now: Cycles, refresh_candidates: &[Option<RefreshCandidate>]) {
        debug_assert!(
            winner.earliest_time <= now,
            "CmdMux must never hand back a candidate before its earliest legal issue time"
        );
        match winner.source {
            CandidateSource::Bank(global) => {
                let Some(payload) = winner.payload.clone() else { return };
                let Some(meta) = payload.controller_meta() else { return };
                let coords = meta.coordinates;
                let rank = coords.rank;

                self.checker.insert(winner.command, coords, now);
                self.banks[global].on_issued(winner.command, Some(coords.row));
                self.power_down[rank as usize].update(winner.command);
                self.refresh[rank as usize].update(winner.command, now, self.banks_per_channel as usize);

                if winner.command.is_cas() {
                    payload.set_resolved_command(winner.command);
                    self.scheduler.record_issued(global, payload.operation());
                    self.scheduler.remove(global, &payload);
                    if let Some(offset) = self.mem_spec.data_window_end_offset(winner.command) {
                        self.pending_completions.push(PendingCompletion { due: now + u64::from(offset), payload });
                    }
                }

                if let Some(delay) = transition_delay(winner.command, &self.mem_spec) {
                    self.pending_transitions.push(PendingTransition { due: now + u64::from(delay), bank: global });
                }
            }

            CandidateSource::Refresh(rank) => {
                let channel = self.channel_index;
                let banks_per_group = self.mem_spec.banks_per_group();
                let banks_per_channel = self.banks_per_channel;
                let Some(candidate) = refresh_candidates[rank as usize].clone() else { return };
                for local in candidate.banks {
                    let coords = bank_coords(channel, banks_per_group, rank, local);
                    self.checker.insert(winner.command, coords, now);
                    let global = global_bank(banks_per_channel, rank, local);
                    self.banks[global].on_issued(winner.command, None);
                    if let Some(delay) = transition_delay(winner.command, &self.mem_spec) {
                        self.pending_transitions.push(PendingTransition { due: now + u64::from(delay), bank: global });
                    }
                }
                self.refresh[rank as usize].update(winner.command, now, self.banks_per_channel as usize);
                self.power_down[rank as usize].update(winner.command);
            }

            CandidateSource::PowerDown(rank) => {
                let channel = self.channel_index;
                let banks_per_group = self.mem_spec.banks_per_group();
                let coords = bank_coords(channel, banks_per_group, rank, 0);
                self.checker.insert(winner.command, coords, now);
                for global in rank_range(self.banks_per_channel, rank) {
                    self.banks[global].on_issued(winner.command, None);
                }
                self.refresh[rank as usize].update(winner.command, now, self.banks_per_channel as usize);
                if self.power_down[rank as usize].pending_interruption_command() == Some(winner.command) {
                    self.power_down[rank as usize].trigger_interruption();
                }
            }
        }
    }

    fn drain_transitions(&mut self, now: Cycles) {
        let mut remaining = Vec::with_capacity(self.pending_transitions.len());
        for transition in self.pending_transitions.drain(..) {
            if transition.due <= now {
                self.banks[transition.bank].on_transition_complete();
            } else {
                remaining.push(transition);
            }
        }
        self.pending_transitions = remaining;
    }

    fn drain_due_completions(&mut self, now: Cycles) -> usize {
        let mut remaining = Vec::with_capacity(self.pending_completions.len());
        let mut completed = 0;
        for pending in self.pending_completions.drain(..) {
            if pending.due <= now {
                pending.payload.complete(pending.due);
                self.response_queue.push(pending.payload);
                completed += 1;
            } else {
                remaining.push(pending);
            }
        }
        self.pending_completions = remaining;
        completed
    }

    fn next_wake_time(&self, now: Cycles, candidates: &[Candidate]) -> Cycles {
        let mut heap: BinaryHeap<Reverse<Cycles>> = BinaryHeap::new();
        heap.push(Reverse(now + 1));

        for transition in &self.pending_transitions {
            heap.push(Reverse(transition.due));
        }
        for pending in &self.pending_completions {
            heap.push(Reverse(pending.due));
        }
        for refresh in &self.refresh {
            heap.push(Reverse(refresh.time_for_next_trigger()));
        }
        for candidate in candidates {
            heap.push(Reverse(candidate.earliest_time.max(now + 1)));
        }

        heap.pop().map_or(now + 1, |Reverse(t)| t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::kernel::SimKernel;

    fn flat_mapping_config() -> Config {
        let mut config = Config::default();
        config.mem_spec.channels = 1;
        config.mem_spec.ranks_per_channel = 1;
        config.mem_spec.bank_groups_per_channel = 1;
        config.mem_spec.banks_per_channel = 4;
        config.mem_spec.rows_per_bank = 1 << 10;
        config.mem_spec.columns_per_row = 1 << 8;
        config.address_mapping.byte_bit = vec![vec![0, 1]];
        config.address_mapping.column_bit = vec![(2..10).collect()];
        config.address_mapping.bank_bit = vec![(10..12).collect()];
        config.address_mapping.row_bit = vec![(12..22).collect()];
        config
    }

    #[test]
    fn a_single_read_is_admitted_and_eventually_completes() {
        let config = flat_mapping_config();
        let mut controller = Controller::new(&config, 0).unwrap();
        let mut kernel = SimKernel::new();

        let admitted = controller.offer(&Request::Read { address: 0x1000, length: 64 }, 0).unwrap();
        assert!(admitted);

        for _ in 0..500 {
            let now = kernel.now();
            controller.advance(now, &mut kernel);
            if !controller.drain_responses(now).is_empty() {
                break;
            }
            if kernel.advance().is_empty() {
                break;
            }
        }

        let (admitted_total, completed_total) = controller.counters();
        assert_eq!(admitted_total, 1);
        assert_eq!(completed_total, 1);
    }

    #[test]
    fn buffer_capacity_is_enforced_as_backpressure_not_an_error() {
        let mut config = flat_mapping_config();
        config.controller.request_buffer_size = 1;
        let mut controller = Controller::new(&config, 0).unwrap();

        assert!(controller.offer(&Request::Read { address: 0x1000, length: 64 }, 0).unwrap());
        assert!(!controller.offer(&Request::Read { address: 0x1000, length: 64 }, 0).unwrap());
    }

    #[test]
    fn out_of_range_address_is_rejected_at_admission() {
        let config = flat_mapping_config();
        let mut controller = Controller::new(&config, 0).unwrap();
        let huge_address = 1u64 << 40;
        assert!(controller.offer(&Request::Read { address: huge_address, length: 64 }, 0).is_err());
    }
}
