//! Per-channel request buffer + arbitration policy.
//!
//! Grounded on `original_source/.../controller/scheduler/*.cpp`: one
//! `Scheduler` type dispatches on the configured [`SchedulerPolicy`] rather
//! than the source's five separate classes, since the policies differ only
//! in `get_next`'s selection rule, not in the buffer shape they need (every
//! variant keeps per-bank read/write queues; `Fifo`/`FrFcfs`/`FrFcfsGrp`
//! just never distinguish them when picking). Buffer-capacity accounting
//! (`BufferPolicy`) is likewise one small enum rather than
//! `BufferCounterBankwise`/`BufferCounterReadWrite`/`BufferCounterShared`
//! as separate classes.

use std::collections::VecDeque;

use crate::bank_machine::BankMachine;
use crate::command::{Command, Operation};
use crate::config::{BufferPolicy, ControllerConfig, SchedulerPolicy};
use crate::payload::Payload;

/// Per-bank, per-direction request queues plus buffer-capacity accounting.
#[derive(Debug)]
pub struct Scheduler {
    policy: SchedulerPolicy,
    buffer_policy: BufferPolicy,
    request_buffer_size: usize,
    request_buffer_size_read: usize,
    request_buffer_size_write: usize,
    low_watermark: usize,
    high_watermark: usize,
    read_queues: Vec<VecDeque<Payload>>,
    write_queues: Vec<VecDeque<Payload>>,
    /// Last command direction issued per bank, consulted by `GrpFrFcfs` to
    /// decide which queue to favor.
    last_direction: Vec<Option<Operation>>,
    /// `GrpFrFcfsWm`'s hysteresis flag: `true` once writes have crossed
    /// `high_watermark` (or reads have drained to zero), `false` again once
    /// writes fall to `low_watermark` with reads still pending.
    write_mode: bool,
    num_reads: usize,
    num_writes: usize,
}

impl Scheduler {
    /// Builds an empty scheduler with one queue pair per bank.
    #[must_use]
    pub fn new(config: &ControllerConfig, banks_per_channel: u32) -> Self {
        let banks = banks_per_channel as usize;
        Self {
            policy: config.scheduler_policy,
            buffer_policy: config.buffer_policy,
            request_buffer_size: config.request_buffer_size,
            request_buffer_size_read: config.request_buffer_size_read,
            request_buffer_size_write: config.request_buffer_size_write,
            low_watermark: config.low_watermark,
            high_watermark: config.high_watermark,
            read_queues: vec![VecDeque::new(); banks],
            write_queues: vec![VecDeque::new(); banks],
            last_direction: vec![None; banks],
            write_mode: false,
            num_reads: 0,
            num_writes: 0,
        }
    }

    fn is_write(operation: Operation) -> bool {
        matches!(operation, Operation::Write | Operation::MaskedWrite)
    }

    /// `true` if the scheduler has room for one more request of `operation`
    /// headed for `bank`. Not an error condition (spec §7): the caller
    /// (Controller) holds the initiator off until this returns `true`.
    #[must_use]
    pub fn can_admit(&self, bank: usize, operation: Operation) -> bool {
        match self.buffer_policy {
            BufferPolicy::Bankwise => {
                self.read_queues[bank].len() + self.write_queues[bank].len() < self.request_buffer_size
            }
            BufferPolicy::ReadWrite => {
                if Self::is_write(operation) {
                    self.num_writes < self.request_buffer_size_write
                } else {
                    self.num_reads < self.request_buffer_size_read
                }
            }
            BufferPolicy::Shared => self.num_reads + self.num_writes < self.request_buffer_size,
        }
    }

    /// Admits `payload` into its bank's queue. Caller must have already
    /// checked [`Self::can_admit`].
    pub fn admit(&mut self, bank: usize, payload: Payload) {
        if Self::is_write(payload.operation()) {
            self.write_queues[bank].push_back(payload);
            self.num_writes += 1;
        } else {
            self.read_queues[bank].push_back(payload);
            self.num_reads += 1;
        }
        self.evaluate_write_mode();
    }

    /// Removes `payload` from its bank's queue once its terminal CAS
    /// command has been issued.
    pub fn remove(&mut self, bank: usize, payload: &Payload) {
        let queue = if Self::is_write(payload.operation()) {
            self.num_writes = self.num_writes.saturating_sub(1);
            &mut self.write_queues[bank]
        } else {
            self.num_reads = self.num_reads.saturating_sub(1);
            &mut self.read_queues[bank]
        };
        if let Some(pos) = queue.iter().position(|p| p == payload) {
            queue.remove(pos);
        }
        self.evaluate_write_mode();
    }

    /// `GrpFrFcfsWm`'s hysteresis: enters write mode once writes exceed
    /// `high_watermark` or no reads are pending; leaves once writes have
    /// drained to `low_watermark` or below while reads remain. Mirrors
    /// `SchedulerGrpFrFcfsWm::evaluateWriteMode` exactly, including its
    /// "no reads pending" alternative trigger for entry.
    fn evaluate_write_mode(&mut self) {
        if self.policy != SchedulerPolicy::GrpFrFcfsWm {
            return;
        }
        if self.write_mode {
            if self.num_writes <= self.low_watermark && self.num_reads != 0 {
                self.write_mode = false;
            }
        } else if self.num_writes > self.high_watermark || self.num_reads == 0 {
            self.write_mode = true;
        }
    }

    /// Per-bank pending request counts (reads + writes), for monitoring.
    #[must_use]
    pub fn buffer_depth(&self) -> Vec<u32> {
        self.read_queues
            .iter()
            .zip(&self.write_queues)
            .map(|(r, w)| (r.len() + w.len()) as u32)
            .collect()
    }

    /// Records the direction of a CAS command actually issued to `bank`,
    /// consulted by `FrFcfsGrp`/`GrpFrFcfs` to stay in the current
    /// read/write group.
    pub fn record_issued(&mut self, bank: usize, operation: Operation) {
        self.last_direction[bank] = Some(operation);
    }

    /// Picks the payload `bank` should issue next, given its current open
    /// row (if activated).
    #[must_use]
    pub fn get_next(&self, bank_machine: &BankMachine) -> Option<&Payload> {
        let bank = bank_machine.bank_id() as usize;
        let open_row = if bank_machine.is_activated() { bank_machine.open_row() } else { None };
        match self.policy {
            SchedulerPolicy::Fifo => self.oldest_of_both(bank),
            SchedulerPolicy::FrFcfs => self.row_hit_or_oldest(bank, open_row),
            SchedulerPolicy::FrFcfsGrp => {
                self.row_hit_same_group_or_oldest(bank, open_row, self.last_direction[bank])
            }
            SchedulerPolicy::GrpFrFcfs => {
                self.direction_queue_or_fallback(bank, open_row, self.last_direction[bank])
            }
            SchedulerPolicy::GrpFrFcfsWm => {
                let preferred = if self.write_mode { Operation::Write } else { Operation::Read };
                self.direction_queue_or_fallback(bank, open_row, Some(preferred))
            }
        }
    }

    fn oldest_of_both(&self, bank: usize) -> Option<&Payload> {
        let read = self.read_queues[bank].front();
        let write = self.write_queues[bank].front();
        match (read, write) {
            (Some(r), Some(w)) => Some(if r.id() < w.id() { r } else { w }),
            (Some(r), None) => Some(r),
            (None, Some(w)) => Some(w),
            (None, None) => None,
        }
    }

    fn row_hit(queue: &VecDeque<Payload>, row: u32) -> Option<&Payload> {
        queue
            .iter()
            .find(|p| p.controller_meta().is_some_and(|m| m.coordinates.row == row))
    }

    fn row_hit_or_oldest(&self, bank: usize, open_row: Option<u32>) -> Option<&Payload> {
        if let Some(row) = open_row {
            if let Some(hit) = Self::row_hit(&self.read_queues[bank], row)
                .into_iter()
                .chain(Self::row_hit(&self.write_queues[bank], row))
                .min_by_key(|p| p.id())
            {
                return Some(hit);
            }
        }
        self.oldest_of_both(bank)
    }

    /// `FrFcfsGrp`: among row hits, prefer one whose direction matches
    /// `preferred_direction` (the last-issued command's direction) to stay
    /// in the current read/write group, subject to the hazard check: a
    /// candidate may not be returned if an older pending request (either
    /// direction) targets the same address, since that would let the newer
    /// request overtake it.
    fn row_hit_same_group_or_oldest(
        &self,
        bank: usize,
        open_row: Option<u32>,
        preferred_direction: Option<Operation>,
    ) -> Option<&Payload> {
        if let Some(row) = open_row {
            let grouped_hit = preferred_direction.and_then(|dir| {
                let queue = if Self::is_write(dir) { &self.write_queues[bank] } else { &self.read_queues[bank] };
                Self::row_hit(queue, row)
            });
            let any_hit = grouped_hit.or_else(|| {
                Self::row_hit(&self.read_queues[bank], row)
                    .into_iter()
                    .chain(Self::row_hit(&self.write_queues[bank], row))
                    .min_by_key(|p| p.id())
            });
            if let Some(candidate) = any_hit {
                if !self.hazard_overtakes(bank, candidate) {
                    return Some(candidate);
                }
            }
        }
        self.oldest_of_both(bank)
    }

    /// `GrpFrFcfs`/`GrpFrFcfsWm`: pick from the queue matching
    /// `preferred_direction` first (row hit within it if activated, else
    /// its oldest entry), falling back to the other direction's queue only
    /// if the preferred one is empty.
    fn direction_queue_or_fallback(
        &self,
        bank: usize,
        open_row: Option<u32>,
        preferred_direction: Option<Operation>,
    ) -> Option<&Payload> {
        let write_preferred = preferred_direction.is_some_and(Self::is_write);
        let (preferred, other) = if write_preferred {
            (&self.write_queues[bank], &self.read_queues[bank])
        } else {
            (&self.read_queues[bank], &self.write_queues[bank])
        };

        let from_queue = |queue: &VecDeque<Payload>| -> Option<&Payload> {
            if let Some(row) = open_row {
                if let Some(hit) = Self::row_hit(queue, row) {
                    return Some(hit);
                }
            }
            queue.front()
        };

        if let Some(candidate) = from_queue(preferred) {
            if !self.hazard_overtakes(bank, candidate) {
                return Some(candidate);
            }
        }
        from_queue(other)
    }

    /// Hazard detection (spec §9 open question, resolved in favor of
    /// implementing it): `candidate` may not jump ahead of an older pending
    /// request to the same address in the other direction's queue.
    fn hazard_overtakes(&self, bank: usize, candidate: &Payload) -> bool {
        let other = if Self::is_write(candidate.operation()) { &self.read_queues[bank] } else { &self.write_queues[bank] };
        other
            .iter()
            .any(|p| p.address() == candidate.address() && p.id() < candidate.id())
    }

    /// `true` if another request behind `row`'s current occupant targets
    /// the same row (used by adaptive page policies to decide whether to
    /// keep a row open after the in-flight access).
    #[must_use]
    pub fn has_further_row_hit(&self, bank: usize, row: u32, operation: Operation) -> bool {
        let queue = if Self::is_write(operation) { &self.write_queues[bank] } else { &self.read_queues[bank] };
        queue
            .iter()
            .filter(|p| p.controller_meta().is_some_and(|m| m.coordinates.row == row))
            .count()
            >= 2
    }

    /// `true` if at least two requests of `operation`'s direction are
    /// pending for `bank` (used by `GrpFrFcfsWm`'s `hasFurtherRequest`).
    #[must_use]
    pub fn has_further_request(&self, bank: usize, operation: Operation) -> bool {
        let queue = if Self::is_write(operation) { &self.write_queues[bank] } else { &self.read_queues[bank] };
        queue.len() >= 2
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Coordinates;
    use crate::config::PagePolicy;
    use crate::payload::ControllerMeta;

    fn admitted(id: u64, operation: Operation, row: u32, address: u64) -> Payload {
        let payload = Payload::new(id, operation, address, 64, 0);
        payload.set_controller_meta(ControllerMeta {
            coordinates: Coordinates { row, ..Coordinates::default() },
            resolved_command: None,
        });
        payload
    }

    fn config(policy: SchedulerPolicy) -> ControllerConfig {
        ControllerConfig { scheduler_policy: policy, ..ControllerConfig::default() }
    }

    #[test]
    fn bankwise_capacity_blocks_admission_once_full() {
        let mut scheduler = Scheduler::new(&config(SchedulerPolicy::Fifo), 4);
        for i in 0..8 {
            assert!(scheduler.can_admit(0, Operation::Read));
            scheduler.admit(0, admitted(i, Operation::Read, 0, i * 64));
        }
        assert!(!scheduler.can_admit(0, Operation::Read));
        assert!(scheduler.can_admit(1, Operation::Read));
    }

    #[test]
    fn fifo_returns_arrival_order_regardless_of_row() {
        let mut scheduler = Scheduler::new(&config(SchedulerPolicy::Fifo), 4);
        scheduler.admit(0, admitted(5, Operation::Read, 9, 0));
        scheduler.admit(0, admitted(1, Operation::Read, 1, 64));
        let bank = BankMachine::new(0, PagePolicy::Open);
        assert_eq!(scheduler.get_next(&bank).unwrap().id(), 1);
    }

    #[test]
    fn fr_fcfs_prefers_row_hit_over_older_miss() {
        let mut scheduler = Scheduler::new(&config(SchedulerPolicy::FrFcfs), 4);
        scheduler.admit(0, admitted(1, Operation::Read, 9, 0));
        scheduler.admit(0, admitted(2, Operation::Read, 5, 64));
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        assert_eq!(scheduler.get_next(&bank).unwrap().id(), 2);
    }

    #[test]
    fn grp_fr_fcfs_wm_enters_write_mode_above_high_watermark() {
        let mut cfg = config(SchedulerPolicy::GrpFrFcfsWm);
        cfg.low_watermark = 4;
        cfg.high_watermark = 8;
        let mut scheduler = Scheduler::new(&cfg, 4);
        for i in 0..9 {
            scheduler.admit(0, admitted(i, Operation::Write, 0, i * 64));
        }
        assert!(scheduler.write_mode);
        scheduler.admit(0, admitted(100, Operation::Read, 1, 999));
        let bank = BankMachine::new(0, PagePolicy::Open);
        assert_eq!(scheduler.get_next(&bank).unwrap().operation(), Operation::Write);
    }

    #[test]
    fn hazard_check_blocks_overtake_of_older_same_address_request() {
        let mut scheduler = Scheduler::new(&config(SchedulerPolicy::FrFcfsGrp), 4);
        scheduler.admit(0, admitted(1, Operation::Read, 9, 0x100));
        scheduler.admit(0, admitted(2, Operation::Write, 5, 0x100));
        let mut bank = BankMachine::new(0, PagePolicy::Open);
        bank.on_issued(Command::Act, Some(5));
        bank.on_transition_complete();
        // The write at row 5 is a row hit, but it targets the same address
        // as the older pending read (id 1) to row 9 — the hazard check
        // must force the oldest-of-both fallback instead of the hit.
        assert_eq!(scheduler.get_next(&bank).unwrap().id(), 1);
    }
}
