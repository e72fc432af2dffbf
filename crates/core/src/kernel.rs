//! Discrete-event kernel: monotonic simulated time plus a priority queue of
//! future wake-ups.
//!
//! Spec §5 treats the simulation kernel itself as an external collaborator
//! (a SystemC-style scheduler providing `sc_time`, notifications and
//! callbacks); design note §9 asks for it to be "a first-class `Kernel`
//! trait consumed by `Controller`" instead. `SimKernel` is the one
//! concrete implementation this crate ships — a `BinaryHeap` of
//! `(Reverse(Cycles), Event)` generalizes the teacher's per-cycle
//! `Simulator::tick` loop (`sim/simulator.rs`) into "advance to the next
//! due event, then tick once," which is what keeps this an event-driven
//! simulator rather than a busy loop over every cycle (spec §5: "no busy
//! loop").

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Simulated time, in cycles of the configured channel's `tCK`.
pub type Cycles = u64;

/// A woken component, identified by channel index. The kernel does not
/// interpret events beyond ordering them by due time; `Controller` decides
/// what "channel N is due" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Which channel's `Controller::advance` should run.
    pub channel: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    time: Cycles,
    seq: u64,
    event: Event,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Minimal interface a discrete-event host must provide. `SimKernel` is the
/// only implementation in this crate; the trait exists so `Controller`
/// never depends on the binary-heap representation directly (design note
/// §9), and so a test harness can substitute a deterministic stub.
pub trait Kernel {
    /// The current simulated time.
    fn now(&self) -> Cycles;

    /// Schedules a wake-up for `event` at `time`. `time < now()` is
    /// clamped up to `now()`: a component that discovers it should have
    /// acted immediately schedules for "right now," not the past.
    fn schedule_at(&mut self, time: Cycles, event: Event);

    /// The earliest pending wake-up time, if any event is queued.
    fn next_event_time(&self) -> Option<Cycles>;

    /// Advances `now()` to the next pending event's time (a no-op if
    /// nothing is queued) and drains every event due at that time.
    fn advance(&mut self) -> Vec<Event>;
}

/// Binary-heap-backed [`Kernel`]: `O(log n)` schedule, drains every event
/// tied for the next due time in one [`Kernel::advance`] call (several
/// channels can legitimately wake on the same cycle).
#[derive(Debug, Default)]
pub struct SimKernel {
    now: Cycles,
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl SimKernel {
    /// Builds a kernel starting at cycle 0.
    #[must_use]
    pub fn new() -> Self {
        Self { now: 0, queue: BinaryHeap::new(), next_seq: 0 }
    }
}

impl Kernel for SimKernel {
    fn now(&self) -> Cycles {
        self.now
    }

    fn schedule_at(&mut self, time: Cycles, event: Event) {
        let time = time.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { time, seq, event }));
    }

    fn next_event_time(&self) -> Option<Cycles> {
        self.queue.peek().map(|Reverse(s)| s.time)
    }

    fn advance(&mut self) -> Vec<Event> {
        let Some(time) = self.next_event_time() else { return Vec::new() };
        self.now = time;
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|Reverse(s)| s.time == time) {
            let Some(Reverse(scheduled)) = self.queue.pop() else { break };
            due.push(scheduled.event);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_jumps_straight_to_the_next_due_time() {
        let mut kernel = SimKernel::new();
        kernel.schedule_at(100, Event { channel: 0 });
        kernel.schedule_at(10, Event { channel: 1 });
        let due = kernel.advance();
        assert_eq!(kernel.now(), 10);
        assert_eq!(due, vec![Event { channel: 1 }]);
    }

    #[test]
    fn simultaneous_events_drain_together() {
        let mut kernel = SimKernel::new();
        kernel.schedule_at(5, Event { channel: 0 });
        kernel.schedule_at(5, Event { channel: 1 });
        kernel.schedule_at(9, Event { channel: 2 });
        let due = kernel.advance();
        assert_eq!(due.len(), 2);
        assert_eq!(kernel.next_event_time(), Some(9));
    }

    #[test]
    fn schedule_in_the_past_is_clamped_to_now() {
        let mut kernel = SimKernel::new();
        kernel.schedule_at(10, Event { channel: 0 });
        kernel.advance();
        kernel.schedule_at(0, Event { channel: 1 });
        assert_eq!(kernel.next_event_time(), Some(10));
    }

    #[test]
    fn empty_queue_advance_is_a_no_op() {
        let mut kernel = SimKernel::new();
        assert!(kernel.advance().is_empty());
        assert_eq!(kernel.now(), 0);
    }
}
