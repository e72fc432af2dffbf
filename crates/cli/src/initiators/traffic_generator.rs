//! Synthetic address/read-write-ratio traffic generator.
//!
//! Grounded on `original_source/apps/simulator/simulator/generator/TrafficGenerator.cpp`'s
//! single-state (non-state-machine) constructor: a `RandomProducer`
//! uniformly samples an aligned address in `[minAddress, maxAddress)`,
//! independently rolls a read/write outcome against `rwRatio`, and the
//! generator terminates once `numRequests` have been issued. The
//! state-machine variant (`TrafficGeneratorStateMachine`, idle states +
//! probabilistic transitions between named traffic phases) is not carried
//! here — a single phase covers everything spec.md's `Initiator` interface
//! requires, and the CLI exposes phase-like behavior by simply running
//! multiple `Traffic` invocations back to back.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dramsys_core::initiator::{Initiator, Request};
use dramsys_core::kernel::Cycles;

/// Fraction of generated requests that are reads, in `[0.0, 1.0]`.
pub type ReadWriteRatio = f64;

/// Uniform-random address, fixed read/write ratio traffic source.
#[derive(Debug)]
pub struct TrafficGenerator {
    total_requests: u64,
    read_write_ratio: ReadWriteRatio,
    min_address: u64,
    max_address: u64,
    data_length: u32,
    data_alignment: u64,
    think_cycles: Cycles,
    generated: u64,
    rng: StdRng,
}

impl TrafficGenerator {
    /// `read_write_ratio` is the probability any given request is a read
    /// (`1.0` = all reads, `0.0` = all writes). Addresses are drawn
    /// uniformly from `[min_address, max_address)` and rounded down to a
    /// `data_alignment`-byte boundary, matching `RandomProducer`'s
    /// `address & ~(dataAlignment - 1)` masking. `think_cycles` is the
    /// fixed inter-request idle time (`0` for back-to-back issue).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        total_requests: u64,
        seed: u64,
        read_write_ratio: ReadWriteRatio,
        min_address: u64,
        max_address: u64,
        data_length: u32,
        data_alignment: u64,
        think_cycles: Cycles,
    ) -> Self {
        Self {
            total_requests,
            read_write_ratio: read_write_ratio.clamp(0.0, 1.0),
            min_address,
            max_address: max_address.max(min_address + 1),
            data_length,
            data_alignment: data_alignment.max(1),
            think_cycles,
            generated: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_address(&mut self) -> u64 {
        let span = self.max_address - self.min_address;
        let offset = self.rng.gen_range(0..span);
        let raw = self.min_address + offset;
        raw - (raw % self.data_alignment)
    }
}

impl Initiator for TrafficGenerator {
    fn next_request(&mut self) -> Request {
        if self.generated >= self.total_requests {
            return Request::Stop;
        }
        self.generated += 1;

        let address = self.sample_address();
        if self.rng.gen_bool(self.read_write_ratio) {
            Request::Read { address, length: self.data_length }
        } else {
            Request::Write { address, length: self.data_length, data: None }
        }
    }

    fn next_trigger(&self) -> Cycles {
        self.think_cycles
    }

    fn total_requests(&self) -> u64 {
        self.total_requests
    }
}
