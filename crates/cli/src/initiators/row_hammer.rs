//! Row-hammer pattern generator: alternates reads between two aggressor
//! rows as fast as timing allows, back to back.
//!
//! Grounded on `original_source/src/simulator/simulator/hammer/RowHammer.cpp`:
//! `nextRequest` toggles `currentAddress` between `0x0` and `rowIncrement`
//! on every call and always issues a `Read` with zero delay; `nextTrigger`
//! is a fixed `generatorPeriod` (we use `0`, i.e. back-to-back, matching the
//! default period of an unthrottled hammer run).

use dramsys_core::initiator::{Initiator, Request};
use dramsys_core::kernel::Cycles;

/// Repeatedly activates one or two aggressor rows as fast as the controller
/// will admit them, to stress row-hammer mitigation (`RFM`/`RAA`
/// accounting in [`dramsys_core::checker::Checker`] and
/// [`dramsys_core::bank_machine::BankMachine`]).
#[derive(Debug)]
pub struct RowHammer {
    total_requests: u64,
    row_increment: u64,
    data_length: u32,
    generated: u64,
    current_address: u64,
}

impl RowHammer {
    /// `row_increment` is the byte-address delta between the two
    /// alternating aggressor rows; `data_length` is the burst size of each
    /// read.
    #[must_use]
    pub const fn new(total_requests: u64, row_increment: u64, data_length: u32) -> Self {
        Self { total_requests, row_increment, data_length, generated: 0, current_address: 0 }
    }
}

impl Initiator for RowHammer {
    fn next_request(&mut self) -> Request {
        if self.generated >= self.total_requests {
            return Request::Stop;
        }
        self.generated += 1;

        self.current_address = if self.current_address == 0 { self.row_increment } else { 0 };

        Request::Read { address: self.current_address, length: self.data_length }
    }

    fn next_trigger(&self) -> Cycles {
        0
    }

    fn total_requests(&self) -> u64 {
        self.total_requests
    }
}
