//! Requests flowing through the controller, from admission to response.
//!
//! Grounded on DRAMSys's `tlm::tlm_generic_payload` plus its attached
//! `ControllerExtension`/`ArbiterExtension` side-tables. Those extensions
//! are a dynamic property-bag in the original; here they're just two named
//! structs, since Rust doesn't need type erasure to attach metadata that's
//! always present. Reference-counted with `Rc`, not `Arc`: the controller
//! core is single-threaded (spec §5), so atomic refcounting would be pure
//! overhead.

use std::cell::Cell;
use std::rc::Rc;

use crate::address::Coordinates;
use crate::command::{Command, Operation};

/// Monotonically increasing id assigned to every admitted payload, used as
/// the `CmdMux` tie-break key (lowest id wins between equally-old-ready
/// commands).
pub type PayloadId = u64;

/// Decoded address and per-bank bookkeeping the controller attaches to a
/// payload once it is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerMeta {
    /// Fully decoded topology coordinates.
    pub coordinates: Coordinates,
    /// The command this payload will be issued as (`Rd`/`Rda`, `Wr`/`Wra`,
    /// ...), decided by the bank's page policy at issue time and cached
    /// here once chosen so repeated scheduler passes agree.
    pub resolved_command: Option<Command>,
}

/// Arrival bookkeeping an initiator attaches to a payload when it submits
/// it, used by response-ordering and latency statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterMeta {
    /// Simulation time (in cycles) the request was submitted.
    pub arrival_cycle: u64,
    /// Simulation time the data window completed, filled in once the
    /// response is ready.
    pub completion_cycle: Option<u64>,
}

#[derive(Debug)]
struct PayloadInner {
    id: PayloadId,
    operation: Operation,
    address: u64,
    length: u32,
    controller_meta: Cell<Option<ControllerMeta>>,
    arbiter_meta: Cell<ArbiterMeta>,
}

/// A reference-counted handle to one in-flight request.
///
/// Cloning a `Payload` is cheap (an `Rc` bump) and shares the same
/// underlying metadata — exactly one logical request exists per `Payload`
/// no matter how many components (scheduler, bank machine, response queue)
/// hold a handle to it at once.
#[derive(Debug, Clone)]
pub struct Payload(Rc<PayloadInner>);

impl Payload {
    /// Admits a new request at `arrival_cycle`. `coordinates` is filled in
    /// by the caller (the controller, via `AddressDecoder`) immediately
    /// after construction.
    #[must_use]
    pub fn new(id: PayloadId, operation: Operation, address: u64, length: u32, arrival_cycle: u64) -> Self {
        Self(Rc::new(PayloadInner {
            id,
            operation,
            address,
            length,
            controller_meta: Cell::new(None),
            arbiter_meta: Cell::new(ArbiterMeta {
                arrival_cycle,
                completion_cycle: None,
            }),
        }))
    }

    /// Stable identity, used for tie-breaking and hashing.
    #[must_use]
    pub fn id(&self) -> PayloadId {
        self.0.id
    }

    /// The logical operation this payload requests.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.0.operation
    }

    /// The flat byte address this payload targets.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.0.address
    }

    /// Burst length in bytes.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.0.length
    }

    /// Attaches decoded coordinates once the `AddressDecoder` has run.
    pub fn set_controller_meta(&self, meta: ControllerMeta) {
        self.0.controller_meta.set(Some(meta));
    }

    /// Decoded coordinates, if this payload has been admitted through the
    /// address decoder.
    #[must_use]
    pub fn controller_meta(&self) -> Option<ControllerMeta> {
        self.0.controller_meta.get()
    }

    /// Records which wire command the bank machine resolved this payload
    /// to (e.g. `Rd` vs `Rda`).
    pub fn set_resolved_command(&self, command: Command) {
        let mut meta = self.0.controller_meta.get().unwrap_or(ControllerMeta {
            coordinates: Coordinates::default(),
            resolved_command: None,
        });
        meta.resolved_command = Some(command);
        self.0.controller_meta.set(Some(meta));
    }

    /// Arrival and completion bookkeeping.
    #[must_use]
    pub fn arbiter_meta(&self) -> ArbiterMeta {
        self.0.arbiter_meta.get()
    }

    /// Marks this payload's data window as complete at `cycle`.
    pub fn complete(&self, cycle: u64) {
        let mut meta = self.0.arbiter_meta.get();
        meta.completion_cycle = Some(cycle);
        self.0.arbiter_meta.set(meta);
    }

    /// Latency in cycles from arrival to completion, if completed.
    #[must_use]
    pub fn latency(&self) -> Option<u64> {
        let meta = self.arbiter_meta();
        meta.completion_cycle.map(|done| done - meta.arrival_cycle)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Payload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_payload_shares_metadata() {
        let payload = Payload::new(1, Operation::Read, 0x1000, 64, 10);
        let clone = payload.clone();
        payload.complete(42);
        assert_eq!(clone.latency(), Some(32));
    }

    #[test]
    fn resolved_command_persists_without_prior_controller_meta() {
        let payload = Payload::new(2, Operation::Write, 0x2000, 64, 0);
        payload.set_resolved_command(Command::Wra);
        assert_eq!(
            payload.controller_meta().unwrap().resolved_command,
            Some(Command::Wra)
        );
    }
}
