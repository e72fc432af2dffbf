//! Cycle-accurate DRAM memory-controller and device timing core.
//!
//! This crate is the simulation core described by the project's
//! specification: address decoding, per-bank state machines, scheduler
//! arbitration, refresh and power-down policy, the timing-constraint
//! checker, command multiplexing and response ordering. It owns no I/O —
//! trace parsing, traffic generation and configuration file loading live in
//! the `dramsys-sim` binary crate; this crate only consumes the
//! [`config::Config`] record and the [`initiator::Initiator`] trait.

pub mod address;
pub mod bank_machine;
pub mod checker;
pub mod cmdmux;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod initiator;
pub mod kernel;
pub mod memspec;
pub mod payload;
pub mod power_down;
pub mod refresh;
pub mod response_queue;
pub mod scheduler;

pub use controller::Controller;
pub use error::{DramError, DramResult};
