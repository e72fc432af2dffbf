//! Error taxonomy for configuration, address mapping and trace loading.
//!
//! Timing violations are not part of this enum: the [`crate::checker::Checker`]
//! is consulted before every command issue, so a violation can only mean a
//! bug in the controller itself. Those are guarded with `debug_assert!`
//! rather than surfaced as a recoverable error (spec: "unreachable in
//! production code").
//!
//! Buffer backpressure is likewise not an error — see
//! [`crate::scheduler::Scheduler::can_admit`].

use thiserror::Error;

/// Fatal errors raised while constructing or loading simulator state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DramError {
    /// Invalid or contradictory configuration (bad enum value, watermark
    /// ordering, address-mapping / `MemSpec` disagreement, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed trace line, data-length mismatch, or unsupported command
    /// in a trace file.
    #[error("trace error: {0}")]
    Trace(String),

    /// A command was requested that the configured `MemSpec` does not
    /// support (e.g. `REFPB` on a standard without per-bank refresh).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convenience alias used throughout construction-time fallible code.
pub type DramResult<T> = Result<T, DramError>;
