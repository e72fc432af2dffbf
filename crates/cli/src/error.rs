//! CLI-level error type: wraps the core's `DramError` plus the I/O and JSON
//! failures that only exist at the binary's edges (config file loading,
//! trace file opening), mirroring the teacher's pattern of a thin
//! `thiserror` wrapper per binary crate rather than reusing the library's
//! error type unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can make the `dramsys-sim` binary exit non-zero (spec
/// §6.4: "CLI wrappers exit 0 on clean termination, non-zero on
/// configuration or trace errors").
#[derive(Debug, Error)]
pub enum CliError {
    /// A configuration or trace file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// The file that failed to open or read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file's JSON did not deserialize into `Config`.
    #[error("invalid configuration in {path}: {source}")]
    Config {
        /// The configuration file.
        path: PathBuf,
        /// The underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },

    /// A trace line violated the grammar of spec.md §6.2.
    #[error("malformed trace line {line} in {path}: {reason}")]
    Trace {
        /// The trace file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The core crate rejected the configuration or a request.
    #[error(transparent)]
    Dram(#[from] dramsys_core::DramError),
}
