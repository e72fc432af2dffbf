//! `dramsys-sim`: CLI front-end driving one [`dramsys_core::Controller`]
//! channel from a trace file, synthetic traffic generator, or row-hammer
//! pattern (spec §6.3/§6.4).
//!
//! Mirrors the teacher's `sim` binary shape (a `clap` derive `Cli` with one
//! subcommand per run mode, `tracing-subscriber` initialized from
//! `RUST_LOG`) while replacing RISC-V execution with DRAM command
//! generation.

mod error;
mod initiators;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use dramsys_core::config::Config;
use dramsys_core::initiator::{Initiator, Request};
use dramsys_core::kernel::{Cycles, Kernel, SimKernel};
use dramsys_core::Controller;

use error::CliError;
use initiators::{RowHammer, StlPlayer, TrafficGenerator};

#[derive(Parser, Debug)]
#[command(
    name = "dramsys-sim",
    author,
    version,
    about = "Cycle-accurate DRAM memory-controller and device timing simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a `.stl`/`.rstl` trace file through the controller.
    Trace {
        /// Path to the trace file (`.stl` = absolute cycles, `.rstl` = relative).
        trace: PathBuf,
        /// Optional JSON configuration file; defaults to `Config::default()`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Default burst size (bytes) for lines without a `(burstBytes)` override.
        #[arg(long, default_value_t = 64)]
        burst_bytes: u32,
        /// Require and parse the trailing hex data field on stored writes.
        #[arg(long)]
        store: bool,
    },
    /// Generate synthetic read/write traffic with a uniform address distribution.
    Traffic {
        /// Optional JSON configuration file; defaults to `Config::default()`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Total number of requests to generate.
        #[arg(long)]
        num_requests: u64,
        /// Fraction of requests that are reads, in `[0.0, 1.0]`.
        #[arg(long, default_value_t = 0.5)]
        read_write_ratio: f64,
        /// Lower bound (inclusive) of the sampled address range.
        #[arg(long, default_value_t = 0)]
        min_address: u64,
        /// Upper bound (exclusive) of the sampled address range.
        #[arg(long)]
        max_address: u64,
        /// Burst size in bytes.
        #[arg(long, default_value_t = 64)]
        data_length: u32,
        /// PRNG seed, for reproducible runs.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Fixed idle cycles between requests (`0` for back-to-back).
        #[arg(long, default_value_t = 0)]
        think_cycles: u64,
    },
    /// Row-hammer two aggressor rows as fast as timing allows.
    Hammer {
        /// Optional JSON configuration file; defaults to `Config::default()`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Total number of requests to generate.
        #[arg(long)]
        num_requests: u64,
        /// Byte-address delta between the two alternating aggressor rows.
        #[arg(long)]
        row_increment: u64,
        /// Burst size in bytes.
        #[arg(long, default_value_t = 64)]
        data_length: u32,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    match run(&Cli::parse()) {
        Ok(summary) => {
            eprintln!("completed {} of {} admitted requests", summary.completed, summary.admitted);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "simulation terminated with an error");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Summary, CliError> {
    match &cli.command {
        Commands::Trace { trace, config, burst_bytes, store } => {
            let config = load_config(config.as_deref())?;
            let mut player = StlPlayer::open(trace, *burst_bytes, *store)?;
            let summary = simulate(&config, &mut player)?;
            if let Some(trace_error) = player.take_error() {
                return Err(trace_error);
            }
            Ok(summary)
        }
        Commands::Traffic {
            config,
            num_requests,
            read_write_ratio,
            min_address,
            max_address,
            data_length,
            seed,
            think_cycles,
        } => {
            let config = load_config(config.as_deref())?;
            let mut generator = TrafficGenerator::new(
                *num_requests,
                *seed,
                *read_write_ratio,
                *min_address,
                *max_address,
                *data_length,
                u64::from(*data_length),
                *think_cycles,
            );
            simulate(&config, &mut generator)
        }
        Commands::Hammer { config, num_requests, row_increment, data_length } => {
            let config = load_config(config.as_deref())?;
            let mut hammer = RowHammer::new(*num_requests, *row_increment, *data_length);
            simulate(&config, &mut hammer)
        }
    }
}

/// Admitted/completed request totals at the end of a run, for the exit
/// summary (spec §6.4 progress reporting).
#[derive(Debug, Clone, Copy)]
struct Summary {
    admitted: u64,
    completed: u64,
}

fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    let Some(path) = path else { return Ok(Config::default()) };

    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Io { path: path.to_owned(), source })?;
    let config: Config =
        serde_json::from_str(&contents).map_err(|source| CliError::Config { path: path.to_owned(), source })?;
    config.validate()?;
    Ok(config)
}

/// Drives a single channel 0 `Controller` from `initiator` until the
/// initiator is exhausted and every admitted payload has completed,
/// printing a cosmetic progress indicator to stderr (spec §6.4).
fn simulate(config: &Config, initiator: &mut impl Initiator) -> Result<Summary, CliError> {
    let mut controller = Controller::new(config, 0)?;
    let mut kernel = SimKernel::new();

    let total_requests = initiator.total_requests().max(1);
    let mut queued_request: Option<Request> = None;
    let mut queued_due: Cycles = 0;
    let mut initiator_finished = false;
    let mut last_reported_percent = u64::MAX;

    loop {
        let now = kernel.now();

        if queued_request.is_none() && !initiator_finished {
            let request = initiator.next_request();
            if matches!(request, Request::Stop) {
                initiator_finished = true;
            } else {
                queued_due = now + initiator.next_trigger();
                queued_request = Some(request);
            }
        }

        if let Some(request) = &queued_request {
            if queued_due <= now && controller.offer(request, now)? {
                queued_request = None;
            }
        }

        controller.advance(now, &mut kernel);
        let _drained = controller.drain_responses(now);

        let (admitted, completed) = controller.counters();
        let percent = completed.min(total_requests) * 100 / total_requests;
        if percent != last_reported_percent {
            last_reported_percent = percent;
            eprint!("\rprogress: {completed}/{total_requests} ({percent}%)");
        }

        if initiator_finished && queued_request.is_none() && admitted == completed {
            eprintln!();
            return Ok(Summary { admitted, completed });
        }

        kernel.advance();
    }
}
