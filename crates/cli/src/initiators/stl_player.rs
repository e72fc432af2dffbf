//! `.stl`/`.rstl` trace file player (spec §6.2).
//!
//! Grounded on `original_source/src/simulator/simulator/player/StlPlayer.cpp`:
//! the file is read once, line-cycle-commands are parsed on a background
//! thread and handed to the consumer through a bounded channel sized like
//! the original's `LINE_BUFFER_SIZE` — this is the one place spec §5
//! permits wall-clock parallelism ("the external trace-parser collaborator
//! ... pre-fills a ring of two buffers; the core only consumes one buffer
//! at a time with a barrier between swaps"), and it stays entirely inside
//! this binary crate; `dramsys-core` never spawns a thread.
//!
//! `cycle` is absolute for a `.stl` file and relative to the previous line
//! for `.rstl`; either way this player normalizes it to a per-request delay
//! (`nextTrigger`), so the `Controller`-driving loop never has to know
//! which grammar produced it.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use dramsys_core::initiator::{Initiator, Request};
use dramsys_core::kernel::Cycles;

use crate::error::CliError;

/// Matches the original's `LINE_BUFFER_SIZE`: how many parsed lines the
/// background thread may get ahead of the consumer before it blocks.
const LINE_BUFFER_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceType {
    Absolute,
    Relative,
}

#[derive(Debug)]
struct ParsedLine {
    request: Request,
    delay: Cycles,
}

#[derive(Debug)]
struct TraceLineError {
    line: usize,
    reason: String,
}

/// Replays a `.stl`/`.rstl` trace file as a sequence of [`Request`]s.
#[derive(Debug)]
pub struct StlPlayer {
    receiver: Receiver<Result<ParsedLine, TraceLineError>>,
    _worker: JoinHandle<()>,
    total_requests: u64,
    path: PathBuf,
    pending_trigger: Cycles,
    error: Option<CliError>,
}

impl StlPlayer {
    /// Opens `path`, pre-scans it for [`Initiator::total_requests`], and
    /// spawns the background parser thread. `default_burst_bytes` is used
    /// for any line without a `(burstBytes)` override; `storage_enabled`
    /// gates whether write lines are required to carry a trailing hex data
    /// field (spec §6.2: "present iff `StoreMode = Store` and `command =
    /// write`").
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Io`] if the file cannot be read or the parser
    /// thread cannot be spawned.
    pub fn open(path: impl Into<PathBuf>, default_burst_bytes: u32, storage_enabled: bool) -> Result<Self, CliError> {
        let path = path.into();
        let trace_type = if path.extension().and_then(std::ffi::OsStr::to_str) == Some("rstl") {
            TraceType::Relative
        } else {
            TraceType::Absolute
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| CliError::Io { path: path.clone(), source })?;
        let lines: Vec<String> = contents.lines().map(str::to_owned).collect();
        let total_requests = lines
            .iter()
            .filter(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            })
            .count() as u64;

        let (sender, receiver) = mpsc::sync_channel(LINE_BUFFER_SIZE);
        let worker_path = path.clone();
        let worker = thread::Builder::new()
            .name("stl-player".to_owned())
            .spawn(move || parse_lines(&lines, trace_type, default_burst_bytes, storage_enabled, &sender))
            .map_err(|source| CliError::Io { path: worker_path, source })?;

        Ok(Self { receiver, _worker: worker, total_requests, path, pending_trigger: 0, error: None })
    }

    /// Takes the fatal trace error, if the player hit a malformed line
    /// (spec §6.2: "malformed lines are fatal"). The CLI driver checks this
    /// whenever `next_request` returns [`Request::Stop`] before
    /// `total_requests` requests have been issued, to distinguish a
    /// clean end-of-trace from a parse failure.
    pub fn take_error(&mut self) -> Option<CliError> {
        self.error.take()
    }
}

impl Initiator for StlPlayer {
    fn next_request(&mut self) -> Request {
        match self.receiver.recv() {
            Ok(Ok(parsed)) => {
                self.pending_trigger = parsed.delay;
                parsed.request
            }
            Ok(Err(trace_error)) => {
                self.error =
                    Some(CliError::Trace { path: self.path.clone(), line: trace_error.line, reason: trace_error.reason });
                Request::Stop
            }
            Err(_disconnected) => Request::Stop,
        }
    }

    fn next_trigger(&self) -> Cycles {
        self.pending_trigger
    }

    fn total_requests(&self) -> u64 {
        self.total_requests
    }
}

fn parse_lines(
    lines: &[String],
    trace_type: TraceType,
    default_burst_bytes: u32,
    storage_enabled: bool,
    sender: &SyncSender<Result<ParsedLine, TraceLineError>>,
) {
    let mut previous_cycle: u64 = 0;
    for (index, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed, default_burst_bytes, storage_enabled) {
            Ok((cycle, request)) => {
                let delay = match trace_type {
                    TraceType::Absolute => cycle.saturating_sub(previous_cycle),
                    TraceType::Relative => cycle,
                };
                previous_cycle = match trace_type {
                    TraceType::Absolute => cycle,
                    TraceType::Relative => previous_cycle + cycle,
                };
                if sender.send(Ok(ParsedLine { request, delay })).is_err() {
                    return;
                }
            }
            Err(reason) => {
                let _ignored = sender.send(Err(TraceLineError { line: index + 1, reason }));
                return;
            }
        }
    }
}

fn parse_line(line: &str, default_burst_bytes: u32, storage_enabled: bool) -> Result<(u64, Request), String> {
    let mut tokens = line.split_whitespace();

    let cycle_tok = tokens.next().ok_or("missing cycle field")?;
    let cycle: u64 = cycle_tok.parse().map_err(|_| format!("invalid cycle '{cycle_tok}'"))?;

    let mut command_tok = tokens.next().ok_or("missing command field")?;
    let mut burst_bytes = default_burst_bytes;
    if let Some(inner) = command_tok.strip_prefix('(') {
        let inner = inner.strip_suffix(')').unwrap_or(inner);
        burst_bytes = inner.parse().map_err(|_| format!("invalid burst-byte override '{command_tok}'"))?;
        command_tok = tokens.next().ok_or("missing command field")?;
    }

    let is_read = match command_tok {
        "read" => true,
        "write" => false,
        other => return Err(format!("unknown command '{other}', expected 'read' or 'write'")),
    };

    let addr_tok = tokens.next().ok_or("missing address field")?;
    let address = parse_hex_u64(addr_tok)?;

    let data = if is_read || !storage_enabled {
        None
    } else {
        let data_tok = tokens.next().ok_or("missing data field for stored write")?;
        let expected_len = burst_bytes as usize * 2 + 2;
        if data_tok.len() != expected_len || !data_tok.starts_with("0x") {
            return Err(format!(
                "data field '{data_tok}' does not match expected length {expected_len} for a {burst_bytes}-byte burst"
            ));
        }
        Some(parse_hex_bytes(data_tok)?)
    };

    let request = if is_read {
        Request::Read { address, length: burst_bytes }
    } else {
        Request::Write { address, length: burst_bytes, data }
    };

    Ok((cycle, request))
}

fn parse_hex_u64(token: &str) -> Result<u64, String> {
    let digits = token.strip_prefix("0x").ok_or_else(|| format!("address '{token}' is not hex (expected 0x...)"))?;
    u64::from_str_radix(digits, 16).map_err(|_| format!("invalid hex address '{token}'"))
}

fn parse_hex_bytes(token: &str) -> Result<Vec<u8>, String> {
    let digits = token.strip_prefix("0x").ok_or_else(|| format!("data '{token}' is not hex (expected 0x...)"))?;
    if digits.len() % 2 != 0 {
        return Err(format!("data '{token}' has an odd number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| format!("invalid hex byte in '{token}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_read_line_with_default_burst() {
        let (cycle, request) = parse_line("100 read 0x1000", 64, false).unwrap();
        assert_eq!(cycle, 100);
        assert_eq!(request, Request::Read { address: 0x1000, length: 64 });
    }

    #[test]
    fn parses_a_burst_override_and_write_with_data() {
        let (cycle, request) = parse_line("5 (8) write 0x2000 0x0102030405060708", 64, true).unwrap();
        assert_eq!(cycle, 5);
        assert_eq!(
            request,
            Request::Write { address: 0x2000, length: 8, data: Some(vec![1, 2, 3, 4, 5, 6, 7, 8]) }
        );
    }

    #[test]
    fn write_without_storage_enabled_ignores_any_data_field() {
        let (_, request) = parse_line("5 write 0x2000", 64, false).unwrap();
        assert_eq!(request, Request::Write { address: 0x2000, length: 64, data: None });
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_line("0 frobnicate 0x0", 64, false).is_err());
    }

    #[test]
    fn rejects_malformed_hex_addresses() {
        assert!(parse_line("0 read 1000", 64, false).is_err());
    }

    #[test]
    fn rejects_data_field_of_the_wrong_length() {
        assert!(parse_line("0 (4) write 0x0 0xabcd", 64, true).is_err());
    }

    #[test]
    fn absolute_trace_deltas_are_computed_between_consecutive_lines() {
        let lines = vec!["10 read 0x0".to_owned(), "25 read 0x40".to_owned(), "25 read 0x80".to_owned()];
        let (sender, receiver) = mpsc::sync_channel(8);
        parse_lines(&lines, TraceType::Absolute, 64, false, &sender);
        drop(sender);
        let delays: Vec<Cycles> = receiver.into_iter().map(|r| r.unwrap().delay).collect();
        assert_eq!(delays, vec![10, 15, 0]);
    }

    #[test]
    fn relative_trace_deltas_pass_through_unchanged() {
        let lines = vec!["10 read 0x0".to_owned(), "15 read 0x40".to_owned()];
        let (sender, receiver) = mpsc::sync_channel(8);
        parse_lines(&lines, TraceType::Relative, 64, false, &sender);
        drop(sender);
        let delays: Vec<Cycles> = receiver.into_iter().map(|r| r.unwrap().delay).collect();
        assert_eq!(delays, vec![10, 15]);
    }

    #[test]
    fn open_reads_a_real_file_and_drives_next_request_end_to_end() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".stl").tempfile().unwrap();
        writeln!(file, "# header comment").unwrap();
        writeln!(file, "0 read 0x1000").unwrap();
        writeln!(file, "10 write 0x2000").unwrap();
        file.flush().unwrap();

        let mut player = StlPlayer::open(file.path(), 64, false).unwrap();
        assert_eq!(player.total_requests(), 2);

        assert_eq!(player.next_request(), Request::Read { address: 0x1000, length: 64 });
        assert_eq!(player.next_trigger(), 0);

        assert_eq!(player.next_request(), Request::Write { address: 0x2000, length: 64, data: None });
        assert_eq!(player.next_trigger(), 10);

        assert_eq!(player.next_request(), Request::Stop);
        assert!(player.take_error().is_none());
    }

    #[test]
    fn a_malformed_line_reports_its_one_based_line_number_and_stops() {
        let lines = vec!["# comment".to_owned(), "0 read 0x0".to_owned(), "not a cycle".to_owned()];
        let (sender, receiver) = mpsc::sync_channel(8);
        parse_lines(&lines, TraceType::Absolute, 64, false, &sender);
        drop(sender);
        let results: Vec<_> = receiver.into_iter().collect();
        assert!(results[0].is_ok());
        assert!(matches!(&results[1], Err(e) if e.line == 3));
    }
}
