//! Command multiplexing: choose one candidate command from everything the
//! `BankMachine`s, `RefreshManager` and `PowerDownManager` propose this
//! cycle.
//!
//! Grounded on `original_source/.../controller/cmdmux/CmdMuxOldest.cpp`.
//! `CmdMuxOldest::selectCommand` and `CmdMuxOldestRasCas::selectCommand`
//! both reduce a list to a single winner by comparing `(completion_time,
//! payload_id)` pairs lexicographically; `OldestRasCas` just runs that
//! reduction three times (RAS group, CAS group, then the two group
//! winners) instead of once.

use crate::command::Command;
use crate::config::CmdMuxPolicy;
use crate::payload::{Payload, PayloadId};

/// Which collaborator proposed a [`Candidate`], so the `Controller` knows
/// which component to notify (`BankMachine::on_issued`,
/// `RefreshManager::update`, `PowerDownManager::update`) once a winner is
/// chosen. The index is the same global bank index / rank index the
/// `Controller` already uses to address its `Vec`s of each collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Bank(usize),
    Refresh(u32),
    PowerDown(u32),
}

/// One command a `BankMachine`, `RefreshManager`, or `PowerDownManager`
/// would like issued this cycle, along with the earliest time the
/// `Checker` allows it and the channel-wide payload id used for tie
/// breaking (refresh/power-down candidates carry `None`).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub command: Command,
    pub earliest_time: u64,
    pub payload: Option<Payload>,
    /// Priority class for [`CmdMuxPolicy::Strict`]; lower issues first.
    /// Candidates from `BankMachine`s use `0`; refresh/power-down
    /// candidates are assigned their configured priority by the caller.
    pub priority: u8,
    /// Who proposed this candidate.
    pub source: CandidateSource,
}

impl Candidate {
    fn payload_id(&self) -> PayloadId {
        self.payload.as_ref().map_or(PayloadId::MAX, Payload::id)
    }

    fn completion_time(&self, command_length: u64) -> u64 {
        self.earliest_time + command_length
    }
}

/// Picks the winning candidate for this cycle, or `None` if nothing is
/// issuable at `now` (the `Controller` issues a `NOP` in that case).
#[derive(Debug)]
pub struct CmdMux {
    policy: CmdMuxPolicy,
}

impl CmdMux {
    #[must_use]
    pub const fn new(policy: CmdMuxPolicy) -> Self {
        Self { policy }
    }

    /// `command_length` maps a command to how many cycles it occupies its
    /// bus (the `Checker`/`MemSpec`'s notion of command duration), used for
    /// the `completion_time` tie-break exactly as the source computes it.
    #[must_use]
    pub fn select(
        &self,
        candidates: &[Candidate],
        now: u64,
        command_length: impl Fn(Command) -> u64,
    ) -> Option<Candidate> {
        let winner = match self.policy {
            CmdMuxPolicy::Oldest => Self::oldest_of(candidates, &command_length),
            CmdMuxPolicy::OldestRasCas => Self::oldest_ras_cas(candidates, &command_length),
            CmdMuxPolicy::Strict => Self::strict(candidates, &command_length),
        }?;

        if winner.earliest_time == now { Some(winner.clone()) } else { None }
    }

    fn oldest_of<'a>(candidates: &'a [Candidate], command_length: &impl Fn(Command) -> u64) -> Option<&'a Candidate> {
        candidates.iter().min_by_key(|c| (c.completion_time(command_length(c.command)), c.payload_id()))
    }

    fn oldest_ras_cas<'a>(candidates: &'a [Candidate], command_length: &impl Fn(Command) -> u64) -> Option<&'a Candidate> {
        let ras: Vec<&Candidate> = candidates.iter().filter(|c| c.command.is_ras()).collect();
        let cas: Vec<&Candidate> = candidates.iter().filter(|c| !c.command.is_ras()).collect();

        let ras_winner = ras.into_iter().min_by_key(|c| (c.completion_time(command_length(c.command)), c.payload_id()));
        let cas_winner = cas.into_iter().min_by_key(|c| (c.completion_time(command_length(c.command)), c.payload_id()));

        [ras_winner, cas_winner]
            .into_iter()
            .flatten()
            .min_by_key(|c| (c.earliest_time, c.payload_id()))
    }

    fn strict<'a>(candidates: &'a [Candidate], command_length: &impl Fn(Command) -> u64) -> Option<&'a Candidate> {
        let top_priority = candidates.iter().map(|c| c.priority).min()?;
        candidates
            .iter()
            .filter(|c| c.priority == top_priority)
            .min_by_key(|c| (c.completion_time(command_length(c.command)), c.payload_id()))
    }
}
