//! DRAM command set and its derived predicates.

use serde::{Deserialize, Serialize};

/// The closed set of commands the controller may issue to a bank, a
/// bank-group, a rank, or the whole channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// No operation; idle cycle on the command bus.
    Nop,
    /// Activate: opens a row in a bank.
    Act,
    /// Precharge one bank.
    Prepb,
    /// Precharge all banks.
    Preab,
    /// Read.
    Rd,
    /// Read with auto-precharge.
    Rda,
    /// Write.
    Wr,
    /// Write with auto-precharge.
    Wra,
    /// Masked write.
    Mwr,
    /// Masked write with auto-precharge.
    Mwra,
    /// Refresh, all banks.
    Refab,
    /// Refresh, one bank.
    Refpb,
    /// Refresh, pair of banks.
    Refp2b,
    /// Refresh, same bank across groups.
    Refsb,
    /// Refresh management, all banks (DDR5 row-hammer mitigation).
    Rfmab,
    /// Refresh management, one bank.
    Rfmpb,
    /// Power-down entry, active.
    Pdea,
    /// Power-down exit, active.
    Pdxa,
    /// Power-down entry, precharged.
    Pdep,
    /// Power-down exit, precharged.
    Pdxp,
    /// Self-refresh entry.
    Srefen,
    /// Self-refresh exit.
    Srefex,
}

impl Command {
    /// Total number of distinct commands; used to size per-command tables.
    pub const COUNT: usize = 22;

    /// Stable index into per-command tables (`[cmd as usize]`-style lookup
    /// without relying on discriminant values being contiguous forever).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// `true` for commands that open, close or otherwise control a row
    /// (the "RAS" side of the command bus on split-bus standards).
    #[must_use]
    pub const fn is_ras(self) -> bool {
        matches!(
            self,
            Command::Act
                | Command::Prepb
                | Command::Preab
                | Command::Refab
                | Command::Refpb
                | Command::Refp2b
                | Command::Refsb
                | Command::Rfmab
                | Command::Rfmpb
        )
    }

    /// `true` for commands that move data (the "CAS" side of a split bus).
    #[must_use]
    pub const fn is_cas(self) -> bool {
        matches!(
            self,
            Command::Rd
                | Command::Rda
                | Command::Wr
                | Command::Wra
                | Command::Mwr
                | Command::Mwra
        )
    }

    /// `true` for any refresh-family command.
    #[must_use]
    pub const fn is_refresh(self) -> bool {
        matches!(
            self,
            Command::Refab
                | Command::Refpb
                | Command::Refp2b
                | Command::Refsb
                | Command::Rfmab
                | Command::Rfmpb
        )
    }

    /// `true` for any precharge command (explicit or standalone).
    #[must_use]
    pub const fn is_precharge(self) -> bool {
        matches!(self, Command::Prepb | Command::Preab)
    }

    /// `true` for power-down / self-refresh entry and exit commands.
    #[must_use]
    pub const fn is_power_down(self) -> bool {
        matches!(
            self,
            Command::Pdea
                | Command::Pdxa
                | Command::Pdep
                | Command::Pdxp
                | Command::Srefen
                | Command::Srefex
        )
    }

    /// `true` for CAS commands that close their row after the data window.
    #[must_use]
    pub const fn is_auto_precharge(self) -> bool {
        matches!(self, Command::Rda | Command::Wra | Command::Mwra)
    }

    /// `true` for write-family CAS commands (`WR`/`WRA`/`MWR`/`MWRA`).
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Command::Wr | Command::Wra | Command::Mwr | Command::Mwra
        )
    }

    /// `true` for read-family CAS commands (`RD`/`RDA`).
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Command::Rd | Command::Rda)
    }

    /// The terminal, bank-releasing command a payload of this command type
    /// is issued as. Used by the `BankMachine` and response path to decide
    /// when a payload's data window has completed.
    #[must_use]
    pub const fn is_terminal_cas(self) -> bool {
        self.is_cas()
    }
}

/// The logical operation an [`crate::payload::Payload`] requests; distinct
/// from [`Command`], which is the wire-level command the controller issues
/// (a single `Write` payload might still surface as `WR` or `WRA`
/// depending on page policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Read request.
    Read,
    /// Write request.
    Write,
    /// Masked write request.
    MaskedWrite,
}

impl Operation {
    /// Maps this logical operation to its auto-precharge CAS command.
    #[must_use]
    pub const fn auto_precharge_command(self) -> Command {
        match self {
            Operation::Read => Command::Rda,
            Operation::Write => Command::Wra,
            Operation::MaskedWrite => Command::Mwra,
        }
    }

    /// Maps this logical operation to its plain (non-auto-precharge) CAS
    /// command.
    #[must_use]
    pub const fn plain_command(self) -> Command {
        match self {
            Operation::Read => Command::Rd,
            Operation::Write => Command::Wr,
            Operation::MaskedWrite => Command::Mwr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ras_cas_partition_is_total_and_disjoint_for_data_commands() {
        for cmd in [Command::Rd, Command::Rda, Command::Wr, Command::Wra] {
            assert!(cmd.is_cas());
            assert!(!cmd.is_ras());
        }
        for cmd in [Command::Act, Command::Prepb, Command::Preab] {
            assert!(cmd.is_ras());
            assert!(!cmd.is_cas());
        }
    }

    #[test]
    fn auto_precharge_commands_are_flagged() {
        assert!(Command::Rda.is_auto_precharge());
        assert!(Command::Wra.is_auto_precharge());
        assert!(Command::Mwra.is_auto_precharge());
        assert!(!Command::Rd.is_auto_precharge());
    }

    #[test]
    fn operation_maps_to_matching_command_family() {
        assert_eq!(Operation::Read.plain_command(), Command::Rd);
        assert_eq!(Operation::Read.auto_precharge_command(), Command::Rda);
        assert_eq!(Operation::Write.plain_command(), Command::Wr);
        assert_eq!(Operation::MaskedWrite.plain_command(), Command::Mwr);
    }
}
