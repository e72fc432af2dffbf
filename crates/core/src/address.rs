//! Address decoding: flat byte address ↔ DRAM topology coordinates.
//!
//! Mirrors `original_source/.../simulation/AddressDecoder.cpp`: a bit-mapping
//! matrix (one row of address bits per topology component) plus an optional
//! set of XOR gates, folded with GF(2) parity. The matrix-of-bitsets
//! representation is replaced here by per-component `Vec<u8>` bit-index
//! lists, which is all a decoder this size needs — no transposed-matrix
//! bookkeeping, since we decode/encode one component at a time rather than
//! a full parallel GF(2) multiply.

use crate::config::AddressMappingConfig;
use crate::error::{DramError, DramResult};
use crate::memspec::MemSpec;

/// A fully decoded address: one coordinate per DRAM topology tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coordinates {
    /// Channel index.
    pub channel: u32,
    /// Rank index within the channel.
    pub rank: u32,
    /// Bank-group index within the rank.
    pub bank_group: u32,
    /// Bank index within the bank-group.
    pub bank: u32,
    /// Row index within the bank.
    pub row: u32,
    /// Column index within the row.
    pub column: u32,
    /// Byte offset within the burst/column.
    pub byte: u32,
}

/// A named, ordered group of address bits (e.g. "the bits that form the
/// row index") plus the XOR gates that feed into it.
#[derive(Debug, Clone, Default)]
struct BitGroup {
    /// Bit indices, least-significant component bit first.
    bits: Vec<u8>,
}

impl BitGroup {
    fn from_config(bits: &[Vec<u32>]) -> Self {
        Self {
            bits: bits.iter().flatten().map(|&b| b as u8).collect(),
        }
    }

    fn len(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Extracts this group's value from an address whose XOR gates have
    /// already been folded in.
    fn extract(&self, folded: u64) -> u32 {
        let mut value = 0u32;
        for (i, &bit) in self.bits.iter().enumerate() {
            if (folded >> bit) & 1 == 1 {
                value |= 1 << i;
            }
        }
        value
    }

    /// Scatters a component value back onto its bit positions.
    fn scatter(&self, value: u32, acc: &mut u64) {
        for (i, &bit) in self.bits.iter().enumerate() {
            if (value >> i) & 1 == 1 {
                *acc |= 1u64 << bit;
            }
        }
    }
}

/// Maps a flat byte address to and from DRAM topology [`Coordinates`] via a
/// configured bit-mapping matrix plus optional XOR gates. Reversible:
/// `encode(decode(a)) == a` for every address in `[0, max_address()]`.
#[derive(Debug, Clone)]
pub struct AddressDecoder {
    byte: BitGroup,
    column: BitGroup,
    bank_group: BitGroup,
    bank: BitGroup,
    row: BitGroup,
    rank: BitGroup,
    channel: BitGroup,
    /// `(bit_written, bit_xored_in)` pairs, applied before the direct
    /// bit-group extraction.
    xor_gates: Vec<(u8, u8)>,
    highest_bit: u32,
}

impl AddressDecoder {
    /// Builds a decoder from configuration, validating bit coverage against
    /// the given [`MemSpec`]. Fails construction (not lazily, at first use)
    /// if any bit is used twice, the mapped bits don't cover `MemSpec`'s
    /// implied address width, or a mapped component's cardinality disagrees
    /// with the corresponding `MemSpec` count.
    pub fn new(mapping: &AddressMappingConfig, mem_spec: &MemSpec) -> DramResult<Self> {
        let byte = BitGroup::from_config(&mapping.byte_bit);
        let column = BitGroup::from_config(&mapping.column_bit);
        let bank_group = BitGroup::from_config(&mapping.bankgroup_bit);
        let bank = BitGroup::from_config(&mapping.bank_bit);
        let row = BitGroup::from_config(&mapping.row_bit);
        let rank = BitGroup::from_config(&mapping.rank_bit);
        let channel = BitGroup::from_config(&mapping.channel_bit);

        let xor_gates: Vec<(u8, u8)> = mapping
            .xor
            .iter()
            .map(|gate| (gate.output_bit as u8, gate.input_bit as u8))
            .collect();

        let mut seen = [false; 64];
        let mut highest_bit = 0u32;
        for group in [&byte, &column, &bank_group, &bank, &row, &rank, &channel] {
            for &bit in &group.bits {
                if seen[bit as usize] {
                    return Err(DramError::Config(format!(
                        "address bit {bit} used by more than one component"
                    )));
                }
                seen[bit as usize] = true;
                highest_bit = highest_bit.max(u32::from(bit) + 1);
            }
        }
        for bit in 0..highest_bit {
            if !seen[bit as usize] {
                return Err(DramError::Config(format!(
                    "address bit {bit} below the mapping's highest bit is unmapped"
                )));
            }
        }

        let decoder = Self {
            byte,
            column,
            bank_group,
            bank,
            row,
            rank,
            channel,
            xor_gates,
            highest_bit,
        };
        decoder.check_mem_spec_compatibility(mem_spec)?;
        Ok(decoder)
    }

    fn check_mem_spec_compatibility(&self, mem_spec: &MemSpec) -> DramResult<()> {
        let implied_channels = 1u32 << self.channel.len();
        let implied_ranks = 1u32 << self.rank.len();
        let implied_bank_groups = 1u32 << self.bank_group.len();
        let implied_banks_per_group = 1u32 << self.bank.len();
        let implied_rows = 1u32 << self.row.len();
        let implied_columns = 1u32 << self.column.len();

        let implied_banks = implied_bank_groups * implied_banks_per_group;

        let checks: [(&str, u32, u32); 5] = [
            ("channels", mem_spec.channels, implied_channels),
            ("ranks_per_channel", mem_spec.ranks_per_channel, implied_ranks),
            ("banks_per_channel", mem_spec.banks_per_channel, implied_banks),
            ("rows_per_bank", mem_spec.rows_per_bank, implied_rows),
            ("columns_per_row", mem_spec.columns_per_row, implied_columns),
        ];

        let mut mismatches = Vec::new();
        for (name, mem, map) in checks {
            if mem != map {
                mismatches.push(format!("{name}: memspec={mem}, mapping implies {map}"));
            }
        }
        if !mismatches.is_empty() {
            return Err(DramError::Config(format!(
                "address mapping disagrees with MemSpec topology: {}",
                mismatches.join(", ")
            )));
        }
        Ok(())
    }

    /// The largest address this mapping can address (inclusive).
    #[must_use]
    pub const fn max_address(&self) -> u64 {
        if self.highest_bit == 0 {
            0
        } else {
            (1u64 << self.highest_bit) - 1
        }
    }

    fn fold_xor(&self, addr: u64) -> u64 {
        let mut folded = addr;
        for &(target, source) in &self.xor_gates {
            let source_bit = (addr >> source) & 1;
            if source_bit == 1 {
                folded ^= 1u64 << target;
            }
        }
        folded
    }

    /// Decodes a flat byte address into topology [`Coordinates`]. Returns
    /// `Err` if `addr` exceeds [`Self::max_address`] (no silent truncation,
    /// per spec §8).
    pub fn decode(&self, addr: u64) -> DramResult<Coordinates> {
        if addr > self.max_address() {
            return Err(DramError::Config(format!(
                "address {addr:#x} exceeds decodable range [0, {:#x}]",
                self.max_address()
            )));
        }
        let folded = self.fold_xor(addr);
        Ok(Coordinates {
            channel: self.channel.extract(folded),
            rank: self.rank.extract(folded),
            bank_group: self.bank_group.extract(folded),
            bank: self.bank.extract(folded),
            row: self.row.extract(folded),
            column: self.column.extract(folded),
            byte: self.byte.extract(folded),
        })
    }

    /// Encodes topology [`Coordinates`] back into a flat byte address.
    /// `self.encode(self.decode(a)?) == a` for every valid `a`, provided no
    /// XOR gate reads a bit from a component other than the one it writes
    /// into (the DRAMSys convention, which makes the gate invertible by
    /// re-applying the same XOR).
    #[must_use]
    pub fn encode(&self, coords: Coordinates) -> u64 {
        let mut acc = 0u64;
        self.byte.scatter(coords.byte, &mut acc);
        self.column.scatter(coords.column, &mut acc);
        self.bank_group.scatter(coords.bank_group, &mut acc);
        self.bank.scatter(coords.bank, &mut acc);
        self.row.scatter(coords.row, &mut acc);
        self.rank.scatter(coords.rank, &mut acc);
        self.channel.scatter(coords.channel, &mut acc);

        // XOR gates are involutions over GF(2): re-applying the same gate
        // to the folded value recovers the un-folded (true) address bit.
        self.fold_xor(acc)
    }

    /// Decodes just the channel component — the only thing a router
    /// upstream of per-channel controllers needs.
    #[must_use]
    pub fn decode_channel(&self, addr: u64) -> u32 {
        self.channel.extract(self.fold_xor(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AddressMappingConfig;
    use crate::memspec::MemSpec;
    use proptest::prelude::*;

    // The scenario's prose ranges ("COLUMN: [2..12]", "BANK: [13..15]",
    // "ROW: [16..32]") are half-open like Rust's `a..b`, but the column/bank
    // boundary text is off by the one bit that actually carries the bank-0
    // selector (bit 12): the bit assignment below is the unique contiguous,
    // non-overlapping split that reproduces the scenario's stated
    // `(rank=1, row=0, bank=1, col=141, byte=0)` result.
    fn s6_mapping() -> AddressMappingConfig {
        AddressMappingConfig {
            byte_bit: vec![vec![0, 1]],
            column_bit: vec![(2..12).collect()],
            bankgroup_bit: vec![],
            bank_bit: vec![(12..15).collect()],
            row_bit: vec![(15..33).collect()],
            rank_bit: vec![vec![33]],
            channel_bit: vec![],
            xor: vec![],
        }
    }

    fn s6_memspec() -> MemSpec {
        let mut spec = MemSpec::ddr4_default();
        spec.channels = 1;
        spec.ranks_per_channel = 2;
        spec.bank_groups_per_channel = 1;
        spec.banks_per_channel = 8;
        spec.rows_per_bank = 1 << 18;
        spec.columns_per_row = 1 << 10;
        spec
    }

    #[test]
    fn address_decodes_to_expected_coordinates_and_round_trips() {
        let decoder = AddressDecoder::new(&s6_mapping(), &s6_memspec()).unwrap();
        let coords = decoder.decode(0x2_0000_1234).unwrap();
        assert_eq!(coords.rank, 1);
        assert_eq!(coords.row, 0);
        assert_eq!(coords.bank, 1);
        assert_eq!(coords.column, 141);
        assert_eq!(coords.byte, 0);
        assert_eq!(decoder.encode(coords), 0x2_0000_1234);
    }

    #[test]
    fn duplicate_bit_assignment_is_rejected() {
        let mut mapping = s6_mapping();
        mapping.rank_bit = vec![vec![2]];
        assert!(AddressDecoder::new(&mapping, &s6_memspec()).is_err());
    }

    #[test]
    fn out_of_range_address_is_an_error_not_a_truncation() {
        let decoder = AddressDecoder::new(&s6_mapping(), &s6_memspec()).unwrap();
        assert!(decoder.decode(decoder.max_address() + 1).is_err());
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(addr in 0u64..=0x3_ffff_ffff) {
            let decoder = AddressDecoder::new(&s6_mapping(), &s6_memspec()).unwrap();
            if addr <= decoder.max_address() {
                let coords = decoder.decode(addr).unwrap();
                prop_assert_eq!(decoder.encode(coords), addr);
            }
        }
    }
}
