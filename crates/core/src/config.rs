//! Configuration grammar for the controller: `MemSpec` selection and
//! overrides, address mapping, and per-component policy selection.
//!
//! Mirrors the layered structure of `original_source/.../Configuration.cpp`
//! (separate `McConfig`/`SimConfig` sections merged into one settings
//! object) using the teacher's `defaults` module + per-field
//! `#[serde(default = "...")]` idiom rather than a hand-rolled builder.

use serde::{Deserialize, Serialize};

use crate::error::{DramError, DramResult};
use crate::memspec::{MemSpec, MemoryType};

/// Default configuration constants, used when a JSON document omits a
/// field.
mod defaults {
    /// Default per-bank request buffer depth.
    pub const REQUEST_BUFFER_SIZE: usize = 8;
    /// Default low watermark for `GrpFrFcfsWm` (disabled: `0` means "use
    /// `GrpFrFcfs` semantics without hysteresis" is rejected at
    /// construction, so this is only a placeholder for non-watermark
    /// schedulers).
    pub const LOW_WATERMARK: usize = 2;
    /// Default high watermark for `GrpFrFcfsWm`.
    pub const HIGH_WATERMARK: usize = 6;
    /// Default postponed-refresh flexibility (in multiples of `tREFI`).
    pub const MAX_POSTPONED_REFRESHES: u32 = 8;
    /// Default pulled-in refresh flexibility.
    pub const MAX_PULLEDIN_REFRESHES: u32 = 8;
}

/// Row-buffer management policy for a [`crate::bank_machine::BankMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PagePolicy {
    /// Row stays open until a conflicting access forces a precharge.
    #[default]
    Open,
    /// Like `Open`, but precharges early when no further hit is queued.
    OpenAdaptive,
    /// Every access is auto-precharged; no row stays open across requests.
    Closed,
    /// Like `Closed`, but keeps the row open when a further hit is queued.
    ClosedAdaptive,
}

/// Arbitration policy for the [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SchedulerPolicy {
    /// Strict arrival order.
    #[default]
    Fifo,
    /// First-ready, first-come-first-served: row hits jump the per-bank
    /// queue.
    FrFcfs,
    /// `FrFcfs` with bank-group-aware hit detection.
    FrFcfsGrp,
    /// Grouped `FrFcfs` preferring a configured request direction.
    GrpFrFcfs,
    /// `GrpFrFcfs` with watermark-based read/write mode hysteresis.
    GrpFrFcfsWm,
}

/// Per-bank buffer accounting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BufferPolicy {
    /// One counter (and buffer budget) per bank.
    #[default]
    Bankwise,
    /// Bankwise counters split further into independent read/write
    /// budgets.
    ReadWrite,
    /// One counter shared across all banks in the channel.
    Shared,
}

/// Refresh granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RefreshPolicy {
    /// One `REFAB` per rank refreshes every bank at once.
    #[default]
    AllBank,
    /// Per-bank refresh, one bank refreshed per `REFPB`.
    PerBank,
    /// Refresh two banks per command.
    Per2Bank,
    /// Refresh the same bank index across all bank groups per command.
    SameBank,
}

/// Power-down entry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PowerDownPolicy {
    /// Never power down.
    #[default]
    NoPowerDown,
    /// Power down a rank once every bank on it has been idle for a
    /// configured number of cycles.
    Staggered,
}

/// Command bus arbitration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CmdMuxPolicy {
    /// Oldest ready command wins, tie-broken by lowest payload id.
    #[default]
    Oldest,
    /// Independent RAS/CAS oldest-wins tournaments, then a final
    /// tournament between the two winners.
    OldestRasCas,
    /// Fixed priority order (refresh > power-down > CAS > RAS).
    Strict,
}

/// Read completion ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResponseQueuePolicy {
    /// Responses leave in the order their commands completed.
    #[default]
    Fifo,
    /// Responses leave in request arrival order, buffering
    /// out-of-order completions.
    Reorder,
}

/// One XOR gate: folds `input_bit` into `output_bit` before bit-group
/// extraction (and is its own inverse when re-applied during encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XorGateConfig {
    /// Source bit read (but not modified).
    pub input_bit: u32,
    /// Destination bit XORed with `input_bit`'s value.
    pub output_bit: u32,
}

/// Address-bit-to-topology mapping, one bit-index list per component.
/// Deserializes directly from the configuration grammar's
/// `"AddressMapping"` section (spec §6.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMappingConfig {
    /// Bits forming the intra-burst byte offset.
    #[serde(default)]
    pub byte_bit: Vec<Vec<u32>>,
    /// Bits forming the column index.
    #[serde(default)]
    pub column_bit: Vec<Vec<u32>>,
    /// Bits forming the bank-group index.
    #[serde(default)]
    pub bankgroup_bit: Vec<Vec<u32>>,
    /// Bits forming the bank index (within its group).
    #[serde(default)]
    pub bank_bit: Vec<Vec<u32>>,
    /// Bits forming the row index.
    #[serde(default)]
    pub row_bit: Vec<Vec<u32>>,
    /// Bits forming the rank index.
    #[serde(default)]
    pub rank_bit: Vec<Vec<u32>>,
    /// Bits forming the channel index.
    #[serde(default)]
    pub channel_bit: Vec<Vec<u32>>,
    /// Optional XOR gates applied before extraction, to break up
    /// pathological striding patterns.
    #[serde(default)]
    pub xor: Vec<XorGateConfig>,
}

/// Controller-level policy selection and buffer sizing (spec §6.1
/// `"McConfig"` section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Per-bank (or channel-wide, depending on `buffer_policy`) request
    /// buffer depth. Used directly by `Bankwise` and `Shared`; `ReadWrite`
    /// uses `request_buffer_size_read`/`request_buffer_size_write` instead.
    #[serde(default = "ControllerConfig::default_request_buffer_size")]
    pub request_buffer_size: usize,
    /// Shared read-request pool depth, used only when `buffer_policy` is
    /// `ReadWrite`.
    #[serde(default = "ControllerConfig::default_request_buffer_size")]
    pub request_buffer_size_read: usize,
    /// Shared write-request pool depth, used only when `buffer_policy` is
    /// `ReadWrite`.
    #[serde(default = "ControllerConfig::default_request_buffer_size")]
    pub request_buffer_size_write: usize,
    /// Row-buffer management policy.
    #[serde(default)]
    pub page_policy: PagePolicy,
    /// Scheduler arbitration policy.
    #[serde(default)]
    pub scheduler_policy: SchedulerPolicy,
    /// Buffer accounting policy.
    #[serde(default)]
    pub buffer_policy: BufferPolicy,
    /// Refresh granularity.
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
    /// Power-down entry policy.
    #[serde(default)]
    pub power_down_policy: PowerDownPolicy,
    /// Command bus arbitration policy.
    #[serde(default)]
    pub cmd_mux_policy: CmdMuxPolicy,
    /// Read completion ordering policy.
    #[serde(default)]
    pub response_queue_policy: ResponseQueuePolicy,
    /// `GrpFrFcfsWm` low watermark: below this many pending writes (with
    /// reads pending), the scheduler drops out of write mode. Must be `0`
    /// (meaning "unused") unless `scheduler_policy` is `GrpFrFcfsWm`.
    #[serde(default = "ControllerConfig::default_low_watermark")]
    pub low_watermark: usize,
    /// `GrpFrFcfsWm` high watermark: above this many pending writes, the
    /// scheduler enters write mode.
    #[serde(default = "ControllerConfig::default_high_watermark")]
    pub high_watermark: usize,
    /// Maximum number of consecutive refreshes the `RefreshManager` may
    /// postpone before forcing one through.
    #[serde(default = "ControllerConfig::default_max_postponed_refreshes")]
    pub max_postponed_refreshes: u32,
    /// Maximum number of refreshes the `RefreshManager` may pull in ahead
    /// of schedule.
    #[serde(default = "ControllerConfig::default_max_pulledin_refreshes")]
    pub max_pulledin_refreshes: u32,
}

impl ControllerConfig {
    fn default_request_buffer_size() -> usize {
        defaults::REQUEST_BUFFER_SIZE
    }
    fn default_low_watermark() -> usize {
        defaults::LOW_WATERMARK
    }
    fn default_high_watermark() -> usize {
        defaults::HIGH_WATERMARK
    }
    fn default_max_postponed_refreshes() -> u32 {
        defaults::MAX_POSTPONED_REFRESHES
    }
    fn default_max_pulledin_refreshes() -> u32 {
        defaults::MAX_PULLEDIN_REFRESHES
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            request_buffer_size: defaults::REQUEST_BUFFER_SIZE,
            request_buffer_size_read: defaults::REQUEST_BUFFER_SIZE,
            request_buffer_size_write: defaults::REQUEST_BUFFER_SIZE,
            page_policy: PagePolicy::default(),
            scheduler_policy: SchedulerPolicy::default(),
            buffer_policy: BufferPolicy::default(),
            refresh_policy: RefreshPolicy::default(),
            power_down_policy: PowerDownPolicy::default(),
            cmd_mux_policy: CmdMuxPolicy::default(),
            response_queue_policy: ResponseQueuePolicy::default(),
            low_watermark: defaults::LOW_WATERMARK,
            high_watermark: defaults::HIGH_WATERMARK,
            max_postponed_refreshes: defaults::MAX_POSTPONED_REFRESHES,
            max_pulledin_refreshes: defaults::MAX_PULLEDIN_REFRESHES,
        }
    }
}

/// Root configuration document (spec §6.1).
///
/// # Examples
///
/// ```
/// use dramsys_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.controller.request_buffer_size, 8);
/// ```
///
/// Deserializing a minimal override document:
///
/// ```
/// use dramsys_core::config::Config;
///
/// let json = r#"{
///     "memoryType": "DDR4",
///     "addressMapping": {
///         "byteBit": [[0, 1]],
///         "columnBit": [[2,3,4,5,6,7,8,9,10,11,12]],
///         "bankBit": [[13,14,15,16]],
///         "rowBit": [[17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32,33]],
///         "rankBit": [[34]]
///     },
///     "controller": {
///         "schedulerPolicy": "FrFcfsGrp"
///     }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.controller.scheduler_policy, dramsys_core::config::SchedulerPolicy::FrFcfsGrp);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Which JEDEC family preset to start `mem_spec` from.
    #[serde(default = "Config::default_memory_type")]
    pub memory_type: MemoryType,
    /// Full timing/topology parameters. Defaults to `MemSpec::preset(memory_type)`;
    /// callers that want per-field overrides deserialize a partial document
    /// and merge, since `MemSpec` has no serde defaults of its own (every
    /// field is standard-mandated, not optional).
    #[serde(default = "Config::default_mem_spec")]
    pub mem_spec: MemSpec,
    /// Address-bit-to-topology mapping.
    #[serde(default)]
    pub address_mapping: AddressMappingConfig,
    /// Controller policy selection and buffer sizing.
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl Config {
    fn default_memory_type() -> MemoryType {
        MemoryType::Ddr4
    }

    fn default_mem_spec() -> MemSpec {
        MemSpec::preset(MemoryType::Ddr4)
    }

    /// Fatal-at-construction checks that aren't expressible through `serde`
    /// alone: contradictory watermarks (mirrors
    /// `SchedulerGrpFrFcfsWm`'s `SC_REPORT_FATAL` check) and a
    /// `memory_type`/`mem_spec` pairing that doesn't support the standard's
    /// refresh-management field when requested.
    pub fn validate(&self) -> DramResult<()> {
        if self.controller.scheduler_policy == SchedulerPolicy::GrpFrFcfsWm {
            let low = self.controller.low_watermark;
            let high = self.controller.high_watermark;
            if low == 0 || high == 0 || low == high {
                return Err(DramError::Config(format!(
                    "invalid watermark configuration for GrpFrFcfsWm: low={low}, high={high} \
                     (both must be non-zero and low < high)"
                )));
            } else if low > high {
                return Err(DramError::Config(format!(
                    "low_watermark ({low}) must be less than high_watermark ({high})"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_type: MemoryType::Ddr4,
            mem_spec: MemSpec::preset(MemoryType::Ddr4),
            address_mapping: AddressMappingConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.controller.request_buffer_size, config.controller.request_buffer_size);
    }

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let json = r#"{"controller": {"schedulerPolicy": "GrpFrFcfsWm", "lowWatermark": 2, "highWatermark": 6}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.controller.scheduler_policy, SchedulerPolicy::GrpFrFcfsWm);
        assert_eq!(config.controller.request_buffer_size, 8);
    }

    #[test]
    fn equal_watermarks_are_rejected_for_grp_fr_fcfs_wm() {
        let mut config = Config::default();
        config.controller.scheduler_policy = SchedulerPolicy::GrpFrFcfsWm;
        config.controller.low_watermark = 4;
        config.controller.high_watermark = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn ordered_watermarks_pass_validation() {
        let mut config = Config::default();
        config.controller.scheduler_policy = SchedulerPolicy::GrpFrFcfsWm;
        config.controller.low_watermark = 4;
        config.controller.high_watermark = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_watermark_scheduler_skips_watermark_validation() {
        let config = Config::default();
        assert_eq!(config.controller.scheduler_policy, SchedulerPolicy::Fifo);
        assert!(config.validate().is_ok());
    }
}
