//! Simulator configuration.
//!
//! Configuration is a single JSON document given on the command line.
//! Every key is optional; missing keys fall back to the defaults below.
//! After deserialization the config is finalized (chiplet maps are
//! computed) and validated; any violation is fatal.
//!
//! # Config File Format
//!
//! ```json
//! {
//!   "cores": 4,
//!   "chiplets": 2,
//!   "scheduling_policy": "fifo",
//!   "cache": { "enabled": true, "size_bytes": 32768, "hit_latency_cycles": 2, "port_limit": 2 },
//!   "dtcm": { "enabled": true, "base_address": "0x80000000", "size_bytes": 16384, "latency_cycles": 1 },
//!   "memory_banks": { "count": 4, "service_latency_cycles": 50,
//!                     "bank_index_function": "addr_mod_n",
//!                     "conflict_policy": "queue", "port_limit": 2 },
//!   "interconnect": { "topology": "bus", "base_latency_cycles": 10,
//!                     "link_width_bytes_per_cycle": 8 },
//!   "chiplet": { "remote_penalty_cycles": 20 },
//!   "frequency_ghz": 1.5
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::{Result, SimError};

/// Task-selection policy for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    /// Dispatch ready instances in arrival order.
    #[serde(rename = "fifo")]
    Fifo,
    /// Arrival order for instances, round-robin over cores.
    #[serde(rename = "round_robin", alias = "roundrobin")]
    RoundRobin,
    /// Fewest remaining operations first; arrival order breaks ties.
    #[serde(rename = "shortest_ops_first", alias = "shortestopsfirst")]
    ShortestOpsFirst,
}

/// Address-to-bank mapping function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankIndexFunction {
    /// `(address >> 6) mod num_banks` (64-byte line granularity).
    #[serde(rename = "addr_mod_n", alias = "addressmodn")]
    AddrModN,
    /// `(address ^ (address >> 16)) mod num_banks`.
    #[serde(rename = "xor_fold", alias = "xorfold")]
    XorFold,
}

/// How a bank reacts to a request arriving while it is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankConflictPolicy {
    /// One request at a time; later arrivals wait in the queue.
    #[serde(rename = "serialize")]
    Serialize,
    /// Up to `port_limit` requests serviced in parallel.
    #[serde(rename = "queue")]
    Queue,
    /// Always service, adding a fixed penalty when busy.
    #[serde(rename = "extra_delay", alias = "extradelay")]
    ExtraDelay,
}

/// Interconnect topology. Reported in configuration; both variants use
/// the same latency formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterconnectTopology {
    #[serde(rename = "bus")]
    Bus,
    #[serde(rename = "mesh")]
    Mesh,
}

/// Cache section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Capacity in bytes; the cache tracks `size_bytes / 64` lines.
    pub size_bytes: u64,
    pub hit_latency_cycles: u32,
    /// Maximum concurrent accesses (0 = unlimited at the model level;
    /// validation requires a positive value when the cache is enabled).
    pub port_limit: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_bytes: 0,
            hit_latency_cycles: 0,
            port_limit: 1,
        }
    }
}

/// DTCM (scratchpad) section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DtcmConfig {
    pub enabled: bool,
    /// Base of the scratchpad window, written as a hex string ("0x...").
    #[serde(deserialize_with = "de_hex_address")]
    pub base_address: u64,
    pub size_bytes: u64,
    pub latency_cycles: u32,
}

impl Default for DtcmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_address: 0,
            size_bytes: 0,
            latency_cycles: 0,
        }
    }
}

/// Banked main-memory section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBankConfig {
    pub count: u32,
    pub service_latency_cycles: u32,
    pub bank_index_function: BankIndexFunction,
    pub conflict_policy: BankConflictPolicy,
    pub port_limit: u32,
}

impl Default for MemoryBankConfig {
    fn default() -> Self {
        Self {
            count: 1,
            service_latency_cycles: 0,
            bank_index_function: BankIndexFunction::AddrModN,
            conflict_policy: BankConflictPolicy::Serialize,
            port_limit: 1,
        }
    }
}

/// Interconnect section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterconnectConfig {
    pub topology: InterconnectTopology,
    pub base_latency_cycles: u32,
    pub link_width_bytes_per_cycle: u32,
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        Self {
            topology: InterconnectTopology::Bus,
            base_latency_cycles: 0,
            link_width_bytes_per_cycle: 8,
        }
    }
}

/// Chiplet locality section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipletConfig {
    /// Additional cycles for transfers that cross chiplets.
    pub remote_penalty_cycles: u32,
}

impl Default for ChipletConfig {
    fn default() -> Self {
        Self {
            remote_penalty_cycles: 0,
        }
    }
}

/// Validated simulator configuration.
///
/// Read-only after [`Config::from_file`] returns. The chiplet maps are
/// computed deterministically: core `i` and bank `i` live on chiplet
/// `i mod chiplets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cores: u32,
    pub chiplets: u32,
    pub scheduling_policy: SchedulingPolicy,
    pub cache: CacheConfig,
    pub dtcm: DtcmConfig,
    pub memory_banks: MemoryBankConfig,
    pub interconnect: InterconnectConfig,
    pub chiplet: ChipletConfig,
    pub frequency_ghz: f64,

    /// core id -> chiplet id, computed in `finalize`.
    #[serde(skip)]
    core_to_chiplet: Vec<u32>,
    /// bank id -> chiplet id, computed in `finalize`.
    #[serde(skip)]
    bank_to_chiplet: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cores: 1,
            chiplets: 1,
            scheduling_policy: SchedulingPolicy::Fifo,
            cache: CacheConfig::default(),
            dtcm: DtcmConfig::default(),
            memory_banks: MemoryBankConfig::default(),
            interconnect: InterconnectConfig::default(),
            chiplet: ChipletConfig::default(),
            frequency_ghz: 1.0,
            core_to_chiplet: Vec::new(),
            bank_to_chiplet: Vec::new(),
        }
    }
}

impl Config {
    /// Load, finalize, and validate a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&content)
            .map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))?;
        config.finalize();
        config.validate()?;
        log::debug!("loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Parse a configuration from a JSON string (not yet finalized or
    /// validated).
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Compute the deterministic chiplet maps.
    pub fn finalize(&mut self) {
        self.core_to_chiplet = (0..self.cores).map(|i| i % self.chiplets).collect();
        self.bank_to_chiplet = (0..self.memory_banks.count)
            .map(|i| i % self.chiplets)
            .collect();
    }

    /// Enforce the numeric constraints. Any violation is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.cores == 0 {
            return Err(SimError::Config("number of cores must be positive".into()));
        }
        if self.chiplets == 0 {
            return Err(SimError::Config(
                "number of chiplets must be positive".into(),
            ));
        }
        if self.memory_banks.count == 0 {
            return Err(SimError::Config(
                "number of memory banks must be positive".into(),
            ));
        }
        if self.cache.enabled {
            if self.cache.size_bytes == 0 {
                return Err(SimError::Config(
                    "cache size must be positive when cache is enabled".into(),
                ));
            }
            if self.cache.port_limit == 0 {
                return Err(SimError::Config(
                    "cache port limit must be positive".into(),
                ));
            }
        }
        if self.dtcm.enabled && self.dtcm.size_bytes == 0 {
            return Err(SimError::Config(
                "DTCM size must be positive when DTCM is enabled".into(),
            ));
        }
        if self.memory_banks.port_limit == 0 {
            return Err(SimError::Config("bank port limit must be positive".into()));
        }
        if self.interconnect.link_width_bytes_per_cycle == 0 {
            return Err(SimError::Config(
                "interconnect link width must be positive".into(),
            ));
        }
        if !(self.frequency_ghz > 0.0) {
            return Err(SimError::Config("frequency must be positive".into()));
        }
        Ok(())
    }

    /// Chiplet hosting the given core.
    pub fn core_chiplet(&self, core_id: usize) -> Result<u32> {
        self.core_to_chiplet.get(core_id).copied().ok_or_else(|| {
            SimError::Invariant(format!("core id {} out of range", core_id))
        })
    }

    /// Chiplet hosting the given bank.
    pub fn bank_chiplet(&self, bank_id: usize) -> Result<u32> {
        self.bank_to_chiplet.get(bank_id).copied().ok_or_else(|| {
            SimError::Invariant(format!("bank id {} out of range", bank_id))
        })
    }
}

/// Deserialize a `"0x..."` hex string into an address.
fn de_hex_address<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16)
        .map_err(|_| serde::de::Error::custom(format!("invalid hex address: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalized(content: &str) -> Config {
        let mut config = Config::from_json(content).expect("config should parse");
        config.finalize();
        config.validate().expect("config should validate");
        config
    }

    #[test]
    fn test_defaults() {
        let config = finalized("{}");
        assert_eq!(config.cores, 1);
        assert_eq!(config.chiplets, 1);
        assert_eq!(config.scheduling_policy, SchedulingPolicy::Fifo);
        assert!(!config.cache.enabled);
        assert!(!config.dtcm.enabled);
        assert_eq!(config.memory_banks.count, 1);
        assert_eq!(config.interconnect.link_width_bytes_per_cycle, 8);
        assert_eq!(config.frequency_ghz, 1.0);
    }

    #[test]
    fn test_full_document() {
        let config = finalized(
            r#"{
                "cores": 4,
                "chiplets": 2,
                "scheduling_policy": "round_robin",
                "cache": { "enabled": true, "size_bytes": 32768,
                           "hit_latency_cycles": 2, "port_limit": 2 },
                "dtcm": { "enabled": true, "base_address": "0x80000000",
                          "size_bytes": 16384, "latency_cycles": 1 },
                "memory_banks": { "count": 4, "service_latency_cycles": 50,
                                  "bank_index_function": "addr_mod_n",
                                  "conflict_policy": "queue", "port_limit": 2 },
                "interconnect": { "topology": "bus", "base_latency_cycles": 10,
                                  "link_width_bytes_per_cycle": 8 },
                "chiplet": { "remote_penalty_cycles": 20 },
                "frequency_ghz": 1.5
            }"#,
        );
        assert_eq!(config.cores, 4);
        assert_eq!(config.chiplets, 2);
        assert_eq!(config.scheduling_policy, SchedulingPolicy::RoundRobin);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.size_bytes, 32768);
        assert_eq!(config.dtcm.base_address, 0x8000_0000);
        assert_eq!(config.memory_banks.conflict_policy, BankConflictPolicy::Queue);
        assert_eq!(config.chiplet.remote_penalty_cycles, 20);
        assert_eq!(config.frequency_ghz, 1.5);
    }

    #[test]
    fn test_chiplet_maps_round_robin() {
        let config = finalized(r#"{ "cores": 4, "chiplets": 2, "memory_banks": { "count": 3 } }"#);
        assert_eq!(config.core_chiplet(0).unwrap(), 0);
        assert_eq!(config.core_chiplet(1).unwrap(), 1);
        assert_eq!(config.core_chiplet(2).unwrap(), 0);
        assert_eq!(config.core_chiplet(3).unwrap(), 1);
        assert_eq!(config.bank_chiplet(2).unwrap(), 0);
        assert!(config.core_chiplet(4).is_err());
        assert!(config.bank_chiplet(3).is_err());
    }

    #[test]
    fn test_unknown_enum_string_is_fatal() {
        assert!(Config::from_json(r#"{ "scheduling_policy": "lifo" }"#).is_err());
        assert!(Config::from_json(
            r#"{ "memory_banks": { "conflict_policy": "drop" } }"#
        )
        .is_err());
        assert!(Config::from_json(r#"{ "interconnect": { "topology": "torus" } }"#).is_err());
    }

    #[test]
    fn test_compact_aliases_accepted() {
        let config = finalized(
            r#"{ "scheduling_policy": "shortestopsfirst",
                 "memory_banks": { "bank_index_function": "xorfold",
                                   "conflict_policy": "extradelay" } }"#,
        );
        assert_eq!(
            config.scheduling_policy,
            SchedulingPolicy::ShortestOpsFirst
        );
        assert_eq!(
            config.memory_banks.bank_index_function,
            BankIndexFunction::XorFold
        );
        assert_eq!(
            config.memory_banks.conflict_policy,
            BankConflictPolicy::ExtraDelay
        );
    }

    #[test]
    fn test_bad_hex_address_is_fatal() {
        assert!(Config::from_json(r#"{ "dtcm": { "base_address": "0xZZ" } }"#).is_err());
        assert!(Config::from_json(r#"{ "dtcm": { "base_address": 42 } }"#).is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::from_json(r#"{ "cores": 0 }"#).unwrap();
        config.finalize();
        assert!(config.validate().is_err());

        let mut config =
            Config::from_json(r#"{ "cache": { "enabled": true, "size_bytes": 0 } }"#).unwrap();
        config.finalize();
        assert!(config.validate().is_err());

        let mut config = Config::from_json(r#"{ "frequency_ghz": 0.0 }"#).unwrap();
        config.finalize();
        assert!(config.validate().is_err());

        let mut config =
            Config::from_json(r#"{ "dtcm": { "enabled": true, "size_bytes": 0 } }"#).unwrap();
        config.finalize();
        assert!(config.validate().is_err());
    }
}
