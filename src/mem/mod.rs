//! The tiered memory hierarchy.
//!
//! Requests route through the first applicable tier: the DTCM
//! scratchpad window, then the LRU cache, then a memory bank reached
//! over the shared interconnect. Only latency is modeled; no data
//! moves. Contention at the banks and the interconnect is tracked in
//! counters; per-request completion times are computed
//! deterministically when the request is routed.

pub mod bank;
pub mod cache;
pub mod dtcm;
pub mod interconnect;
pub mod system;

pub use system::MemorySystem;

use crate::workload::Access;
use crate::{CoreId, InstanceId};

/// Granule of cache and bank addressing, and the default transfer
/// payload on the interconnect.
pub const LINE_BYTES: u32 = 64;

/// A memory request as issued by a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRequest {
    pub address: u64,
    pub access: Access,
    pub core: CoreId,
    pub instance: InstanceId,
}
