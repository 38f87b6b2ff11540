//! On-chip interconnect model.
//!
//! Latency for a transfer is
//! `base + ceil(data_size / link_width) + remote_penalty`, the last
//! term applying only when source and destination chiplets differ.
//! Arbitration is FIFO over the pending queue with one transfer in
//! flight at a time; `busy_until` tracks the current transfer and
//! `busy_cycles` accumulates utilization. Topology is reported in the
//! configuration; Bus and Mesh share the formula above.

use std::collections::VecDeque;

use crate::config::InterconnectTopology;
use crate::workload::Access;
use crate::{CoreId, Cycle, InstanceId};

/// A transfer waiting for the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub address: u64,
    pub access: Access,
    pub core: CoreId,
    pub instance: InstanceId,
    pub request_time: Cycle,
    pub src_chiplet: u32,
    pub dst_chiplet: u32,
    /// Payload size in bytes.
    pub data_size: u32,
}

/// Shared fabric connecting cores to memory banks.
#[derive(Debug)]
pub struct Interconnect {
    topology: InterconnectTopology,
    base_latency: u32,
    /// Bytes moved per cycle.
    link_width: u32,
    remote_penalty: u32,

    queue: VecDeque<TransferRequest>,
    busy: bool,
    busy_until: Cycle,

    total_transfers: u64,
    busy_cycles: u64,
}

impl Interconnect {
    pub fn new(
        topology: InterconnectTopology,
        base_latency: u32,
        link_width: u32,
        remote_penalty: u32,
    ) -> Self {
        Self {
            topology,
            base_latency,
            link_width,
            remote_penalty,
            queue: VecDeque::new(),
            busy: false,
            busy_until: 0,
            total_transfers: 0,
            busy_cycles: 0,
        }
    }

    pub fn topology(&self) -> InterconnectTopology {
        self.topology
    }

    /// Whether the fabric could start a transfer immediately.
    pub fn is_available(&self) -> bool {
        !self.busy && self.queue.is_empty()
    }

    /// Cycles for a transfer of `data_size` bytes between chiplets.
    pub fn latency(&self, src_chiplet: u32, dst_chiplet: u32, data_size: u32) -> Cycle {
        let mut latency = Cycle::from(self.base_latency);
        if self.link_width > 0 {
            let serialization = (data_size + self.link_width - 1) / self.link_width;
            latency += Cycle::from(serialization);
        }
        if src_chiplet != dst_chiplet {
            latency += Cycle::from(self.remote_penalty);
        }
        latency
    }

    /// Add a transfer to the pending queue.
    pub fn enqueue(&mut self, request: TransferRequest) {
        self.queue.push_back(request);
    }

    /// FIFO arbitration: start the next pending transfer at `now`.
    /// Returns its completion time, or `None` when nothing is pending
    /// (which also clears the busy state).
    pub fn arbitrate(&mut self, now: Cycle) -> Option<Cycle> {
        let request = match self.queue.pop_front() {
            Some(request) => request,
            None => {
                self.busy = false;
                self.busy_until = 0;
                return None;
            }
        };

        let latency = self.latency(request.src_chiplet, request.dst_chiplet, request.data_size);
        self.busy = true;
        self.busy_until = now + latency;
        self.total_transfers += 1;
        self.busy_cycles += latency;
        Some(self.busy_until)
    }

    pub fn has_queued_requests(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn busy_until(&self) -> Cycle {
        self.busy_until
    }

    pub fn total_transfers(&self) -> u64 {
        self.total_transfers
    }

    pub fn busy_cycles(&self) -> u64 {
        self.busy_cycles
    }
}
