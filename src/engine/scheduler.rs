//! Ready-set maintenance and instance-to-core matching.
//!
//! The scheduler keeps an insertion-ordered ready queue, a per-core
//! idle bitmap, and a round-robin cursor for core selection. The
//! configured policy governs which ready instance is dispatched next;
//! core selection is always the round-robin scan.

use std::collections::VecDeque;

use crate::config::SchedulingPolicy;
use crate::error::{Result, SimError};
use crate::workload::TaskGraph;
use crate::{CoreId, Cycle, InstanceId};

/// Policy-driven ready queue plus core occupancy tracking.
#[derive(Debug)]
pub struct Scheduler {
    policy: SchedulingPolicy,
    ready: VecDeque<InstanceId>,
    core_idle: Vec<bool>,
    /// Round-robin scan start for `select_idle_core`.
    next_core: usize,
}

impl Scheduler {
    pub fn new(policy: SchedulingPolicy, num_cores: usize) -> Self {
        Self {
            policy,
            ready: VecDeque::new(),
            core_idle: vec![true; num_cores],
            next_core: 0,
        }
    }

    /// Append an instance to the ready queue.
    pub fn add_ready(&mut self, instance: InstanceId) {
        self.ready.push_back(instance);
    }

    pub fn has_ready_instances(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Pick (and remove) the next instance under the configured policy.
    ///
    /// FIFO and RoundRobin both take the queue head; RoundRobin's
    /// rotation lives in core selection. ShortestOpsFirst picks the
    /// instance with the fewest remaining operations, earlier insertion
    /// winning ties.
    pub fn select_next_instance(&mut self, graph: &TaskGraph) -> Result<Option<InstanceId>> {
        match self.policy {
            SchedulingPolicy::Fifo | SchedulingPolicy::RoundRobin => {
                Ok(self.ready.pop_front())
            }
            SchedulingPolicy::ShortestOpsFirst => {
                let mut best_pos = 0;
                let mut best_remaining = usize::MAX;
                for (pos, instance) in self.ready.iter().enumerate() {
                    let remaining = graph.remaining_ops(*instance)?;
                    if remaining < best_remaining {
                        best_remaining = remaining;
                        best_pos = pos;
                    }
                }
                Ok(self.ready.remove(best_pos))
            }
        }
    }

    /// Scan for an idle core starting at the round-robin cursor; on a
    /// hit the cursor advances one past the chosen core.
    pub fn select_idle_core(&mut self) -> Option<CoreId> {
        let num_cores = self.core_idle.len();
        for offset in 0..num_cores {
            let core = (self.next_core + offset) % num_cores;
            if self.core_idle[core] {
                self.next_core = (core + 1) % num_cores;
                return Some(core);
            }
        }
        None
    }

    /// Mark `core` busy and stamp the instance's dispatch time.
    /// Dispatching to a busy core is a programming error.
    pub fn dispatch(
        &mut self,
        instance: InstanceId,
        core: CoreId,
        now: Cycle,
        graph: &mut TaskGraph,
    ) -> Result<()> {
        let idle = self
            .core_idle
            .get_mut(core)
            .ok_or_else(|| SimError::Invariant(format!("core id {} out of range", core)))?;
        if !*idle {
            return Err(SimError::Invariant(format!(
                "cannot dispatch instance {} to busy core {}",
                instance, core
            )));
        }
        *idle = false;
        graph.instance_mut(instance)?.dispatch_time = now;
        Ok(())
    }

    /// Mark `core` idle again.
    pub fn release_core(&mut self, core: CoreId) -> Result<()> {
        let idle = self
            .core_idle
            .get_mut(core)
            .ok_or_else(|| SimError::Invariant(format!("core id {} out of range", core)))?;
        *idle = true;
        Ok(())
    }

    pub fn is_core_idle(&self, core: CoreId) -> Result<bool> {
        self.core_idle
            .get(core)
            .copied()
            .ok_or_else(|| SimError::Invariant(format!("core id {} out of range", core)))
    }
}
