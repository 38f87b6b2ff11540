//! Simulation statistics: collection, text report, and the structured
//! `stats.json` document.
//!
//! The collector is fed three ways: every popped event is mirrored to
//! [`StatsCollector::on_event`]; the memory system records tier
//! outcomes and conflicts as it routes requests; and at termination
//! the orchestrator fans component counters (interconnect busy cycles,
//! final cycle count) into the collector before rendering.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::engine::event::{Event, EventKind};
use crate::error::Result;
use crate::{CoreId, Cycle, InstanceId};

/// Which tier serviced a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTier {
    Dtcm,
    Cache,
    /// Bank path: counted as a cache miss and a main-memory access.
    MainMemory,
}

/// What kind of structural conflict occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Bank,
    CachePort,
    BankPort,
}

/// Accumulates per-run metrics.
#[derive(Debug)]
pub struct StatsCollector {
    total_cycles: Cycle,

    core_busy_cycles: Vec<Cycle>,
    core_busy_start: Vec<Cycle>,

    task_ready_times: HashMap<InstanceId, Cycle>,
    task_dispatch_times: HashMap<InstanceId, Cycle>,
    /// Ready-to-done durations, one per completed instance.
    task_latencies: Vec<Cycle>,
    /// Ready-to-dispatch durations.
    task_waits: Vec<Cycle>,

    dtcm_hits: u64,
    cache_hits: u64,
    cache_misses: u64,
    main_memory_accesses: u64,

    interconnect_busy_cycles: u64,

    bank_conflicts: u64,
    cache_port_conflicts: u64,
    bank_port_conflicts: u64,
    intra_chiplet_conflicts: u64,
    inter_chiplet_conflicts: u64,
}

impl StatsCollector {
    pub fn new(num_cores: usize) -> Self {
        Self {
            total_cycles: 0,
            core_busy_cycles: vec![0; num_cores],
            core_busy_start: vec![0; num_cores],
            task_ready_times: HashMap::new(),
            task_dispatch_times: HashMap::new(),
            task_latencies: Vec::new(),
            task_waits: Vec::new(),
            dtcm_hits: 0,
            cache_hits: 0,
            cache_misses: 0,
            main_memory_accesses: 0,
            interconnect_busy_cycles: 0,
            bank_conflicts: 0,
            cache_port_conflicts: 0,
            bank_port_conflicts: 0,
            intra_chiplet_conflicts: 0,
            inter_chiplet_conflicts: 0,
        }
    }

    /// Mirror of the main loop: every popped event lands here after
    /// its handler runs.
    pub fn on_event(&mut self, event: &Event, now: Cycle) {
        match event.kind {
            EventKind::TaskReady { instance } => self.record_task_ready(instance, now),
            EventKind::TaskDispatched { core, instance } => {
                self.record_task_dispatched(instance, now);
                self.record_core_busy(core, now);
            }
            EventKind::TaskDone { core, instance } => {
                self.record_task_done(instance, now);
                self.record_core_idle(core, now);
            }
            EventKind::ComputeDone { .. }
            | EventKind::MemReqIssued { .. }
            | EventKind::MemRespDone { .. } => {}
        }
    }

    pub fn record_task_ready(&mut self, instance: InstanceId, time: Cycle) {
        self.task_ready_times.insert(instance, time);
    }

    pub fn record_task_dispatched(&mut self, instance: InstanceId, time: Cycle) {
        self.task_dispatch_times.insert(instance, time);
        if let Some(ready) = self.task_ready_times.get(&instance) {
            self.task_waits.push(time - ready);
        }
    }

    pub fn record_task_done(&mut self, instance: InstanceId, time: Cycle) {
        if let Some(ready) = self.task_ready_times.get(&instance) {
            self.task_latencies.push(time - ready);
        }
    }

    pub fn record_core_busy(&mut self, core: CoreId, start: Cycle) {
        if let Some(slot) = self.core_busy_start.get_mut(core) {
            *slot = start;
        }
    }

    pub fn record_core_idle(&mut self, core: CoreId, end: Cycle) {
        if core < self.core_busy_cycles.len() {
            self.core_busy_cycles[core] += end - self.core_busy_start[core];
        }
    }

    pub fn record_memory_access(&mut self, tier: MemoryTier) {
        match tier {
            MemoryTier::Dtcm => self.dtcm_hits += 1,
            MemoryTier::Cache => self.cache_hits += 1,
            MemoryTier::MainMemory => {
                self.cache_misses += 1;
                self.main_memory_accesses += 1;
            }
        }
    }

    /// Record a structural conflict, classified by whether the
    /// requester's chiplet differs from the resource's.
    pub fn record_conflict(&mut self, kind: ConflictKind, inter_chiplet: bool) {
        match kind {
            ConflictKind::Bank => self.bank_conflicts += 1,
            ConflictKind::CachePort => self.cache_port_conflicts += 1,
            ConflictKind::BankPort => self.bank_port_conflicts += 1,
        }
        if inter_chiplet {
            self.inter_chiplet_conflicts += 1;
        } else {
            self.intra_chiplet_conflicts += 1;
        }
    }

    pub fn set_interconnect_busy_cycles(&mut self, cycles: u64) {
        self.interconnect_busy_cycles = cycles;
    }

    /// Final cycle count; the reported makespan.
    pub fn set_total_cycles(&mut self, cycles: Cycle) {
        self.total_cycles = cycles;
    }

    pub fn total_cycles(&self) -> Cycle {
        self.total_cycles
    }

    pub fn tasks_completed(&self) -> usize {
        self.task_latencies.len()
    }

    pub fn dtcm_hits(&self) -> u64 {
        self.dtcm_hits
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    /// Assemble the structured document.
    pub fn report(&self, frequency_ghz: f64) -> StatsReport {
        let makespan = self.total_cycles;
        let num_cores = self.core_busy_cycles.len();

        let utilization = |busy: Cycle| -> f64 {
            if makespan > 0 {
                busy as f64 / makespan as f64
            } else {
                0.0
            }
        };
        let average = |values: &[Cycle]| -> f64 {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<Cycle>() as f64 / values.len() as f64
            }
        };

        let total_busy: Cycle = self.core_busy_cycles.iter().sum();
        let avg_core_utilization = if num_cores > 0 && makespan > 0 {
            total_busy as f64 / (num_cores as u64 * makespan) as f64
        } else {
            0.0
        };

        StatsReport {
            makespan_cycles: makespan,
            makespan_seconds: makespan as f64 / (frequency_ghz * 1e9),
            core_utilization: self
                .core_busy_cycles
                .iter()
                .map(|&busy| utilization(busy))
                .collect(),
            core_busy_cycles: self.core_busy_cycles.clone(),
            avg_core_utilization,
            total_tasks_completed: self.task_latencies.len() as u64,
            avg_task_latency_cycles: average(&self.task_latencies),
            avg_task_wait_cycles: average(&self.task_waits),
            memory_accesses: MemoryAccessReport {
                dtcm_hits: self.dtcm_hits,
                cache_hits: self.cache_hits,
                cache_misses: self.cache_misses,
                main_memory_accesses: self.main_memory_accesses,
            },
            interconnect_busy_cycles: self.interconnect_busy_cycles,
            interconnect_utilization: utilization(self.interconnect_busy_cycles),
            conflicts: ConflictReport {
                bank_conflicts: self.bank_conflicts,
                cache_port_conflicts: self.cache_port_conflicts,
                bank_port_conflicts: self.bank_port_conflicts,
                intra_chiplet_conflicts: self.intra_chiplet_conflicts,
                inter_chiplet_conflicts: self.inter_chiplet_conflicts,
            },
        }
    }

    /// Render the human-readable report.
    pub fn render_report(&self, frequency_ghz: f64) -> String {
        let report = self.report(frequency_ghz);
        let mut out = String::new();

        let _ = writeln!(out, "========================================");
        let _ = writeln!(out, "       SIMULATION STATISTICS");
        let _ = writeln!(out, "========================================");
        let _ = writeln!(out);
        let _ = writeln!(out, "Makespan:");
        let _ = writeln!(out, "  Total Cycles: {}", report.makespan_cycles);
        let _ = writeln!(out, "  Time (seconds): {:e}", report.makespan_seconds);
        let _ = writeln!(out);

        let _ = writeln!(out, "Core Utilization:");
        for (core, (util, busy)) in report
            .core_utilization
            .iter()
            .zip(&report.core_busy_cycles)
            .enumerate()
        {
            let _ = writeln!(
                out,
                "  Core {}: {:.2}% ({} cycles)",
                core,
                util * 100.0,
                busy
            );
        }
        let _ = writeln!(
            out,
            "  Average: {:.2}%",
            report.avg_core_utilization * 100.0
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "Task Statistics:");
        let _ = writeln!(
            out,
            "  Total Tasks Completed: {}",
            report.total_tasks_completed
        );
        let _ = writeln!(
            out,
            "  Average Task Latency: {:.2} cycles",
            report.avg_task_latency_cycles
        );
        let _ = writeln!(
            out,
            "  Average Task Wait Time: {:.2} cycles",
            report.avg_task_wait_cycles
        );
        let _ = writeln!(out);

        let mem = &report.memory_accesses;
        let _ = writeln!(out, "Memory Hierarchy:");
        let _ = writeln!(out, "  DTCM Hits: {}", mem.dtcm_hits);
        let _ = writeln!(out, "  Cache Hits: {}", mem.cache_hits);
        let _ = writeln!(out, "  Cache Misses: {}", mem.cache_misses);
        let _ = writeln!(out, "  Main Memory Accesses: {}", mem.main_memory_accesses);
        let total_accesses = mem.dtcm_hits + mem.cache_hits + mem.cache_misses;
        if total_accesses > 0 {
            let _ = writeln!(
                out,
                "  DTCM Hit Rate: {:.2}%",
                100.0 * mem.dtcm_hits as f64 / total_accesses as f64
            );
            let _ = writeln!(
                out,
                "  Cache Hit Rate: {:.2}%",
                100.0 * mem.cache_hits as f64 / total_accesses as f64
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "Interconnect:");
        let _ = writeln!(out, "  Busy Cycles: {}", report.interconnect_busy_cycles);
        let _ = writeln!(
            out,
            "  Utilization: {:.2}%",
            report.interconnect_utilization * 100.0
        );
        let _ = writeln!(out);

        let conflicts = &report.conflicts;
        let _ = writeln!(out, "Conflicts:");
        let _ = writeln!(out, "  Bank Conflicts: {}", conflicts.bank_conflicts);
        let _ = writeln!(
            out,
            "  Cache Port Conflicts: {}",
            conflicts.cache_port_conflicts
        );
        let _ = writeln!(
            out,
            "  Bank Port Conflicts: {}",
            conflicts.bank_port_conflicts
        );
        let _ = writeln!(
            out,
            "  Intra-Chiplet Conflicts: {}",
            conflicts.intra_chiplet_conflicts
        );
        let _ = writeln!(
            out,
            "  Inter-Chiplet Conflicts: {}",
            conflicts.inter_chiplet_conflicts
        );
        let _ = writeln!(out, "========================================");

        out
    }

    /// Write the structured document to `path`.
    pub fn write_json(&self, path: &Path, frequency_ghz: f64) -> Result<()> {
        let report = self.report(frequency_ghz);
        let mut rendered = serde_json::to_string_pretty(&report)?;
        rendered.push('\n');
        std::fs::write(path, rendered)?;
        log::info!("statistics written to {}", path.display());
        Ok(())
    }
}

/// The `stats.json` document. Field order is the document's key order.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub makespan_cycles: u64,
    pub makespan_seconds: f64,
    pub core_utilization: Vec<f64>,
    pub core_busy_cycles: Vec<u64>,
    pub avg_core_utilization: f64,
    pub total_tasks_completed: u64,
    pub avg_task_latency_cycles: f64,
    pub avg_task_wait_cycles: f64,
    pub memory_accesses: MemoryAccessReport,
    pub interconnect_busy_cycles: u64,
    pub interconnect_utilization: f64,
    pub conflicts: ConflictReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryAccessReport {
    pub dtcm_hits: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub main_memory_accesses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub bank_conflicts: u64,
    pub cache_port_conflicts: u64,
    pub bank_port_conflicts: u64,
    pub intra_chiplet_conflicts: u64,
    pub inter_chiplet_conflicts: u64,
}
