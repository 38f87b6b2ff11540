//! Top-level simulation orchestrator.
//!
//! Owns the event queue, the task graph, the scheduler, the cores, the
//! memory system, and the stats collector. Seeds a `TaskReady` at time
//! zero for every instance with no predecessors, then processes events
//! in time order until the queue drains. The final value of the cycle
//! counter is the reported makespan.
//!
//! Handlers run to completion synchronously; all side effects
//! (including future-event enqueues) are committed before the next
//! event pops. With the queue's insertion-order tie-break, a run is
//! fully deterministic for a given configuration and workload.

use std::path::Path;

use crate::config::Config;
use crate::engine::core::Core;
use crate::engine::event::{Event, EventKind};
use crate::engine::queue::EventQueue;
use crate::engine::scheduler::Scheduler;
use crate::error::{Result, SimError};
use crate::mem::{MemRequest, MemorySystem};
use crate::stats::StatsCollector;
use crate::workload::table::Table;
use crate::workload::{Access, TaskGraph};
use crate::{CoreId, Cycle, InstanceId};

/// The coupled simulation engine.
#[derive(Debug)]
pub struct Simulator {
    now: Cycle,
    queue: EventQueue,
    config: Config,
    graph: TaskGraph,
    scheduler: Scheduler,
    cores: Vec<Core>,
    memory: MemorySystem,
    stats: StatsCollector,
}

impl Simulator {
    /// Build a simulator from the three input files.
    pub fn from_files(config: &Path, tasks: &Path, ops: &Path) -> Result<Self> {
        let config = Config::from_file(config)?;
        let tasks = Table::from_file(tasks)?;
        let ops = Table::from_file(ops)?;
        let graph = TaskGraph::from_tables(&tasks, &ops)?;
        Self::new(config, graph)
    }

    /// Build a simulator from an already-validated configuration and a
    /// built task graph, and seed the initial ready set.
    pub fn new(config: Config, graph: TaskGraph) -> Result<Self> {
        let num_cores = config.cores as usize;
        let cores = (0..num_cores).map(Core::new).collect();
        let scheduler = Scheduler::new(config.scheduling_policy, num_cores);
        let memory = MemorySystem::new(&config)?;
        let stats = StatsCollector::new(num_cores);

        let mut sim = Self {
            now: 0,
            queue: EventQueue::new(),
            config,
            graph,
            scheduler,
            cores,
            memory,
            stats,
        };

        for instance in sim.graph.initially_ready() {
            sim.queue
                .push(Event::new(0, EventKind::TaskReady { instance }));
        }

        log::info!(
            "simulator initialized: {} cores, {} task instances",
            num_cores,
            sim.graph.instances().len()
        );
        Ok(sim)
    }

    /// Current simulation time in cycles.
    pub fn now(&self) -> Cycle {
        self.now
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn memory(&self) -> &MemorySystem {
        &self.memory
    }

    /// Run to queue exhaustion and fan component counters into the
    /// stats collector.
    pub fn run(&mut self) -> Result<()> {
        log::info!("starting simulation");

        while let Some(event) = self.queue.pop() {
            self.now = event.time;
            log::trace!("cycle {}: {:?}", self.now, event.kind);

            match event.kind {
                EventKind::TaskReady { instance } => self.handle_task_ready(instance)?,
                EventKind::TaskDispatched { core, instance } => {
                    self.handle_task_dispatched(core, instance)?
                }
                EventKind::ComputeDone { core, .. } | EventKind::MemRespDone { core, .. } => {
                    self.handle_op_complete(core)?
                }
                EventKind::MemReqIssued {
                    core,
                    instance,
                    address,
                    access,
                } => self.handle_mem_req_issued(core, instance, address, access)?,
                EventKind::TaskDone { core, instance } => {
                    self.handle_task_done(core, instance)?
                }
            }

            self.stats.on_event(&event, self.now);
        }

        self.stats.set_total_cycles(self.now);
        self.stats
            .set_interconnect_busy_cycles(self.memory.interconnect().busy_cycles());
        log::info!("simulation complete at cycle {}", self.now);
        Ok(())
    }

    /// An instance became eligible: stamp it, queue it, and try to put
    /// it (or another ready instance) on an idle core right away.
    fn handle_task_ready(&mut self, instance: InstanceId) -> Result<()> {
        self.graph.instance_mut(instance)?.ready_time = self.now;
        self.scheduler.add_ready(instance);
        self.try_dispatch_to_idle_core()
    }

    /// Start the dispatched instance's current operation on its core.
    fn handle_task_dispatched(&mut self, core: CoreId, instance: InstanceId) -> Result<()> {
        match self.graph.current_op(instance)? {
            Some(op) => {
                let now = self.now;
                let core = self.cores.get_mut(core).ok_or_else(|| {
                    SimError::Invariant(format!("core id {} out of range", core))
                })?;
                core.execute_op(op, instance, now, &mut self.queue)
            }
            None => {
                // Degenerate empty op stream: the instance is done the
                // cycle it lands.
                self.graph.instance_mut(instance)?.done_time = self.now;
                self.queue
                    .push(Event::new(self.now, EventKind::TaskDone { core, instance }));
                Ok(())
            }
        }
    }

    fn handle_op_complete(&mut self, core: CoreId) -> Result<()> {
        let now = self.now;
        // Split borrows: the core mutates the queue and the graph.
        let core = self
            .cores
            .get_mut(core)
            .ok_or_else(|| SimError::Invariant(format!("core id {} out of range", core)))?;
        core.complete_op(now, &mut self.queue, &mut self.graph)
    }

    fn handle_mem_req_issued(
        &mut self,
        core: CoreId,
        instance: InstanceId,
        address: u64,
        access: Access,
    ) -> Result<()> {
        self.memory.issue_request(
            MemRequest {
                address,
                access,
                core,
                instance,
            },
            self.now,
            &mut self.queue,
            &mut self.stats,
        )
    }

    /// Retire an instance: propagate completion through the DAG, free
    /// the core, wake any successors whose last predecessor this was,
    /// and reuse the freed core immediately if work is waiting.
    fn handle_task_done(&mut self, core: CoreId, instance: InstanceId) -> Result<()> {
        let newly_ready = self.graph.mark_complete(instance)?;
        self.scheduler.release_core(core)?;

        for successor in newly_ready {
            let inst = self.graph.instance_mut(successor)?;
            if inst.ready_time == 0 {
                inst.ready_time = self.now;
                self.queue.push(Event::new(
                    self.now,
                    EventKind::TaskReady {
                        instance: successor,
                    },
                ));
            }
        }

        // Opportunistic dispatch to the just-released core.
        if self.scheduler.has_ready_instances() {
            if let Some(next) = self.scheduler.select_next_instance(&self.graph)? {
                self.scheduler.dispatch(next, core, self.now, &mut self.graph)?;
                self.queue.push(Event::new(
                    self.now,
                    EventKind::TaskDispatched {
                        core,
                        instance: next,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Pair an idle core with the policy's next ready instance, if both
    /// exist.
    fn try_dispatch_to_idle_core(&mut self) -> Result<()> {
        if !self.scheduler.has_ready_instances() {
            return Ok(());
        }
        if let Some(core) = self.scheduler.select_idle_core() {
            if let Some(instance) = self.scheduler.select_next_instance(&self.graph)? {
                self.scheduler
                    .dispatch(instance, core, self.now, &mut self.graph)?;
                self.queue.push(Event::new(
                    self.now,
                    EventKind::TaskDispatched { core, instance },
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{Op, Task};

    fn config(json: &str) -> Config {
        let mut config = Config::from_json(json).unwrap();
        config.finalize();
        config.validate().unwrap();
        config
    }

    fn task(id: i32, executions: u32, deps: Vec<i32>, ops: Vec<Op>) -> Task {
        Task {
            id,
            name: format!("t{}", id),
            executions,
            deps,
            ops,
        }
    }

    #[test]
    fn test_single_compute_timeline() {
        let graph = TaskGraph::build(vec![task(
            0,
            1,
            vec![],
            vec![Op::Compute { cycles: 10 }],
        )])
        .unwrap();
        let mut sim = Simulator::new(config("{}"), graph).unwrap();
        sim.run().unwrap();

        assert_eq!(sim.now(), 10);
        let inst = sim.graph().instance(0).unwrap();
        assert_eq!(inst.ready_time, 0);
        assert_eq!(inst.dispatch_time, 0);
        assert_eq!(inst.done_time, 10);
        assert_eq!(sim.stats().tasks_completed(), 1);
    }

    #[test]
    fn test_chain_respects_precedence() {
        let graph = TaskGraph::build(vec![
            task(0, 1, vec![], vec![Op::Compute { cycles: 5 }]),
            task(1, 1, vec![0], vec![Op::Compute { cycles: 5 }]),
        ])
        .unwrap();
        let mut sim = Simulator::new(config("{}"), graph).unwrap();
        sim.run().unwrap();

        assert_eq!(sim.now(), 10);
        let first = sim.graph().instance(0).unwrap();
        let second = sim.graph().instance(1).unwrap();
        assert_eq!(first.done_time, 5);
        assert_eq!(second.ready_time, 5);
        assert_eq!(second.done_time, 10);
        assert!(first.done_time <= second.ready_time);
        assert!(second.ready_time <= second.dispatch_time);
        assert!(second.dispatch_time <= second.done_time);
    }

    #[test]
    fn test_zero_op_task_completes_immediately() {
        let graph = TaskGraph::build(vec![
            task(0, 1, vec![], vec![]),
            task(1, 1, vec![0], vec![Op::Compute { cycles: 3 }]),
        ])
        .unwrap();
        let mut sim = Simulator::new(config("{}"), graph).unwrap();
        sim.run().unwrap();

        assert_eq!(sim.graph().instance(0).unwrap().done_time, 0);
        assert_eq!(sim.now(), 3);
    }

    #[test]
    fn test_compute_chain_on_one_core_serializes() {
        // Two independent single-op tasks on one core: second waits.
        let graph = TaskGraph::build(vec![
            task(0, 1, vec![], vec![Op::Compute { cycles: 4 }]),
            task(1, 1, vec![], vec![Op::Compute { cycles: 4 }]),
        ])
        .unwrap();
        let mut sim = Simulator::new(config("{}"), graph).unwrap();
        sim.run().unwrap();

        assert_eq!(sim.now(), 8);
        assert_eq!(sim.graph().instance(0).unwrap().done_time, 4);
        assert_eq!(sim.graph().instance(1).unwrap().done_time, 8);
        // The second instance waited from ready (0) to dispatch (4).
        assert_eq!(sim.graph().instance(1).unwrap().dispatch_time, 4);
    }
}
