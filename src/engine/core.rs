//! Per-core operation-stream automaton.
//!
//! A core is either idle or running exactly one task instance. While
//! running, it walks the instance's op list: a compute op occupies the
//! core and schedules its own completion; a memory op is handed to the
//! memory system in the same cycle and the core waits for the
//! response. Zero-latency ops chain at a single timestamp without the
//! core ever leaving the busy state.
//!
//! Mutual exclusion is the scheduler's job; executing on a busy core
//! or completing on an idle one is a programming error and fails
//! loudly.

use crate::engine::event::{Event, EventKind};
use crate::engine::queue::EventQueue;
use crate::error::{Result, SimError};
use crate::workload::{Op, TaskGraph};
use crate::{CoreId, Cycle, InstanceId};

/// What a core is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoreState {
    Idle,
    Busy { instance: InstanceId },
}

/// One simulated core.
#[derive(Debug)]
pub struct Core {
    id: CoreId,
    state: CoreState,
    busy_since: Cycle,
}

impl Core {
    pub fn new(id: CoreId) -> Self {
        Self {
            id,
            state: CoreState::Idle,
            busy_since: 0,
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn is_idle(&self) -> bool {
        self.state == CoreState::Idle
    }

    /// Instance currently occupying this core, if any.
    pub fn current_instance(&self) -> Option<InstanceId> {
        match self.state {
            CoreState::Idle => None,
            CoreState::Busy { instance } => Some(instance),
        }
    }

    /// Cycle at which the current occupancy began.
    pub fn busy_since(&self) -> Cycle {
        self.busy_since
    }

    /// Begin executing `op` for `instance`. Only legal from idle.
    pub fn execute_op(
        &mut self,
        op: Op,
        instance: InstanceId,
        now: Cycle,
        queue: &mut EventQueue,
    ) -> Result<()> {
        if let CoreState::Busy { instance: current } = self.state {
            return Err(SimError::Invariant(format!(
                "core {} cannot execute for instance {} while running instance {}",
                self.id, instance, current
            )));
        }
        self.state = CoreState::Busy { instance };
        self.busy_since = now;
        self.issue_op(op, instance, now, queue);
        Ok(())
    }

    /// Finish the current operation, advance the cursor, and either
    /// chain into the next op (same cycle) or retire the instance.
    pub fn complete_op(
        &mut self,
        now: Cycle,
        queue: &mut EventQueue,
        graph: &mut TaskGraph,
    ) -> Result<()> {
        let instance = match self.state {
            CoreState::Busy { instance } => instance,
            CoreState::Idle => {
                return Err(SimError::Invariant(format!(
                    "core {} cannot complete an operation while idle",
                    self.id
                )))
            }
        };

        graph.instance_mut(instance)?.cursor += 1;

        match graph.current_op(instance)? {
            Some(op) => {
                // More work: chain into the next op without going idle.
                self.issue_op(op, instance, now, queue);
            }
            None => {
                graph.instance_mut(instance)?.done_time = now;
                queue.push(Event::new(
                    now,
                    EventKind::TaskDone {
                        core: self.id,
                        instance,
                    },
                ));
                self.state = CoreState::Idle;
            }
        }
        Ok(())
    }

    fn issue_op(&self, op: Op, instance: InstanceId, now: Cycle, queue: &mut EventQueue) {
        match op {
            Op::Compute { cycles } => {
                queue.push(Event::new(
                    now + Cycle::from(cycles),
                    EventKind::ComputeDone {
                        core: self.id,
                        instance,
                    },
                ));
            }
            Op::Memory { address, access } => {
                // Same-cycle handoff to the memory system.
                queue.push(Event::new(
                    now,
                    EventKind::MemReqIssued {
                        core: self.id,
                        instance,
                        address,
                        access,
                    },
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{Access, Task, TaskGraph};

    fn one_task_graph(ops: Vec<Op>) -> TaskGraph {
        TaskGraph::build(vec![Task {
            id: 0,
            name: "t0".to_string(),
            executions: 1,
            deps: Vec::new(),
            ops,
        }])
        .unwrap()
    }

    #[test]
    fn test_compute_schedules_completion() {
        let mut core = Core::new(0);
        let mut queue = EventQueue::new();

        core.execute_op(Op::Compute { cycles: 10 }, 0, 5, &mut queue)
            .unwrap();

        assert!(!core.is_idle());
        assert_eq!(core.current_instance(), Some(0));
        assert_eq!(core.busy_since(), 5);
        let event = queue.pop().unwrap();
        assert_eq!(event.time, 15);
        assert_eq!(
            event.kind,
            EventKind::ComputeDone {
                core: 0,
                instance: 0
            }
        );
    }

    #[test]
    fn test_memory_hands_off_same_cycle() {
        let mut core = Core::new(1);
        let mut queue = EventQueue::new();

        core.execute_op(
            Op::Memory {
                address: 0x4000,
                access: Access::Write,
            },
            3,
            7,
            &mut queue,
        )
        .unwrap();

        let event = queue.pop().unwrap();
        assert_eq!(event.time, 7);
        assert_eq!(
            event.kind,
            EventKind::MemReqIssued {
                core: 1,
                instance: 3,
                address: 0x4000,
                access: Access::Write
            }
        );
    }

    #[test]
    fn test_complete_chains_next_op() {
        let mut graph = one_task_graph(vec![
            Op::Compute { cycles: 2 },
            Op::Compute { cycles: 3 },
        ]);
        let mut core = Core::new(0);
        let mut queue = EventQueue::new();

        core.execute_op(Op::Compute { cycles: 2 }, 0, 0, &mut queue)
            .unwrap();
        queue.pop().unwrap();

        core.complete_op(2, &mut queue, &mut graph).unwrap();
        assert!(!core.is_idle());
        assert_eq!(graph.instance(0).unwrap().cursor, 1);
        let event = queue.pop().unwrap();
        assert_eq!(event.time, 5);
    }

    #[test]
    fn test_final_completion_retires_instance() {
        let mut graph = one_task_graph(vec![Op::Compute { cycles: 4 }]);
        let mut core = Core::new(0);
        let mut queue = EventQueue::new();

        core.execute_op(Op::Compute { cycles: 4 }, 0, 0, &mut queue)
            .unwrap();
        queue.pop().unwrap();

        core.complete_op(4, &mut queue, &mut graph).unwrap();
        assert!(core.is_idle());
        assert_eq!(graph.instance(0).unwrap().done_time, 4);
        let event = queue.pop().unwrap();
        assert_eq!(event.time, 4);
        assert_eq!(
            event.kind,
            EventKind::TaskDone {
                core: 0,
                instance: 0
            }
        );
    }

    #[test]
    fn test_execute_on_busy_core_fails() {
        let mut core = Core::new(0);
        let mut queue = EventQueue::new();

        core.execute_op(Op::Compute { cycles: 1 }, 0, 0, &mut queue)
            .unwrap();
        let err = core
            .execute_op(Op::Compute { cycles: 1 }, 1, 0, &mut queue)
            .unwrap_err();
        assert!(matches!(err, SimError::Invariant(_)));
    }

    #[test]
    fn test_complete_on_idle_core_fails() {
        let mut graph = one_task_graph(vec![Op::Compute { cycles: 1 }]);
        let mut core = Core::new(0);
        let mut queue = EventQueue::new();

        let err = core.complete_op(0, &mut queue, &mut graph).unwrap_err();
        assert!(matches!(err, SimError::Invariant(_)));
    }
}
