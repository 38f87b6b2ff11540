//! Task DAG: definitions, instance expansion, and precedence tracking.
//!
//! Tasks form a directed acyclic graph declared in the tasks table. At
//! build time each task expands into `executions` runtime instances.
//! Dependencies are Cartesian: every instance of a task depends on
//! *all* instances of each dependency task, so an instance's in-degree
//! is the sum of `executions` over its dependency tasks.
//!
//! Acyclicity is verified with a three-color depth-first traversal; a
//! back edge is fatal and reports the offending path. Instances live in
//! a dense arena indexed by instance id; successor lists hold indices
//! into that arena.

use std::collections::HashMap;

use crate::error::{Result, SimError};
use crate::workload::table::Table;
use crate::{Cycle, InstanceId, TaskId};

/// Memory access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One operation in a task's stream. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Occupy the core for `cycles` cycles.
    Compute { cycles: u32 },
    /// Issue a memory request for `address`.
    Memory { address: u64, access: Access },
}

/// A task definition from the tasks table.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Number of runtime instances this task expands into (>= 1).
    pub executions: u32,
    /// Ids of predecessor tasks.
    pub deps: Vec<TaskId>,
    /// Ordered operation stream, shared by all instances.
    pub ops: Vec<Op>,
}

/// A runtime instance of a task.
///
/// Mutated only through in-degree decrements, cursor advances, and the
/// three timestamps; everything else is fixed at build time.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    pub id: InstanceId,
    pub task: TaskId,
    /// Index of the next operation to execute.
    pub cursor: usize,
    /// Predecessor instances that have not yet completed.
    pub in_degree: usize,
    pub ready_time: Cycle,
    pub dispatch_time: Cycle,
    pub done_time: Cycle,
    /// Instance ids that depend on this instance.
    pub successors: Vec<InstanceId>,
}

/// The task graph plus its expanded instance arena.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    task_index: HashMap<TaskId, usize>,
    instances: Vec<TaskInstance>,
}

/// Three-color DFS state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    OnStack,
    Done,
}

impl TaskGraph {
    /// Load both workload tables and build the graph.
    pub fn from_tables(tasks: &Table, ops: &Table) -> Result<Self> {
        let tasks = load_tasks(tasks, ops)?;
        Self::build(tasks)
    }

    /// Build the instance arena from task definitions, verifying
    /// acyclicity first.
    pub fn build(tasks: Vec<Task>) -> Result<Self> {
        let mut task_index = HashMap::new();
        for (idx, task) in tasks.iter().enumerate() {
            if task_index.insert(task.id, idx).is_some() {
                return Err(SimError::Workload(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }
        for task in &tasks {
            for dep in &task.deps {
                if !task_index.contains_key(dep) {
                    return Err(SimError::Workload(format!(
                        "task {} depends on unknown task {}",
                        task.id, dep
                    )));
                }
            }
        }

        // Task-level successor adjacency, in declaration order.
        let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in &tasks {
            for dep in &task.deps {
                adjacency.entry(*dep).or_default().push(task.id);
            }
        }

        detect_cycles(&tasks, &adjacency)?;

        // Expand instances: declaration order, then execution index.
        let mut instances = Vec::new();
        let mut task_instances: HashMap<TaskId, Vec<InstanceId>> = HashMap::new();
        for task in &tasks {
            let ids = task_instances.entry(task.id).or_default();
            for _ in 0..task.executions {
                let id = instances.len();
                instances.push(TaskInstance {
                    id,
                    task: task.id,
                    cursor: 0,
                    in_degree: 0,
                    ready_time: 0,
                    dispatch_time: 0,
                    done_time: 0,
                    successors: Vec::new(),
                });
                ids.push(id);
            }
        }

        // Cartesian dependency wiring: every instance of a task has all
        // instances of each dependency as predecessors.
        for instance in &mut instances {
            let task = &tasks[task_index[&instance.task]];
            instance.in_degree = task
                .deps
                .iter()
                .map(|dep| task_instances[dep].len())
                .sum();
            if let Some(successor_tasks) = adjacency.get(&instance.task) {
                for succ_task in successor_tasks {
                    instance
                        .successors
                        .extend(task_instances[succ_task].iter().copied());
                }
            }
        }

        log::debug!(
            "built task graph: {} tasks, {} instances",
            tasks.len(),
            instances.len()
        );

        Ok(Self {
            tasks,
            task_index,
            instances,
        })
    }

    /// Task definitions in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// All instances, indexed by instance id.
    pub fn instances(&self) -> &[TaskInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Result<&TaskInstance> {
        self.instances
            .get(id)
            .ok_or_else(|| SimError::Invariant(format!("instance id {} out of range", id)))
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Result<&mut TaskInstance> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| SimError::Invariant(format!("instance id {} out of range", id)))
    }

    /// The shared, immutable op list of a task.
    pub fn ops(&self, task: TaskId) -> Result<&[Op]> {
        let idx = self
            .task_index
            .get(&task)
            .ok_or_else(|| SimError::Invariant(format!("unknown task id {}", task)))?;
        Ok(&self.tasks[*idx].ops)
    }

    /// The operation an instance's cursor points at, or `None` when the
    /// instance has run off the end of its stream.
    pub fn current_op(&self, id: InstanceId) -> Result<Option<Op>> {
        let instance = self.instance(id)?;
        let ops = self.ops(instance.task)?;
        Ok(ops.get(instance.cursor).copied())
    }

    /// Operations an instance has still to execute.
    pub fn remaining_ops(&self, id: InstanceId) -> Result<usize> {
        let instance = self.instance(id)?;
        let ops = self.ops(instance.task)?;
        Ok(ops.len().saturating_sub(instance.cursor))
    }

    /// Instances eligible for seeding: in-degree zero, never started,
    /// never marked ready. Used once, before the first event fires.
    pub fn initially_ready(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|i| i.in_degree == 0 && i.cursor == 0 && i.ready_time == 0)
            .map(|i| i.id)
            .collect()
    }

    /// Record completion of `id`: decrement every successor's in-degree
    /// and return the successors that just reached zero. Does not touch
    /// `id` itself; timestamps are the caller's business.
    pub fn mark_complete(&mut self, id: InstanceId) -> Result<Vec<InstanceId>> {
        let successors = self.instance(id)?.successors.clone();
        let mut newly_ready = Vec::new();
        for succ in successors {
            let instance = self.instance_mut(succ)?;
            if instance.in_degree == 0 {
                return Err(SimError::Invariant(format!(
                    "in-degree underflow on instance {}",
                    succ
                )));
            }
            instance.in_degree -= 1;
            if instance.in_degree == 0 {
                newly_ready.push(succ);
            }
        }
        Ok(newly_ready)
    }
}

/// Verify the task-level graph is acyclic. A back edge to an on-stack
/// vertex fails with the path that closes the cycle.
fn detect_cycles(tasks: &[Task], adjacency: &HashMap<TaskId, Vec<TaskId>>) -> Result<()> {
    let mut state: HashMap<TaskId, Color> =
        tasks.iter().map(|t| (t.id, Color::Unvisited)).collect();
    let mut path = Vec::new();

    for task in tasks {
        if state[&task.id] == Color::Unvisited {
            dfs_visit(task.id, adjacency, &mut state, &mut path)?;
        }
    }
    Ok(())
}

fn dfs_visit(
    task: TaskId,
    adjacency: &HashMap<TaskId, Vec<TaskId>>,
    state: &mut HashMap<TaskId, Color>,
    path: &mut Vec<TaskId>,
) -> Result<()> {
    state.insert(task, Color::OnStack);
    path.push(task);

    if let Some(successors) = adjacency.get(&task) {
        for succ in successors {
            match state[succ] {
                Color::OnStack => {
                    let mut rendered: Vec<String> =
                        path.iter().map(|id| id.to_string()).collect();
                    rendered.push(succ.to_string());
                    return Err(SimError::Dag {
                        path: rendered.join(" -> "),
                    });
                }
                Color::Unvisited => dfs_visit(*succ, adjacency, state, path)?,
                Color::Done => {}
            }
        }
    }

    state.insert(task, Color::Done);
    path.pop();
    Ok(())
}

/// Fetch one field, tagging errors with the table's role.
fn field(table: &Table, row: usize, col: &str, name: &str) -> Result<String> {
    table
        .get(row, col)
        .map(str::to_string)
        .map_err(|e| SimError::Workload(format!("{} table: {}", name, e)))
}

/// Parse both tables into task definitions with attached op streams.
fn load_tasks(tasks: &Table, ops: &Table) -> Result<Vec<Task>> {
    let mut loaded = Vec::new();
    for row in 0..tasks.len() {
        let id: TaskId = parse_int(&field(tasks, row, "id", "tasks")?, "task id")?;
        let name = field(tasks, row, "name", "tasks")?;
        let executions: u32 =
            parse_int(&field(tasks, row, "executions", "tasks")?, "executions")?;
        if executions == 0 {
            return Err(SimError::Workload(format!(
                "task {} must have at least one execution",
                id
            )));
        }
        let deps = parse_deps(&field(tasks, row, "deps", "tasks")?)?;
        loaded.push(Task {
            id,
            name,
            executions,
            deps,
            ops: Vec::new(),
        });
    }

    // Collect ops keyed by task, then order each stream by seq_idx.
    let mut task_ops: HashMap<TaskId, Vec<(u32, Op)>> = HashMap::new();
    for row in 0..ops.len() {
        let task_id: TaskId = parse_int(&field(ops, row, "task_id", "ops")?, "task_id")?;
        let seq_idx: u32 = parse_int(&field(ops, row, "seq_idx", "ops")?, "seq_idx")?;
        let kind = field(ops, row, "type", "ops")?;

        let op = match kind.as_str() {
            "compute" => {
                let cycles_field = field(ops, row, "cycles", "ops")?;
                if cycles_field.is_empty() {
                    return Err(SimError::Workload(format!(
                        "compute op for task {} is missing cycles",
                        task_id
                    )));
                }
                Op::Compute {
                    cycles: parse_int(&cycles_field, "cycles")?,
                }
            }
            "mem" => {
                let addr_field = field(ops, row, "address", "ops")?;
                if addr_field.is_empty() {
                    return Err(SimError::Workload(format!(
                        "memory op for task {} is missing an address",
                        task_id
                    )));
                }
                let address = parse_hex(&addr_field)?;
                let access = match field(ops, row, "rw", "ops")?.as_str() {
                    "R" | "r" => Access::Read,
                    "W" | "w" => Access::Write,
                    other => {
                        return Err(SimError::Workload(format!(
                            "invalid rw field: {}",
                            other
                        )))
                    }
                };
                Op::Memory { address, access }
            }
            other => {
                return Err(SimError::Workload(format!(
                    "invalid operation type: {}",
                    other
                )))
            }
        };
        task_ops.entry(task_id).or_default().push((seq_idx, op));
    }

    let known: HashMap<TaskId, usize> = loaded
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.id, idx))
        .collect();
    for task_id in task_ops.keys() {
        if !known.contains_key(task_id) {
            return Err(SimError::Workload(format!(
                "ops table references unknown task {}",
                task_id
            )));
        }
    }

    for task in &mut loaded {
        if let Some(mut stream) = task_ops.remove(&task.id) {
            stream.sort_by_key(|(seq, _)| *seq);
            task.ops = stream.into_iter().map(|(_, op)| op).collect();
        }
    }

    Ok(loaded)
}

/// Parse the semicolon-separated dependency list.
fn parse_deps(deps: &str) -> Result<Vec<TaskId>> {
    let mut out = Vec::new();
    for token in deps.split(';') {
        let token = token.trim();
        if !token.is_empty() {
            out.push(parse_int(token, "dependency id")?);
        }
    }
    Ok(out)
}

fn parse_int<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SimError::Workload(format!("invalid {}: '{}'", what, value)))
}

fn parse_hex(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|_| SimError::Workload(format!("invalid hex address: '{}'", value)))
}
