//! Workload definition: delimited-table loading and the task DAG.
//!
//! A workload is two tables. The tasks table declares each task's
//! identity, execution multiplicity, and dependencies; the ops table
//! declares the ordered operation stream each task executes. Loading
//! produces a [`graph::TaskGraph`], the runtime instance arena the
//! engine schedules from.

pub mod graph;
pub mod table;

pub use graph::{Access, Op, Task, TaskGraph, TaskInstance};
