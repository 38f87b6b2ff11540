//! Error types for the simulator.
//!
//! Every fatal condition maps onto one of four kinds: configuration
//! problems, workload-table problems, task-graph cycles, and runtime
//! invariant violations. All of them abort the run; there are no
//! retries and no best-effort fallbacks.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum SimError {
    /// Missing/malformed configuration key, unknown enum string,
    /// non-positive required value, or unparseable hex address.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed tasks/ops table: bad header, field-count mismatch,
    /// unknown op type, missing op fields, unknown task reference.
    #[error("workload error: {0}")]
    Workload(String),

    /// Cycle in the task dependency graph, reported with the path.
    #[error("cycle detected in task dependencies: {path}")]
    Dag {
        /// The offending path, rendered as "a -> b -> ... -> a".
        path: String,
    },

    /// A programming-bug condition: dispatching to a busy core,
    /// completing on an idle core, or an out-of-range core/bank id.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// I/O failure reading an input file or writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure rendering the structured stats document.
    #[error("failed to render stats document: {0}")]
    Report(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;
