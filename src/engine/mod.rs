//! The discrete-event simulation engine.
//!
//! The engine owns a single time-ordered event queue. Each iteration
//! of the main loop pops the earliest event, advances the global cycle
//! counter, and dispatches to a handler that may mutate the scheduler,
//! a core, the task graph, or the memory system, each of which may
//! enqueue future events. The run terminates when the queue drains.

pub mod core;
pub mod event;
pub mod queue;
pub mod scheduler;
pub mod simulator;

pub use event::{Event, EventKind};
pub use queue::{EventQueue, EventSink};
pub use simulator::Simulator;
