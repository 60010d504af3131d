//! Multiprocessor list scheduler over a constraint graph.
//!
//! The scheduler builds a graph of barriers and execution units from a task
//! DAG, then greedily assigns ready units to the earliest available processor.
//! Every edge insertion is propagated synchronously, so the finished graph
//! holds the full timeline.

mod core;
mod pipeline;
mod plan;
mod policy;

pub use core::{BuildPhase, ListScheduler, SchedulerError, SchedulerStats, TaskBarriers};
pub use plan::{Plan, PlanEntry};
pub use policy::ReadyQueue;
