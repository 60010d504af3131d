//! Task priority functions for ordering the ready queue.
//!
//! Implements four built-in strategies (lower value runs first):
//! - `task_order`: logical task index
//! - `bottom_level`: longest remaining path first (HLFET)
//! - `explicit`: caller-supplied per-task values
//! - `longest_first`: longest subtask first

use std::str::FromStr;

use crate::dag::{bottom_levels, ComposedId, DagError, SubtaskProvider, TaskDag, TaskId};
use crate::graph::Time;

/// Maps a schedulable unit to a priority; lower values are scheduled first.
pub trait PriorityFunction {
    fn priority(&self, id: ComposedId) -> f64;
}

impl<F: Fn(ComposedId) -> f64> PriorityFunction for F {
    fn priority(&self, id: ComposedId) -> f64 {
        self(id)
    }
}

/// Built-in prioritization strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityStrategy {
    TaskOrder,
    BottomLevel,
    Explicit,
    LongestFirst,
}

impl PriorityStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskOrder => "task_order",
            Self::BottomLevel => "bottom_level",
            Self::Explicit => "explicit",
            Self::LongestFirst => "longest_first",
        }
    }
}

impl FromStr for PriorityStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_order" => Ok(Self::TaskOrder),
            "bottom_level" => Ok(Self::BottomLevel),
            "explicit" => Ok(Self::Explicit),
            "longest_first" => Ok(Self::LongestFirst),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Strategy name that is not one of the built-ins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl std::fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown priority strategy: {}", self.0)
    }
}

impl std::error::Error for UnknownStrategy {}

/// Priority table precomputed for one DAG and strategy.
#[derive(Clone, Debug)]
pub struct StrategyPriority {
    strategy: PriorityStrategy,
    /// Per-task values, indexed by task id (unused by `LongestFirst`)
    task_values: Vec<f64>,
    /// Per-task subtask execution times (`LongestFirst` only)
    subtask_times: Vec<Vec<Time>>,
}

impl StrategyPriority {
    /// Precompute priorities for every task of `dag`.
    ///
    /// `explicit` supplies the per-task values of the `Explicit` strategy;
    /// tasks without one get `default_priority`.
    pub fn new<D, S>(
        strategy: PriorityStrategy,
        dag: &D,
        subtasks: &S,
        explicit: &[Option<f64>],
        default_priority: f64,
    ) -> Result<Self, DagError>
    where
        D: TaskDag + ?Sized,
        S: SubtaskProvider + ?Sized,
    {
        let n = dag.num_tasks();
        let mut subtask_times = Vec::new();
        let task_values = match strategy {
            PriorityStrategy::TaskOrder => (0..n).map(|t| t as f64).collect(),
            PriorityStrategy::BottomLevel => bottom_levels(dag, subtasks)?
                .into_iter()
                .map(|level| -level)
                .collect(),
            PriorityStrategy::Explicit => (0..n)
                .map(|t| {
                    explicit
                        .get(t)
                        .copied()
                        .flatten()
                        .unwrap_or(default_priority)
                })
                .collect(),
            PriorityStrategy::LongestFirst => {
                subtask_times = (0..n as TaskId)
                    .map(|t| {
                        (0..subtasks.num_subtasks(t))
                            .map(|k| subtasks.exec_time(t, k))
                            .collect()
                    })
                    .collect();
                Vec::new()
            }
        };

        Ok(Self {
            strategy,
            task_values,
            subtask_times,
        })
    }

    pub fn strategy(&self) -> PriorityStrategy {
        self.strategy
    }
}

impl PriorityFunction for StrategyPriority {
    fn priority(&self, id: ComposedId) -> f64 {
        match self.strategy {
            PriorityStrategy::LongestFirst => self
                .subtask_times
                .get(id.task as usize)
                .and_then(|times| times.get(id.subtask as usize))
                .map(|&time| -time)
                .unwrap_or(0.0),
            _ => self
                .task_values
                .get(id.task as usize)
                .copied()
                .unwrap_or(f64::INFINITY),
        }
    }
}
