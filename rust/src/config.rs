//! Configuration for a simulation run.

use chrono::NaiveDate;
use pyo3::prelude::*;

use crate::logging::VERBOSITY_SILENT;
use crate::priority::{PriorityStrategy, UnknownStrategy};

/// Processor pool, entry point and prioritization of one simulation.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Number of identical processors (at least 1)
    #[pyo3(get, set)]
    pub num_processors: u32,
    /// Time at which the root, and so every processor, becomes available
    #[pyo3(get, set)]
    pub root_ready_time: f64,
    /// Single entry task linked from the root; `None` links every task
    /// without predecessors
    #[pyo3(get, set)]
    pub source_task: Option<String>,
    /// Prioritization strategy: "task_order", "bottom_level", "explicit" or "longest_first"
    #[pyo3(get, set)]
    pub strategy: String,
    /// Priority of tasks without one under the "explicit" strategy
    #[pyo3(get, set)]
    pub default_priority: f64,
    /// Schedule subtasks as separate units; otherwise one unit per task
    #[pyo3(get, set)]
    pub split_subtasks: bool,
    /// Logging verbosity (0-3)
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Calendar date of time 0; one time unit is one day
    #[pyo3(get, set)]
    pub start_date: Option<NaiveDate>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_processors: 1,
            root_ready_time: 0.0,
            source_task: None,
            strategy: PriorityStrategy::BottomLevel.name().to_string(),
            default_priority: 0.0,
            split_subtasks: true,
            verbosity: VERBOSITY_SILENT,
            start_date: None,
        }
    }
}

impl SimulationConfig {
    pub fn priority_strategy(&self) -> Result<PriorityStrategy, UnknownStrategy> {
        self.strategy.parse()
    }
}

#[pymethods]
impl SimulationConfig {
    #[new]
    #[pyo3(signature = (
        num_processors=None,
        root_ready_time=None,
        source_task=None,
        strategy=None,
        default_priority=None,
        split_subtasks=None,
        verbosity=None,
        start_date=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_processors: Option<u32>,
        root_ready_time: Option<f64>,
        source_task: Option<String>,
        strategy: Option<String>,
        default_priority: Option<f64>,
        split_subtasks: Option<bool>,
        verbosity: Option<u8>,
        start_date: Option<NaiveDate>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            num_processors: num_processors.unwrap_or(defaults.num_processors),
            root_ready_time: root_ready_time.unwrap_or(defaults.root_ready_time),
            source_task,
            strategy: strategy.unwrap_or(defaults.strategy),
            default_priority: default_priority.unwrap_or(defaults.default_priority),
            split_subtasks: split_subtasks.unwrap_or(defaults.split_subtasks),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            start_date,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SimulationConfig(num_processors={}, strategy={:?}, split_subtasks={})",
            self.num_processors, self.strategy, self.split_subtasks
        )
    }
}
