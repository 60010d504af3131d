//! Input and result types of a simulation.

use chrono::NaiveDate;
use pyo3::prelude::*;
use std::collections::HashMap;

// Note: We use std HashMap here for PyO3 interface compatibility

/// A named task: its subtask durations and the tasks it waits on.
#[pyclass]
#[derive(Clone, Debug)]
pub struct TaskSpec {
    #[pyo3(get, set)]
    pub name: String,
    /// One entry per independently schedulable subtask; may be empty
    #[pyo3(get, set)]
    pub subtask_times: Vec<f64>,
    /// Names of the tasks that must finish first
    #[pyo3(get, set)]
    pub dependencies: Vec<String>,
    /// Priority under the "explicit" strategy (lower runs first)
    #[pyo3(get, set)]
    pub priority: Option<f64>,
}

impl TaskSpec {
    /// Single-unit task with the given predecessors.
    pub fn whole(name: &str, duration: f64, dependencies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            subtask_times: vec![duration],
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            priority: None,
        }
    }
}

#[pymethods]
impl TaskSpec {
    #[new]
    #[pyo3(signature = (name, subtask_times, dependencies=None, priority=None))]
    fn new(
        name: String,
        subtask_times: Vec<f64>,
        dependencies: Option<Vec<String>>,
        priority: Option<f64>,
    ) -> Self {
        Self {
            name,
            subtask_times,
            dependencies: dependencies.unwrap_or_default(),
            priority,
        }
    }

    /// Total processor time over all subtasks.
    #[getter]
    fn total_time(&self) -> f64 {
        self.subtask_times.iter().sum()
    }

    fn __repr__(&self) -> String {
        format!(
            "TaskSpec(name={:?}, subtasks={}, deps={})",
            self.name,
            self.subtask_times.len(),
            self.dependencies.len()
        )
    }
}

/// One unit placed on a processor.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledUnit {
    #[pyo3(get, set)]
    pub task_name: String,
    #[pyo3(get, set)]
    pub subtask: u32,
    #[pyo3(get, set)]
    pub processor: u32,
    #[pyo3(get, set)]
    pub ready_time: f64,
    #[pyo3(get, set)]
    pub finish_time: f64,
    #[pyo3(get, set)]
    pub exec_time: f64,
    /// Calendar projection of `ready_time`, when a start date is configured
    #[pyo3(get, set)]
    pub start_date: Option<NaiveDate>,
    #[pyo3(get, set)]
    pub end_date: Option<NaiveDate>,
}

#[pymethods]
impl ScheduledUnit {
    fn __repr__(&self) -> String {
        format!(
            "ScheduledUnit(task={:?}.{}, processor={}, start={}, finish={})",
            self.task_name, self.subtask, self.processor, self.ready_time, self.finish_time
        )
    }
}

/// Outcome of a simulation run.
#[pyclass]
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    /// Units sorted by start time, then processor
    #[pyo3(get, set)]
    pub units: Vec<ScheduledUnit>,
    #[pyo3(get, set)]
    pub makespan: f64,
    /// `(start, finish)` per task name
    #[pyo3(get, set)]
    pub task_spans: HashMap<String, (f64, f64)>,
    /// Busy share of the makespan, per processor
    #[pyo3(get, set)]
    pub utilization: Vec<f64>,
    #[pyo3(get, set)]
    pub algorithm_metadata: HashMap<String, String>,
}

#[pymethods]
impl SimulationResult {
    /// Units of one task, in subtask order.
    fn units_for(&self, task_name: &str) -> Vec<ScheduledUnit> {
        let mut units: Vec<_> = self
            .units
            .iter()
            .filter(|u| u.task_name == task_name)
            .cloned()
            .collect();
        units.sort_by_key(|u| u.subtask);
        units
    }

    fn __repr__(&self) -> String {
        format!(
            "SimulationResult(units={}, makespan={}, metadata_keys={})",
            self.units.len(),
            self.makespan,
            self.algorithm_metadata.len()
        )
    }
}
