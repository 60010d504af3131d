//! Multiprocessor list-scheduling simulator.
//!
//! A task DAG is turned into a constraint graph of barriers and execution
//! units; ready units are greedily assigned to the earliest available of a
//! fixed pool of identical processors. The Python module exposes a one-shot
//! `simulate` entry point over named task specs.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;
use std::collections::HashMap;

mod config;
pub mod dag;
pub mod graph;
pub mod interner;
pub mod logging;
mod models;
pub mod priority;
pub mod scheduler;
pub mod simulation;

pub use config::SimulationConfig;
pub use dag::{ComposedId, DagError, SubtaskProvider, TaskDag, TaskGraph, TaskId, WholeTasks};
pub use models::{ScheduledUnit, SimulationResult, TaskSpec};
pub use priority::{PriorityFunction, PriorityStrategy, StrategyPriority};
pub use scheduler::{ListScheduler, Plan, PlanEntry, SchedulerError};

/// Map a run error onto the Python exception hierarchy.
fn to_py_err(err: SchedulerError) -> PyErr {
    if err.is_input_error() {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    } else {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}

/// Schedule tasks on a pool of identical processors.
///
/// # Arguments
/// * `tasks` - Task specs; dependencies refer to other tasks by name
/// * `config` - Simulation configuration (defaults to one processor, bottom-level priority)
///
/// # Returns
/// * SimulationResult with every unit's processor and start/finish times
///
/// # Raises
/// * ValueError on duplicate or unknown names, cycles, bad durations or config
/// * RuntimeError if the run breaks a scheduling invariant
#[pyfunction]
#[pyo3(name = "simulate", signature = (tasks, config=None))]
fn py_simulate(tasks: Vec<TaskSpec>, config: Option<SimulationConfig>) -> PyResult<SimulationResult> {
    let config = config.unwrap_or_default();
    simulation::simulate(&tasks, &config).map_err(to_py_err)
}

/// Longest execution path from each task to any exit, inclusive.
///
/// # Raises
/// * ValueError if the task graph is invalid
#[pyfunction]
#[pyo3(name = "bottom_levels")]
fn py_bottom_levels(tasks: Vec<TaskSpec>) -> PyResult<HashMap<String, f64>> {
    simulation::task_bottom_levels(&tasks)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
}

/// The plansim.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<TaskSpec>()?;
    m.add_class::<ScheduledUnit>()?;
    m.add_class::<SimulationResult>()?;

    // Config types
    m.add_class::<SimulationConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(py_simulate, m)?)?;
    m.add_function(wrap_pyfunction!(py_bottom_levels, m)?)?;

    Ok(())
}
