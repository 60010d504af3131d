//! One-shot simulation from named task specs.
//!
//! Interns the task names, builds and validates the task DAG, runs the full
//! construction pipeline and list scheduling, and converts the plan into
//! result types keyed by task name.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::config::SimulationConfig;
use crate::dag::{bottom_levels, DagError, TaskGraph, TaskId, WholeTasks};
use crate::interner::TaskNameInterner;
use crate::log_changes;
use crate::models::{ScheduledUnit, SimulationResult, TaskSpec};
use crate::priority::StrategyPriority;
use crate::scheduler::{ListScheduler, Plan, SchedulerError};

/// Build a validated task DAG from specs. Dependencies may name tasks
/// declared later in the list.
pub fn build_task_graph(tasks: &[TaskSpec]) -> Result<(TaskGraph, TaskNameInterner), DagError> {
    let mut interner = TaskNameInterner::with_capacity(tasks.len());
    let mut graph = TaskGraph::with_capacity(tasks.len());
    for spec in tasks {
        interner.intern_unique(&spec.name)?;
        graph.add_task(spec.subtask_times.clone());
    }

    for (task, spec) in tasks.iter().enumerate() {
        for dep in &spec.dependencies {
            let pred = interner.lookup(dep)?;
            graph.add_dependency(pred, task as TaskId)?;
        }
    }

    graph.validate()?;
    Ok((graph, interner))
}

/// Bottom level of every task, keyed by name.
pub fn task_bottom_levels(tasks: &[TaskSpec]) -> Result<HashMap<String, f64>, DagError> {
    let (graph, interner) = build_task_graph(tasks)?;
    let levels = bottom_levels(&graph, &graph)?;
    Ok(levels
        .into_iter()
        .enumerate()
        .filter_map(|(task, level)| {
            interner
                .resolve(task as TaskId)
                .map(|name| (name.to_string(), level))
        })
        .collect())
}

/// Schedule `tasks` on `config.num_processors` identical processors.
pub fn simulate(
    tasks: &[TaskSpec],
    config: &SimulationConfig,
) -> Result<SimulationResult, SchedulerError> {
    let (graph, interner) = build_task_graph(tasks)?;
    let strategy = config.priority_strategy()?;
    let explicit: Vec<Option<f64>> = tasks.iter().map(|t| t.priority).collect();
    let priority = if config.split_subtasks {
        StrategyPriority::new(strategy, &graph, &graph, &explicit, config.default_priority)?
    } else {
        StrategyPriority::new(
            strategy,
            &graph,
            &WholeTasks(&graph),
            &explicit,
            config.default_priority,
        )?
    };

    log_changes!(
        config.verbosity,
        "Simulating {} task(s) on {} processor(s) with strategy {}",
        tasks.len(),
        config.num_processors,
        strategy.name()
    );

    let mut scheduler = ListScheduler::new(priority).with_verbosity(config.verbosity);
    scheduler.insert_root(config.root_ready_time)?;
    scheduler.create_processors(config.num_processors)?;
    scheduler.insert_precedence_constraints(&graph)?;
    if config.split_subtasks {
        scheduler.insert_tasks(&graph)?;
    } else {
        scheduler.insert_whole_tasks(&graph)?;
    }
    match &config.source_task {
        Some(name) => scheduler.start_scheduling(interner.lookup(name)?)?,
        None => scheduler.start_scheduling_entries()?,
    }
    scheduler.list_schedule()?;
    let plan = scheduler.plan()?;

    let mut result = build_result(&plan, &interner, config);
    let stats = scheduler.stats();
    let metadata = &mut result.algorithm_metadata;
    metadata.insert("algorithm".to_string(), "list_scheduling".to_string());
    metadata.insert("strategy".to_string(), strategy.name().to_string());
    metadata.insert("processors".to_string(), config.num_processors.to_string());
    metadata.insert("vertices".to_string(), stats.vertices.to_string());
    metadata.insert("edges".to_string(), stats.edges.to_string());
    metadata.insert("barriers_fired".to_string(), stats.barriers_fired.to_string());
    metadata.insert("assignments".to_string(), stats.assignments.to_string());

    log_changes!(
        config.verbosity,
        "Simulation done: makespan {} over {} unit(s)",
        result.makespan,
        result.units.len()
    );
    Ok(result)
}

fn build_result(plan: &Plan, interner: &TaskNameInterner, config: &SimulationConfig) -> SimulationResult {
    let name_of = |task: TaskId| interner.resolve(task).unwrap_or_default().to_string();

    let mut units: Vec<ScheduledUnit> = plan
        .entries()
        .iter()
        .map(|entry| ScheduledUnit {
            task_name: name_of(entry.id.task),
            subtask: entry.id.subtask,
            processor: entry.processor,
            ready_time: entry.ready_time,
            finish_time: entry.finish_time,
            exec_time: entry.exec_time,
            start_date: config
                .start_date
                .and_then(|start| project_date(start, entry.ready_time)),
            end_date: config
                .start_date
                .and_then(|start| project_date(start, entry.finish_time)),
        })
        .collect();
    units.sort_by(|a, b| {
        a.ready_time
            .total_cmp(&b.ready_time)
            .then(a.processor.cmp(&b.processor))
    });

    let task_spans = (0..interner.len() as TaskId)
        .filter_map(|task| plan.task_span(task).map(|span| (name_of(task), span)))
        .collect();
    let utilization = (0..plan.num_processors() as u32)
        .map(|p| plan.utilization(p))
        .collect();

    SimulationResult {
        units,
        makespan: plan.makespan(),
        task_spans,
        utilization,
        algorithm_metadata: HashMap::new(),
    }
}

/// Calendar date of `time`, with one time unit per day and partial days
/// rounded up.
fn project_date(start: NaiveDate, time: f64) -> Option<NaiveDate> {
    let days = chrono::Duration::try_days(time.ceil() as i64)?;
    start.checked_add_signed(days)
}
