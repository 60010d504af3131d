//! Task DAG providers consumed by the scheduler.
//!
//! The scheduler only needs two capabilities from its host: a task DAG
//! ([`TaskDag`]) and, optionally, a way to split tasks into independently
//! schedulable subtasks ([`SubtaskProvider`]). [`TaskGraph`] is the concrete
//! adapter used by the simulation entry point and the tests.

use std::collections::VecDeque;

use thiserror::Error;

use crate::graph::Time;

/// Dense logical task identifier in `[0, num_tasks)`.
pub type TaskId = u32;

/// Index of a subtask within its task.
pub type SubtaskIndex = u32;

/// Identifier of one schedulable unit: a task plus the subtask within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComposedId {
    pub task: TaskId,
    pub subtask: SubtaskIndex,
}

impl ComposedId {
    pub fn new(task: TaskId, subtask: SubtaskIndex) -> Self {
        Self { task, subtask }
    }
}

impl std::fmt::Display for ComposedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.task, self.subtask)
    }
}

/// Errors found while building or validating a task DAG.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DagError {
    #[error("Circular dependency detected in task graph")]
    CircularDependency,
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),
    #[error("Unknown task name: {0}")]
    UnknownTaskName(String),
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),
    #[error("Invalid execution time {value} for task {task} subtask {subtask}")]
    InvalidExecTime {
        task: TaskId,
        subtask: SubtaskIndex,
        value: Time,
    },
}

/// Precedence structure of the logical tasks.
pub trait TaskDag {
    fn num_tasks(&self) -> usize;

    /// Direct successors of `task`.
    fn descendants(&self, task: TaskId) -> &[TaskId];

    /// Execution time of the task when it runs as a single unit.
    fn task_exec_time(&self, task: TaskId) -> Time;
}

/// Optional capability: split tasks into subtasks sharing the task's barriers.
pub trait SubtaskProvider {
    fn num_subtasks(&self, task: TaskId) -> SubtaskIndex;

    fn composed_id(&self, task: TaskId, subtask: SubtaskIndex) -> ComposedId {
        ComposedId::new(task, subtask)
    }

    fn exec_time(&self, task: TaskId, subtask: SubtaskIndex) -> Time;
}

/// Treats every task of a DAG as exactly one subtask.
pub struct WholeTasks<'a, D: ?Sized>(pub &'a D);

impl<D: TaskDag + ?Sized> SubtaskProvider for WholeTasks<'_, D> {
    fn num_subtasks(&self, _task: TaskId) -> SubtaskIndex {
        1
    }

    fn exec_time(&self, task: TaskId, _subtask: SubtaskIndex) -> Time {
        self.0.task_exec_time(task)
    }
}

/// Topological order of a DAG (Kahn's algorithm).
///
/// Fails with `CircularDependency` if some tasks are never released, and
/// with `UnknownTask` if a successor id is out of range.
pub fn topological_order<D: TaskDag + ?Sized>(dag: &D) -> Result<Vec<TaskId>, DagError> {
    let n = dag.num_tasks();
    let mut in_degree = vec![0usize; n];
    for task in 0..n as TaskId {
        for &succ in dag.descendants(task) {
            let degree = in_degree
                .get_mut(succ as usize)
                .ok_or(DagError::UnknownTask(succ))?;
            *degree += 1;
        }
    }

    let mut queue: VecDeque<TaskId> = (0..n as TaskId)
        .filter(|&t| in_degree[t as usize] == 0)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(task) = queue.pop_front() {
        order.push(task);
        for &succ in dag.descendants(task) {
            let degree = &mut in_degree[succ as usize];
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(succ);
            }
        }
    }

    if order.len() != n {
        return Err(DagError::CircularDependency);
    }
    Ok(order)
}

/// Longest execution path from each task to any exit, inclusive.
///
/// A task weighs as much as its longest subtask, since its subtasks may run
/// side by side.
pub fn bottom_levels<D, S>(dag: &D, subtasks: &S) -> Result<Vec<Time>, DagError>
where
    D: TaskDag + ?Sized,
    S: SubtaskProvider + ?Sized,
{
    let order = topological_order(dag)?;
    let mut levels = vec![0.0; dag.num_tasks()];

    for &task in order.iter().rev() {
        let weight = (0..subtasks.num_subtasks(task))
            .map(|k| subtasks.exec_time(task, k))
            .fold(0.0, Time::max);
        let tail = dag
            .descendants(task)
            .iter()
            .map(|&succ| levels[succ as usize])
            .fold(0.0, Time::max);
        levels[task as usize] = weight + tail;
    }

    Ok(levels)
}

/// In-memory task DAG with per-task subtask execution times.
#[derive(Clone, Debug, Default)]
pub struct TaskGraph {
    subtasks: Vec<Vec<Time>>,
    successors: Vec<Vec<TaskId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subtasks: Vec::with_capacity(capacity),
            successors: Vec::with_capacity(capacity),
        }
    }

    /// Build a graph of unsplit tasks from durations and `(from, to)` edges.
    pub fn from_edges(exec_times: &[Time], edges: &[(TaskId, TaskId)]) -> Result<Self, DagError> {
        let mut graph = Self::with_capacity(exec_times.len());
        for &time in exec_times {
            graph.add_task(vec![time]);
        }
        for &(from, to) in edges {
            graph.add_dependency(from, to)?;
        }
        Ok(graph)
    }

    /// Add a task made of the given subtasks. An empty list is allowed and
    /// yields a task that takes no processor time.
    pub fn add_task(&mut self, subtask_exec_times: Vec<Time>) -> TaskId {
        let id = self.subtasks.len() as TaskId;
        self.subtasks.push(subtask_exec_times);
        self.successors.push(Vec::new());
        id
    }

    /// `to` may not start before `from` finishes.
    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) -> Result<(), DagError> {
        if to as usize >= self.subtasks.len() {
            return Err(DagError::UnknownTask(to));
        }
        self.successors
            .get_mut(from as usize)
            .ok_or(DagError::UnknownTask(from))?
            .push(to);
        Ok(())
    }

    pub fn subtask_exec_times(&self, task: TaskId) -> &[Time] {
        self.subtasks
            .get(task as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check execution times and acyclicity; returns a topological order.
    pub fn validate(&self) -> Result<Vec<TaskId>, DagError> {
        for (task, times) in self.subtasks.iter().enumerate() {
            for (subtask, &value) in times.iter().enumerate() {
                if !value.is_finite() || value < 0.0 {
                    return Err(DagError::InvalidExecTime {
                        task: task as TaskId,
                        subtask: subtask as SubtaskIndex,
                        value,
                    });
                }
            }
        }
        topological_order(self)
    }
}

impl TaskDag for TaskGraph {
    fn num_tasks(&self) -> usize {
        self.subtasks.len()
    }

    fn descendants(&self, task: TaskId) -> &[TaskId] {
        self.successors
            .get(task as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn task_exec_time(&self, task: TaskId) -> Time {
        self.subtask_exec_times(task).iter().sum()
    }
}

impl SubtaskProvider for TaskGraph {
    fn num_subtasks(&self, task: TaskId) -> SubtaskIndex {
        self.subtask_exec_times(task).len() as SubtaskIndex
    }

    fn exec_time(&self, task: TaskId, subtask: SubtaskIndex) -> Time {
        self.subtask_exec_times(task)
            .get(subtask as usize)
            .copied()
            .unwrap_or(0.0)
    }
}
