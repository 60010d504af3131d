//! Graph construction pipeline.
//!
//! Steps must run in order, each exactly once:
//! 1. [`insert_root`](ListScheduler::insert_root)
//! 2. [`create_processors`](ListScheduler::create_processors)
//! 3. [`insert_precedence_constraints`](ListScheduler::insert_precedence_constraints)
//! 4. [`insert_tasks`](ListScheduler::insert_tasks) (or `insert_whole_tasks`)
//! 5. [`start_scheduling`](ListScheduler::start_scheduling) (or `start_scheduling_entries`)
//! 6. [`list_schedule`](ListScheduler::list_schedule)
//!
//! A step run out of order fails with `StepOutOfOrder` and leaves the
//! scheduler untouched; a step failing midway poisons it, and so does a
//! second root.

use crate::dag::{DagError, SubtaskProvider, TaskDag, TaskId, WholeTasks};
use crate::graph::{
    EventSink, ExecuteTask, ExecutionBarrier, ProcessorReady, Root, Time, VertexIndex,
};
use crate::log_changes;
use crate::priority::PriorityFunction;

use super::core::{BuildPhase, ListScheduler, SchedulerError, TaskBarriers};

impl<P: PriorityFunction> ListScheduler<P> {
    /// Step 1: create the root vertex at `ready_time`.
    pub fn insert_root(&mut self, ready_time: Time) -> Result<VertexIndex, SchedulerError> {
        if self.root.is_some() && self.phase != BuildPhase::Poisoned {
            return self.finish_step(
                Err(SchedulerError::RootAlreadyInserted),
                BuildPhase::Poisoned,
            );
        }
        self.enter("insert_root", BuildPhase::Empty)?;
        if !ready_time.is_finite() {
            return Err(SchedulerError::InvalidRootTime(ready_time));
        }
        let result = self.add_vertex(Root { ready_time });
        if let Ok(index) = result {
            self.root = Some(index);
        }
        self.finish_step(result, BuildPhase::RootInserted)
    }

    /// Step 2: one `ProcessorReady` node per processor, linked from the root.
    pub fn create_processors(&mut self, count: u32) -> Result<(), SchedulerError> {
        self.enter("create_processors", BuildPhase::RootInserted)?;
        if count == 0 {
            return Err(SchedulerError::NoProcessors);
        }
        let result = self.add_processors(count);
        self.finish_step(result, BuildPhase::ProcessorsCreated)
    }

    fn add_processors(&mut self, count: u32) -> Result<(), SchedulerError> {
        let (root, root_time) = self.root_vertex()?;
        for i in 0..count {
            let node = self.add_vertex(ProcessorReady::new(i, root_time))?;
            self.add_edge::<Root, ProcessorReady>(root, node)?;
            self.processors.push(node);
        }
        Ok(())
    }

    /// Step 3: begin/end barriers per task, and `end(i) -> begin(j)` for
    /// every DAG edge `i -> j`.
    pub fn insert_precedence_constraints<D: TaskDag + ?Sized>(
        &mut self,
        dag: &D,
    ) -> Result<(), SchedulerError> {
        self.enter("insert_precedence_constraints", BuildPhase::ProcessorsCreated)?;
        let result = self.add_precedence_constraints(dag);
        self.finish_step(result, BuildPhase::ConstraintsInserted)
    }

    fn add_precedence_constraints<D: TaskDag + ?Sized>(
        &mut self,
        dag: &D,
    ) -> Result<(), SchedulerError> {
        let (_, root_time) = self.root_vertex()?;
        let num_tasks = dag.num_tasks();
        self.barriers.reserve(num_tasks);
        for _ in 0..num_tasks {
            let begin = self.add_vertex(ExecutionBarrier::new(root_time))?;
            let end = self.add_vertex(ExecutionBarrier::new(root_time))?;
            self.barriers.push(TaskBarriers { begin, end });
        }

        for task in 0..num_tasks as TaskId {
            let end = self.barriers[task as usize].end;
            for &succ in dag.descendants(task) {
                let begin = self
                    .task_barriers(succ)
                    .ok_or(DagError::UnknownTask(succ))?
                    .begin;
                self.add_edge::<ExecutionBarrier, ExecutionBarrier>(end, begin)?;
            }
        }
        Ok(())
    }

    /// Step 4: one `ExecuteTask` per subtask, wired between its task's
    /// barriers. A task without subtasks links its barriers directly.
    pub fn insert_tasks<S: SubtaskProvider + ?Sized>(
        &mut self,
        subtasks: &S,
    ) -> Result<(), SchedulerError> {
        self.enter("insert_tasks", BuildPhase::ConstraintsInserted)?;
        let result = self.add_tasks(subtasks);
        self.finish_step(result, BuildPhase::TasksInserted)
    }

    /// Step 4 without splitting: every task is a single unit.
    pub fn insert_whole_tasks<D: TaskDag + ?Sized>(&mut self, dag: &D) -> Result<(), SchedulerError> {
        self.insert_tasks(&WholeTasks(dag))
    }

    fn add_tasks<S: SubtaskProvider + ?Sized>(&mut self, subtasks: &S) -> Result<(), SchedulerError> {
        let (_, root_time) = self.root_vertex()?;
        for task in 0..self.barriers.len() as TaskId {
            let TaskBarriers { begin, end } = self.barriers[task as usize];
            let count = subtasks.num_subtasks(task);
            if count == 0 {
                self.add_edge::<ExecutionBarrier, ExecutionBarrier>(begin, end)?;
                continue;
            }
            for subtask in 0..count {
                let exec_time = subtasks.exec_time(task, subtask);
                if !exec_time.is_finite() || exec_time < 0.0 {
                    return Err(DagError::InvalidExecTime {
                        task,
                        subtask,
                        value: exec_time,
                    }
                    .into());
                }
                let id = subtasks.composed_id(task, subtask);
                let unit = self.add_vertex(ExecuteTask::new(id, exec_time, root_time))?;
                self.add_edge::<ExecutionBarrier, ExecuteTask>(begin, unit)?;
                self.add_edge::<ExecuteTask, ExecutionBarrier>(unit, end)?;
            }
        }
        Ok(())
    }

    /// Step 5: link the root to `source_task`'s begin barrier, which must have
    /// no predecessors. Fires the first wave of propagation.
    pub fn start_scheduling(&mut self, source_task: TaskId) -> Result<(), SchedulerError> {
        self.enter("start_scheduling", BuildPhase::TasksInserted)?;
        let begin = self
            .task_barriers(source_task)
            .ok_or(DagError::UnknownTask(source_task))?
            .begin;
        let result = self.link_entries(&[begin]);
        self.finish_step(result, BuildPhase::Started)
    }

    /// Step 5 for DAGs with several entry tasks: link the root to every begin
    /// barrier that has no predecessors, in task order.
    pub fn start_scheduling_entries(&mut self) -> Result<(), SchedulerError> {
        self.enter("start_scheduling", BuildPhase::TasksInserted)?;
        let mut entries = Vec::new();
        for barriers in &self.barriers {
            let begin = self.graph.vertex::<ExecutionBarrier>(barriers.begin)?;
            if begin.num_waiting_inputs == 0 {
                entries.push(barriers.begin);
            }
        }
        let result = self.link_entries(&entries);
        self.finish_step(result, BuildPhase::Started)
    }

    fn link_entries(&mut self, entries: &[VertexIndex]) -> Result<(), SchedulerError> {
        let (root, root_time) = self.root_vertex()?;
        log_changes!(
            self.verbosity,
            "Starting at {} from {} entry barrier(s)",
            root_time,
            entries.len()
        );
        for &begin in entries {
            self.add_edge::<Root, ExecutionBarrier>(root, begin)?;
        }
        Ok(())
    }

    fn root_vertex(&self) -> Result<(VertexIndex, Time), SchedulerError> {
        let root = self.root.ok_or(SchedulerError::StepOutOfOrder {
            step: "root lookup",
            phase: self.phase,
        })?;
        Ok((root, self.graph.vertex::<Root>(root)?.ready_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{ComposedId, TaskGraph};

    fn make_scheduler() -> ListScheduler<impl Fn(ComposedId) -> f64> {
        ListScheduler::new(|id: ComposedId| id.task as f64)
    }

    #[test]
    fn test_root_twice_fails() {
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        assert!(matches!(
            scheduler.insert_root(0.0),
            Err(SchedulerError::RootAlreadyInserted)
        ));
        assert_eq!(scheduler.phase(), BuildPhase::Poisoned);
        assert!(matches!(
            scheduler.create_processors(1),
            Err(SchedulerError::Poisoned)
        ));
        assert!(matches!(
            scheduler.insert_root(0.0),
            Err(SchedulerError::Poisoned)
        ));
    }

    #[test]
    fn test_non_finite_root_time_rejected() {
        let mut scheduler = make_scheduler();
        for time in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = scheduler.insert_root(time).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidRootTime(_)));
            assert!(err.is_input_error());
        }
        // Nothing was inserted, so a valid root is still accepted
        assert_eq!(scheduler.phase(), BuildPhase::Empty);
        scheduler.insert_root(1.0).unwrap();
    }

    #[test]
    fn test_steps_out_of_order() {
        let graph = TaskGraph::from_edges(&[1.0], &[]).unwrap();
        let mut scheduler = make_scheduler();
        assert!(matches!(
            scheduler.create_processors(1),
            Err(SchedulerError::StepOutOfOrder {
                step: "create_processors",
                ..
            })
        ));
        scheduler.insert_root(0.0).unwrap();
        assert!(matches!(
            scheduler.insert_tasks(&graph),
            Err(SchedulerError::StepOutOfOrder { .. })
        ));
        scheduler.create_processors(2).unwrap();
        assert!(matches!(
            scheduler.create_processors(2),
            Err(SchedulerError::StepOutOfOrder { .. })
        ));
        assert_eq!(scheduler.processors().len(), 2);
    }

    #[test]
    fn test_zero_processors_rejected() {
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        assert!(matches!(
            scheduler.create_processors(0),
            Err(SchedulerError::NoProcessors)
        ));
    }

    #[test]
    fn test_processors_start_at_root_time() {
        let mut scheduler = make_scheduler();
        let root = scheduler.insert_root(7.0).unwrap();
        scheduler.create_processors(3).unwrap();

        let times: Vec<_> = scheduler
            .graph
            .vertices_as::<ProcessorReady>()
            .map(|(_, p)| (p.processor_index, p.ready_time))
            .collect();
        assert_eq!(times, vec![(0, 7.0), (1, 7.0), (2, 7.0)]);
        assert_eq!(scheduler.graph.outgoing(root).unwrap(), scheduler.processors());
    }

    #[test]
    fn test_subtasks_wired_to_task_barriers() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![3.0, 5.0]);
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_tasks(&graph).unwrap();

        let TaskBarriers { begin, end } = scheduler.task_barriers(0).unwrap();
        let units = scheduler.graph.outgoing(begin).unwrap().to_vec();
        assert_eq!(units.len(), 2);
        for unit in units {
            assert_eq!(scheduler.graph.outgoing(unit).unwrap(), &[end]);
        }
        let end_barrier = scheduler.graph.vertex::<ExecutionBarrier>(end).unwrap();
        assert_eq!(end_barrier.num_waiting_inputs, 2);
    }

    #[test]
    fn test_whole_tasks_single_unit() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![3.0, 5.0]);
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_whole_tasks(&graph).unwrap();

        let units: Vec<_> = scheduler
            .graph
            .vertices_as::<ExecuteTask>()
            .map(|(_, t)| t.exec_time)
            .collect();
        assert_eq!(units, vec![8.0]);
    }

    #[test]
    fn test_empty_task_links_barriers() {
        // 0 (no subtasks) -> 1
        let mut graph = TaskGraph::new();
        graph.add_task(vec![]);
        graph.add_task(vec![4.0]);
        graph.add_dependency(0, 1).unwrap();

        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_tasks(&graph).unwrap();
        scheduler.start_scheduling(0).unwrap();

        // Begin and end of task 0 fire immediately and release task 1
        assert_eq!(scheduler.ready_len(), 1);
        scheduler.list_schedule().unwrap();
        let end1 = scheduler.task_barriers(1).unwrap().end;
        let finish = scheduler
            .graph
            .vertex::<ExecutionBarrier>(end1)
            .unwrap()
            .finish_time();
        assert_eq!(finish, 4.0);
    }

    #[test]
    fn test_invalid_subtask_time_poisons() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![f64::NAN]);
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        let err = scheduler.insert_tasks(&graph).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Dag(DagError::InvalidExecTime { task: 0, .. })
        ));
        assert_eq!(scheduler.phase(), BuildPhase::Poisoned);
    }

    #[test]
    fn test_unknown_source_task() {
        let graph = TaskGraph::from_edges(&[1.0], &[]).unwrap();
        let mut scheduler = make_scheduler();
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_tasks(&graph).unwrap();
        assert!(matches!(
            scheduler.start_scheduling(4),
            Err(SchedulerError::Dag(DagError::UnknownTask(4)))
        ));
    }

    #[test]
    fn test_entries_linked_in_task_order() {
        let graph = TaskGraph::from_edges(&[1.0, 1.0, 1.0], &[(0, 1)]).unwrap();
        let mut scheduler = make_scheduler();
        let root = scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_tasks(&graph).unwrap();
        scheduler.start_scheduling_entries().unwrap();

        let linked: Vec<_> = scheduler
            .graph
            .outgoing(root)
            .unwrap()
            .iter()
            .skip(1) // processor node
            .copied()
            .collect();
        let begin0 = scheduler.task_barriers(0).unwrap().begin;
        let begin2 = scheduler.task_barriers(2).unwrap().begin;
        assert_eq!(linked, vec![begin0, begin2]);
        assert_eq!(scheduler.ready_len(), 2);
    }
}
