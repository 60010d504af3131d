//! Read-out of a finished schedule.

use rustc_hash::FxHashMap;

use crate::dag::{ComposedId, TaskId};
use crate::graph::{
    ExecuteTask, ExecutionBarrier, ProcessorIndex, ProcessorReady, Time, Vertex, VertexIndex,
};
use crate::priority::PriorityFunction;

use super::core::{BuildPhase, ListScheduler, SchedulerError};

/// Final placement of one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanEntry {
    pub vertex: VertexIndex,
    pub id: ComposedId,
    pub processor: ProcessorIndex,
    pub ready_time: Time,
    pub finish_time: Time,
    pub exec_time: Time,
}

/// Per-unit placements plus processor timelines and task spans.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    entries: Vec<PlanEntry>,
    by_id: FxHashMap<ComposedId, usize>,
    /// Indices into `entries`, in execution order, one list per processor
    timelines: Vec<Vec<usize>>,
    /// `(start, finish)` per task
    spans: Vec<(Time, Time)>,
    start_time: Time,
}

impl Plan {
    /// Units in vertex (insertion) order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entry(&self, id: ComposedId) -> Option<&PlanEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    pub fn num_processors(&self) -> usize {
        self.timelines.len()
    }

    /// Units run by `processor`, in execution order.
    pub fn timeline(&self, processor: ProcessorIndex) -> impl Iterator<Item = &PlanEntry> {
        self.timelines
            .get(processor as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&i| &self.entries[i])
    }

    /// Start of the task's first unit and firing time of its end barrier.
    pub fn task_span(&self, task: TaskId) -> Option<(Time, Time)> {
        self.spans.get(task as usize).copied()
    }

    /// Time from the root to the last finishing task.
    pub fn makespan(&self) -> Time {
        self.spans
            .iter()
            .map(|&(_, finish)| finish)
            .fold(self.start_time, Time::max)
            - self.start_time
    }

    pub fn busy_time(&self, processor: ProcessorIndex) -> Time {
        self.timeline(processor).map(|e| e.exec_time).sum()
    }

    /// Busy share of the makespan; 0 for an empty schedule.
    pub fn utilization(&self, processor: ProcessorIndex) -> f64 {
        let makespan = self.makespan();
        if makespan <= 0.0 {
            return 0.0;
        }
        self.busy_time(processor) / makespan
    }
}

impl<P: PriorityFunction> ListScheduler<P> {
    /// Read the plan out of a completed run.
    pub fn plan(&self) -> Result<Plan, SchedulerError> {
        self.enter("plan", BuildPhase::Done)?;
        let start_time = match self.root {
            Some(root) => self.graph.get(root)?.finish_time(),
            None => 0.0,
        };

        let mut entries = Vec::with_capacity(self.stats.execute_nodes);
        let mut by_id =
            FxHashMap::with_capacity_and_hasher(self.stats.execute_nodes, Default::default());
        let mut slot = vec![usize::MAX; self.graph.len()];
        for (vertex, unit) in self.graph.vertices_as::<ExecuteTask>() {
            let processor = unit
                .processor
                .ok_or(SchedulerError::Unscheduled(vec![unit.id]))?;
            slot[vertex as usize] = entries.len();
            by_id.insert(unit.id, entries.len());
            entries.push(PlanEntry {
                vertex,
                id: unit.id,
                processor,
                ready_time: unit.ready_time(),
                finish_time: unit.finish_time(),
                exec_time: unit.exec_time,
            });
        }

        let mut timelines = Vec::with_capacity(self.processors.len());
        for &first in &self.processors {
            let units = self.walk_timeline(first)?;
            timelines.push(units.into_iter().map(|v| slot[v as usize]).collect());
        }

        let mut spans = Vec::with_capacity(self.barriers.len());
        for barriers in &self.barriers {
            let begin = self.graph.vertex::<ExecutionBarrier>(barriers.begin)?;
            let end = self.graph.vertex::<ExecutionBarrier>(barriers.end)?;
            let mut start = Time::INFINITY;
            for &to in self.graph.outgoing(barriers.begin)? {
                if let Vertex::ExecuteTask(unit) = self.graph.get(to)? {
                    start = start.min(unit.ready_time());
                }
            }
            if start == Time::INFINITY {
                start = begin.finish_time();
            }
            spans.push((start, end.finish_time()));
        }

        Ok(Plan {
            entries,
            by_id,
            timelines,
            spans,
            start_time,
        })
    }

    /// Units served along a processor's `ProcessorReady -> ExecuteTask ->
    /// ProcessorReady` chain, starting at `node`.
    fn walk_timeline(&self, mut node: VertexIndex) -> Result<Vec<VertexIndex>, SchedulerError> {
        let mut units = Vec::new();
        while self.graph.vertex::<ProcessorReady>(node)?.occupied {
            let mut served = None;
            self.graph
                .visit_outgoing_edges::<ProcessorReady, SchedulerError>(node, |_, _, to, v| {
                    if matches!(v, Vertex::ExecuteTask(_)) {
                        served = Some(to);
                    }
                    Ok(())
                })?;
            let Some(unit) = served else { break };

            let mut next = None;
            self.graph
                .visit_outgoing_edges::<ExecuteTask, SchedulerError>(unit, |_, _, to, v| {
                    if matches!(v, Vertex::ProcessorReady(_)) {
                        next = Some(to);
                    }
                    Ok(())
                })?;
            units.push(unit);
            match next {
                Some(next) => node = next,
                None => break,
            }
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskGraph;
    use crate::graph::VertexKind;

    const EPS: f64 = 1e-9;

    fn by_task(id: ComposedId) -> f64 {
        id.task as f64
    }

    fn run(graph: &TaskGraph, processors: u32) -> ListScheduler<fn(ComposedId) -> f64> {
        let mut scheduler = ListScheduler::new(by_task as fn(ComposedId) -> f64);
        scheduler.insert_root(0.0).unwrap();
        scheduler.create_processors(processors).unwrap();
        scheduler.insert_precedence_constraints(graph).unwrap();
        scheduler.insert_tasks(graph).unwrap();
        scheduler.start_scheduling_entries().unwrap();
        scheduler.list_schedule().unwrap();
        scheduler
    }

    fn finish_of(plan: &Plan, task: TaskId) -> f64 {
        plan.task_span(task).unwrap().1
    }

    #[test]
    fn test_linear_chain_single_processor() {
        let graph = TaskGraph::from_edges(&[10.0, 10.0, 10.0], &[(0, 1), (1, 2)]).unwrap();
        let plan = run(&graph, 1).plan().unwrap();

        assert!((finish_of(&plan, 0) - 10.0).abs() < EPS);
        assert!((finish_of(&plan, 1) - 20.0).abs() < EPS);
        assert!((finish_of(&plan, 2) - 30.0).abs() < EPS);
        let order: Vec<_> = plan.timeline(0).map(|e| e.id.task).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!((plan.makespan() - 30.0).abs() < EPS);
        assert!((plan.utilization(0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_fan_out_two_processors() {
        let graph = TaskGraph::from_edges(&[10.0, 10.0, 10.0], &[(0, 1), (0, 2)]).unwrap();
        let plan = run(&graph, 2).plan().unwrap();

        assert!((finish_of(&plan, 0) - 10.0).abs() < EPS);
        let one = plan.entry(ComposedId::new(1, 0)).unwrap();
        let two = plan.entry(ComposedId::new(2, 0)).unwrap();
        assert_ne!(one.processor, two.processor);
        assert!((one.ready_time - 10.0).abs() < EPS);
        assert!((two.ready_time - 10.0).abs() < EPS);
        assert!((one.finish_time - 20.0).abs() < EPS);
        assert!((two.finish_time - 20.0).abs() < EPS);
    }

    #[test]
    fn test_insufficient_processors_delays_third() {
        // 0 -> {1, 2, 3}; task 1 is shorter so its processor frees first
        let graph = TaskGraph::from_edges(
            &[10.0, 5.0, 10.0, 10.0],
            &[(0, 1), (0, 2), (0, 3)],
        )
        .unwrap();
        let plan = run(&graph, 2).plan().unwrap();

        let starts: Vec<_> = (1..4)
            .map(|t| plan.entry(ComposedId::new(t, 0)).unwrap().ready_time)
            .collect();
        let immediate = starts.iter().filter(|&&s| (s - 10.0).abs() < EPS).count();
        assert_eq!(immediate, 2);

        // Task 3 waits for the earlier of the two finishing processors
        let third = plan.entry(ComposedId::new(3, 0)).unwrap();
        assert!((third.ready_time - 15.0).abs() < EPS);
        let first_free = plan.entry(ComposedId::new(1, 0)).unwrap();
        assert_eq!(third.processor, first_free.processor);
    }

    #[test]
    fn test_split_task_runs_in_parallel() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![4.0, 9.0]);
        let scheduler = run(&graph, 2);
        let plan = scheduler.plan().unwrap();

        let a = plan.entry(ComposedId::new(0, 0)).unwrap();
        let b = plan.entry(ComposedId::new(0, 1)).unwrap();
        assert_eq!(a.ready_time, 0.0);
        assert_eq!(b.ready_time, 0.0);
        assert_ne!(a.processor, b.processor);
        assert_eq!(plan.task_span(0), Some((0.0, 9.0)));

        let end = scheduler.task_barriers(0).unwrap().end;
        let barrier = scheduler.graph.vertex::<ExecutionBarrier>(end).unwrap();
        assert_eq!(barrier.ready_time(), barrier.finish_time());
    }

    #[test]
    fn test_entry_lookup_by_id() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![1.0, 2.0, 3.0]);
        graph.add_task(vec![4.0]);
        let plan = run(&graph, 2).plan().unwrap();

        for entry in plan.entries() {
            assert_eq!(plan.entry(entry.id), Some(entry));
        }
        assert_eq!(plan.entry(ComposedId::new(0, 2)).unwrap().exec_time, 3.0);
        assert!(plan.entry(ComposedId::new(0, 3)).is_none());
        assert!(plan.entry(ComposedId::new(5, 0)).is_none());
    }

    #[test]
    fn test_plan_requires_done() {
        let scheduler = ListScheduler::new(by_task as fn(ComposedId) -> f64);
        assert!(matches!(
            scheduler.plan(),
            Err(SchedulerError::StepOutOfOrder { step: "plan", .. })
        ));
    }

    #[test]
    fn test_timing_properties_hold() {
        // Two layers with a join, uneven durations, 3 processors
        let graph = TaskGraph::from_edges(
            &[3.0, 7.0, 2.0, 5.0, 4.0, 1.0],
            &[(0, 2), (0, 3), (1, 3), (1, 4), (2, 5), (3, 5), (4, 5)],
        )
        .unwrap();
        let scheduler = run(&graph, 3);
        let plan = scheduler.plan().unwrap();
        assert_eq!(plan.entries().len(), 6);

        for entry in plan.entries() {
            assert!((entry.finish_time - (entry.ready_time + entry.exec_time)).abs() < EPS);
        }
        for task in 0..6 {
            let (start, _) = plan.task_span(task).unwrap();
            for &pred in scheduler.graph.incoming(scheduler.task_barriers(task).unwrap().begin).iter() {
                if scheduler.graph.kind(pred).unwrap() != VertexKind::ExecutionBarrier {
                    continue;
                }
                let pred_finish = scheduler
                    .graph
                    .vertex::<ExecutionBarrier>(pred)
                    .unwrap()
                    .finish_time();
                assert!(start + EPS >= pred_finish);
            }
        }

        // Occupied nodes serve exactly one unit and have one continuation
        for (index, node) in scheduler.graph.vertices_as::<ProcessorReady>() {
            let out = scheduler.graph.outgoing(index).unwrap();
            if node.occupied {
                assert_eq!(out.len(), 1);
                let unit = out[0];
                let continuations = scheduler
                    .graph
                    .outgoing(unit)
                    .unwrap()
                    .iter()
                    .filter(|&&to| scheduler.graph.kind(to).unwrap() == VertexKind::ProcessorReady)
                    .count();
                assert_eq!(continuations, 1);
            } else {
                assert!(out.is_empty());
            }
        }

        // Timelines never overlap
        for p in 0..plan.num_processors() as ProcessorIndex {
            let line: Vec<_> = plan.timeline(p).collect();
            for pair in line.windows(2) {
                assert!(pair[0].finish_time <= pair[1].ready_time + EPS);
            }
        }
        let total: usize = (0..3).map(|p| plan.timeline(p).count()).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_root_offset_and_empty_task() {
        let mut graph = TaskGraph::new();
        graph.add_task(vec![]);
        graph.add_task(vec![2.0]);
        graph.add_dependency(0, 1).unwrap();

        let mut scheduler = ListScheduler::new(by_task as fn(ComposedId) -> f64);
        scheduler.insert_root(5.0).unwrap();
        scheduler.create_processors(1).unwrap();
        scheduler.insert_precedence_constraints(&graph).unwrap();
        scheduler.insert_tasks(&graph).unwrap();
        scheduler.start_scheduling(0).unwrap();
        scheduler.list_schedule().unwrap();
        let plan = scheduler.plan().unwrap();

        assert_eq!(plan.task_span(0), Some((5.0, 5.0)));
        assert_eq!(plan.task_span(1), Some((5.0, 7.0)));
        assert!((plan.makespan() - 2.0).abs() < EPS);
        assert_eq!(plan.busy_time(0), 2.0);
    }
}
