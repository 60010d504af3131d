//! List scheduler state and the edge-driven propagation engine.
//!
//! [`ListScheduler`] owns the constraint graph and is its [`EventSink`]:
//! every edge insertion is reacted to synchronously, and barrier satisfaction
//! cascades depth-first through an explicit work stack so deep barrier chains
//! cannot exhaust the call stack.

use thiserror::Error;

use crate::dag::{ComposedId, DagError, TaskId};
use crate::graph::{
    ConstraintGraph, EventSink, ExecuteTask, ExecutionBarrier, GraphError, ProcessorReady, Root,
    VertexIndex, VertexKind, VertexType,
};
use crate::priority::{PriorityFunction, UnknownStrategy};
use crate::{log_changes, log_checks, log_debug};

use super::policy::ReadyQueue;

/// Errors that abort a scheduling run.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Dag(#[from] DagError),
    #[error(transparent)]
    UnknownStrategy(#[from] UnknownStrategy),
    #[error("Barrier {0} received more inputs than it waits on")]
    BarrierUnderflow(VertexIndex),
    #[error("Barrier {0} is already satisfied")]
    BarrierAlreadySatisfied(VertexIndex),
    #[error("Barrier {index} linked from the root still waits on {waiting} inputs")]
    RootBarrierNotReady { index: VertexIndex, waiting: u32 },
    #[error("Processor node {0} is already occupied")]
    ProcessorAlreadyOccupied(VertexIndex),
    #[error("Unit {0} is already scheduled")]
    UnitAlreadyScheduled(ComposedId),
    #[error("Root vertex already inserted")]
    RootAlreadyInserted,
    #[error("Step {step} cannot run in phase {phase:?}")]
    StepOutOfOrder { step: &'static str, phase: BuildPhase },
    #[error("Root ready time must be finite, got {0}")]
    InvalidRootTime(f64),
    #[error("At least one processor is required")]
    NoProcessors,
    #[error("No available processor for ready unit {0}")]
    NoAvailableProcessor(ComposedId),
    #[error("Units never became ready: {0:?}")]
    Unscheduled(Vec<ComposedId>),
    #[error("Scheduler aborted by an earlier error")]
    Poisoned,
}

impl SchedulerError {
    /// Whether the error stems from caller input rather than a broken
    /// invariant during the run.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Dag(_)
                | SchedulerError::UnknownStrategy(_)
                | SchedulerError::InvalidRootTime(_)
                | SchedulerError::NoProcessors
        )
    }
}

/// Construction progress. Each pipeline step requires exactly the phase left
/// by the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    Empty,
    RootInserted,
    ProcessorsCreated,
    ConstraintsInserted,
    TasksInserted,
    Started,
    Done,
    /// A fatal error occurred; the graph may be inconsistent.
    Poisoned,
}

/// Begin/end barrier vertices of one logical task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskBarriers {
    pub begin: VertexIndex,
    pub end: VertexIndex,
}

/// Counters collected while the graph is built and scheduled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub vertices: usize,
    pub processor_nodes: usize,
    pub execute_nodes: usize,
    pub barrier_nodes: usize,
    pub edges: usize,
    pub barriers_fired: usize,
    pub assignments: usize,
}

/// Multiprocessor list scheduler over a constraint graph.
pub struct ListScheduler<P> {
    pub(super) graph: ConstraintGraph,
    pub(super) phase: BuildPhase,
    pub(super) root: Option<VertexIndex>,
    /// Initial `ProcessorReady` node of each processor
    pub(super) processors: Vec<VertexIndex>,
    pub(super) barriers: Vec<TaskBarriers>,
    pub(super) queue: ReadyQueue,
    pub(super) priority: P,
    /// Edges waiting to be re-driven, top of stack first
    pending: Vec<(VertexIndex, VertexIndex)>,
    propagating: bool,
    pub(super) stats: SchedulerStats,
    pub(super) verbosity: u8,
}

impl<P: PriorityFunction> ListScheduler<P> {
    pub fn new(priority: P) -> Self {
        Self::with_graph(priority, ConstraintGraph::new())
    }

    /// Start from a caller-provided (empty) store, e.g. one with a vertex limit.
    pub fn with_graph(priority: P, graph: ConstraintGraph) -> Self {
        Self {
            graph,
            phase: BuildPhase::Empty,
            root: None,
            processors: Vec::new(),
            barriers: Vec::new(),
            queue: ReadyQueue::default(),
            priority,
            pending: Vec::new(),
            propagating: false,
            stats: SchedulerStats::default(),
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn root(&self) -> Option<VertexIndex> {
        self.root
    }

    pub fn processors(&self) -> &[VertexIndex] {
        &self.processors
    }

    pub fn barrier_map(&self) -> &[TaskBarriers] {
        &self.barriers
    }

    pub fn task_barriers(&self, task: TaskId) -> Option<TaskBarriers> {
        self.barriers.get(task as usize).copied()
    }

    pub fn ready_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Fail unless the scheduler is in `expected`.
    pub(super) fn enter(&self, step: &'static str, expected: BuildPhase) -> Result<(), SchedulerError> {
        match self.phase {
            BuildPhase::Poisoned => Err(SchedulerError::Poisoned),
            phase if phase == expected => Ok(()),
            phase => Err(SchedulerError::StepOutOfOrder { step, phase }),
        }
    }

    /// Advance to `next` on success; poison the run on failure.
    pub(super) fn finish_step<T>(
        &mut self,
        result: Result<T, SchedulerError>,
        next: BuildPhase,
    ) -> Result<T, SchedulerError> {
        match result {
            Ok(value) => {
                self.phase = next;
                Ok(value)
            }
            Err(err) => {
                self.poison(&err);
                Err(err)
            }
        }
    }

    /// Abort the run; every later step fails with `Poisoned`.
    pub(super) fn poison(&mut self, err: &SchedulerError) {
        if self.phase != BuildPhase::Poisoned {
            log_changes!(self.verbosity, "Scheduling aborted: {}", err);
            self.phase = BuildPhase::Poisoned;
        }
    }

    /// Queue every edge leaving `from` for re-driving, first edge on top.
    fn schedule_outgoing<F: VertexType>(&mut self, from: VertexIndex) -> Result<(), SchedulerError> {
        let start = self.pending.len();
        let pending = &mut self.pending;
        self.graph
            .visit_outgoing_edges::<F, SchedulerError>(from, |from, _, to, _| {
                pending.push((from, to));
                Ok(())
            })?;
        self.pending[start..].reverse();
        Ok(())
    }

    /// Re-drive queued edges until none are left.
    fn drain_propagation(&mut self) -> Result<(), SchedulerError> {
        if self.propagating {
            // An outer drain picks up whatever was queued
            return Ok(());
        }
        self.propagating = true;
        let mut result = Ok(());
        while let Some((from, to)) = self.pending.pop() {
            if let Err(err) = self.propagate(from, to) {
                self.pending.clear();
                result = Err(err);
                break;
            }
        }
        self.propagating = false;
        result
    }

    /// Propagation dispatch for an edge whose source has finished.
    fn propagate(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), SchedulerError> {
        match (self.graph.kind(from)?, self.graph.kind(to)?) {
            (VertexKind::ExecutionBarrier, VertexKind::ExecutionBarrier) => {
                self.satisfy_input(from, to)
            }
            (VertexKind::ExecuteTask, VertexKind::ExecutionBarrier) => self.satisfy_input(from, to),
            (VertexKind::ExecutionBarrier, VertexKind::ExecuteTask) => self.release_unit(from, to),
            // Processor continuations carry no precedence
            _ => Ok(()),
        }
    }

    /// Count one more precedence input on barrier `to`.
    fn register_input(&mut self, to: VertexIndex) -> Result<(), SchedulerError> {
        let barrier = self.graph.vertex_mut::<ExecutionBarrier>(to)?;
        if barrier.satisfied {
            return Err(SchedulerError::BarrierAlreadySatisfied(to));
        }
        barrier.num_waiting_inputs += 1;
        Ok(())
    }

    /// A predecessor of barrier `to` finished.
    fn satisfy_input(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), SchedulerError> {
        let finish = self.graph.get(from)?.finish_time();
        let barrier = self.graph.vertex_mut::<ExecutionBarrier>(to)?;
        if barrier.num_waiting_inputs == 0 {
            return Err(SchedulerError::BarrierUnderflow(to));
        }
        barrier.num_waiting_inputs -= 1;
        barrier.update_ready_time(finish);

        if barrier.num_waiting_inputs > 0 {
            log_checks!(
                self.verbosity,
                "    Barrier {} waits on {} more input(s)",
                to,
                barrier.num_waiting_inputs
            );
            return Ok(());
        }

        barrier.fire();
        let fired_at = barrier.finish_time();
        self.stats.barriers_fired += 1;
        log_checks!(self.verbosity, "    Barrier {} fired at {}", to, fired_at);
        self.schedule_outgoing::<ExecutionBarrier>(to)
    }

    /// Barrier `from` fired: unit `to` may run from its finish time on.
    fn release_unit(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), SchedulerError> {
        let finish = self.graph.vertex::<ExecutionBarrier>(from)?.finish_time();
        let unit = self.graph.vertex_mut::<ExecuteTask>(to)?;
        unit.update_ready_time(finish);
        let (id, ready) = (unit.id, unit.ready_time());

        let priority = self.priority.priority(id);
        self.queue.push(to, priority);
        log_checks!(
            self.verbosity,
            "    Unit {} ready at {} (priority {})",
            id,
            ready,
            priority
        );
        Ok(())
    }

    /// Root linked to an entry barrier: fire it and cascade.
    fn release_from_root(&mut self, root: VertexIndex, to: VertexIndex) -> Result<(), SchedulerError> {
        let root_time = self.graph.vertex::<Root>(root)?.ready_time;
        let barrier = self.graph.vertex_mut::<ExecutionBarrier>(to)?;
        if barrier.satisfied {
            return Err(SchedulerError::BarrierAlreadySatisfied(to));
        }
        if barrier.num_waiting_inputs > 0 {
            return Err(SchedulerError::RootBarrierNotReady {
                index: to,
                waiting: barrier.num_waiting_inputs,
            });
        }
        barrier.update_ready_time(root_time);
        barrier.fire();
        self.stats.barriers_fired += 1;
        log_checks!(self.verbosity, "    Entry barrier {} fired at {}", to, root_time);

        self.schedule_outgoing::<ExecutionBarrier>(to)?;
        self.drain_propagation()
    }

    /// Processor node `processor` starts unit `unit`.
    fn assign(&mut self, processor: VertexIndex, unit: VertexIndex) -> Result<(), SchedulerError> {
        let (processor_index, available_at) = {
            let node = self.graph.vertex_mut::<ProcessorReady>(processor)?;
            if node.occupied {
                return Err(SchedulerError::ProcessorAlreadyOccupied(processor));
            }
            node.occupied = true;
            (node.processor_index, node.ready_time)
        };

        let (id, start, finish) = {
            let task = self.graph.vertex_mut::<ExecuteTask>(unit)?;
            if task.is_scheduled() {
                return Err(SchedulerError::UnitAlreadyScheduled(task.id));
            }
            task.update_ready_time(available_at);
            task.derive_finish_time();
            task.processor = Some(processor_index);
            (task.id, task.ready_time(), task.finish_time())
        };
        self.stats.assignments += 1;
        log_changes!(
            self.verbosity,
            "  Scheduled unit {} on processor {} from {} to {}",
            id,
            processor_index,
            start,
            finish
        );

        // The processor's next availability continues its timeline
        let next = self.add_vertex(ProcessorReady::new(processor_index, finish))?;
        self.add_edge::<ExecuteTask, ProcessorReady>(unit, next)?;

        self.schedule_outgoing::<ExecuteTask>(unit)?;
        self.drain_propagation()
    }
}

impl<P: PriorityFunction> EventSink for ListScheduler<P> {
    type Error = SchedulerError;

    fn graph(&self) -> &ConstraintGraph {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut ConstraintGraph {
        &mut self.graph
    }

    // Insertions abort the run on failure, whichever path they come from
    fn add_vertex<V: VertexType>(&mut self, vertex: V) -> Result<VertexIndex, SchedulerError> {
        let result = self
            .graph
            .push_vertex(vertex)
            .map_err(SchedulerError::from)
            .and_then(|index| self.on_vertex_added(index, V::KIND).map(|()| index));
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    fn add_edge<F: VertexType, T: VertexType>(
        &mut self,
        from: VertexIndex,
        to: VertexIndex,
    ) -> Result<(), SchedulerError> {
        let result = self
            .graph
            .push_edge::<F, T>(from, to)
            .map_err(SchedulerError::from)
            .and_then(|()| self.on_edge_added(from, to));
        if let Err(err) = &result {
            self.poison(err);
        }
        result
    }

    fn on_vertex_added(&mut self, index: VertexIndex, kind: VertexKind) -> Result<(), SchedulerError> {
        self.stats.vertices += 1;
        match kind {
            VertexKind::ProcessorReady => self.stats.processor_nodes += 1,
            VertexKind::ExecuteTask => self.stats.execute_nodes += 1,
            VertexKind::ExecutionBarrier => self.stats.barrier_nodes += 1,
            VertexKind::Root => {}
        }
        log_debug!(self.verbosity, "      + vertex {} ({})", index, kind);
        Ok(())
    }

    fn on_edge_added(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), SchedulerError> {
        self.stats.edges += 1;
        let kinds = (self.graph.kind(from)?, self.graph.kind(to)?);
        log_debug!(
            self.verbosity,
            "      + edge {} ({}) -> {} ({})",
            from,
            kinds.0,
            to,
            kinds.1
        );

        match kinds {
            (VertexKind::ExecutionBarrier, VertexKind::ExecutionBarrier)
            | (VertexKind::ExecuteTask, VertexKind::ExecutionBarrier) => self.register_input(to),
            (VertexKind::Root, VertexKind::ExecutionBarrier) => self.release_from_root(from, to),
            (VertexKind::ProcessorReady, VertexKind::ExecuteTask) => self.assign(from, to),
            // Structural links; they only matter once their source finishes
            _ => Ok(()),
        }
    }
}
