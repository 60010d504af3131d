//! Vertex kinds of the constraint graph and their time model.
//!
//! Every vertex carries a ready time (earliest moment it may start) and a
//! finish time. Ready times only ever grow: propagation takes the maximum of
//! the current value and each predecessor's finish time.

use std::cmp::Ordering;

use crate::dag::{ComposedId, SubtaskIndex, TaskId};

/// Simulated time (and durations) in abstract units.
pub type Time = f64;

/// Index of a vertex in the constraint graph.
pub type VertexIndex = u32;

/// Index of a processor in the homogeneous pool.
pub type ProcessorIndex = u32;

/// Discriminant of a [`Vertex`], used for typed lookups and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Root,
    ProcessorReady,
    ExecuteTask,
    ExecutionBarrier,
}

impl std::fmt::Display for VertexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VertexKind::Root => "Root",
            VertexKind::ProcessorReady => "ProcessorReady",
            VertexKind::ExecuteTask => "ExecuteTask",
            VertexKind::ExecutionBarrier => "ExecutionBarrier",
        };
        f.write_str(name)
    }
}

/// Ready/finish timestamps shared by every vertex kind.
///
/// Invariant: `ready_time <= finish_time`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timing {
    pub ready_time: Time,
    pub finish_time: Time,
}

impl Timing {
    pub fn at(time: Time) -> Self {
        Self {
            ready_time: time,
            finish_time: time,
        }
    }

    /// Raise the ready time to `time` if it is later (monotonic max).
    pub fn update_ready_time(&mut self, time: Time) {
        self.ready_time = self.ready_time.max(time);
        self.finish_time = self.finish_time.max(self.ready_time);
    }
}

/// The single entry point of the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Root {
    pub ready_time: Time,
}

/// A processor becoming free at `ready_time`.
///
/// Once a task starts on it the node is marked occupied and a fresh node
/// represents the processor's next availability; occupied nodes stay in the
/// graph as history.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorReady {
    pub processor_index: ProcessorIndex,
    pub ready_time: Time,
    pub occupied: bool,
}

impl ProcessorReady {
    pub fn new(processor_index: ProcessorIndex, ready_time: Time) -> Self {
        Self {
            processor_index,
            ready_time,
            occupied: false,
        }
    }

    /// Free nodes sort before occupied ones, then by ascending ready time.
    pub fn availability_cmp(&self, other: &Self) -> Ordering {
        self.occupied
            .cmp(&other.occupied)
            .then(self.ready_time.total_cmp(&other.ready_time))
    }
}

/// One schedulable unit of work: a whole task or one of its subtasks.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecuteTask {
    pub id: ComposedId,
    pub exec_time: Time,
    pub timing: Timing,
    /// Processor the unit was assigned to, once scheduled.
    pub processor: Option<ProcessorIndex>,
}

impl ExecuteTask {
    pub fn new(id: ComposedId, exec_time: Time, ready_time: Time) -> Self {
        Self {
            id,
            exec_time,
            timing: Timing::at(ready_time),
            processor: None,
        }
    }

    #[inline]
    pub fn task(&self) -> TaskId {
        self.id.task
    }

    #[inline]
    pub fn subtask(&self) -> SubtaskIndex {
        self.id.subtask
    }

    #[inline]
    pub fn ready_time(&self) -> Time {
        self.timing.ready_time
    }

    #[inline]
    pub fn finish_time(&self) -> Time {
        self.timing.finish_time
    }

    pub fn update_ready_time(&mut self, time: Time) {
        self.timing.update_ready_time(time);
    }

    /// `finish_time = ready_time + exec_time`.
    pub fn derive_finish_time(&mut self) {
        self.timing.finish_time = self.timing.ready_time + self.exec_time;
    }

    pub fn is_scheduled(&self) -> bool {
        self.processor.is_some()
    }
}

/// Synchronization point gating downstream work until all inputs finish.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionBarrier {
    /// Incoming precedence edges not yet satisfied.
    pub num_waiting_inputs: u32,
    pub timing: Timing,
    pub satisfied: bool,
}

impl ExecutionBarrier {
    pub fn new(ready_time: Time) -> Self {
        Self {
            num_waiting_inputs: 0,
            timing: Timing::at(ready_time),
            satisfied: false,
        }
    }

    #[inline]
    pub fn ready_time(&self) -> Time {
        self.timing.ready_time
    }

    #[inline]
    pub fn finish_time(&self) -> Time {
        self.timing.finish_time
    }

    pub fn update_ready_time(&mut self, time: Time) {
        self.timing.update_ready_time(time);
    }

    /// Mark satisfied; a barrier contributes no delay of its own.
    pub fn fire(&mut self) {
        self.timing.finish_time = self.timing.ready_time;
        self.satisfied = true;
    }
}

/// Tagged union of all vertex kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Vertex {
    Root(Root),
    ProcessorReady(ProcessorReady),
    ExecuteTask(ExecuteTask),
    ExecutionBarrier(ExecutionBarrier),
}

impl Vertex {
    pub fn kind(&self) -> VertexKind {
        match self {
            Vertex::Root(_) => VertexKind::Root,
            Vertex::ProcessorReady(_) => VertexKind::ProcessorReady,
            Vertex::ExecuteTask(_) => VertexKind::ExecuteTask,
            Vertex::ExecutionBarrier(_) => VertexKind::ExecutionBarrier,
        }
    }

    /// Time at which this vertex's successors may start.
    pub fn finish_time(&self) -> Time {
        match self {
            Vertex::Root(r) => r.ready_time,
            Vertex::ProcessorReady(p) => p.ready_time,
            Vertex::ExecuteTask(t) => t.finish_time(),
            Vertex::ExecutionBarrier(b) => b.finish_time(),
        }
    }
}

/// Typed access into the [`Vertex`] union.
pub trait VertexType: Sized {
    const KIND: VertexKind;

    fn from_vertex(vertex: &Vertex) -> Option<&Self>;
    fn from_vertex_mut(vertex: &mut Vertex) -> Option<&mut Self>;
    fn into_vertex(self) -> Vertex;
}

macro_rules! impl_vertex_type {
    ($ty:ident) => {
        impl VertexType for $ty {
            const KIND: VertexKind = VertexKind::$ty;

            #[inline]
            fn from_vertex(vertex: &Vertex) -> Option<&Self> {
                match vertex {
                    Vertex::$ty(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn from_vertex_mut(vertex: &mut Vertex) -> Option<&mut Self> {
                match vertex {
                    Vertex::$ty(v) => Some(v),
                    _ => None,
                }
            }

            #[inline]
            fn into_vertex(self) -> Vertex {
                Vertex::$ty(self)
            }
        }
    };
}

impl_vertex_type!(Root);
impl_vertex_type!(ProcessorReady);
impl_vertex_type!(ExecuteTask);
impl_vertex_type!(ExecutionBarrier);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_ready_time_is_monotonic() {
        let mut timing = Timing::at(5.0);
        timing.update_ready_time(3.0);
        assert_eq!(timing.ready_time, 5.0);
        timing.update_ready_time(8.0);
        assert_eq!(timing.ready_time, 8.0);
        assert!(timing.ready_time <= timing.finish_time);
    }

    #[test]
    fn test_execute_task_finish_time() {
        let mut task = ExecuteTask::new(ComposedId::new(2, 0), 10.0, 0.0);
        task.update_ready_time(4.0);
        task.derive_finish_time();
        assert_eq!(task.ready_time(), 4.0);
        assert_eq!(task.finish_time(), 14.0);
        assert_eq!(task.task(), 2);
    }

    #[test]
    fn test_barrier_fires_at_ready_time() {
        let mut barrier = ExecutionBarrier::new(0.0);
        barrier.update_ready_time(12.5);
        barrier.fire();
        assert!(barrier.satisfied);
        assert_eq!(barrier.finish_time(), 12.5);
        assert_eq!(barrier.ready_time(), barrier.finish_time());
    }

    #[test]
    fn test_processor_ordering() {
        let free_late = ProcessorReady::new(0, 20.0);
        let free_early = ProcessorReady::new(1, 10.0);
        let mut occupied_earliest = ProcessorReady::new(2, 0.0);
        occupied_earliest.occupied = true;

        assert_eq!(free_early.availability_cmp(&free_late), Ordering::Less);
        // Occupied sorts after free regardless of time
        assert_eq!(
            occupied_earliest.availability_cmp(&free_late),
            Ordering::Greater
        );
    }

    #[test]
    fn test_typed_access() {
        let vertex = ExecutionBarrier::new(1.0).into_vertex();
        assert_eq!(vertex.kind(), VertexKind::ExecutionBarrier);
        assert!(ExecutionBarrier::from_vertex(&vertex).is_some());
        assert!(ExecuteTask::from_vertex(&vertex).is_none());
    }
}
