//! Greedy list-scheduling policy: ready-queue ordering and processor choice.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::dag::ComposedId;
use crate::graph::{EventSink, ExecuteTask, ProcessorReady, VertexIndex};
use crate::log_changes;
use crate::log_debug;
use crate::priority::PriorityFunction;

use super::core::{BuildPhase, ListScheduler, SchedulerError};

#[derive(Clone, Copy, Debug)]
struct ReadyEntry {
    priority: f64,
    /// Enqueue order; breaks priority ties
    seq: u64,
    vertex: VertexIndex,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReadyEntry {}

impl Ord for ReadyEntry {
    // Reversed so the max-heap pops the lowest priority value first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of ready `ExecuteTask` vertices; lower priority value first.
#[derive(Clone, Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<ReadyEntry>,
    next_seq: u64,
}

impl ReadyQueue {
    pub fn push(&mut self, vertex: VertexIndex, priority: f64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ReadyEntry {
            priority,
            seq,
            vertex,
        });
    }

    pub fn pop(&mut self) -> Option<VertexIndex> {
        self.heap.pop().map(|entry| entry.vertex)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<P: PriorityFunction> ListScheduler<P> {
    /// Earliest-available free processor node, if any.
    ///
    /// Among equally early nodes the oldest one wins.
    pub fn select_processor(&self) -> Option<VertexIndex> {
        self.graph
            .filtered_vertices::<ProcessorReady>(|p| !p.occupied)
            .min_by(|(_, a), (_, b)| a.availability_cmp(b))
            .map(|(index, _)| index)
    }

    /// Step 6: drain the ready queue, assigning each popped unit to the
    /// earliest-available processor.
    ///
    /// Every assignment may release further units. Fails with
    /// `Unscheduled` if some units never became ready.
    pub fn list_schedule(&mut self) -> Result<(), SchedulerError> {
        self.enter("list_schedule", BuildPhase::Started)?;
        let result = self.drain_ready_queue();
        self.finish_step(result, BuildPhase::Done)
    }

    fn drain_ready_queue(&mut self) -> Result<(), SchedulerError> {
        log_changes!(
            self.verbosity,
            "List scheduling {} ready unit(s) on {} processor(s)",
            self.queue.len(),
            self.processors.len()
        );

        while let Some(unit) = self.queue.pop() {
            let Some(processor) = self.select_processor() else {
                let id = self.graph.vertex::<ExecuteTask>(unit)?.id;
                return Err(SchedulerError::NoAvailableProcessor(id));
            };
            log_debug!(
                self.verbosity,
                "    Selected processor node {} for vertex {}",
                processor,
                unit
            );
            self.add_edge::<ProcessorReady, ExecuteTask>(processor, unit)?;
        }

        let unscheduled: Vec<ComposedId> = self
            .graph
            .filtered_vertices::<ExecuteTask>(|t| !t.is_scheduled())
            .map(|(_, t)| t.id)
            .collect();
        if !unscheduled.is_empty() {
            return Err(SchedulerError::Unscheduled(unscheduled));
        }

        log_changes!(
            self.verbosity,
            "List scheduling done: {} assignment(s)",
            self.stats.assignments
        );
        Ok(())
    }
}
