//! Constraint graph: typed vertex arena, edges and the event-sink seam.

mod store;
mod vertex;

pub use store::{ConstraintGraph, EventSink, GraphError};
pub use vertex::{
    ExecuteTask, ExecutionBarrier, ProcessorIndex, ProcessorReady, Root, Time, Timing, Vertex,
    VertexIndex, VertexKind, VertexType,
};
