//! Append-only store of typed vertices and directed edges.
//!
//! Vertices live in a contiguous arena and are addressed by [`VertexIndex`];
//! references are never held across insertions, callers re-fetch by index.
//! Edges are kept per source vertex in insertion order and are never removed.
//!
//! The store holds no scheduling policy. Reactions to insertions live in an
//! [`EventSink`], the type that owns the store.

use thiserror::Error;

use super::vertex::{Vertex, VertexIndex, VertexKind, VertexType};

/// Errors raised by typed vertex access and insertion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Vertex index space exhausted (limit {limit})")]
    Overflow { limit: usize },
    #[error("Vertex {index} is a {found}, expected {expected}")]
    TypeMismatch {
        index: VertexIndex,
        expected: VertexKind,
        found: VertexKind,
    },
    #[error("Unknown vertex: {0}")]
    UnknownVertex(VertexIndex),
}

/// Arena of vertices plus an adjacency list keyed by source index.
#[derive(Clone, Debug)]
pub struct ConstraintGraph {
    vertices: Vec<Vertex>,
    /// Outgoing edges per vertex, parallel to `vertices`
    outgoing: Vec<Vec<VertexIndex>>,
    num_edges: usize,
    limit: usize,
}

impl Default for ConstraintGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraph {
    pub fn new() -> Self {
        Self::with_limit(VertexIndex::MAX as usize)
    }

    /// Create a store that refuses to grow past `limit` vertices.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            vertices: Vec::new(),
            outgoing: Vec::new(),
            num_edges: 0,
            limit: limit.min(VertexIndex::MAX as usize),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Append a vertex without notifying anyone. See [`EventSink::add_vertex`].
    pub fn push_vertex<V: VertexType>(&mut self, vertex: V) -> Result<VertexIndex, GraphError> {
        if self.vertices.len() >= self.limit {
            return Err(GraphError::Overflow { limit: self.limit });
        }
        let index = self.vertices.len() as VertexIndex;
        self.vertices.push(vertex.into_vertex());
        self.outgoing.push(Vec::new());
        Ok(index)
    }

    /// Record an edge after checking both endpoints' kinds.
    pub fn push_edge<F: VertexType, T: VertexType>(
        &mut self,
        from: VertexIndex,
        to: VertexIndex,
    ) -> Result<(), GraphError> {
        self.vertex::<F>(from)?;
        self.vertex::<T>(to)?;
        self.outgoing[from as usize].push(to);
        self.num_edges += 1;
        Ok(())
    }

    pub fn get(&self, index: VertexIndex) -> Result<&Vertex, GraphError> {
        self.vertices
            .get(index as usize)
            .ok_or(GraphError::UnknownVertex(index))
    }

    pub fn kind(&self, index: VertexIndex) -> Result<VertexKind, GraphError> {
        self.get(index).map(Vertex::kind)
    }

    /// Typed lookup; fails if the stored vertex is of another kind.
    pub fn vertex<V: VertexType>(&self, index: VertexIndex) -> Result<&V, GraphError> {
        let vertex = self.get(index)?;
        V::from_vertex(vertex).ok_or(GraphError::TypeMismatch {
            index,
            expected: V::KIND,
            found: vertex.kind(),
        })
    }

    pub fn vertex_mut<V: VertexType>(&mut self, index: VertexIndex) -> Result<&mut V, GraphError> {
        let vertex = self
            .vertices
            .get_mut(index as usize)
            .ok_or(GraphError::UnknownVertex(index))?;
        let found = vertex.kind();
        V::from_vertex_mut(vertex).ok_or(GraphError::TypeMismatch {
            index,
            expected: V::KIND,
            found,
        })
    }

    /// Destinations of all edges leaving `from`, in insertion order.
    pub fn outgoing(&self, from: VertexIndex) -> Result<&[VertexIndex], GraphError> {
        self.outgoing
            .get(from as usize)
            .map(Vec::as_slice)
            .ok_or(GraphError::UnknownVertex(from))
    }

    /// All vertices of kind `V`, in insertion order.
    pub fn vertices_as<'a, V: VertexType + 'a>(
        &'a self,
    ) -> impl Iterator<Item = (VertexIndex, &'a V)> + 'a {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| V::from_vertex(v).map(|typed| (i as VertexIndex, typed)))
    }

    /// Vertices of kind `V` matching `predicate`.
    pub fn filtered_vertices<'a, V: VertexType + 'a>(
        &'a self,
        mut predicate: impl FnMut(&V) -> bool + 'a,
    ) -> impl Iterator<Item = (VertexIndex, &'a V)> + 'a {
        self.vertices_as::<V>().filter(move |&(_, v)| predicate(v))
    }

    /// Call `visitor` for every edge leaving `from` (a `F` vertex), in edge
    /// order, with both endpoints. The destination is passed untyped for the
    /// visitor to dispatch on.
    pub fn visit_outgoing_edges<F, E>(
        &self,
        from: VertexIndex,
        mut visitor: impl FnMut(VertexIndex, &F, VertexIndex, &Vertex) -> Result<(), E>,
    ) -> Result<(), E>
    where
        F: VertexType,
        E: From<GraphError>,
    {
        let source = self.vertex::<F>(from)?;
        for &to in self.outgoing(from)? {
            visitor(from, source, to, self.get(to)?)?;
        }
        Ok(())
    }

    /// Sources of all edges pointing at `to`. Linear in the number of edges.
    pub fn incoming(&self, to: VertexIndex) -> Vec<VertexIndex> {
        self.outgoing
            .iter()
            .enumerate()
            .flat_map(|(from, targets)| {
                targets
                    .iter()
                    .filter(move |&&t| t == to)
                    .map(move |_| from as VertexIndex)
            })
            .collect()
    }
}

/// Capability set of the type that owns a [`ConstraintGraph`] and reacts to
/// its mutations.
///
/// Insertions go through the provided methods so that every vertex and edge
/// is announced exactly once. Hooks may insert further vertices and edges;
/// they receive indices only and re-fetch whatever they need.
pub trait EventSink: Sized {
    type Error: From<GraphError>;

    fn graph(&self) -> &ConstraintGraph;
    fn graph_mut(&mut self) -> &mut ConstraintGraph;

    fn on_vertex_added(&mut self, index: VertexIndex, kind: VertexKind) -> Result<(), Self::Error>;
    fn on_edge_added(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), Self::Error>;

    fn add_vertex<V: VertexType>(&mut self, vertex: V) -> Result<VertexIndex, Self::Error> {
        let index = self.graph_mut().push_vertex(vertex)?;
        self.on_vertex_added(index, V::KIND)?;
        Ok(index)
    }

    fn add_edge<F: VertexType, T: VertexType>(
        &mut self,
        from: VertexIndex,
        to: VertexIndex,
    ) -> Result<(), Self::Error> {
        self.graph_mut().push_edge::<F, T>(from, to)?;
        self.on_edge_added(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::vertex::{ExecutionBarrier, ProcessorReady, Root};

    /// Sink that records every notification.
    #[derive(Default)]
    struct Recorder {
        graph: ConstraintGraph,
        vertices: Vec<(VertexIndex, VertexKind)>,
        edges: Vec<(VertexIndex, VertexIndex)>,
    }

    impl EventSink for Recorder {
        type Error = GraphError;

        fn graph(&self) -> &ConstraintGraph {
            &self.graph
        }

        fn graph_mut(&mut self) -> &mut ConstraintGraph {
            &mut self.graph
        }

        fn on_vertex_added(&mut self, index: VertexIndex, kind: VertexKind) -> Result<(), GraphError> {
            self.vertices.push((index, kind));
            Ok(())
        }

        fn on_edge_added(&mut self, from: VertexIndex, to: VertexIndex) -> Result<(), GraphError> {
            self.edges.push((from, to));
            Ok(())
        }
    }

    #[test]
    fn test_add_vertex_and_edge_notify() {
        let mut sink = Recorder::default();
        let root = sink.add_vertex(Root { ready_time: 0.0 }).unwrap();
        let proc0 = sink.add_vertex(ProcessorReady::new(0, 0.0)).unwrap();
        sink.add_edge::<Root, ProcessorReady>(root, proc0).unwrap();

        assert_eq!(
            sink.vertices,
            vec![(0, VertexKind::Root), (1, VertexKind::ProcessorReady)]
        );
        assert_eq!(sink.edges, vec![(root, proc0)]);
        assert_eq!(sink.graph.num_edges(), 1);
    }

    #[test]
    fn test_type_mismatch() {
        let mut graph = ConstraintGraph::new();
        let idx = graph.push_vertex(Root { ready_time: 0.0 }).unwrap();
        let err = graph.vertex::<ExecutionBarrier>(idx).unwrap_err();
        assert_eq!(
            err,
            GraphError::TypeMismatch {
                index: idx,
                expected: VertexKind::ExecutionBarrier,
                found: VertexKind::Root,
            }
        );
    }

    #[test]
    fn test_edge_kind_checked_before_insert() {
        let mut graph = ConstraintGraph::new();
        let root = graph.push_vertex(Root { ready_time: 0.0 }).unwrap();
        let barrier = graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap();
        assert!(graph
            .push_edge::<Root, ProcessorReady>(root, barrier)
            .is_err());
        assert_eq!(graph.num_edges(), 0);
        assert!(graph.outgoing(root).unwrap().is_empty());
    }

    #[test]
    fn test_overflow() {
        let mut graph = ConstraintGraph::with_limit(2);
        graph.push_vertex(Root { ready_time: 0.0 }).unwrap();
        graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap();
        let err = graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap_err();
        assert_eq!(err, GraphError::Overflow { limit: 2 });
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_duplicate_edges_and_order() {
        let mut graph = ConstraintGraph::new();
        let a = graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap();
        let b = graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap();
        let c = graph.push_vertex(ExecutionBarrier::new(0.0)).unwrap();
        graph.push_edge::<ExecutionBarrier, ExecutionBarrier>(a, c).unwrap();
        graph.push_edge::<ExecutionBarrier, ExecutionBarrier>(a, b).unwrap();
        graph.push_edge::<ExecutionBarrier, ExecutionBarrier>(a, c).unwrap();

        assert_eq!(graph.outgoing(a).unwrap(), &[c, b, c]);
        assert_eq!(graph.incoming(c), vec![a, a]);
    }

    #[test]
    fn test_filtered_vertices() {
        let mut graph = ConstraintGraph::new();
        graph.push_vertex(Root { ready_time: 0.0 }).unwrap();
        graph.push_vertex(ProcessorReady::new(0, 0.0)).unwrap();
        let mut busy = ProcessorReady::new(1, 0.0);
        busy.occupied = true;
        graph.push_vertex(busy).unwrap();

        let free: Vec<VertexIndex> = graph
            .filtered_vertices::<ProcessorReady>(|p| !p.occupied)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(free, vec![1]);
        assert_eq!(graph.vertices_as::<ProcessorReady>().count(), 2);
    }

    #[test]
    fn test_visit_outgoing_edges_dispatches_kind() {
        let mut sink = Recorder::default();
        let root = sink.add_vertex(Root { ready_time: 3.0 }).unwrap();
        let p = sink.add_vertex(ProcessorReady::new(0, 0.0)).unwrap();
        let b = sink.add_vertex(ExecutionBarrier::new(0.0)).unwrap();
        sink.add_edge::<Root, ProcessorReady>(root, p).unwrap();
        sink.add_edge::<Root, ExecutionBarrier>(root, b).unwrap();

        let mut seen = Vec::new();
        sink.graph
            .visit_outgoing_edges::<Root, GraphError>(root, |from, source, to, dest| {
                assert_eq!(source.ready_time, 3.0);
                seen.push((from, to, dest.kind()));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (root, p, VertexKind::ProcessorReady),
                (root, b, VertexKind::ExecutionBarrier)
            ]
        );

        // Wrong source kind is rejected
        let err = sink
            .graph
            .visit_outgoing_edges::<ExecutionBarrier, GraphError>(root, |_, _, _, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }
}
