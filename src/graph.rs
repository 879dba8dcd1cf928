// The observable assembly graph.
//
// `GraphCore` owns the vertex and edge records and exposes read-only queries.
// `Graph` wraps it together with the action handler registry; every structural
// change goes through one of its mutation methods, which update the core and
// broadcast the change to the registered handlers. Handlers only ever receive a
// `&GraphCore`, so a handler cannot mutate the graph from inside a callback.
//
// Vertices and edges always come in conjugate (reverse-complement) pairs. An
// edge from v to w has its conjugate going from conj(w) to conj(v); incoming
// edges of v are therefore never stored, they are the conjugates of the
// outgoing edges of conj(v).

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::rc::Rc;

use tracing::debug;

use crate::arena::{Arena, Handle};
use crate::error::InvariantViolation;
use crate::handler::{ActionHandler, HandlerRef, HandlerRegistry};
use crate::smart_iter::SmartIterator;
use crate::utils::revcomp;
use crate::verify;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(Handle);

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(Handle);

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{}", self.0.index(), self.0.generation())
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}.{}", self.0.index(), self.0.generation())
    }
}

struct VertexData {
    conjugate: VertexId,
    outgoing: Vec<EdgeId>,
    int_id: u64,
}

struct EdgeData {
    start: VertexId,
    end: VertexId,
    conjugate: EdgeId,
    nucls: Vec<u8>,
    raw_coverage: f64,
    int_id: u64,
}

#[cold]
fn missing(kind: &str, id: &dyn fmt::Debug) -> ! {
    let violation = InvariantViolation::new("Graph", format!("{} {:?} is not in the graph", kind, id));
    tracing::error!("{}", violation);
    panic!("{}", violation)
}

/// Vertex and edge storage plus every read-only query.
pub struct GraphCore {
    k: usize,
    vertices: Arena<VertexData>,
    edges: Arena<EdgeData>,
    next_int_id: u64,
}

impl GraphCore {
    fn new(k: usize) -> Self {
        GraphCore { k, vertices: Arena::new(), edges: Arena::new(), next_int_id: 1 }
    }

    fn vertex(&self, v: VertexId) -> &VertexData {
        self.vertices.get(v.0).unwrap_or_else(|| missing("vertex", &v))
    }

    fn vertex_mut(&mut self, v: VertexId) -> &mut VertexData {
        self.vertices.get_mut(v.0).unwrap_or_else(|| missing("vertex", &v))
    }

    fn edge(&self, e: EdgeId) -> &EdgeData {
        self.edges.get(e.0).unwrap_or_else(|| missing("edge", &e))
    }

    fn edge_mut(&mut self, e: EdgeId) -> &mut EdgeData {
        self.edges.get_mut(e.0).unwrap_or_else(|| missing("edge", &e))
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(v.0)
    }

    pub fn contains_edge(&self, e: EdgeId) -> bool {
        self.edges.contains(e.0)
    }

    /// All vertices ordered by stable id.
    pub fn vertices(&self) -> Vec<VertexId> {
        let mut vs: Vec<(u64, VertexId)> = self.vertices.iter().map(|(h, d)| (d.int_id, VertexId(h))).collect();
        vs.sort_unstable();
        vs.into_iter().map(|(_, v)| v).collect()
    }

    /// All edges ordered by stable id.
    pub fn edges(&self) -> Vec<EdgeId> {
        let mut es: Vec<(u64, EdgeId)> = self.edges.iter().map(|(h, d)| (d.int_id, EdgeId(h))).collect();
        es.sort_unstable();
        es.into_iter().map(|(_, e)| e).collect()
    }

    pub fn conjugate(&self, e: EdgeId) -> EdgeId {
        self.edge(e).conjugate
    }

    pub fn conjugate_vertex(&self, v: VertexId) -> VertexId {
        self.vertex(v).conjugate
    }

    pub fn edge_start(&self, e: EdgeId) -> VertexId {
        self.edge(e).start
    }

    pub fn edge_end(&self, e: EdgeId) -> VertexId {
        self.edge(e).end
    }

    pub fn outgoing_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex(v).outgoing
    }

    pub fn incoming_edges(&self, v: VertexId) -> Vec<EdgeId> {
        let conj = self.conjugate_vertex(v);
        self.outgoing_edges(conj).iter().map(|&e| self.conjugate(e)).collect()
    }

    pub fn out_degree(&self, v: VertexId) -> usize {
        self.vertex(v).outgoing.len()
    }

    pub fn in_degree(&self, v: VertexId) -> usize {
        self.out_degree(self.conjugate_vertex(v))
    }

    pub fn unique_outgoing(&self, v: VertexId) -> Option<EdgeId> {
        match self.outgoing_edges(v) {
            [e] => Some(*e),
            _ => None,
        }
    }

    pub fn unique_incoming(&self, v: VertexId) -> Option<EdgeId> {
        self.unique_outgoing(self.conjugate_vertex(v)).map(|e| self.conjugate(e))
    }

    pub fn is_dead_start(&self, v: VertexId) -> bool {
        self.in_degree(v) == 0
    }

    pub fn is_dead_end(&self, v: VertexId) -> bool {
        self.out_degree(v) == 0
    }

    pub fn edges_between(&self, from: VertexId, to: VertexId) -> Vec<EdgeId> {
        self.outgoing_edges(from).iter().copied().filter(|&e| self.edge_end(e) == to).collect()
    }

    /// Number of k-mer steps, i.e. `nucls(e).len() - k`.
    pub fn length(&self, e: EdgeId) -> usize {
        self.edge(e).nucls.len() - self.k
    }

    pub fn nucls(&self, e: EdgeId) -> &[u8] {
        &self.edge(e).nucls
    }

    pub fn raw_coverage(&self, e: EdgeId) -> f64 {
        self.edge(e).raw_coverage
    }

    /// Average k-mer coverage.
    pub fn coverage(&self, e: EdgeId) -> f64 {
        self.raw_coverage(e) / self.length(e) as f64
    }

    pub fn edge_int_id(&self, e: EdgeId) -> u64 {
        self.edge(e).int_id
    }

    pub fn vertex_int_id(&self, v: VertexId) -> u64 {
        self.vertex(v).int_id
    }

    pub fn is_self_conjugate(&self, e: EdgeId) -> bool {
        self.conjugate(e) == e
    }

    /// Next stable id to be handed out; ids are never reused.
    pub fn next_int_id(&self) -> u64 {
        self.next_int_id
    }

    pub fn edge_str(&self, e: EdgeId) -> String {
        format!(
            "{} ({} -> {}, len {})",
            self.edge_int_id(e),
            self.vertex_int_id(self.edge_start(e)),
            self.vertex_int_id(self.edge_end(e)),
            self.length(e)
        )
    }

    fn take_ids(&mut self, ids: Option<(u64, u64)>) -> (u64, u64) {
        match ids {
            Some((a, b)) => {
                self.next_int_id = self.next_int_id.max(a.saturating_add(1)).max(b.saturating_add(1));
                (a, b)
            }
            None => {
                let a = self.next_int_id;
                self.next_int_id += 2;
                (a, a + 1)
            }
        }
    }

    /// Makes sure ids handed out from now on are at least `next`.
    pub(crate) fn reserve_int_ids(&mut self, next: u64) {
        self.next_int_id = self.next_int_id.max(next);
    }

    pub(crate) fn hidden_add_vertex_pair(&mut self, ids: Option<(u64, u64)>) -> VertexId {
        let (id, conj_id) = self.take_ids(ids);
        let v = VertexId(self.vertices.insert_with(|h| VertexData {
            conjugate: VertexId(h),
            outgoing: Vec::new(),
            int_id: id,
        }));
        let c = VertexId(self.vertices.insert(VertexData { conjugate: v, outgoing: Vec::new(), int_id: conj_id }));
        self.vertex_mut(v).conjugate = c;
        v
    }

    pub(crate) fn hidden_add_self_conjugate_vertex(&mut self, id: Option<u64>) -> VertexId {
        let (id, _) = match id {
            Some(id) => self.take_ids(Some((id, id))),
            None => self.take_ids(None),
        };
        VertexId(self.vertices.insert_with(|h| VertexData { conjugate: VertexId(h), outgoing: Vec::new(), int_id: id }))
    }

    /// Adds `e` and its conjugate (or a single edge when it is its own conjugate).
    pub(crate) fn hidden_add_edge(
        &mut self,
        from: VertexId,
        to: VertexId,
        nucls: Vec<u8>,
        raw_coverage: f64,
        ids: Option<(u64, u64)>,
    ) -> EdgeId {
        verify!(
            self.contains_vertex(from) && self.contains_vertex(to),
            "AddEdge",
            "endpoints {:?} -> {:?} must be in the graph",
            from,
            to
        );
        verify!(
            nucls.len() > self.k,
            "AddEdge",
            "sequence of {} nucleotides is not longer than k={}",
            nucls.len(),
            self.k
        );
        let rc = revcomp(&nucls);
        let conj_from = self.conjugate_vertex(to);
        let conj_to = self.conjugate_vertex(from);
        if conj_from == from && rc == nucls {
            let (id, _) = match ids {
                Some((id, _)) => self.take_ids(Some((id, id))),
                None => self.take_ids(None),
            };
            let e = EdgeId(self.edges.insert_with(|h| EdgeData {
                start: from,
                end: to,
                conjugate: EdgeId(h),
                nucls,
                raw_coverage,
                int_id: id,
            }));
            self.vertex_mut(from).outgoing.push(e);
            return e;
        }
        let (id, conj_id) = self.take_ids(ids);
        let e = EdgeId(self.edges.insert_with(|h| EdgeData {
            start: from,
            end: to,
            conjugate: EdgeId(h),
            nucls,
            raw_coverage,
            int_id: id,
        }));
        let c = EdgeId(self.edges.insert(EdgeData {
            start: conj_from,
            end: conj_to,
            conjugate: e,
            nucls: rc,
            raw_coverage,
            int_id: conj_id,
        }));
        self.edge_mut(e).conjugate = c;
        self.vertex_mut(from).outgoing.push(e);
        self.vertex_mut(conj_from).outgoing.push(c);
        e
    }

    pub(crate) fn hidden_delete_edge(&mut self, e: EdgeId) {
        let c = self.conjugate(e);
        for &x in [e, c].iter() {
            let start = self.edge_start(x);
            self.vertex_mut(start).outgoing.retain(|&o| o != x);
        }
        self.edges.remove(e.0);
        if c != e {
            self.edges.remove(c.0);
        }
    }

    pub(crate) fn hidden_delete_vertex(&mut self, v: VertexId) {
        let c = self.conjugate_vertex(v);
        self.vertices.remove(v.0);
        if c != v {
            self.vertices.remove(c.0);
        }
    }

    /// Sets the raw coverage of `e` and of its conjugate.
    pub(crate) fn set_raw_coverage(&mut self, e: EdgeId, raw_coverage: f64) {
        let c = self.conjugate(e);
        self.edge_mut(e).raw_coverage = raw_coverage;
        self.edge_mut(c).raw_coverage = raw_coverage;
    }
}

/// Element kinds that can be enumerated, ordered and tracked by handlers.
pub trait GraphElement: Copy + Eq + Ord + Hash + fmt::Debug + 'static {
    fn int_id(self, g: &GraphCore) -> u64;
    fn from_vertex(v: VertexId) -> Option<Self>;
    fn from_edge(e: EdgeId) -> Option<Self>;
    fn all(g: &GraphCore) -> Vec<Self>;
}

impl GraphElement for VertexId {
    fn int_id(self, g: &GraphCore) -> u64 {
        g.vertex_int_id(self)
    }
    fn from_vertex(v: VertexId) -> Option<Self> {
        Some(v)
    }
    fn from_edge(_: EdgeId) -> Option<Self> {
        None
    }
    fn all(g: &GraphCore) -> Vec<Self> {
        g.vertices()
    }
}

impl GraphElement for EdgeId {
    fn int_id(self, g: &GraphCore) -> u64 {
        g.edge_int_id(self)
    }
    fn from_vertex(_: VertexId) -> Option<Self> {
        None
    }
    fn from_edge(e: EdgeId) -> Option<Self> {
        Some(e)
    }
    fn all(g: &GraphCore) -> Vec<Self> {
        g.edges()
    }
}

/// The graph together with its action handlers.
///
/// # Panics
///
/// Every mutation checks its structural precondition and aborts with an
/// `InvariantViolation` when a caller breaks it. A handler must not be
/// borrowed by its owner while a mutation is running.
pub struct Graph {
    core: GraphCore,
    handlers: HandlerRegistry,
}

impl Deref for Graph {
    type Target = GraphCore;

    fn deref(&self) -> &GraphCore {
        &self.core
    }
}

impl Graph {
    pub fn new(k: usize) -> Self {
        Graph { core: GraphCore::new(k), handlers: HandlerRegistry::default() }
    }

    pub fn core(&self) -> &GraphCore {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut GraphCore {
        &mut self.core
    }

    /// # Panics
    /// If the same handler is already registered.
    pub fn add_action_handler(&self, handler: HandlerRef) {
        self.handlers.add(handler);
    }

    /// Returns false if the handler was not registered.
    pub fn remove_action_handler<H: ActionHandler + ?Sized>(&self, handler: &Rc<RefCell<H>>) -> bool {
        self.handlers.remove(handler)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn add_vertex(&mut self) -> VertexId {
        let v = self.core.hidden_add_vertex_pair(None);
        self.handlers.fire_add_vertex(&self.core, v);
        v
    }

    pub fn add_self_conjugate_vertex(&mut self) -> VertexId {
        let v = self.core.hidden_add_self_conjugate_vertex(None);
        self.handlers.fire_add_vertex(&self.core, v);
        v
    }

    /// Adds an edge spelling `nucls` from `from` to `to`, together with its conjugate.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId, nucls: Vec<u8>, raw_coverage: f64) -> EdgeId {
        let e = self.core.hidden_add_edge(from, to, nucls, raw_coverage, None);
        self.handlers.fire_add_edge(&self.core, e);
        e
    }

    pub fn delete_edge(&mut self, e: EdgeId) {
        self.handlers.fire_delete_edge(&self.core, e);
        self.core.hidden_delete_edge(e);
    }

    /// # Panics
    /// If `v` (or its conjugate) still has incident edges.
    pub fn delete_vertex(&mut self, v: VertexId) {
        verify!(
            self.out_degree(v) == 0 && self.in_degree(v) == 0,
            "DeleteVertex",
            "vertex {} has {} outgoing and {} incoming edges",
            self.vertex_int_id(v),
            self.out_degree(v),
            self.in_degree(v)
        );
        self.handlers.fire_delete_vertex(&self.core, v);
        self.core.hidden_delete_vertex(v);
    }

    /// Adds `delta` to the raw coverage of `e` and of its conjugate.
    pub fn inc_coverage(&mut self, e: EdgeId, delta: f64) {
        let raw = self.raw_coverage(e) + delta;
        self.core.set_raw_coverage(e, raw);
    }

    /// Replaces a simple non-branching chain of edges with one edge.
    ///
    /// # Panics
    /// If consecutive edges do not meet, an inner vertex branches or is also an
    /// endpoint, or the path holds an edge together with its conjugate.
    pub fn merge_path(&mut self, path: &[EdgeId]) -> EdgeId {
        verify!(!path.is_empty(), "MergePath", "empty path");
        let k = self.k();
        let mut seen_edges = HashSet::new();
        for &e in path {
            verify!(
                !seen_edges.contains(&e) && !seen_edges.contains(&self.conjugate(e)),
                "MergePath",
                "edge {} occurs twice (or with its conjugate) in the path",
                self.edge_int_id(e)
            );
            seen_edges.insert(e);
        }
        let from = self.edge_start(path[0]);
        let to = self.edge_end(path[path.len() - 1]);
        let endpoints = [from, to, self.conjugate_vertex(from), self.conjugate_vertex(to)];
        let mut inner = Vec::with_capacity(path.len() - 1);
        let mut seen_vertices = HashSet::new();
        for pair in path.windows(2) {
            let v = self.edge_end(pair[0]);
            verify!(
                v == self.edge_start(pair[1]),
                "MergePath",
                "edges {} and {} are not consecutive",
                self.edge_int_id(pair[0]),
                self.edge_int_id(pair[1])
            );
            verify!(
                self.in_degree(v) == 1 && self.out_degree(v) == 1,
                "MergePath",
                "inner vertex {} branches",
                self.vertex_int_id(v)
            );
            let conj = self.conjugate_vertex(v);
            verify!(
                !endpoints.contains(&v) && !seen_vertices.contains(&v) && !seen_vertices.contains(&conj),
                "MergePath",
                "inner vertex {} is also an endpoint",
                self.vertex_int_id(v)
            );
            seen_vertices.insert(v);
            inner.push(v);
        }

        let mut nucls = self.nucls(path[0]).to_vec();
        for &e in &path[1..] {
            nucls.extend_from_slice(&self.nucls(e)[k..]);
        }
        let raw_coverage: f64 = path.iter().map(|&e| self.raw_coverage(e)).sum();
        let new_edge = self.core.hidden_add_edge(from, to, nucls, raw_coverage, None);
        debug!("Merging {} edges into {}", path.len(), self.edge_int_id(new_edge));

        self.handlers.fire_merge(&self.core, path, new_edge);
        for &e in path {
            self.handlers.fire_delete_edge(&self.core, e);
        }
        for &v in &inner {
            self.handlers.fire_delete_vertex(&self.core, v);
        }
        for &e in path {
            self.core.hidden_delete_edge(e);
        }
        for &v in &inner {
            self.core.hidden_delete_vertex(v);
        }
        self.handlers.fire_add_edge(&self.core, new_edge);
        new_edge
    }

    pub fn can_compress_vertex(&self, v: VertexId) -> bool {
        match (self.unique_incoming(v), self.unique_outgoing(v)) {
            (Some(incoming), Some(outgoing)) => {
                let around = [v, self.conjugate_vertex(v)];
                incoming != self.conjugate(outgoing)
                    && around[0] != around[1]
                    && !around.contains(&self.edge_start(incoming))
                    && !around.contains(&self.edge_end(outgoing))
            }
            _ => false,
        }
    }

    /// Merges the single incoming and outgoing edges of `v`, if that is possible.
    pub fn compress_vertex(&mut self, v: VertexId) -> Option<EdgeId> {
        if !self.can_compress_vertex(v) {
            return None;
        }
        let incoming = self.unique_incoming(v)?;
        let outgoing = self.unique_outgoing(v)?;
        Some(self.merge_path(&[incoming, outgoing]))
    }

    /// Unifies two parallel edges into one carrying `e2`'s sequence and both coverages.
    ///
    /// # Panics
    /// If the edges are not parallel, are the same edge or conjugate to each other.
    pub fn glue_edges(&mut self, e1: EdgeId, e2: EdgeId) -> EdgeId {
        verify!(
            e1 != e2 && e1 != self.conjugate(e2),
            "GlueEdges",
            "edges {} and {} are the same pair",
            self.edge_int_id(e1),
            self.edge_int_id(e2)
        );
        let (from, to) = (self.edge_start(e2), self.edge_end(e2));
        verify!(
            self.edge_start(e1) == from && self.edge_end(e1) == to,
            "GlueEdges",
            "edges {} and {} are not parallel",
            self.edge_str(e1),
            self.edge_str(e2)
        );
        verify!(
            self.is_self_conjugate(e1) == self.is_self_conjugate(e2),
            "GlueEdges",
            "only one of edges {} and {} is self-conjugate",
            self.edge_int_id(e1),
            self.edge_int_id(e2)
        );
        let raw_coverage = self.raw_coverage(e1) + self.raw_coverage(e2);
        let nucls = self.nucls(e2).to_vec();
        let new_edge = self.core.hidden_add_edge(from, to, nucls, raw_coverage, None);

        self.handlers.fire_glue(&self.core, new_edge, e1, e2);
        self.handlers.fire_delete_edge(&self.core, e1);
        self.handlers.fire_delete_edge(&self.core, e2);
        self.core.hidden_delete_edge(e1);
        self.core.hidden_delete_edge(e2);
        self.handlers.fire_add_edge(&self.core, new_edge);
        new_edge
    }

    /// Cuts `e` after `pos` k-mer steps. Coverage is apportioned by length.
    /// A self-conjugate edge is cut symmetrically: the second edge returned is the
    /// self-conjugate middle part and the conjugate of the first closes the chain.
    ///
    /// # Panics
    /// Unless `0 < pos < length(e)` (`2 * pos < length(e)` for a self-conjugate edge).
    pub fn split_edge(&mut self, e: EdgeId, pos: usize) -> (EdgeId, EdgeId) {
        let k = self.k();
        let len = self.length(e);
        let self_conjugate = self.is_self_conjugate(e);
        let in_range = if self_conjugate { 2 * pos < len } else { pos < len };
        verify!(
            pos > 0 && in_range,
            "SplitEdge",
            "position {} is out of range for edge {}",
            pos,
            self.edge_str(e)
        );
        let nucls = self.nucls(e).to_vec();
        let raw = self.raw_coverage(e);
        let (start, end) = (self.edge_start(e), self.edge_end(e));
        let fraction = |steps: usize| raw * steps as f64 / len as f64;

        let split_vertex = self.core.hidden_add_vertex_pair(None);
        let first = self.core.hidden_add_edge(start, split_vertex, nucls[..pos + k].to_vec(), fraction(pos), None);
        let second = if self_conjugate {
            let conj_split = self.conjugate_vertex(split_vertex);
            let middle = nucls[pos..nucls.len() - pos].to_vec();
            self.core.hidden_add_edge(split_vertex, conj_split, middle, fraction(len - 2 * pos), None)
        } else {
            self.core.hidden_add_edge(split_vertex, end, nucls[pos..].to_vec(), fraction(len - pos), None)
        };

        self.handlers.fire_split(&self.core, e, first, second);
        self.handlers.fire_delete_edge(&self.core, e);
        self.core.hidden_delete_edge(e);
        self.handlers.fire_add_vertex(&self.core, split_vertex);
        self.handlers.fire_add_edge(&self.core, first);
        self.handlers.fire_add_edge(&self.core, second);
        (first, second)
    }

    /// Creates a new vertex taking over the listed edges incident to `v`.
    /// Each edge is copied onto the new vertex with `coefficients[i]` of its
    /// coverage; the original keeps the rest and is removed when its
    /// coefficient reaches 1. Returns the new vertex and (original, copy) pairs.
    ///
    /// # Panics
    /// If an edge is not incident to `v`, touches `conj(v)`, is listed twice,
    /// a coefficient is outside [0, 1] or `v` is self-conjugate.
    pub fn split_vertex(
        &mut self,
        v: VertexId,
        edges: &[EdgeId],
        coefficients: &[f64],
    ) -> (VertexId, Vec<(EdgeId, EdgeId)>) {
        verify!(
            edges.len() == coefficients.len(),
            "VertexSplit",
            "{} edges but {} coefficients",
            edges.len(),
            coefficients.len()
        );
        let conj_v = self.conjugate_vertex(v);
        verify!(conj_v != v, "VertexSplit", "vertex {} is self-conjugate", self.vertex_int_id(v));
        let mut seen = HashSet::new();
        for (&e, &c) in edges.iter().zip(coefficients) {
            let (s, t) = (self.edge_start(e), self.edge_end(e));
            verify!(
                (s == v || t == v) && s != conj_v && t != conj_v,
                "VertexSplit",
                "edge {} is not incident to vertex {} only",
                self.edge_str(e),
                self.vertex_int_id(v)
            );
            verify!(seen.insert(e), "VertexSplit", "edge {} is listed twice", self.edge_int_id(e));
            verify!((0.0..=1.0).contains(&c), "VertexSplit", "coefficient {} is outside [0, 1]", c);
        }

        let new_vertex = self.core.hidden_add_vertex_pair(None);
        let mut pairs = Vec::with_capacity(edges.len());
        for (&e, &c) in edges.iter().zip(coefficients) {
            let s = if self.edge_start(e) == v { new_vertex } else { self.edge_start(e) };
            let t = if self.edge_end(e) == v { new_vertex } else { self.edge_end(e) };
            let raw = self.raw_coverage(e);
            let nucls = self.nucls(e).to_vec();
            let copy = self.core.hidden_add_edge(s, t, nucls, raw * c, None);
            self.core.set_raw_coverage(e, raw * (1.0 - c));
            pairs.push((e, copy));
        }

        self.handlers.fire_vertex_split(&self.core, new_vertex, &pairs, coefficients, v);
        self.handlers.fire_add_vertex(&self.core, new_vertex);
        for &(_, copy) in &pairs {
            self.handlers.fire_add_edge(&self.core, copy);
        }
        for (&(old, _), &c) in pairs.iter().zip(coefficients) {
            if c >= 1.0 {
                self.handlers.fire_delete_edge(&self.core, old);
                self.core.hidden_delete_edge(old);
            }
        }
        (new_vertex, pairs)
    }

    /// Edges in descending stable-id order, including edges added during the traversal.
    pub fn smart_edge_iter(&self) -> SmartIterator<EdgeId, u64> {
        self.smart_iter_by_key(|g, e: EdgeId| g.edge_int_id(e), true)
    }

    /// Vertices in descending stable-id order, including vertices added during the traversal.
    pub fn smart_vertex_iter(&self) -> SmartIterator<VertexId, u64> {
        self.smart_iter_by_key(|g, v: VertexId| g.vertex_int_id(v), true)
    }

    /// Iterates elements by decreasing `key`. With `add_new`, elements created while
    /// the iterator is alive are visited too; deleted elements are never yielded.
    pub fn smart_iter_by_key<E, K, F>(&self, key: F, add_new: bool) -> SmartIterator<E, K>
    where
        E: GraphElement,
        K: Ord + 'static,
        F: Fn(&GraphCore, E) -> K + 'static,
    {
        SmartIterator::new(&self.core, &self.handlers, Box::new(key), add_new)
    }
}
