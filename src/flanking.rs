// Coverage near the ends of edges. For every edge we keep the raw coverage of
// its first `averaging_range` k-mers; the coverage at the end of an edge is the
// coverage at the start of its conjugate.

use std::collections::HashMap;

use tracing::info;

use crate::ext_index::ExtensionIndex;
use crate::graph::{EdgeId, GraphCore, VertexId};
use crate::handler::ActionHandler;
use crate::kmer::KmerWindows;
use crate::verify;

pub struct FlankingCoverage {
    averaging_range: usize,
    raw: HashMap<EdgeId, f64>,
}

impl FlankingCoverage {
    pub fn new(averaging_range: usize) -> Self {
        FlankingCoverage { averaging_range: averaging_range.max(1), raw: HashMap::new() }
    }

    pub fn averaging_range(&self) -> usize {
        self.averaging_range
    }

    fn interval_len(&self, g: &GraphCore, e: EdgeId) -> usize {
        self.averaging_range.min(g.length(e))
    }

    pub fn raw_coverage(&self, e: EdgeId) -> f64 {
        self.raw.get(&e).copied().unwrap_or(0.0)
    }

    pub fn set_raw_coverage(&mut self, e: EdgeId, raw: f64) {
        self.raw.insert(e, raw);
    }

    pub fn in_coverage(&self, g: &GraphCore, e: EdgeId) -> f64 {
        self.raw_coverage(e) / self.interval_len(g, e) as f64
    }

    pub fn out_coverage(&self, g: &GraphCore, e: EdgeId) -> f64 {
        self.in_coverage(g, g.conjugate(e))
    }

    /// Coverage of `e` next to its endpoint `v`.
    ///
    /// # Panics
    /// If `v` is not an endpoint of `e`.
    pub fn local_coverage(&self, g: &GraphCore, e: EdgeId, v: VertexId) -> f64 {
        if g.edge_start(e) == v {
            self.in_coverage(g, e)
        } else {
            verify!(g.edge_end(e) == v, "FlankingCoverage", "vertex is not an endpoint of edge {}", g.edge_str(e));
            self.out_coverage(g, e)
        }
    }

    /// Sums the index counts of the first k-mers of every edge.
    pub fn fill_from_index(&mut self, g: &GraphCore, index: &ExtensionIndex) {
        info!("Filling flanking coverage (averaging range {})", self.averaging_range);
        let k = g.k();
        for e in g.edges() {
            let n = self.interval_len(g, e);
            let nucls = g.nucls(e);
            let raw: u64 = KmerWindows::new(&nucls[..n + k - 1], k).map(|(_, km)| index.count(km) as u64).sum();
            self.raw.insert(e, raw as f64);
        }
    }
}

impl ActionHandler for FlankingCoverage {
    fn name(&self) -> &str {
        "FlankingCoverage"
    }

    fn handle_delete_edge(&mut self, _g: &GraphCore, e: EdgeId) {
        self.raw.remove(&e);
    }

    fn handle_merge(&mut self, g: &GraphCore, old_edges: &[EdgeId], new_edge: EdgeId) {
        let cov = self.in_coverage(g, old_edges[0]);
        let raw = cov * self.interval_len(g, new_edge) as f64;
        self.raw.insert(new_edge, raw);
    }

    fn handle_glue(&mut self, g: &GraphCore, new_edge: EdgeId, edge1: EdgeId, edge2: EdgeId) {
        let cov = self.in_coverage(g, edge1) + self.in_coverage(g, edge2);
        let raw = cov * self.interval_len(g, new_edge) as f64;
        self.raw.insert(new_edge, raw);
    }

    fn handle_split(&mut self, g: &GraphCore, old_edge: EdgeId, new_edge1: EdgeId, new_edge2: EdgeId) {
        let first = self.in_coverage(g, old_edge) * self.interval_len(g, new_edge1) as f64;
        self.raw.insert(new_edge1, first);
        let second = g.coverage(old_edge) * self.interval_len(g, new_edge2) as f64;
        self.raw.insert(new_edge2, second);
        if g.is_self_conjugate(old_edge) {
            let conj = g.conjugate(new_edge1);
            let raw = g.coverage(old_edge) * self.interval_len(g, conj) as f64;
            self.raw.insert(conj, raw);
        }
    }

    fn handle_vertex_split(
        &mut self,
        _g: &GraphCore,
        _new_vertex: VertexId,
        new_edges: &[(EdgeId, EdgeId)],
        coefficients: &[f64],
        _old_vertex: VertexId,
    ) {
        for (&(old, new), &c) in new_edges.iter().zip(coefficients) {
            let raw = self.raw_coverage(old);
            self.raw.insert(new, raw * c);
            self.raw.insert(old, raw * (1.0 - c));
        }
    }
}
