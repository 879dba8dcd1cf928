// Turns the extension index into the initial assembly graph.
//
// Junction k-mers (in-degree or out-degree different from one) become vertices,
// the conjugate of the vertex of k-mer x being the vertex of rc(x). Every
// extension leaving a junction is followed through non-junction k-mers up to the
// next junction and becomes an edge; the walk spelled from the other strand is
// the conjugate edge and is not walked again. What remains unconsumed after that
// are pure cycles, which are opened at their smallest k-mer.
// Canonical k-mers are visited in sorted order, so stable ids only depend on the input.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{Error, InvariantViolation, Result};
use crate::ext_index::ExtensionIndex;
use crate::graph::{Graph, VertexId};
use crate::kmer::{decode, Kmer};

fn violation(detail: String) -> Error {
    Error::Invariant(InvariantViolation::new("Condense", detail))
}

struct Walk {
    end: Kmer,
    nucls: Vec<u8>,
    // every k-mer of the walk but the last one
    kmers: Vec<Kmer>,
    coverage: u64,
}

pub struct GraphCondenser<'a> {
    index: &'a ExtensionIndex,
    graph: Graph,
    vertices: HashMap<Kmer, VertexId>,
    consumed: HashSet<Kmer>,
}

impl<'a> GraphCondenser<'a> {
    pub fn new(index: &'a ExtensionIndex) -> Self {
        GraphCondenser { index, graph: Graph::new(index.k()), vertices: HashMap::new(), consumed: HashSet::new() }
    }

    fn walk(&self, start: Kmer, first: u8) -> Result<Walk> {
        let k = self.index.k();
        let mut nucls = start.to_bytes(k);
        let mut kmers = vec![start];
        // a junction start k-mer is credited to each of its out-walks, so coverage
        // summed over edges counts every junction once per outgoing edge
        let mut coverage = self.index.count(start) as u64;
        let mut cur = start;
        let mut code = first;
        loop {
            let next = cur.push_back(code, k);
            let record = self.index.lookup(next).ok_or_else(|| {
                violation(format!("successor {} of {} is not indexed", next.to_string(k), cur.to_string(k)))
            })?;
            if !record.has_prev(cur.first(k)) {
                return Err(violation(format!(
                    "extension {} -> {} is recorded on one side only",
                    cur.to_string(k),
                    next.to_string(k)
                )));
            }
            nucls.push(decode(code));
            if record.is_junction() || next == start {
                return Ok(Walk { end: next, nucls, kmers, coverage });
            }
            if kmers.len() > self.index.len() {
                return Err(violation(format!("walk from {} does not terminate", start.to_string(k))));
            }
            kmers.push(next);
            coverage += record.count() as u64;
            cur = next;
            // non-junction, so exactly one successor
            code = record.unique_next().unwrap_or(0);
        }
    }

    fn consume(&mut self, kmers: &[Kmer]) -> Result<()> {
        let k = self.index.k();
        let canonical: HashSet<Kmer> = kmers.iter().map(|km| km.normalize(k).0).collect();
        for km in canonical {
            if !self.consumed.insert(km) {
                return Err(violation(format!("k-mer {} is consumed twice", km.to_string(k))));
            }
        }
        Ok(())
    }

    fn vertex(&self, kmer: Kmer) -> Result<VertexId> {
        let k = self.index.k();
        self.vertices
            .get(&kmer)
            .copied()
            .ok_or_else(|| violation(format!("walk ends in {} which is not a junction", kmer.to_string(k))))
    }

    fn add_vertex_pair(&mut self, kmer: Kmer) -> VertexId {
        let k = self.index.k();
        let v = self.graph.core_mut().hidden_add_vertex_pair(None);
        self.vertices.insert(kmer, v);
        self.vertices.insert(kmer.reverse_complement(k), self.graph.conjugate_vertex(v));
        v
    }

    fn condense_from_junctions(&mut self, kmers: &[Kmer]) -> Result<()> {
        let k = self.index.k();
        for &canon in kmers {
            for &start in [canon, canon.reverse_complement(k)].iter() {
                let record = match self.index.lookup(start) {
                    Some(r) if r.is_junction() => r,
                    _ => continue,
                };
                let from = self.vertex(start)?;
                for code in (0..4).filter(|&c| record.has_next(c)) {
                    let base = decode(code);
                    // already built as the conjugate of an earlier walk
                    if self.graph.outgoing_edges(from).iter().any(|&e| self.graph.nucls(e)[k] == base) {
                        continue;
                    }
                    let walk = self.walk(start, code)?;
                    self.consume(&walk.kmers[1..])?;
                    let to = self.vertex(walk.end)?;
                    self.graph.core_mut().hidden_add_edge(from, to, walk.nucls, walk.coverage as f64, None);
                }
            }
        }
        Ok(())
    }

    fn condense_cycles(&mut self, kmers: &[Kmer], keep_perfect_loops: bool) -> Result<usize> {
        let k = self.index.k();
        let mut loops = 0;
        for &canon in kmers {
            if self.consumed.contains(&canon) {
                continue;
            }
            let record = match self.index.lookup(canon) {
                Some(r) if !r.is_junction() => r,
                _ => continue,
            };
            let first = record.unique_next().unwrap_or(0);
            let walk = self.walk(canon, first)?;
            if walk.end != canon {
                return Err(violation(format!(
                    "k-mer {} leads to junction {} without being consumed",
                    canon.to_string(k),
                    walk.end.to_string(k)
                )));
            }
            self.consume(&walk.kmers)?;
            loops += 1;
            if keep_perfect_loops {
                let v = self.add_vertex_pair(canon);
                self.graph.core_mut().hidden_add_edge(v, v, walk.nucls, walk.coverage as f64, None);
            }
        }
        Ok(loops)
    }

    /// Builds the graph. Fails if some k-mer ends up in no edge or in two.
    pub fn condense(mut self, keep_perfect_loops: bool) -> Result<Graph> {
        info!("Condensing graph");
        let kmers = self.index.sorted_kmers();
        for &canon in &kmers {
            if self.index.lookup(canon).map_or(false, |r| r.is_junction()) {
                self.add_vertex_pair(canon);
            }
        }
        let junctions = self.vertices.len() / 2;
        self.condense_from_junctions(&kmers)?;
        let loops = self.condense_cycles(&kmers, keep_perfect_loops)?;
        if self.consumed.len() + junctions != kmers.len() {
            return Err(violation(format!(
                "{} of {} k-mers left unconsumed",
                kmers.len() - self.consumed.len() - junctions,
                kmers.len()
            )));
        }
        debug!(
            "{} junction k-mers, {} perfect loops ({})",
            junctions,
            loops,
            if keep_perfect_loops { "kept" } else { "dropped" }
        );
        info!("Graph condensed: {} vertices, {} edges", self.graph.vertex_count(), self.graph.edge_count());
        Ok(self.graph)
    }
}

pub fn condense(index: &ExtensionIndex, keep_perfect_loops: bool) -> Result<Graph> {
    GraphCondenser::new(index).condense(keep_perfect_loops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeId, GraphCore};
    use crate::kmer::KmerWindows;
    use crate::utils::revcomp;

    const GENOME: &str = "ATGGCGTGCAATGCCGATTACGGATCCTAGGCTTAACGTAGCATGC";
    const CIRCULAR: &str = "GATTACAGGCTTCCAGTCATGAACGTTGCA";

    /// Number of edge pairs each canonical k-mer is interior to.
    fn interior_counts(g: &GraphCore) -> HashMap<Kmer, usize> {
        let k = g.k();
        let mut counts = HashMap::new();
        for e in g.edges() {
            let conj = g.conjugate(e);
            if g.edge_int_id(conj) < g.edge_int_id(e) {
                continue;
            }
            let nucls = g.nucls(e);
            let mut interior: HashSet<Kmer> = HashSet::new();
            for (pos, km) in KmerWindows::new(nucls, k) {
                if pos > 0 && pos + k < nucls.len() {
                    interior.insert(km.normalize(k).0);
                }
            }
            for km in interior {
                *counts.entry(km).or_insert(0) += 1;
            }
        }
        counts
    }

    fn sorted_edges(g: &GraphCore) -> Vec<(u64, Vec<u8>)> {
        g.edges().into_iter().map(|e: EdgeId| (g.edge_int_id(e), g.nucls(e).to_vec())).collect()
    }

    #[test]
    fn test_linear_sequence_gives_one_edge_pair() {
        let k = 7;
        let index = ExtensionIndex::from_seqs(k, &[GENOME, GENOME, GENOME]);
        let g = condense(&index, true).unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 2);
        let e = g.edges().into_iter().find(|&e| g.nucls(e) == GENOME.as_bytes()).unwrap();
        assert_eq!(g.length(e), GENOME.len() - k);
        assert_eq!(g.nucls(g.conjugate(e)), &revcomp(GENOME.as_bytes())[..]);
        assert_eq!(g.raw_coverage(e), 3.0 * 39.0);
        assert_eq!(g.coverage(g.conjugate(e)), 3.0);
    }

    #[test]
    fn test_circular_genome_gives_one_loop() {
        let k = 7;
        let text = format!("{}{}", CIRCULAR, &CIRCULAR[..k]);
        let index = ExtensionIndex::from_seqs(k, &[text.as_str()]);
        let g = condense(&index, true).unwrap();
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 2);
        for e in g.edges() {
            assert_eq!(g.edge_start(e), g.edge_end(e));
            assert_eq!(g.length(e), text.len() - k);
        }
        let counts = interior_counts(&g);
        assert_eq!(counts.len(), index.len() - 1);

        let dropped = condense(&index, false).unwrap();
        assert_eq!(dropped.vertex_count(), 0);
        assert_eq!(dropped.edge_count(), 0);
    }

    #[test]
    fn test_branching_input_consumes_each_kmer_once() {
        let k = 7;
        let tip = format!("ATGT{}", &GENOME[4..30]);
        let index = ExtensionIndex::from_seqs(k, &[GENOME, tip.as_str()]);
        let g = condense(&index, true).unwrap();
        assert_eq!(g.vertex_count(), 8);
        assert_eq!(g.edge_count(), 6);
        let counts = interior_counts(&g);
        for (kmer, record) in index.iter() {
            let expected = if record.is_junction() { 0 } else { 1 };
            assert_eq!(counts.get(kmer).copied().unwrap_or(0), expected);
        }
        for e in g.edges() {
            assert_eq!(g.edge_start(g.conjugate(e)), g.conjugate_vertex(g.edge_end(e)));
        }
    }

    #[test]
    fn test_edge_coverage_counts_walk_without_last_kmer() {
        let k = 7;
        let tip = format!("ATGT{}", &GENOME[4..30]);
        let index = ExtensionIndex::from_seqs(k, &[GENOME, GENOME, tip.as_str()]);
        let g = condense(&index, true).unwrap();
        let walk_sum = |e: EdgeId| -> f64 {
            let nucls = g.nucls(e);
            (0..g.length(e)).map(|i| index.count(Kmer::from_bytes(&nucls[i..i + k]).unwrap()) as f64).sum()
        };
        let mut junction_starts = 0;
        for e in g.edges() {
            let raw = g.raw_coverage(e);
            assert_eq!(raw, g.raw_coverage(g.conjugate(e)));
            assert!(raw == walk_sum(e) || raw == walk_sum(g.conjugate(e)));
            if g.out_degree(g.edge_start(e)) > 1 {
                junction_starts += 1;
            }
        }
        // the junction k-mer opens both of its out-walks
        assert!(junction_starts >= 2);
    }

    #[test]
    fn test_condensation_is_deterministic() {
        let k = 5;
        let reads = ["ACGTTGCATGCAAGT", "TTGCATGGGACACGT", "CATGCAAGTACGATCG"];
        let a = condense(&ExtensionIndex::from_seqs(k, &reads), true).unwrap();
        let b = condense(&ExtensionIndex::from_seqs(k, &reads), true).unwrap();
        assert_eq!(sorted_edges(&a), sorted_edges(&b));
    }

    #[test]
    fn test_missing_successor_is_an_invariant_error() {
        let k = 5;
        let mut index = ExtensionIndex::new(k);
        let km = Kmer::from_bytes(b"ACGTA").unwrap();
        index.insert(km, None, Some(2));
        match condense(&index, true) {
            Err(Error::Invariant(v)) => assert_eq!(v.operation, "Condense"),
            other => panic!("expected invariant error, got {:?}", other.map(|g| g.edge_count())),
        }
    }
}
