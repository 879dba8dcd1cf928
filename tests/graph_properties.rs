use std::cell::RefCell;
use std::rc::Rc;

use rand_core::{RngCore, SeedableRng};
use rand_pcg::Pcg32;

use rust_asmgraph::condense::condense;
use rust_asmgraph::ext_index::ExtensionIndex;
use rust_asmgraph::flanking::FlankingCoverage;
use rust_asmgraph::utils::revcomp;
use rust_asmgraph::{ActionHandler, EdgeId, Graph, GraphCore, VertexId};

fn random_seq(rng: &mut Pcg32, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[(rng.next_u32() % 4) as usize]).collect()
}

fn pick<T: Copy>(rng: &mut Pcg32, items: &[T]) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[rng.next_u32() as usize % items.len()])
    }
}

fn assert_conjugate_symmetry(g: &GraphCore) {
    for v in g.vertices() {
        let c = g.conjugate_vertex(v);
        assert_eq!(g.conjugate_vertex(c), v);
        assert_eq!(g.in_degree(v), g.out_degree(c));
        for &e in g.outgoing_edges(v) {
            assert_eq!(g.edge_start(e), v);
        }
    }
    for e in g.edges() {
        let c = g.conjugate(e);
        assert_eq!(g.conjugate(c), e);
        assert_eq!(g.edge_start(c), g.conjugate_vertex(g.edge_end(e)));
        assert_eq!(g.edge_end(c), g.conjugate_vertex(g.edge_start(e)));
        assert_eq!(g.nucls(c), &revcomp(g.nucls(e))[..]);
        assert_eq!(g.raw_coverage(c), g.raw_coverage(e));
        assert!(g.contains_vertex(g.edge_end(e)));
        assert!(g.outgoing_edges(g.edge_start(e)).contains(&e));
    }
}

/// Counts live elements from add/delete events only.
struct LiveCounter {
    vertices: i64,
    edges: i64,
}

impl ActionHandler for LiveCounter {
    fn name(&self) -> &str {
        "LiveCounter"
    }
    fn handle_add_vertex(&mut self, _g: &GraphCore, _v: VertexId) {
        self.vertices += 1;
    }
    fn handle_add_edge(&mut self, _g: &GraphCore, _e: EdgeId) {
        self.edges += 1;
    }
    fn handle_delete_vertex(&mut self, _g: &GraphCore, _v: VertexId) {
        self.vertices -= 1;
    }
    fn handle_delete_edge(&mut self, _g: &GraphCore, _e: EdgeId) {
        self.edges -= 1;
    }
}

fn repeat_graph(rng: &mut Pcg32, k: usize) -> Graph {
    let repeat = random_seq(rng, 25);
    let mut genome = random_seq(rng, 150);
    genome.extend_from_slice(&repeat);
    genome.extend(random_seq(rng, 150));
    genome.extend_from_slice(&repeat);
    genome.extend(random_seq(rng, 150));
    condense(&ExtensionIndex::from_seqs(k, &[genome]), true).unwrap()
}

fn random_mutation(g: &mut Graph, rng: &mut Pcg32) {
    match rng.next_u32() % 6 {
        0 => {
            if let Some(e) = pick(rng, &g.edges()) {
                let len = g.length(e);
                let limit = if g.is_self_conjugate(e) { (len + 1) / 2 } else { len };
                if limit > 1 {
                    let pos = 1 + rng.next_u32() as usize % (limit - 1);
                    g.split_edge(e, pos);
                }
            }
        }
        1 => {
            if let Some(v) = pick(rng, &g.vertices()) {
                g.compress_vertex(v);
            }
        }
        2 => {
            if let Some(v) = pick(rng, &g.vertices()) {
                let conj_v = g.conjugate_vertex(v);
                let candidates: Vec<EdgeId> = g
                    .outgoing_edges(v)
                    .iter()
                    .copied()
                    .filter(|&e| g.edge_end(e) != v && g.edge_end(e) != conj_v)
                    .collect();
                if conj_v != v && !candidates.is_empty() {
                    let c = (rng.next_u32() % 101) as f64 / 100.0;
                    g.split_vertex(v, &candidates[..1], &[c]);
                }
            }
        }
        3 => {
            if let Some(e) = pick(rng, &g.edges()) {
                let (from, to, nucls) = (g.edge_start(e), g.edge_end(e), g.nucls(e).to_vec());
                let copy = g.add_edge(from, to, nucls, 1.0);
                g.glue_edges(copy, e);
            }
        }
        4 => {
            if let Some(e) = pick(rng, &g.edges()) {
                g.delete_edge(e);
            }
        }
        _ => {
            let isolated: Vec<VertexId> =
                g.vertices().into_iter().filter(|&v| g.in_degree(v) == 0 && g.out_degree(v) == 0).collect();
            if let Some(v) = pick(rng, &isolated) {
                g.delete_vertex(v);
            }
        }
    }
}

#[test]
fn conjugate_symmetry_survives_random_mutations() {
    let k = 11;
    for seed in 0..5u64 {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut g = repeat_graph(&mut rng, k);
        assert!(g.edge_count() >= 2);
        let counter = Rc::new(RefCell::new(LiveCounter {
            vertices: g.vertex_count() as i64,
            edges: g.edge_count() as i64,
        }));
        g.add_action_handler(counter.clone());
        g.add_action_handler(Rc::new(RefCell::new(FlankingCoverage::new(5))));
        assert_conjugate_symmetry(&g);
        for _ in 0..300 {
            random_mutation(&mut g, &mut rng);
            assert_conjugate_symmetry(&g);
            assert_eq!(counter.borrow().edges, g.edge_count() as i64);
            assert_eq!(counter.borrow().vertices, g.vertex_count() as i64);
        }
    }
}

type Log = Rc<RefCell<Vec<(usize, &'static str, u64)>>>;

struct Recorder {
    slot: usize,
    log: Log,
}

impl ActionHandler for Recorder {
    fn name(&self) -> &str {
        "Recorder"
    }
    fn handle_add_edge(&mut self, g: &GraphCore, e: EdgeId) {
        self.log.borrow_mut().push((self.slot, "add", g.edge_int_id(e)));
    }
    fn handle_delete_edge(&mut self, g: &GraphCore, e: EdgeId) {
        self.log.borrow_mut().push((self.slot, "delete", g.edge_int_id(e)));
    }
}

#[test]
fn handlers_see_adds_forward_and_deletes_backward() {
    let n = 4;
    let mut g = Graph::new(3);
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let recorders: Vec<Rc<RefCell<Recorder>>> =
        (0..n).map(|slot| Rc::new(RefCell::new(Recorder { slot, log: log.clone() }))).collect();
    for r in &recorders {
        g.add_action_handler(r.clone());
    }
    let a = g.add_vertex();
    let b = g.add_vertex();
    let e = g.add_edge(a, b, b"ACGTT".to_vec(), 0.0);
    let (id, conj_id) = (g.edge_int_id(e), g.edge_int_id(g.conjugate(e)));

    let expected_add: Vec<_> = (0..n).flat_map(|s| vec![(s, "add", id), (s, "add", conj_id)]).collect();
    assert_eq!(*log.borrow(), expected_add);

    log.borrow_mut().clear();
    g.delete_edge(e);
    let expected_delete: Vec<_> =
        (0..n).rev().flat_map(|s| vec![(s, "delete", conj_id), (s, "delete", id)]).collect();
    assert_eq!(*log.borrow(), expected_delete);

    // deregistered handlers drop out, the others keep their relative order
    assert!(g.remove_action_handler(&recorders[1]));
    assert!(!g.remove_action_handler(&recorders[1]));
    log.borrow_mut().clear();
    let e = g.add_edge(a, b, b"ACGTT".to_vec(), 0.0);
    g.delete_edge(e);
    let slots: Vec<usize> = log.borrow().iter().map(|&(s, _, _)| s).collect();
    assert_eq!(slots, vec![0, 0, 2, 2, 3, 3, 3, 3, 2, 2, 0, 0]);
}

#[test]
fn iterator_never_yields_deleted_edges() {
    let mut g = Graph::new(3);
    let vs: Vec<VertexId> = (0..7).map(|_| g.add_vertex()).collect();
    let edges: Vec<EdgeId> = vs.windows(2).map(|w| g.add_edge(w[0], w[1], b"ACGTT".to_vec(), 1.0)).collect();

    let mut visited = Vec::new();
    let mut deleted = Vec::new();
    for e in g.smart_edge_iter() {
        assert!(g.contains_edge(e));
        if visited.is_empty() {
            // the newest edge pair comes first; drop the next one in line and one far behind
            let next = g.conjugate(e);
            for &x in &[next, edges[1]] {
                deleted.push(x);
                deleted.push(g.conjugate(x));
                g.delete_edge(x);
            }
        }
        visited.push(e);
    }
    assert_eq!(g.handler_count(), 0);
    assert_eq!(visited.len(), edges.len() * 2 - 3);
    for d in &deleted {
        assert!(!visited[1..].contains(d));
    }
}

#[test]
fn iterator_early_exit_deregisters() {
    let mut g = Graph::new(3);
    let a = g.add_vertex();
    let b = g.add_vertex();
    g.add_edge(a, b, b"ACGTT".to_vec(), 1.0);
    {
        let mut outer = g.smart_vertex_iter();
        let inner = g.smart_edge_iter();
        assert_eq!(g.handler_count(), 2);
        assert!(outer.next().is_some());
        drop(inner);
        assert_eq!(g.handler_count(), 1);
    }
    assert_eq!(g.handler_count(), 0);
}

#[test]
fn vertex_split_conserves_coverage() {
    let mut rng = Pcg32::seed_from_u64(7);
    let mut g = Graph::new(3);
    let hub = g.add_vertex();
    let mut spokes = Vec::new();
    for _ in 0..4 {
        let w = g.add_vertex();
        let nucls = random_seq(&mut rng, 9);
        spokes.push(g.add_edge(hub, w, nucls, (1 + rng.next_u32() % 50) as f64));
    }
    let before: f64 = spokes.iter().map(|&e| g.raw_coverage(e)).sum();
    let coefficients = [0.1, 0.25, 0.65, 1.0];
    let (_, pairs) = g.split_vertex(hub, &spokes, &coefficients);
    let after: f64 = pairs
        .iter()
        .map(|&(old, copy)| g.raw_coverage(copy) + if g.contains_edge(old) { g.raw_coverage(old) } else { 0.0 })
        .sum();
    assert!((before - after).abs() < 1e-9);
    assert_conjugate_symmetry(&g);
}
