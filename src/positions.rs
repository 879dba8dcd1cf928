// Per-edge record of which ranges of named contigs (reference sequences, earlier
// assemblies) map onto the edge. Mapped ranges are in edge coordinates, i.e.
// k-mer steps from the edge start. The records follow the edges through merges,
// glues, splits and vertex splits.

use std::collections::{BTreeSet, HashMap};

use crate::graph::{EdgeId, GraphCore, VertexId};
use crate::handler::ActionHandler;
use crate::verify;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn new(start: u64, end: u64) -> Self {
        Interval { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    fn shift_forward(&self, by: u64) -> Interval {
        Interval::new(self.start.saturating_add(by), self.end.saturating_add(by))
    }

    fn shift_back(&self, by: u64) -> Interval {
        Interval::new(self.start.saturating_sub(by), self.end.saturating_sub(by))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgePosition {
    pub contig: String,
    pub initial: Interval,
    pub mapped: Interval,
}

impl EdgePosition {
    pub fn new(contig: impl Into<String>, initial: Interval, mapped: Interval) -> Self {
        EdgePosition { contig: contig.into(), initial, mapped }
    }

    // point of the initial range matching edge coordinate `x`, by proportion
    fn initial_at(&self, x: u64) -> u64 {
        if x <= self.mapped.start {
            return self.initial.start;
        }
        if x >= self.mapped.end {
            return self.initial.end;
        }
        let offset = (x - self.mapped.start) as u128 * self.initial.len() as u128 / self.mapped.len() as u128;
        self.initial.start + offset as u64
    }

    // the part mapped into [from, to), in coordinates relative to `from`
    fn clip(&self, from: u64, to: u64) -> Option<EdgePosition> {
        if self.mapped.is_empty() {
            return if from <= self.mapped.start && self.mapped.start < to {
                Some(EdgePosition::new(self.contig.clone(), self.initial, self.mapped.shift_back(from)))
            } else {
                None
            };
        }
        let lo = self.mapped.start.max(from);
        let hi = self.mapped.end.min(to);
        if lo >= hi {
            return None;
        }
        Some(EdgePosition::new(
            self.contig.clone(),
            Interval::new(self.initial_at(lo), self.initial_at(hi)),
            Interval::new(lo - from, hi - from),
        ))
    }
}

/// Starts detached. Loading persisted positions attaches it, after which
/// loading again is refused.
#[derive(Default)]
pub struct EdgesPositionHandler {
    positions: HashMap<EdgeId, BTreeSet<EdgePosition>>,
    attached: bool,
}

impl EdgesPositionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// # Panics
    /// If already attached.
    pub fn attach(&mut self) {
        verify!(!self.attached, "EdgesPositionHandler", "handler is already attached");
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// # Panics
    /// If either range ends before it starts.
    pub fn add_edge_position(&mut self, e: EdgeId, contig: &str, initial: Interval, mapped: Interval) {
        verify!(
            initial.start <= initial.end && mapped.start <= mapped.end,
            "AddEdgePosition",
            "reversed range for contig {}: initial {:?}, mapped {:?}",
            contig,
            initial,
            mapped
        );
        self.positions.entry(e).or_default().insert(EdgePosition::new(contig, initial, mapped));
    }

    pub fn edge_positions(&self, e: EdgeId) -> Vec<EdgePosition> {
        self.positions.get(&e).map_or_else(Vec::new, |s| s.iter().cloned().collect())
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.positions.keys().copied()
    }

    /// Number of records over all edges.
    pub fn len(&self) -> usize {
        self.positions.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

// Concatenates records of the same contig that continue each other in both coordinates.
fn join_adjacent(mut records: Vec<EdgePosition>) -> BTreeSet<EdgePosition> {
    records.sort_by(|a, b| (&a.contig, a.initial, a.mapped).cmp(&(&b.contig, b.initial, b.mapped)));
    let mut joined: Vec<EdgePosition> = Vec::with_capacity(records.len());
    for record in records {
        if let Some(last) = joined.last_mut() {
            if last.contig == record.contig
                && last.initial.end == record.initial.start
                && last.mapped.end == record.mapped.start
            {
                last.initial.end = record.initial.end;
                last.mapped.end = record.mapped.end;
                continue;
            }
        }
        joined.push(record);
    }
    joined.into_iter().collect()
}

impl ActionHandler for EdgesPositionHandler {
    fn name(&self) -> &str {
        "EdgesPositionHandler"
    }

    fn handle_delete_edge(&mut self, _g: &GraphCore, e: EdgeId) {
        self.positions.remove(&e);
    }

    fn handle_merge(&mut self, g: &GraphCore, old_edges: &[EdgeId], new_edge: EdgeId) {
        let mut offset = 0;
        let mut records = Vec::new();
        for &e in old_edges {
            if let Some(set) = self.positions.get(&e) {
                records.extend(set.iter().map(|p| EdgePosition::new(p.contig.clone(), p.initial, p.mapped.shift_forward(offset))));
            }
            offset += g.length(e) as u64;
        }
        if !records.is_empty() {
            self.positions.insert(new_edge, join_adjacent(records));
        }
    }

    fn handle_glue(&mut self, _g: &GraphCore, new_edge: EdgeId, edge1: EdgeId, edge2: EdgeId) {
        let mut set = BTreeSet::new();
        for e in [edge1, edge2].iter() {
            if let Some(s) = self.positions.get(e) {
                set.extend(s.iter().cloned());
            }
        }
        if !set.is_empty() {
            self.positions.insert(new_edge, set);
        }
    }

    fn handle_split(&mut self, g: &GraphCore, old_edge: EdgeId, new_edge1: EdgeId, new_edge2: EdgeId) {
        let old = match self.positions.get(&old_edge) {
            Some(s) => s.clone(),
            None => return,
        };
        let at = g.length(new_edge1) as u64;
        // (edge, offset along the old edge); the last piece takes everything past its offset
        let mut pieces = vec![(new_edge1, 0), (new_edge2, at)];
        if g.is_self_conjugate(old_edge) {
            pieces.push((g.conjugate(new_edge1), at + g.length(new_edge2) as u64));
        }
        for p in old {
            for (i, &(piece, from)) in pieces.iter().enumerate() {
                let to = pieces.get(i + 1).map_or(u64::MAX, |&(_, next)| next);
                if let Some(part) = p.clip(from, to) {
                    self.positions.entry(piece).or_default().insert(part);
                }
            }
        }
    }

    fn handle_vertex_split(
        &mut self,
        _g: &GraphCore,
        _new_vertex: VertexId,
        new_edges: &[(EdgeId, EdgeId)],
        _coefficients: &[f64],
        _old_vertex: VertexId,
    ) {
        for (old, new) in new_edges {
            if let Some(s) = self.positions.get(old).cloned() {
                self.positions.insert(*new, s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Graph, Rc<RefCell<EdgesPositionHandler>>) {
        let g = Graph::new(3);
        let handler = Rc::new(RefCell::new(EdgesPositionHandler::new()));
        g.add_action_handler(handler.clone());
        (g, handler)
    }

    #[test]
    fn test_merge_joins_continuous_ranges() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let c = g.add_vertex();
        let e1 = g.add_edge(a, b, b"ACGTTC".to_vec(), 0.0);
        let e2 = g.add_edge(b, c, b"TTCAGG".to_vec(), 0.0);
        handler.borrow_mut().add_edge_position(e1, "chr1", Interval::new(100, 103), Interval::new(0, 3));
        handler.borrow_mut().add_edge_position(e2, "chr1", Interval::new(103, 106), Interval::new(0, 3));
        handler.borrow_mut().add_edge_position(e2, "chr2", Interval::new(7, 9), Interval::new(1, 3));
        let merged = g.merge_path(&[e1, e2]);
        let positions = handler.borrow().edge_positions(merged);
        assert_eq!(
            positions,
            vec![
                EdgePosition::new("chr1", Interval::new(100, 106), Interval::new(0, 6)),
                EdgePosition::new("chr2", Interval::new(7, 9), Interval::new(4, 6)),
            ]
        );
        assert!(handler.borrow().edge_positions(e1).is_empty());
    }

    #[test]
    fn test_split_cuts_ranges() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let e = g.add_edge(a, b, b"ACGTTCAGGA".to_vec(), 0.0);
        handler.borrow_mut().add_edge_position(e, "chr1", Interval::new(10, 17), Interval::new(0, 7));
        let (n1, n2) = g.split_edge(e, 3);
        let h = handler.borrow();
        assert_eq!(h.edge_positions(n1), vec![EdgePosition::new("chr1", Interval::new(10, 13), Interval::new(0, 3))]);
        assert_eq!(h.edge_positions(n2), vec![EdgePosition::new("chr1", Interval::new(13, 17), Interval::new(0, 4))]);
        assert!(h.edge_positions(e).is_empty());
    }

    #[test]
    fn test_self_conjugate_split_fills_three_pieces() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let conj_a = g.conjugate_vertex(a);
        let e = g.add_edge(a, conj_a, b"AACGCGTT".to_vec(), 5.0);
        handler.borrow_mut().add_edge_position(e, "chr1", Interval::new(100, 105), Interval::new(0, 5));
        let (first, middle) = g.split_edge(e, 2);
        let last = g.conjugate(first);
        let h = handler.borrow();
        assert_eq!(h.edge_positions(first), vec![EdgePosition::new("chr1", Interval::new(100, 102), Interval::new(0, 2))]);
        assert_eq!(h.edge_positions(middle), vec![EdgePosition::new("chr1", Interval::new(102, 103), Interval::new(0, 1))]);
        assert_eq!(h.edge_positions(last), vec![EdgePosition::new("chr1", Interval::new(103, 105), Interval::new(0, 2))]);
        for &piece in [first, middle, last].iter() {
            for p in h.edge_positions(piece) {
                assert!(p.mapped.end <= g.length(piece) as u64);
            }
        }
    }

    #[test]
    fn test_split_scales_large_ranges() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let e = g.add_edge(a, b, b"ACGTTCAGGA".to_vec(), 0.0);
        let huge = u64::MAX / 2;
        handler.borrow_mut().add_edge_position(e, "chr1", Interval::new(0, huge), Interval::new(0, 7));
        let (n1, n2) = g.split_edge(e, 3);
        let h = handler.borrow();
        let cut = (3 * huge as u128 / 7) as u64;
        assert_eq!(h.edge_positions(n1)[0].initial, Interval::new(0, cut));
        assert_eq!(h.edge_positions(n2)[0].initial, Interval::new(cut, huge));
    }

    #[test]
    #[should_panic(expected = "invariant violated in AddEdgePosition")]
    fn test_reversed_range_is_rejected() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let e = g.add_edge(a, b, b"ACGTTCAGGA".to_vec(), 0.0);
        handler.borrow_mut().add_edge_position(e, "chr1", Interval::new(20, 10), Interval::new(1, 6));
    }

    #[test]
    fn test_glue_and_vertex_split_copy_records() {
        let (mut g, handler) = setup();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let e1 = g.add_edge(a, b, b"ACGTT".to_vec(), 1.0);
        let e2 = g.add_edge(a, b, b"ACCTT".to_vec(), 1.0);
        handler.borrow_mut().add_edge_position(e1, "x", Interval::new(0, 2), Interval::new(0, 2));
        handler.borrow_mut().add_edge_position(e2, "y", Interval::new(5, 7), Interval::new(0, 2));
        let glued = g.glue_edges(e1, e2);
        assert_eq!(handler.borrow().edge_positions(glued).len(), 2);
        let (_, pairs) = g.split_vertex(b, &[glued], &[0.5]);
        assert_eq!(handler.borrow().edge_positions(pairs[0].1), handler.borrow().edge_positions(glued));
        assert_eq!(handler.borrow().len(), 4);
    }

    #[test]
    fn test_attach_once() {
        let mut h = EdgesPositionHandler::new();
        assert!(!h.is_attached());
        h.attach();
        assert!(h.is_attached());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_attach_twice_panics() {
        let mut h = EdgesPositionHandler::new();
        h.attach();
        h.attach();
    }
}
