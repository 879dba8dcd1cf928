// Iterators that stay valid while the graph is being mutated. Each iterator is
// itself an action handler: it forgets deleted elements and, if asked to,
// queues newly added ones. It registers on creation and deregisters on drop.

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashSet};
use std::rc::Rc;

use crate::graph::{EdgeId, GraphCore, GraphElement, VertexId};
use crate::handler::{ActionHandler, HandlerRegistry, RegistryLink};

pub type KeyFn<E, K> = Box<dyn Fn(&GraphCore, E) -> K>;

struct SmartSet<E, K> {
    queue: BinaryHeap<(K, E)>,
    live: HashSet<E>,
    key: KeyFn<E, K>,
    add_new: bool,
}

impl<E: GraphElement, K: Ord> SmartSet<E, K> {
    fn push(&mut self, g: &GraphCore, x: E) {
        if self.live.insert(x) {
            let key = (self.key)(g, x);
            self.queue.push((key, x));
        }
    }

    fn pop(&mut self) -> Option<E> {
        while let Some((_, x)) = self.queue.pop() {
            // entries of deleted elements are dropped lazily
            if self.live.remove(&x) {
                return Some(x);
            }
        }
        None
    }
}

impl<E: GraphElement, K: Ord + 'static> ActionHandler for SmartSet<E, K> {
    fn name(&self) -> &str {
        "SmartIterator"
    }

    fn handle_add_vertex(&mut self, g: &GraphCore, v: VertexId) {
        if let Some(x) = E::from_vertex(v) {
            if self.add_new {
                self.push(g, x);
            }
        }
    }

    fn handle_add_edge(&mut self, g: &GraphCore, e: EdgeId) {
        if let Some(x) = E::from_edge(e) {
            if self.add_new {
                self.push(g, x);
            }
        }
    }

    fn handle_delete_vertex(&mut self, _g: &GraphCore, v: VertexId) {
        if let Some(x) = E::from_vertex(v) {
            self.live.remove(&x);
        }
    }

    fn handle_delete_edge(&mut self, _g: &GraphCore, e: EdgeId) {
        if let Some(x) = E::from_edge(e) {
            self.live.remove(&x);
        }
    }
}

/// Yields elements by decreasing key; obtained from `Graph::smart_edge_iter` and friends.
pub struct SmartIterator<E: GraphElement, K: Ord + 'static> {
    set: Rc<RefCell<SmartSet<E, K>>>,
    link: RegistryLink,
}

impl<E: GraphElement, K: Ord + 'static> SmartIterator<E, K> {
    pub(crate) fn new(g: &GraphCore, registry: &HandlerRegistry, key: KeyFn<E, K>, add_new: bool) -> Self {
        let mut set = SmartSet { queue: BinaryHeap::new(), live: HashSet::new(), key, add_new };
        for x in E::all(g) {
            set.push(g, x);
        }
        let set = Rc::new(RefCell::new(set));
        registry.add(set.clone());
        let link = registry.link(&set);
        SmartIterator { set, link }
    }

    /// Elements still waiting to be visited.
    pub fn remaining(&self) -> usize {
        self.set.borrow().live.len()
    }
}

impl<E: GraphElement, K: Ord + 'static> Iterator for SmartIterator<E, K> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        self.set.borrow_mut().pop()
    }
}

impl<E: GraphElement, K: Ord + 'static> Drop for SmartIterator<E, K> {
    fn drop(&mut self) {
        self.link.detach();
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{EdgeId, Graph, VertexId};
    use std::cmp::Reverse;

    fn chain(g: &mut Graph, n: usize) -> Vec<EdgeId> {
        let vs: Vec<VertexId> = (0..=n).map(|_| g.add_vertex()).collect();
        vs.windows(2).map(|w| g.add_edge(w[0], w[1], b"ACGTT".to_vec(), 1.0)).collect()
    }

    #[test]
    fn test_default_order_is_descending_id() {
        let mut g = Graph::new(3);
        chain(&mut g, 3);
        let ids: Vec<u64> = g.smart_edge_iter().map(|e| g.edge_int_id(e)).collect();
        assert_eq!(ids.len(), 6);
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(g.handler_count(), 0);
    }

    #[test]
    fn test_custom_key() {
        let mut g = Graph::new(3);
        chain(&mut g, 3);
        let ids: Vec<u64> =
            g.smart_iter_by_key(|g, e: EdgeId| Reverse(g.edge_int_id(e)), false).map(|e| g.edge_int_id(e)).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_deleted_edges_are_skipped() {
        let mut g = Graph::new(3);
        let edges = chain(&mut g, 3);
        let mut it = g.smart_edge_iter();
        assert_eq!(g.handler_count(), 1);
        let first = it.next().unwrap();
        // delete every edge not yet visited except the first one's pair
        for &e in &edges {
            if e != first && g.conjugate(e) != first && g.contains_edge(e) {
                g.delete_edge(e);
            }
        }
        let rest: Vec<EdgeId> = it.by_ref().collect();
        assert_eq!(rest, vec![g.conjugate(first)]);
        drop(it);
        assert_eq!(g.handler_count(), 0);
    }

    #[test]
    fn test_new_edges_are_visited() {
        let mut g = Graph::new(3);
        let edges = chain(&mut g, 2);
        let mut visited = 0;
        let mut merged = None;
        let mut it = g.smart_edge_iter();
        while let Some(e) = it.next() {
            assert!(g.contains_edge(e));
            visited += 1;
            if merged.is_none() {
                merged = Some(g.merge_path(&edges));
            }
        }
        drop(it);
        // one edge visited before the merge, then the merged pair
        assert_eq!(visited, 3);
        assert!(g.contains_edge(merged.unwrap()));
    }

    #[test]
    fn test_early_break_deregisters() {
        let mut g = Graph::new(3);
        chain(&mut g, 2);
        for _ in g.smart_vertex_iter() {
            break;
        }
        assert_eq!(g.handler_count(), 0);
        let mut it = g.smart_vertex_iter();
        assert_eq!(it.remaining(), 6);
        let v = g.add_vertex();
        assert_eq!(it.remaining(), 8);
        assert_eq!(it.next(), Some(g.conjugate_vertex(v)));
    }
}
