// Observers of structural graph changes and the registry that notifies them.
//
// Creation-like events (add, merge, glue, split, vertex split) reach handlers in
// registration order; deletions reach them in reverse registration order, so a
// handler layered on top of another sees the lower one built before it and torn
// down after it. Each event is delivered for the element and for its conjugate.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::graph::{EdgeId, GraphCore, VertexId};
use crate::verify;

/// Callbacks run after the graph applied an addition or a merge/glue/split, and
/// before it drops anything being deleted, so every element named is queryable.
/// A callback must not try to reach the graph mutably.
pub trait ActionHandler {
    fn name(&self) -> &str;

    fn handle_add_vertex(&mut self, _g: &GraphCore, _v: VertexId) {}

    fn handle_add_edge(&mut self, _g: &GraphCore, _e: EdgeId) {}

    fn handle_delete_vertex(&mut self, _g: &GraphCore, _v: VertexId) {}

    fn handle_delete_edge(&mut self, _g: &GraphCore, _e: EdgeId) {}

    fn handle_merge(&mut self, _g: &GraphCore, _old_edges: &[EdgeId], _new_edge: EdgeId) {}

    fn handle_glue(&mut self, _g: &GraphCore, _new_edge: EdgeId, _edge1: EdgeId, _edge2: EdgeId) {}

    fn handle_split(&mut self, _g: &GraphCore, _old_edge: EdgeId, _new_edge1: EdgeId, _new_edge2: EdgeId) {}

    fn handle_vertex_split(
        &mut self,
        _g: &GraphCore,
        _new_vertex: VertexId,
        _new_edges: &[(EdgeId, EdgeId)],
        _coefficients: &[f64],
        _old_vertex: VertexId,
    ) {
    }
}

pub type HandlerRef = Rc<RefCell<dyn ActionHandler>>;

type HandlerList = RefCell<Vec<HandlerRef>>;

fn handler_ptr<H: ActionHandler + ?Sized>(handler: &Rc<RefCell<H>>) -> *const () {
    Rc::as_ptr(handler) as *const ()
}

fn remove_ptr(list: &HandlerList, ptr: *const ()) -> bool {
    let mut handlers = list.borrow_mut();
    match handlers.iter().position(|h| handler_ptr(h) == ptr) {
        Some(i) => {
            handlers.remove(i);
            true
        }
        None => false,
    }
}

/// Handlers currently attached to a graph, compared by identity.
#[derive(Default)]
pub struct HandlerRegistry {
    list: Rc<HandlerList>,
}

/// Lets a handler drop its own registration without holding on to the graph.
pub(crate) struct RegistryLink {
    list: Weak<HandlerList>,
    ptr: *const (),
}

impl RegistryLink {
    pub(crate) fn detach(&self) -> bool {
        match self.list.upgrade() {
            Some(list) => remove_ptr(&list, self.ptr),
            None => false,
        }
    }
}

impl HandlerRegistry {
    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    pub fn add(&self, handler: HandlerRef) {
        let ptr = handler_ptr(&handler);
        let name = handler.borrow().name().to_string();
        let present = self.list.borrow().iter().any(|h| handler_ptr(h) == ptr);
        verify!(!present, "AddActionHandler", "action handler {} has already been added", name);
        trace!("Action handler {} added", name);
        self.list.borrow_mut().push(handler);
    }

    pub fn remove<H: ActionHandler + ?Sized>(&self, handler: &Rc<RefCell<H>>) -> bool {
        let removed = remove_ptr(&self.list, handler_ptr(handler));
        if !removed {
            trace!("Action handler wasn't found among graph action handlers");
        }
        removed
    }

    pub(crate) fn link<H: ActionHandler + ?Sized>(&self, handler: &Rc<RefCell<H>>) -> RegistryLink {
        RegistryLink { list: Rc::downgrade(&self.list), ptr: handler_ptr(handler) }
    }

    // dispatch over a copy: the list may change while callbacks run
    fn snapshot(&self) -> Vec<HandlerRef> {
        self.list.borrow().clone()
    }

    pub(crate) fn fire_add_vertex(&self, g: &GraphCore, v: VertexId) {
        let conj = g.conjugate_vertex(v);
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireAddVertex to handler {}", h.name());
            h.handle_add_vertex(g, v);
            if conj != v {
                h.handle_add_vertex(g, conj);
            }
        }
    }

    pub(crate) fn fire_add_edge(&self, g: &GraphCore, e: EdgeId) {
        let conj = g.conjugate(e);
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireAddEdge to handler {}", h.name());
            h.handle_add_edge(g, e);
            if conj != e {
                h.handle_add_edge(g, conj);
            }
        }
    }

    pub(crate) fn fire_delete_vertex(&self, g: &GraphCore, v: VertexId) {
        let conj = g.conjugate_vertex(v);
        for h in self.snapshot().iter().rev() {
            let mut h = h.borrow_mut();
            trace!("FireDeleteVertex to handler {}", h.name());
            if conj != v {
                h.handle_delete_vertex(g, conj);
            }
            h.handle_delete_vertex(g, v);
        }
    }

    pub(crate) fn fire_delete_edge(&self, g: &GraphCore, e: EdgeId) {
        let conj = g.conjugate(e);
        for h in self.snapshot().iter().rev() {
            let mut h = h.borrow_mut();
            trace!("FireDeleteEdge to handler {}", h.name());
            if conj != e {
                h.handle_delete_edge(g, conj);
            }
            h.handle_delete_edge(g, e);
        }
    }

    pub(crate) fn fire_merge(&self, g: &GraphCore, old_edges: &[EdgeId], new_edge: EdgeId) {
        let conj_new = g.conjugate(new_edge);
        let conj_old: Vec<EdgeId> = old_edges.iter().rev().map(|&e| g.conjugate(e)).collect();
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireMerge to handler {}", h.name());
            h.handle_merge(g, old_edges, new_edge);
            if conj_new != new_edge {
                h.handle_merge(g, &conj_old, conj_new);
            }
        }
    }

    pub(crate) fn fire_glue(&self, g: &GraphCore, new_edge: EdgeId, edge1: EdgeId, edge2: EdgeId) {
        let conj_new = g.conjugate(new_edge);
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireGlue to handler {}", h.name());
            h.handle_glue(g, new_edge, edge1, edge2);
            if conj_new != new_edge {
                h.handle_glue(g, conj_new, g.conjugate(edge1), g.conjugate(edge2));
            }
        }
    }

    pub(crate) fn fire_split(&self, g: &GraphCore, old_edge: EdgeId, new_edge1: EdgeId, new_edge2: EdgeId) {
        let conj_old = g.conjugate(old_edge);
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireSplit to handler {}", h.name());
            h.handle_split(g, old_edge, new_edge1, new_edge2);
            if conj_old != old_edge {
                h.handle_split(g, conj_old, g.conjugate(new_edge2), g.conjugate(new_edge1));
            }
        }
    }

    pub(crate) fn fire_vertex_split(
        &self,
        g: &GraphCore,
        new_vertex: VertexId,
        new_edges: &[(EdgeId, EdgeId)],
        coefficients: &[f64],
        old_vertex: VertexId,
    ) {
        let conj_new = g.conjugate_vertex(new_vertex);
        let conj_edges: Vec<(EdgeId, EdgeId)> =
            new_edges.iter().map(|&(old, new)| (g.conjugate(old), g.conjugate(new))).collect();
        for h in self.snapshot() {
            let mut h = h.borrow_mut();
            trace!("FireVertexSplit to handler {}", h.name());
            h.handle_vertex_split(g, new_vertex, new_edges, coefficients, old_vertex);
            if conj_new != new_vertex {
                h.handle_vertex_split(g, conj_new, &conj_edges, coefficients, g.conjugate_vertex(old_vertex));
            }
        }
    }
}
