// Side table from stable ids to live handles, built when a graph is loaded (or
// taken from a live graph) and used to resolve ids found in auxiliary files.

use std::collections::HashMap;

use crate::error::PersistenceError;
use crate::graph::{GraphCore, GraphElement};

#[derive(Clone, Debug)]
pub struct IdMapper<E> {
    handles: HashMap<u64, E>,
}

impl<E: GraphElement> IdMapper<E> {
    pub fn new() -> Self {
        IdMapper { handles: HashMap::new() }
    }

    /// Maps the stable id of every element currently in `g`.
    pub fn from_graph(g: &GraphCore) -> Self {
        let handles = E::all(g).into_iter().map(|x| (x.int_id(g), x)).collect();
        IdMapper { handles }
    }

    pub fn insert(&mut self, id: u64, handle: E) {
        self.handles.insert(id, handle);
    }

    pub fn resolve(&self, id: u64) -> Result<E, PersistenceError> {
        self.handles.get(&id).copied().ok_or(PersistenceError::UnknownId(id))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
