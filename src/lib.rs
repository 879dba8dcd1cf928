//! Assembly graph engine: builds a condensed de Bruijn graph from short reads,
//! mutates it through a small set of operations that are broadcast to registered
//! action handlers, and persists it with stable element ids.

pub mod error;
pub mod kmer;
pub mod utils;
pub mod read;
pub mod read_stream;
pub mod ext_index;
pub mod presimp;
pub mod condense;

pub mod arena;
pub mod graph;
pub mod handler;
pub mod smart_iter;

pub mod positions;
pub mod flanking;

pub mod binary_io;
pub mod id_mapper;
pub mod positions_io;
pub mod graph_io;

pub mod construction;
pub mod gfa_output;
pub mod seq_output;

pub use crate::construction::{construct_graph, construct_graph_with_coverage, ConstructionParams};
pub use crate::error::{Error, InvariantViolation, PersistenceError, Result};
pub use crate::graph::{EdgeId, Graph, GraphCore, VertexId};
pub use crate::handler::{ActionHandler, HandlerRef};
