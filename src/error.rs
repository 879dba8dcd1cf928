// Error taxonomy shared by the construction pipeline, the graph and the persistence layer.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// A broken structural invariant: either a caller violated a mutation
/// precondition or construction produced an inconsistent state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invariant violated in {operation}: {detail}")]
pub struct InvariantViolation {
    pub operation: &'static str,
    pub detail: String,
}

impl InvariantViolation {
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        InvariantViolation { operation, detail: detail.into() }
    }
}

/// Checks a structural precondition; on failure the violation is logged and the run aborts.
#[macro_export]
macro_rules! verify {
    ($cond:expr, $op:expr, $($arg:tt)+) => {
        if !$cond {
            let violation = $crate::error::InvariantViolation::new($op, format!($($arg)+));
            tracing::error!("{}", violation);
            panic!("{}", violation);
        }
    };
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("unknown stable id {0}: graph and auxiliary file do not match")]
    UnknownId(u64),

    #[error("malformed record stream: {0}")]
    Malformed(String),

    #[error("handler is already attached, refusing to load into it")]
    AlreadyAttached,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("couldn't read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("index build failed in partition {partition}: {source}")]
    Build {
        partition: usize,
        #[source]
        source: Box<Error>,
    },
}
