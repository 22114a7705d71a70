//! The runtime error taxonomy.

use thiserror::Error;

use crate::body::NodeSignal;

/// Failures surfaced by graph validation, startup, and teardown.
///
/// Worker faults are recorded while the run winds down and re-raised from
/// `run` after every worker has joined; the original signal is preserved as
/// the error source.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Pre-start misconfiguration: an unwired non-optional input, a template
    /// without a selected body, an absent value pushed toward a non-optional
    /// constant consumer, a graph of only constant nodes.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("scheduler is already running")]
    AlreadyRunning,

    /// A constant node failed while being evaluated at startup. Fatal; no
    /// worker has been spawned at this point.
    #[error("constant node `{node}` failed during program start")]
    ConstantNode {
        node: String,
        #[source]
        source: NodeSignal,
    },

    /// A worker terminated with a fault; re-raised after all workers joined.
    #[error("worker `{node}` failed")]
    Worker {
        node: String,
        #[source]
        source: NodeSignal,
    },

    #[error("program serialization failed: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("malformed program: {0}")]
    Program(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
