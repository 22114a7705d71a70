//! Node bodies and the signals they use to steer the runtime.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use flowgraph_communication::Value;

use crate::scheduler::worker::NodeHandle;

/// Raised by a node body to control its worker and, possibly, the runtime.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NodeSignal {
    /// Formal exit of the whole simulation. Raised by a node after the
    /// required result has been achieved; the runtime then terminates every
    /// worker in unspecified order. Not an error.
    #[error("runtime exit requested")]
    RuntimeExit,
    /// Retire this worker only. Other workers keep running and the stop
    /// signal is not raised.
    #[error("worker retired")]
    Retire,
    /// The runtime shut down while the body was blocked on channel I/O.
    /// Workers treat this as a normal return; bodies should propagate it.
    #[error("runtime stopped")]
    Stopped,
    /// Anything else. Recorded on the worker handle and re-raised by the
    /// scheduler after teardown.
    #[error("{0}")]
    Fault(String),
}

impl NodeSignal {
    pub fn fault(message: impl Into<String>) -> NodeSignal {
        NodeSignal::Fault(message.into())
    }
}

/// Body of a constant or long-lived functional node: inputs in port order
/// (absent for optional inputs with nothing pending), one optional output.
pub type FuncFn = dyn Fn(&[Option<Value>]) -> Result<Option<Value>, NodeSignal> + Send + Sync;

/// Body of an interactive node, driving its own receives and sends.
pub type InteractiveFn = dyn Fn(&mut NodeHandle<'_>) -> Result<(), NodeSignal> + Send + Sync;

/// The computation installed on a node.
///
/// `Const` bodies are pure: evaluated exactly once at start, with any inputs
/// supplied by direct calls into upstream constant nodes. `Func` bodies run
/// in a read-eval-write loop on their own worker. `Interactive` bodies get a
/// [`NodeHandle`] and perform channel I/O themselves.
#[derive(Clone)]
pub enum Body {
    Const(Arc<FuncFn>),
    Func(Arc<FuncFn>),
    Interactive(Arc<InteractiveFn>),
}

impl Body {
    pub fn constant<F>(f: F) -> Body
    where
        F: Fn(&[Option<Value>]) -> Result<Option<Value>, NodeSignal> + Send + Sync + 'static,
    {
        Body::Const(Arc::new(f))
    }

    pub fn func<F>(f: F) -> Body
    where
        F: Fn(&[Option<Value>]) -> Result<Option<Value>, NodeSignal> + Send + Sync + 'static,
    {
        Body::Func(Arc::new(f))
    }

    pub fn interactive<F>(f: F) -> Body
    where
        F: Fn(&mut NodeHandle<'_>) -> Result<(), NodeSignal> + Send + Sync + 'static,
    {
        Body::Interactive(Arc::new(f))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Body::Const(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Const(_) => f.write_str("Body::Const"),
            Body::Func(_) => f.write_str("Body::Func"),
            Body::Interactive(_) => f.write_str("Body::Interactive"),
        }
    }
}

/// One entry of a template node's body table.
#[derive(Clone, Debug)]
pub struct NamedBody {
    pub name: String,
    pub body: Body,
}

impl NamedBody {
    pub fn new(name: impl Into<String>, body: Body) -> NamedBody {
        NamedBody { name: name.into(), body }
    }
}
