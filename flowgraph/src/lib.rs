//! A reference simulator for dataflow graphs.
//!
//! A graph is a set of computation nodes connected by typed channels. The
//! scheduler lays the channels out (fanning multi-consumer ports out through
//! synthetic splitter nodes), evaluates constant nodes exactly once, spawns
//! one worker thread per long-lived node, and coordinates an orderly
//! shutdown when any node raises the runtime exit signal or faults.
//!
//! Correctness is favored over throughput: this runtime is meant for
//! prototyping, testing, and debugging graphs, not for production loads.
//!
//! # Examples
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use flowgraph::{Config, Graph, InPort, NodeSignal, Scheduler, Value};
//!
//! let mut graph = Graph::new("adder");
//! let two = graph.add_constant("two", || Value::Int(2));
//! let three = graph.add_constant("three", || Value::Int(3));
//! let add = graph.add_func("add", vec![InPort::new("a"), InPort::new("b")], |inputs| {
//!     let a = inputs[0].as_ref().and_then(Value::as_int).unwrap_or(0);
//!     let b = inputs[1].as_ref().and_then(Value::as_int).unwrap_or(0);
//!     Ok(Some(Value::Int(a + b)))
//! });
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let seen = Arc::clone(&seen);
//!     graph.add_func("print_then_exit", vec![InPort::new("val")], move |inputs| {
//!         seen.lock().unwrap().extend(inputs[0].clone());
//!         Err(NodeSignal::RuntimeExit)
//!     })
//! };
//! graph.wire(two, add, "a")?;
//! graph.wire(three, add, "b")?;
//! graph.wire(add, sink, "val")?;
//!
//! let config = Config { poll_interval: Duration::from_millis(50), ..Config::default() };
//! let mut scheduler = Scheduler::new(graph, config)?;
//! scheduler.run(None)?;
//! assert_eq!(seen.lock().unwrap().as_slice(), &[Value::Int(5)]);
//! # Ok::<(), flowgraph::RuntimeError>(())
//! ```

pub mod body;
pub mod config;
pub mod error;
pub mod graph;
pub mod scheduler;
pub mod serialize;

pub use crate::body::{Body, NamedBody, NodeSignal};
pub use crate::config::Config;
pub use crate::error::RuntimeError;
pub use crate::graph::{Endpoint, Graph, InPort, Node, NodeKind, OutPort};
pub use crate::scheduler::worker::NodeHandle;
pub use crate::scheduler::Scheduler;

pub use flowgraph_communication as communication;
pub use flowgraph_communication::{
    Channel, ChannelError, ChannelKind, Message, MessageLog, MessageRecord, NodeId, PortName,
    StopSignal, Value,
};
