//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowgraph::{Config, Graph, InPort, NodeId, NodeSignal, Value};

/// A configuration with a short poll interval so shutdown paths do not slow
/// the suite down.
pub fn fast_config() -> Config {
    Config { poll_interval: Duration::from_millis(50), ..Config::default() }
}

pub type Recorded = Arc<Mutex<Vec<Value>>>;

pub fn recorded_values(recorded: &Recorded) -> Vec<Value> {
    recorded.lock().unwrap().clone()
}

/// A sink that records every value it receives and keeps running.
pub fn add_saver(graph: &mut Graph, name: &str) -> (NodeId, Recorded) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        graph.add_func(name, vec![InPort::new("val")], move |inputs| {
            seen.lock().unwrap().extend(inputs[0].clone());
            Ok(None)
        })
    };
    (sink, seen)
}

/// A sink that records one value and then stops the whole runtime.
pub fn add_save_and_exit(graph: &mut Graph, name: &str) -> (NodeId, Recorded) {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        graph.add_func(name, vec![InPort::new("val")], move |inputs| {
            seen.lock().unwrap().extend(inputs[0].clone());
            Err(NodeSignal::RuntimeExit)
        })
    };
    (sink, seen)
}

/// An adder over two non-optional integer inputs.
pub fn add_adder(graph: &mut Graph, name: &str) -> NodeId {
    graph.add_func(name, vec![InPort::new("a"), InPort::new("b")], |inputs| {
        let a = inputs[0].as_ref().and_then(Value::as_int).unwrap_or(0);
        let b = inputs[1].as_ref().and_then(Value::as_int).unwrap_or(0);
        Ok(Some(Value::Int(a + b)))
    })
}
