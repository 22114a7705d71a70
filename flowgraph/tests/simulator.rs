//! End-to-end runs of the simulator: startup, delivery, shutdown, and fault
//! propagation.

mod common;

use std::time::{Duration, Instant};

use common::{add_adder, add_save_and_exit, add_saver, fast_config, recorded_values};
use flowgraph::{Graph, InPort, NodeSignal, RuntimeError, Scheduler, Value};
use log::LevelFilter;

#[test]
fn adder_then_print() {
    let mut graph = Graph::new("adder");
    let two = graph.add_constant("two", || Value::Int(2));
    let three = graph.add_constant("three", || Value::Int(3));
    let add = add_adder(&mut graph, "add");
    let (sink, seen) = add_save_and_exit(&mut graph, "print_then_exit");
    graph.wire(two, add, "a").unwrap();
    graph.wire(three, add, "b").unwrap();
    graph.wire(add, sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(None).unwrap();
    assert_eq!(recorded_values(&seen), vec![Value::Int(5)]);
}

#[test]
fn splitter_fan_out_delivers_to_every_sink() {
    let mut graph = Graph::new("fanout");
    let source = graph.add_interactive("source", vec![], |handle| {
        handle.send(Value::Int(1))?;
        Err(NodeSignal::RuntimeExit)
    });
    let mut seen = Vec::new();
    for name in ["saver_1", "saver_2", "saver_3"] {
        let (sink, values) = add_saver(&mut graph, name);
        graph.wire(source, sink, "val").unwrap();
        seen.push(values);
    }

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(None).unwrap();

    for values in &seen {
        assert_eq!(recorded_values(values), vec![Value::Int(1)]);
    }
    let splitter = scheduler.graph().find_node_by_name("splitter_0").unwrap();
    assert_eq!(scheduler.out_channels(splitter).len(), 3);
}

#[test]
fn forked_output_routes_fields_independently() {
    let mut graph = Graph::new("forked");
    let source = graph.add_interactive("source", vec![], |handle| {
        handle.send(Value::record([("x", Value::Int(1)), ("y", Value::Int(2))]))?;
        Err(NodeSignal::RuntimeExit)
    });
    let (a, seen_a) = add_saver(&mut graph, "saver_a");
    let (b, seen_b) = add_saver(&mut graph, "saver_b");
    let (c, seen_c) = add_saver(&mut graph, "saver_c");
    graph.wire_index(source, "x", a, "val").unwrap();
    graph.wire_index(source, "x", b, "val").unwrap();
    graph.wire_index(source, "y", c, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(None).unwrap();

    assert_eq!(recorded_values(&seen_a), vec![Value::Int(1)]);
    assert_eq!(recorded_values(&seen_b), vec![Value::Int(1)]);
    assert_eq!(recorded_values(&seen_c), vec![Value::Int(2)]);

    // Only the twice-consumed x field went through a splitter.
    let splitter = scheduler.graph().find_node_by_name("splitter_0").unwrap();
    let channels = scheduler.out_channels(splitter);
    assert_eq!(channels.len(), 2);
    assert!(channels.iter().all(|c| c.is_splitter_fed()));
}

#[test]
fn worker_fault_is_reraised_after_join() {
    let mut graph = Graph::new("faulty");
    let ticker = graph.add_interactive("ticker", vec![], |handle| loop {
        handle.send(Value::Int(1))?;
    });
    let faulty = graph.add_func("faulty", vec![InPort::new("n")], |_| {
        Err(NodeSignal::fault("boom"))
    });
    graph.wire(ticker, faulty, "n").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let err = scheduler.run(None).unwrap_err();
    match err {
        RuntimeError::Worker { node, source } => {
            assert_eq!(node, "faulty");
            assert_eq!(source, NodeSignal::Fault("boom".to_owned()));
        }
        other => panic!("expected a worker fault, got {:?}", other),
    }
}

#[test]
fn body_panic_is_reported_as_fault() {
    let mut graph = Graph::new("panicky");
    let ticker = graph.add_interactive("ticker", vec![], |handle| loop {
        handle.send(Value::Int(1))?;
    });
    let bad = graph.add_func("bad", vec![InPort::new("n")], |_| panic!("kaboom"));
    graph.wire(ticker, bad, "n").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let err = scheduler.run(None).unwrap_err();
    match err {
        RuntimeError::Worker { node, source } => {
            assert_eq!(node, "bad");
            assert_eq!(source, NodeSignal::Fault("kaboom".to_owned()));
        }
        other => panic!("expected a worker fault, got {:?}", other),
    }
}

#[test]
fn retiring_worker_does_not_stop_the_runtime() {
    let mut graph = Graph::new("retirement");
    // Retires straight away; everybody else keeps running.
    let retirer = graph.add_interactive("retirer", vec![], |_| Err(NodeSignal::Retire));
    let (retire_sink, _) = add_saver(&mut graph, "retire_sink");
    graph.wire(retirer, retire_sink, "val").unwrap();

    let ticker = graph.add_interactive("ticker", vec![], |handle| {
        let mut n = 0;
        loop {
            n += 1;
            handle.send(Value::Int(n))?;
            std::thread::sleep(Duration::from_millis(10));
        }
    });
    let counted: common::Recorded = Default::default();
    let counter = {
        let counted = std::sync::Arc::clone(&counted);
        graph.add_func("count_to_three", vec![InPort::new("n")], move |inputs| {
            let mut seen = counted.lock().unwrap();
            seen.extend(inputs[0].clone());
            if seen.len() == 3 {
                Err(NodeSignal::RuntimeExit)
            } else {
                Ok(None)
            }
        })
    };
    graph.wire(ticker, counter, "n").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(None).unwrap();
    assert_eq!(
        recorded_values(&counted),
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

#[test]
fn constant_only_graph_is_rejected() {
    let mut graph = Graph::new("constants");
    graph.add_constant("lonely", || Value::Int(1));
    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let err = scheduler.run(None).unwrap_err();
    assert!(matches!(err, RuntimeError::Config(ref msg) if msg.contains("constant")));
}

#[test]
fn constant_node_must_not_raise_runtime_exit() {
    let mut graph = Graph::new("eager_exit");
    let bad = graph.add_constant_with("bad", vec![], |_| Err(NodeSignal::RuntimeExit));
    let (sink, _) = add_saver(&mut graph, "saver");
    graph.wire(bad, sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let err = scheduler.start().unwrap_err();
    assert!(matches!(err, RuntimeError::Config(ref msg) if msg.contains("runtime exit")));
}

#[test]
fn constant_node_fault_aborts_startup() {
    let mut graph = Graph::new("broken_const");
    let bad = graph.add_constant_with("bad", vec![], |_| Err(NodeSignal::fault("no value")));
    let (sink, _) = add_saver(&mut graph, "saver");
    graph.wire(bad, sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let err = scheduler.start().unwrap_err();
    match err {
        RuntimeError::ConstantNode { node, source } => {
            assert_eq!(node, "bad");
            assert_eq!(source, NodeSignal::Fault("no value".to_owned()));
        }
        other => panic!("expected a constant node failure, got {:?}", other),
    }
}

#[test]
fn runtime_exit_stops_blocked_workers_promptly() {
    let mut graph = Graph::new("liveness");
    // A producer that retires immediately, leaving its consumer parked in a
    // blocking read until teardown.
    let quiet = graph.add_interactive("quiet", vec![], |_| Ok(()));
    let (sink, seen) = add_saver(&mut graph, "blocked_sink");
    graph.wire(quiet, sink, "val").unwrap();
    let exiter = graph.add_interactive("exiter", vec![], |handle| {
        std::thread::sleep(Duration::from_millis(50));
        handle.send(Value::Int(0))?;
        Err(NodeSignal::RuntimeExit)
    });
    let (exit_sink, _) = add_saver(&mut graph, "exit_sink");
    graph.wire(exiter, exit_sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    let started = Instant::now();
    scheduler.run(None).unwrap();
    // Every worker must return within the poll interval of the exit signal.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(recorded_values(&seen).is_empty());
}

#[test]
fn timeout_completion_is_normal() {
    let mut graph = Graph::new("endless");
    let ticker = graph.add_interactive("ticker", vec![], |handle| loop {
        handle.send(Value::Int(1))?;
        std::thread::sleep(Duration::from_millis(10));
    });
    let (sink, seen) = add_saver(&mut graph, "saver");
    graph.wire(ticker, sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(Some(Duration::from_millis(300))).unwrap();
    assert!(!recorded_values(&seen).is_empty());
}

#[test]
fn start_twice_fails() {
    let mut graph = Graph::new("once");
    let ticker = graph.add_interactive("ticker", vec![], |handle| loop {
        handle.send(Value::Int(1))?;
        std::thread::sleep(Duration::from_millis(10));
    });
    let (sink, _) = add_saver(&mut graph, "saver");
    graph.wire(ticker, sink, "val").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.start().unwrap();
    assert!(matches!(scheduler.start(), Err(RuntimeError::AlreadyRunning)));
    scheduler.stop().unwrap();
}

#[test]
fn message_log_is_ordered_by_clock() {
    let mut graph = Graph::new("logged");
    let two = graph.add_constant("two", || Value::Int(2));
    let three = graph.add_constant("three", || Value::Int(3));
    let add = add_adder(&mut graph, "add");
    let (sink, _) = add_save_and_exit(&mut graph, "print_then_exit");
    graph.wire(two, add, "a").unwrap();
    graph.wire(three, add, "b").unwrap();
    graph.wire(add, sink, "val").unwrap();

    let mut config = fast_config();
    config.msg_log_level = LevelFilter::Info;
    let mut scheduler = Scheduler::new(graph, config).unwrap();
    scheduler.run(None).unwrap();

    let records = scheduler.message_records();
    assert!(!records.is_empty());
    assert!(records.windows(2).all(|w| w[0].message.clk <= w[1].message.clk));
    assert!(records.iter().any(|r| {
        r.port.node == "print_then_exit"
            && r.port.port == "val"
            && r.message.payload == Some(Value::Int(5))
    }));
}
