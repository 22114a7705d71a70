//! Limiting an input port's size must make the producer block.

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::fast_config;
use flowgraph::{Graph, InPort, NodeSignal, Scheduler, Value};

/// The producer sends enough messages to block itself on a capacity-one
/// channel; the consumer sleeps a second per message. We only assert that
/// the final send was blocked for some time, not for the full second, since
/// scheduling delays cut both ways.
#[test]
fn full_channel_blocks_the_producer() {
    let gap: Arc<Mutex<Option<Duration>>> = Arc::new(Mutex::new(None));
    let mut graph = Graph::new("blocking");

    let source = {
        let gap = Arc::clone(&gap);
        graph.add_interactive("send_and_check_time", vec![], move |handle| {
            handle.send(Value::Int(1))?;
            handle.send(Value::Int(2))?;
            let before_last = Instant::now();
            handle.send(Value::Int(3))?;
            *gap.lock().unwrap() = Some(before_last.elapsed());
            Err(NodeSignal::RuntimeExit)
        })
    };
    let sink = graph.add_func(
        "receive_then_sleep",
        vec![InPort::new("n").with_size(1)],
        |_| {
            std::thread::sleep(Duration::from_secs(1));
            Ok(None)
        },
    );
    graph.wire(source, sink, "n").unwrap();

    let mut scheduler = Scheduler::new(graph, fast_config()).unwrap();
    scheduler.run(None).unwrap();

    let gap = gap.lock().unwrap().expect("source never finished its sends");
    assert!(gap >= Duration::from_millis(500), "third send blocked for only {:?}", gap);
}

/// The size hint combines with the global default: the smaller of the two
/// wins when both are set.
#[test]
fn capacity_combines_port_hint_and_global_default() {
    let mut graph = Graph::new("capacities");
    let fast = graph.add_interactive("fast", vec![], |_| Ok(()));
    let slow = graph.add_interactive("slow", vec![], |_| Ok(()));
    let hinted = graph.add_func("hinted", vec![InPort::new("n").with_size(2)], |_| Ok(None));
    let unhinted = graph.add_func("unhinted", vec![InPort::new("n")], |_| Ok(None));
    graph.wire(fast, hinted, "n").unwrap();
    graph.wire(slow, unhinted, "n").unwrap();

    let scheduler = Scheduler::new(graph, fast_config()).unwrap();
    assert_eq!(scheduler.out_channels(fast)[0].capacity(), 2);
    assert_eq!(scheduler.out_channels(slow)[0].capacity(), 16);
}
