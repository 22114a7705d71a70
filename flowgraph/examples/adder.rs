//! Add two constants and print the result.
//!
//! ```bash
//! cargo run --example adder -- -m info
//! ```

use flowgraph::{Config, Graph, InPort, NodeSignal, RuntimeError, Scheduler, Value};

fn main() -> Result<(), RuntimeError> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };
    env_logger::Builder::new()
        .filter_level(config.log_level)
        .parse_default_env()
        .init();

    let mut graph = Graph::new("adder");
    let two = graph.add_constant("two", || Value::Int(2));
    let three = graph.add_constant("three", || Value::Int(3));
    let add = graph.add_func("add", vec![InPort::new("a"), InPort::new("b")], |inputs| {
        let a = inputs[0].as_ref().and_then(Value::as_int).unwrap_or(0);
        let b = inputs[1].as_ref().and_then(Value::as_int).unwrap_or(0);
        Ok(Some(Value::Int(a + b)))
    });
    let print = graph.add_func("print_then_exit", vec![InPort::new("val")], |inputs| {
        if let Some(value) = &inputs[0] {
            println!("{}", value);
        }
        Err(NodeSignal::RuntimeExit)
    });
    graph.wire(two, add, "a")?;
    graph.wire(three, add, "b")?;
    graph.wire(add, print, "val")?;

    Scheduler::new(graph, config)?.run(None)
}
