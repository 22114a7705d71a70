//! The binary program envelope.

mod common;

use common::add_saver;
use flowgraph::serialize::{deserialize_program, serialize_program, BodyRole};
use flowgraph::{Graph, NodeKind, RuntimeError, Value};

fn forked_graph() -> Graph {
    let mut graph = Graph::new("forked");
    let source = graph.add_constant("pair", || {
        Value::record([("x", Value::Int(1)), ("y", Value::Int(2))])
    });
    let (a, _) = add_saver(&mut graph, "saver_a");
    let (b, _) = add_saver(&mut graph, "saver_b");
    let (c, _) = add_saver(&mut graph, "saver_c");
    graph.wire_index(source, "x", a, "val").unwrap();
    graph.wire_index(source, "x", b, "val").unwrap();
    graph.wire_index(source, "y", c, "val").unwrap();
    graph
}

#[test]
fn program_envelope_describes_the_split_graph() {
    let mut graph = forked_graph();
    let requirements =
        vec!["numpy".to_owned(), "scipy".to_owned(), "numpy".to_owned()];
    let bytes = serialize_program(&mut graph, None, b"user files", &requirements).unwrap();
    let program = deserialize_program(&bytes).unwrap();

    assert_eq!(program.name, "forked");
    assert_eq!(program.files, b"user files");
    // Requirements are deduplicated and sorted.
    assert_eq!(program.requirements, vec!["numpy".to_owned(), "scipy".to_owned()]);

    // Serialization always encodes the graph after splitter insertion.
    assert_eq!(program.nodes.len(), 5);
    assert!(program.nodes.iter().any(|n| n.kind == NodeKind::Splitter));

    // One body per authored node, none for the synthetic splitter.
    assert_eq!(program.bodies.len(), 4);
    assert_eq!(program.bodies.iter().filter(|b| b.role == BodyRole::Const).count(), 1);
    assert_eq!(program.bodies.iter().filter(|b| b.role == BodyRole::Func).count(), 3);

    // Source keeps two fan-indexed wires (x into the splitter, y direct);
    // the splitter fans x out to two savers.
    assert_eq!(program.graph.len(), 4);
    let fanned: Vec<_> =
        program.graph.iter().filter_map(|w| w.fan_index.as_deref()).collect();
    assert_eq!(fanned, vec!["x", "y"]);
}

#[test]
fn explicit_name_overrides_graph_name() {
    let mut graph = forked_graph();
    let bytes = serialize_program(&mut graph, Some("custom"), &[], &[]).unwrap();
    assert_eq!(deserialize_program(&bytes).unwrap().name, "custom");
}

#[test]
fn bad_header_is_rejected() {
    assert!(matches!(
        deserialize_program(b"not a program at all"),
        Err(RuntimeError::Program(_))
    ));
    assert!(matches!(deserialize_program(b"FG"), Err(RuntimeError::Io(_))));
}
