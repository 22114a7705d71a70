//! The dataflow graph model: nodes, ports, wiring, and validation.

mod splitting;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use flowgraph_communication::{NodeId, Value};

use crate::body::{Body, NamedBody, NodeSignal};
use crate::error::RuntimeError;

/// Classification of a node, carried explicitly on its handle. Behaviour
/// switches dispatch on this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Long-lived node with one worker thread.
    Running,
    /// Input-less (or constant-fed) node evaluated exactly once at start.
    Constant,
    /// Synthetic one-to-many forwarder inserted by the runtime.
    Splitter,
    /// Node whose body is selected from a table before startup.
    Template,
}

/// An input endpoint of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InPort {
    pub name: String,
    pub optional: bool,
    /// Capacity hint for the incoming channel; 0 means unspecified.
    pub size: usize,
}

impl InPort {
    pub fn new(name: impl Into<String>) -> InPort {
        InPort { name: name.into(), optional: false, size: 0 }
    }

    pub fn optional(mut self) -> InPort {
        self.optional = true;
        self
    }

    pub fn with_size(mut self, size: usize) -> InPort {
        self.size = size;
        self
    }
}

/// Destination of an output port: one input port of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: usize,
}

/// An output endpoint. Fan-out to several consumers appears as several out
/// ports sharing a fan index until splitter insertion rewrites the group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutPort {
    pub fan_index: Option<String>,
    pub dest: Endpoint,
}

/// A unit of computation in the graph.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) bodies: Vec<NamedBody>,
    pub(crate) selected: Option<usize>,
    pub(crate) in_ports: Vec<InPort>,
    pub(crate) out_ports: Vec<OutPort>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn in_ports(&self) -> &[InPort] {
        &self.in_ports
    }

    pub fn out_ports(&self) -> &[OutPort] {
        &self.out_ports
    }

    /// A template with no body selected cannot start.
    pub fn needs_body(&self) -> bool {
        self.kind == NodeKind::Template && self.selected.is_none()
    }

    pub fn selected_body(&self) -> Option<&NamedBody> {
        self.selected.map(|index| &self.bodies[index])
    }

    pub(crate) fn body(&self) -> Option<&Body> {
        self.selected.map(|index| &self.bodies[index].body)
    }

    pub(crate) fn in_port_index(&self, name: &str) -> Option<usize> {
        self.in_ports.iter().position(|p| p.name == name)
    }
}

/// A directed graph of computation nodes connected through ports.
///
/// Graphs are assembled by the construction layer and handed to the
/// scheduler, which runs splitter insertion and validation before building
/// any channel.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) split: bool,
    pub(crate) splitter_count: usize,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Graph {
        Graph { name: name.into(), nodes: Vec::new(), split: false, splitter_count: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Adds an input-less constant node with a nullary body.
    pub fn add_constant<F>(&mut self, name: impl Into<String>, f: F) -> NodeId
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let body = Body::constant(move |_inputs| Ok(Some(f())));
        self.push_node(Node {
            name: name.into(),
            kind: NodeKind::Constant,
            bodies: vec![NamedBody::new("const", body)],
            selected: Some(0),
            in_ports: Vec::new(),
            out_ports: Vec::new(),
        })
    }

    /// Adds a constant node that combines the outputs of upstream constant
    /// nodes. All of its producers must themselves be constant.
    pub fn add_constant_with<F>(
        &mut self,
        name: impl Into<String>,
        in_ports: Vec<InPort>,
        f: F,
    ) -> NodeId
    where
        F: Fn(&[Option<Value>]) -> Result<Option<Value>, NodeSignal> + Send + Sync + 'static,
    {
        self.push_node(Node {
            name: name.into(),
            kind: NodeKind::Constant,
            bodies: vec![NamedBody::new("const", Body::constant(f))],
            selected: Some(0),
            in_ports,
            out_ports: Vec::new(),
        })
    }

    /// Adds a long-lived node whose body is called once per input batch.
    pub fn add_func<F>(&mut self, name: impl Into<String>, in_ports: Vec<InPort>, f: F) -> NodeId
    where
        F: Fn(&[Option<Value>]) -> Result<Option<Value>, NodeSignal> + Send + Sync + 'static,
    {
        self.push_node(Node {
            name: name.into(),
            kind: NodeKind::Running,
            bodies: vec![NamedBody::new("func", Body::func(f))],
            selected: Some(0),
            in_ports,
            out_ports: Vec::new(),
        })
    }

    /// Adds a long-lived node whose body drives its own receives and sends.
    pub fn add_interactive<F>(
        &mut self,
        name: impl Into<String>,
        in_ports: Vec<InPort>,
        f: F,
    ) -> NodeId
    where
        F: Fn(&mut crate::scheduler::worker::NodeHandle<'_>) -> Result<(), NodeSignal>
            + Send
            + Sync
            + 'static,
    {
        self.push_node(Node {
            name: name.into(),
            kind: NodeKind::Running,
            bodies: vec![NamedBody::new("interactive", Body::interactive(f))],
            selected: Some(0),
            in_ports,
            out_ports: Vec::new(),
        })
    }

    /// Adds a template node carrying a table of candidate bodies, optionally
    /// pre-selecting one of them.
    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        in_ports: Vec<InPort>,
        bodies: Vec<NamedBody>,
        default: Option<&str>,
    ) -> Result<NodeId, RuntimeError> {
        let name = name.into();
        let selected = match default {
            None => None,
            Some(wanted) => Some(
                bodies
                    .iter()
                    .position(|b| b.name == wanted)
                    .ok_or_else(|| {
                        RuntimeError::Config(format!(
                            "node `{}` has no body named `{}`",
                            name, wanted
                        ))
                    })?,
            ),
        };
        Ok(self.push_node(Node {
            name,
            kind: NodeKind::Template,
            bodies,
            selected,
            in_ports,
            out_ports: Vec::new(),
        }))
    }

    /// Selects one of a template node's bodies by name.
    pub fn select_body(&mut self, node: NodeId, body: &str) -> Result<(), RuntimeError> {
        let handle = &self.nodes[node];
        if handle.kind != NodeKind::Template {
            return Err(RuntimeError::Config(format!(
                "node `{}` is not a template node",
                handle.name
            )));
        }
        let index = handle.bodies.iter().position(|b| b.name == body).ok_or_else(|| {
            RuntimeError::Config(format!("node `{}` has no body named `{}`", handle.name, body))
        })?;
        self.nodes[node].selected = Some(index);
        Ok(())
    }

    /// Wires a producer's whole output to one input port of a consumer.
    pub fn wire(&mut self, src: NodeId, dst: NodeId, port: &str) -> Result<(), RuntimeError> {
        self.wire_port(src, None, dst, port)
    }

    /// Wires one field of a producer's composite output to a consumer.
    pub fn wire_index(
        &mut self,
        src: NodeId,
        fan_index: &str,
        dst: NodeId,
        port: &str,
    ) -> Result<(), RuntimeError> {
        self.wire_port(src, Some(fan_index.to_owned()), dst, port)
    }

    fn wire_port(
        &mut self,
        src: NodeId,
        fan_index: Option<String>,
        dst: NodeId,
        port: &str,
    ) -> Result<(), RuntimeError> {
        let port = self.nodes[dst].in_port_index(port).ok_or_else(|| {
            RuntimeError::Config(format!(
                "node `{}` has no input port named `{}`",
                self.nodes[dst].name, port
            ))
        })?;
        self.nodes[src]
            .out_ports
            .push(OutPort { fan_index, dest: Endpoint { node: dst, port } });
        Ok(())
    }

    /// The producing endpoint wired to the given input port, if any.
    pub(crate) fn producer_of(&self, node: NodeId, port: usize) -> Option<(NodeId, &OutPort)> {
        for (id, candidate) in self.nodes.iter().enumerate() {
            for out in &candidate.out_ports {
                if out.dest.node == node && out.dest.port == port {
                    return Some((id, out));
                }
            }
        }
        None
    }

    /// Whether the node is evaluated once at start rather than spawned as a
    /// worker: a constant node, or a template whose selected body is constant
    /// and whose producers are all themselves evaluated once.
    pub(crate) fn runs_once(&self, node: NodeId) -> bool {
        self.runs_once_guarded(node, &mut HashSet::new())
    }

    fn runs_once_guarded(&self, node: NodeId, visiting: &mut HashSet<NodeId>) -> bool {
        if !visiting.insert(node) {
            return false;
        }
        let handle = &self.nodes[node];
        let result = match handle.kind {
            NodeKind::Constant => true,
            NodeKind::Template => {
                handle.body().map(Body::is_const).unwrap_or(false)
                    && (0..handle.in_ports.len()).all(|port| {
                        match self.producer_of(node, port) {
                            Some((producer, _)) => self.runs_once_guarded(producer, visiting),
                            None => true,
                        }
                    })
            }
            NodeKind::Running | NodeKind::Splitter => false,
        };
        visiting.remove(&node);
        result
    }

    /// Whether anything downstream of the node, transitively, is a worker.
    /// Constant nodes whose output never reaches a worker are not evaluated.
    pub(crate) fn reaches_running_node(&self, node: NodeId) -> bool {
        let mut pending = vec![node];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            for out in &self.nodes[current].out_ports {
                if !self.runs_once(out.dest.node) {
                    return true;
                }
                pending.push(out.dest.node);
            }
        }
        false
    }

    /// Validates pre-start invariants: every non-optional input wired by
    /// exactly one edge, no input wired twice, every template body selected,
    /// constant nodes fed only by constant producers.
    pub fn check(&self) -> Result<(), RuntimeError> {
        let mut incoming: Vec<Vec<usize>> =
            self.nodes.iter().map(|n| vec![0; n.in_ports.len()]).collect();
        for node in &self.nodes {
            for out in &node.out_ports {
                incoming[out.dest.node][out.dest.port] += 1;
            }
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if node.needs_body() {
                return Err(RuntimeError::Config(format!(
                    "must specify a body for node `{}`",
                    node.name
                )));
            }
            for (port, spec) in node.in_ports.iter().enumerate() {
                let count = incoming[id][port];
                if count > 1 {
                    return Err(RuntimeError::Config(format!(
                        "input port `{}` of node `{}` is wired {} times",
                        spec.name, node.name, count
                    )));
                }
                if count == 0 && !spec.optional {
                    return Err(RuntimeError::Config(format!(
                        "non-optional input port `{}` of node `{}` is not wired",
                        spec.name, node.name
                    )));
                }
            }
            if node.kind == NodeKind::Constant {
                for port in 0..node.in_ports.len() {
                    if let Some((producer, _)) = self.producer_of(id, port) {
                        if !self.runs_once(producer) {
                            return Err(RuntimeError::Config(format!(
                                "constant node `{}` is fed by non-constant node `{}`",
                                node.name, self.nodes[producer].name
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
