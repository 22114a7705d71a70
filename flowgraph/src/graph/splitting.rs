//! Automatic insertion of splitter nodes for multi-consumer output ports.

use super::{Endpoint, Graph, InPort, Node, NodeKind, OutPort};

impl Graph {
    /// Rewrites every output port group feeding two or more consumers to go
    /// through a synthetic splitter node.
    ///
    /// Out ports are grouped by fan index: each group with n >= 2
    /// destinations collapses into a single port into the splitter's input,
    /// and the splitter gets n plain out ports, one per original consumer.
    /// The producer-side port keeps the group's fan index, so projection
    /// happens once, on the way into the splitter.
    ///
    /// The rewrite runs at most once per graph; repeated calls are no-ops.
    /// The exclusive receiver rules out concurrent re-entry.
    pub fn do_automatic_splitting(&mut self) {
        if self.split {
            return;
        }
        self.split = true;

        let existing = self.nodes.len();
        for src in 0..existing {
            let ports = std::mem::take(&mut self.nodes[src].out_ports);

            // Group while preserving first-seen order.
            let mut groups: Vec<(Option<String>, Vec<OutPort>)> = Vec::new();
            for port in ports {
                match groups.iter_mut().find(|(key, _)| *key == port.fan_index) {
                    Some((_, members)) => members.push(port),
                    None => groups.push((port.fan_index.clone(), vec![port])),
                }
            }

            let mut rebuilt = Vec::with_capacity(groups.len());
            for (fan_index, mut members) in groups {
                if members.len() == 1 {
                    rebuilt.extend(members.pop());
                    continue;
                }
                let splitter = self.nodes.len();
                let outs = members
                    .into_iter()
                    .map(|mut port| {
                        port.fan_index = None;
                        port
                    })
                    .collect();
                self.nodes.push(Node {
                    name: format!("splitter_{}", self.splitter_count),
                    kind: NodeKind::Splitter,
                    bodies: Vec::new(),
                    selected: None,
                    in_ports: vec![InPort::new("in")],
                    out_ports: outs,
                });
                self.splitter_count += 1;
                rebuilt.push(OutPort { fan_index, dest: Endpoint { node: splitter, port: 0 } });
            }
            self.nodes[src].out_ports = rebuilt;
        }
    }
}
