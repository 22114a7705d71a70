//! Port naming shared by the channel fabric and the graph layer.

use std::fmt;

/// Index of a node within its graph.
pub type NodeId = usize;

/// Fully qualified name of a node endpoint.
///
/// The `fan_index`, when present, names one field of a composite payload
/// produced by the node; a channel bound to such a port delivers only that
/// field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortName {
    pub node: String,
    pub port: String,
    pub fan_index: Option<String>,
}

impl PortName {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> PortName {
        PortName { node: node.into(), port: port.into(), fan_index: None }
    }

    pub fn with_fan_index(mut self, fan_index: impl Into<String>) -> PortName {
        self.fan_index = Some(fan_index.into());
        self
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)?;
        if let Some(index) = &self.fan_index {
            write!(f, ".{}", index)?;
        }
        Ok(())
    }
}
