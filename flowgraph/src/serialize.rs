//! The binary program format.
//!
//! A graph leaves the runtime as a self-describing `Program` envelope: a
//! name, an opaque bundle of user files, a requirements list, a per-body
//! descriptor table, a per-node table, and the wiring list. Splitter
//! insertion always runs before encoding, so a decoded program describes
//! the graph exactly as the scheduler would execute it. Bodies serialize as
//! descriptors, not code.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::error::RuntimeError;
use crate::graph::{Graph, NodeKind};

const MAGIC: &[u8; 4] = b"FGPH";
const VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyRole {
    Const,
    Func,
    Interactive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyDescriptor {
    pub name: String,
    pub role: BodyRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub optional: bool,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub kind: NodeKind,
    pub in_ports: Vec<PortDescriptor>,
    /// Indices into the program-wide body table.
    pub bodies: Vec<u32>,
    pub selected: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub src_node: u32,
    pub fan_index: Option<String>,
    pub dst_node: u32,
    pub dst_port: u32,
}

/// The serialized form of a complete program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    /// Opaque bundle of user files, conventionally a zip archive.
    pub files: Vec<u8>,
    pub requirements: Vec<String>,
    pub bodies: Vec<BodyDescriptor>,
    pub nodes: Vec<NodeDescriptor>,
    pub graph: Vec<Wire>,
}

/// Encodes a graph as a program envelope.
///
/// Runs splitter insertion first. `name` defaults to the graph's own name;
/// requirements are deduplicated and kept sorted so equal programs encode
/// identically.
pub fn serialize_program(
    graph: &mut Graph,
    name: Option<&str>,
    files: &[u8],
    requirements: &[String],
) -> Result<Vec<u8>, RuntimeError> {
    graph.do_automatic_splitting();

    let mut bodies = Vec::new();
    let mut nodes = Vec::new();
    let mut wires = Vec::new();
    for (id, node) in graph.nodes().iter().enumerate() {
        let mut body_refs = Vec::new();
        for named in &node.bodies {
            body_refs.push(bodies.len() as u32);
            bodies.push(BodyDescriptor {
                name: named.name.clone(),
                role: match named.body {
                    Body::Const(_) => BodyRole::Const,
                    Body::Func(_) => BodyRole::Func,
                    Body::Interactive(_) => BodyRole::Interactive,
                },
            });
        }
        nodes.push(NodeDescriptor {
            name: node.name().to_owned(),
            kind: node.kind(),
            in_ports: node
                .in_ports()
                .iter()
                .map(|port| PortDescriptor {
                    name: port.name.clone(),
                    optional: port.optional,
                    size: port.size as u32,
                })
                .collect(),
            bodies: body_refs,
            selected: node.selected.map(|index| index as u32),
        });
        for out in node.out_ports() {
            wires.push(Wire {
                src_node: id as u32,
                fan_index: out.fan_index.clone(),
                dst_node: out.dest.node as u32,
                dst_port: out.dest.port as u32,
            });
        }
    }

    let requirements: Vec<String> =
        requirements.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();

    let program = Program {
        name: name.unwrap_or_else(|| graph.name()).to_owned(),
        files: files.to_vec(),
        requirements,
        bodies,
        nodes,
        graph: wires,
    };

    let mut buffer = Vec::new();
    buffer.write_all(MAGIC)?;
    buffer.write_u32::<LittleEndian>(VERSION)?;
    bincode::serialize_into(&mut buffer, &program)?;
    Ok(buffer)
}

/// Decodes a program envelope, validating the header first.
pub fn deserialize_program(bytes: &[u8]) -> Result<Program, RuntimeError> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0_u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(RuntimeError::Program("bad magic bytes".to_owned()));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(RuntimeError::Program(format!("unsupported program version {}", version)));
    }
    Ok(bincode::deserialize_from(cursor)?)
}
