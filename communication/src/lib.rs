//! Channel fabric for the flowgraph simulator.
//!
//! This crate provides the transport layer between graph nodes: the
//! [`Message`] envelope and its opaque [`Value`] payloads, the [`Channel`]
//! variants that connect one producer port to one consumer port, the one-shot
//! [`StopSignal`] that drives cooperative shutdown, and the [`MessageLog`]
//! that records deliveries for post-run inspection ordered by logical clock.

pub mod channel;
pub mod message;
pub mod message_log;
pub mod port;
pub mod signal;

pub use crate::channel::{Channel, ChannelError, ChannelKind};
pub use crate::message::{Message, Value, FLUSH_CLK};
pub use crate::message_log::{MessageLog, MessageRecord};
pub use crate::port::{NodeId, PortName};
pub use crate::signal::StopSignal;
