//! Per-run record of message deliveries, ordered by logical clock.

use std::sync::Mutex;

use log::{info, LevelFilter};

use crate::message::Message;
use crate::port::PortName;

/// One delivery: the destination port and the message that reached it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageRecord {
    pub port: PortName,
    pub message: Message,
}

/// Collects delivery records as channels enqueue messages and emits them at
/// teardown in non-decreasing clock order.
///
/// Records are kept only when the configured level admits `Info`; flusher
/// sentinels and absent payloads are never recorded. The log is owned by the
/// scheduler and dropped with it, so no state survives across runs.
#[derive(Debug)]
pub struct MessageLog {
    level: LevelFilter,
    records: Mutex<Vec<MessageRecord>>,
}

impl MessageLog {
    pub fn new(level: LevelFilter) -> MessageLog {
        MessageLog { level, records: Mutex::new(Vec::new()) }
    }

    /// Appends one delivery record if the level filter admits it.
    pub fn add(&self, port: &PortName, message: &Message) {
        if self.level >= LevelFilter::Info && message.payload.is_some() {
            let mut records = self
                .records
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            records.push(MessageRecord { port: port.clone(), message: message.clone() });
        }
    }

    /// Returns all records stably sorted by clock stamp.
    pub fn ordered(&self) -> Vec<MessageRecord> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        records.sort_by_key(|r| r.message.clk);
        records
    }

    /// Emits every record through the `log` facade, ordered by clock.
    pub fn emit(&self) {
        for record in self.ordered() {
            if let Some(payload) = &record.message.payload {
                info!(
                    target: "flowgraph::messages",
                    "Sent to {} port {} at logical clock time {}: {}",
                    record.port.node, record.port.port, record.message.clk, payload
                );
            }
        }
    }
}
