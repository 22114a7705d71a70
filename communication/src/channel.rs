//! Bounded FIFO channels between one producer port and one consumer port.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::message::Message;
use crate::message_log::MessageLog;
use crate::port::PortName;
use crate::signal::StopSignal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Standard,
    Constant,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is full")]
    Full,
    #[error("channel is empty")]
    Empty,
    #[error("runtime is stopping")]
    Stopped,
    #[error("constant channel is already populated")]
    AlreadyPopulated,
    #[error("absent value pushed to non-optional constant channel")]
    AbsentConstant,
}

#[derive(Debug)]
enum Variant {
    Standard { splitter_fed: bool },
    /// Write-once slot; reads hand out a fresh copy without draining it,
    /// modelling a never-ending stream of the same value.
    Constant { saved: Mutex<Option<Message>> },
}

/// The FIFO transport between an output port and an input port.
///
/// Channels are internally synchronized and shared by exactly two parties.
/// If the source port carries a fan index, every written payload is first
/// projected to that record field; projections that come up absent are
/// dropped, like any other absent payload.
///
/// Blocking operations poll the shutdown flag every `poll_interval`, which
/// bounds how long a worker can stay suspended after teardown starts.
#[derive(Debug)]
pub struct Channel {
    variant: Variant,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    capacity: usize,
    poll_interval: Duration,
    src: PortName,
    dst: PortName,
    optional: bool,
    stop: Arc<StopSignal>,
    log: Option<Arc<MessageLog>>,
}

fn queue(capacity: usize) -> (Sender<Message>, Receiver<Message>) {
    // Capacity 0 means "no hint from either side": fall back to an unbounded
    // queue rather than a rendezvous channel.
    if capacity == 0 {
        unbounded()
    } else {
        bounded(capacity)
    }
}

fn lock(slot: &Mutex<Option<Message>>) -> MutexGuard<'_, Option<Message>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl Channel {
    pub fn standard(
        src: PortName,
        dst: PortName,
        optional: bool,
        capacity: usize,
        poll_interval: Duration,
        stop: Arc<StopSignal>,
        log: Option<Arc<MessageLog>>,
    ) -> Channel {
        let (tx, rx) = queue(capacity);
        Channel {
            variant: Variant::Standard { splitter_fed: false },
            tx,
            rx,
            capacity,
            poll_interval,
            src,
            dst,
            optional,
            stop,
            log,
        }
    }

    /// A standard channel whose producer is a synthetic splitter node.
    pub fn splitter_fed(
        src: PortName,
        dst: PortName,
        optional: bool,
        capacity: usize,
        poll_interval: Duration,
        stop: Arc<StopSignal>,
        log: Option<Arc<MessageLog>>,
    ) -> Channel {
        let mut channel = Channel::standard(src, dst, optional, capacity, poll_interval, stop, log);
        channel.variant = Variant::Standard { splitter_fed: true };
        channel
    }

    pub fn constant(
        src: PortName,
        dst: PortName,
        optional: bool,
        poll_interval: Duration,
        stop: Arc<StopSignal>,
        log: Option<Arc<MessageLog>>,
    ) -> Channel {
        let (tx, rx) = queue(1);
        Channel {
            variant: Variant::Constant { saved: Mutex::new(None) },
            tx,
            rx,
            capacity: 1,
            poll_interval,
            src,
            dst,
            optional,
            stop,
            log,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self.variant {
            Variant::Standard { .. } => ChannelKind::Standard,
            Variant::Constant { .. } => ChannelKind::Constant,
        }
    }

    pub fn is_splitter_fed(&self) -> bool {
        matches!(self.variant, Variant::Standard { splitter_fed: true })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn src(&self) -> &PortName {
        &self.src
    }

    pub fn dst(&self) -> &PortName {
        &self.dst
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    fn record_delivery(&self, message: &Message) {
        if let Some(log) = &self.log {
            log.add(&self.dst, message);
        }
    }

    /// Writes a message, projecting fan-indexed payloads first.
    ///
    /// Absent payloads are dropped and the write reports success. A blocking
    /// write on a full channel retries every poll interval until capacity
    /// frees up, the optional `timeout` expires (`Err(Full)`), or shutdown is
    /// observed (`Err(Stopped)`).
    pub fn write(
        &self,
        message: Message,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<(), ChannelError> {
        let to_put = message.project(self.src.fan_index.as_deref());
        match &self.variant {
            Variant::Constant { saved } => self.write_constant(saved, to_put),
            Variant::Standard { .. } => {
                if to_put.payload.is_none() {
                    return Ok(());
                }
                let copy = self.log.as_ref().map(|_| to_put.clone());
                if !block {
                    return match self.tx.try_send(to_put) {
                        Ok(()) => {
                            if let Some(copy) = copy {
                                self.record_delivery(&copy);
                            }
                            Ok(())
                        }
                        Err(TrySendError::Full(_)) => Err(ChannelError::Full),
                        Err(TrySendError::Disconnected(_)) => Err(ChannelError::Stopped),
                    };
                }
                let deadline = timeout.map(|t| Instant::now() + t);
                let mut pending = to_put;
                loop {
                    let mut wait = self.poll_interval;
                    if let Some(deadline) = deadline {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(ChannelError::Full);
                        }
                        wait = wait.min(deadline - now);
                    }
                    match self.tx.send_timeout(pending, wait) {
                        Ok(()) => {
                            if let Some(copy) = copy {
                                self.record_delivery(&copy);
                            }
                            return Ok(());
                        }
                        Err(SendTimeoutError::Timeout(returned)) => {
                            if self.stop.is_set() {
                                return Err(ChannelError::Stopped);
                            }
                            pending = returned;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(ChannelError::Stopped);
                        }
                    }
                }
            }
        }
    }

    fn write_constant(
        &self,
        saved: &Mutex<Option<Message>>,
        to_put: Message,
    ) -> Result<(), ChannelError> {
        let mut slot = lock(saved);
        if slot.is_some() {
            return Err(ChannelError::AlreadyPopulated);
        }
        if to_put.payload.is_none() {
            if self.optional {
                // An optional consumer of an absent constant just never
                // receives anything; the slot stays unpopulated.
                return Ok(());
            }
            return Err(ChannelError::AbsentConstant);
        }
        self.record_delivery(&to_put);
        *slot = Some(to_put);
        Ok(())
    }

    /// Reads the next message.
    ///
    /// A populated constant channel returns a fresh copy of its stored value
    /// on every call without draining it. A blocking read suspends until a
    /// message (possibly a flusher sentinel) arrives or shutdown is observed.
    pub fn read(&self, block: bool) -> Result<Message, ChannelError> {
        match &self.variant {
            Variant::Constant { saved } => {
                if let Some(message) = &*lock(saved) {
                    return Ok(message.clone());
                }
                if !block {
                    return Err(ChannelError::Empty);
                }
                loop {
                    match self.rx.recv_timeout(self.poll_interval) {
                        Ok(message) => return Ok(message),
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(message) = &*lock(saved) {
                                return Ok(message.clone());
                            }
                            if self.stop.is_set() {
                                return Err(ChannelError::Stopped);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(ChannelError::Stopped);
                        }
                    }
                }
            }
            Variant::Standard { .. } => {
                if !block {
                    return self.rx.try_recv().map_err(|_| ChannelError::Empty);
                }
                loop {
                    match self.rx.recv_timeout(self.poll_interval) {
                        Ok(message) => return Ok(message),
                        Err(RecvTimeoutError::Timeout) => {
                            if self.stop.is_set() {
                                return Err(ChannelError::Stopped);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(ChannelError::Stopped);
                        }
                    }
                }
            }
        }
    }

    /// Non-blocking read that substitutes the absent message when empty.
    /// This is how optional inputs are served.
    pub fn try_read_or_absent(&self) -> Message {
        self.read(false).unwrap_or_else(|_| Message::absent())
    }

    /// Enqueues a flusher sentinel if the channel is empty, releasing any
    /// consumer blocked on `read` during teardown. A populated constant
    /// channel needs no flushing.
    pub fn flush(&self) {
        match &self.variant {
            Variant::Constant { saved } => {
                if lock(saved).is_none() {
                    let _ = self.tx.try_send(Message::flusher());
                }
            }
            Variant::Standard { .. } => {
                if self.rx.is_empty() {
                    let _ = self.tx.try_send(Message::flusher());
                }
            }
        }
    }
}
