//! Worker loops and the send path, including synchronous splitter pumping.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use log::{debug, error};

use flowgraph_communication::{Channel, ChannelError, ChannelKind, Message, Value};

use super::Inner;
use crate::body::{Body, FuncFn, NodeSignal};

/// How a worker finished: returned on the join handle and routed by the
/// scheduler per the shutdown table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Returned or retired; nobody else is affected.
    Normal,
    /// Raised the runtime exit signal; the whole runtime winds down.
    Exit,
    /// Faulted; recorded and re-raised by the scheduler after join.
    Fault(String),
}

pub(crate) struct InputSlot {
    pub(crate) name: String,
    pub(crate) optional: bool,
    pub(crate) channel: Option<Arc<Channel>>,
}

/// The output side of one splitter node: forward one message, by value, to
/// every output channel.
///
/// Splitter nodes own no worker thread. They are bound to the runtime at
/// start and pumped synchronously by whoever writes into their input
/// channel, so a message is fanned out before the producer's send returns.
/// That keeps delivery deterministic even when the producer raises the
/// runtime exit signal immediately after sending.
#[derive(Debug)]
pub(crate) struct SplitterDrive {
    pub(crate) outputs: Vec<Arc<Channel>>,
}

impl SplitterDrive {
    /// Forwards everything pending on the splitter's input channel.
    fn pump(&self, input: &Channel, inner: &Inner) -> Result<(), ChannelError> {
        match input.kind() {
            // A populated constant channel reads the same value forever, so
            // pump exactly one copy per write.
            ChannelKind::Constant => {
                if let Ok(message) = input.read(false) {
                    self.forward(message, inner)?;
                }
            }
            ChannelKind::Standard => {
                while let Ok(message) = input.read(false) {
                    self.forward(message, inner)?;
                }
            }
        }
        Ok(())
    }

    fn forward(&self, message: Message, inner: &Inner) -> Result<(), ChannelError> {
        let clk = inner.next_clk();
        for channel in &self.outputs {
            channel.write(Message::new(message.payload.clone(), clk), true, None)?;
        }
        Ok(())
    }
}

/// One output channel of a node, together with the splitter it feeds, if
/// any.
#[derive(Clone, Debug)]
pub(crate) struct OutputBinding {
    pub(crate) channel: Arc<Channel>,
    pub(crate) splitter: Option<Arc<SplitterDrive>>,
}

impl OutputBinding {
    /// Writes into the channel and, when it feeds a splitter, fans the
    /// message out to the splitter's consumers before returning.
    pub(crate) fn write_and_pump(
        &self,
        message: Message,
        inner: &Inner,
    ) -> Result<(), ChannelError> {
        self.channel.write(message, true, None)?;
        if let Some(splitter) = &self.splitter {
            splitter.pump(&self.channel, inner)?;
        }
        Ok(())
    }
}

pub(crate) struct Worker {
    name: String,
    body: Body,
    inner: Arc<Inner>,
    ins: Vec<InputSlot>,
    outs: Vec<OutputBinding>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_owned()
    }
}

impl Worker {
    pub(crate) fn new(
        name: String,
        body: Body,
        inner: Arc<Inner>,
        ins: Vec<InputSlot>,
        outs: Vec<OutputBinding>,
    ) -> Worker {
        Worker { name, body, inner, ins, outs }
    }

    /// Runs the worker to completion and routes the outcome: an exit or a
    /// fault raises the stop signal and flushes every channel before the
    /// thread returns, so the coordinator and the other workers wake up.
    pub(crate) fn run(self) -> Termination {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute()));
        let termination = match outcome {
            Ok(termination) => termination,
            Err(payload) => Termination::Fault(panic_message(payload.as_ref())),
        };
        match &termination {
            Termination::Normal => debug!("worker `{}` finished", self.name),
            Termination::Exit => {
                debug!("worker `{}` raised the runtime exit signal", self.name);
                self.inner.initiate_shutdown();
            }
            Termination::Fault(message) => {
                error!("worker `{}` stopped: {}", self.name, message);
                self.inner.initiate_shutdown();
            }
        }
        termination
    }

    fn execute(&self) -> Termination {
        match &self.body {
            Body::Const(f) | Body::Func(f) => self.run_func(f),
            Body::Interactive(f) => {
                let mut handle = NodeHandle { worker: self };
                match f(&mut handle) {
                    Ok(()) => Termination::Normal,
                    Err(signal) => self.signal_termination(signal),
                }
            }
        }
    }

    fn signal_termination(&self, signal: NodeSignal) -> Termination {
        match signal {
            NodeSignal::RuntimeExit => Termination::Exit,
            NodeSignal::Retire => {
                debug!("worker `{}` retired", self.name);
                Termination::Normal
            }
            NodeSignal::Stopped => Termination::Normal,
            NodeSignal::Fault(message) => Termination::Fault(message),
        }
    }

    /// The read-eval-write loop.
    ///
    /// In-flight messages are never dropped by shutdown: once the stop flag
    /// is up the loop keeps consuming whatever is already queued, without
    /// blocking, and leaves when its inputs run dry. Until then a worker
    /// parked in `read` is released by the flusher sentinel or the poll
    /// timeout.
    fn run_func(&self, body: &Arc<FuncFn>) -> Termination {
        let blocking = self.ins.iter().any(|slot| slot.channel.is_some() && !slot.optional);
        let mut inputs = Vec::with_capacity(self.ins.len());
        loop {
            let draining = self.inner.stopped();
            if !blocking {
                if draining {
                    return Termination::Normal;
                }
                thread::yield_now();
            }
            inputs.clear();
            for slot in &self.ins {
                let message = match &slot.channel {
                    None => Message::absent(),
                    Some(channel) if slot.optional => channel.try_read_or_absent(),
                    Some(channel) => {
                        // Constant channels hold no backlog, only an
                        // ever-repeating value; they are dry by definition
                        // once teardown starts.
                        if draining && channel.kind() == ChannelKind::Constant {
                            return Termination::Normal;
                        }
                        match channel.read(!draining) {
                            Ok(message) => message,
                            Err(_) => return Termination::Normal,
                        }
                    }
                };
                if message.is_flush() {
                    return Termination::Normal;
                }
                inputs.push(message.payload.clone());
            }
            match body(&inputs) {
                Ok(Some(output)) => {
                    if self.send(output).is_err() {
                        return Termination::Normal;
                    }
                }
                Ok(None) => {}
                Err(signal) => return self.signal_termination(signal),
            }
        }
    }

    /// One logical send: a single clock stamp, written to every output
    /// channel. Fan-indexed channels project the payload themselves, and
    /// splitter-feeding channels are pumped before the send completes.
    fn send(&self, value: Value) -> Result<(), ChannelError> {
        let clk = self.inner.next_clk();
        for binding in &self.outs {
            binding.write_and_pump(Message::new(Some(value.clone()), clk), &self.inner)?;
        }
        Ok(())
    }
}

/// Handle passed to interactive bodies for explicit channel I/O.
///
/// `receive` and `send` translate one-to-one into channel reads and writes.
/// Both surface [`NodeSignal::Stopped`] once the runtime is shutting down;
/// bodies are expected to propagate it with `?`.
pub struct NodeHandle<'a> {
    worker: &'a Worker,
}

impl NodeHandle<'_> {
    pub fn name(&self) -> &str {
        &self.worker.name
    }

    /// Receives the next message on the named input port. Optional ports
    /// yield `None` immediately when nothing is pending.
    pub fn receive(&mut self, port: &str) -> Result<Option<Value>, NodeSignal> {
        let slot = self
            .worker
            .ins
            .iter()
            .find(|slot| slot.name == port)
            .ok_or_else(|| NodeSignal::fault(format!("no input port named `{}`", port)))?;
        let message = match &slot.channel {
            None => Message::absent(),
            Some(channel) if slot.optional => channel.try_read_or_absent(),
            Some(channel) => channel.read(true).map_err(|_| NodeSignal::Stopped)?,
        };
        if message.is_flush() {
            return Err(NodeSignal::Stopped);
        }
        Ok(message.payload)
    }

    /// Sends a value through every output channel of this node.
    pub fn send(&mut self, value: Value) -> Result<(), NodeSignal> {
        self.worker.send(value).map_err(|_| NodeSignal::Stopped)
    }
}
