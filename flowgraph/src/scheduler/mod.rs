//! The scheduler: channel construction, constant evaluation, worker
//! lifecycle, shutdown signalling, and fault routing.

pub mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use flowgraph_communication::{
    Channel, Message, MessageLog, MessageRecord, NodeId, PortName, StopSignal, Value,
};

use self::worker::{InputSlot, OutputBinding, SplitterDrive, Termination, Worker};
use crate::body::{Body, NodeSignal};
use crate::config::Config;
use crate::error::RuntimeError;
use crate::graph::{Graph, NodeKind};

/// State shared between the coordinator and every worker thread.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) msg_log: Arc<MessageLog>,
    clock: AtomicI64,
    channels: Vec<Arc<Channel>>,
}

impl Inner {
    /// Stamps one send. Assigned once per send and never rewritten.
    pub(crate) fn next_clk(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.is_set()
    }

    /// Raises the stop signal and flushes every channel so producers blocked
    /// on `write` and consumers blocked on `read` wake up.
    pub(crate) fn initiate_shutdown(&self) {
        if !self.stop.is_set() {
            self.stop.set();
            for channel in &self.channels {
                channel.flush();
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ready,
    Running,
    Stopped,
}

#[derive(Debug)]
struct WorkerHandle {
    name: String,
    handle: thread::JoinHandle<Termination>,
}

/// Executes a dataflow graph: one worker thread per long-lived node, with
/// constant nodes evaluated once at start and their output streamed from
/// write-once channels, and splitter nodes pumped synchronously by their
/// producers.
///
/// Construction runs splitter insertion, validation, and channel layout; a
/// scheduler that constructs successfully is ready to `start`. Teardown is
/// driven by a single-shot stop signal raised by the first worker to exit
/// the runtime or fault, or by the `run` timeout.
#[derive(Debug)]
pub struct Scheduler {
    graph: Graph,
    config: Config,
    inner: Arc<Inner>,
    ins: Vec<Vec<Option<Arc<Channel>>>>,
    outs: Vec<Vec<Option<Arc<Channel>>>>,
    bindings: Vec<Vec<Option<OutputBinding>>>,
    workers: Vec<WorkerHandle>,
    state: State,
}

impl Scheduler {
    pub fn new(mut graph: Graph, config: Config) -> Result<Scheduler, RuntimeError> {
        if let Some(interval) = config.thread_switch_interval {
            // Meaningful only on hosts that time-slice workers cooperatively.
            debug!("thread switch interval {:?} requested; host threads are preemptive", interval);
        }

        graph.do_automatic_splitting();
        graph.check()?;

        let stop = Arc::new(StopSignal::new());
        let msg_log = Arc::new(MessageLog::new(config.msg_log_level));

        let mut ins: Vec<Vec<Option<Arc<Channel>>>> =
            graph.nodes().iter().map(|n| vec![None; n.in_ports().len()]).collect();
        let mut outs: Vec<Vec<Option<Arc<Channel>>>> =
            graph.nodes().iter().map(|n| vec![None; n.out_ports().len()]).collect();
        let mut channels = Vec::new();

        for src in 0..graph.nodes().len() {
            for port in 0..graph.node(src).out_ports().len() {
                match make_channel(&graph, src, port, &config, &stop, &msg_log) {
                    Some(channel) => {
                        info!("creating channel {} to {}", channel.src(), channel.dst());
                        let channel = Arc::new(channel);
                        let dest = graph.node(src).out_ports()[port].dest;
                        outs[src][port] = Some(Arc::clone(&channel));
                        ins[dest.node][dest.port] = Some(Arc::clone(&channel));
                        channels.push(channel);
                    }
                    None => {
                        let dest = graph.node(src).out_ports()[port].dest;
                        info!(
                            "constant wiring {} to {} carries no channel",
                            graph.node(src).name(),
                            graph.node(dest.node).name()
                        );
                    }
                }
            }
        }

        // One drive per splitter node, shared by whoever writes into it.
        let drives: Vec<Option<Arc<SplitterDrive>>> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(id, node)| {
                (node.kind() == NodeKind::Splitter).then(|| {
                    Arc::new(SplitterDrive {
                        outputs: outs[id].iter().flatten().cloned().collect(),
                    })
                })
            })
            .collect();

        let bindings: Vec<Vec<Option<OutputBinding>>> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(id, node)| {
                node.out_ports()
                    .iter()
                    .enumerate()
                    .map(|(port, out)| {
                        outs[id][port].as_ref().map(|channel| OutputBinding {
                            channel: Arc::clone(channel),
                            splitter: drives[out.dest.node].clone(),
                        })
                    })
                    .collect()
            })
            .collect();

        let inner = Arc::new(Inner { stop, msg_log, clock: AtomicI64::new(0), channels });
        Ok(Scheduler {
            graph,
            config,
            inner,
            ins,
            outs,
            bindings,
            workers: Vec::new(),
            state: State::Ready,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The channels fed by the given node's output ports.
    pub fn out_channels(&self, node: NodeId) -> Vec<Arc<Channel>> {
        self.outs[node].iter().flatten().cloned().collect()
    }

    /// All delivery records collected so far, ordered by logical clock.
    pub fn message_records(&self) -> Vec<MessageRecord> {
        self.inner.msg_log.ordered()
    }

    /// Evaluates needed constant nodes, binds splitters to the runtime, and
    /// spawns one worker per long-lived node. Fails without spawning
    /// anything if the graph has no worker to run or a constant node faults.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.state != State::Ready {
            return Err(RuntimeError::AlreadyRunning);
        }
        self.state = State::Running;

        // Constant nodes run now, but only if their output eventually
        // reaches a worker or a splitter. Writing into a splitter-feeding
        // channel pumps the splitter, so constant fan-out is materialized
        // here as well.
        let mut memo: HashMap<NodeId, Option<Value>> = HashMap::new();
        for id in 0..self.graph.nodes().len() {
            if self.graph.runs_once(id) && self.graph.reaches_running_node(id) {
                self.evaluate_constant(id, &mut memo)?;
            }
        }

        // Plan all workers before spawning the first one so a constant-only
        // graph is rejected with no thread started. Splitter nodes own no
        // worker; their drives were bound during construction.
        let mut planned = Vec::new();
        for (id, node) in self.graph.nodes().iter().enumerate() {
            if self.graph.runs_once(id) {
                continue;
            }
            match node.kind() {
                NodeKind::Splitter => debug!("splitter `{}` bound to the runtime", node.name()),
                _ => match node.body() {
                    Some(body) => planned.push((id, body.clone())),
                    None => {
                        return Err(RuntimeError::Config(format!(
                            "node `{}` has no body",
                            node.name()
                        )))
                    }
                },
            }
        }
        if planned.is_empty() {
            return Err(RuntimeError::Config(
                "graph cannot consist of only constant nodes".into(),
            ));
        }

        for (id, body) in planned {
            let node = self.graph.node(id);
            debug!("starting node `{}`", node.name());
            let slots = node
                .in_ports()
                .iter()
                .enumerate()
                .map(|(port, spec)| InputSlot {
                    name: spec.name.clone(),
                    optional: spec.optional,
                    channel: self.ins[id][port].clone(),
                })
                .collect();
            let outs = self.bindings[id].iter().flatten().cloned().collect();
            let worker =
                Worker::new(node.name().to_owned(), body, Arc::clone(&self.inner), slots, outs);
            let spawned = thread::Builder::new()
                .name(format!("flowgraph:{}", node.name()))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => {
                    self.workers.push(WorkerHandle { name: node.name().to_owned(), handle })
                }
                Err(err) => {
                    self.inner.initiate_shutdown();
                    self.join_workers();
                    return Err(err.into());
                }
            }
        }

        // The coordinator itself counts as one more thread.
        info!("total number of threads = {}", self.workers.len() + 1);
        Ok(())
    }

    /// Runs the simulation until a node raises the runtime exit signal, a
    /// worker faults, or `timeout` elapses (treated as normal completion).
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<(), RuntimeError> {
        self.start()?;
        self.inner.stop.wait(timeout);
        self.stop()
    }

    /// Signals shutdown, joins every worker, emits the message log, and
    /// re-raises the first recorded worker fault.
    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        self.inner.initiate_shutdown();
        let fault = self.join_workers();
        self.state = State::Stopped;
        self.inner.msg_log.emit();
        match fault {
            Some((node, message)) => {
                Err(RuntimeError::Worker { node, source: NodeSignal::Fault(message) })
            }
            None => Ok(()),
        }
    }

    fn join_workers(&mut self) -> Option<(String, String)> {
        let mut fault = None;
        for worker in self.workers.drain(..) {
            match worker.handle.join() {
                Ok(Termination::Fault(message)) if fault.is_none() => {
                    fault = Some((worker.name, message));
                }
                Ok(_) => {}
                Err(_) if fault.is_none() => {
                    fault = Some((worker.name, "worker panicked".to_owned()));
                }
                Err(_) => {}
            }
        }
        fault
    }

    /// Evaluates one constant node, memoised, pulling inputs directly from
    /// upstream constant nodes and pushing the result into each outgoing
    /// channel.
    fn evaluate_constant(
        &self,
        id: NodeId,
        memo: &mut HashMap<NodeId, Option<Value>>,
    ) -> Result<Option<Value>, RuntimeError> {
        if let Some(value) = memo.get(&id) {
            return Ok(value.clone());
        }
        let node = self.graph.node(id);
        let mut inputs = Vec::with_capacity(node.in_ports().len());
        for port in 0..node.in_ports().len() {
            let value = match self.graph.producer_of(id, port) {
                None => None,
                Some((producer, out)) => {
                    let fan_index = out.fan_index.clone();
                    let value = self.evaluate_constant(producer, memo)?;
                    match fan_index {
                        Some(field) => value.and_then(|v| v.field(&field).cloned()),
                        None => value,
                    }
                }
            };
            inputs.push(value);
        }
        let body = match node.body() {
            Some(Body::Const(f)) => Arc::clone(f),
            _ => {
                return Err(RuntimeError::Config(format!(
                    "node `{}` cannot be evaluated at program start",
                    node.name()
                )))
            }
        };
        let output = body(&inputs).map_err(|signal| match signal {
            NodeSignal::RuntimeExit => RuntimeError::Config(format!(
                "constant node `{}` cannot raise the runtime exit signal",
                node.name()
            )),
            other => RuntimeError::ConstantNode { node: node.name().to_owned(), source: other },
        })?;
        memo.insert(id, output.clone());

        let clk = self.inner.next_clk();
        for binding in self.bindings[id].iter().flatten() {
            binding
                .write_and_pump(Message::new(output.clone(), clk), &self.inner)
                .map_err(|err| {
                    RuntimeError::Config(format!("constant node `{}`: {}", node.name(), err))
                })?;
        }
        Ok(output)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.inner.initiate_shutdown();
            self.join_workers();
        }
    }
}

/// Selects the channel variant for one output port.
///
/// Constant-to-constant wiring carries no channel at all; the consumer pulls
/// the producer's cached value by direct call at start. A constant producer
/// feeding anything else gets a write-once constant channel. Everything else
/// gets a standard bounded FIFO whose capacity combines the consumer's hint
/// with the global default.
fn make_channel(
    graph: &Graph,
    src: NodeId,
    port: usize,
    config: &Config,
    stop: &Arc<StopSignal>,
    log: &Arc<MessageLog>,
) -> Option<Channel> {
    let out = &graph.node(src).out_ports()[port];
    let src_once = graph.runs_once(src);
    if src_once && graph.runs_once(out.dest.node) {
        return None;
    }

    let dst_node = graph.node(out.dest.node);
    let dst_port = &dst_node.in_ports()[out.dest.port];
    let mut src_name = PortName::new(graph.node(src).name(), "out");
    if let Some(fan_index) = &out.fan_index {
        src_name = src_name.with_fan_index(fan_index.clone());
    }
    let dst_name = PortName::new(dst_node.name(), dst_port.name.clone());

    if src_once {
        return Some(Channel::constant(
            src_name,
            dst_name,
            dst_port.optional,
            config.poll_interval,
            Arc::clone(stop),
            Some(Arc::clone(log)),
        ));
    }

    let capacity = if dst_port.size > 0 && config.capacity > 0 {
        dst_port.size.min(config.capacity)
    } else {
        dst_port.size.max(config.capacity)
    };
    let channel = if graph.node(src).kind() == NodeKind::Splitter {
        Channel::splitter_fed(
            src_name,
            dst_name,
            dst_port.optional,
            capacity,
            config.poll_interval,
            Arc::clone(stop),
            Some(Arc::clone(log)),
        )
    } else {
        Channel::standard(
            src_name,
            dst_name,
            dst_port.optional,
            capacity,
            config.poll_interval,
            Arc::clone(stop),
            Some(Arc::clone(log)),
        )
    };
    Some(channel)
}
