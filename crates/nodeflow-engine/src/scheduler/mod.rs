//! The scheduler: node lifecycle state machine for one run
//!
//! Every activation (a push of values, or a pull with none) runs as its own
//! task on a [`TaskTracker`]. The run's mutable state sits behind one mutex
//! that is only held in synchronous sections, so an activation decides what
//! to do under the lock and then awaits outside it:
//!
//! - an idle or errored node ignores pulls,
//! - a PENDING node is armed, which may pull its upstream dependencies,
//! - a node whose wait set empties executes, then fans its outputs out,
//! - pushes that reach an EXECUTING node are queued and replayed one at a
//!   time, in arrival order, after it finishes. Later pushes join the queue
//!   while it is non-empty.
//!
//! Activations race the run's [`CancellationToken`]; cancelling abandons
//! them at their next await point.

mod fanout;
mod inputs;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{EngineError, Result};
use crate::events::{emit, MessageKind, WorkflowEvent};
use crate::graph::WorkflowGraph;
use crate::node::{ExecutionContext, NodeInputs, Output, RunServices};
use crate::registry::NodeRegistry;
use crate::run_context::{
    instantiate, NodeInstance, NodeRunState, NodeSnapshot, NodeSpec, PushedInput, RunContext, RunLayout,
};
use crate::types::NodeId;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No activation left in flight
    Finished,
    /// Cancelled before it drained
    Stopped,
}

/// Executes one instantiated graph
///
/// Cheap to clone; clones drive the same run.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    run_id: String,
    layout: RunLayout,
    context: Mutex<RunContext>,
    services: RunServices,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// Decision taken by an activation under the lock
enum Step {
    Idle,
    /// Nothing left to replay
    Drained,
    Pull(Vec<NodeId>),
    Execute(ExecutionPlan),
}

/// What an activation brings to a node
enum Entry {
    /// Fresh values (empty for a pull)
    Push(Vec<PushedInput>),
    /// The oldest push queued while the node executed
    Replay,
}

struct ExecutionPlan {
    instance: NodeInstance,
    inputs: NodeInputs,
}

impl Scheduler {
    /// Instantiate every node of `graph` for a new run.
    ///
    /// Fails without executing anything when a node type is unknown or a
    /// node's `load` fails.
    pub fn new(
        run_id: impl Into<String>,
        graph: &WorkflowGraph,
        registry: &NodeRegistry,
        services: RunServices,
    ) -> Result<Self> {
        let run_id = run_id.into();
        let (layout, context) = instantiate(&run_id, graph, registry)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                run_id,
                layout,
                context: Mutex::new(context),
                services,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.inner.layout.node(node_id).is_some()
    }

    /// Write into a node's memory before it executes
    pub fn seed_memory(&self, node_id: &str, key: impl Into<String>, value: Value) -> Result<()> {
        let mut context = self.inner.context.lock();
        let slot = context
            .slots
            .get_mut(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        match slot.instance.as_mut() {
            Some(instance) => {
                instance.memory.insert(key.into(), value);
                Ok(())
            }
            None => Err(EngineError::failed(format!(
                "Cannot seed memory of node {} while it executes",
                node_id
            ))),
        }
    }

    /// Activate the start node without waiting for the run to drain
    pub fn start(&self, start_node_id: &str) -> Result<()> {
        if !self.contains_node(start_node_id) {
            return Err(EngineError::StartNodeNotFound(start_node_id.to_string()));
        }
        log::info!("Run {}: starting at node {}", self.inner.run_id, start_node_id);
        self.inner.spawn_activation(start_node_id.to_string(), Vec::new());
        Ok(())
    }

    /// Push values into a node's inputs from outside the graph
    pub fn push<I, K>(&self, node_id: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        if !self.contains_node(node_id) {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }
        let pushed = values
            .into_iter()
            .map(|(input, value)| PushedInput::new(input, value))
            .collect();
        self.inner.spawn_activation(node_id.to_string(), pushed);
        Ok(())
    }

    /// Activate `start_node_id` and wait until no activation is in flight
    pub async fn run(&self, start_node_id: &str) -> Result<RunStatus> {
        self.start(start_node_id)?;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        Ok(self.status())
    }

    /// Wait until every in-flight activation has finished
    pub async fn wait_idle(&self) -> RunStatus {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
        self.status()
    }

    fn status(&self) -> RunStatus {
        if self.inner.cancel.is_cancelled() {
            RunStatus::Stopped
        } else {
            RunStatus::Finished
        }
    }

    /// Cancel every activation of this run
    pub fn cancel(&self) {
        if !self.inner.cancel.is_cancelled() {
            log::info!("Run {}: cancelling", self.inner.run_id);
        }
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel and wait up to `grace` for activations to unwind.
    ///
    /// Returns false when some activation was still running at the deadline.
    pub async fn stop(&self, grace: Duration) -> bool {
        self.cancel();
        self.inner.tracker.close();
        let drained = tokio::time::timeout(grace, self.inner.tracker.wait()).await.is_ok();
        if !drained {
            log::warn!(
                "Run {}: {} activation(s) still running after {:?}",
                self.inner.run_id,
                self.inner.tracker.len(),
                grace
            );
        }
        drained
    }

    /// Number of activations currently in flight
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn node_snapshot(&self, node_id: &str) -> Option<NodeSnapshot> {
        self.inner.context.lock().slots.get(node_id).map(|slot| slot.snapshot())
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeRunState> {
        self.inner.context.lock().slots.get(node_id).map(|slot| slot.state)
    }

    pub fn waiting_on(&self, node_id: &str) -> Option<Vec<String>> {
        self.inner
            .context
            .lock()
            .slots
            .get(node_id)
            .map(|slot| slot.waiting_on.clone())
    }

    /// Outputs of the node's most recent successful execution
    pub fn outputs(&self, node_id: &str) -> Option<Vec<Output>> {
        self.inner
            .context
            .lock()
            .slots
            .get(node_id)
            .and_then(|slot| slot.outputs.clone())
    }

    pub fn execution_count(&self, node_id: &str) -> u32 {
        self.inner
            .context
            .lock()
            .slots
            .get(node_id)
            .map_or(0, |slot| slot.executions)
    }

    /// Ids of nodes in ERROR, sorted
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        let context = self.inner.context.lock();
        let mut failed: Vec<NodeId> = context
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == NodeRunState::Error)
            .map(|(id, _)| id.clone())
            .collect();
        failed.sort();
        failed
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("run_id", &self.inner.run_id)
            .field("in_flight", &self.inner.tracker.len())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl SchedulerInner {
    fn spawn_activation(self: &Arc<Self>, node_id: NodeId, pushed: Vec<PushedInput>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let token = self.cancel.clone();
        self.tracker.spawn(async move {
            let label = node_id.clone();
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("Run {}: activation of node {} cancelled", inner.run_id, label);
                }
                _ = Arc::clone(&inner).activate(node_id, pushed) => {}
            }
        })
    }

    /// One activation of `node_id`; boxed because activations recurse through fan-out.
    fn activate(self: Arc<Self>, node_id: NodeId, pushed: Vec<PushedInput>) -> BoxFuture<'static, ()> {
        async move {
            let Some(spec) = self.layout.node(&node_id).cloned() else {
                log::warn!("Run {}: activation of unknown node {}", self.run_id, node_id);
                return;
            };
            self.proceed(spec, Entry::Push(pushed)).await;
        }
        .boxed()
    }

    /// Replays queued pushes one by one until the queue is empty.
    fn drain(self: Arc<Self>, spec: Arc<NodeSpec>) -> BoxFuture<'static, ()> {
        async move {
            while !self.cancel.is_cancelled() {
                log::debug!("Run {}: replaying queued push into node {}", self.run_id, spec.id);
                if !self.proceed(Arc::clone(&spec), Entry::Replay).await {
                    break;
                }
            }
        }
        .boxed()
    }

    /// Runs one step of an activation; false once the replay queue is empty.
    async fn proceed(self: &Arc<Self>, spec: Arc<NodeSpec>, entry: Entry) -> bool {
        let node_id = spec.id.clone();
        match self.enter(&spec, entry) {
            Step::Drained => return false,
            Step::Idle => {}
            Step::Pull(sources) => {
                log::debug!("Run {}: node {} pulls {:?}", self.run_id, node_id, sources);
                let handles: Vec<_> = sources
                    .into_iter()
                    .map(|source| self.spawn_activation(source, Vec::new()))
                    .collect();
                self.join(handles).await;
            }
            Step::Execute(plan) => self.execute(spec, plan).await,
        }
        true
    }

    /// The synchronous part of an activation.
    fn enter(&self, spec: &NodeSpec, entry: Entry) -> Step {
        let mut events = Vec::new();
        let step = {
            let mut context = self.context.lock();
            let Some(slot) = context.slots.get_mut(&spec.id) else {
                return Step::Idle;
            };

            let pushed = match entry {
                Entry::Replay => match slot.deferred.pop_front() {
                    Some(pushed) => pushed,
                    None => return Step::Drained,
                },
                Entry::Push(pushed) if !pushed.is_empty() && !slot.deferred.is_empty() => {
                    slot.deferred.push_back(pushed);
                    return Step::Idle;
                }
                Entry::Push(pushed) => pushed,
            };

            match slot.state {
                NodeRunState::Error => {
                    log::debug!("Run {}: node {} is in error, ignoring activation", self.run_id, spec.id);
                    return Step::Idle;
                }
                NodeRunState::Executing => {
                    if !pushed.is_empty() {
                        slot.deferred.push_back(pushed);
                    }
                    return Step::Idle;
                }
                NodeRunState::Done if pushed.is_empty() => return Step::Idle,
                NodeRunState::Done => slot.state = NodeRunState::Pending,
                NodeRunState::Pending | NodeRunState::Waiting => {}
            }

            let mut pulls = Vec::new();
            if slot.state == NodeRunState::Pending {
                let activating: Vec<&str> = pushed.iter().map(|p| p.input.as_str()).collect();
                pulls = slot.arm(spec, &self.run_id, &activating);
                events.push(WorkflowEvent::NodePreparing {
                    run_id: self.run_id.clone(),
                    node_id: spec.id.clone(),
                    node_type: spec.node_type.clone(),
                });
            }
            slot.merge(pushed, &self.run_id);

            if slot.is_ready() {
                slot.state = NodeRunState::Executing;
                match slot.instance.take() {
                    Some(instance) => Step::Execute(ExecutionPlan {
                        instance,
                        inputs: inputs::group_inputs(&spec.descriptor, &slot.inputs),
                    }),
                    None => {
                        log::error!("Run {}: node {} has no instance to execute", self.run_id, spec.id);
                        slot.state = NodeRunState::Error;
                        Step::Idle
                    }
                }
            } else {
                if self.services.config.emit_waiting_events {
                    events.push(WorkflowEvent::NodeWaiting {
                        run_id: self.run_id.clone(),
                        node_id: spec.id.clone(),
                        waiting_on: slot.waiting_on.clone(),
                    });
                }
                if pulls.is_empty() {
                    Step::Idle
                } else {
                    Step::Pull(pulls)
                }
            }
        };

        for event in events {
            emit(self.services.sink.as_ref(), event);
        }
        step
    }

    async fn execute(self: &Arc<Self>, spec: Arc<NodeSpec>, plan: ExecutionPlan) {
        let ExecutionPlan { mut instance, inputs } = plan;
        let node_id = spec.id.as_str();

        emit(
            self.services.sink.as_ref(),
            WorkflowEvent::NodeExecuting {
                run_id: self.run_id.clone(),
                node_id: node_id.to_string(),
                node_type: spec.node_type.clone(),
            },
        );
        if self.services.config.log_node_inputs {
            log::debug!(
                "Run {}: executing {} ({}) with {:?}",
                self.run_id,
                node_id,
                spec.node_type,
                inputs
            );
        }

        let result = {
            let NodeInstance { node, memory } = &mut instance;
            let mut ctx = ExecutionContext::new(
                node_id,
                &self.run_id,
                &spec.node_type,
                &spec.widgets,
                memory,
                &self.services,
            );
            AssertUnwindSafe(node.execute(inputs, &mut ctx)).catch_unwind().await
        };
        let result = result.unwrap_or_else(|panic| {
            Err(EngineError::failed(format!(
                "Node panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        let (outcome, deferred) = {
            let mut context = self.context.lock();
            let Some(slot) = context.slots.get_mut(node_id) else {
                return;
            };
            slot.instance = Some(instance);
            match result {
                Ok(result) => {
                    slot.state = NodeRunState::Done;
                    slot.executions += 1;
                    if let Some(update) = result.state_update {
                        slot.template = Some(update.into());
                    }
                    slot.outputs = Some(result.outputs.clone());
                    (Ok(result.outputs), !slot.deferred.is_empty())
                }
                Err(e) => {
                    slot.state = NodeRunState::Error;
                    slot.deferred.clear();
                    (Err(e), false)
                }
            }
        };

        match outcome {
            Ok(outputs) => {
                emit(
                    self.services.sink.as_ref(),
                    WorkflowEvent::NodeCompleted {
                        run_id: self.run_id.clone(),
                        node_id: node_id.to_string(),
                        outputs: outputs.iter().map(Output::to_report).collect(),
                    },
                );
                self.fan_out(&spec, &outputs).await;
            }
            Err(e) => {
                log::error!("Run {}: node {} ({}) failed: {}", self.run_id, node_id, spec.node_type, e);
                emit(
                    self.services.sink.as_ref(),
                    WorkflowEvent::node_failed(&self.run_id, node_id, &spec.node_type, &e),
                );
            }
        }

        if deferred {
            Arc::clone(self).drain(spec).await;
        }
    }

    async fn fan_out(self: &Arc<Self>, spec: &NodeSpec, outputs: &[Output]) {
        let routing = fanout::route_outputs(&self.layout, spec, outputs);
        for warning in routing.warnings {
            log::warn!("Run {}: {}", self.run_id, warning);
            emit(
                self.services.sink.as_ref(),
                WorkflowEvent::node_message(
                    &self.run_id,
                    &spec.id,
                    &spec.node_type,
                    MessageKind::Warning,
                    Value::String(warning),
                ),
            );
        }

        let handles: Vec<_> = routing
            .batches
            .into_iter()
            .map(|batch| self.spawn_activation(batch.target, batch.inputs))
            .collect();
        self.join(handles).await;
    }

    async fn join(&self, handles: Vec<JoinHandle<()>>) {
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                if e.is_panic() {
                    log::error!("Run {}: activation task panicked: {}", self.run_id, e);
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::EventBroker;
    use crate::config::EngineConfig;
    use crate::descriptor::{NodeDescriptor, SocketDescriptor, WidgetDescriptor};
    use crate::events::VecEventSink;
    use crate::graph::{GraphLink, GraphNode};
    use crate::node::{ExecutionResult, Node};
    use crate::types::{NodeCategory, SocketType};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Constant;

    #[async_trait]
    impl Node for Constant {
        async fn execute(
            &mut self,
            _inputs: NodeInputs,
            ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            let value = ctx.widgets().get("value").cloned().unwrap_or(Value::Null);
            Ok(ExecutionResult::new(vec![Output::Value(value)]))
        }
    }

    struct Sum;

    #[async_trait]
    impl Node for Sum {
        async fn execute(
            &mut self,
            inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            let total = inputs.require_number("a")? + inputs.require_number("b")?;
            Ok(ExecutionResult::new(vec![Output::Value(json!(total))]))
        }
    }

    /// Records every value it receives
    struct Collect {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Node for Collect {
        async fn execute(
            &mut self,
            inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            self.seen.lock().push(inputs.get("value").cloned().unwrap_or(Value::Null));
            Ok(ExecutionResult::empty())
        }
    }

    struct Failing;

    #[async_trait]
    impl Node for Failing {
        async fn execute(
            &mut self,
            _inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            Err(EngineError::failed("refused"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Node for Panicking {
        async fn execute(
            &mut self,
            _inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            panic!("boom");
        }
    }

    /// Sleeps, tracking how many executions overlap
    struct Slow {
        delay: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Node for Slow {
        async fn execute(
            &mut self,
            inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let value = inputs.get("value").cloned().unwrap_or(Value::Null);
            Ok(ExecutionResult::new(vec![Output::Value(value)]))
        }
    }

    /// Sleeps for its `delay_ms` widget, logging each value it executes with
    struct Tracked {
        order: Arc<Mutex<Vec<(String, Value)>>>,
    }

    #[async_trait]
    impl Node for Tracked {
        async fn execute(
            &mut self,
            inputs: NodeInputs,
            ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            let value = inputs.get("value").cloned().unwrap_or(Value::Null);
            self.order.lock().push((ctx.node_id().to_string(), value.clone()));
            let delay = ctx.widgets().number("delay_ms").unwrap_or(0.0);
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            Ok(ExecutionResult::new(vec![Output::Value(value)]))
        }
    }

    struct Harness {
        registry: NodeRegistry,
        seen: Arc<Mutex<Vec<Value>>>,
        order: Arc<Mutex<Vec<(String, Value)>>>,
        sources: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    /// Counts its own executions, emitting a constant
    struct Counted {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Node for Counted {
        async fn execute(
            &mut self,
            _inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult::new(vec![Output::Value(json!(1))]))
        }
    }

    fn harness(slow_delay: Duration) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sources = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = NodeRegistry::new();

        registry.register(
            NodeDescriptor::new("Constant", NodeCategory::Input, "Constant")
                .output(SocketDescriptor::new("out", SocketType::Any))
                .widget(WidgetDescriptor::number("value", 0.0)),
            || -> Box<dyn Node> { Box::new(Constant) },
        );
        registry.register(
            NodeDescriptor::new("Sum", NodeCategory::Math, "Sum")
                .input(SocketDescriptor::new("a", SocketType::Number).dependency())
                .input(SocketDescriptor::new("b", SocketType::Number).dependency())
                .output(SocketDescriptor::new("out", SocketType::Number)),
            || -> Box<dyn Node> { Box::new(Sum) },
        );
        let collect_seen = Arc::clone(&seen);
        registry.register(
            NodeDescriptor::new("Collect", NodeCategory::Output, "Collect")
                .input(SocketDescriptor::new("value", SocketType::Any)),
            move || -> Box<dyn Node> {
                Box::new(Collect {
                    seen: Arc::clone(&collect_seen),
                })
            },
        );
        registry.register(
            NodeDescriptor::new("Failing", NodeCategory::Testing, "Failing")
                .input(SocketDescriptor::new("value", SocketType::Any))
                .output(SocketDescriptor::new("out", SocketType::Any)),
            || -> Box<dyn Node> { Box::new(Failing) },
        );
        registry.register(
            NodeDescriptor::new("Panicking", NodeCategory::Testing, "Panicking")
                .input(SocketDescriptor::new("value", SocketType::Any)),
            || -> Box<dyn Node> { Box::new(Panicking) },
        );
        let slow_peak = Arc::clone(&peak);
        registry.register(
            NodeDescriptor::new("Slow", NodeCategory::Control, "Slow")
                .input(SocketDescriptor::new("value", SocketType::Any))
                .output(SocketDescriptor::new("out", SocketType::Any)),
            move || -> Box<dyn Node> {
                Box::new(Slow {
                    delay: slow_delay,
                    active: Arc::clone(&active),
                    peak: Arc::clone(&slow_peak),
                })
            },
        );
        let counted = Arc::clone(&sources);
        registry.register(
            NodeDescriptor::new("Counted", NodeCategory::Input, "Counted")
                .output(SocketDescriptor::new("out", SocketType::Any)),
            move || -> Box<dyn Node> {
                Box::new(Counted {
                    count: Arc::clone(&counted),
                })
            },
        );

        let tracked = Arc::clone(&order);
        registry.register(
            NodeDescriptor::new("Tracked", NodeCategory::Control, "Tracked")
                .input(SocketDescriptor::new("value", SocketType::Any))
                .output(SocketDescriptor::new("out", SocketType::Any))
                .widget(WidgetDescriptor::number("delay_ms", 0.0)),
            move || -> Box<dyn Node> {
                Box::new(Tracked {
                    order: Arc::clone(&tracked),
                })
            },
        );

        Harness {
            registry,
            seen,
            order,
            sources,
            peak,
        }
    }

    fn scheduler(graph: &WorkflowGraph, harness: &Harness) -> (Scheduler, Arc<VecEventSink>) {
        let sink = Arc::new(VecEventSink::new());
        let services = RunServices::new(
            Arc::new(EventBroker::new()),
            sink.clone(),
            Arc::new(EngineConfig::default()),
        );
        let scheduler = Scheduler::new("run_test", graph, &harness.registry, services).unwrap();
        (scheduler, sink)
    }

    fn sum_graph() -> WorkflowGraph {
        WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Constant").with_outputs(&["out"]).with_widgets(vec![json!(5)]),
                GraphNode::new("2", "Constant").with_outputs(&["out"]).with_widgets(vec![json!(7)]),
                GraphNode::new("3", "Sum").with_inputs(&["a", "b"]).with_outputs(&["out"]),
                GraphNode::new("4", "Collect").with_inputs(&["value"]),
            ],
            links: vec![
                GraphLink::new(1, "1", 0, "3", 0),
                GraphLink::new(2, "2", 0, "3", 1),
                GraphLink::new(3, "3", 0, "4", 0),
            ],
        }
    }

    #[tokio::test]
    async fn test_start_on_consumer_pulls_dependencies() {
        let harness = harness(Duration::ZERO);
        let (scheduler, sink) = scheduler(&sum_graph(), &harness);

        let status = scheduler.run("3").await.unwrap();
        assert_eq!(status, RunStatus::Finished);
        assert_eq!(*harness.seen.lock(), vec![json!(12.0)]);
        assert_eq!(scheduler.execution_count("3"), 1);
        assert_eq!(scheduler.node_state("4"), Some(NodeRunState::Done));
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodePreparing { node_id, .. } if node_id == "3")));
    }

    #[tokio::test]
    async fn test_start_on_producer_pushes_downstream() {
        let harness = harness(Duration::ZERO);
        let (scheduler, _) = scheduler(&sum_graph(), &harness);

        // Sum is armed by the push on `a` and pulls only `b`
        scheduler.run("1").await.unwrap();
        assert_eq!(*harness.seen.lock(), vec![json!(12.0)]);
        assert_eq!(scheduler.execution_count("1"), 1);
        assert_eq!(scheduler.execution_count("2"), 1);
    }

    #[tokio::test]
    async fn test_unknown_start_node() {
        let harness = harness(Duration::ZERO);
        let (scheduler, _) = scheduler(&sum_graph(), &harness);
        let err = scheduler.run("99").await.unwrap_err();
        assert!(matches!(err, EngineError::StartNodeNotFound(ref id) if id == "99"));
    }

    #[tokio::test]
    async fn test_shared_upstream_executes_once() {
        let harness = harness(Duration::ZERO);
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Counted").with_outputs(&["out"]),
                GraphNode::new("2", "Sum").with_inputs(&["a", "b"]).with_outputs(&["out"]),
            ],
            links: vec![GraphLink::new(1, "1", 0, "2", 0), GraphLink::new(2, "1", 0, "2", 1)],
        };
        let (scheduler, _) = scheduler(&graph, &harness);

        scheduler.run("2").await.unwrap();
        assert_eq!(harness.sources.load(Ordering::SeqCst), 1);
        assert_eq!(
            scheduler.outputs("2"),
            Some(vec![Output::Value(json!(2.0))])
        );
    }

    #[tokio::test]
    async fn test_node_error_does_not_abort_run() {
        let harness = harness(Duration::ZERO);
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Constant").with_outputs(&["out"]).with_widgets(vec![json!(3)]),
                GraphNode::new("2", "Failing").with_inputs(&["value"]).with_outputs(&["out"]),
                GraphNode::new("3", "Collect").with_inputs(&["value"]),
                GraphNode::new("4", "Collect").with_inputs(&["value"]),
            ],
            links: vec![
                GraphLink::new(1, "1", 0, "2", 0),
                GraphLink::new(2, "1", 0, "3", 0),
                GraphLink::new(3, "2", 0, "4", 0),
            ],
        };
        let (scheduler, sink) = scheduler(&graph, &harness);

        let status = scheduler.run("1").await.unwrap();
        assert_eq!(status, RunStatus::Finished);
        assert_eq!(scheduler.failed_nodes(), vec!["2".to_string()]);
        assert_eq!(*harness.seen.lock(), vec![json!(3)]);
        assert_eq!(scheduler.node_state("4"), Some(NodeRunState::Pending));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            WorkflowEvent::NodeFailed { node_id, error, .. } if node_id == "2" && error.contains("refused")
        )));

        // an errored node ignores further activations
        scheduler.push("2", [("value", json!(1))]).unwrap();
        scheduler.wait_idle().await;
        assert_eq!(scheduler.node_state("2"), Some(NodeRunState::Error));
    }

    #[tokio::test]
    async fn test_panic_becomes_node_error() {
        let harness = harness(Duration::ZERO);
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Constant").with_outputs(&["out"]),
                GraphNode::new("2", "Panicking").with_inputs(&["value"]),
            ],
            links: vec![GraphLink::new(1, "1", 0, "2", 0)],
        };
        let (scheduler, sink) = scheduler(&graph, &harness);

        scheduler.run("1").await.unwrap();
        assert_eq!(scheduler.node_state("2"), Some(NodeRunState::Error));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            WorkflowEvent::NodeFailed { error, .. } if error.contains("boom")
        )));
    }

    #[tokio::test]
    async fn test_pushes_during_execution_are_serialized() {
        let harness = harness(Duration::from_millis(30));
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Slow").with_inputs(&["value"]).with_outputs(&["out"]),
                GraphNode::new("2", "Collect").with_inputs(&["value"]),
            ],
            links: vec![GraphLink::new(1, "1", 0, "2", 0)],
        };
        let (scheduler, _) = scheduler(&graph, &harness);

        for i in 0..3 {
            scheduler.push("1", [("value", json!(i))]).unwrap();
        }
        scheduler.wait_idle().await;

        assert_eq!(harness.peak.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.execution_count("1"), 3);
        assert_eq!(*harness.seen.lock(), vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_queued_pushes_replay_before_later_pushes() {
        let harness = harness(Duration::ZERO);
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Tracked")
                    .with_inputs(&["value"])
                    .with_outputs(&["out"])
                    .with_widgets(vec![json!(30)]),
                GraphNode::new("2", "Tracked")
                    .with_inputs(&["value"])
                    .with_widgets(vec![json!(300)]),
            ],
            links: vec![GraphLink::new(1, "1", 0, "2", 0)],
        };
        let (scheduler, _) = scheduler(&graph, &harness);

        scheduler.push("1", [("value", json!(0))]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        // node 1 is executing: queued
        scheduler.push("1", [("value", json!(1))]).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        // node 1 is done but still fanning out to node 2; must not overtake 1
        assert_eq!(scheduler.node_state("1"), Some(NodeRunState::Done));
        scheduler.push("1", [("value", json!(2))]).unwrap();
        scheduler.wait_idle().await;

        let order = harness.order.lock().clone();
        let values_of = |id: &str| -> Vec<Value> {
            order.iter().filter(|(node, _)| node == id).map(|(_, v)| v.clone()).collect()
        };
        assert_eq!(values_of("1"), vec![json!(0), json!(1), json!(2)]);
        assert_eq!(values_of("2"), vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_activations() {
        let harness = harness(Duration::from_secs(30));
        let graph = WorkflowGraph {
            nodes: vec![GraphNode::new("1", "Slow").with_inputs(&["value"]).with_outputs(&["out"])],
            links: vec![],
        };
        let (scheduler, _) = scheduler(&graph, &harness);

        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run("1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.node_state("1"), Some(NodeRunState::Executing));

        assert!(scheduler.stop(Duration::from_secs(1)).await);
        assert_eq!(handle.await.unwrap().unwrap(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_seed_memory_unknown_node() {
        let harness = harness(Duration::ZERO);
        let (scheduler, _) = scheduler(&sum_graph(), &harness);
        assert!(scheduler.seed_memory("1", "initial_payload", json!({"x": 1})).is_ok());
        assert!(matches!(
            scheduler.seed_memory("42", "k", json!(1)),
            Err(EngineError::NodeNotFound(_))
        ));
    }
}
