//! Run supervision
//!
//! A [`RunSupervisor`] is one session: it owns the event broker shared by
//! every run it starts, tracks the runs in flight so they can be stopped,
//! and arms the event-source nodes of a graph so that delivered events start
//! independent runs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::broker::{EventBroker, EventEnvelope};
use crate::config::EngineConfig;
use crate::constants::{id_prefixes, memory_keys};
use crate::error::{EngineError, Result};
use crate::events::{emit, EventSink, WorkflowEvent};
use crate::graph::WorkflowGraph;
use crate::node::{EventTrigger, ListenContext, LoadContext, Node, RunServices, WidgetValues};
use crate::registry::NodeRegistry;
use crate::scheduler::{RunStatus, Scheduler};
use crate::types::NodeId;

/// Result of a run that got past setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    /// Nodes that ended in ERROR
    pub failed_nodes: Vec<NodeId>,
}

impl RunOutcome {
    /// Finished with no failed node
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Finished && self.failed_nodes.is_empty()
    }
}

struct SupervisorShared {
    registry: Arc<NodeRegistry>,
    services: RunServices,
    runs: Mutex<HashMap<String, Scheduler>>,
}

/// An armed event-source node
struct ArmedSource {
    node_id: NodeId,
    widgets: WidgetValues,
    node: Box<dyn Node>,
}

struct ListeningSession {
    sources: Vec<ArmedSource>,
}

/// Session host for workflow runs
pub struct RunSupervisor {
    shared: Arc<SupervisorShared>,
    listening: tokio::sync::Mutex<Option<ListeningSession>>,
}

impl RunSupervisor {
    pub fn new(registry: Arc<NodeRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_config(registry, sink, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRegistry>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        let services = RunServices::new(Arc::new(EventBroker::new()), sink, Arc::new(config));
        Self {
            shared: Arc::new(SupervisorShared {
                registry,
                services,
                runs: Mutex::new(HashMap::new()),
            }),
            listening: tokio::sync::Mutex::new(None),
        }
    }

    /// The session's event broker
    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.shared.services.broker
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.services.config
    }

    /// Execute `graph` from `start_node_id` and wait for the run to drain.
    ///
    /// Setup failures (unknown node type, missing start node, failed `load`)
    /// are returned as errors; node failures are listed in the outcome.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        start_node_id: &str,
        run_id: Option<String>,
    ) -> Result<RunOutcome> {
        let run_id = run_id.unwrap_or_else(|| generate_run_id(id_prefixes::RUN));
        let scheduler = self.shared.prepare(graph, start_node_id, run_id, None)?;
        Ok(self.shared.drive(scheduler, start_node_id).await)
    }

    /// Start a run in the background.
    ///
    /// The run is registered before this returns, so it can be stopped
    /// right away by its id.
    pub fn spawn_run(
        &self,
        graph: &WorkflowGraph,
        start_node_id: &str,
        run_id: Option<String>,
    ) -> Result<(String, JoinHandle<RunOutcome>)> {
        let run_id = run_id.unwrap_or_else(|| generate_run_id(id_prefixes::RUN));
        let scheduler = self.shared.prepare(graph, start_node_id, run_id.clone(), None)?;
        let shared = Arc::clone(&self.shared);
        let start = start_node_id.to_string();
        let handle = tokio::spawn(async move { shared.drive(scheduler, &start).await });
        Ok((run_id, handle))
    }

    /// Cancel one run and wait for its activations to unwind
    pub async fn stop(&self, run_id: &str) -> Result<bool> {
        let scheduler = self
            .shared
            .runs
            .lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))?;
        Ok(scheduler.stop(self.config().stop_grace_period()).await)
    }

    /// Cancel every run in flight; returns how many were cancelled
    pub async fn stop_all(&self) -> usize {
        let schedulers: Vec<Scheduler> = self.shared.runs.lock().values().cloned().collect();
        let grace = self.config().stop_grace_period();
        for scheduler in &schedulers {
            scheduler.stop(grace).await;
        }
        schedulers.len()
    }

    /// Ids of the runs in flight, sorted
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.runs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Arm every event-source node of `graph`.
    ///
    /// Each event delivered to an armed node starts an independent run from
    /// that node, with the payload in its memory. A previous listening
    /// session is disarmed first. Returns the number of armed nodes.
    pub async fn start_listening(&self, graph: &WorkflowGraph) -> Result<usize> {
        let mut listening = self.listening.lock().await;
        if let Some(previous) = listening.take() {
            self.disarm(previous).await;
        }

        let graph = Arc::new(graph.clone());
        let mut session = ListeningSession { sources: Vec::new() };
        for graph_node in &graph.nodes {
            let node_type = graph_node.type_name();
            let Some((descriptor, mut node)) = self.shared.registry.create(node_type) else {
                continue;
            };
            if !descriptor.event_source {
                continue;
            }

            let widgets = WidgetValues::bind(&descriptor.widgets, &graph_node.widgets_values);
            let trigger = self.shared.trigger_for(Arc::clone(&graph), graph_node.id.clone());
            let loaded = node.load(&LoadContext {
                node_id: &graph_node.id,
                widgets: &widgets,
            });
            let armed = match loaded {
                Ok(()) => {
                    let ctx = ListenContext {
                        node_id: &graph_node.id,
                        widgets: &widgets,
                        broker: self.broker(),
                    };
                    node.start_listening(&ctx, trigger).await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = armed {
                log::error!("Failed to arm event node {} ({}): {}", graph_node.id, node_type, e);
                self.disarm(session).await;
                return Err(EngineError::Listener(format!("node {}: {}", graph_node.id, e)));
            }

            log::info!("Listening on event node {} ({})", graph_node.id, node_type);
            emit(
                self.shared.services.sink.as_ref(),
                WorkflowEvent::ListenerStarted {
                    node_id: graph_node.id.clone(),
                    node_type: node_type.to_string(),
                },
            );
            session.sources.push(ArmedSource {
                node_id: graph_node.id.clone(),
                widgets,
                node,
            });
        }

        let armed = session.sources.len();
        if armed == 0 {
            log::warn!("Graph has no event-source nodes to listen on");
        }
        *listening = Some(session);
        Ok(armed)
    }

    /// Disarm the current listening session; returns the number of nodes disarmed
    pub async fn stop_listening(&self) -> usize {
        match self.listening.lock().await.take() {
            Some(session) => self.disarm(session).await,
            None => 0,
        }
    }

    async fn disarm(&self, session: ListeningSession) -> usize {
        let count = session.sources.len();
        for mut source in session.sources {
            let ctx = ListenContext {
                node_id: &source.node_id,
                widgets: &source.widgets,
                broker: self.broker(),
            };
            if let Err(e) = source.node.stop_listening(&ctx).await {
                log::warn!("Failed to disarm event node {}: {}", source.node_id, e);
            }
            emit(
                self.shared.services.sink.as_ref(),
                WorkflowEvent::ListenerStopped {
                    node_id: source.node_id.clone(),
                },
            );
        }
        count
    }

    /// Deliver an event from outside any graph
    pub fn send_external_event(&self, event_id: &str, payload: Value) -> bool {
        self.broker().send(event_id, payload)
    }

    /// Disarm listeners, stop every run and release pending broker waits
    pub async fn shutdown(&self) {
        let disarmed = self.stop_listening().await;
        let stopped = self.stop_all().await;
        self.broker().shutdown();
        log::info!("Session shut down ({} listener(s), {} run(s))", disarmed, stopped);
    }
}

impl SupervisorShared {
    /// Instantiate and register a run; nothing executes yet.
    fn prepare(
        &self,
        graph: &WorkflowGraph,
        start_node_id: &str,
        run_id: String,
        trigger: Option<EventEnvelope>,
    ) -> Result<Scheduler> {
        let prepared = Scheduler::new(run_id.clone(), graph, &self.registry, self.services.clone()).and_then(
            |scheduler| {
                if !scheduler.contains_node(start_node_id) {
                    return Err(EngineError::StartNodeNotFound(start_node_id.to_string()));
                }
                if let Some(envelope) = trigger {
                    scheduler.seed_memory(start_node_id, memory_keys::INITIAL_PAYLOAD, envelope.data)?;
                    if let Some(await_id) = envelope.await_id {
                        scheduler.seed_memory(start_node_id, memory_keys::AWAIT_ID, Value::String(await_id))?;
                    }
                }
                Ok(scheduler)
            },
        );

        match prepared {
            Ok(scheduler) => {
                self.runs.lock().insert(run_id.clone(), scheduler.clone());
                emit(
                    self.services.sink.as_ref(),
                    WorkflowEvent::RunStarted {
                        run_id,
                        start_node_id: start_node_id.to_string(),
                    },
                );
                Ok(scheduler)
            }
            Err(e) => {
                log::error!("Run {} failed during setup: {}", run_id, e);
                emit(
                    self.services.sink.as_ref(),
                    WorkflowEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Drive a prepared run until it drains or is cancelled.
    async fn drive(&self, scheduler: Scheduler, start_node_id: &str) -> RunOutcome {
        let run_id = scheduler.run_id().to_string();
        // the start node was checked in `prepare`
        let status = scheduler.run(start_node_id).await.unwrap_or(RunStatus::Finished);
        self.runs.lock().remove(&run_id);

        let failed_nodes = scheduler.failed_nodes();
        let event = match status {
            RunStatus::Finished => {
                log::info!("Run {} finished ({} failed node(s))", run_id, failed_nodes.len());
                WorkflowEvent::RunFinished { run_id: run_id.clone() }
            }
            RunStatus::Stopped => {
                log::info!("Run {} stopped by user", run_id);
                WorkflowEvent::RunStopped { run_id: run_id.clone() }
            }
        };
        emit(self.services.sink.as_ref(), event);

        RunOutcome {
            run_id,
            status,
            failed_nodes,
        }
    }

    /// Callback that starts a run from `node_id` for every delivered event
    fn trigger_for(self: &Arc<Self>, graph: Arc<WorkflowGraph>, node_id: NodeId) -> EventTrigger {
        let shared = Arc::downgrade(self);
        let runtime = tokio::runtime::Handle::current();
        Arc::new(move |envelope: EventEnvelope| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let run_id = generate_run_id(id_prefixes::EVENT_RUN);
            log::debug!("Event for node {} starts run {}", node_id, run_id);
            match shared.prepare(&graph, &node_id, run_id, Some(envelope)) {
                Ok(scheduler) => {
                    let start = node_id.clone();
                    runtime.spawn(async move {
                        shared.drive(scheduler, &start).await;
                    });
                }
                Err(e) => log::error!("Event-triggered run from node {} failed: {}", node_id, e),
            }
        })
    }
}

fn generate_run_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
