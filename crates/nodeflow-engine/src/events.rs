//! Observer events for run progress
//!
//! Events are sent from the engine to whoever observes a run (a CLI, a
//! websocket bridge, a test) to report lifecycle transitions, node
//! messages and errors. Delivery is fire-and-forget: a failing sink never
//! aborts execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for sending workflow events
///
/// This abstracts over the transport mechanism (stdout, log, collector)
/// allowing the engine to be used in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

/// Send an event, logging instead of failing when the sink rejects it.
pub(crate) fn emit(sink: &dyn EventSink, event: WorkflowEvent) {
    if let Err(e) = sink.send(event) {
        log::debug!("Dropping observer event: {}", e);
    }
}

/// Kind of a node-originated message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Log,
    Debug,
    Warning,
    Error,
    /// Assertion outcome reported by test nodes
    Test,
    /// Content meant for a display panel
    Display,
}

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Run instantiated and start node activated
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: String,
        start_node_id: String,
    },

    /// No activation left in flight
    #[serde(rename_all = "camelCase")]
    RunFinished { run_id: String },

    /// Run cancelled by a stop command
    #[serde(rename_all = "camelCase")]
    RunStopped { run_id: String },

    /// Run could not be set up
    #[serde(rename_all = "camelCase")]
    RunFailed { run_id: String, error: String },

    /// Node armed with a fresh wait set
    #[serde(rename_all = "camelCase")]
    NodePreparing {
        run_id: String,
        node_id: String,
        node_type: String,
    },

    /// Node wait set changed
    #[serde(rename_all = "camelCase")]
    NodeWaiting {
        run_id: String,
        node_id: String,
        waiting_on: Vec<String>,
    },

    /// Node execution started
    #[serde(rename_all = "camelCase")]
    NodeExecuting {
        run_id: String,
        node_id: String,
        node_type: String,
    },

    /// Node execution finished; `outputs` report skipped slots as null
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        run_id: String,
        node_id: String,
        outputs: Vec<Value>,
    },

    /// Node execution failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        run_id: String,
        node_id: String,
        node_type: String,
        error: String,
    },

    /// Message sent by node code
    #[serde(rename_all = "camelCase")]
    NodeMessage {
        run_id: String,
        node_id: String,
        node_type: String,
        kind: MessageKind,
        payload: Value,
    },

    /// Event source armed
    #[serde(rename_all = "camelCase")]
    ListenerStarted { node_id: String, node_type: String },

    /// Event source disarmed
    #[serde(rename_all = "camelCase")]
    ListenerStopped { node_id: String },
}

impl WorkflowEvent {
    /// Create a node message event
    pub fn node_message(
        run_id: &str,
        node_id: &str,
        node_type: &str,
        kind: MessageKind,
        payload: Value,
    ) -> Self {
        Self::NodeMessage {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            kind,
            payload,
        }
    }

    /// Create a node failure event
    pub fn node_failed(run_id: &str, node_id: &str, node_type: &str, error: impl ToString) -> Self {
        Self::NodeFailed {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            error: error.to_string(),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunFinished { run_id }
            | Self::RunStopped { run_id }
            | Self::RunFailed { run_id, .. }
            | Self::NodePreparing { run_id, .. }
            | Self::NodeWaiting { run_id, .. }
            | Self::NodeExecuting { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::NodeMessage { run_id, .. } => Some(run_id.as_str()),
            Self::ListenerStarted { .. } | Self::ListenerStopped { .. } => None,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodePreparing { node_id, .. }
            | Self::NodeWaiting { node_id, .. }
            | Self::NodeExecuting { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeMessage { node_id, .. }
            | Self::ListenerStarted { node_id, .. }
            | Self::ListenerStopped { node_id } => Some(node_id.as_str()),
            _ => None,
        }
    }
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Events that concern one run
    pub fn events_for_run(&self, run_id: &str) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.run_id() == Some(run_id))
            .cloned()
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Mirrors events into the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::NodeFailed {
                run_id,
                node_id,
                node_type,
                error,
            } => log::error!("[{}] {} {} failed: {}", run_id, node_type, node_id, error),
            WorkflowEvent::RunFailed { run_id, error } => log::error!("[{}] run failed: {}", run_id, error),
            WorkflowEvent::NodeMessage {
                run_id,
                node_id,
                kind: MessageKind::Error,
                payload,
                ..
            } => log::warn!("[{}] node {}: {}", run_id, node_id, payload),
            WorkflowEvent::NodeMessage {
                run_id,
                node_id,
                kind,
                payload,
                ..
            } => log::info!("[{}] node {} {:?}: {}", run_id, node_id, kind, payload),
            WorkflowEvent::RunStarted { .. }
            | WorkflowEvent::RunFinished { .. }
            | WorkflowEvent::RunStopped { .. }
            | WorkflowEvent::ListenerStarted { .. }
            | WorkflowEvent::ListenerStopped { .. } => log::info!("{:?}", event),
            _ => log::debug!("{:?}", event),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(WorkflowEvent::node_message(
            "run1",
            "4",
            "DisplayNode",
            MessageKind::Display,
            Value::from("halfway"),
        ))
        .unwrap();
        sink.send(WorkflowEvent::RunFinished {
            run_id: "run2".to_string(),
        })
        .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);

        match &events[0] {
            WorkflowEvent::NodeMessage { node_id, kind, .. } => {
                assert_eq!(node_id, "4");
                assert_eq!(*kind, MessageKind::Display);
            }
            _ => panic!("Expected NodeMessage event"),
        }
        assert_eq!(sink.events_for_run("run2").len(), 1);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink() {
        let sink = NullEventSink;
        // Should not panic
        sink.send(WorkflowEvent::RunStopped {
            run_id: "run1".to_string(),
        })
        .unwrap();
    }

    struct RejectingSink;

    impl EventSink for RejectingSink {
        fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
            Err(EventError {
                message: "closed".to_string(),
            })
        }
    }

    #[test]
    fn test_emit_swallows_sink_failure() {
        let err = RejectingSink
            .send(WorkflowEvent::RunFinished { run_id: "a".into() })
            .unwrap_err();
        assert_eq!(err.to_string(), "Event error: closed");
        emit(&RejectingSink, WorkflowEvent::RunFinished { run_id: "b".into() });
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkflowEvent::node_failed("run_1", "3", "AssertNode", "Assertion Failed: x");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "nodeFailed");
        assert_eq!(json["runId"], "run_1");
        assert_eq!(json["nodeType"], "AssertNode");
        assert_eq!(event.node_id(), Some("3"));
    }
}
