//! Prints observer events as JSON lines

use std::io::Write;

use nodeflow_engine::{EventError, EventSink, WorkflowEvent};

/// Writes every event to stdout as one JSON object per line
pub struct JsonLinesSink {
    /// Drop `NodeWaiting` chatter
    pub quiet: bool,
}

impl EventSink for JsonLinesSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        if self.quiet && matches!(event, WorkflowEvent::NodeWaiting { .. }) {
            return Ok(());
        }
        let line = serde_json::to_string(&event).map_err(|e| EventError {
            message: e.to_string(),
        })?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line).map_err(|e| EventError {
            message: e.to_string(),
        })
    }
}
