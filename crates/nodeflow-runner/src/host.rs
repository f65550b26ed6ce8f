//! Single-graph and listening sessions

use std::path::Path;

use nodeflow_engine::{RunOutcome, RunSupervisor, WorkflowGraph};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Result, RunnerError};

pub fn load_graph(path: &Path) -> Result<WorkflowGraph> {
    let text = std::fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| RunnerError::json(path, e))
}

/// Run one graph to completion
pub async fn run_graph(
    session: &RunSupervisor,
    graph: &WorkflowGraph,
    start_node_id: &str,
    run_id: Option<String>,
) -> Result<RunOutcome> {
    let outcome = session.run(graph, start_node_id, run_id).await?;
    if !outcome.failed_nodes.is_empty() {
        log::warn!("Run {}: failed node(s) {:?}", outcome.run_id, outcome.failed_nodes);
    }
    Ok(outcome)
}

/// Parse an `event_id payload` line.
///
/// The payload is JSON when it parses as JSON and a plain string otherwise;
/// a missing payload is the empty string.
pub fn parse_event_line(line: &str) -> Option<(&str, Value)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (event_id, payload) = match line.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest.trim()),
        None => (line, ""),
    };
    let payload =
        serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
    Some((event_id, payload))
}

/// Arm the graph's event nodes and forward every input line as an external event.
///
/// Returns the number of events delivered once `lines` is exhausted.
pub async fn listen<R>(session: &RunSupervisor, graph: &WorkflowGraph, lines: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let armed = session.start_listening(graph).await?;
    log::info!("Listening on {} event node(s); send `<event_id> <payload>` lines", armed);

    let mut delivered = 0;
    let mut lines = lines.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read event input: {}", e);
                break;
            }
        };
        let Some((event_id, payload)) = parse_event_line(&line) else {
            continue;
        };
        if session.send_external_event(event_id, payload) {
            delivered += 1;
        } else {
            log::warn!("No listener for event '{}'", event_id);
        }
    }

    session.shutdown().await;
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_event_line() {
        assert_eq!(parse_event_line("orders {\"n\": 1}"), Some(("orders", json!({ "n": 1 }))));
        assert_eq!(parse_event_line("orders hello world"), Some(("orders", json!("hello world"))));
        assert_eq!(parse_event_line("  ping  "), Some(("ping", json!(""))));
        assert_eq!(parse_event_line("# comment"), None);
        assert_eq!(parse_event_line("   "), None);
    }
}
