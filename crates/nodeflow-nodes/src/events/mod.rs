//! Cross-run event nodes
//!
//! Graphs talk to each other through the session's event broker:
//! `SendEventNode` fires and forgets, `AwaitEventNode` fires and collects
//! one response per delivery, `ReceiveEventNode` starts a run per event and
//! `ReturnEventDataNode` answers a correlated event.

mod await_event;
mod receive_event;
mod return_event;
mod send_event;

pub use await_event::AwaitEventNode;
pub use receive_event::ReceiveEventNode;
pub use return_event::ReturnEventDataNode;
pub use send_event::SendEventNode;

use nodeflow_engine::display_value;
use serde_json::Value;

/// Event ids from a linked input: a list of ids, a single id, or the widget fallback.
pub(crate) fn target_ids(input: Option<&Value>, fallback: &str) -> Vec<String> {
    match input {
        Some(Value::Array(ids)) => ids.iter().map(display_value).collect(),
        Some(Value::Null) | None => vec![fallback.to_string()],
        Some(id) => vec![display_value(id)],
    }
}
