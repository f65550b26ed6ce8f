//! Await Event Node
//!
//! Sends a correlated event to every target and suspends until each
//! delivery has been answered or the timeout expires. A timeout is not an
//! error: the responses that did arrive are emitted and a warning message
//! reports the shortfall.

use async_trait::async_trait;
use nodeflow_engine::config::seconds;
use nodeflow_engine::constants::defaults;
use nodeflow_engine::{
    DescribeNode, EventBroker, ExecutionContext, ExecutionResult, MessageKind, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Value};

use super::target_ids;

/// Await Event Node
///
/// # Inputs
/// - `event_ids` - One id or a list of ids (falls back to the widget)
/// - `data` - Payload
/// - `timeout` - Seconds to wait (falls back to the widget)
///
/// # Outputs
/// - `results` - Responses in arrival order; a single response is emitted bare
/// - `sent_count` - Number of deliveries
#[derive(Debug, Default)]
pub struct AwaitEventNode;

impl AwaitEventNode {
    pub const PORT_EVENT_IDS: &'static str = "event_ids";
    pub const PORT_DATA: &'static str = "data";
    pub const PORT_TIMEOUT: &'static str = "timeout";
    pub const PORT_RESULTS: &'static str = "results";
    pub const PORT_SENT_COUNT: &'static str = "sent_count";
    pub const WIDGET_EVENT_ID: &'static str = "event_id_widget";
    pub const WIDGET_TIMEOUT: &'static str = "timeout_seconds";
}

impl DescribeNode for AwaitEventNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("AwaitEventNode", NodeCategory::Events, "Await Event")
            .description("Sends data to other running graphs and waits for their answers")
            .input(SocketDescriptor::new(Self::PORT_EVENT_IDS, SocketType::Any).dependency())
            .input(SocketDescriptor::new(Self::PORT_DATA, SocketType::Any))
            .input(SocketDescriptor::new(Self::PORT_TIMEOUT, SocketType::Number))
            .output(SocketDescriptor::new(Self::PORT_RESULTS, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_SENT_COUNT, SocketType::Number))
            .widget(WidgetDescriptor::text(Self::WIDGET_EVENT_ID, "event_1"))
            .widget(
                WidgetDescriptor::number(Self::WIDGET_TIMEOUT, defaults::AWAIT_TIMEOUT_SECS)
                    .with_properties(json!({ "min": 1, "max": 300 })),
            )
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(AwaitEventNode::descriptor, || {
    Box::new(AwaitEventNode)
}));

#[async_trait]
impl Node for AwaitEventNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let fallback = ctx.widgets().text(Self::WIDGET_EVENT_ID).unwrap_or("event_1");
        let ids = target_ids(inputs.get(Self::PORT_EVENT_IDS), fallback);
        let timeout = match inputs
            .number(Self::PORT_TIMEOUT)
            .or_else(|| ctx.widgets().number(Self::WIDGET_TIMEOUT))
        {
            Some(secs) => seconds(secs),
            None => ctx.config().default_await_timeout(),
        };
        let data = inputs
            .take(Self::PORT_DATA)
            .unwrap_or_else(|| Value::String(String::new()));

        let broker = ctx.broker().clone();
        let await_id = EventBroker::new_await_id(ctx.node_id());
        let sent = broker.send_many(&ids, &data, Some(&await_id));

        let mut results = Vec::new();
        if sent == 0 {
            broker.discard_await(&await_id);
            log::debug!("AwaitEventNode {}: no listener for {:?}", ctx.node_id(), ids);
        } else {
            log::debug!(
                "AwaitEventNode {}: waiting for {} response(s) on '{}'",
                ctx.node_id(),
                sent,
                await_id
            );
            let outcome = broker.collect_responses_with_timeout(&await_id, sent, timeout).await;
            if outcome.timed_out {
                let message = format!(
                    "AwaitEventNode: Timeout after {:?}, collected {} of {} responses",
                    timeout,
                    outcome.responses.len(),
                    sent
                );
                ctx.send_message(MessageKind::Warning, json!({ "message": message }));
            }
            results = outcome.responses;
        }

        let results = if results.len() == 1 {
            results.remove(0)
        } else {
            Value::Array(results)
        };
        Ok(ExecutionResult::new(vec![
            Output::Value(results),
            Output::Value(Value::from(sent)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use nodeflow_engine::{EventEnvelope, WorkflowEvent};
    use std::sync::Arc;
    use std::time::Duration;

    /// Listener answering every correlated event with `answer`
    fn responder(broker: &Arc<EventBroker>, id: &str, answer: Value) {
        let responder = Arc::clone(broker);
        broker.register_listener(
            id,
            Arc::new(move |envelope: EventEnvelope| {
                if let Some(await_id) = envelope.await_id {
                    responder.respond(&await_id, answer.clone());
                }
            }),
        );
    }

    #[tokio::test]
    async fn test_single_response_is_unwrapped() {
        let mut harness = Harness::new::<AwaitEventNode>(&[json!("worker")]);
        responder(&harness.broker, "worker", json!("done"));

        let result = harness.execute(&mut AwaitEventNode, NodeInputs::new()).await.unwrap();
        assert_eq!(
            result.outputs,
            vec![Output::Value(json!("done")), Output::Value(json!(1))]
        );
    }

    #[tokio::test]
    async fn test_no_listener_returns_empty() {
        let mut harness = Harness::new::<AwaitEventNode>(&[json!("nobody")]);
        let result = harness.execute(&mut AwaitEventNode, NodeInputs::new()).await.unwrap();
        assert_eq!(result.outputs, vec![Output::Value(json!([])), Output::Value(json!(0))]);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_results() {
        let mut harness = Harness::new::<AwaitEventNode>(&[]);
        responder(&harness.broker, "a", json!(1));
        responder(&harness.broker, "b", json!(2));
        // registered but never answers
        harness
            .broker
            .register_listener("c", Arc::new(|_: EventEnvelope| {}));

        let inputs: NodeInputs = [("event_ids", json!(["a", "b", "c"])), ("timeout", json!(0.05))]
            .into_iter()
            .collect();
        let started = std::time::Instant::now();
        let result = harness.execute(&mut AwaitEventNode, inputs).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            result.outputs,
            vec![Output::Value(json!([1, 2])), Output::Value(json!(3))]
        );
        assert!(harness
            .sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeMessage { kind: MessageKind::Warning, .. })));
    }
}
