//! Receive Event Node

use async_trait::async_trait;
use nodeflow_engine::constants::memory_keys;
use nodeflow_engine::{
    DescribeNode, EventTrigger, ExecutionContext, ExecutionResult, ListenContext, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

/// Starts a run for every event sent to its `listen_id`
///
/// The supervisor arms this node while listening; each delivered event
/// starts a fresh run here with the payload (and the correlation id of an
/// awaited event) in memory.
///
/// # Outputs
/// - `data` - The event payload
/// - `event_id` - The id listened on
/// - `await_id` - Correlation id; skipped for plain events
#[derive(Debug, Default)]
pub struct ReceiveEventNode {
    listening_id: Option<String>,
}

impl ReceiveEventNode {
    pub const PORT_DATA: &'static str = "data";
    pub const PORT_EVENT_ID: &'static str = "event_id";
    pub const PORT_AWAIT_ID: &'static str = "await_id";
    pub const WIDGET_LISTEN_ID: &'static str = "listen_id";
    const DEFAULT_LISTEN_ID: &'static str = "event_1";
}

impl DescribeNode for ReceiveEventNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("ReceiveEventNode", NodeCategory::Events, "Receive Event")
            .description("Starts a run for every event sent to its id")
            .output(SocketDescriptor::new(Self::PORT_DATA, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_EVENT_ID, SocketType::Text))
            .output(SocketDescriptor::new(Self::PORT_AWAIT_ID, SocketType::Text))
            .widget(WidgetDescriptor::text(Self::WIDGET_LISTEN_ID, Self::DEFAULT_LISTEN_ID))
            .event_source()
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(ReceiveEventNode::descriptor, || {
    Box::new(ReceiveEventNode::default())
}));

#[async_trait]
impl Node for ReceiveEventNode {
    async fn execute(&mut self, _inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let payload = ctx
            .memory()
            .get(memory_keys::INITIAL_PAYLOAD)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        let event_id = ctx
            .widgets()
            .text(Self::WIDGET_LISTEN_ID)
            .unwrap_or(Self::DEFAULT_LISTEN_ID)
            .to_string();
        let await_id = match ctx.memory().get(memory_keys::AWAIT_ID) {
            Some(id) => Output::Value(id.clone()),
            None => Output::Skip,
        };

        log::debug!("ReceiveEventNode {}: event '{}' received", ctx.node_id(), event_id);
        Ok(ExecutionResult::new(vec![
            Output::Value(payload),
            Output::Value(Value::String(event_id)),
            await_id,
        ]))
    }

    async fn start_listening(&mut self, ctx: &ListenContext<'_>, trigger: EventTrigger) -> Result<()> {
        let listen_id = ctx
            .widgets
            .text(Self::WIDGET_LISTEN_ID)
            .unwrap_or(Self::DEFAULT_LISTEN_ID)
            .to_string();
        ctx.broker.register_listener(listen_id.clone(), trigger);
        log::info!("ReceiveEventNode {}: listening for '{}'", ctx.node_id, listen_id);
        self.listening_id = Some(listen_id);
        Ok(())
    }

    async fn stop_listening(&mut self, ctx: &ListenContext<'_>) -> Result<()> {
        if let Some(listen_id) = self.listening_id.take() {
            ctx.broker.unregister_listener(&listen_id);
            log::info!("ReceiveEventNode {}: stopped listening for '{}'", ctx.node_id, listen_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use nodeflow_engine::{EventEnvelope, WidgetValues};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_plain_event_skips_await_id() {
        let mut harness = Harness::new::<ReceiveEventNode>(&[json!("orders")]);
        harness
            .memory
            .insert(memory_keys::INITIAL_PAYLOAD.to_string(), json!({"id": 1}));
        let result = harness
            .execute(&mut ReceiveEventNode::default(), NodeInputs::new())
            .await
            .unwrap();
        assert_eq!(
            result.outputs,
            vec![
                Output::Value(json!({"id": 1})),
                Output::Value(json!("orders")),
                Output::Skip,
            ]
        );
    }

    #[tokio::test]
    async fn test_correlated_event_emits_await_id() {
        let mut harness = Harness::new::<ReceiveEventNode>(&[]);
        harness
            .memory
            .insert(memory_keys::AWAIT_ID.to_string(), json!("await_3_abcd1234"));
        let result = harness
            .execute(&mut ReceiveEventNode::default(), NodeInputs::new())
            .await
            .unwrap();
        assert_eq!(result.outputs[0], Output::Value(json!("")));
        assert_eq!(result.outputs[2], Output::Value(json!("await_3_abcd1234")));
    }

    #[tokio::test]
    async fn test_listen_registers_and_unregisters() {
        let harness = Harness::new::<ReceiveEventNode>(&[json!("orders")]);
        let widgets: &WidgetValues = &harness.widgets;
        let ctx = ListenContext {
            node_id: "1",
            widgets,
            broker: &harness.broker,
        };
        let mut node = ReceiveEventNode::default();

        node.start_listening(&ctx, Arc::new(|_: EventEnvelope| {})).await.unwrap();
        assert!(harness.broker.has_listener("orders"));
        node.stop_listening(&ctx).await.unwrap();
        assert!(!harness.broker.has_listener("orders"));
    }
}
