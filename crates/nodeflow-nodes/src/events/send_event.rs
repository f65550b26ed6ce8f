//! Send Event Node

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor, NodeInputs, Output,
    Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

use super::target_ids;

/// Sends `data` to the listeners of one or more event ids
///
/// A list of data sent to several ids pairs up positionally; anything
/// else is broadcast to every id.
///
/// # Inputs
/// - `event_ids` - One id or a list of ids (falls back to the widget)
/// - `data` - Payload
///
/// # Outputs
/// - `sent_count` - Number of deliveries
#[derive(Debug, Default)]
pub struct SendEventNode;

impl SendEventNode {
    pub const PORT_EVENT_IDS: &'static str = "event_ids";
    pub const PORT_DATA: &'static str = "data";
    pub const PORT_SENT_COUNT: &'static str = "sent_count";
    pub const WIDGET_EVENT_ID: &'static str = "event_id_widget";
}

impl DescribeNode for SendEventNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("SendEventNode", NodeCategory::Events, "Send Event")
            .description("Sends data to other running graphs")
            .input(SocketDescriptor::new(Self::PORT_EVENT_IDS, SocketType::Any).dependency())
            .input(SocketDescriptor::new(Self::PORT_DATA, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_SENT_COUNT, SocketType::Number))
            .widget(WidgetDescriptor::text(Self::WIDGET_EVENT_ID, "event_1"))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(SendEventNode::descriptor, || {
    Box::new(SendEventNode)
}));

#[async_trait]
impl Node for SendEventNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let fallback = ctx.widgets().text(Self::WIDGET_EVENT_ID).unwrap_or("event_1");
        let ids = target_ids(inputs.get(Self::PORT_EVENT_IDS), fallback);
        let data = inputs
            .take(Self::PORT_DATA)
            .unwrap_or_else(|| Value::String(String::new()));

        let sent = ctx.broker().send_many(&ids, &data, None);
        log::debug!("SendEventNode {}: delivered {} of {} event(s)", ctx.node_id(), sent, ids.len());
        Ok(ExecutionResult::new(vec![Output::Value(Value::from(sent))]))
    }
}
