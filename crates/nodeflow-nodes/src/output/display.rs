//! Display output

use async_trait::async_trait;
use nodeflow_engine::{
    display_value, DescribeNode, ExecutionContext, ExecutionResult, MessageKind, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Value};

/// Sends its input to the observer's display panel
///
/// Arrays and objects are pretty-printed.
///
/// # Inputs
/// - `value_in` - Value to display
#[derive(Debug, Default)]
pub struct DisplayNode;

impl DisplayNode {
    pub const PORT_VALUE_IN: &'static str = "value_in";
    pub const WIDGET_CONTENT_TYPE: &'static str = "content_type";
}

impl DescribeNode for DisplayNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("DisplayNode", NodeCategory::Output, "Display")
            .description("Shows a value in the display panel")
            .input(SocketDescriptor::new(Self::PORT_VALUE_IN, SocketType::Any))
            .widget(WidgetDescriptor::combo(
                Self::WIDGET_CONTENT_TYPE,
                &["text", "image", "video"],
            ))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(DisplayNode::descriptor, || {
    Box::new(DisplayNode)
}));

fn render(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| display_value(value))
        }
        other => display_value(other),
    }
}

#[async_trait]
impl Node for DisplayNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let value = inputs.get(Self::PORT_VALUE_IN).cloned().unwrap_or(Value::Null);
        let content_type = ctx.widgets().text(Self::WIDGET_CONTENT_TYPE).unwrap_or("text").to_string();
        let data = render(&value);

        log::info!("DisplayNode {}: {}", ctx.node_id(), data);
        ctx.send_message(
            MessageKind::Display,
            json!({ "content_type": content_type, "data": data }),
        );
        Ok(ExecutionResult::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use nodeflow_engine::WorkflowEvent;

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("plain")), "plain");
        assert_eq!(render(&json!(12)), "12");
        assert_eq!(render(&json!([1])), "[\n  1\n]");
    }

    #[tokio::test]
    async fn test_sends_display_message() {
        let mut harness = Harness::new::<DisplayNode>(&[]);
        let inputs: NodeInputs = [("value_in", json!(12))].into_iter().collect();
        let result = harness.execute(&mut DisplayNode, inputs).await.unwrap();
        assert!(result.outputs.is_empty());

        let events = harness.sink.events();
        match events.as_slice() {
            [WorkflowEvent::NodeMessage { kind, payload, .. }] => {
                assert_eq!(*kind, MessageKind::Display);
                assert_eq!(payload["data"], "12");
                assert_eq!(payload["content_type"], "text");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }
}
