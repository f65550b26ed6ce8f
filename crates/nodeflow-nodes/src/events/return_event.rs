//! Return Event Data Node

use async_trait::async_trait;
use nodeflow_engine::{
    display_value, DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor,
    NodeInputs, Output, Result, SocketDescriptor, SocketType,
};
use serde_json::Value;

/// Answers a correlated event
///
/// # Inputs
/// - `return_data` - The answer
/// - `await_id` - Correlation id received with the event
///
/// # Outputs
/// - `confirmed` - Human-readable delivery status
#[derive(Debug, Default)]
pub struct ReturnEventDataNode;

impl ReturnEventDataNode {
    pub const PORT_RETURN_DATA: &'static str = "return_data";
    pub const PORT_AWAIT_ID: &'static str = "await_id";
    pub const PORT_CONFIRMED: &'static str = "confirmed";
    pub const RETURNED: &'static str = "Data returned successfully";
    pub const NOT_RETURNED: &'static str = "Failed to return data";
    pub const NO_AWAIT_ID: &'static str = "Error: No await_id provided";
}

impl DescribeNode for ReturnEventDataNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("ReturnEventDataNode", NodeCategory::Events, "Return Event Data")
            .description("Sends data back to the graph awaiting this event")
            .input(SocketDescriptor::new(Self::PORT_RETURN_DATA, SocketType::Any))
            .input(SocketDescriptor::new(Self::PORT_AWAIT_ID, SocketType::Text))
            .output(SocketDescriptor::new(Self::PORT_CONFIRMED, SocketType::Text))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(
    ReturnEventDataNode::descriptor,
    || Box::new(ReturnEventDataNode)
));

#[async_trait]
impl Node for ReturnEventDataNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let confirmed = match inputs.take(Self::PORT_AWAIT_ID) {
            None | Some(Value::Null) => Self::NO_AWAIT_ID,
            Some(await_id) => {
                let await_id = display_value(&await_id);
                let data = inputs
                    .take(Self::PORT_RETURN_DATA)
                    .unwrap_or_else(|| Value::String(String::new()));
                if ctx.broker().respond(&await_id, data) {
                    Self::RETURNED
                } else {
                    Self::NOT_RETURNED
                }
            }
        };
        log::debug!("ReturnEventDataNode {}: {}", ctx.node_id(), confirmed);
        Ok(ExecutionResult::new(vec![Output::Value(Value::from(confirmed))]))
    }
}
