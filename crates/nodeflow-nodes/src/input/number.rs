//! Number constant

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor, NodeInputs, Output,
    Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

/// Emits the number configured in its `value` widget
///
/// # Outputs
/// - `number_out` - The configured number
#[derive(Debug, Default)]
pub struct NumberNode;

impl NumberNode {
    pub const PORT_NUMBER_OUT: &'static str = "number_out";
    pub const WIDGET_VALUE: &'static str = "value";
}

impl DescribeNode for NumberNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("NumberNode", NodeCategory::Input, "Number")
            .description("Provides a constant number")
            .output(SocketDescriptor::new(Self::PORT_NUMBER_OUT, SocketType::Number))
            .widget(WidgetDescriptor::number(Self::WIDGET_VALUE, 10.0))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(NumberNode::descriptor, || {
    Box::new(NumberNode)
}));

#[async_trait]
impl Node for NumberNode {
    async fn execute(&mut self, _inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let value = ctx.widgets().get(Self::WIDGET_VALUE).cloned().unwrap_or(Value::Null);
        log::debug!("NumberNode {}: emitting {}", ctx.node_id(), value);
        Ok(ExecutionResult::new(vec![Output::Value(value)]))
    }
}
