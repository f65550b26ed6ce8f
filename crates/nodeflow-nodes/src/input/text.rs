//! Text constant

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor, NodeInputs, Output,
    Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

/// Emits the text configured in its `value` widget
///
/// # Outputs
/// - `text_out` - The configured text
#[derive(Debug, Default)]
pub struct TextNode;

impl TextNode {
    pub const PORT_TEXT_OUT: &'static str = "text_out";
    pub const WIDGET_VALUE: &'static str = "value";
}

impl DescribeNode for TextNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("TextNode", NodeCategory::Input, "Text")
            .description("Provides a constant text")
            .output(SocketDescriptor::new(Self::PORT_TEXT_OUT, SocketType::Text))
            .widget(WidgetDescriptor::text(Self::WIDGET_VALUE, "Hello, World!"))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(TextNode::descriptor, || {
    Box::new(TextNode)
}));

#[async_trait]
impl Node for TextNode {
    async fn execute(&mut self, _inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let text = ctx.widgets().get(Self::WIDGET_VALUE).cloned().unwrap_or(Value::Null);
        Ok(ExecutionResult::new(vec![Output::Value(text)]))
    }
}
