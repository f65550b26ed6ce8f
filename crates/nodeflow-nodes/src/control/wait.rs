//! Wait Node
//!
//! Delays its input. Useful for exercising cancellation.

use async_trait::async_trait;
use nodeflow_engine::{
    config::seconds, DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor,
    NodeInputs, Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Value};

/// Wait Node
///
/// # Inputs
/// - `trigger` - Value to pass through after the delay
///
/// # Outputs
/// - `output` - The `trigger` value
#[derive(Debug, Default)]
pub struct WaitNode;

impl WaitNode {
    pub const PORT_TRIGGER: &'static str = "trigger";
    pub const PORT_OUTPUT: &'static str = "output";
    pub const WIDGET_WAIT_TIME: &'static str = "wait_time_seconds";
    const DEFAULT_WAIT_SECS: f64 = 5.0;
}

impl DescribeNode for WaitNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("WaitNode", NodeCategory::Control, "Wait")
            .description("Waits before passing its input through")
            .input(SocketDescriptor::new(Self::PORT_TRIGGER, SocketType::Any).dependency())
            .output(SocketDescriptor::new(Self::PORT_OUTPUT, SocketType::Any))
            .widget(
                WidgetDescriptor::number(Self::WIDGET_WAIT_TIME, Self::DEFAULT_WAIT_SECS)
                    .with_properties(json!({ "min": 0, "step": 0.1 })),
            )
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(WaitNode::descriptor, || {
    Box::new(WaitNode)
}));

#[async_trait]
impl Node for WaitNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let secs = ctx
            .widgets()
            .number(Self::WIDGET_WAIT_TIME)
            .unwrap_or(Self::DEFAULT_WAIT_SECS);
        let delay = seconds(secs);

        log::debug!("WaitNode {}: waiting {:?}", ctx.node_id(), delay);
        tokio::time::sleep(delay).await;
        log::debug!("WaitNode {}: finished waiting", ctx.node_id());

        let trigger = inputs.take(Self::PORT_TRIGGER).unwrap_or(Value::Null);
        Ok(ExecutionResult::new(vec![Output::Value(trigger)]))
    }
}
