//! Trigger Detection Node

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor, NodeInputs, Output,
    Result, SocketDescriptor, SocketType,
};
use serde_json::Value;

/// Reports which input fired it
///
/// `dependency_input` is pulled; `trigger_input` never blocks. When the
/// trigger input carries a value it wins, otherwise the dependency value is
/// passed on.
///
/// # Outputs
/// - `trigger_source` - The winning input value
#[derive(Debug, Default)]
pub struct TriggerDetectionNode;

impl TriggerDetectionNode {
    pub const PORT_DEPENDENCY_INPUT: &'static str = "dependency_input";
    pub const PORT_TRIGGER_INPUT: &'static str = "trigger_input";
    pub const PORT_TRIGGER_SOURCE: &'static str = "trigger_source";
}

impl DescribeNode for TriggerDetectionNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("TriggerDetectionNode", NodeCategory::Control, "Trigger Detection")
            .description("Outputs the value of the input that triggered it")
            .input(SocketDescriptor::new(Self::PORT_DEPENDENCY_INPUT, SocketType::Any).dependency())
            .input(SocketDescriptor::new(Self::PORT_TRIGGER_INPUT, SocketType::Any).do_not_wait())
            .output(SocketDescriptor::new(Self::PORT_TRIGGER_SOURCE, SocketType::Text))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(
    TriggerDetectionNode::descriptor,
    || Box::new(TriggerDetectionNode)
));

#[async_trait]
impl Node for TriggerDetectionNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let source = match inputs.take(Self::PORT_TRIGGER_INPUT) {
            Some(trigger) if !trigger.is_null() => trigger,
            _ => inputs.take(Self::PORT_DEPENDENCY_INPUT).unwrap_or(Value::Null),
        };
        log::debug!("TriggerDetectionNode {}: {}", ctx.node_id(), source);
        Ok(ExecutionResult::new(vec![Output::Value(source)]))
    }
}
