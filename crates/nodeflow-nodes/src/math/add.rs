//! Addition

use async_trait::async_trait;
use nodeflow_engine::{
    number_value, DescribeNode, EngineError, ExecutionContext, ExecutionResult, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType,
};
use serde_json::Value;

/// Adds two numbers
///
/// Both inputs are dependencies, so activating this node pulls them.
/// Integer operands give an integer sum.
///
/// # Inputs
/// - `a`, `b` - Operands
///
/// # Outputs
/// - `result` - `a + b`
#[derive(Debug, Default)]
pub struct AddNode;

impl AddNode {
    pub const PORT_A: &'static str = "a";
    pub const PORT_B: &'static str = "b";
    pub const PORT_RESULT: &'static str = "result";
}

impl DescribeNode for AddNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("AddNode", NodeCategory::Math, "Add")
            .description("Adds two numbers")
            .input(SocketDescriptor::new(Self::PORT_A, SocketType::Number).dependency())
            .input(SocketDescriptor::new(Self::PORT_B, SocketType::Number).dependency())
            .output(SocketDescriptor::new(Self::PORT_RESULT, SocketType::Number))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(AddNode::descriptor, || {
    Box::new(AddNode)
}));

fn add(a: &Value, b: &Value) -> Option<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Value::from(sum));
        }
    }
    let x = nodeflow_engine::as_number(a)?;
    let y = nodeflow_engine::as_number(b)?;
    Some(number_value(x + y))
}

#[async_trait]
impl Node for AddNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let a = inputs.require(Self::PORT_A)?;
        let b = inputs.require(Self::PORT_B)?;
        let sum = add(a, b).ok_or_else(|| {
            EngineError::failed(format!("Cannot add {} and {}", a, b))
        })?;
        log::debug!("AddNode {}: {} + {} = {}", ctx.node_id(), a, b, sum);
        Ok(ExecutionResult::new(vec![Output::Value(sum)]))
    }
}
