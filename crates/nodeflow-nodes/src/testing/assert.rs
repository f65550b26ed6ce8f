//! Assert Node
//!
//! Compares `actual` with `expected` and reports the outcome as a `Test`
//! message, which is what the graph test runner counts.

use async_trait::async_trait;
use nodeflow_engine::{
    as_number, display_value, number_value, DescribeNode, EngineError, ExecutionContext, ExecutionResult,
    MessageKind, Node, NodeCategory, NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor,
    SocketType,
};
use serde_json::{json, Value};

/// Assert Node
///
/// Values compare numerically when both parse as numbers, as text otherwise.
/// A mismatch fails the node with `AssertionFailed`.
///
/// # Inputs
/// - `actual` - Value under test
/// - `expected` - Expected value
///
/// # Outputs
/// - `on_success` - `actual`, when it matched
/// - `on_failure` - never fires; the node fails instead
#[derive(Debug, Default)]
pub struct AssertNode;

impl AssertNode {
    pub const PORT_ACTUAL: &'static str = "actual";
    pub const PORT_EXPECTED: &'static str = "expected";
    pub const PORT_ON_SUCCESS: &'static str = "on_success";
    pub const PORT_ON_FAILURE: &'static str = "on_failure";
    pub const STATUS_SUCCESS: &'static str = "SUCCESS";
    pub const STATUS_FAILURE: &'static str = "FAILURE";
}

impl DescribeNode for AssertNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("AssertNode", NodeCategory::Testing, "Assert")
            .description("Fails when a value does not match the expected value")
            .input(SocketDescriptor::new(Self::PORT_ACTUAL, SocketType::Any))
            .input(SocketDescriptor::new(Self::PORT_EXPECTED, SocketType::Any).dependency())
            .output(SocketDescriptor::new(Self::PORT_ON_SUCCESS, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_ON_FAILURE, SocketType::Any))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(AssertNode::descriptor, || {
    Box::new(AssertNode)
}));

/// Number when both sides are numeric, text otherwise
fn normalize(actual: &Value, expected: &Value) -> (Value, Value) {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => (number_value(a), number_value(e)),
        _ => (
            Value::String(display_value(actual)),
            Value::String(display_value(expected)),
        ),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => a == e,
        _ => actual == expected,
    }
}

#[async_trait]
impl Node for AssertNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let actual = inputs.take(Self::PORT_ACTUAL).unwrap_or(Value::Null);
        let expected = inputs.take(Self::PORT_EXPECTED).unwrap_or(Value::Null);
        let (actual_val, expected_val) = normalize(&actual, &expected);
        let is_match = values_equal(&actual_val, &expected_val);
        let status = if is_match {
            Self::STATUS_SUCCESS
        } else {
            Self::STATUS_FAILURE
        };

        log::info!(
            "AssertNode {}: actual={} expected={} -> {}",
            ctx.node_id(),
            actual_val,
            expected_val,
            status
        );
        ctx.send_message(
            MessageKind::Test,
            json!({ "status": status, "actual": actual_val, "expected": expected_val }),
        );

        if !is_match {
            return Err(EngineError::AssertionFailed(format!(
                "Actual value '{}' does not match expected value '{}'.",
                display_value(&actual_val),
                display_value(&expected_val)
            )));
        }
        Ok(ExecutionResult::new(vec![Output::Value(actual), Output::Skip]))
    }
}
