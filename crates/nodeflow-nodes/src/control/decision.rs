//! Decision Node
//!
//! Routes an input value to one of two outputs based on a comparison.
//! The output not taken is skipped, so nothing downstream of it fires.

use std::cmp::Ordering;

use async_trait::async_trait;
use nodeflow_engine::{
    as_number, display_value, DescribeNode, EngineError, ExecutionContext, ExecutionResult, Node,
    NodeCategory, NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType,
    WidgetDescriptor,
};
use serde_json::Value;

/// Comparison operator selected by the `operator` widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparison {
    pub const SYMBOLS: [&'static str; 6] = ["==", "!=", ">", "<", ">=", "<="];

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            ">" => Some(Self::Greater),
            "<" => Some(Self::Less),
            ">=" => Some(Self::GreaterOrEqual),
            "<=" => Some(Self::LessOrEqual),
            _ => None,
        }
    }

    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Equal, Some(o)) => o == Ordering::Equal,
            (Self::NotEqual, o) => o != Some(Ordering::Equal),
            (Self::Greater, Some(o)) => o == Ordering::Greater,
            (Self::Less, Some(o)) => o == Ordering::Less,
            (Self::GreaterOrEqual, Some(o)) => o != Ordering::Less,
            (Self::LessOrEqual, Some(o)) => o != Ordering::Greater,
            // NaN compares false with everything
            (_, None) => false,
        }
    }

    /// Compare numerically when both sides are numbers, else as text.
    pub fn evaluate(self, left: &Value, right: &Value) -> bool {
        let ordering = match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(display_value(left).cmp(&display_value(right))),
        };
        self.holds(ordering)
    }
}

/// Decision Node
///
/// # Inputs
/// - `input_value` - Value to route
/// - `comparison_value` - Right-hand side of the comparison
///
/// # Outputs
/// - `true_output` - `input_value` when the comparison holds
/// - `false_output` - `input_value` otherwise
#[derive(Debug, Default)]
pub struct DecisionNode;

impl DecisionNode {
    pub const PORT_INPUT_VALUE: &'static str = "input_value";
    pub const PORT_COMPARISON_VALUE: &'static str = "comparison_value";
    pub const PORT_TRUE_OUTPUT: &'static str = "true_output";
    pub const PORT_FALSE_OUTPUT: &'static str = "false_output";
    pub const WIDGET_OPERATOR: &'static str = "operator";
}

impl DescribeNode for DecisionNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("DecisionNode", NodeCategory::Control, "Decision")
            .description("Routes a value based on a comparison")
            .input(SocketDescriptor::new(Self::PORT_INPUT_VALUE, SocketType::Number).dependency())
            .input(SocketDescriptor::new(Self::PORT_COMPARISON_VALUE, SocketType::Number).dependency())
            .output(SocketDescriptor::new(Self::PORT_TRUE_OUTPUT, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_FALSE_OUTPUT, SocketType::Any))
            .widget(WidgetDescriptor::combo(Self::WIDGET_OPERATOR, &Comparison::SYMBOLS))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(DecisionNode::descriptor, || {
    Box::new(DecisionNode)
}));

#[async_trait]
impl Node for DecisionNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let symbol = ctx.widgets().text(Self::WIDGET_OPERATOR).unwrap_or("==");
        let comparison = Comparison::parse(symbol)
            .ok_or_else(|| EngineError::failed(format!("Unknown operator '{}'", symbol)))?;

        let value = inputs.take(Self::PORT_INPUT_VALUE).unwrap_or(Value::Null);
        let other = inputs.get(Self::PORT_COMPARISON_VALUE).cloned().unwrap_or(Value::Null);
        let taken = comparison.evaluate(&value, &other);
        log::debug!(
            "DecisionNode {}: {} {} {} is {}",
            ctx.node_id(),
            value,
            symbol,
            other,
            taken
        );

        let outputs = if taken {
            vec![Output::Value(value), Output::Skip]
        } else {
            vec![Output::Skip, Output::Value(value)]
        };
        Ok(ExecutionResult::new(outputs))
    }
}
