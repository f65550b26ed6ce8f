//! Accumulator Loop Node
//!
//! Keeps a running total in node memory. After the first execution it
//! re-arms waiting only for `add_value`, so every further push adds to the
//! total while `initial` stays cached.

use async_trait::async_trait;
use nodeflow_engine::{
    as_number, number_value, DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType, StateUpdate,
    WidgetDescriptor,
};

/// Accumulator Loop Node
///
/// # Inputs
/// - `initial` - Starting total (falls back to the `initial_value` widget)
/// - `add_value` - Amount added on each execution
///
/// # Outputs
/// - `result` - The total, while it is below `threshold`
/// - `threshold_reached` - The total, once it reaches `threshold`; the total then resets
#[derive(Debug, Default)]
pub struct AccumulatorLoopNode;

impl AccumulatorLoopNode {
    pub const PORT_INITIAL: &'static str = "initial";
    pub const PORT_ADD_VALUE: &'static str = "add_value";
    pub const PORT_RESULT: &'static str = "result";
    pub const PORT_THRESHOLD_REACHED: &'static str = "threshold_reached";
    pub const WIDGET_INITIAL_VALUE: &'static str = "initial_value";
    pub const WIDGET_THRESHOLD: &'static str = "threshold";
    const MEMORY_TOTAL: &'static str = "total";
}

impl DescribeNode for AccumulatorLoopNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("AccumulatorLoopNode", NodeCategory::Control, "Accumulator Loop")
            .description("Adds incoming values until a threshold is reached")
            .input(SocketDescriptor::new(Self::PORT_INITIAL, SocketType::Number).dependency())
            .input(SocketDescriptor::new(Self::PORT_ADD_VALUE, SocketType::Number))
            .output(SocketDescriptor::new(Self::PORT_RESULT, SocketType::Number))
            .output(SocketDescriptor::new(Self::PORT_THRESHOLD_REACHED, SocketType::Number))
            .widget(WidgetDescriptor::number(Self::WIDGET_INITIAL_VALUE, 0.0))
            .widget(WidgetDescriptor::number(Self::WIDGET_THRESHOLD, 100.0))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(
    AccumulatorLoopNode::descriptor,
    || Box::new(AccumulatorLoopNode)
));

#[async_trait]
impl Node for AccumulatorLoopNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let add = inputs.require_number(Self::PORT_ADD_VALUE)?;
        let threshold = ctx.widgets().number(Self::WIDGET_THRESHOLD).unwrap_or(100.0);

        let start = match ctx.memory().get(Self::MEMORY_TOTAL).and_then(as_number) {
            Some(total) => total,
            None => inputs
                .number(Self::PORT_INITIAL)
                .or_else(|| ctx.widgets().number(Self::WIDGET_INITIAL_VALUE))
                .unwrap_or(0.0),
        };
        let total = start + add;
        let reached = total >= threshold;
        log::debug!(
            "AccumulatorLoopNode {}: {} + {} = {} (threshold {})",
            ctx.node_id(),
            start,
            add,
            total,
            threshold
        );

        let outputs = if reached {
            ctx.memory_mut().remove(Self::MEMORY_TOTAL);
            vec![Output::Skip, Output::Value(number_value(total))]
        } else {
            ctx.memory_mut()
                .insert(Self::MEMORY_TOTAL.to_string(), number_value(total));
            vec![Output::Value(number_value(total)), Output::Skip]
        };
        Ok(ExecutionResult::new(outputs).with_state_update(StateUpdate::wait_for([Self::PORT_ADD_VALUE])))
    }
}
