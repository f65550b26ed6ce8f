//! Array Flatten Node

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor, NodeInputs, Output,
    Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

/// Collects its array input into one flat list
///
/// Elements that are lists themselves are spliced in. With
/// `single_item_passthrough` a one-element result is emitted bare.
///
/// # Inputs
/// - `inputs` - Array of values or lists
///
/// # Outputs
/// - `string_array` - The flattened list
#[derive(Debug, Default)]
pub struct ArrayFlattenNode;

impl ArrayFlattenNode {
    pub const PORT_INPUTS: &'static str = "inputs";
    pub const PORT_STRING_ARRAY: &'static str = "string_array";
    pub const WIDGET_SINGLE_ITEM_PASSTHROUGH: &'static str = "single_item_passthrough";
}

impl DescribeNode for ArrayFlattenNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("ArrayFlattenNode", NodeCategory::Array, "Array Flatten")
            .description("Flattens dynamic inputs into one array")
            .input(
                SocketDescriptor::new(Self::PORT_INPUTS, SocketType::Any)
                    .array()
                    .dependency(),
            )
            .output(SocketDescriptor::new(Self::PORT_STRING_ARRAY, SocketType::Any))
            .widget(WidgetDescriptor::boolean(Self::WIDGET_SINGLE_ITEM_PASSTHROUGH, true))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(ArrayFlattenNode::descriptor, || {
    Box::new(ArrayFlattenNode)
}));

fn flatten(items: &[Value]) -> Vec<Value> {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(nested) => flat.extend(nested.iter().cloned()),
            other => flat.push(other.clone()),
        }
    }
    flat
}

#[async_trait]
impl Node for ArrayFlattenNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let mut flat = flatten(inputs.array(Self::PORT_INPUTS).unwrap_or_default());
        let passthrough = ctx
            .widgets()
            .boolean(Self::WIDGET_SINGLE_ITEM_PASSTHROUGH)
            .unwrap_or(true);

        let output = if passthrough && flat.len() == 1 {
            flat.remove(0)
        } else {
            Value::Array(flat)
        };
        log::debug!("ArrayFlattenNode {}: {}", ctx.node_id(), output);
        Ok(ExecutionResult::new(vec![Output::Value(output)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use serde_json::json;

    #[test]
    fn test_flatten_one_level() {
        assert_eq!(
            flatten(&[json!("a"), json!(["b", ["c"]]), json!(1)]),
            vec![json!("a"), json!("b"), json!(["c"]), json!(1)]
        );
    }

    #[tokio::test]
    async fn test_single_item_passthrough() {
        let mut harness = Harness::new::<ArrayFlattenNode>(&[]);
        let inputs: NodeInputs = [("inputs", json!([["only"]]))].into_iter().collect();
        let result = harness.execute(&mut ArrayFlattenNode, inputs).await.unwrap();
        assert_eq!(result.outputs, vec![Output::Value(json!("only"))]);
    }

    #[tokio::test]
    async fn test_passthrough_disabled() {
        let mut harness = Harness::new::<ArrayFlattenNode>(&[json!(false)]);
        let inputs: NodeInputs = [("inputs", json!(["only"]))].into_iter().collect();
        let result = harness.execute(&mut ArrayFlattenNode, inputs).await.unwrap();
        assert_eq!(result.outputs, vec![Output::Value(json!(["only"]))]);
    }
}
