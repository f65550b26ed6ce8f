//! Prefix Array Node
//!
//! Exercises array sockets in both directions: `in_array_0..n` arrive as
//! one ordered list and the result leaves through `out_array_0..n`.

use async_trait::async_trait;
use nodeflow_engine::{
    display_value, DescribeNode, ExecutionContext, ExecutionResult, Node, NodeCategory, NodeDescriptor,
    NodeInputs, Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::Value;

/// Prefix Array Node
///
/// An element equal to `skip` (any case, surrounding blanks ignored)
/// produces a skipped output element.
///
/// # Inputs
/// - `in_array` - Array of texts
///
/// # Outputs
/// - `out_array` - Each text with `prefix` prepended
#[derive(Debug, Default)]
pub struct PrefixArrayNode;

impl PrefixArrayNode {
    pub const PORT_IN_ARRAY: &'static str = "in_array";
    pub const PORT_OUT_ARRAY: &'static str = "out_array";
    pub const WIDGET_PREFIX: &'static str = "prefix";
}

impl DescribeNode for PrefixArrayNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("PrefixArrayNode", NodeCategory::Array, "Prefix Array")
            .description("Prefixes every element of an array")
            .input(
                SocketDescriptor::new(Self::PORT_IN_ARRAY, SocketType::Text)
                    .array()
                    .dependency(),
            )
            .output(SocketDescriptor::new(Self::PORT_OUT_ARRAY, SocketType::Text).array())
            .widget(WidgetDescriptor::text(Self::WIDGET_PREFIX, "pre-"))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(PrefixArrayNode::descriptor, || {
    Box::new(PrefixArrayNode)
}));

fn prefixed(prefix: &str, item: &Value) -> Output {
    let text = display_value(item);
    if text.trim().eq_ignore_ascii_case("skip") {
        Output::Skip
    } else {
        Output::Value(Value::String(format!("{}{}", prefix, text)))
    }
}

#[async_trait]
impl Node for PrefixArrayNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let prefix = ctx.widgets().text(Self::WIDGET_PREFIX).unwrap_or("pre-");
        let items = inputs.array(Self::PORT_IN_ARRAY).unwrap_or_default();
        let out: Vec<Output> = items.iter().map(|item| prefixed(prefix, item)).collect();
        log::debug!("PrefixArrayNode {}: {} element(s)", ctx.node_id(), out.len());
        Ok(ExecutionResult::new(vec![Output::items(out)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use serde_json::json;

    #[tokio::test]
    async fn test_prefix_and_skip() {
        let mut harness = Harness::new::<PrefixArrayNode>(&[json!(">")]);
        let inputs: NodeInputs = [("in_array", json!(["a", " SKIP ", 3]))].into_iter().collect();
        let result = harness.execute(&mut PrefixArrayNode, inputs).await.unwrap();
        assert_eq!(
            result.outputs,
            vec![Output::Items(vec![
                Output::Value(json!(">a")),
                Output::Skip,
                Output::Value(json!(">3")),
            ])]
        );
    }

    #[tokio::test]
    async fn test_missing_array_is_empty() {
        let mut harness = Harness::new::<PrefixArrayNode>(&[]);
        let result = harness.execute(&mut PrefixArrayNode, NodeInputs::new()).await.unwrap();
        assert_eq!(result.outputs, vec![Output::Items(Vec::new())]);
    }
}
