//! Dictionary update

use async_trait::async_trait;
use nodeflow_engine::{
    display_value, DescribeNode, ExecutionContext, ExecutionResult, MessageKind, Node, NodeCategory,
    NodeDescriptor, NodeInputs, Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Value};

/// Returns a copy of `dictionary` with `key_to_set` bound to `value`
///
/// Values other than strings and numbers are stored as their text form.
/// A non-dictionary input is passed through untouched.
///
/// # Inputs
/// - `dictionary` - Dictionary to update (pulled)
/// - `value` - Value to store (pulled)
///
/// # Outputs
/// - `updated_dictionary` - The updated copy
#[derive(Debug, Default)]
pub struct DictionarySetElementNode;

impl DictionarySetElementNode {
    pub const PORT_DICTIONARY: &'static str = "dictionary";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_UPDATED: &'static str = "updated_dictionary";
    pub const WIDGET_KEY: &'static str = "key_to_set";
}

impl DescribeNode for DictionarySetElementNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("DictionarySetElementNode", NodeCategory::Dictionary, "Set Element")
            .description("Stores a value under a key of a dictionary")
            .input(SocketDescriptor::new(Self::PORT_DICTIONARY, SocketType::Dictionary).dependency())
            .input(SocketDescriptor::new(Self::PORT_VALUE, SocketType::Any).dependency())
            .output(SocketDescriptor::new(Self::PORT_UPDATED, SocketType::Dictionary))
            .widget(WidgetDescriptor::text(Self::WIDGET_KEY, "new_key"))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(DictionarySetElementNode::descriptor, || {
    Box::new(DictionarySetElementNode)
}));

#[async_trait]
impl Node for DictionarySetElementNode {
    async fn execute(&mut self, mut inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let key = ctx.widgets().text(Self::WIDGET_KEY).unwrap_or_default().to_string();
        let dictionary = inputs.take(Self::PORT_DICTIONARY).unwrap_or(Value::Null);

        let Value::Object(mut map) = dictionary else {
            return Ok(ExecutionResult::new(vec![Output::Value(dictionary)]));
        };
        if key.trim().is_empty() {
            ctx.send_message(MessageKind::Error, json!({ "message": "Key cannot be empty" }));
            return Ok(ExecutionResult::new(vec![Output::Value(Value::Object(map))]));
        }

        let value = match inputs.take(Self::PORT_VALUE).unwrap_or(Value::Null) {
            value @ (Value::String(_) | Value::Number(_)) => value,
            other => Value::String(display_value(&other)),
        };
        map.insert(key, value);
        Ok(ExecutionResult::new(vec![Output::Value(Value::Object(map))]))
    }
}
