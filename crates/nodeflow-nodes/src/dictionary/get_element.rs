//! Dictionary lookup

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, MessageKind, Node, NodeCategory, NodeDescriptor, NodeInputs,
    Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Value};

/// Looks up the key named by its `key_to_get` widget
///
/// Exactly one output fires: `value` on a hit, `error` otherwise.
///
/// # Inputs
/// - `dictionary` - Dictionary to read (pulled)
///
/// # Outputs
/// - `value` - The stored value
/// - `error` - Why the lookup failed
#[derive(Debug, Default)]
pub struct DictionaryGetElementNode;

impl DictionaryGetElementNode {
    pub const PORT_DICTIONARY: &'static str = "dictionary";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_ERROR: &'static str = "error";
    pub const WIDGET_KEY: &'static str = "key_to_get";

    fn lookup(dictionary: &Value, key: &str) -> std::result::Result<Value, String> {
        let Value::Object(map) = dictionary else {
            return Err(format!("Expected dictionary input, got {}", type_name(dictionary)));
        };
        if key.trim().is_empty() {
            return Err("Key cannot be empty".to_string());
        }
        map.get(key)
            .cloned()
            .ok_or_else(|| format!("Key '{}' not found in dictionary", key))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DescribeNode for DictionaryGetElementNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("DictionaryGetElementNode", NodeCategory::Dictionary, "Get Element")
            .description("Reads one key of a dictionary")
            .input(SocketDescriptor::new(Self::PORT_DICTIONARY, SocketType::Dictionary).dependency())
            .output(SocketDescriptor::new(Self::PORT_VALUE, SocketType::Any))
            .output(SocketDescriptor::new(Self::PORT_ERROR, SocketType::Text))
            .widget(WidgetDescriptor::text(Self::WIDGET_KEY, "name"))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(DictionaryGetElementNode::descriptor, || {
    Box::new(DictionaryGetElementNode)
}));

#[async_trait]
impl Node for DictionaryGetElementNode {
    async fn execute(&mut self, inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let key = ctx.widgets().text(Self::WIDGET_KEY).unwrap_or_default();
        let dictionary = inputs.get(Self::PORT_DICTIONARY).unwrap_or(&Value::Null);

        let outputs = match Self::lookup(dictionary, key) {
            Ok(value) => vec![Output::Value(value), Output::Skip],
            Err(message) => {
                log::debug!("DictionaryGetElementNode {}: {}", ctx.node_id(), message);
                ctx.send_message(MessageKind::Error, json!({ "message": message }));
                vec![Output::Skip, Output::Value(Value::String(message))]
            }
        };
        Ok(ExecutionResult::new(outputs))
    }
}
