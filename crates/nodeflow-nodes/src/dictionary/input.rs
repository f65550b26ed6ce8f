//! Dictionary constant

use async_trait::async_trait;
use nodeflow_engine::{
    DescribeNode, ExecutionContext, ExecutionResult, MessageKind, Node, NodeCategory, NodeDescriptor, NodeInputs,
    Output, Result, SocketDescriptor, SocketType, WidgetDescriptor,
};
use serde_json::{json, Map, Value};

use super::validate_dictionary;

/// Parses the JSON object in its `json_input` widget
///
/// Bad input is reported as an `Error` message and yields an empty
/// dictionary rather than failing the node.
///
/// # Outputs
/// - `dictionary_out` - The parsed dictionary
#[derive(Debug, Default)]
pub struct DictionaryInputNode;

impl DictionaryInputNode {
    pub const PORT_DICTIONARY_OUT: &'static str = "dictionary_out";
    pub const WIDGET_JSON_INPUT: &'static str = "json_input";
    pub const DEFAULT_JSON: &'static str = r#"{"name": "John", "age": 30, "score": 95.5}"#;

    fn parse(text: &str) -> std::result::Result<Map<String, Value>, String> {
        if text.trim().is_empty() {
            return Err("JSON input cannot be empty".to_string());
        }
        let parsed: Value = serde_json::from_str(text).map_err(|e| format!("Invalid JSON syntax: {}", e))?;
        validate_dictionary(parsed).map_err(|e| format!("Dictionary validation error: {}", e))
    }
}

impl DescribeNode for DictionaryInputNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("DictionaryInputNode", NodeCategory::Input, "Dictionary")
            .description("Provides a dictionary parsed from JSON text")
            .output(SocketDescriptor::new(Self::PORT_DICTIONARY_OUT, SocketType::Dictionary))
            .widget(WidgetDescriptor::text(Self::WIDGET_JSON_INPUT, Self::DEFAULT_JSON))
    }
}

inventory::submit!(nodeflow_engine::NodeRegistration::new(DictionaryInputNode::descriptor, || {
    Box::new(DictionaryInputNode)
}));

#[async_trait]
impl Node for DictionaryInputNode {
    async fn execute(&mut self, _inputs: NodeInputs, ctx: &mut ExecutionContext<'_>) -> Result<ExecutionResult> {
        let text = ctx.widgets().text(Self::WIDGET_JSON_INPUT).unwrap_or_default();
        let dictionary = match Self::parse(text) {
            Ok(map) => map,
            Err(message) => {
                log::warn!("DictionaryInputNode {}: {}", ctx.node_id(), message);
                ctx.send_message(MessageKind::Error, json!({ "message": message }));
                Map::new()
            }
        };
        Ok(ExecutionResult::new(vec![Output::Value(Value::Object(dictionary))]))
    }
}
