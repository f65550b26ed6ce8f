//! Node descriptor trait and metadata types
//!
//! Every node type describes its sockets and widgets through the
//! `DescribeNode` trait. The descriptor is the single source of truth used
//! by the scheduler (socket flags, array grouping), by widget binding
//! (declaration order) and by UI palettes (`NodeRegistry::blueprints`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{split_array_key, NodeCategory, SocketType, WidgetType};

/// Trait for node types that can describe their metadata
///
/// # Example
///
/// ```ignore
/// use nodeflow_engine::{DescribeNode, NodeDescriptor, NodeCategory, SocketDescriptor, SocketType};
///
/// impl DescribeNode for AddNode {
///     fn descriptor() -> NodeDescriptor {
///         NodeDescriptor::new("AddNode", NodeCategory::Math, "Add")
///             .input(SocketDescriptor::new("a", SocketType::Number).dependency())
///             .input(SocketDescriptor::new("b", SocketType::Number).dependency())
///             .output(SocketDescriptor::new("result", SocketType::Number))
///     }
/// }
/// ```
pub trait DescribeNode {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeDescriptor
    where
        Self: Sized;
}

/// Complete metadata for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Unique type identifier (e.g., "AddNode")
    pub node_type: String,
    /// Category for UI grouping
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    #[serde(default)]
    pub description: String,
    /// Input sockets, in declaration order
    #[serde(default)]
    pub inputs: Vec<SocketDescriptor>,
    /// Output sockets, positionally aligned with execution outputs
    #[serde(default)]
    pub outputs: Vec<SocketDescriptor>,
    /// Configuration parameters, bound to graph widget values by position
    #[serde(default)]
    pub widgets: Vec<WidgetDescriptor>,
    /// Whether the node can start runs on incoming events
    #[serde(default)]
    pub event_source: bool,
}

impl NodeDescriptor {
    pub fn new(
        node_type: impl Into<String>,
        category: NodeCategory,
        label: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            category,
            label: label.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets: Vec::new(),
            event_source: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, socket: SocketDescriptor) -> Self {
        self.inputs.push(socket);
        self
    }

    pub fn output(mut self, socket: SocketDescriptor) -> Self {
        self.outputs.push(socket);
        self
    }

    pub fn widget(mut self, widget: WidgetDescriptor) -> Self {
        self.widgets.push(widget);
        self
    }

    /// Mark this node type as an event source
    pub fn event_source(mut self) -> Self {
        self.event_source = true;
        self
    }

    pub fn input_socket(&self, name: &str) -> Option<&SocketDescriptor> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output_socket(&self, name: &str) -> Option<&SocketDescriptor> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// Resolve a cached input key to its declared socket.
    ///
    /// An exact socket name always wins. Otherwise a `base_index` key
    /// resolves to an array element when `base` is a declared array socket.
    pub fn resolve_input(&self, key: &str) -> Option<SocketRef<'_>> {
        if let Some(socket) = self.input_socket(key) {
            return Some(SocketRef::Plain(socket));
        }
        let (base, index) = split_array_key(key)?;
        self.input_socket(base)
            .filter(|socket| socket.array)
            .map(|socket| SocketRef::Element { socket, index })
    }

    /// Whether a logical input name is pulled eagerly before execution.
    pub fn is_dependency(&self, key: &str) -> bool {
        self.resolve_input(key)
            .map(|r| r.socket().is_dependency)
            .unwrap_or(false)
    }

    /// Whether a logical input name holds back execution until it arrives.
    ///
    /// Names the descriptor does not declare still wait.
    pub fn waits_on(&self, key: &str) -> bool {
        self.resolve_input(key)
            .map(|r| !r.socket().do_not_wait)
            .unwrap_or(true)
    }
}

/// A resolved reference from an input key to its socket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SocketRef<'a> {
    /// The key names the socket directly
    Plain(&'a SocketDescriptor),
    /// The key is element `index` of an array socket
    Element {
        socket: &'a SocketDescriptor,
        index: usize,
    },
}

impl<'a> SocketRef<'a> {
    pub fn socket(&self) -> &'a SocketDescriptor {
        match self {
            SocketRef::Plain(socket) => socket,
            SocketRef::Element { socket, .. } => socket,
        }
    }
}

/// Metadata for a socket (input or output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketDescriptor {
    /// Logical socket name
    pub name: String,
    /// Data type tag
    pub data_type: SocketType,
    /// Variable-width socket mapped onto `name_0..name_n` physical slots
    #[serde(default)]
    pub array: bool,
    /// Pulled from upstream before the node runs
    #[serde(default)]
    pub is_dependency: bool,
    /// Accepted when present, never blocks execution
    #[serde(default)]
    pub do_not_wait: bool,
}

impl SocketDescriptor {
    pub fn new(name: impl Into<String>, data_type: SocketType) -> Self {
        Self {
            name: name.into(),
            data_type,
            array: false,
            is_dependency: false,
            do_not_wait: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn dependency(mut self) -> Self {
        self.is_dependency = true;
        self
    }

    pub fn do_not_wait(mut self) -> Self {
        self.do_not_wait = true;
        self
    }
}

/// Declaration of one configuration parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDescriptor {
    pub name: String,
    pub widget_type: WidgetType,
    pub default: Value,
    /// Extra editor properties (options for combos, min/max, ...)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

impl WidgetDescriptor {
    pub fn new(name: impl Into<String>, widget_type: WidgetType, default: Value) -> Self {
        Self {
            name: name.into(),
            widget_type,
            default,
            properties: Value::Null,
        }
    }

    pub fn text(name: impl Into<String>, default: &str) -> Self {
        Self::new(name, WidgetType::Text, Value::from(default))
    }

    pub fn number(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, WidgetType::Number, crate::node::number_value(default))
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, WidgetType::Boolean, Value::Bool(default))
    }

    /// A combo box; the first option is the default
    pub fn combo(name: impl Into<String>, options: &[&str]) -> Self {
        let default = options.first().copied().unwrap_or_default();
        Self::new(name, WidgetType::Combo, Value::from(default))
            .with_properties(serde_json::json!({ "values": options }))
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array_node() -> NodeDescriptor {
        NodeDescriptor::new("ArrayTest", NodeCategory::Array, "Array Test")
            .input(SocketDescriptor::new("in_array", SocketType::Text).array().dependency())
            .input(SocketDescriptor::new("input_value", SocketType::Number))
            .input(SocketDescriptor::new("trigger", SocketType::Any).do_not_wait())
            .output(SocketDescriptor::new("out_array", SocketType::Text).array())
    }

    #[test]
    fn test_socket_builders() {
        let socket = SocketDescriptor::new("a", SocketType::Number).dependency();
        assert!(socket.is_dependency);
        assert!(!socket.array);
        assert!(!socket.do_not_wait);
    }

    #[test]
    fn test_resolve_exact_name_wins() {
        let desc = array_node();
        assert!(matches!(
            desc.resolve_input("input_value"),
            Some(SocketRef::Plain(s)) if s.name == "input_value"
        ));
    }

    #[test]
    fn test_resolve_array_element() {
        let desc = array_node();
        match desc.resolve_input("in_array_3") {
            Some(SocketRef::Element { socket, index }) => {
                assert_eq!(socket.name, "in_array");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert!(desc.is_dependency("in_array_0"));
    }

    #[test]
    fn test_resolve_non_array_base_is_unknown() {
        let desc = array_node();
        assert!(desc.resolve_input("input_value_2").is_none());
        assert!(desc.waits_on("input_value_2"));
        assert!(!desc.is_dependency("input_value_2"));
    }

    #[test]
    fn test_do_not_wait() {
        let desc = array_node();
        assert!(!desc.waits_on("trigger"));
        assert!(desc.waits_on("input_value"));
    }

    #[test]
    fn test_combo_default_is_first_option() {
        let widget = WidgetDescriptor::combo("operator", &["==", "!="]);
        assert_eq!(widget.default, Value::from("=="));
        assert_eq!(widget.properties["values"][1], "!=");
    }

    #[test]
    fn test_descriptor_serialization() {
        let desc = array_node().widget(WidgetDescriptor::text("prefix", "pre-"));
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("nodeType")); // camelCase
        assert!(json.contains("isDependency"));
        assert!(json.contains("doNotWait"));

        let back: NodeDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
