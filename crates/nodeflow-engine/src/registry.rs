//! Node type registry for dynamic node resolution
//!
//! Maps node type strings to their descriptor and a factory that creates a
//! fresh instance per run. Built-in node types submit a [`NodeRegistration`]
//! at link time:
//!
//! ```ignore
//! inventory::submit!(nodeflow_engine::NodeRegistration::new(
//!     AddNode::descriptor,
//!     || Box::new(AddNode::default()),
//! ));
//!
//! let registry = NodeRegistry::with_builtins();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::NodeDescriptor;
use crate::node::Node;
use crate::types::NodeCategory;

/// Factory for creating node instances
pub trait NodeFactory: Send + Sync {
    fn create(&self) -> Box<dyn Node>;
}

impl<F> NodeFactory for F
where
    F: Fn() -> Box<dyn Node> + Send + Sync,
{
    fn create(&self) -> Box<dyn Node> {
        self()
    }
}

/// Link-time registration of a node type
pub struct NodeRegistration {
    pub descriptor: fn() -> NodeDescriptor,
    pub create: fn() -> Box<dyn Node>,
}

impl NodeRegistration {
    pub const fn new(descriptor: fn() -> NodeDescriptor, create: fn() -> Box<dyn Node>) -> Self {
        Self { descriptor, create }
    }
}

inventory::collect!(NodeRegistration);

/// A registration entry combining a descriptor with its factory
struct RegistryEntry {
    descriptor: Arc<NodeDescriptor>,
    factory: Arc<dyn NodeFactory>,
}

/// Registry of node types with their descriptors and factories
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every node type submitted through `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            registry.register((registration.descriptor)(), registration.create);
        }
        log::debug!("Collected {} built-in node types", registry.entries.len());
        registry
    }

    /// Register a node type; a later registration of the same type wins
    pub fn register(&mut self, descriptor: NodeDescriptor, factory: impl NodeFactory + 'static) {
        if self.entries.contains_key(&descriptor.node_type) {
            log::debug!("Replacing registration for node type '{}'", descriptor.node_type);
        }
        self.entries.insert(
            descriptor.node_type.clone(),
            RegistryEntry {
                descriptor: Arc::new(descriptor),
                factory: Arc::new(factory),
            },
        );
    }

    /// Get the descriptor for a node type
    pub fn descriptor(&self, node_type: &str) -> Option<Arc<NodeDescriptor>> {
        self.entries.get(node_type).map(|e| Arc::clone(&e.descriptor))
    }

    /// Create a fresh instance of a node type together with its descriptor
    pub fn create(&self, node_type: &str) -> Option<(Arc<NodeDescriptor>, Box<dyn Node>)> {
        self.entries
            .get(node_type)
            .map(|e| (Arc::clone(&e.descriptor), e.factory.create()))
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Every descriptor, ordered by category then type, for UI palettes
    pub fn blueprints(&self) -> Vec<&NodeDescriptor> {
        let mut all: Vec<&NodeDescriptor> = self.entries.values().map(|e| e.descriptor.as_ref()).collect();
        all.sort_by(|a, b| (a.category, &a.node_type).cmp(&(b.category, &b.node_type)));
        all
    }

    /// Get descriptors grouped by category
    pub fn descriptors_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeDescriptor>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeDescriptor>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.descriptor.category)
                .or_default()
                .push(entry.descriptor.as_ref());
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SocketDescriptor;
    use crate::error::Result;
    use crate::node::{ExecutionContext, ExecutionResult, NodeInputs, Output};
    use crate::types::SocketType;
    use async_trait::async_trait;

    struct EchoNode;

    #[async_trait]
    impl Node for EchoNode {
        async fn execute(
            &mut self,
            mut inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            let value = inputs.take("value").unwrap_or_default();
            Ok(ExecutionResult::new(vec![Output::Value(value)]))
        }
    }

    fn test_descriptor(node_type: &str) -> NodeDescriptor {
        NodeDescriptor::new(node_type, NodeCategory::Control, format!("Test {}", node_type))
            .input(SocketDescriptor::new("value", SocketType::Any))
            .output(SocketDescriptor::new("value", SocketType::Any))
    }

    fn echo() -> Box<dyn Node> {
        Box::new(EchoNode)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register(test_descriptor("EchoNode"), echo);

        assert!(registry.has_node_type("EchoNode"));
        assert!(!registry.has_node_type("unknown"));
        assert_eq!(registry.descriptor("EchoNode").unwrap().label, "Test EchoNode");
        assert!(registry.create("EchoNode").is_some());
        assert!(registry.create("unknown").is_none());
    }

    #[test]
    fn test_blueprints_are_ordered() {
        let mut registry = NodeRegistry::new();
        let mut input = test_descriptor("ZNumber");
        input.category = NodeCategory::Input;
        registry.register(input, echo);
        registry.register(test_descriptor("BControl"), echo);
        registry.register(test_descriptor("AControl"), echo);

        let types: Vec<&str> = registry.blueprints().iter().map(|d| d.node_type.as_str()).collect();
        assert_eq!(types, vec!["ZNumber", "AControl", "BControl"]);
        assert_eq!(registry.node_types(), vec!["AControl", "BControl", "ZNumber"]);
    }

    #[test]
    fn test_descriptors_by_category() {
        let mut registry = NodeRegistry::new();
        let mut input = test_descriptor("number");
        input.category = NodeCategory::Input;
        registry.register(input, echo);
        registry.register(test_descriptor("echo"), echo);

        let grouped = registry.descriptors_by_category();
        assert_eq!(grouped.get(&NodeCategory::Input).unwrap().len(), 1);
        assert_eq!(grouped.get(&NodeCategory::Control).unwrap().len(), 1);
    }

    #[test]
    fn test_closure_factory() {
        let mut registry = NodeRegistry::new();
        registry.register(test_descriptor("closure"), || -> Box<dyn Node> { Box::new(EchoNode) });
        assert!(registry.create("closure").is_some());
    }
}
