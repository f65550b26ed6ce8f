//! Built-in nodes
//!
//! Every node registers itself with `inventory`, so linking this crate is
//! enough for [`NodeRegistry::with_builtins`] to find them.
//!
//! # Categories
//!
//! - **Input**: constant numbers, text and dictionaries
//! - **Math**: arithmetic
//! - **Control**: branching, loops, delays and trigger inspection
//! - **Array**: per-element processing over array sockets
//! - **Dictionary**: key lookups and updates
//! - **Events**: cross-run send, await, receive and return
//! - **Output**: display panels
//! - **Testing**: assertions for graph test suites

pub mod array;
pub mod control;
pub mod dictionary;
pub mod events;
pub mod input;
pub mod math;
pub mod output;
pub mod testing;

#[cfg(test)]
mod test_support;

pub use array::*;
pub use control::*;
pub use dictionary::*;
pub use events::*;
pub use input::*;
pub use math::*;
pub use output::*;
pub use testing::*;

use nodeflow_engine::NodeRegistry;

/// Registry holding every built-in node type
pub fn registry() -> NodeRegistry {
    NodeRegistry::with_builtins()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = registry();
        assert_eq!(registry.len(), 18, "Expected 18 built-in nodes");

        for node_type in [
            "NumberNode",
            "TextNode",
            "AddNode",
            "DecisionNode",
            "AccumulatorLoopNode",
            "PrefixArrayNode",
            "ReceiveEventNode",
            "AssertNode",
            "DictionaryInputNode",
            "DictionarySetElementNode",
        ] {
            assert!(registry.has_node_type(node_type), "missing {}", node_type);
        }
        assert!(registry
            .descriptor("ReceiveEventNode")
            .is_some_and(|d| d.event_source));
    }
}
