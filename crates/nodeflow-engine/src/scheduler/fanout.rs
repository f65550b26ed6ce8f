//! Fan-out: routing execution outputs to downstream input slots
//!
//! Outputs line up with the declared output sockets. Physical slots are
//! numbered by a running counter: one slot per plain socket, one per array
//! element. The graph's output labels play no part in routing. Skipped
//! values produce no push but still consume their slot.

use serde_json::Value;

use crate::node::Output;
use crate::run_context::{NodeSpec, PushedInput, RunLayout};
use crate::types::NodeId;

/// All pushes for one downstream node, merged into a single activation
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DownstreamBatch {
    pub target: NodeId,
    pub inputs: Vec<PushedInput>,
}

#[derive(Debug, Default)]
pub(crate) struct Routing {
    /// In order of first appearance of each target
    pub batches: Vec<DownstreamBatch>,
    pub warnings: Vec<String>,
}

impl Routing {
    fn push(&mut self, target: &str, input: &str, value: Value) {
        let pushed = PushedInput::new(input, value);
        match self.batches.iter_mut().find(|b| b.target == target) {
            Some(batch) => batch.inputs.push(pushed),
            None => self.batches.push(DownstreamBatch {
                target: target.to_string(),
                inputs: vec![pushed],
            }),
        }
    }
}

pub(crate) fn route_outputs(layout: &RunLayout, spec: &NodeSpec, outputs: &[Output]) -> Routing {
    let mut routing = Routing::default();
    let mut counter = 0usize;

    if outputs.len() > spec.descriptor.outputs.len() {
        routing.warnings.push(format!(
            "{} returned {} outputs but declares {}; extra outputs ignored",
            spec.node_type,
            outputs.len(),
            spec.descriptor.outputs.len()
        ));
    }

    for (socket, output) in spec.descriptor.outputs.iter().zip(outputs) {
        if !socket.array {
            let slot = counter;
            counter += 1;
            let value = match output {
                Output::Skip => continue,
                Output::Value(value) => value.clone(),
                Output::Items(_) => output.to_report(),
            };
            deliver(layout, spec, slot, value, &mut routing);
            continue;
        }

        let elements: Vec<Output> = match output {
            Output::Skip => Vec::new(),
            Output::Items(items) => items.clone(),
            Output::Value(Value::Array(values)) => values.iter().cloned().map(Output::Value).collect(),
            Output::Value(other) => {
                routing.warnings.push(format!(
                    "Output '{}' of {} is an array socket but got a single value",
                    socket.name, spec.node_type
                ));
                vec![Output::Value(other.clone())]
            }
        };

        for element in &elements {
            let slot = counter;
            counter += 1;
            let value = match element {
                Output::Skip => continue,
                Output::Value(value) => value.clone(),
                Output::Items(_) => element.to_report(),
            };
            deliver(layout, spec, slot, value, &mut routing);
        }
    }

    routing
}

fn deliver(layout: &RunLayout, spec: &NodeSpec, slot: usize, value: Value, routing: &mut Routing) {
    for (target_id, target_slot) in layout.links.targets_of(&spec.id, slot) {
        let input = layout.node(target_id).and_then(|t| t.input_name(*target_slot));
        match input {
            Some(input) => routing.push(target_id, input, value.clone()),
            None => routing.warnings.push(format!(
                "Link from node {} slot {} points at missing input slot {} of node {}",
                spec.id, slot, target_slot, target_id
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NodeDescriptor, SocketDescriptor};
    use crate::error::Result;
    use crate::graph::{GraphLink, GraphNode, WorkflowGraph};
    use crate::node::{ExecutionContext, ExecutionResult, Node, NodeInputs};
    use crate::registry::NodeRegistry;
    use crate::run_context::instantiate;
    use crate::types::{NodeCategory, SocketType};
    use async_trait::async_trait;
    use serde_json::json;

    struct Nop;

    #[async_trait]
    impl Node for Nop {
        async fn execute(
            &mut self,
            _inputs: NodeInputs,
            _ctx: &mut ExecutionContext<'_>,
        ) -> Result<ExecutionResult> {
            Ok(ExecutionResult::empty())
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeDescriptor::new("Split", NodeCategory::Array, "Split")
                .output(SocketDescriptor::new("first", SocketType::Any))
                .output(SocketDescriptor::new("arr", SocketType::Any).array())
                .output(SocketDescriptor::new("last", SocketType::Any)),
            || -> Box<dyn Node> { Box::new(Nop) },
        );
        registry.register(
            NodeDescriptor::new("Sink", NodeCategory::Output, "Sink")
                .input(SocketDescriptor::new("x", SocketType::Any))
                .input(SocketDescriptor::new("y", SocketType::Any)),
            || -> Box<dyn Node> { Box::new(Nop) },
        );
        registry
    }

    fn route(graph: &WorkflowGraph, outputs: &[Output]) -> Routing {
        let (layout, _) = instantiate("run", graph, &registry()).unwrap();
        let spec = layout.node("1").unwrap().clone();
        route_outputs(&layout, &spec, outputs)
    }

    #[test]
    fn test_slots_and_batching() {
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Split").with_outputs(&["first", "arr_0", "arr_1", "last"]),
                GraphNode::new("2", "Sink").with_inputs(&["x", "y"]),
                GraphNode::new("3", "Sink").with_inputs(&["x", "y"]),
            ],
            links: vec![
                GraphLink::new(1, "1", 0, "2", 0),
                GraphLink::new(2, "1", 2, "2", 1),
                GraphLink::new(3, "1", 3, "3", 0),
            ],
        };
        let routing = route(
            &graph,
            &[
                Output::Value(json!("f")),
                Output::items([Output::Value(json!("a0")), Output::Value(json!("a1"))]),
                Output::Value(json!("l")),
            ],
        );
        assert!(routing.warnings.is_empty());
        assert_eq!(
            routing.batches,
            vec![
                DownstreamBatch {
                    target: "2".into(),
                    inputs: vec![PushedInput::new("x", json!("f")), PushedInput::new("y", json!("a1"))],
                },
                DownstreamBatch {
                    target: "3".into(),
                    inputs: vec![PushedInput::new("x", json!("l"))],
                },
            ]
        );
    }

    #[test]
    fn test_skip_element_still_advances_counter() {
        // no output names: positional counter
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Split"),
                GraphNode::new("2", "Sink").with_inputs(&["x", "y"]),
            ],
            links: vec![
                GraphLink::new(1, "1", 1, "2", 0),
                GraphLink::new(2, "1", 2, "2", 1),
            ],
        };
        let routing = route(
            &graph,
            &[
                Output::Skip,
                Output::items([Output::Skip, Output::Value(json!("kept"))]),
            ],
        );
        assert_eq!(routing.batches.len(), 1);
        assert_eq!(routing.batches[0].inputs, vec![PushedInput::new("y", json!("kept"))]);
    }

    #[test]
    fn test_skip_suppresses_plain_socket() {
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Split").with_outputs(&["first", "last"]),
                GraphNode::new("2", "Sink").with_inputs(&["x", "y"]),
            ],
            links: vec![
                GraphLink::new(1, "1", 0, "2", 0),
                GraphLink::new(2, "1", 1, "2", 1),
            ],
        };
        let routing = route(
            &graph,
            &[Output::Skip, Output::items([]), Output::Value(json!(2))],
        );
        assert_eq!(routing.batches[0].inputs, vec![PushedInput::new("y", json!(2))]);
    }

    #[test]
    fn test_scalar_on_array_socket_warns() {
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Split").with_outputs(&["first", "arr_0"]),
                GraphNode::new("2", "Sink").with_inputs(&["x"]),
            ],
            links: vec![GraphLink::new(1, "1", 1, "2", 0)],
        };
        let routing = route(&graph, &[Output::Skip, Output::Value(json!("one"))]);
        assert_eq!(routing.warnings.len(), 1);
        assert_eq!(routing.batches[0].inputs, vec![PushedInput::new("x", json!("one"))]);
    }

    #[test]
    fn test_output_labels_do_not_affect_routing() {
        let graph = WorkflowGraph {
            nodes: vec![
                GraphNode::new("1", "Split").with_outputs(&["value"]),
                GraphNode::new("2", "Sink").with_inputs(&["x"]),
            ],
            links: vec![GraphLink::new(1, "1", 0, "2", 0)],
        };
        let routing = route(&graph, &[Output::Value(json!(5))]);
        assert!(routing.warnings.is_empty());
        assert_eq!(
            routing.batches,
            vec![DownstreamBatch {
                target: "2".into(),
                inputs: vec![PushedInput::new("x", json!(5))],
            }]
        );
    }

    #[test]
    fn test_extra_outputs_warn() {
        let graph = WorkflowGraph {
            nodes: vec![GraphNode::new("1", "Split")],
            links: vec![],
        };
        let outputs = vec![Output::Skip; 4];
        let routing = route(&graph, &outputs);
        assert_eq!(routing.warnings.len(), 1);
        assert!(routing.batches.is_empty());
    }
}
