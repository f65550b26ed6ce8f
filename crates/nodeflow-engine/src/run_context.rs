//! Mutable state of one run
//!
//! A run is instantiated from a graph once: every graph node gets a fresh
//! node instance, bound widget values and a link-derived list of the input
//! slots that have an upstream. The immutable part (`RunLayout`) is shared by
//! all activations; the mutable part (`RunContext`) lives behind the
//! scheduler's mutex and is only touched in short synchronous sections.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::descriptor::NodeDescriptor;
use crate::error::{EngineError, Result};
use crate::graph::{LinkIndex, SlotKey, WorkflowGraph};
use crate::node::{LoadContext, Memory, Node, Output, StateUpdate, WidgetValues};
use crate::registry::NodeRegistry;
use crate::types::NodeId;

/// Lifecycle state of a node within one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRunState {
    #[default]
    Pending,
    Waiting,
    Executing,
    Done,
    Error,
}

/// A cached input value tagged with the run that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CachedInput {
    pub value: Value,
    pub run_id: String,
}

/// Wait-set template installed by a `StateUpdate`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitTemplate {
    pub wait_for: Vec<String>,
    pub force_wait: Vec<String>,
}

impl From<StateUpdate> for WaitTemplate {
    fn from(update: StateUpdate) -> Self {
        Self {
            wait_for: update.wait_for_inputs,
            force_wait: update.do_wait_inputs,
        }
    }
}

/// A value pushed into a logical input
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PushedInput {
    pub input: String,
    pub value: Value,
}

impl PushedInput {
    pub fn new(input: impl Into<String>, value: Value) -> Self {
        Self {
            input: input.into(),
            value,
        }
    }
}

/// An input slot that has an upstream link
#[derive(Debug, Clone)]
pub(crate) struct LinkedInput {
    pub name: String,
    pub source: SlotKey,
}

/// Immutable per-run facts about one graph node
pub(crate) struct NodeSpec {
    pub id: NodeId,
    pub node_type: String,
    pub descriptor: Arc<NodeDescriptor>,
    pub widgets: WidgetValues,
    /// Physical input slot names from the graph
    pub input_names: Vec<String>,
    pub linked_inputs: Vec<LinkedInput>,
}

impl NodeSpec {
    /// Wait set derived from links: every linked input, in slot order.
    fn static_wait_set(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for linked in &self.linked_inputs {
            if !names.contains(&linked.name) {
                names.push(linked.name.clone());
            }
        }
        names
    }

    pub fn input_name(&self, slot: usize) -> Option<&str> {
        self.input_names.get(slot).map(String::as_str)
    }
}

/// A node's behaviour plus the memory it owns across re-executions
pub struct NodeInstance {
    pub node: Box<dyn Node>,
    pub memory: Memory,
}

/// Mutable scheduler bookkeeping for one node
pub(crate) struct NodeSlot {
    pub state: NodeRunState,
    /// Taken out while the node executes
    pub instance: Option<NodeInstance>,
    pub inputs: HashMap<String, CachedInput>,
    pub waiting_on: Vec<String>,
    pub template: Option<WaitTemplate>,
    pub outputs: Option<Vec<Output>>,
    /// Pushes that arrived while executing, replayed afterwards in order
    pub deferred: VecDeque<Vec<PushedInput>>,
    pub executions: u32,
}

impl NodeSlot {
    fn new(instance: NodeInstance) -> Self {
        Self {
            state: NodeRunState::Pending,
            instance: Some(instance),
            inputs: HashMap::new(),
            waiting_on: Vec::new(),
            template: None,
            outputs: None,
            deferred: VecDeque::new(),
            executions: 0,
        }
    }

    /// Move a PENDING node to WAITING.
    ///
    /// Computes the wait set from the installed template (or the linked
    /// inputs), keeps dependency inputs already cached from this run unless
    /// the template forces them to be awaited, and drops every other cached
    /// value. Returns the upstream nodes to pull: linked dependencies still
    /// in the wait set that the activating push does not supply.
    pub fn arm(&mut self, spec: &NodeSpec, run_id: &str, activating: &[&str]) -> Vec<NodeId> {
        let (wait_for, force_wait) = match &self.template {
            Some(template) => (template.wait_for.clone(), template.force_wait.clone()),
            None => (spec.static_wait_set(), Vec::new()),
        };
        let descriptor = &spec.descriptor;

        self.inputs.retain(|name, cached| {
            cached.run_id == run_id && descriptor.is_dependency(name) && !force_wait.contains(name)
        });

        self.waiting_on.clear();
        for name in wait_for {
            if descriptor.waits_on(&name)
                && !self.inputs.contains_key(&name)
                && !self.waiting_on.contains(&name)
            {
                self.waiting_on.push(name);
            }
        }
        self.state = NodeRunState::Waiting;

        let mut pulls: Vec<NodeId> = Vec::new();
        for linked in &spec.linked_inputs {
            let name = linked.name.as_str();
            if self.waiting_on.iter().any(|w| w == name)
                && descriptor.is_dependency(name)
                && !force_wait.iter().any(|f| f == name)
                && !activating.contains(&name)
                && !pulls.contains(&linked.source.0)
            {
                pulls.push(linked.source.0.clone());
            }
        }
        pulls
    }

    /// Merge pushed values into the cache and shrink the wait set.
    pub fn merge(&mut self, pushed: Vec<PushedInput>, run_id: &str) {
        for PushedInput { input, value } in pushed {
            self.waiting_on.retain(|w| w != &input);
            self.inputs.insert(
                input,
                CachedInput {
                    value,
                    run_id: run_id.to_string(),
                },
            );
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == NodeRunState::Waiting && self.waiting_on.is_empty()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let mut cached_inputs: Vec<String> = self.inputs.keys().cloned().collect();
        cached_inputs.sort();
        NodeSnapshot {
            state: self.state,
            waiting_on: self.waiting_on.clone(),
            cached_inputs,
            outputs: self.outputs.clone(),
            template: self.template.clone(),
            executions: self.executions,
        }
    }
}

/// Point-in-time view of a node's scheduler state
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub state: NodeRunState,
    pub waiting_on: Vec<String>,
    pub cached_inputs: Vec<String>,
    pub outputs: Option<Vec<Output>>,
    pub template: Option<WaitTemplate>,
    pub executions: u32,
}

/// Immutable graph-derived layout shared by every activation of a run
pub(crate) struct RunLayout {
    pub nodes: HashMap<NodeId, Arc<NodeSpec>>,
    pub links: LinkIndex,
}

impl RunLayout {
    pub fn node(&self, node_id: &str) -> Option<&Arc<NodeSpec>> {
        self.nodes.get(node_id)
    }
}

/// Mutable state of one run
pub(crate) struct RunContext {
    pub slots: HashMap<NodeId, NodeSlot>,
}

/// Instantiate every graph node for a new run.
///
/// Fails before anything executes when a node type is unknown or a node's
/// `load` fails.
pub(crate) fn instantiate(
    run_id: &str,
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
) -> Result<(RunLayout, RunContext)> {
    let links = LinkIndex::build(graph);
    let mut nodes = HashMap::new();
    let mut slots = HashMap::new();

    for graph_node in &graph.nodes {
        let node_type = graph_node.type_name();
        let (descriptor, mut node) =
            registry
                .create(node_type)
                .ok_or_else(|| EngineError::UnknownNodeType {
                    node_id: graph_node.id.clone(),
                    node_type: node_type.to_string(),
                })?;

        let widgets = WidgetValues::bind(&descriptor.widgets, &graph_node.widgets_values);
        node.load(&LoadContext {
            node_id: &graph_node.id,
            widgets: &widgets,
        })
        .map_err(|e| EngineError::LoadFailed {
            node_id: graph_node.id.clone(),
            message: e.to_string(),
        })?;

        let input_names: Vec<String> = graph_node.inputs.iter().map(|s| s.name.clone()).collect();
        let linked_inputs = input_names
            .iter()
            .enumerate()
            .filter_map(|(slot, name)| {
                links.source_of(&graph_node.id, slot).map(|source| LinkedInput {
                    name: name.clone(),
                    source: source.clone(),
                })
            })
            .collect();

        let spec = NodeSpec {
            id: graph_node.id.clone(),
            node_type: node_type.to_string(),
            descriptor,
            widgets,
            input_names,
            linked_inputs,
        };
        if nodes.insert(graph_node.id.clone(), Arc::new(spec)).is_some() {
            log::warn!("Duplicate node id {} in graph; keeping the last one", graph_node.id);
        }
        slots.insert(
            graph_node.id.clone(),
            NodeSlot::new(NodeInstance {
                node,
                memory: Memory::new(),
            }),
        );
    }

    log::debug!("Instantiated {} node(s) for run {}", slots.len(), run_id);
    Ok((
        RunLayout { nodes, links },
        RunContext { slots },
    ))
}
