//! Serialized workflow graphs
//!
//! The graph format is the node-editor one: a node list with physical
//! input/output slot lists and positional widget values, plus links as
//! `[linkId, sourceId, sourceSlot, targetId, targetSlot, typeTag]` tuples.
//! Node ids may be numbers or strings; both are normalized to strings.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::NodeId;

/// A complete workflow graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Nodes in the graph
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Links connecting node slots
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl WorkflowGraph {
    /// Parse a graph from its JSON form
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get links coming into a node
    pub fn incoming_links<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphLink> + 'a {
        self.links.iter().filter(move |l| l.target_id == node_id)
    }

    /// Get links going out of a node
    pub fn outgoing_links<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphLink> + 'a {
        self.links.iter().filter(move |l| l.source_id == node_id)
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    #[serde(deserialize_with = "deserialize_node_id")]
    pub id: NodeId,
    /// Node type, optionally prefixed with a category path
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Physical input slots
    #[serde(default)]
    pub inputs: Vec<GraphSlot>,
    /// Physical output slots
    #[serde(default)]
    pub outputs: Vec<GraphSlot>,
    /// Widget values in declaration order
    #[serde(default, alias = "widgets_values")]
    pub widgets_values: Vec<Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            title: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets_values: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        self.inputs = names.iter().map(|n| GraphSlot::new(*n)).collect();
        self
    }

    pub fn with_outputs(mut self, names: &[&str]) -> Self {
        self.outputs = names.iter().map(|n| GraphSlot::new(*n)).collect();
        self
    }

    pub fn with_widgets(mut self, values: Vec<Value>) -> Self {
        self.widgets_values = values;
        self
    }

    /// Registered type name: the last `/`-separated segment of `type`
    pub fn type_name(&self) -> &str {
        self.node_type.rsplit('/').next().unwrap_or(&self.node_type)
    }

    /// Title if set, otherwise the type name
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| self.type_name())
    }

    pub fn input_name(&self, slot: usize) -> Option<&str> {
        self.inputs.get(slot).map(|s| s.name.as_str())
    }

    pub fn output_slot(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }
}

/// One physical socket slot of a graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSlot {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<Value>,
}

impl GraphSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: None,
        }
    }
}

/// A directed link between two physical slots
#[derive(Debug, Clone, PartialEq)]
pub struct GraphLink {
    pub id: Value,
    pub source_id: NodeId,
    pub source_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
    pub type_tag: Value,
}

impl GraphLink {
    pub fn new(
        id: u64,
        source_id: impl Into<String>,
        source_slot: usize,
        target_id: impl Into<String>,
        target_slot: usize,
    ) -> Self {
        Self {
            id: Value::from(id),
            source_id: source_id.into(),
            source_slot,
            target_id: target_id.into(),
            target_slot,
            type_tag: Value::from("*"),
        }
    }
}

impl Serialize for GraphLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (
            &self.id,
            &self.source_id,
            self.source_slot,
            &self.target_id,
            self.target_slot,
            &self.type_tag,
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GraphLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let RawLink(id, source, source_slot, target, target_slot, type_tag) =
            RawLink::deserialize(deserializer)?;
        Ok(Self {
            id,
            source_id: source.into_id(),
            source_slot,
            target_id: target.into_id(),
            target_slot,
            type_tag,
        })
    }
}

#[derive(Deserialize)]
struct RawLink(Value, RawId, usize, RawId, usize, Value);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Integer(i64),
    Text(String),
}

impl RawId {
    fn into_id(self) -> NodeId {
        match self {
            RawId::Integer(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn deserialize_node_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NodeId, D::Error> {
    Ok(RawId::deserialize(deserializer)?.into_id())
}

/// `(node id, physical slot)`
pub type SlotKey = (NodeId, usize);

/// Forward and reverse link lookup for one graph
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    /// target slot -> source slot
    sources: HashMap<SlotKey, SlotKey>,
    /// source slot -> target slots, in link order
    targets: HashMap<SlotKey, Vec<SlotKey>>,
}

impl LinkIndex {
    pub fn build(graph: &WorkflowGraph) -> Self {
        let mut index = Self::default();
        for link in &graph.links {
            let source = (link.source_id.clone(), link.source_slot);
            let target = (link.target_id.clone(), link.target_slot);
            if let Some(previous) = index.sources.insert(target.clone(), source.clone()) {
                log::warn!(
                    "Input slot {} of node {} has more than one link; keeping {}:{}",
                    target.1,
                    target.0,
                    source.0,
                    source.1
                );
                if let Some(list) = index.targets.get_mut(&previous) {
                    list.retain(|t| t != &target);
                }
            }
            index.targets.entry(source).or_default().push(target);
        }
        index
    }

    /// Upstream slot feeding an input slot
    pub fn source_of(&self, node_id: &str, slot: usize) -> Option<&SlotKey> {
        self.sources.get(&(node_id.to_string(), slot))
    }

    /// Downstream slots fed by an output slot
    pub fn targets_of(&self, node_id: &str, slot: usize) -> &[SlotKey] {
        self.targets
            .get(&(node_id.to_string(), slot))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "nodes": [
            {"id": 1, "type": "Input/NumberNode", "outputs": [{"name": "number_out", "type": "NUMBER"}], "widgets_values": [5]},
            {"id": "2", "type": "NumberNode", "widgetsValues": [7]},
            {"id": 3, "type": "Math/AddNode", "title": "Sum",
             "inputs": [{"name": "a", "type": "NUMBER", "link": 1}, {"name": "b", "link": 2}],
             "outputs": [{"name": "result"}]}
        ],
        "links": [[1, 1, 0, 3, 0, "NUMBER"], [2, "2", 0, 3, 1, "NUMBER"]]
    }"#;

    #[test]
    fn test_parse_mixed_ids_and_aliases() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].id, "1");
        assert_eq!(graph.nodes[0].widgets_values, vec![Value::from(5)]);
        assert_eq!(graph.nodes[1].widgets_values, vec![Value::from(7)]);
        assert_eq!(graph.links[1].source_id, "2");
        assert_eq!(graph.links[1].target_slot, 1);
    }

    #[test]
    fn test_type_name_strips_category() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        assert_eq!(graph.nodes[0].type_name(), "NumberNode");
        assert_eq!(graph.nodes[1].type_name(), "NumberNode");
        assert_eq!(graph.nodes[2].display_name(), "Sum");
        assert_eq!(graph.nodes[1].display_name(), "NumberNode");
    }

    #[test]
    fn test_link_index() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        let index = LinkIndex::build(&graph);
        assert_eq!(index.source_of("3", 1), Some(&("2".to_string(), 0)));
        assert_eq!(index.targets_of("1", 0), &[("3".to_string(), 0)]);
        assert!(index.targets_of("3", 0).is_empty());
        assert!(index.source_of("1", 0).is_none());
    }

    #[test]
    fn test_duplicate_input_link_keeps_last() {
        let mut graph = WorkflowGraph::default();
        graph.links.push(GraphLink::new(1, "a", 0, "c", 0));
        graph.links.push(GraphLink::new(2, "b", 0, "c", 0));
        let index = LinkIndex::build(&graph);
        assert_eq!(index.source_of("c", 0), Some(&("b".to_string(), 0)));
        assert!(index.targets_of("a", 0).is_empty());
    }

    #[test]
    fn test_link_serializes_as_tuple() {
        let link = GraphLink::new(4, "1", 0, "2", 1);
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json, serde_json::json!([4, "1", 0, "2", 1, "*"]));
        let back: GraphLink = serde_json::from_value(json).unwrap();
        assert_eq!(back, link);
    }

    #[test]
    fn test_incoming_and_outgoing() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        assert_eq!(graph.incoming_links("3").count(), 2);
        assert_eq!(graph.outgoing_links("1").count(), 1);
        assert!(graph.find_node("4").is_none());
    }
}
