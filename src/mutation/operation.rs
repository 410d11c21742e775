//! Edit operations
//!
//! Operations are the structured form of a free-text edit instruction. They
//! serialize as tagged JSON objects (`{"op": "add_node", ...}`), which is the
//! shape the language model is asked to produce.

use crate::graph::{NodeId, NodeUpdate, Position, SceneNode, SemanticType};
use serde::{Deserialize, Serialize};

/// Description of a node to add; the position is optional and filled by the
/// semantic layout when absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Caller-chosen id; allocated by the graph when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "node_type", alias = "type")]
    pub semantic_type: SemanticType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,

    #[serde(default, alias = "is_expandable", skip_serializing_if = "Option::is_none")]
    pub expandable: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        NodeSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, semantic_type: impl Into<SemanticType>) -> Self {
        self.semantic_type = semantic_type.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn terminal(mut self) -> Self {
        self.expandable = Some(false);
        self
    }

    /// Build the node at `position`; an empty id is left for the graph to fill
    pub fn into_node(self, position: Position) -> SceneNode {
        let mut node = SceneNode::new(self.id.unwrap_or_else(|| NodeId::new("")), self.name)
            .with_description(self.description)
            .with_type(self.semantic_type)
            .with_expandable(self.expandable.unwrap_or(true));
        node.position = position;
        if let Some(size) = self.size {
            node = node.with_size(size);
        }
        node.tags = self.tags;
        node
    }
}

impl From<SemanticType> for NodeSpec {
    fn from(semantic_type: SemanticType) -> Self {
        NodeSpec {
            semantic_type,
            ..Default::default()
        }
    }
}

/// A single edit operation
///
/// Node references are ids; the engine also accepts an exact node name
/// when no node carries that id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    AddNode(NodeSpec),

    UpdateNode {
        id: NodeId,
        changes: NodeUpdate,
    },

    RemoveNode {
        id: NodeId,
    },

    AddEdge {
        source: NodeId,
        target: NodeId,
        #[serde(default, alias = "relationship")]
        relation: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        label: String,
    },

    /// Set the relation of every edge joining two nodes
    UpdateEdge {
        source: NodeId,
        target: NodeId,
        #[serde(alias = "relationship")]
        relation: String,
    },

    RemoveEdge {
        source: NodeId,
        target: NodeId,
        #[serde(default, alias = "relationship", skip_serializing_if = "Option::is_none")]
        relation: Option<String>,
    },

    /// Drill down on a node; forwarded to the hierarchy
    Expand {
        id: NodeId,
    },
}

impl Operation {
    pub fn add_node(spec: NodeSpec) -> Self {
        Operation::AddNode(spec)
    }

    pub fn update_node(id: impl Into<NodeId>, changes: NodeUpdate) -> Self {
        Operation::UpdateNode {
            id: id.into(),
            changes,
        }
    }

    pub fn remove_node(id: impl Into<NodeId>) -> Self {
        Operation::RemoveNode { id: id.into() }
    }

    pub fn add_edge(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        relation: impl Into<String>,
    ) -> Self {
        Operation::AddEdge {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            label: String::new(),
        }
    }

    pub fn remove_edge(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Operation::RemoveEdge {
            source: source.into(),
            target: target.into(),
            relation: None,
        }
    }

    pub fn expand(id: impl Into<NodeId>) -> Self {
        Operation::Expand { id: id.into() }
    }

    /// Short operation name, matching the JSON tag
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddNode(_) => "add_node",
            Operation::UpdateNode { .. } => "update_node",
            Operation::RemoveNode { .. } => "remove_node",
            Operation::AddEdge { .. } => "add_edge",
            Operation::UpdateEdge { .. } => "update_edge",
            Operation::RemoveEdge { .. } => "remove_edge",
            Operation::Expand { .. } => "expand",
        }
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self, Operation::Expand { .. })
    }
}

/// Ordered operations derived from one edit instruction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationBatch {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,

    pub operations: Vec<Operation>,
}

impl OperationBatch {
    pub fn new(operations: Vec<Operation>) -> Self {
        OperationBatch {
            summary: String::new(),
            operations,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }
}

impl FromIterator<Operation> for OperationBatch {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        OperationBatch::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_parse_from_tagged_json() {
        let json = r#"{
            "summary": "Add a well",
            "operations": [
                {"op": "add_node", "name": "Old Well", "node_type": "landmark", "is_expandable": false},
                {"op": "add_edge", "source": "Old Well", "target": "plaza", "relationship": "near"},
                {"op": "update_node", "id": "plaza", "changes": {"description": "Busy"}},
                {"op": "remove_edge", "source": "gate", "target": "plaza"},
                {"op": "expand", "id": "tower"}
            ]
        }"#;

        let batch: OperationBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.summary, "Add a well");

        match &batch.operations[0] {
            Operation::AddNode(spec) => {
                assert_eq!(spec.semantic_type, SemanticType::Landmark);
                assert_eq!(spec.expandable, Some(false));
                assert!(spec.position.is_none());
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(batch.operations[1].kind(), "add_edge");
        assert!(!batch.operations[4].is_structural());
    }

    #[test]
    fn test_operation_serializes_with_tag() {
        let json = serde_json::to_value(Operation::remove_node("gate")).unwrap();
        assert_eq!(json["op"], "remove_node");
        assert_eq!(json["id"], "gate");
    }

    #[test]
    fn test_spec_into_node() {
        let node = NodeSpec::new("Crypt")
            .with_id("c1")
            .with_type("underground")
            .terminal()
            .into_node(Position::new(0.0, -0.7));
        assert_eq!(node.id.as_str(), "c1");
        assert!(!node.expandable);
        assert_eq!(node.position, Position::new(0.0, -0.7));
    }
}
