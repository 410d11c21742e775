//! Scene edge
//!
//! Edges are undirected in meaning. The source/target pair is kept exactly as
//! it was added so serialization stays deterministic.

use super::types::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RELATION: &str = "connected_to";

/// A relationship between two nodes of the same graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEdge {
    pub id: EdgeId,

    pub source: NodeId,

    pub target: NodeId,

    /// Relationship label (e.g. "adjacent_to", "contains", "leads_to")
    pub relation: String,

    /// Optional display label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

impl SceneEdge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        SceneEdge {
            id,
            source,
            target,
            relation: if relation.trim().is_empty() {
                DEFAULT_RELATION.to_string()
            } else {
                relation
            },
            label: String::new(),
        }
    }

    /// Whether this edge touches `node`
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// Whether this edge joins `a` and `b`, in either orientation
    pub fn connects(&self, a: &NodeId, b: &NodeId) -> bool {
        (&self.source == a && &self.target == b) || (&self.source == b && &self.target == a)
    }

    /// The endpoint opposite `node`
    pub fn other(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}
