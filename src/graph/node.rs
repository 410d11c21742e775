//! Scene node
//!
//! A node is one location, landmark, character or element of a scene. It may
//! own a child graph once expanded; the node only records the child's id, the
//! hierarchy owns the graph itself.

use super::types::{ExpansionState, GraphId, NodeId, Position, SemanticType};
use serde::{Deserialize, Serialize};

pub const MIN_NODE_SIZE: f64 = 0.5;
pub const MAX_NODE_SIZE: f64 = 2.0;

fn default_size() -> f64 {
    1.0
}

fn default_expandable() -> bool {
    true
}

/// A node in a scene graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    /// Identifier, unique within the owning graph
    pub id: NodeId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub semantic_type: SemanticType,

    /// Semantic layout position
    pub position: Position,

    /// Relative importance (0.5 minor, 2.0 major landmark)
    #[serde(default = "default_size")]
    pub size: f64,

    /// Whether this node may own a child graph
    #[serde(default = "default_expandable")]
    pub expandable: bool,

    /// Child graph, present once the node has been expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_graph_id: Option<GraphId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl SceneNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        SceneNode {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            semantic_type: SemanticType::default(),
            position: Position::default(),
            size: default_size(),
            expandable: true,
            child_graph_id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, semantic_type: impl Into<SemanticType>) -> Self {
        self.semantic_type = semantic_type.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = clamp_size(size);
        self
    }

    pub fn with_expandable(mut self, expandable: bool) -> Self {
        self.expandable = expandable;
        self
    }

    pub fn expansion_state(&self) -> ExpansionState {
        match (&self.child_graph_id, self.expandable) {
            (Some(child), _) => ExpansionState::Expanded(child.clone()),
            (None, true) => ExpansionState::Collapsed,
            (None, false) => ExpansionState::NotExpandable,
        }
    }

    pub fn has_child_graph(&self) -> bool {
        self.child_graph_id.is_some()
    }

    /// Expandable and not yet expanded
    pub fn can_expand(&self) -> bool {
        self.expandable && self.child_graph_id.is_none()
    }

    /// Apply only the fields present in `update`
    ///
    /// Does not touch `child_graph_id`; that link belongs to the hierarchy.
    pub(crate) fn merge(&mut self, update: &NodeUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(semantic_type) = &update.semantic_type {
            self.semantic_type = semantic_type.clone();
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(size) = update.size {
            self.size = clamp_size(size);
        }
        if let Some(expandable) = update.expandable {
            self.expandable = expandable;
        }
        if let Some(tags) = &update.tags {
            self.tags = tags.clone();
        }
    }
}

pub(crate) fn clamp_size(size: f64) -> f64 {
    if size.is_finite() {
        size.clamp(MIN_NODE_SIZE, MAX_NODE_SIZE)
    } else {
        default_size()
    }
}

/// Partial node update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<SemanticType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expandable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        *self == NodeUpdate::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn expandable(mut self, expandable: bool) -> Self {
        self.expandable = Some(expandable);
        self
    }
}
