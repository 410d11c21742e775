//! Core type definitions for scene graphs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node, unique within its owning graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Identifier of a graph, unique within a hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GraphId(String);

impl GraphId {
    pub fn new(id: impl Into<String>) -> Self {
        GraphId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GraphId {
    fn from(s: &str) -> Self {
        GraphId(s.to_string())
    }
}

impl From<String> for GraphId {
    fn from(s: String) -> Self {
        GraphId(s)
    }
}

/// Identifier of an edge, unique within its owning graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        EdgeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl From<u64> for EdgeId {
    fn from(id: u64) -> Self {
        EdgeId(id)
    }
}

/// Vertical layout band a semantic type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutBand {
    Sky,
    Surface,
    Underground,
}

/// Semantic tag of a node
///
/// Known tags serialize as lowercase strings; anything else round-trips
/// through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SemanticType {
    #[default]
    Location,
    Landmark,
    Element,
    Character,
    Atmosphere,
    Region,
    Sky,
    Underground,
    Other(String),
}

impl SemanticType {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "location" => SemanticType::Location,
            "landmark" => SemanticType::Landmark,
            "element" => SemanticType::Element,
            "character" => SemanticType::Character,
            "atmosphere" => SemanticType::Atmosphere,
            "region" => SemanticType::Region,
            "sky" => SemanticType::Sky,
            "underground" => SemanticType::Underground,
            other => SemanticType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SemanticType::Location => "location",
            SemanticType::Landmark => "landmark",
            SemanticType::Element => "element",
            SemanticType::Character => "character",
            SemanticType::Atmosphere => "atmosphere",
            SemanticType::Region => "region",
            SemanticType::Sky => "sky",
            SemanticType::Underground => "underground",
            SemanticType::Other(tag) => tag,
        }
    }

    /// Band implied by the tag alone, if the tag carries a vertical meaning
    pub fn band(&self) -> Option<LayoutBand> {
        match self {
            SemanticType::Sky | SemanticType::Atmosphere => Some(LayoutBand::Sky),
            SemanticType::Underground => Some(LayoutBand::Underground),
            SemanticType::Other(tag) => match tag.as_str() {
                "air" | "canopy" | "cloud" | "celestial" => Some(LayoutBand::Sky),
                "subterranean" | "cave" | "cavern" | "basement" => Some(LayoutBand::Underground),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for SemanticType {
    fn from(s: &str) -> Self {
        SemanticType::parse(s)
    }
}

impl Serialize for SemanticType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SemanticType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(SemanticType::parse(&tag))
    }
}

/// 2D coordinate in the unit square [-1, 1]², +y pointing up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn in_unit_square(&self) -> bool {
        self.is_finite() && (-1.0..=1.0).contains(&self.x) && (-1.0..=1.0).contains(&self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Back-reference from a child graph to the node that owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentLink {
    pub graph_id: GraphId,
    pub node_id: NodeId,
}

impl ParentLink {
    pub fn new(graph_id: GraphId, node_id: NodeId) -> Self {
        ParentLink { graph_id, node_id }
    }
}

impl fmt::Display for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.graph_id, self.node_id)
    }
}

/// Expansion state of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionState {
    /// Expandable, no child graph yet
    Collapsed,
    /// Child graph materialized
    Expanded(GraphId),
    /// Terminal
    NotExpandable,
}
