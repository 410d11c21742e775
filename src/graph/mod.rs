//! Scene graph model
//!
//! This module implements one level of the world:
//! - Nodes with a semantic type, a layout position and an optional child graph
//! - Undirected, labeled edges between nodes of the same graph
//! - Per-graph render artifacts with lazily decoded payloads

pub mod artifact;
pub mod edge;
pub mod node;
pub mod scene;
pub mod types;

// Re-export main types
pub use artifact::{ArtifactError, RenderArtifact, PNG_MEDIA_TYPE};
pub use edge::{SceneEdge, DEFAULT_RELATION};
pub use node::{NodeUpdate, SceneNode, MAX_NODE_SIZE, MIN_NODE_SIZE};
pub use scene::{GraphError, GraphResult, RemovedNode, SceneGraph};
pub use types::{EdgeId, ExpansionState, GraphId, LayoutBand, NodeId, ParentLink, Position, SemanticType};
