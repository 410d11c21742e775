//! SceneSynth
//!
//! Hierarchical semantic scene graphs. A world is a forest of graphs: every
//! expandable node can own a child graph that describes its inside, generated
//! lazily by a language model the first time the node is opened.
//!
//! # Components
//!
//! - [`graph`]: nodes, edges and the per-graph invariants
//! - [`mutation`]: ordered operation batches with per-operation outcomes and
//!   semantic layout of new nodes
//! - [`hierarchy`]: the forest, navigation and the async manager that
//!   coordinates expansion and rendering
//! - [`persistence`]: versioned snapshots with validation on load
//! - [`llm`] / [`render`]: the external collaborators and their offline
//!   stand-ins
//!
//! ## Example Usage
//!
//! ```rust
//! use scenesynth::graph::{SceneGraph, SceneNode, SemanticType};
//! use scenesynth::hierarchy::Forest;
//! use scenesynth::persistence::Snapshot;
//!
//! let mut root = SceneGraph::new("", "Harbor town");
//! root.add_node(SceneNode::new("docks", "Docks")).unwrap();
//! root.add_node(SceneNode::new("gulls", "Gulls").with_type(SemanticType::Sky)).unwrap();
//! root.add_edge(&"docks".into(), &"gulls".into(), "below").unwrap();
//!
//! let forest = Forest::new(root);
//! let json = Snapshot::capture(&forest).to_json().unwrap();
//! let restored = Snapshot::from_json(&json).unwrap().into_forest().unwrap();
//! assert_eq!(restored, forest);
//! ```

pub mod config;
pub mod graph;
pub mod hierarchy;
pub mod llm;
pub mod mutation;
pub mod persistence;
pub mod render;

pub use config::{ConfigError, GenerationLimits, LlmConfig, LlmProvider, RenderConfig, SceneSynthConfig};
pub use graph::{
    EdgeId, ExpansionState, GraphError, GraphId, GraphResult, NodeId, NodeUpdate, Position,
    RenderArtifact, SceneEdge, SceneGraph, SceneNode, SemanticType,
};
pub use hierarchy::{
    BatchReport, Forest, HierarchyError, HierarchyManager, HierarchyResult, ManagerOptions,
};
pub use llm::{
    FailureReason, GenerationError, GraphRequest, LlmSceneGenerator, MockSceneGenerator,
    SceneGenerator,
};
pub use mutation::{ApplyResult, MutationEngine, NodeSpec, Operation, OperationBatch};
pub use persistence::{Snapshot, SnapshotError, SnapshotResult};
pub use render::{
    GeminiImageRenderer, PlaceholderRenderer, RenderError, RenderStyle, SceneRenderer,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
