//! Hierarchy of scene graphs
//!
//! The [`Forest`] owns every graph of one world and keeps the parent/child
//! links consistent. The [`HierarchyManager`] wraps a forest behind a single
//! writer lock and coordinates the suspending work: lazy expansion through the
//! language model and rendering through the image collaborator.
//!
//! Node states:
//!
//! ```text
//! Collapsed --expand--> Expanded --(child pruned)--> Collapsed
//! NotExpandable (terminal)
//! ```

pub mod forest;
pub mod manager;

pub use forest::{Breadcrumb, Forest, PathStep};
pub use manager::{BatchReport, ExpansionOutcome, HierarchyManager, ManagerOptions};

use crate::graph::{GraphError, GraphId, NodeId};
use crate::llm::{FailureReason, GenerationError};
use crate::mutation::MutationError;
use crate::render::RenderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HierarchyError {
    #[error("Graph {0} not found")]
    GraphNotFound(GraphId),

    #[error("Graph id {0} is already in use in this hierarchy")]
    DuplicateGraphId(GraphId),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Node {0} is not expandable")]
    NotExpandable(NodeId),

    #[error("Node {0} has not been expanded yet")]
    NotExpanded(NodeId),

    #[error("The root graph cannot be deleted")]
    CannotDeleteRoot,

    #[error("A render of graph {0} is already in progress")]
    RenderInProgress(GraphId),

    #[error("Expansion failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl HierarchyError {
    /// Reason code when the failure came from a collaborator
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            HierarchyError::Generation(e) => Some(e.reason()),
            HierarchyError::Render(e) => Some(e.reason()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure_reason() == Some(FailureReason::Cancelled)
    }
}

impl From<MutationError> for HierarchyError {
    fn from(e: MutationError) -> Self {
        match e {
            MutationError::Graph(g) => HierarchyError::Graph(g),
            MutationError::NotExpandable(n) => HierarchyError::NotExpandable(n),
        }
    }
}

pub type HierarchyResult<T> = Result<T, HierarchyError>;
