//! Language-model collaborator
//!
//! Turns free text into scene graphs and edit batches. Everything coming back
//! from a model is treated as an untrusted payload and validated before it
//! reaches the hierarchy.

pub mod client;
pub mod generator;
pub mod mock;
pub mod payload;
pub mod prompt;

pub use client::LlmClient;
pub use generator::LlmSceneGenerator;
pub use mock::MockSceneGenerator;
pub use payload::{EdgePayload, GraphPayload, NodePayload};

use crate::graph::{SceneGraph, SemanticType};
use crate::mutation::OperationBatch;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Reason code carried by collaborator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Api,
    Network,
    Schema,
    Config,
    Timeout,
    Cancelled,
}

impl FailureReason {
    /// Timeouts and cancellations are ordinary, retryable outcomes
    pub fn is_interruption(&self) -> bool {
        matches!(self, FailureReason::Timeout | FailureReason::Cancelled)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Api => "api",
            FailureReason::Network => "network",
            FailureReason::Schema => "schema",
            FailureReason::Config => "config",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid model output: {0}")]
    Schema(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Generation timed out after {0}s")]
    Timeout(u64),
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn reason(&self) -> FailureReason {
        match self {
            GenerationError::Api(_) => FailureReason::Api,
            GenerationError::Network(_) => FailureReason::Network,
            GenerationError::Schema(_) => FailureReason::Schema,
            GenerationError::Config(_) => FailureReason::Config,
            GenerationError::Timeout(_) => FailureReason::Timeout,
            GenerationError::Cancelled => FailureReason::Cancelled,
        }
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// The node a child graph is generated for
#[derive(Debug, Clone, PartialEq)]
pub struct ParentContext {
    pub name: String,
    pub description: String,
    pub semantic_type: SemanticType,
}

/// Input to graph generation
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub prompt: String,
    /// Free-text context (e.g. the parent scene's prompt)
    pub context: Option<String>,
    pub parent: Option<ParentContext>,
    /// 0 world, 1 region, 2 area, 3 building, 4 room
    pub depth: u32,
    pub node_count: usize,
}

impl GraphRequest {
    pub fn root(prompt: impl Into<String>, node_count: usize) -> Self {
        GraphRequest {
            prompt: prompt.into(),
            context: None,
            parent: None,
            depth: 0,
            node_count,
        }
    }
}

/// Produces graphs and edit batches from free text
#[async_trait]
pub trait SceneGenerator: Send + Sync {
    /// A complete, validated graph for `request`
    ///
    /// The graph's id and parent link are assigned by the hierarchy.
    async fn generate_graph(&self, request: GraphRequest) -> GenerationResult<SceneGraph>;

    /// Ordered operations carrying out `instruction` on `current`
    async fn generate_edit_batch(
        &self,
        instruction: &str,
        current: &SceneGraph,
    ) -> GenerationResult<OperationBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(GenerationError::Timeout(30).reason(), FailureReason::Timeout);
        assert!(GenerationError::Cancelled.reason().is_interruption());
        assert!(!GenerationError::Schema("x".into()).reason().is_interruption());
        assert_eq!(FailureReason::Network.to_string(), "network");
    }
}
