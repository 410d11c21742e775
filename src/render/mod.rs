//! Image-rendering collaborator
//!
//! Renders a scene graph into artwork. The renderer only reads the graph; the
//! hierarchy attaches the returned artifact.

pub mod gemini;
pub mod placeholder;
pub mod style;

pub use gemini::GeminiImageRenderer;
pub use placeholder::PlaceholderRenderer;
pub use style::RenderStyle;

use crate::graph::RenderArtifact;
use crate::llm::FailureReason;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Image API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected image response: {0}")]
    Schema(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Render timed out after {0}s")]
    Timeout(u64),
    #[error("Render cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn reason(&self) -> FailureReason {
        match self {
            RenderError::Api(_) => FailureReason::Api,
            RenderError::Network(_) => FailureReason::Network,
            RenderError::Schema(_) => FailureReason::Schema,
            RenderError::Config(_) => FailureReason::Config,
            RenderError::Timeout(_) => FailureReason::Timeout,
            RenderError::Cancelled => FailureReason::Cancelled,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Everything a renderer needs for one image
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub scene_name: String,
    /// Serialized graph
    pub graph_json: String,
    /// PNG of the canvas as currently laid out
    pub canvas_snapshot: Option<Bytes>,
    pub style: RenderStyle,
}

impl RenderRequest {
    pub fn prompt(&self) -> String {
        let style = self.style.phrase();
        format!(
            r#"Generate a {style} view image of this scene: "{name}"

The attached image shows a semantic graph where:
- Each node represents a location or element in the scene
- Node positions give spatial relationships (top = north/up, bottom = south/down, left = west, right = east)
- Connected nodes are adjacent or linked areas

Scene graph data (JSON):
{graph}

Create a cohesive {style} illustration that:
1. Places each location or element according to its position in the graph
2. Shows connections between areas as paths, doors or natural transitions
3. Uses appropriate visual elements for each node type
4. Keeps scale and perspective consistent

Generate the image now."#,
            style = style,
            name = self.scene_name,
            graph = self.graph_json,
        )
    }
}

#[async_trait]
pub trait SceneRenderer: Send + Sync {
    async fn render_scene(&self, request: &RenderRequest) -> RenderResult<RenderArtifact>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_style_and_graph() {
        let request = RenderRequest {
            scene_name: "Harbor".to_string(),
            graph_json: "{\"nodes\":[]}".to_string(),
            canvas_snapshot: None,
            style: RenderStyle::PixelArt,
        };
        let prompt = request.prompt();
        assert!(prompt.contains("pixel art style"));
        assert!(prompt.contains("\"Harbor\""));
        assert!(prompt.contains("{\"nodes\":[]}"));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(RenderError::Cancelled.reason(), FailureReason::Cancelled);
        assert_eq!(RenderError::Api("x".into()).reason(), FailureReason::Api);
    }
}
