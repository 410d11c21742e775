//! Scene generator backed by a remote language model

use super::payload::{parse_edit_response, GraphPayload};
use super::prompt::{edit_prompt, generation_prompt, GRAPH_SYSTEM_PROMPT};
use super::{GenerationResult, GraphRequest, LlmClient, SceneGenerator};
use crate::config::{GenerationLimits, LlmConfig};
use crate::graph::SceneGraph;
use crate::mutation::OperationBatch;
use async_trait::async_trait;
use tracing::{info, warn};

pub struct LlmSceneGenerator {
    client: LlmClient,
    limits: GenerationLimits,
}

impl LlmSceneGenerator {
    pub fn new(config: &LlmConfig, limits: GenerationLimits) -> GenerationResult<Self> {
        Ok(Self {
            client: LlmClient::new(config)?,
            limits,
        })
    }

    fn graph_name(request: &GraphRequest) -> String {
        match &request.parent {
            Some(parent) => parent.name.clone(),
            None => {
                let name: String = request.prompt.trim().chars().take(48).collect();
                if name.is_empty() {
                    "Untitled Scene".to_string()
                } else {
                    name
                }
            }
        }
    }
}

#[async_trait]
impl SceneGenerator for LlmSceneGenerator {
    async fn generate_graph(&self, mut request: GraphRequest) -> GenerationResult<SceneGraph> {
        request.node_count = self.limits.node_count(Some(request.node_count));
        info!(
            "Generating depth {} scene ({} nodes) with {}",
            request.depth,
            request.node_count,
            self.client.model()
        );

        let response = self
            .client
            .complete(GRAPH_SYSTEM_PROMPT, &generation_prompt(&request))
            .await?;

        let payload = GraphPayload::parse(&response)?;
        if payload.nodes.len() != request.node_count {
            warn!(
                "Model returned {} nodes, {} requested",
                payload.nodes.len(),
                request.node_count
            );
        }
        payload.into_graph(&Self::graph_name(&request), &request.prompt)
    }

    async fn generate_edit_batch(
        &self,
        instruction: &str,
        current: &SceneGraph,
    ) -> GenerationResult<OperationBatch> {
        info!("Requesting edit batch for graph {}", current.id());
        let response = self
            .client
            .complete(GRAPH_SYSTEM_PROMPT, &edit_prompt(instruction, current))
            .await?;
        parse_edit_response(&response, current)
    }
}
