//! Offline scene generator
//!
//! Deterministic stand-in for a language model: graphs come from fixed name
//! tables with semantic positions, edit batches are scripted per instruction.

use super::payload::{EdgePayload, GraphPayload, NodePayload};
use super::{GenerationError, GenerationResult, GraphRequest, SceneGenerator};
use crate::graph::SceneGraph;
use crate::mutation::OperationBatch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// (name, type, position) for outdoor scenes
const OUTDOOR: &[(&str, &str, Option<(f64, f64)>)] = &[
    ("Central Plaza", "location", Some((0.0, 0.0))),
    ("Main Gate", "landmark", Some((-0.8, 0.3))),
    ("Market Square", "location", Some((0.0, 0.2))),
    ("Temple", "landmark", Some((0.5, 0.4))),
    ("Tavern", "location", Some((-0.4, 0.1))),
    ("Watchtower", "landmark", Some((0.7, 0.7))),
    ("Forest Canopy", "sky", Some((0.0, 0.9))),
    ("Forest Path", "location", Some((-0.3, -0.2))),
    ("River Bridge", "element", Some((0.4, -0.1))),
    ("Underground Passage", "underground", Some((0.0, -0.6))),
    ("Garden", "location", Some((0.6, 0.3))),
    ("Stable", "location", Some((-0.6, 0.0))),
    ("Dungeon", "underground", Some((0.0, -0.8))),
    ("Rooftop", "sky", Some((0.3, 0.8))),
    ("Crossroads", "location", Some((0.0, -0.3))),
    ("Cave Entrance", "landmark", Some((0.5, -0.4))),
    ("Fountain", "element", Some((0.0, 0.15))),
    ("Clearing", "location", Some((0.2, -0.1))),
    ("Sky Bridge", "sky", Some((0.0, 0.75))),
    ("Root System", "underground", Some((0.0, -0.7))),
];

/// Interior rooms, placed by the semantic layout
const INTERIOR: &[(&str, &str)] = &[
    ("Entrance Hall", "location"),
    ("Great Hall", "location"),
    ("Kitchen", "location"),
    ("Wine Cellar", "underground"),
    ("Bell Tower", "landmark"),
    ("Library", "location"),
    ("Armory", "location"),
    ("Chapel", "landmark"),
    ("Attic", "location"),
    ("Courtyard", "location"),
    ("Servants' Quarters", "location"),
    ("Crypt", "underground"),
];

const RELATIONS: &[&str] = &["connected_to", "adjacent_to", "leads_to"];

/// Interior tables start at this depth
const INTERIOR_DEPTH: u32 = 3;

#[derive(Default)]
pub struct MockSceneGenerator {
    graph_calls: AtomicUsize,
    edit_calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Mutex<Option<GenerationError>>,
    edits: Mutex<HashMap<String, OperationBatch>>,
}

impl MockSceneGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer `instruction` with `batch`
    pub fn with_edit(self, instruction: impl Into<String>, batch: OperationBatch) -> Self {
        self.script_edit(instruction, batch);
        self
    }

    pub fn script_edit(&self, instruction: impl Into<String>, batch: OperationBatch) {
        self.edits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instruction.into(), batch);
    }

    /// Fail every following call with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<GenerationError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    pub fn graph_calls(&self) -> usize {
        self.graph_calls.load(Ordering::SeqCst)
    }

    pub fn edit_calls(&self) -> usize {
        self.edit_calls.load(Ordering::SeqCst)
    }

    async fn pause_or_fail(&self) -> GenerationResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Payload the mock would return for `request`
    pub fn payload_for(request: &GraphRequest) -> GraphPayload {
        let seed = fnv1a(&request.prompt) as usize;
        let interior = request.depth >= INTERIOR_DEPTH;
        let table_len = if interior { INTERIOR.len() } else { OUTDOOR.len() };
        let count = request.node_count.clamp(1, table_len);

        let mut nodes = Vec::with_capacity(count);
        for i in 0..count {
            let index = (seed + i) % table_len;
            let node = if interior {
                let (name, kind) = INTERIOR[index];
                NodePayload {
                    name: name.to_string(),
                    node_type: Some(kind.to_string()),
                    ..Default::default()
                }
            } else {
                let (name, kind, position) = OUTDOOR[index];
                NodePayload {
                    name: name.to_string(),
                    node_type: Some(kind.to_string()),
                    x: position.map(|p| p.0),
                    y: position.map(|p| p.1),
                    ..Default::default()
                }
            };
            nodes.push(NodePayload {
                description: format!("A {} in the scene", node.name.to_lowercase()),
                size: Some(0.7 + ((seed + i) % 9) as f64 / 10.0),
                is_expandable: Some(request.depth < 4),
                ..node
            });
        }

        let mut edges = Vec::new();
        for pair in nodes.windows(2) {
            edges.push(EdgePayload {
                source: pair[0].name.clone(),
                target: pair[1].name.clone(),
                relationship: RELATIONS[edges.len() % RELATIONS.len()].to_string(),
                label: String::new(),
            });
        }
        if nodes.len() > 3 {
            edges.push(EdgePayload {
                source: nodes[0].name.clone(),
                target: nodes[nodes.len() - 1].name.clone(),
                relationship: "connected_to".to_string(),
                label: String::new(),
            });
        }

        let summary: String = request.prompt.chars().take(50).collect();
        GraphPayload {
            summary: format!("Generated {} nodes based on: {}", nodes.len(), summary),
            nodes,
            edges,
        }
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl SceneGenerator for MockSceneGenerator {
    async fn generate_graph(&self, request: GraphRequest) -> GenerationResult<SceneGraph> {
        self.graph_calls.fetch_add(1, Ordering::SeqCst);
        self.pause_or_fail().await?;

        let name = match &request.parent {
            Some(parent) => parent.name.clone(),
            None => request.prompt.chars().take(48).collect(),
        };
        Self::payload_for(&request).into_graph(&name, &request.prompt)
    }

    async fn generate_edit_batch(
        &self,
        instruction: &str,
        _current: &SceneGraph,
    ) -> GenerationResult<OperationBatch> {
        self.edit_calls.fetch_add(1, Ordering::SeqCst);
        self.pause_or_fail().await?;

        let scripted = self
            .edits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instruction)
            .cloned();
        Ok(scripted.unwrap_or_else(|| {
            OperationBatch::default().with_summary(format!("No scripted edit for: {}", instruction))
        }))
    }
}
