//! Untrusted model payloads
//!
//! Model output is parsed into loose payload structs first and then checked
//! against the graph schema. Any mismatch is a `GenerationError::Schema`;
//! nothing half-valid is admitted.

use super::{GenerationError, GenerationResult};
use crate::graph::{NodeId, NodeUpdate, Position, SceneGraph, SemanticType};
use crate::mutation::{MutationEngine, NodeSpec, Operation, OperationBatch};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "semantic_type", alias = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default, alias = "expandable")]
    pub is_expandable: Option<bool>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub source: String,
    pub target: String,
    #[serde(default, alias = "relation")]
    pub relationship: String,
    #[serde(default)]
    pub label: String,
}

/// A complete graph as returned by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub edges: Vec<EdgePayload>,
    #[serde(default)]
    pub summary: String,
}

fn schema(msg: impl Into<String>) -> GenerationError {
    GenerationError::Schema(msg.into())
}

/// The JSON object inside a model response, tolerating code fences and
/// surrounding prose
pub fn extract_json(response: &str) -> GenerationResult<&str> {
    let trimmed = response.trim();

    let body = match trimmed.find("```") {
        Some(start) => {
            let after_fence = &trimmed[start + 3..];
            let code_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
            match after_fence[code_start..].find("```") {
                Some(end) => &after_fence[code_start..code_start + end],
                None => &after_fence[code_start..],
            }
        }
        None => trimmed,
    };

    let open = body.find('{').ok_or_else(|| schema("response contains no JSON object"))?;
    let close = body.rfind('}').ok_or_else(|| schema("response JSON object is not closed"))?;
    if close < open {
        return Err(schema("response JSON object is not closed"));
    }
    Ok(&body[open..=close])
}

impl NodePayload {
    fn position(&self) -> GenerationResult<Option<Position>> {
        match (self.x, self.y) {
            (None, None) => Ok(None),
            (Some(x), Some(y)) => {
                let position = Position::new(x, y);
                if position.in_unit_square() {
                    Ok(Some(position))
                } else {
                    Err(schema(format!(
                        "node '{}' has position {} outside [-1, 1]",
                        self.name, position
                    )))
                }
            }
            _ => Err(schema(format!("node '{}' has only one coordinate", self.name))),
        }
    }

    fn to_spec(&self) -> GenerationResult<NodeSpec> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(schema("node without a name"));
        }
        if let Some(size) = self.size {
            if !size.is_finite() {
                return Err(schema(format!("node '{}' has a non-finite size", name)));
            }
        }
        Ok(NodeSpec {
            id: self
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(NodeId::from),
            name: name.to_string(),
            description: self.description.trim().to_string(),
            semantic_type: self
                .node_type
                .as_deref()
                .map(SemanticType::parse)
                .unwrap_or_default(),
            position: self.position()?,
            size: self.size,
            expandable: self.is_expandable,
            tags: Vec::new(),
        })
    }
}

impl GraphPayload {
    pub fn parse(response: &str) -> GenerationResult<Self> {
        let json = extract_json(response)?;
        serde_json::from_str(json).map_err(|e| schema(e.to_string()))
    }

    /// Validate into a graph named `name`
    ///
    /// Nodes without coordinates are placed by the semantic layout. Edge
    /// endpoints may name a node by id or by name.
    pub fn into_graph(self, name: &str, prompt: &str) -> GenerationResult<SceneGraph> {
        if self.nodes.is_empty() {
            return Err(schema("graph has no nodes"));
        }

        let engine = MutationEngine::strict();
        let mut graph = SceneGraph::new("", name);
        graph.master_prompt = prompt.to_string();

        let mut seen_names = HashSet::new();
        let mut lookup: HashMap<String, NodeId> = HashMap::new();

        for payload in &self.nodes {
            let spec = payload.to_spec()?;
            let key = spec.name.to_lowercase();
            if !seen_names.insert(key.clone()) {
                return Err(schema(format!("duplicate node name '{}'", spec.name)));
            }
            let raw_id = spec.id.clone();
            let id = engine
                .add_node(&mut graph, spec)
                .map_err(|e| schema(e.to_string()))?;
            if let Some(raw) = raw_id {
                lookup.insert(raw.as_str().to_lowercase(), id.clone());
            }
            lookup.entry(key).or_insert(id);
        }

        for edge in &self.edges {
            let source = resolve(&lookup, &edge.source)?;
            let target = resolve(&lookup, &edge.target)?;
            graph
                .add_labeled_edge(source, target, edge.relationship.trim(), edge.label.trim())
                .map_err(|e| schema(e.to_string()))?;
        }

        Ok(graph)
    }

    /// Operations turning `current` into this payload
    ///
    /// Nodes are matched by name, case-insensitively. Used when a model
    /// answers an edit instruction with a whole graph instead of operations.
    pub fn diff_against(&self, current: &SceneGraph) -> GenerationResult<OperationBatch> {
        let mut ops = Vec::new();
        let mut wanted: HashMap<String, &NodePayload> = HashMap::new();
        for node in &self.nodes {
            if wanted.insert(node.name.trim().to_lowercase(), node).is_some() {
                return Err(schema(format!("duplicate node name '{}'", node.name)));
            }
        }

        for node in current.nodes() {
            if !wanted.contains_key(&node.name.to_lowercase()) {
                ops.push(Operation::remove_node(node.id.clone()));
            }
        }

        for payload in &self.nodes {
            let spec = payload.to_spec()?;
            match current.find_node_by_name(&spec.name) {
                Some(existing) => {
                    let mut changes = NodeUpdate::default();
                    if spec.description != existing.description {
                        changes.description = Some(spec.description.clone());
                    }
                    if spec.semantic_type != existing.semantic_type && payload.node_type.is_some() {
                        changes.semantic_type = Some(spec.semantic_type.clone());
                    }
                    if let Some(position) = spec.position.filter(|p| *p != existing.position) {
                        changes.position = Some(position);
                    }
                    if let Some(size) = spec.size.filter(|s| *s != existing.size) {
                        changes.size = Some(size);
                    }
                    if !changes.is_empty() {
                        ops.push(Operation::update_node(existing.id.clone(), changes));
                    }
                }
                None => ops.push(Operation::AddNode(NodeSpec { id: None, ..spec })),
            }
        }

        let current_pairs: HashSet<(String, String)> = current
            .edges()
            .filter_map(|e| {
                let a = current.get_node(&e.source)?.name.to_lowercase();
                let b = current.get_node(&e.target)?.name.to_lowercase();
                Some(unordered(a, b))
            })
            .collect();
        let wanted_pairs: HashSet<(String, String)> = self
            .edges
            .iter()
            .map(|e| unordered(e.source.trim().to_lowercase(), e.target.trim().to_lowercase()))
            .collect();

        for edge in current.edges() {
            let (Some(a), Some(b)) = (current.get_node(&edge.source), current.get_node(&edge.target))
            else {
                continue;
            };
            let pair = unordered(a.name.to_lowercase(), b.name.to_lowercase());
            if !wanted_pairs.contains(&pair)
                && wanted.contains_key(&pair.0)
                && wanted.contains_key(&pair.1)
            {
                ops.push(Operation::remove_edge(edge.source.clone(), edge.target.clone()));
            }
        }

        for edge in &self.edges {
            let pair = unordered(edge.source.trim().to_lowercase(), edge.target.trim().to_lowercase());
            if !current_pairs.contains(&pair) {
                ops.push(Operation::AddEdge {
                    source: NodeId::new(edge.source.trim()),
                    target: NodeId::new(edge.target.trim()),
                    relation: edge.relationship.trim().to_string(),
                    label: edge.label.trim().to_string(),
                });
            }
        }

        Ok(OperationBatch::new(ops).with_summary(self.summary.clone()))
    }
}

fn unordered(a: String, b: String) -> (String, String) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn resolve<'a>(lookup: &'a HashMap<String, NodeId>, reference: &str) -> GenerationResult<&'a NodeId> {
    lookup
        .get(&reference.trim().to_lowercase())
        .ok_or_else(|| schema(format!("edge references unknown node '{}'", reference)))
}

/// Parse an edit response: either an operation list or a whole graph to diff
pub fn parse_edit_response(response: &str, current: &SceneGraph) -> GenerationResult<OperationBatch> {
    let json = extract_json(response)?;
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| schema(e.to_string()))?;

    if value.get("operations").is_some() {
        serde_json::from_value(value).map_err(|e| schema(e.to_string()))
    } else if value.get("nodes").is_some() {
        let payload: GraphPayload = serde_json::from_value(value).map_err(|e| schema(e.to_string()))?;
        payload.diff_against(current)
    } else {
        Err(schema("edit response has neither 'operations' nor 'nodes'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LayoutBand, SceneNode};
    use crate::mutation::layout;

    const RESPONSE: &str = r#"Here is your scene:
```json
{
  "nodes": [
    {"name": "Central Plaza", "description": "Heart of town", "node_type": "location", "size": 1.5, "is_expandable": true, "x": 0.0, "y": 0.0},
    {"name": "Bell Tower", "node_type": "landmark", "x": 0.2, "y": 0.8},
    {"name": "Old Crypt", "node_type": "underground"}
  ],
  "edges": [
    {"source": "Central Plaza", "target": "bell tower", "relationship": "overlooks"},
    {"source": "Old Crypt", "target": "Central Plaza", "relationship": ""}
  ],
  "summary": "A small town"
}
```"#;

    #[test]
    fn test_extract_json_from_fenced_response() {
        let json = extract_json(RESPONSE).unwrap();
        assert!(json.starts_with('{') && json.ends_with('}'));
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn test_payload_into_graph() {
        let graph = GraphPayload::parse(RESPONSE)
            .unwrap()
            .into_graph("Town", "a small town")
            .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.master_prompt, "a small town");

        let crypt = graph.find_node_by_name("old crypt").unwrap();
        assert_eq!(layout::band_of(crypt.position), Some(LayoutBand::Underground));
        let plaza = graph.find_node_by_name("central plaza").unwrap();
        assert_eq!(plaza.size, 1.5);
    }

    #[test]
    fn test_rejects_dangling_edge() {
        let payload = GraphPayload {
            nodes: vec![NodePayload {
                name: "A".into(),
                ..Default::default()
            }],
            edges: vec![EdgePayload {
                source: "A".into(),
                target: "B".into(),
                ..Default::default()
            }],
            summary: String::new(),
        };
        let err = payload.into_graph("x", "x").unwrap_err();
        assert_eq!(err.reason(), crate::llm::FailureReason::Schema);
    }

    #[test]
    fn test_rejects_bad_coordinates() {
        let payload = GraphPayload {
            nodes: vec![NodePayload {
                name: "A".into(),
                x: Some(4.0),
                y: Some(0.0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            payload.into_graph("x", "x"),
            Err(GenerationError::Schema(_))
        ));
    }

    #[test]
    fn test_rejects_self_loop_and_empty_graph() {
        assert!(GraphPayload::default().into_graph("x", "x").is_err());

        let payload = GraphPayload {
            nodes: vec![NodePayload {
                name: "A".into(),
                ..Default::default()
            }],
            edges: vec![EdgePayload {
                source: "A".into(),
                target: "a".into(),
                ..Default::default()
            }],
            summary: String::new(),
        };
        assert!(payload.into_graph("x", "x").is_err());
    }

    #[test]
    fn test_diff_against_current_graph() {
        let mut current = SceneGraph::new("g1", "Town");
        current
            .add_node(SceneNode::new("p", "Plaza").with_description("Old"))
            .unwrap();
        current.add_node(SceneNode::new("w", "Well")).unwrap();
        current.add_edge(&"p".into(), &"w".into(), "near").unwrap();

        let payload = GraphPayload {
            nodes: vec![
                NodePayload {
                    name: "Plaza".into(),
                    description: "Renovated".into(),
                    ..Default::default()
                },
                NodePayload {
                    name: "Statue".into(),
                    ..Default::default()
                },
            ],
            edges: vec![EdgePayload {
                source: "Statue".into(),
                target: "Plaza".into(),
                relationship: "inside".into(),
                label: String::new(),
            }],
            summary: "Replace the well with a statue".into(),
        };

        let batch = payload.diff_against(&current).unwrap();
        let kinds: Vec<&str> = batch.iter().map(Operation::kind).collect();
        assert_eq!(kinds, vec!["remove_node", "update_node", "add_node", "add_edge"]);

        let result = MutationEngine::new().apply(&mut current, &batch);
        assert!(result.is_complete());
        assert!(current.find_node_by_name("well").is_none());
        assert_eq!(current.edge_count(), 1);
    }

    #[test]
    fn test_parse_edit_response_with_operations() {
        let current = SceneGraph::new("g1", "Town");
        let batch = parse_edit_response(
            r#"{"operations": [{"op": "add_node", "name": "Inn"}]}"#,
            &current,
        )
        .unwrap();
        assert_eq!(batch.len(), 1);

        assert!(parse_edit_response(r#"{"foo": 1}"#, &current).is_err());
    }
}
