//! Mutation engine
//!
//! Applies an ordered batch of edit operations to one scene graph. Each
//! operation is validated against the graph as left by the operations before
//! it. A failing operation is skipped and reported; the rest of the batch
//! still runs and nothing is rolled back.
//!
//! Batches that remove and touch the same node are resolved by position:
//! - an update before the removal applies, then leaves with the node
//! - an update or edge after the removal is skipped with `NodeNotFound`
//! - re-adding the removed id is skipped with `DuplicateNodeId`
//!
//! Expansion requests are only validated here. They are returned in
//! [`ApplyResult::expansions`] for the hierarchy to run once the structural
//! operations are in.

pub mod layout;
pub mod operation;

pub use operation::{NodeSpec, Operation, OperationBatch};

use crate::graph::{EdgeId, GraphError, GraphId, NodeId, SceneGraph};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Node {0} is not expandable")]
    NotExpandable(NodeId),
}

impl MutationError {
    /// Whether the operation failed because a referenced node or edge is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MutationError::Graph(
                GraphError::NodeNotFound(_)
                    | GraphError::EdgeNotFound(_)
                    | GraphError::NoEdgeBetween(_, _)
                    | GraphError::DanglingReference(_)
            )
        )
    }
}

pub type MutationResult<T> = Result<T, MutationError>;

/// What an applied operation did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NodeAdded(NodeId),
    NodeUpdated(NodeId),
    NodeRemoved {
        id: NodeId,
        edges_removed: usize,
        orphaned: Option<GraphId>,
    },
    EdgeAdded(EdgeId),
    EdgesUpdated(usize),
    EdgesRemoved(usize),
    ExpansionQueued(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOp {
    pub index: usize,
    pub op: Operation,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedOp {
    pub index: usize,
    pub op: Operation,
    pub error: MutationError,
}

/// Validated drill-down request, run by the hierarchy after the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionRequest {
    pub index: usize,
    pub node_id: NodeId,
}

/// Full report of a batch application
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResult {
    pub applied: Vec<AppliedOp>,
    pub skipped: Vec<SkippedOp>,
    /// Ids of nodes created by the batch, in order
    pub created: Vec<NodeId>,
    /// Child graphs whose owning node was removed
    pub orphaned: Vec<GraphId>,
    pub expansions: Vec<ExpansionRequest>,
}

impl ApplyResult {
    pub fn applied_indices(&self) -> Vec<usize> {
        self.applied.iter().map(|a| a.index).collect()
    }

    pub fn skipped_indices(&self) -> Vec<usize> {
        self.skipped.iter().map(|s| s.index).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.skipped.len()
    }
}

/// Applies operation batches to scene graphs
#[derive(Debug, Clone)]
pub struct MutationEngine {
    /// Accept exact node names where an id is expected
    resolve_names: bool,
}

impl Default for MutationEngine {
    fn default() -> Self {
        MutationEngine {
            resolve_names: true,
        }
    }
}

impl MutationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept node ids as references
    pub fn strict() -> Self {
        MutationEngine {
            resolve_names: false,
        }
    }

    /// Apply `batch` to `graph` in order, best-effort
    pub fn apply(&self, graph: &mut SceneGraph, batch: &OperationBatch) -> ApplyResult {
        let mut result = ApplyResult::default();

        for (index, op) in batch.iter().enumerate() {
            match self.apply_one(graph, op) {
                Ok(outcome) => {
                    match &outcome {
                        Outcome::NodeAdded(id) => result.created.push(id.clone()),
                        Outcome::NodeRemoved {
                            orphaned: Some(child),
                            ..
                        } => result.orphaned.push(child.clone()),
                        Outcome::ExpansionQueued(id) => result.expansions.push(ExpansionRequest {
                            index,
                            node_id: id.clone(),
                        }),
                        _ => {}
                    }
                    result.applied.push(AppliedOp {
                        index,
                        op: op.clone(),
                        outcome,
                    });
                }
                Err(error) => {
                    debug!("Skipping {} at {}: {}", op.kind(), index, error);
                    result.skipped.push(SkippedOp {
                        index,
                        op: op.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "Applied batch to graph {}: {} applied, {} skipped, {} expansions queued",
            graph.id(),
            result.applied.len(),
            result.skipped.len(),
            result.expansions.len()
        );
        result
    }

    /// Apply a single operation with the same validation as a batch
    pub fn apply_one(&self, graph: &mut SceneGraph, op: &Operation) -> MutationResult<Outcome> {
        match op {
            Operation::AddNode(spec) => Ok(Outcome::NodeAdded(self.add_node(graph, spec.clone())?)),

            Operation::UpdateNode { id, changes } => {
                let id = self.resolve(graph, id)?;
                graph.update_node(&id, changes)?;
                Ok(Outcome::NodeUpdated(id))
            }

            Operation::RemoveNode { id } => {
                let id = self.resolve(graph, id)?;
                let removed = graph.remove_node(&id)?;
                Ok(Outcome::NodeRemoved {
                    edges_removed: removed.edges.len(),
                    orphaned: removed.orphaned_child().cloned(),
                    id,
                })
            }

            Operation::AddEdge {
                source,
                target,
                relation,
                label,
            } => {
                let source = self.resolve_endpoint(graph, source);
                let target = self.resolve_endpoint(graph, target);
                let id = graph.add_labeled_edge(&source, &target, relation.as_str(), label.as_str())?;
                Ok(Outcome::EdgeAdded(id))
            }

            Operation::UpdateEdge {
                source,
                target,
                relation,
            } => {
                let source = self.resolve(graph, source)?;
                let target = self.resolve(graph, target)?;
                let count = graph.relabel_edges_between(&source, &target, relation)?;
                Ok(Outcome::EdgesUpdated(count))
            }

            Operation::RemoveEdge {
                source,
                target,
                relation,
            } => {
                let source = self.resolve(graph, source)?;
                let target = self.resolve(graph, target)?;
                let removed = graph.remove_edges_between(&source, &target, relation.as_deref())?;
                Ok(Outcome::EdgesRemoved(removed.len()))
            }

            Operation::Expand { id } => {
                let id = self.resolve(graph, id)?;
                let node = graph
                    .get_node(&id)
                    .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
                if !node.expandable {
                    return Err(MutationError::NotExpandable(id));
                }
                Ok(Outcome::ExpansionQueued(id))
            }
        }
    }

    /// Add a node, placing it semantically when no position is given
    pub fn add_node(&self, graph: &mut SceneGraph, spec: NodeSpec) -> MutationResult<NodeId> {
        let position = match spec.position {
            Some(position) => position,
            None => layout::place(graph, &spec.semantic_type, &spec.name),
        };
        Ok(graph.add_node(spec.into_node(position))?)
    }

    fn resolve(&self, graph: &SceneGraph, reference: &NodeId) -> MutationResult<NodeId> {
        if graph.contains_node(reference) {
            return Ok(reference.clone());
        }
        if self.resolve_names {
            if let Some(node) = graph.find_node_by_name(reference.as_str()) {
                return Ok(node.id.clone());
            }
        }
        Err(GraphError::NodeNotFound(reference.clone()).into())
    }

    /// Edge endpoints fall through unresolved so the graph reports the
    /// dangling reference itself
    fn resolve_endpoint(&self, graph: &SceneGraph, reference: &NodeId) -> NodeId {
        self.resolve(graph, reference)
            .unwrap_or_else(|_| reference.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LayoutBand, NodeUpdate, SceneNode};

    fn square() -> SceneGraph {
        let mut graph = SceneGraph::new("g1", "Market");
        graph
            .add_node(SceneNode::new("plaza", "Central Plaza"))
            .unwrap();
        graph
            .add_node(SceneNode::new("gate", "Main Gate").with_position(-0.8, 0.3))
            .unwrap();
        graph
    }

    #[test]
    fn test_partial_success() {
        let mut graph = square();
        let batch = OperationBatch::new(vec![
            Operation::add_node(NodeSpec::new("Fountain").with_id("fountain")),
            Operation::add_edge("fountain", "plaza", "inside"),
            Operation::update_node("ghost", NodeUpdate::default().name("Boo")),
            Operation::update_node("gate", NodeUpdate::default().description("Open")),
            Operation::remove_edge("fountain", "plaza"),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);

        assert_eq!(result.applied_indices(), vec![0, 1, 3, 4]);
        assert_eq!(result.skipped_indices(), vec![2]);
        assert_eq!(
            result.skipped[0].error,
            MutationError::Graph(GraphError::NodeNotFound(NodeId::new("ghost")))
        );
        assert!(result.skipped[0].error.is_not_found());

        assert!(graph.contains_node(&"fountain".into()));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.get_node(&"gate".into()).unwrap().description, "Open");
    }

    #[test]
    fn test_later_ops_see_earlier_additions() {
        let mut graph = square();
        let batch = OperationBatch::new(vec![
            Operation::add_node(NodeSpec::new("Well")),
            Operation::add_edge("Well", "plaza", "near"),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);
        assert!(result.is_complete());
        assert_eq!(result.created.len(), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_strict_engine_ignores_names() {
        let mut graph = square();
        let op = Operation::remove_node("Main Gate");
        assert!(MutationEngine::strict().apply_one(&mut graph, &op).is_err());
        assert!(MutationEngine::new().apply_one(&mut graph, &op).is_ok());
    }

    #[test]
    fn test_update_before_remove_applies() {
        let mut graph = square();
        let batch = OperationBatch::new(vec![
            Operation::update_node("gate", NodeUpdate::default().name("Old Gate")),
            Operation::remove_node("gate"),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);
        assert_eq!(result.applied_indices(), vec![0, 1]);
        assert!(!graph.contains_node(&"gate".into()));
    }

    #[test]
    fn test_update_after_remove_is_skipped() {
        let mut graph = square();
        let batch = OperationBatch::new(vec![
            Operation::remove_node("gate"),
            Operation::update_node("gate", NodeUpdate::default().name("Ghost Gate")),
            Operation::add_node(NodeSpec::new("Gate Again").with_id("gate")),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);
        assert_eq!(result.applied_indices(), vec![0]);
        assert_eq!(
            result.skipped[0].error,
            MutationError::Graph(GraphError::NodeNotFound(NodeId::new("gate")))
        );
        assert_eq!(
            result.skipped[1].error,
            MutationError::Graph(GraphError::DuplicateNodeId(NodeId::new("gate")))
        );
    }

    #[test]
    fn test_sky_and_underground_land_on_opposite_extremes() {
        let mut graph = SceneGraph::new("g1", "Empty");
        let engine = MutationEngine::new();
        engine
            .add_node(&mut graph, NodeSpec::new("Clouds").with_id("a").with_type("sky"))
            .unwrap();
        engine
            .add_node(&mut graph, NodeSpec::new("Depths").with_id("b").with_type("underground"))
            .unwrap();

        let a = graph.get_node(&"a".into()).unwrap().position;
        let b = graph.get_node(&"b".into()).unwrap().position;
        assert!(a.y > 0.5 && b.y < -0.5);
        assert_eq!(layout::band_of(a), Some(LayoutBand::Sky));
        assert_eq!(layout::band_of(b), Some(LayoutBand::Underground));
    }

    #[test]
    fn test_explicit_position_is_kept() {
        let mut graph = square();
        let id = MutationEngine::new()
            .add_node(&mut graph, NodeSpec::new("Stall").at(0.4, 0.1))
            .unwrap();
        assert_eq!(graph.get_node(&id).unwrap().position.x, 0.4);
    }

    #[test]
    fn test_expand_is_queued_not_applied() {
        let mut graph = square();
        graph
            .add_node(SceneNode::new("well", "Well").with_expandable(false))
            .unwrap();
        let batch = OperationBatch::new(vec![
            Operation::expand("plaza"),
            Operation::expand("well"),
            Operation::expand("nowhere"),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);
        assert_eq!(
            result.expansions,
            vec![ExpansionRequest {
                index: 0,
                node_id: NodeId::new("plaza")
            }]
        );
        assert_eq!(result.skipped[0].error, MutationError::NotExpandable(NodeId::new("well")));
        assert!(result.skipped[1].error.is_not_found());
        assert!(graph.get_node(&"plaza".into()).unwrap().child_graph_id.is_none());
    }

    #[test]
    fn test_removal_reports_orphaned_child() {
        let mut graph = square();
        graph.link_child(&"plaza".into(), GraphId::new("g2")).unwrap();

        let result = MutationEngine::new().apply(
            &mut graph,
            &OperationBatch::new(vec![Operation::remove_node("plaza")]),
        );
        assert_eq!(result.orphaned, vec![GraphId::new("g2")]);
    }

    #[test]
    fn test_failed_ops_leave_graph_unchanged() {
        let mut graph = square();
        let before = graph.clone();
        let batch = OperationBatch::new(vec![
            Operation::add_edge("plaza", "plaza", "near"),
            Operation::add_edge("plaza", "ghost", "near"),
            Operation::add_node(NodeSpec::new("Dup").with_id("plaza")),
            Operation::remove_edge("plaza", "gate"),
        ]);

        let result = MutationEngine::new().apply(&mut graph, &batch);
        assert!(result.applied.is_empty());
        assert_eq!(graph, before);
    }
}
