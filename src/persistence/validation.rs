//! Structural checks for a whole hierarchy
//!
//! Run on every snapshot load and available to callers through
//! [`Forest::check_invariants`](crate::hierarchy::Forest::check_invariants).
//! Per-graph rules (unique ids, no dangling or self-looping edges) are
//! enforced by [`SceneGraph`] itself; this module covers the links between
//! graphs.

use crate::graph::{GraphError, GraphId, SceneGraph};
use crate::hierarchy::Forest;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// The invariant a corrupt hierarchy violates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionKind {
    /// Document does not have the expected shape
    Malformed,
    /// A graph is stored under a key other than its own id
    KeyMismatch,
    /// The same graph id is stored twice
    DuplicateGraphId,
    /// More than one graph has no parent link
    MultipleRoots,
    /// The declared root graph is absent
    MissingRoot,
    /// The declared root graph has a parent link
    RootMismatch,
    /// A node points at a child graph that does not exist
    DanglingChildGraph,
    /// A parent link and the owning node's child reference disagree
    BrokenParentLink,
    /// Following parent links never reaches the root
    ParentCycle,
    DuplicateNodeId,
    DuplicateEdgeId,
    /// An edge endpoint is not a node of its graph
    DanglingEdge,
    SelfLoop,
    /// A retired graph or node id is live again
    RetiredIdInUse,
    /// The navigation path does not follow expanded nodes from the root
    InvalidActivePath,
    /// A render artifact belongs to no graph
    OrphanArtifact,
    /// A graph's depth is not its parent's depth plus one
    DepthMismatch,
}

impl CorruptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorruptionKind::Malformed => "malformed",
            CorruptionKind::KeyMismatch => "key_mismatch",
            CorruptionKind::DuplicateGraphId => "duplicate_graph_id",
            CorruptionKind::MultipleRoots => "multiple_roots",
            CorruptionKind::MissingRoot => "missing_root",
            CorruptionKind::RootMismatch => "root_mismatch",
            CorruptionKind::DanglingChildGraph => "dangling_child_graph",
            CorruptionKind::BrokenParentLink => "broken_parent_link",
            CorruptionKind::ParentCycle => "parent_cycle",
            CorruptionKind::DuplicateNodeId => "duplicate_node_id",
            CorruptionKind::DuplicateEdgeId => "duplicate_edge_id",
            CorruptionKind::DanglingEdge => "dangling_edge",
            CorruptionKind::SelfLoop => "self_loop",
            CorruptionKind::RetiredIdInUse => "retired_id_in_use",
            CorruptionKind::InvalidActivePath => "invalid_active_path",
            CorruptionKind::OrphanArtifact => "orphan_artifact",
            CorruptionKind::DepthMismatch => "depth_mismatch",
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {detail}")]
pub struct Corruption {
    pub kind: CorruptionKind,
    pub detail: String,
}

impl Corruption {
    pub fn new(kind: CorruptionKind, detail: impl Into<String>) -> Self {
        Corruption {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a graph-level rejection raised while rebuilding `graph`
    pub(crate) fn from_graph_error(graph: &GraphId, error: GraphError) -> Self {
        let kind = match &error {
            GraphError::DuplicateNodeId(_) => CorruptionKind::DuplicateNodeId,
            GraphError::DuplicateEdgeId(_) => CorruptionKind::DuplicateEdgeId,
            GraphError::DanglingReference(_) => CorruptionKind::DanglingEdge,
            GraphError::SelfLoop(_) => CorruptionKind::SelfLoop,
            _ => CorruptionKind::Malformed,
        };
        Corruption::new(kind, format!("graph {}: {}", graph, error))
    }
}

type Check = Result<(), Corruption>;

/// Check every cross-graph invariant of `forest`
pub fn validate_forest(forest: &Forest) -> Check {
    check_keys(forest)?;
    check_roots(forest)?;
    check_parent_chains(forest)?;
    check_links(forest)?;
    check_depths(forest)?;
    check_edges(forest)?;
    check_retired(forest)?;
    check_active_path(forest)
}

fn check_keys(forest: &Forest) -> Check {
    for (key, graph) in forest.graph_ids().zip(forest.graphs()) {
        if key != graph.id() {
            return Err(Corruption::new(
                CorruptionKind::KeyMismatch,
                format!("graph {} stored under key {}", graph.id(), key),
            ));
        }
    }
    Ok(())
}

fn check_roots(forest: &Forest) -> Check {
    let root = forest.root().ok_or_else(|| {
        Corruption::new(
            CorruptionKind::MissingRoot,
            format!("root graph {} is not present", forest.root_id()),
        )
    })?;
    if let Some(link) = root.parent_link() {
        return Err(Corruption::new(
            CorruptionKind::RootMismatch,
            format!("root graph {} has parent {}/{}", root.id(), link.graph_id, link.node_id),
        ));
    }

    let extra: Vec<&str> = forest
        .graphs()
        .filter(|g| g.parent_link().is_none() && g.id() != root.id())
        .map(|g| g.id().as_str())
        .collect();
    if !extra.is_empty() {
        return Err(Corruption::new(
            CorruptionKind::MultipleRoots,
            format!("graphs without parent besides {}: {}", root.id(), extra.join(", ")),
        ));
    }
    Ok(())
}

/// Every parent chain must end at the root within `len` steps
fn check_parent_chains(forest: &Forest) -> Check {
    let limit = forest.len();
    for graph in forest.graphs() {
        let mut current = graph;
        let mut steps = 0;
        while let Some(link) = current.parent_link() {
            steps += 1;
            if steps > limit {
                return Err(Corruption::new(
                    CorruptionKind::ParentCycle,
                    format!("parent chain of graph {} loops", graph.id()),
                ));
            }
            current = forest.graph(&link.graph_id).ok_or_else(|| {
                Corruption::new(
                    CorruptionKind::BrokenParentLink,
                    format!("graph {} names missing parent {}", current.id(), link.graph_id),
                )
            })?;
        }
    }
    Ok(())
}

/// Parent links and child references must mirror each other
fn check_links(forest: &Forest) -> Check {
    for graph in forest.graphs() {
        if let Some(link) = graph.parent_link() {
            let owner = forest
                .graph(&link.graph_id)
                .and_then(|parent| parent.get_node(&link.node_id));
            match owner.and_then(|n| n.child_graph_id.as_ref()) {
                Some(child) if child == graph.id() => {}
                _ => {
                    return Err(Corruption::new(
                        CorruptionKind::BrokenParentLink,
                        format!(
                            "graph {} claims owner {}/{} which does not point back",
                            graph.id(),
                            link.graph_id,
                            link.node_id
                        ),
                    ))
                }
            }
        }

        let mut seen = HashSet::new();
        for (node, child_id) in graph.child_graph_ids() {
            let child = forest.graph(child_id).ok_or_else(|| {
                Corruption::new(
                    CorruptionKind::DanglingChildGraph,
                    format!("node {}/{} points at missing graph {}", graph.id(), node, child_id),
                )
            })?;
            let back = child
                .parent_link()
                .map_or(false, |l| &l.graph_id == graph.id() && &l.node_id == node);
            if !back || !seen.insert(child_id) {
                return Err(Corruption::new(
                    CorruptionKind::BrokenParentLink,
                    format!("graph {} is not owned by node {}/{}", child_id, graph.id(), node),
                ));
            }
        }
    }
    Ok(())
}

fn check_depths(forest: &Forest) -> Check {
    for graph in forest.graphs() {
        let expected = match graph.parent_link() {
            None => Some(0),
            Some(link) => forest
                .graph(&link.graph_id)
                .map_or(Some(0), |parent| parent.depth().checked_add(1)),
        };
        match expected {
            Some(depth) if depth == graph.depth() => {}
            Some(depth) => {
                return Err(Corruption::new(
                    CorruptionKind::DepthMismatch,
                    format!("graph {} has depth {}, expected {}", graph.id(), graph.depth(), depth),
                ))
            }
            None => {
                return Err(Corruption::new(
                    CorruptionKind::DepthMismatch,
                    format!("parent of graph {} has an unrepresentable depth", graph.id()),
                ))
            }
        }
    }
    Ok(())
}

fn check_edges(forest: &Forest) -> Check {
    for graph in forest.graphs() {
        check_graph_edges(graph)?;
    }
    Ok(())
}

fn check_graph_edges(graph: &SceneGraph) -> Check {
    for edge in graph.edges() {
        if edge.source == edge.target {
            return Err(Corruption::new(
                CorruptionKind::SelfLoop,
                format!("graph {}: edge {} loops on {}", graph.id(), edge.id, edge.source),
            ));
        }
        if !graph.contains_node(&edge.source) || !graph.contains_node(&edge.target) {
            return Err(Corruption::new(
                CorruptionKind::DanglingEdge,
                format!("graph {}: edge {} has a missing endpoint", graph.id(), edge.id),
            ));
        }
    }
    Ok(())
}

fn check_retired(forest: &Forest) -> Check {
    if let Some(id) = forest.graph_ids().find(|id| forest.is_retired(id)) {
        return Err(Corruption::new(
            CorruptionKind::RetiredIdInUse,
            format!("graph id {} is retired but present", id),
        ));
    }
    for graph in forest.graphs() {
        if let Some(node) = graph.retired_node_ids().find(|id| graph.contains_node(id)) {
            return Err(Corruption::new(
                CorruptionKind::RetiredIdInUse,
                format!("graph {}: node id {} is retired but present", graph.id(), node),
            ));
        }
    }
    Ok(())
}

/// Each step must enter an expanded node of the graph the previous step opened
fn check_active_path(forest: &Forest) -> Check {
    let mut current = forest.root_id().clone();
    for (i, step) in forest.active_path().iter().enumerate() {
        let child = (step.graph_id == current)
            .then(|| forest.graph(&step.graph_id))
            .flatten()
            .and_then(|g| g.get_node(&step.node_id))
            .and_then(|n| n.child_graph_id.clone())
            .filter(|c| forest.contains(c));
        match child {
            Some(child) => current = child,
            None => {
                return Err(Corruption::new(
                    CorruptionKind::InvalidActivePath,
                    format!("step {} ({}/{}) does not lead to a graph", i, step.graph_id, step.node_id),
                ))
            }
        }
    }
    Ok(())
}
