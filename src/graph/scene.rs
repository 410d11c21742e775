//! Scene graph container
//!
//! One level of the world: nodes, the edges between them, an optional link to
//! the parent node that owns this graph, and an optional render artifact.
//!
//! Invariants kept by every operation here:
//! - node ids are unique and never reused, even after removal
//! - edge endpoints exist in this graph and differ from each other
//! - removing a node removes every edge touching it

use super::artifact::{now_millis, RenderArtifact};
use super::edge::SceneEdge;
use super::node::{NodeUpdate, SceneNode};
use super::types::{EdgeId, ExpansionState, GraphId, NodeId, ParentLink, Position, SemanticType};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised by graph-level operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Also raised for ids that belonged to a removed node
    #[error("Node id {0} is already in use in this graph")]
    DuplicateNodeId(NodeId),

    #[error("Edge {0} already exists")]
    DuplicateEdgeId(EdgeId),

    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("No edge between {0} and {1}")]
    NoEdgeBetween(NodeId, NodeId),

    #[error("Dangling reference: node {0} does not exist in this graph")]
    DanglingReference(NodeId),

    #[error("Self-loop on node {0} is not permitted")]
    SelfLoop(NodeId),

    #[error("Node {0} owns a child graph and cannot be made non-expandable")]
    ChildGraphAttached(NodeId),

    #[error("Position {1} of node {0} is outside the layout square")]
    InvalidPosition(NodeId, Position),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Everything a node removal took out of the graph
#[derive(Debug, Clone)]
pub struct RemovedNode {
    pub node: SceneNode,
    pub edges: Vec<SceneEdge>,
}

impl RemovedNode {
    /// Child graph left without an owner; the hierarchy must prune it
    pub fn orphaned_child(&self) -> Option<&GraphId> {
        self.node.child_graph_id.as_ref()
    }
}

/// A single scene graph
#[derive(Debug, Clone)]
pub struct SceneGraph {
    id: GraphId,

    pub name: String,

    /// Prompt this graph was generated from
    pub master_prompt: String,

    depth: u32,

    parent: Option<ParentLink>,

    created_at: i64,

    nodes: IndexMap<NodeId, SceneNode>,

    edges: IndexMap<EdgeId, SceneEdge>,

    /// Incident edges per node
    adjacency: HashMap<NodeId, Vec<EdgeId>>,

    /// Ids of removed nodes
    retired_nodes: BTreeSet<NodeId>,

    next_node_seq: u64,

    next_edge_id: u64,

    render_artifact: Option<RenderArtifact>,
}

impl SceneGraph {
    pub fn new(id: impl Into<GraphId>, name: impl Into<String>) -> Self {
        SceneGraph {
            id: id.into(),
            name: name.into(),
            master_prompt: String::new(),
            depth: 0,
            parent: None,
            created_at: now_millis(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            adjacency: HashMap::new(),
            retired_nodes: BTreeSet::new(),
            next_node_seq: 1,
            next_edge_id: 1,
            render_artifact: None,
        }
    }

    pub fn id(&self) -> &GraphId {
        &self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent_link(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn set_id(&mut self, id: GraphId) {
        self.id = id;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ParentLink>, depth: u32) {
        self.parent = parent;
        self.depth = depth;
    }

    pub(crate) fn set_created_at(&mut self, created_at: i64) {
        self.created_at = created_at;
    }

    // ==================== Nodes ====================

    /// Add a node, allocating an id when the node's id is empty
    ///
    /// Any child link carried by the incoming node is dropped: child graphs
    /// are attached by the hierarchy only.
    pub fn add_node(&mut self, mut node: SceneNode) -> GraphResult<NodeId> {
        if node.id.as_str().trim().is_empty() {
            node.id = self.allocate_node_id();
        }
        if !node.position.in_unit_square() {
            return Err(GraphError::InvalidPosition(node.id, node.position));
        }
        node.child_graph_id = None;
        self.insert_node(node)
    }

    fn insert_node(&mut self, node: SceneNode) -> GraphResult<NodeId> {
        if self.nodes.contains_key(&node.id) || self.retired_nodes.contains(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id));
        }
        let id = node.id.clone();
        self.adjacency.insert(id.clone(), Vec::new());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Next free `n<seq>` id, skipping live and retired ids
    pub fn allocate_node_id(&mut self) -> NodeId {
        loop {
            let candidate = NodeId::new(format!("n{}", self.next_node_seq));
            self.next_node_seq += 1;
            if !self.is_node_id_taken(&candidate) {
                return candidate;
            }
        }
    }

    /// Whether `id` is live or was used by a removed node
    pub fn is_node_id_taken(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id) || self.retired_nodes.contains(id)
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Merge the provided fields into a node
    ///
    /// Position changes never move sibling nodes.
    pub fn update_node(&mut self, id: &NodeId, update: &NodeUpdate) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        if let Some(position) = update.position {
            if !position.in_unit_square() {
                return Err(GraphError::InvalidPosition(id.clone(), position));
            }
        }
        if update.expandable == Some(false) && node.child_graph_id.is_some() {
            return Err(GraphError::ChildGraphAttached(id.clone()));
        }

        node.merge(update);
        Ok(())
    }

    /// Remove a node and every edge touching it
    ///
    /// The node id is retired. If the node owned a child graph, the returned
    /// value names it so the hierarchy can prune that subtree.
    pub fn remove_node(&mut self, id: &NodeId) -> GraphResult<RemovedNode> {
        let node = self
            .nodes
            .shift_remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        let incident = self.adjacency.remove(id).unwrap_or_default();
        let mut edges = Vec::with_capacity(incident.len());
        for edge_id in incident {
            if let Some(edge) = self.detach_edge(edge_id) {
                edges.push(edge);
            }
        }

        self.retired_nodes.insert(id.clone());
        Ok(RemovedNode { node, edges })
    }

    // ==================== Edges ====================

    pub fn add_edge(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        relation: impl Into<String>,
    ) -> GraphResult<EdgeId> {
        let id = EdgeId::new(self.next_edge_id);
        let edge = SceneEdge::new(id, source.clone(), target.clone(), relation);
        self.insert_edge(edge)
    }

    pub fn add_labeled_edge(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        relation: impl Into<String>,
        label: impl Into<String>,
    ) -> GraphResult<EdgeId> {
        let id = self.add_edge(source, target, relation)?;
        if let Some(edge) = self.edges.get_mut(&id) {
            edge.label = label.into();
        }
        Ok(id)
    }

    fn insert_edge(&mut self, edge: SceneEdge) -> GraphResult<EdgeId> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(GraphError::DanglingReference(edge.source));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(GraphError::DanglingReference(edge.target));
        }
        if edge.source == edge.target {
            return Err(GraphError::SelfLoop(edge.source));
        }
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdgeId(edge.id));
        }

        let id = edge.id;
        self.next_edge_id = self.next_edge_id.max(id.as_u64() + 1);
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .push(id);
        self.adjacency
            .entry(edge.target.clone())
            .or_default()
            .push(id);
        self.edges.insert(id, edge);
        Ok(id)
    }

    fn detach_edge(&mut self, id: EdgeId) -> Option<SceneEdge> {
        let edge = self.edges.shift_remove(&id)?;
        for endpoint in [&edge.source, &edge.target] {
            if let Some(list) = self.adjacency.get_mut(endpoint) {
                list.retain(|e| *e != id);
            }
        }
        Some(edge)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> GraphResult<SceneEdge> {
        self.detach_edge(id).ok_or(GraphError::EdgeNotFound(id))
    }

    /// Remove the edges joining `a` and `b`, optionally only one relation
    pub fn remove_edges_between(
        &mut self,
        a: &NodeId,
        b: &NodeId,
        relation: Option<&str>,
    ) -> GraphResult<Vec<SceneEdge>> {
        let ids = self.matching_edges(a, b, relation)?;
        Ok(ids.into_iter().filter_map(|id| self.detach_edge(id)).collect())
    }

    /// Set the relation of every edge joining `a` and `b`
    pub fn relabel_edges_between(
        &mut self,
        a: &NodeId,
        b: &NodeId,
        relation: &str,
    ) -> GraphResult<usize> {
        let ids = self.matching_edges(a, b, None)?;
        for id in &ids {
            if let Some(edge) = self.edges.get_mut(id) {
                edge.relation = relation.to_string();
            }
        }
        Ok(ids.len())
    }

    fn matching_edges(
        &self,
        a: &NodeId,
        b: &NodeId,
        relation: Option<&str>,
    ) -> GraphResult<Vec<EdgeId>> {
        for endpoint in [a, b] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::NodeNotFound(endpoint.clone()));
            }
        }
        let ids: Vec<EdgeId> = self
            .edges_of(a)
            .into_iter()
            .filter(|e| e.connects(a, b))
            .filter(|e| relation.map_or(true, |r| e.relation == r))
            .map(|e| e.id)
            .collect();
        if ids.is_empty() {
            return Err(GraphError::NoEdgeBetween(a.clone(), b.clone()));
        }
        Ok(ids)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&SceneEdge> {
        self.edges.get(&id)
    }

    /// Edges touching `node`, O(degree)
    pub fn edges_of(&self, node: &NodeId) -> Vec<&SceneEdge> {
        self.adjacency
            .get(node)
            .map(|ids| ids.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn edge_between(&self, a: &NodeId, b: &NodeId) -> Option<&SceneEdge> {
        self.edges_of(a).into_iter().find(|e| e.connects(a, b))
    }

    // ==================== Queries ====================

    pub fn neighbors(&self, node: &NodeId) -> Vec<&SceneNode> {
        self.edges_of(node)
            .into_iter()
            .filter_map(|e| e.other(node))
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn find_nodes_by_type(&self, semantic_type: &SemanticType) -> Vec<&SceneNode> {
        self.nodes
            .values()
            .filter(|n| &n.semantic_type == semantic_type)
            .collect()
    }

    /// Case-insensitive exact name lookup
    pub fn find_node_by_name(&self, name: &str) -> Option<&SceneNode> {
        let needle = name.trim().to_lowercase();
        self.nodes.values().find(|n| n.name.to_lowercase() == needle)
    }

    pub fn expansion_state(&self, id: &NodeId) -> Option<ExpansionState> {
        self.nodes.get(id).map(SceneNode::expansion_state)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &SceneEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn retired_node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.retired_nodes.iter()
    }

    /// Child graphs referenced by nodes of this graph
    pub fn child_graph_ids(&self) -> impl Iterator<Item = (&NodeId, &GraphId)> {
        self.nodes
            .values()
            .filter_map(|n| n.child_graph_id.as_ref().map(|c| (&n.id, c)))
    }

    pub(crate) fn node_seq(&self) -> u64 {
        self.next_node_seq
    }

    pub(crate) fn edge_seq(&self) -> u64 {
        self.next_edge_id
    }

    // ==================== Hierarchy links ====================

    pub(crate) fn link_child(&mut self, node: &NodeId, child: GraphId) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.clone()))?;
        node.child_graph_id = Some(child);
        Ok(())
    }

    pub(crate) fn unlink_child(&mut self, node: &NodeId) -> Option<GraphId> {
        self.nodes.get_mut(node).and_then(|n| n.child_graph_id.take())
    }

    // ==================== Render artifact ====================

    pub fn render_artifact(&self) -> Option<&RenderArtifact> {
        self.render_artifact.as_ref()
    }

    pub fn set_render_artifact(&mut self, artifact: RenderArtifact) {
        self.render_artifact = Some(artifact);
    }

    pub fn clear_render_artifact(&mut self) -> Option<RenderArtifact> {
        self.render_artifact.take()
    }

    /// Rebuild a graph from stored parts, enforcing every graph invariant
    ///
    /// Child links on nodes are kept as stored; the caller checks them
    /// against the rest of the hierarchy.
    pub(crate) fn restore(
        mut self,
        nodes: Vec<SceneNode>,
        edges: Vec<SceneEdge>,
        retired: impl IntoIterator<Item = NodeId>,
        node_seq: u64,
        edge_seq: u64,
    ) -> GraphResult<Self> {
        self.retired_nodes = retired.into_iter().collect();
        for node in nodes {
            if !node.position.in_unit_square() {
                return Err(GraphError::InvalidPosition(node.id, node.position));
            }
            self.insert_node(node)?;
        }
        for edge in edges {
            self.insert_edge(edge)?;
        }
        self.next_node_seq = self.next_node_seq.max(node_seq);
        self.next_edge_id = self.next_edge_id.max(edge_seq);
        Ok(self)
    }

    /// Compact JSON view of the scene used in prompts for external services
    pub fn to_prompt_json(&self) -> String {
        #[derive(Serialize)]
        struct View<'a> {
            name: &'a str,
            prompt: &'a str,
            depth: u32,
            nodes: Vec<&'a SceneNode>,
            edges: Vec<&'a SceneEdge>,
        }

        let view = View {
            name: &self.name,
            prompt: &self.master_prompt,
            depth: self.depth,
            nodes: self.nodes.values().collect(),
            edges: self.edges.values().collect(),
        };
        serde_json::to_string_pretty(&view).unwrap_or_default()
    }
}

/// Structural equality: identity, links, content and order
impl PartialEq for SceneGraph {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.master_prompt == other.master_prompt
            && self.depth == other.depth
            && self.parent == other.parent
            && self.created_at == other.created_at
            && self.nodes.iter().eq(other.nodes.iter())
            && self.edges.iter().eq(other.edges.iter())
            && self.retired_nodes == other.retired_nodes
            && self.render_artifact == other.render_artifact
    }
}
