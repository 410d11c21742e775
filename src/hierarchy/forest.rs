//! The forest of scene graphs
//!
//! All graph lifetimes are owned here. Nodes reference child graphs by id and
//! child graphs point back with a `(graph, node)` parent link; every public
//! operation keeps both directions in step and prunes subtrees whose owning
//! node disappears.

use super::{HierarchyError, HierarchyResult};
use crate::graph::{
    EdgeId, GraphError, GraphId, NodeId, NodeUpdate, ParentLink, RemovedNode, RenderArtifact,
    SceneGraph,
};
use crate::mutation::{ApplyResult, MutationEngine, NodeSpec, OperationBatch};
use crate::persistence::validation::{validate_forest, Corruption};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

/// One drill-down step: node `node_id` of graph `graph_id` was entered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub graph_id: GraphId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub graph_id: GraphId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Forest {
    /// Distinguishes this forest from any that replaced it
    instance: Uuid,
    graphs: IndexMap<GraphId, SceneGraph>,
    root: GraphId,
    active_path: Vec<PathStep>,
    graph_seq: u64,
    retired: BTreeSet<GraphId>,
}

impl Forest {
    /// Start a hierarchy from its root graph
    pub fn new(mut root: SceneGraph) -> Self {
        let mut forest = Forest {
            instance: Uuid::new_v4(),
            graphs: IndexMap::new(),
            root: GraphId::new(""),
            active_path: Vec::new(),
            graph_seq: 1,
            retired: BTreeSet::new(),
        };

        let id = if root.id().as_str().trim().is_empty() {
            forest.allocate_graph_id()
        } else {
            root.id().clone()
        };
        root.set_id(id.clone());
        root.set_parent(None, 0);
        forest.root = id.clone();
        forest.graphs.insert(id.clone(), root);

        info!("Created hierarchy {} with root graph {}", forest.instance, id);
        forest
    }

    pub fn empty(name: &str) -> Self {
        Self::new(SceneGraph::new("", name))
    }

    /// Assemble a forest from stored parts without checking it
    pub(crate) fn from_parts(
        root: GraphId,
        graphs: IndexMap<GraphId, SceneGraph>,
        active_path: Vec<PathStep>,
        graph_seq: u64,
        retired: BTreeSet<GraphId>,
    ) -> Self {
        Forest {
            instance: Uuid::new_v4(),
            graphs,
            root,
            active_path,
            graph_seq,
            retired,
        }
    }

    pub(crate) fn instance(&self) -> Uuid {
        self.instance
    }

    /// Check every structural invariant of the hierarchy
    pub fn check_invariants(&self) -> Result<(), Corruption> {
        validate_forest(self)
    }

    // ==================== Graph access ====================

    pub fn root_id(&self) -> &GraphId {
        &self.root
    }

    pub fn root(&self) -> Option<&SceneGraph> {
        self.graphs.get(&self.root)
    }

    pub fn graph(&self, id: &GraphId) -> Option<&SceneGraph> {
        self.graphs.get(id)
    }

    pub(crate) fn graph_mut(&mut self, id: &GraphId) -> HierarchyResult<&mut SceneGraph> {
        self.graphs
            .get_mut(id)
            .ok_or_else(|| HierarchyError::GraphNotFound(id.clone()))
    }

    fn require(&self, id: &GraphId) -> HierarchyResult<&SceneGraph> {
        self.graphs
            .get(id)
            .ok_or_else(|| HierarchyError::GraphNotFound(id.clone()))
    }

    pub fn graphs(&self) -> impl Iterator<Item = &SceneGraph> {
        self.graphs.values()
    }

    pub fn graph_ids(&self) -> impl Iterator<Item = &GraphId> {
        self.graphs.keys()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn contains(&self, id: &GraphId) -> bool {
        self.graphs.contains_key(id)
    }

    pub fn is_retired(&self, id: &GraphId) -> bool {
        self.retired.contains(id)
    }

    pub fn retired_ids(&self) -> impl Iterator<Item = &GraphId> {
        self.retired.iter()
    }

    pub fn graph_seq(&self) -> u64 {
        self.graph_seq
    }

    fn allocate_graph_id(&mut self) -> GraphId {
        loop {
            let candidate = GraphId::new(format!("g{}", self.graph_seq));
            self.graph_seq += 1;
            if !self.graphs.contains_key(&candidate) && !self.retired.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Direct children of `id`, in node order
    pub fn children_of(&self, id: &GraphId) -> Vec<GraphId> {
        self.graphs
            .get(id)
            .map(|g| g.child_graph_ids().map(|(_, c)| c.clone()).collect())
            .unwrap_or_default()
    }

    /// `id` and every graph below it, parents before children
    pub fn subtree(&self, id: &GraphId) -> Vec<GraphId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !self.graphs.contains_key(&current) || out.contains(&current) {
                continue;
            }
            let mut children = self.children_of(&current);
            children.reverse();
            stack.extend(children);
            out.push(current);
        }
        out
    }

    // ==================== Expansion ====================

    /// Register `child` as the graph behind `node`
    ///
    /// Returns the existing child when the node was expanded in the meantime;
    /// `child` is then discarded.
    pub fn attach_child(
        &mut self,
        parent: &GraphId,
        node: &NodeId,
        mut child: SceneGraph,
    ) -> HierarchyResult<GraphId> {
        let parent_graph = self.require(parent)?;
        let depth = parent_graph.depth() + 1;
        let owner = parent_graph
            .get_node(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.clone()))?;

        if let Some(existing) = &owner.child_graph_id {
            debug!("Node {}/{} already expanded into {}", parent, node, existing);
            return Ok(existing.clone());
        }
        if !owner.expandable {
            return Err(HierarchyError::NotExpandable(node.clone()));
        }

        let id = self.allocate_graph_id();
        child.set_id(id.clone());
        child.set_parent(Some(ParentLink::new(parent.clone(), node.clone())), depth);

        self.graph_mut(parent)?.link_child(node, id.clone())?;
        self.graphs.insert(id.clone(), child);
        info!("Expanded {}/{} into graph {} (depth {})", parent, node, id, depth);
        Ok(id)
    }

    // ==================== Structural mutation ====================

    pub fn add_node(
        &mut self,
        engine: &MutationEngine,
        graph: &GraphId,
        spec: NodeSpec,
    ) -> HierarchyResult<NodeId> {
        Ok(engine.add_node(self.graph_mut(graph)?, spec)?)
    }

    pub fn update_node(
        &mut self,
        graph: &GraphId,
        node: &NodeId,
        update: &NodeUpdate,
    ) -> HierarchyResult<()> {
        Ok(self.graph_mut(graph)?.update_node(node, update)?)
    }

    /// Remove a node; a child graph it owned is pruned with its subtree
    pub fn remove_node(&mut self, graph: &GraphId, node: &NodeId) -> HierarchyResult<RemovedNode> {
        let removed = self.graph_mut(graph)?.remove_node(node)?;
        if let Some(child) = removed.orphaned_child() {
            self.prune_detached(child);
        }
        self.repair_active_path();
        Ok(removed)
    }

    pub fn add_edge(
        &mut self,
        graph: &GraphId,
        source: &NodeId,
        target: &NodeId,
        relation: &str,
    ) -> HierarchyResult<EdgeId> {
        Ok(self.graph_mut(graph)?.add_edge(source, target, relation)?)
    }

    pub fn remove_edges_between(
        &mut self,
        graph: &GraphId,
        a: &NodeId,
        b: &NodeId,
        relation: Option<&str>,
    ) -> HierarchyResult<usize> {
        Ok(self
            .graph_mut(graph)?
            .remove_edges_between(a, b, relation)?
            .len())
    }

    /// Apply the structural part of a batch and prune orphaned subtrees
    ///
    /// Expansion requests are left in the result for the caller.
    pub fn apply_batch(
        &mut self,
        engine: &MutationEngine,
        graph: &GraphId,
        batch: &OperationBatch,
    ) -> HierarchyResult<ApplyResult> {
        let result = engine.apply(self.graph_mut(graph)?, batch);
        for orphan in &result.orphaned {
            self.prune_detached(orphan);
        }
        if !result.orphaned.is_empty() {
            self.repair_active_path();
        }
        Ok(result)
    }

    /// Remove a graph and every descendant
    ///
    /// The owning node, if it still exists, goes back to `Collapsed`. Render
    /// artifacts of the removed graphs are released with them.
    pub fn prune_subtree(&mut self, id: &GraphId) -> HierarchyResult<Vec<GraphId>> {
        if *id == self.root {
            return Err(HierarchyError::CannotDeleteRoot);
        }
        let link = self.require(id)?.parent_link().cloned();
        if let Some(link) = link {
            if let Some(parent) = self.graphs.get_mut(&link.graph_id) {
                parent.unlink_child(&link.node_id);
            }
        }
        let removed = self.prune_detached(id);
        self.repair_active_path();
        Ok(removed)
    }

    fn prune_detached(&mut self, id: &GraphId) -> Vec<GraphId> {
        let doomed = self.subtree(id);
        for graph_id in &doomed {
            self.graphs.shift_remove(graph_id);
            self.retired.insert(graph_id.clone());
        }
        if !doomed.is_empty() {
            info!("Pruned {} graph(s) under {}", doomed.len(), id);
        }
        doomed
    }

    // ==================== Render artifacts ====================

    pub fn set_render_artifact(
        &mut self,
        graph: &GraphId,
        artifact: RenderArtifact,
    ) -> HierarchyResult<()> {
        self.graph_mut(graph)?.set_render_artifact(artifact);
        Ok(())
    }

    pub fn clear_render_artifact(&mut self, graph: &GraphId) -> HierarchyResult<Option<RenderArtifact>> {
        Ok(self.graph_mut(graph)?.clear_render_artifact())
    }

    // ==================== Navigation ====================

    pub fn active_path(&self) -> &[PathStep] {
        &self.active_path
    }

    /// Graph currently viewed
    pub fn active_graph_id(&self) -> GraphId {
        self.active_path
            .last()
            .and_then(|step| self.graphs.get(&step.graph_id)?.get_node(&step.node_id))
            .and_then(|node| node.child_graph_id.clone())
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn active_graph(&self) -> Option<&SceneGraph> {
        self.graphs.get(&self.active_graph_id())
    }

    /// Enter the child graph of `node` in the active graph
    pub fn navigate_into(&mut self, node: &NodeId) -> HierarchyResult<GraphId> {
        let current = self.active_graph_id();
        let owner = self
            .require(&current)?
            .get_node(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.clone()))?;

        match &owner.child_graph_id {
            Some(child) => {
                let child = child.clone();
                self.active_path.push(PathStep {
                    graph_id: current,
                    node_id: node.clone(),
                });
                Ok(child)
            }
            None if !owner.expandable => Err(HierarchyError::NotExpandable(node.clone())),
            None => Err(HierarchyError::NotExpanded(node.clone())),
        }
    }

    /// Leave the active graph; a no-op at the root
    pub fn navigate_up(&mut self) -> GraphId {
        self.active_path.pop();
        self.active_graph_id()
    }

    pub fn navigate_to_root(&mut self) {
        self.active_path.clear();
    }

    /// Make `id` the active graph, rebuilding the path from its parent chain
    pub fn navigate_to(&mut self, id: &GraphId) -> HierarchyResult<()> {
        let mut steps = Vec::new();
        let mut current = self.require(id)?;
        while let Some(link) = current.parent_link() {
            if steps.len() > self.graphs.len() {
                return Err(HierarchyError::GraphNotFound(id.clone()));
            }
            steps.push(PathStep {
                graph_id: link.graph_id.clone(),
                node_id: link.node_id.clone(),
            });
            current = self.require(&link.graph_id)?;
        }
        steps.reverse();
        self.active_path = steps;
        Ok(())
    }

    /// Root first, active graph last
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut crumbs = Vec::with_capacity(self.active_path.len() + 1);
        if let Some(root) = self.root() {
            crumbs.push(Breadcrumb {
                graph_id: self.root.clone(),
                name: root.name.clone(),
            });
        }
        for step in &self.active_path {
            let child = self
                .graphs
                .get(&step.graph_id)
                .and_then(|g| g.get_node(&step.node_id))
                .and_then(|n| n.child_graph_id.as_ref())
                .and_then(|c| self.graphs.get(c));
            if let Some(child) = child {
                crumbs.push(Breadcrumb {
                    graph_id: child.id().clone(),
                    name: child.name.clone(),
                });
            }
        }
        crumbs
    }

    /// Cut the active path at the first step that no longer leads anywhere
    fn repair_active_path(&mut self) {
        let valid = self
            .active_path
            .iter()
            .take_while(|step| {
                self.graphs
                    .get(&step.graph_id)
                    .and_then(|g| g.get_node(&step.node_id))
                    .and_then(|n| n.child_graph_id.as_ref())
                    .map_or(false, |c| self.graphs.contains_key(c))
            })
            .count();
        self.active_path.truncate(valid);
    }
}

/// Equality ignores the instance id
impl PartialEq for Forest {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.graph_seq == other.graph_seq
            && self.active_path == other.active_path
            && self.retired == other.retired
            && self.graphs.len() == other.graphs.len()
            && self.graphs.iter().zip(other.graphs.iter()).all(|(a, b)| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ExpansionState, SceneNode};
    use crate::mutation::Operation;

    fn town() -> SceneGraph {
        let mut graph = SceneGraph::new("", "Town");
        graph.add_node(SceneNode::new("plaza", "Plaza")).unwrap();
        graph.add_node(SceneNode::new("keep", "Keep")).unwrap();
        graph
            .add_node(SceneNode::new("well", "Well").with_expandable(false))
            .unwrap();
        graph
    }

    fn rooms(name: &str) -> SceneGraph {
        let mut graph = SceneGraph::new("", name);
        graph.add_node(SceneNode::new("hall", "Hall")).unwrap();
        graph.add_node(SceneNode::new("cellar", "Cellar")).unwrap();
        graph
    }

    /// Town with keep -> g2 and g2/cellar -> g3
    fn three_levels() -> Forest {
        let mut forest = Forest::new(town());
        let root = forest.root_id().clone();
        let keep = forest.attach_child(&root, &"keep".into(), rooms("Keep")).unwrap();
        forest
            .attach_child(&keep, &"cellar".into(), rooms("Cellar"))
            .unwrap();
        forest
    }

    #[test]
    fn test_new_forest_allocates_root_id() {
        let forest = Forest::new(town());
        assert_eq!(forest.root_id().as_str(), "g1");
        assert_eq!(forest.len(), 1);
        assert!(forest.root().unwrap().is_root());
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn test_attach_child_links_both_ways() {
        let forest = three_levels();
        let root = forest.root().unwrap();
        let keep = root.get_node(&"keep".into()).unwrap();
        let child_id = keep.child_graph_id.clone().unwrap();

        let child = forest.graph(&child_id).unwrap();
        assert_eq!(
            child.parent_link(),
            Some(&ParentLink::new(forest.root_id().clone(), "keep".into()))
        );
        assert_eq!(child.depth(), 1);
        assert_eq!(forest.len(), 3);
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();
        let first = forest.children_of(&root)[0].clone();

        let again = forest.attach_child(&root, &"keep".into(), rooms("Other")).unwrap();
        assert_eq!(again, first);
        assert_eq!(forest.len(), 3);
    }

    #[test]
    fn test_attach_rejects_terminal_node() {
        let mut forest = Forest::new(town());
        let root = forest.root_id().clone();
        let result = forest.attach_child(&root, &"well".into(), rooms("Well"));
        assert_eq!(result, Err(HierarchyError::NotExpandable(NodeId::new("well"))));
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn test_remove_node_prunes_subtree() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();
        let subtree = forest.subtree(&forest.children_of(&root)[0]);
        assert_eq!(subtree.len(), 2);

        forest.remove_node(&root, &"keep".into()).unwrap();

        assert_eq!(forest.len(), 1);
        for id in &subtree {
            assert!(!forest.contains(id));
            assert!(forest.is_retired(id));
        }
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn test_prune_collapses_owner() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();
        let keep = forest.children_of(&root)[0].clone();

        let removed = forest.prune_subtree(&keep).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(
            forest.root().unwrap().expansion_state(&"keep".into()),
            Some(ExpansionState::Collapsed)
        );
        assert_eq!(forest.prune_subtree(&root), Err(HierarchyError::CannotDeleteRoot));
        assert!(forest.check_invariants().is_ok());
    }

    #[test]
    fn test_graph_ids_are_not_reused() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();
        let keep = forest.children_of(&root)[0].clone();
        forest.prune_subtree(&keep).unwrap();

        let fresh = forest.attach_child(&root, &"keep".into(), rooms("Keep")).unwrap();
        assert_ne!(fresh, keep);
        assert!(!forest.is_retired(&fresh));
    }

    #[test]
    fn test_navigation() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();

        assert_eq!(forest.navigate_up(), root);

        let keep = forest.navigate_into(&"keep".into()).unwrap();
        let cellar = forest.navigate_into(&"cellar".into()).unwrap();
        assert_eq!(forest.active_graph_id(), cellar);
        assert_eq!(forest.active_path().len(), 2);

        let names: Vec<String> = forest.breadcrumbs().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Town", "Keep", "Cellar"]);

        assert_eq!(forest.navigate_up(), keep);
        forest.navigate_to_root();
        assert_eq!(forest.active_graph_id(), root);

        forest.navigate_to(&cellar).unwrap();
        assert_eq!(forest.active_path().len(), 2);
    }

    #[test]
    fn test_navigate_into_collapsed_or_terminal() {
        let mut forest = Forest::new(town());
        assert_eq!(
            forest.navigate_into(&"plaza".into()),
            Err(HierarchyError::NotExpanded(NodeId::new("plaza")))
        );
        assert_eq!(
            forest.navigate_into(&"well".into()),
            Err(HierarchyError::NotExpandable(NodeId::new("well")))
        );
        assert!(forest.active_path().is_empty());
    }

    #[test]
    fn test_pruning_truncates_active_path() {
        let mut forest = three_levels();
        forest.navigate_into(&"keep".into()).unwrap();
        forest.navigate_into(&"cellar".into()).unwrap();

        let root = forest.root_id().clone();
        let keep = forest.children_of(&root)[0].clone();
        forest.remove_node(&keep, &"cellar".into()).unwrap();

        assert_eq!(forest.active_path().len(), 1);
        assert_eq!(forest.active_graph_id(), keep);
    }

    #[test]
    fn test_batch_prunes_orphans() {
        let mut forest = three_levels();
        let root = forest.root_id().clone();
        let batch = OperationBatch::new(vec![
            Operation::remove_node("keep"),
            Operation::expand("plaza"),
        ]);

        let result = forest
            .apply_batch(&MutationEngine::new(), &root, &batch)
            .unwrap();
        assert_eq!(result.orphaned.len(), 1);
        assert_eq!(result.expansions.len(), 1);
        assert_eq!(forest.len(), 1);
        assert!(forest.check_invariants().is_ok());
    }
}
