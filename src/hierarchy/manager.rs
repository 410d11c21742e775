//! Hierarchy manager
//!
//! Serializes every structural mutation through one `RwLock<Forest>` writer.
//! Calls to the collaborators run without the lock held, so reads and edits
//! of other graphs continue while a child graph or an image is generated.
//!
//! At most one expansion per node is in flight. A second request for the same
//! node awaits the same shared future instead of issuing another generation
//! request. Cancelled or timed-out work never registers anything.

use super::{Breadcrumb, Forest, HierarchyError, HierarchyResult, PathStep};
use crate::config::{GenerationLimits, SceneSynthConfig};
use crate::graph::{
    EdgeId, ExpansionState, GraphError, GraphId, NodeId, NodeUpdate, RemovedNode, RenderArtifact,
    SceneGraph, SceneNode,
};
use crate::llm::{GenerationError, GraphRequest, ParentContext, SceneGenerator};
use crate::mutation::{ApplyResult, MutationEngine, NodeSpec, OperationBatch};
use crate::persistence::{Snapshot, SnapshotResult};
use crate::render::{RenderError, RenderRequest, RenderStyle, SceneRenderer};
use bytes::Bytes;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, RwLockReadGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Tuning for a [`HierarchyManager`]
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub generation_timeout: Duration,
    pub render_timeout: Duration,
    pub limits: GenerationLimits,
    pub default_style: RenderStyle,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from_config(&SceneSynthConfig::default())
    }
}

impl ManagerOptions {
    pub fn from_config(config: &SceneSynthConfig) -> Self {
        ManagerOptions {
            generation_timeout: config.llm.timeout(),
            render_timeout: config.render.timeout(),
            limits: config.generation,
            default_style: RenderStyle::parse(&config.render.default_style),
        }
    }
}

/// Result of one deferred expansion from a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionOutcome {
    pub index: usize,
    pub node_id: NodeId,
    pub result: HierarchyResult<GraphId>,
}

/// Batch application plus the expansions it requested
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub graph_id: GraphId,
    pub result: ApplyResult,
    pub expansions: Vec<ExpansionOutcome>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.result.is_complete() && self.expansions.iter().all(|e| e.result.is_ok())
    }
}

struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn new() -> Arc<Self> {
        Arc::new(CancelSignal {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if nobody is waiting yet
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

type ExpansionFuture = Shared<BoxFuture<'static, HierarchyResult<GraphId>>>;

struct PendingExpansion {
    future: ExpansionFuture,
    signal: Arc<CancelSignal>,
}

type PendingMap = Arc<Mutex<HashMap<(GraphId, NodeId), PendingExpansion>>>;
type RenderMap = Arc<Mutex<HashMap<GraphId, Arc<CancelSignal>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Claim on the single render slot of a graph; released on drop
struct RenderSlot {
    renders: RenderMap,
    graph_id: GraphId,
    signal: Arc<CancelSignal>,
}

impl RenderSlot {
    fn claim(renders: &RenderMap, graph_id: &GraphId) -> HierarchyResult<Self> {
        let mut map = lock(renders);
        if map.contains_key(graph_id) {
            return Err(HierarchyError::RenderInProgress(graph_id.clone()));
        }
        let signal = CancelSignal::new();
        map.insert(graph_id.clone(), Arc::clone(&signal));
        Ok(RenderSlot {
            renders: Arc::clone(renders),
            graph_id: graph_id.clone(),
            signal,
        })
    }

    /// Give the slot back; true when the render was cancelled meanwhile
    fn release(&self) -> bool {
        let mut map = lock(&self.renders);
        let ours = map
            .get(&self.graph_id)
            .map_or(false, |s| Arc::ptr_eq(s, &self.signal));
        if ours {
            map.remove(&self.graph_id);
        }
        !ours || self.signal.is_cancelled()
    }
}

impl Drop for RenderSlot {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct HierarchyManager {
    forest: Arc<RwLock<Forest>>,
    generator: Arc<dyn SceneGenerator>,
    renderer: Arc<dyn SceneRenderer>,
    engine: MutationEngine,
    options: ManagerOptions,
    pending: PendingMap,
    renders: RenderMap,
}

impl HierarchyManager {
    pub fn new(
        forest: Forest,
        generator: Arc<dyn SceneGenerator>,
        renderer: Arc<dyn SceneRenderer>,
    ) -> Self {
        HierarchyManager {
            forest: Arc::new(RwLock::new(forest)),
            generator,
            renderer,
            engine: MutationEngine::new(),
            options: ManagerOptions::default(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            renders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_root(
        root: SceneGraph,
        generator: Arc<dyn SceneGenerator>,
        renderer: Arc<dyn SceneRenderer>,
    ) -> Self {
        Self::new(Forest::new(root), generator, renderer)
    }

    pub fn new_empty(
        name: &str,
        generator: Arc<dyn SceneGenerator>,
        renderer: Arc<dyn SceneRenderer>,
    ) -> Self {
        Self::new(Forest::empty(name), generator, renderer)
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    // ==================== Lifecycle ====================

    /// Generate a root graph from `prompt` and replace the whole hierarchy
    pub async fn create_from_prompt(
        &self,
        prompt: &str,
        node_count: Option<usize>,
    ) -> HierarchyResult<GraphId> {
        let request = GraphRequest::root(prompt, self.options.limits.node_count(node_count));
        let timeout = self.options.generation_timeout;
        let root = tokio::time::timeout(timeout, self.generator.generate_graph(request))
            .await
            .unwrap_or(Err(GenerationError::Timeout(timeout.as_secs())))?;

        let forest = Forest::new(root);
        let root_id = forest.root_id().clone();
        self.replace_forest(forest).await;
        Ok(root_id)
    }

    /// Swap in `forest`, cancelling all in-flight work on the old one
    async fn replace_forest(&self, forest: Forest) {
        let mut current = self.forest.write().await;
        let cancelled_expansions = {
            let mut pending = lock(&self.pending);
            for entry in pending.values() {
                entry.signal.cancel();
            }
            let count = pending.len();
            pending.clear();
            count
        };
        {
            let mut renders = lock(&self.renders);
            for signal in renders.values() {
                signal.cancel();
            }
            renders.clear();
        }
        if cancelled_expansions > 0 {
            info!("Cancelled {} pending expansion(s) on teardown", cancelled_expansions);
        }
        info!(
            "Replacing hierarchy {} ({} graphs) with {}",
            current.instance(),
            current.len(),
            forest.instance()
        );
        *current = forest;
    }

    // ==================== Reads ====================

    /// Shared read access to the forest
    pub async fn read(&self) -> RwLockReadGuard<'_, Forest> {
        self.forest.read().await
    }

    pub async fn graph(&self, id: &GraphId) -> Option<SceneGraph> {
        self.forest.read().await.graph(id).cloned()
    }

    pub async fn root_id(&self) -> GraphId {
        self.forest.read().await.root_id().clone()
    }

    pub async fn active_graph_id(&self) -> GraphId {
        self.forest.read().await.active_graph_id()
    }

    pub async fn active_graph(&self) -> Option<SceneGraph> {
        self.forest.read().await.active_graph().cloned()
    }

    pub async fn active_path(&self) -> Vec<PathStep> {
        self.forest.read().await.active_path().to_vec()
    }

    pub async fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.forest.read().await.breadcrumbs()
    }

    pub async fn graph_count(&self) -> usize {
        self.forest.read().await.len()
    }

    pub async fn expansion_state(
        &self,
        graph: &GraphId,
        node: &NodeId,
    ) -> HierarchyResult<ExpansionState> {
        let forest = self.forest.read().await;
        let graph_ref = forest
            .graph(graph)
            .ok_or_else(|| HierarchyError::GraphNotFound(graph.clone()))?;
        Ok(graph_ref
            .expansion_state(node)
            .ok_or_else(|| GraphError::NodeNotFound(node.clone()))?)
    }

    pub fn is_expanding(&self, graph: &GraphId, node: &NodeId) -> bool {
        lock(&self.pending).contains_key(&(graph.clone(), node.clone()))
    }

    // ==================== Navigation ====================

    pub async fn navigate_into(&self, node: &NodeId) -> HierarchyResult<GraphId> {
        self.forest.write().await.navigate_into(node)
    }

    pub async fn navigate_up(&self) -> GraphId {
        self.forest.write().await.navigate_up()
    }

    pub async fn navigate_to(&self, graph: &GraphId) -> HierarchyResult<()> {
        self.forest.write().await.navigate_to(graph)
    }

    pub async fn navigate_to_root(&self) {
        self.forest.write().await.navigate_to_root()
    }

    // ==================== Structural mutation ====================

    pub async fn add_node(&self, graph: &GraphId, spec: NodeSpec) -> HierarchyResult<NodeId> {
        self.forest.write().await.add_node(&self.engine, graph, spec)
    }

    pub async fn update_node(
        &self,
        graph: &GraphId,
        node: &NodeId,
        update: &NodeUpdate,
    ) -> HierarchyResult<()> {
        self.forest.write().await.update_node(graph, node, update)
    }

    pub async fn remove_node(&self, graph: &GraphId, node: &NodeId) -> HierarchyResult<RemovedNode> {
        self.cancel_expansion(graph, node);
        self.forest.write().await.remove_node(graph, node)
    }

    pub async fn add_edge(
        &self,
        graph: &GraphId,
        source: &NodeId,
        target: &NodeId,
        relation: &str,
    ) -> HierarchyResult<EdgeId> {
        self.forest
            .write()
            .await
            .add_edge(graph, source, target, relation)
    }

    pub async fn remove_edges_between(
        &self,
        graph: &GraphId,
        a: &NodeId,
        b: &NodeId,
        relation: Option<&str>,
    ) -> HierarchyResult<usize> {
        self.forest
            .write()
            .await
            .remove_edges_between(graph, a, b, relation)
    }

    /// Delete a graph and its subtree; the owning node collapses
    pub async fn prune_subtree(&self, graph: &GraphId) -> HierarchyResult<Vec<GraphId>> {
        self.forest.write().await.prune_subtree(graph)
    }

    /// Apply a batch, then run the expansions it requested
    ///
    /// Structural operations are applied under one write lock. Expansions run
    /// afterwards, concurrently, and report their own outcome.
    pub async fn apply_batch(
        &self,
        graph: &GraphId,
        batch: &OperationBatch,
    ) -> HierarchyResult<BatchReport> {
        let result = self
            .forest
            .write()
            .await
            .apply_batch(&self.engine, graph, batch)?;

        let expansions = join_all(result.expansions.iter().map(|request| async move {
            ExpansionOutcome {
                index: request.index,
                node_id: request.node_id.clone(),
                result: self.expand(graph, &request.node_id).await,
            }
        }))
        .await;

        Ok(BatchReport {
            graph_id: graph.clone(),
            result,
            expansions,
        })
    }

    /// Turn a free-text instruction into a batch and apply it
    pub async fn edit(&self, graph: &GraphId, instruction: &str) -> HierarchyResult<BatchReport> {
        let current = self
            .graph(graph)
            .await
            .ok_or_else(|| HierarchyError::GraphNotFound(graph.clone()))?;

        let timeout = self.options.generation_timeout;
        let batch = tokio::time::timeout(
            timeout,
            self.generator.generate_edit_batch(instruction, &current),
        )
        .await
        .unwrap_or(Err(GenerationError::Timeout(timeout.as_secs())))?;

        info!(
            "Edit '{}' on graph {} produced {} operation(s)",
            instruction,
            graph,
            batch.len()
        );
        self.apply_batch(graph, &batch).await
    }

    // ==================== Expansion ====================

    /// Materialize the child graph of `node`, or return the existing one
    pub async fn expand(&self, graph: &GraphId, node: &NodeId) -> HierarchyResult<GraphId> {
        let future = {
            let forest = self.forest.read().await;
            let parent = forest
                .graph(graph)
                .ok_or_else(|| HierarchyError::GraphNotFound(graph.clone()))?;
            let owner = parent
                .get_node(node)
                .ok_or_else(|| GraphError::NodeNotFound(node.clone()))?;

            if let Some(child) = &owner.child_graph_id {
                return Ok(child.clone());
            }
            if !owner.expandable {
                return Err(HierarchyError::NotExpandable(node.clone()));
            }

            // Checked under the read lock: a finished expansion removes its
            // entry under the write lock, so a missing entry means none ran
            let key = (graph.clone(), node.clone());
            let mut pending = lock(&self.pending);
            match pending.get(&key) {
                Some(entry) => entry.future.clone(),
                None => {
                    let request = self.child_request(parent, owner);
                    let signal = CancelSignal::new();
                    let future =
                        self.spawn_expansion(forest.instance(), key.clone(), request, Arc::clone(&signal));
                    pending.insert(
                        key,
                        PendingExpansion {
                            future: future.clone(),
                            signal,
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    fn child_request(&self, parent: &SceneGraph, owner: &SceneNode) -> GraphRequest {
        let prompt = if owner.description.is_empty() {
            owner.name.clone()
        } else {
            format!("{}: {}", owner.name, owner.description)
        };
        GraphRequest {
            prompt,
            context: Some(parent.master_prompt.clone()).filter(|c| !c.is_empty()),
            parent: Some(ParentContext {
                name: owner.name.clone(),
                description: owner.description.clone(),
                semantic_type: owner.semantic_type.clone(),
            }),
            depth: parent.depth() + 1,
            node_count: self.options.limits.node_count(None),
        }
    }

    fn spawn_expansion(
        &self,
        instance: Uuid,
        key: (GraphId, NodeId),
        request: GraphRequest,
        signal: Arc<CancelSignal>,
    ) -> ExpansionFuture {
        let shared_forest = Arc::clone(&self.forest);
        let pending = Arc::clone(&self.pending);
        let generator = Arc::clone(&self.generator);
        let timeout = self.options.generation_timeout;

        let handle = tokio::spawn(async move {
            let (graph, node) = key.clone();
            info!("Expanding {}/{}", graph, node);

            let generated = tokio::select! {
                _ = signal.notify.notified() => Err(GenerationError::Cancelled),
                result = tokio::time::timeout(timeout, generator.generate_graph(request)) => {
                    result.unwrap_or(Err(GenerationError::Timeout(timeout.as_secs())))
                }
            };

            let mut forest = shared_forest.write().await;
            let cancelled = {
                let mut pending = lock(&pending);
                let ours = pending
                    .get(&key)
                    .map_or(false, |entry| Arc::ptr_eq(&entry.signal, &signal));
                if ours {
                    pending.remove(&key);
                }
                !ours || signal.is_cancelled() || forest.instance() != instance
            };

            if cancelled {
                info!("Expansion of {}/{} cancelled", graph, node);
                return Err(GenerationError::Cancelled.into());
            }
            match generated {
                Ok(child) => forest.attach_child(&graph, &node, child),
                Err(e) => {
                    warn!("Expansion of {}/{} failed: {}", graph, node, e);
                    Err(e.into())
                }
            }
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(HierarchyError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Cancel an in-flight expansion; the node stays `Collapsed`
    pub fn cancel_expansion(&self, graph: &GraphId, node: &NodeId) -> bool {
        match lock(&self.pending).remove(&(graph.clone(), node.clone())) {
            Some(entry) => {
                entry.signal.cancel();
                true
            }
            None => false,
        }
    }

    // ==================== Rendering ====================

    /// Render `graph` and attach the artifact
    ///
    /// Only one render per graph runs at a time. A cancelled or failed render
    /// leaves the artifact slot as it was.
    pub async fn render(
        &self,
        graph: &GraphId,
        canvas_snapshot: Option<Bytes>,
        style: Option<RenderStyle>,
    ) -> HierarchyResult<RenderArtifact> {
        let (instance, request) = {
            let forest = self.forest.read().await;
            let scene = forest
                .graph(graph)
                .ok_or_else(|| HierarchyError::GraphNotFound(graph.clone()))?;
            (
                forest.instance(),
                RenderRequest {
                    scene_name: scene.name.clone(),
                    graph_json: scene.to_prompt_json(),
                    canvas_snapshot,
                    style: style.unwrap_or_else(|| self.options.default_style.clone()),
                },
            )
        };

        let slot = RenderSlot::claim(&self.renders, graph)?;
        let timeout = self.options.render_timeout;
        let outcome = tokio::select! {
            _ = slot.signal.notify.notified() => Err(RenderError::Cancelled),
            result = tokio::time::timeout(timeout, self.renderer.render_scene(&request)) => {
                result.unwrap_or(Err(RenderError::Timeout(timeout.as_secs())))
            }
        };

        let mut forest = self.forest.write().await;
        if slot.release() || forest.instance() != instance {
            info!("Render of graph {} cancelled", graph);
            return Err(RenderError::Cancelled.into());
        }
        let artifact = outcome.map_err(|e| {
            warn!("Render of graph {} failed: {}", graph, e);
            HierarchyError::Render(e)
        })?;
        forest.set_render_artifact(graph, artifact.clone())?;
        info!("Attached {} render to graph {}", artifact.media_type, graph);
        Ok(artifact)
    }

    pub fn cancel_render(&self, graph: &GraphId) -> bool {
        match lock(&self.renders).remove(graph) {
            Some(signal) => {
                signal.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn clear_render(&self, graph: &GraphId) -> HierarchyResult<Option<RenderArtifact>> {
        self.forest.write().await.clear_render_artifact(graph)
    }

    // ==================== Persistence ====================

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&*self.forest.read().await)
    }

    /// Replace the hierarchy with a validated snapshot
    pub async fn restore(&self, snapshot: Snapshot) -> SnapshotResult<()> {
        let forest = snapshot.into_forest()?;
        self.replace_forest(forest).await;
        Ok(())
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> SnapshotResult<()> {
        self.snapshot().await.save(path)
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> SnapshotResult<()> {
        let snapshot = Snapshot::load(path)?;
        self.restore(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailureReason, MockSceneGenerator};
    use crate::mutation::Operation;
    use crate::render::PlaceholderRenderer;

    fn town() -> SceneGraph {
        let mut graph = SceneGraph::new("", "Town");
        graph
            .add_node(SceneNode::new("keep", "Keep").with_description("A stone keep"))
            .unwrap();
        graph.add_node(SceneNode::new("market", "Market")).unwrap();
        graph
            .add_node(SceneNode::new("well", "Well").with_expandable(false))
            .unwrap();
        graph
    }

    fn manager_with(generator: Arc<MockSceneGenerator>) -> HierarchyManager {
        HierarchyManager::with_root(town(), generator, Arc::new(PlaceholderRenderer::default()))
    }

    #[tokio::test]
    async fn test_expand_is_idempotent() {
        let generator = Arc::new(MockSceneGenerator::new());
        let manager = manager_with(Arc::clone(&generator));
        let root = manager.root_id().await;

        let first = manager.expand(&root, &"keep".into()).await.unwrap();
        let second = manager.expand(&root, &"keep".into()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.graph_count().await, 2);
        assert_eq!(generator.graph_calls(), 1);

        let child = manager.graph(&first).await.unwrap();
        assert_eq!(child.depth(), 1);
        assert_eq!(child.name, "Keep");
        assert!(manager.read().await.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_expansions_share_one_request() {
        let generator = Arc::new(MockSceneGenerator::new().with_delay(Duration::from_millis(50)));
        let manager = manager_with(Arc::clone(&generator));
        let root = manager.root_id().await;
        let keep = NodeId::new("keep");

        let (a, b) = tokio::join!(manager.expand(&root, &keep), manager.expand(&root, &keep));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(generator.graph_calls(), 1);
        assert_eq!(manager.graph_count().await, 2);
        assert!(!manager.is_expanding(&root, &keep));
    }

    #[tokio::test]
    async fn test_different_nodes_expand_concurrently() {
        let generator = Arc::new(MockSceneGenerator::new().with_delay(Duration::from_millis(20)));
        let manager = manager_with(Arc::clone(&generator));
        let root = manager.root_id().await;

        let keep: NodeId = "keep".into();
        let market: NodeId = "market".into();
        let (a, b) = tokio::join!(manager.expand(&root, &keep), manager.expand(&root, &market));
        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(generator.graph_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_expansion_leaves_node_collapsed() {
        let generator = Arc::new(MockSceneGenerator::new().with_delay(Duration::from_millis(300)));
        let manager = Arc::new(manager_with(Arc::clone(&generator)));
        let root = manager.root_id().await;

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            let root = root.clone();
            async move { manager.expand(&root, &"keep".into()).await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(manager.cancel_expansion(&root, &"keep".into()));
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        assert_eq!(
            manager.expansion_state(&root, &"keep".into()).await.unwrap(),
            ExpansionState::Collapsed
        );
        assert_eq!(manager.graph_count().await, 1);
        assert!(!manager.cancel_expansion(&root, &"keep".into()));
    }

    #[tokio::test]
    async fn test_timeout_is_ordinary_failure() {
        let generator = Arc::new(MockSceneGenerator::new().with_delay(Duration::from_millis(500)));
        let options = ManagerOptions {
            generation_timeout: Duration::from_millis(20),
            ..ManagerOptions::default()
        };
        let manager = manager_with(generator).with_options(options);
        let root = manager.root_id().await;

        let err = manager.expand(&root, &"keep".into()).await.unwrap_err();
        assert_eq!(err.failure_reason(), Some(FailureReason::Timeout));
        assert_eq!(
            manager.expansion_state(&root, &"keep".into()).await.unwrap(),
            ExpansionState::Collapsed
        );
    }

    #[tokio::test]
    async fn test_failed_expansion_can_be_retried() {
        let generator = Arc::new(MockSceneGenerator::new());
        generator.set_failure(Some(GenerationError::Network("offline".into())));
        let manager = manager_with(Arc::clone(&generator));
        let root = manager.root_id().await;

        assert!(manager.expand(&root, &"keep".into()).await.is_err());
        assert_eq!(manager.graph_count().await, 1);

        generator.set_failure(None);
        assert!(manager.expand(&root, &"keep".into()).await.is_ok());
        assert_eq!(manager.graph_count().await, 2);
    }

    #[tokio::test]
    async fn test_expand_rejects_terminal_and_missing_nodes() {
        let manager = manager_with(Arc::new(MockSceneGenerator::new()));
        let root = manager.root_id().await;

        assert_eq!(
            manager.expand(&root, &"well".into()).await,
            Err(HierarchyError::NotExpandable(NodeId::new("well")))
        );
        assert_eq!(
            manager.expand(&root, &"ghost".into()).await,
            Err(HierarchyError::Graph(GraphError::NodeNotFound(NodeId::new("ghost"))))
        );
        assert_eq!(
            manager.expand(&GraphId::new("g99"), &"keep".into()).await,
            Err(HierarchyError::GraphNotFound(GraphId::new("g99")))
        );
    }

    #[tokio::test]
    async fn test_batch_runs_deferred_expansions() {
        let generator = Arc::new(MockSceneGenerator::new());
        let manager = manager_with(Arc::clone(&generator));
        let root = manager.root_id().await;

        let batch = OperationBatch::new(vec![
            Operation::expand("keep"),
            Operation::expand("market"),
            Operation::remove_node("market"),
        ]);
        let report = manager.apply_batch(&root, &batch).await.unwrap();

        assert_eq!(report.result.applied_indices(), vec![0, 1, 2]);
        assert_eq!(report.expansions.len(), 2);
        assert!(report.expansions[0].result.is_ok());
        assert_eq!(
            report.expansions[1].result,
            Err(HierarchyError::Graph(GraphError::NodeNotFound(NodeId::new("market"))))
        );
        assert!(!report.is_complete());
        assert_eq!(manager.graph_count().await, 2);
    }

    #[tokio::test]
    async fn test_edit_applies_scripted_batch() {
        let generator = Arc::new(MockSceneGenerator::new().with_edit(
            "add a tavern next to the market",
            OperationBatch::new(vec![
                Operation::add_node(NodeSpec::new("Tavern").with_id("tavern")),
                Operation::add_edge("tavern", "market", "adjacent_to"),
            ]),
        ));
        let manager = manager_with(generator);
        let root = manager.root_id().await;

        let report = manager
            .edit(&root, "add a tavern next to the market")
            .await
            .unwrap();
        assert!(report.is_complete());

        let graph = manager.graph(&root).await.unwrap();
        assert!(graph.contains_node(&"tavern".into()));
        assert_eq!(graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_node_prunes_and_truncates_path() {
        let manager = manager_with(Arc::new(MockSceneGenerator::new()));
        let root = manager.root_id().await;
        let child = manager.expand(&root, &"keep".into()).await.unwrap();
        manager.navigate_into(&"keep".into()).await.unwrap();
        assert_eq!(manager.active_graph_id().await, child);

        manager.remove_node(&root, &"keep".into()).await.unwrap();
        assert!(manager.graph(&child).await.is_none());
        assert_eq!(manager.active_graph_id().await, root);
        assert!(manager.read().await.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_render_attaches_artifact() {
        let manager = manager_with(Arc::new(MockSceneGenerator::new()));
        let root = manager.root_id().await;

        let artifact = manager
            .render(&root, None, Some(RenderStyle::PixelArt))
            .await
            .unwrap();
        let graph = manager.graph(&root).await.unwrap();
        assert_eq!(graph.render_artifact(), Some(&artifact));

        assert!(manager.clear_render(&root).await.unwrap().is_some());
        assert!(manager.graph(&root).await.unwrap().render_artifact().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_render_leaves_slot_empty() {
        let renderer = Arc::new(PlaceholderRenderer::default().with_delay(Duration::from_millis(300)));
        let manager = Arc::new(HierarchyManager::with_root(
            town(),
            Arc::new(MockSceneGenerator::new()),
            renderer,
        ));
        let root = manager.root_id().await;

        let task = tokio::spawn({
            let manager = Arc::clone(&manager);
            let root = root.clone();
            async move { manager.render(&root, None, None).await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(manager.cancel_render(&root));
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        assert!(manager.graph(&root).await.unwrap().render_artifact().is_none());
    }

    #[tokio::test]
    async fn test_create_from_prompt_replaces_forest() {
        let manager = manager_with(Arc::new(MockSceneGenerator::new()));
        let old_root = manager.root_id().await;
        manager.expand(&old_root, &"keep".into()).await.unwrap();

        let root = manager
            .create_from_prompt("A floating island city", Some(5))
            .await
            .unwrap();
        let graph = manager.graph(&root).await.unwrap();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(manager.graph_count().await, 1);
        assert!(manager.active_path().await.is_empty());
    }
}
