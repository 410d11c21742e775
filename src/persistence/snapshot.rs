//! Snapshot document
//!
//! A self-describing JSON document holding every graph of a hierarchy, the
//! navigation state and a side table of render artifacts keyed by graph id.
//! Artifact payloads stay base64-encoded until first accessed.

use super::validation::{validate_forest, Corruption, CorruptionKind};
use super::{SnapshotError, SnapshotResult};
use crate::graph::{GraphId, NodeId, ParentLink, RenderArtifact, SceneEdge, SceneGraph, SceneNode};
use crate::hierarchy::{Forest, PathStep};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use tracing::{debug, info};

pub const SNAPSHOT_FORMAT: &str = "scenesynth.hierarchy";
pub const SNAPSHOT_VERSION: u32 = 1;

/// Stored form of one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub id: GraphId,
    pub name: String,
    #[serde(default)]
    pub master_prompt: String,
    pub depth: u32,
    #[serde(default)]
    pub parent: Option<ParentLink>,
    pub created_at: i64,
    #[serde(default)]
    pub nodes: Vec<SceneNode>,
    #[serde(default)]
    pub edges: Vec<SceneEdge>,
    #[serde(default)]
    pub retired_nodes: Vec<NodeId>,
    #[serde(default)]
    pub node_seq: u64,
    #[serde(default)]
    pub edge_seq: u64,
}

impl GraphRecord {
    fn capture(graph: &SceneGraph) -> Self {
        GraphRecord {
            id: graph.id().clone(),
            name: graph.name.clone(),
            master_prompt: graph.master_prompt.clone(),
            depth: graph.depth(),
            parent: graph.parent_link().cloned(),
            created_at: graph.created_at(),
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().cloned().collect(),
            retired_nodes: graph.retired_node_ids().cloned().collect(),
            node_seq: graph.node_seq(),
            edge_seq: graph.edge_seq(),
        }
    }

    fn into_graph(self) -> Result<SceneGraph, Corruption> {
        let id = self.id.clone();
        let mut graph = SceneGraph::new(self.id, self.name);
        graph.master_prompt = self.master_prompt;
        graph.set_parent(self.parent, self.depth);
        graph.set_created_at(self.created_at);
        graph
            .restore(
                self.nodes,
                self.edges,
                self.retired_nodes,
                self.node_seq,
                self.edge_seq,
            )
            .map_err(|e| Corruption::from_graph_error(&id, e))
    }
}

/// Stored form of a render artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub media_type: String,
    #[serde(default)]
    pub style: Option<String>,
    pub created_at: i64,
    /// Base64 payload
    pub data: String,
}

impl ArtifactRecord {
    fn capture(artifact: &RenderArtifact) -> Self {
        ArtifactRecord {
            media_type: artifact.media_type.clone(),
            style: artifact.style.clone(),
            created_at: artifact.created_at,
            data: artifact.to_base64(),
        }
    }

    fn into_artifact(self) -> RenderArtifact {
        RenderArtifact::from_base64(self.media_type, self.style, self.created_at, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: String,
    pub version: u32,
    pub root_graph_id: GraphId,
    #[serde(default)]
    pub active_path: Vec<PathStep>,
    pub graph_seq: u64,
    #[serde(default)]
    pub retired_graph_ids: Vec<GraphId>,
    pub graphs: IndexMap<GraphId, GraphRecord>,
    #[serde(default)]
    pub artifacts: IndexMap<GraphId, ArtifactRecord>,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: Option<u64>,
}

/// Map entries in document order, repeated keys included
struct Entries<T>(Vec<(GraphId, T)>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<T> Entries<T> {
    fn into_map(self, table: &str) -> Result<IndexMap<GraphId, T>, Corruption> {
        let mut map = IndexMap::with_capacity(self.0.len());
        for (key, value) in self.0 {
            if map.contains_key(&key) {
                return Err(Corruption::new(
                    CorruptionKind::DuplicateGraphId,
                    format!("graph {} appears twice in {}", key, table),
                ));
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by graph id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// Wire shape of [`Snapshot`] before repeated graph ids are ruled out
#[derive(Deserialize)]
struct SnapshotDocument {
    format: String,
    version: u32,
    root_graph_id: GraphId,
    #[serde(default)]
    active_path: Vec<PathStep>,
    graph_seq: u64,
    #[serde(default)]
    retired_graph_ids: Vec<GraphId>,
    graphs: Entries<GraphRecord>,
    #[serde(default)]
    artifacts: Entries<ArtifactRecord>,
}

impl SnapshotDocument {
    fn into_snapshot(self) -> Result<Snapshot, Corruption> {
        Ok(Snapshot {
            format: self.format,
            version: self.version,
            root_graph_id: self.root_graph_id,
            active_path: self.active_path,
            graph_seq: self.graph_seq,
            retired_graph_ids: self.retired_graph_ids,
            graphs: self.graphs.into_map("graphs")?,
            artifacts: self.artifacts.into_map("artifacts")?,
        })
    }
}

impl Snapshot {
    /// Self-contained copy of `forest`
    pub fn capture(forest: &Forest) -> Self {
        let graphs = forest
            .graphs()
            .map(|g| (g.id().clone(), GraphRecord::capture(g)))
            .collect();
        let artifacts = forest
            .graphs()
            .filter_map(|g| {
                g.render_artifact()
                    .map(|a| (g.id().clone(), ArtifactRecord::capture(a)))
            })
            .collect();

        Snapshot {
            format: SNAPSHOT_FORMAT.to_string(),
            version: SNAPSHOT_VERSION,
            root_graph_id: forest.root_id().clone(),
            active_path: forest.active_path().to_vec(),
            graph_seq: forest.graph_seq(),
            retired_graph_ids: forest.retired_ids().cloned().collect(),
            graphs,
            artifacts,
        }
    }

    /// Rebuild the hierarchy, rejecting any structural violation
    pub fn into_forest(self) -> SnapshotResult<Forest> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(Corruption::new(
                CorruptionKind::Malformed,
                format!("unknown document format '{}'", self.format),
            )
            .into());
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: u64::from(self.version),
                supported: SNAPSHOT_VERSION,
            });
        }

        let mut graphs = IndexMap::with_capacity(self.graphs.len());
        for (key, record) in self.graphs {
            if key != record.id {
                return Err(Corruption::new(
                    CorruptionKind::KeyMismatch,
                    format!("graph {} stored under key {}", record.id, key),
                )
                .into());
            }
            let graph = record.into_graph()?;
            graphs.insert(key, graph);
        }

        for (key, record) in self.artifacts {
            let graph = graphs.get_mut(&key).ok_or_else(|| {
                Corruption::new(
                    CorruptionKind::OrphanArtifact,
                    format!("artifact for missing graph {}", key),
                )
            })?;
            graph.set_render_artifact(record.into_artifact());
        }

        let retired: BTreeSet<GraphId> = self.retired_graph_ids.into_iter().collect();
        let forest = Forest::from_parts(
            self.root_graph_id,
            graphs,
            self.active_path,
            self.graph_seq,
            retired,
        );
        validate_forest(&forest)?;

        debug!("Snapshot validated: {} graphs", forest.len());
        Ok(forest)
    }

    pub fn to_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document, checking its version before its shape
    pub fn from_json(text: &str) -> SnapshotResult<Self> {
        let probe: VersionProbe = serde_json::from_str(text)?;
        let found = probe
            .version
            .ok_or_else(|| Corruption::new(CorruptionKind::Malformed, "missing version field"))?;
        if found != u64::from(SNAPSHOT_VERSION) {
            return Err(SnapshotError::UnsupportedVersion {
                found,
                supported: SNAPSHOT_VERSION,
            });
        }

        let document: SnapshotDocument = serde_json::from_str(text)
            .map_err(|e| Corruption::new(CorruptionKind::Malformed, e.to_string()))?;
        Ok(document.into_snapshot()?)
    }

    /// Write to `path`; a `.gz` extension selects gzip compression
    pub fn save(&self, path: impl AsRef<Path>) -> SnapshotResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        let file = BufWriter::new(File::create(path)?);

        if is_gzip(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(json.as_bytes())?;
            encoder.finish()?.flush()?;
        } else {
            let mut file = file;
            file.write_all(json.as_bytes())?;
            file.flush()?;
        }

        info!(
            "Saved snapshot with {} graphs to {:?}",
            self.graphs.len(),
            path
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let mut text = String::new();
        if is_gzip(path) {
            GzDecoder::new(reader).read_to_string(&mut text)?;
        } else {
            reader.read_to_string(&mut text)?;
        }

        let snapshot = Self::from_json(&text)?;
        info!(
            "Loaded snapshot with {} graphs from {:?}",
            snapshot.graphs.len(),
            path
        );
        Ok(snapshot)
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SemanticType;
    use crate::persistence::SnapshotError;
    use tempfile::TempDir;

    fn two_level() -> Forest {
        let mut root = SceneGraph::new("", "Valley");
        root.master_prompt = "A green valley".to_string();
        root.add_node(
            SceneNode::new("village", "Village")
                .with_type(SemanticType::Location)
                .with_position(0.1, 0.0),
        )
        .unwrap();
        root.add_node(SceneNode::new("peak", "Peak").with_type(SemanticType::Sky))
            .unwrap();
        root.add_edge(&"village".into(), &"peak".into(), "overlooked_by")
            .unwrap();

        let mut forest = Forest::new(root);
        let root_id = forest.root_id().clone();

        let mut child = SceneGraph::new("", "Village");
        child.add_node(SceneNode::new("inn", "Inn")).unwrap();
        child.add_node(SceneNode::new("mill", "Mill")).unwrap();
        child.remove_node(&"mill".into()).unwrap();
        forest
            .attach_child(&root_id, &"village".into(), child)
            .unwrap();
        forest.navigate_into(&"village".into()).unwrap();
        forest
            .set_render_artifact(&root_id, RenderArtifact::png(vec![1u8, 2, 3]).with_style("ink"))
            .unwrap();
        forest
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let forest = two_level();
        let json = Snapshot::capture(&forest).to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap().into_forest().unwrap();

        assert_eq!(restored, forest);
        let root = restored.root().unwrap();
        let artifact = root.render_artifact().unwrap();
        assert!(!artifact.is_loaded());
        assert_eq!(artifact.bytes().unwrap().as_ref(), &[1u8, 2, 3]);
        assert_eq!(restored.breadcrumbs().len(), 2);
    }

    #[test]
    fn test_retired_ids_survive() {
        let forest = two_level();
        let restored = Snapshot::capture(&forest).into_forest().unwrap();
        let child_id = restored.children_of(restored.root_id())[0].clone();
        let mut child = restored.graph(&child_id).unwrap().clone();
        assert!(child.add_node(SceneNode::new("mill", "Mill")).is_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut value = serde_json::to_value(Snapshot::capture(&two_level())).unwrap();
        value["version"] = serde_json::json!(7);
        let err = Snapshot::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::UnsupportedVersion { found: 7, supported: 1 }
        ));
    }

    #[test]
    fn test_graph_order_follows_document() {
        let mut snapshot = Snapshot::capture(&two_level());
        snapshot.graphs.reverse();
        let expected: Vec<GraphId> = snapshot.graphs.keys().cloned().collect();

        let parsed = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed.graphs.keys().cloned().collect::<Vec<_>>(), expected);
        let forest = parsed.into_forest().unwrap();
        assert_eq!(forest.graph_ids().cloned().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_repeated_artifact_key_is_corrupt() {
        let snapshot = Snapshot::capture(&two_level());
        let (key, record) = snapshot.artifacts.get_index(0).unwrap();
        let entry = format!(
            "{}:{}",
            serde_json::to_string(key).unwrap(),
            serde_json::to_string(record).unwrap()
        );
        let mut value = serde_json::to_value(&snapshot).unwrap();
        value["artifacts"] = serde_json::json!({});
        let text = value
            .to_string()
            .replacen("\"artifacts\":{}", &format!("\"artifacts\":{{{},{}}}", entry, entry), 1);

        let err = Snapshot::from_json(&text).unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::DuplicateGraphId));
    }

    #[test]
    fn test_orphan_artifact_is_corrupt() {
        let mut snapshot = Snapshot::capture(&two_level());
        let record = snapshot.artifacts[0].clone();
        snapshot.artifacts.insert(GraphId::new("g42"), record);
        let err = snapshot.into_forest().unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::OrphanArtifact));
    }

    #[test]
    fn test_duplicate_node_is_corrupt() {
        let mut snapshot = Snapshot::capture(&two_level());
        let record = snapshot.graphs.get_index_mut(0).unwrap().1;
        let copy = record.nodes[0].clone();
        record.nodes.push(copy);
        let err = snapshot.into_forest().unwrap_err();
        assert_eq!(err.corruption_kind(), Some(CorruptionKind::DuplicateNodeId));
    }

    #[test]
    fn test_gzip_save_and_load() {
        let dir = TempDir::new().unwrap();
        let forest = two_level();
        let snapshot = Snapshot::capture(&forest);

        for name in ["world.json", "world.json.gz"] {
            let path = dir.path().join(name);
            snapshot.save(&path).unwrap();
            let loaded = Snapshot::load(&path).unwrap();
            assert_eq!(loaded, snapshot);
        }

        let raw = std::fs::read(dir.path().join("world.json.gz")).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }
}
