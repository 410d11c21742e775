//! Persistence coordinator
//!
//! Serializes a whole hierarchy, render artifacts included, into a versioned
//! snapshot document and rebuilds it with full validation. A document that
//! violates any structural invariant is rejected before a forest exists.

pub mod snapshot;
pub mod validation;

pub use snapshot::{ArtifactRecord, GraphRecord, Snapshot, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};
pub use validation::{validate_forest, Corruption, CorruptionKind};

use thiserror::Error;

/// Snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Document violates a structural invariant
    #[error("Corrupt snapshot: {0}")]
    Corrupt(#[from] Corruption),

    #[error("Unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    pub fn corruption_kind(&self) -> Option<CorruptionKind> {
        match self {
            SnapshotError::Corrupt(c) => Some(c.kind),
            _ => None,
        }
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
