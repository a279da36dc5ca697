//! Storage replication capability.
//!
//! The orchestration engine drives volumes through snapshot, export and
//! import steps via this trait without knowing how the storage backend is
//! invoked. `migrator-storage` implements it on top of the `rbd` tool.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::volume::VolumeDescriptor;

/// Which cluster an image lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    /// The cluster backing the source cloud.
    Source,
    /// The cluster backing the target cloud.
    Target,
}

/// An image addressed by cluster, pool and image name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Cluster holding the image.
    pub site: Site,
    /// Pool name.
    pub pool: String,
    /// Image name inside the pool.
    pub image: String,
}

impl ImageSpec {
    /// Address a source-side volume.
    pub fn source(volume: &VolumeDescriptor) -> Self {
        Self {
            site: Site::Source,
            pool: volume.pool.clone(),
            image: volume.volume_id.clone(),
        }
    }

    /// Address a target-side volume.
    pub fn target(volume: &VolumeDescriptor) -> Self {
        Self {
            site: Site::Target,
            pool: volume.pool.clone(),
            image: volume.volume_id.clone(),
        }
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pool, self.image)
    }
}

/// A snapshot of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Snapshot name.
    pub name: String,
    /// Creation time reported by the backend.
    pub created_at: DateTime<Utc>,
}

/// Result of a streamed export/import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Bytes moved from the exporter to the importer.
    pub bytes: u64,
}

/// Trait for block-storage replication backends.
#[async_trait]
pub trait ReplicationBackend: Send + Sync + fmt::Debug + 'static {
    /// Create a named snapshot of an image.
    async fn create_snapshot(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()>;

    /// List the snapshots of an image.
    async fn list_snapshots(&self, image: &ImageSpec) -> AppResult<Vec<SnapshotInfo>>;

    /// Delete an image.
    async fn remove_image(&self, image: &ImageSpec) -> AppResult<()>;

    /// Create an empty image of `size_gb` gigabytes.
    async fn create_image(&self, image: &ImageSpec, size_gb: u64) -> AppResult<()>;

    /// Roll an image back to one of its snapshots.
    async fn rollback(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()>;

    /// Stream a full export of `source` into a new image `target`.
    async fn export_import(&self, source: &ImageSpec, target: &ImageSpec)
    -> AppResult<TransferStats>;

    /// Stream the changes of `source` into `target` as a diff.
    ///
    /// `from_snapshot` is the start of the diff (none = from the beginning)
    /// and `at_snapshot` its end (none = current image head).
    async fn export_import_diff(
        &self,
        source: &ImageSpec,
        from_snapshot: Option<&str>,
        at_snapshot: Option<&str>,
        target: &ImageSpec,
    ) -> AppResult<TransferStats>;
}
