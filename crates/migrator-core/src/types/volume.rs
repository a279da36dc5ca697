//! Block volume descriptors used for replication.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::cloud::{Server, Volume};

/// A block volume as seen by the storage backend.
///
/// Source- and target-side descriptors are structurally identical but
/// reference different clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Display name (used in logs and snapshot names).
    pub name: String,
    /// Image name inside the pool.
    pub volume_id: String,
    /// Whether the volume holds the root disk.
    pub is_bootable: bool,
    /// Size in GB, when known.
    pub size: Option<u64>,
    /// Storage pool holding the image.
    pub pool: String,
}

impl VolumeDescriptor {
    /// Describe a managed block volume stored in `pool`.
    ///
    /// Managed volumes are stored as `volume-<id>` images.
    pub fn from_volume(volume: &Volume, pool: &str) -> Self {
        Self {
            name: volume.name.clone(),
            volume_id: format!("volume-{}", volume.id),
            is_bootable: volume.bootable,
            size: Some(volume.size_gb),
            pool: pool.to_string(),
        }
    }

    /// Describe the image-backed root disk of a server that does not boot
    /// from a managed volume.
    pub fn ephemeral_root(server: &Server, pool: &str) -> Self {
        Self {
            name: format!("{}_vda", server.name),
            volume_id: format!("{}_disk", server.id),
            is_bootable: true,
            size: None,
            pool: pool.to_string(),
        }
    }

    /// `pool/image` path of the volume.
    pub fn spec(&self) -> String {
        format!("{}/{}", self.pool, self.volume_id)
    }
}

/// Role of a volume within a VM, used to match source and target volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolumeRole {
    /// The root disk.
    Boot,
    /// A data disk, by ordinal among the VM's data disks.
    Data(usize),
}

impl fmt::Display for VolumeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot => write!(f, "boot"),
            Self::Data(n) => write!(f, "data{n}"),
        }
    }
}
