//! Replication strategy selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Algorithm used to move block-storage content between clouds.
///
/// Chosen once per batch and applied to every volume pair in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicationStrategy {
    /// Snapshot the source, recreate the target, transfer the snapshot diff.
    #[default]
    #[serde(rename = "snapshot")]
    Snapshot,
    /// Roll the target back to the latest common snapshot and apply the
    /// source's changes since then.
    #[serde(rename = "rbd_diff")]
    IncrementalDiff,
    /// Recreate the target from a full export of the source.
    #[serde(rename = "full_migrate")]
    FullCopy,
}

impl ReplicationStrategy {
    /// Wire name used by the submission form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::IncrementalDiff => "rbd_diff",
            Self::FullCopy => "full_migrate",
        }
    }

    /// Whether the target VM must be created before replication.
    ///
    /// Incremental runs reuse the VM and volumes created by an earlier run.
    pub fn provisions_target(&self) -> bool {
        !matches!(self, Self::IncrementalDiff)
    }
}

impl fmt::Display for ReplicationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicationStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "snapshot" => Ok(Self::Snapshot),
            "rbd_diff" | "incremental-diff" => Ok(Self::IncrementalDiff),
            "full_migrate" | "full-copy" => Ok(Self::FullCopy),
            other => Err(AppError::validation(format!(
                "Unsupported migration method '{other}'"
            ))),
        }
    }
}
