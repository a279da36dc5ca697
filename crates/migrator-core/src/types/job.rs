//! Job deduplication key and lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key used to detect duplicate submissions of the same logical batch.
///
/// Derived from the manifest file name and the source cloud's auth URL.
/// Two unrelated runs may collide; the key is only used to refuse a second
/// run while the first one is still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Derive the key for a manifest submitted against a source endpoint.
    pub fn derive(manifest_name: &str, source_auth_url: &str) -> Self {
        Self(format!("{manifest_name}@{source_auth_url}"))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The batch is in progress.
    Running,
    /// The batch ran to the end (individual VMs may still have failed).
    Completed,
    /// The batch could not run (e.g. manifest error).
    Error,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}
