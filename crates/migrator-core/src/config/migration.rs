//! Batch and job orchestration configuration.

use serde::{Deserialize, Serialize};

/// Settings for the batch coordinator and per-VM jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory where uploaded manifests and storage configs are saved.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Concurrency used when a submission does not specify one.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    /// Upper bound accepted for a submission's concurrency.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Suffix appended to the VM name in the target cloud.
    #[serde(default)]
    pub target_name_suffix: String,
    /// Delay between target VM status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Budget for the target VM to become active (and then stopped).
    #[serde(default = "default_provision_timeout")]
    pub provision_timeout_seconds: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            default_concurrency: default_concurrency(),
            max_concurrency: default_max_concurrency(),
            target_name_suffix: String::new(),
            poll_interval_seconds: default_poll_interval(),
            provision_timeout_seconds: default_provision_timeout(),
        }
    }
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    64
}

fn default_poll_interval() -> u64 {
    5
}

fn default_provision_timeout() -> u64 {
    1800
}
