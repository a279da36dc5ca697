//! Storage replication configuration.

use serde::{Deserialize, Serialize};

/// Settings for the RBD replication backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Path or name of the `rbd` executable.
    #[serde(default = "default_rbd_binary")]
    pub rbd_binary: String,
    /// Object size used when recreating a target image.
    #[serde(default = "default_object_size")]
    pub object_size: String,
    /// Pool holding the root disks of image-backed VMs.
    #[serde(default = "default_ephemeral_pool")]
    pub ephemeral_pool: String,
    /// Optional per-command timeout; unbounded when absent.
    #[serde(default)]
    pub command_timeout_seconds: Option<u64>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            rbd_binary: default_rbd_binary(),
            object_size: default_object_size(),
            ephemeral_pool: default_ephemeral_pool(),
            command_timeout_seconds: None,
        }
    }
}

fn default_rbd_binary() -> String {
    "rbd".to_string()
}

fn default_object_size() -> String {
    "4M".to_string()
}

fn default_ephemeral_pool() -> String {
    "vms".to_string()
}
