//! Cloud API client configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every cloud API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Service catalog interface to use (`public`, `internal`, `admin`).
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            interface: default_interface(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_interface() -> String {
    "public".to_string()
}
