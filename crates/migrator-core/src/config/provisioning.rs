//! Target VM provisioning defaults.

use serde::{Deserialize, Serialize};

/// Defaults applied when a VM is recreated in the target cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Image used when the source image has no same-named counterpart.
    #[serde(default = "default_image")]
    pub default_image: String,
    /// Block storage volume type for every created volume.
    #[serde(default = "default_volume_type")]
    pub volume_type: String,
    /// Security group attached to the created VM.
    #[serde(default = "default_security_group")]
    pub security_group: String,
    /// Admin password set on the created VM.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            default_image: default_image(),
            volume_type: default_volume_type(),
            security_group: default_security_group(),
            admin_password: default_admin_password(),
        }
    }
}

fn default_image() -> String {
    "migration-generic-qcow2".to_string()
}

fn default_volume_type() -> String {
    "hdd".to_string()
}

fn default_security_group() -> String {
    "all_pass".to_string()
}

fn default_admin_password() -> String {
    "P@ssw0rd".to_string()
}
