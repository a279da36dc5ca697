//! Manifest row type.

use serde::{Deserialize, Serialize};

/// One VM to migrate, as read from the batch manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRow {
    /// Name of the VM in the source cloud.
    pub vm_name: String,
    /// Availability zone to place the VM in the target cloud.
    pub target_az: String,
}

impl MigrationRow {
    /// Create a new row.
    pub fn new(vm_name: impl Into<String>, target_az: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            target_az: target_az.into(),
        }
    }
}
