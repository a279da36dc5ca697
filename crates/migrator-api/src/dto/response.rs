//! Response DTOs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use migrator_core::types::JobId;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Plain-text answer to a finished submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Job id.
    pub job_id: JobId,
    /// VMs that failed.
    pub failed_vms: BTreeSet<String>,
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Migration job {} completed. ", self.job_id)?;
        if self.failed_vms.is_empty() {
            write!(f, "All VMs migrated.")
        } else {
            let names: Vec<&str> = self.failed_vms.iter().map(String::as_str).collect();
            write!(f, "Failed VMs: {}", names.join(", "))
        }
    }
}

/// Plain-text answer to a detached submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationAccepted {
    /// Job id to poll.
    pub job_id: JobId,
}

impl fmt::Display for MigrationAccepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Migration job {} accepted. Poll /migrations/{} for its status.",
            self.job_id, self.job_id
        )
    }
}
