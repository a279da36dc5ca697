//! In-memory task registry.
//!
//! Tracks submitted batches for the lifetime of the process. A batch is
//! identified by a generated [`JobId`]; its [`JobKey`] is only used to refuse
//! a second run of the same logical batch while the first is still running.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing;

use migrator_core::types::{JobId, JobKey, JobState};

/// Status of one submitted batch.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Generated job id.
    pub id: JobId,
    /// Deduplication key.
    pub key: JobKey,
    /// Lifecycle state.
    pub state: JobState,
    /// When the job was accepted.
    pub submitted_at: DateTime<Utc>,
    /// When the job finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// VMs whose migration failed.
    pub failed_vms: Vec<String>,
    /// Batch-level error.
    pub error: Option<String>,
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The batch ran; some VMs may have failed.
    Completed {
        /// Names of the VMs that failed.
        failed_vms: BTreeSet<String>,
    },
    /// The batch could not run.
    Error(String),
}

/// Process-lifetime registry of batches.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    /// Latest job per key.
    by_key: DashMap<JobKey, JobId>,
    /// All job records.
    records: DashMap<JobId, JobRecord>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch for `key`.
    ///
    /// Returns `None` when a batch with the same key is still running. The
    /// check and the insert happen under the key's entry lock.
    pub fn begin(&self, key: JobKey) -> Option<JobId> {
        let record_key = key.clone();
        match self.by_key.entry(key) {
            Entry::Occupied(mut entry) => {
                let running = self
                    .records
                    .get(entry.get())
                    .is_some_and(|r| r.state == JobState::Running);
                if running {
                    tracing::warn!(
                        target: migrator_core::MIGRATION_TARGET,
                        "Job '{}' is already running, ignoring duplicate submission",
                        record_key
                    );
                    return None;
                }
                let id = self.insert_running(record_key);
                entry.insert(id);
                Some(id)
            }
            Entry::Vacant(entry) => {
                let id = self.insert_running(record_key);
                entry.insert(id);
                Some(id)
            }
        }
    }

    fn insert_running(&self, key: JobKey) -> JobId {
        let id = JobId::new();
        self.records.insert(
            id,
            JobRecord {
                id,
                key,
                state: JobState::Running,
                submitted_at: Utc::now(),
                finished_at: None,
                failed_vms: Vec::new(),
                error: None,
            },
        );
        id
    }

    /// Record the end of a batch. Unknown ids are ignored.
    pub fn finish(&self, id: JobId, outcome: JobOutcome) {
        let Some(mut record) = self.records.get_mut(&id) else {
            tracing::warn!("finish() called for unknown job {}", id);
            return;
        };

        match outcome {
            JobOutcome::Completed { failed_vms } => {
                record.state = JobState::Completed;
                record.failed_vms = failed_vms.into_iter().collect();
            }
            JobOutcome::Error(message) => {
                record.state = JobState::Error;
                record.error = Some(message);
            }
        }
        record.finished_at = Some(Utc::now());
    }

    /// Look up a job.
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.submitted_at);
        records
    }

    /// State of the latest job for `key`, if any.
    pub fn state_of(&self, key: &JobKey) -> Option<JobState> {
        let id = *self.by_key.get(key)?;
        self.records.get(&id).map(|r| r.state)
    }
}
