//! Migration orchestration for the VM migrator.
//!
//! This crate provides:
//! - A task registry that deduplicates concurrent submissions
//! - A batch coordinator fanning a manifest out into bounded per-VM jobs
//! - The per-VM migration job, including target provisioning
//! - Volume pairing and the storage replication engine

pub mod batch;
pub mod context;
pub mod jobs;
pub mod manifest;
pub mod registry;
pub mod replication;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::BatchCoordinator;
pub use context::{ContextFactory, LiveContextFactory, MigrationContext, MigrationRequest};
pub use registry::{JobOutcome, JobRecord, TaskRegistry};
