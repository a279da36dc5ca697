//! Core type definitions used across the migrator workspace.

pub mod id;
pub mod job;
pub mod manifest;
pub mod strategy;
pub mod volume;

pub use id::JobId;
pub use job::{JobKey, JobState};
pub use manifest::MigrationRow;
pub use strategy::ReplicationStrategy;
pub use volume::{VolumeDescriptor, VolumeRole};
