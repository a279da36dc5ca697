//! # migrator-core
//!
//! Core crate for the VM migrator. Contains the cloud and replication
//! capability traits, configuration schemas, domain types (jobs, manifest
//! rows, volumes, strategies), and the unified error system.
//!
//! This crate has **no** internal dependencies on other migrator crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

/// Log target for migration events.
///
/// The `/logs` endpoint filters the application log file on this target.
pub const MIGRATION_TARGET: &str = "migration";
