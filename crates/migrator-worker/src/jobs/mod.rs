//! Per-VM migration job and target provisioning.

pub mod provision;
pub mod vm;

pub use provision::TargetProvisioner;
pub use vm::VmMigrationJob;
