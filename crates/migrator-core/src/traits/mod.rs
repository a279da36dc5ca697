//! Capability traits defined in `migrator-core` and implemented by other
//! crates.

pub mod cloud;
pub mod replication;

pub use cloud::CloudProvider;
pub use replication::ReplicationBackend;
