//! # migrator-storage
//!
//! Storage replication backend built on the `rbd` command-line tool.
//!
//! - [`rbd::RbdBackend`] implements the replication capability trait
//! - [`rbd::command`] runs single commands and exporter/importer pipelines
//! - [`rbd::snapshot`] parses snapshot listings

pub mod rbd;

pub use rbd::RbdBackend;
