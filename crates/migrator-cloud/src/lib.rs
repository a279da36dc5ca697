//! # migrator-cloud
//!
//! Cloud capability implementation talking to OpenStack's Identity (v3),
//! Compute, Block Storage, Network and Image REST APIs.

pub mod openstack;

pub use openstack::{Credentials, OpenStackProvider};
