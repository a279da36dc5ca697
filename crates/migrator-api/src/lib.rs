//! # migrator-api
//!
//! HTTP API layer for the VM migrator built on Axum.
//!
//! Provides the migration submission endpoint, job status polling, the
//! migration log view, the health probe, request logging and error mapping.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
