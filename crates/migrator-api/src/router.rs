//! Route definitions for the migrator HTTP API.
//!
//! The router receives `AppState` and passes it to all handlers via Axum's
//! `State` extractor.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.server.max_upload_size_bytes as usize;

    Router::new()
        .merge(migration_routes())
        .merge(log_routes())
        .merge(health_routes())
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Submission and status polling
fn migration_routes() -> Router<AppState> {
    Router::new()
        .route("/migrate", post(handlers::migrate::submit_migration))
        .route("/migrations", get(handlers::status::list_migrations))
        .route("/migrations/{id}", get(handlers::status::get_migration))
}

/// Migration log view
fn log_routes() -> Router<AppState> {
    Router::new().route("/logs", get(handlers::logs::migration_logs))
}

/// Liveness probe
fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(handlers::health::healthz))
}
