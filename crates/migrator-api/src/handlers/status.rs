//! Job status handlers.

use axum::Json;
use axum::extract::{Path, State};

use migrator_core::error::AppError;
use migrator_core::types::JobId;
use migrator_worker::JobRecord;

use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /migrations
pub async fn list_migrations(State(state): State<AppState>) -> Json<ApiResponse<Vec<JobRecord>>> {
    Json(ApiResponse::ok(state.registry.list()))
}

/// GET /migrations/{id}
pub async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobRecord>>, ApiError> {
    let id: JobId = id
        .parse()
        .map_err(|_| AppError::validation(format!("Invalid job id '{id}'")))?;
    let record = state
        .registry
        .get(id)
        .ok_or_else(|| AppError::not_found(format!("Migration job {id} not found")))?;
    Ok(Json(ApiResponse::ok(record)))
}
