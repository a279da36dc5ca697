//! Maps domain `AppError` to HTTP responses.
//!
//! Every endpoint answers errors with a plain-text body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use migrator_core::error::{AppError, ErrorKind};

/// Handler error wrapping [`AppError`].
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Manifest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cloud | ErrorKind::Provisioning | ErrorKind::Replication => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Configuration
        | ErrorKind::Serialization
        | ErrorKind::Io
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, self.0.message).into_response()
    }
}
