//! Migration log view.

use std::io::ErrorKind as IoErrorKind;

use axum::extract::State;

use migrator_core::MIGRATION_TARGET;
use migrator_core::error::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Answer when no log file has been written yet.
pub const LOG_FILE_MISSING: &str = "Log file not found.";

/// Whether a log file line was emitted under the migration target.
pub fn is_migration_line(line: &str) -> bool {
    line.contains(&format!(" {MIGRATION_TARGET}: "))
}

/// Keep only migration lines, in file order.
pub fn migration_lines(content: &str) -> String {
    content
        .lines()
        .filter(|line| is_migration_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// GET /logs
pub async fn migration_logs(State(state): State<AppState>) -> Result<String, ApiError> {
    match tokio::fs::read_to_string(&state.config.logging.file).await {
        Ok(content) => Ok(migration_lines(&content)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(LOG_FILE_MISSING.to_string()),
        Err(e) => Err(AppError::internal(format!(
            "Cannot read log file '{}': {e}",
            state.config.logging.file
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_on_target() {
        let content = "\
2024-05-01T10:00:00.000000Z  INFO migration: Migrating VM 'web01'
2024-05-01T10:00:00.100000Z  INFO migrator_api::middleware::logging: HTTP request
2024-05-01T10:00:01.000000Z ERROR migration: Migration of VM 'web02' failed: NOT_FOUND";
        let lines = migration_lines(content);
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.starts_with("2024-05-01T10:00:00.000000Z  INFO migration:"));
        assert!(!lines.contains("HTTP request"));
    }

    #[test]
    fn test_no_migration_lines() {
        assert_eq!(migration_lines("INFO hyper: accepted\n"), "");
    }
}
