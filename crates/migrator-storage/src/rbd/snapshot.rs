//! Snapshot listing parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing;

use migrator_core::error::AppError;
use migrator_core::traits::replication::SnapshotInfo;

/// Timestamp layout printed by `rbd snap ls`, e.g. `Thu Nov 14 10:11:12 2024`.
const RBD_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Entry of `rbd snap ls --format json`.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    name: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Parse the JSON output of `rbd snap ls --format json`.
///
/// Entries whose timestamp is missing or unparseable are skipped with a
/// warning.
pub fn parse_snapshot_listing(output: &str) -> Result<Vec<SnapshotInfo>, AppError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<RawSnapshot> = serde_json::from_str(trimmed)
        .map_err(|e| AppError::replication(format!("Unreadable snapshot listing: {e}")))?;

    let mut snapshots = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.timestamp.as_deref().and_then(parse_timestamp) {
            Some(created_at) => snapshots.push(SnapshotInfo {
                name: entry.name,
                created_at,
            }),
            None => tracing::warn!(
                target: migrator_core::MIGRATION_TARGET,
                "Cannot parse creation time of snapshot '{}': {:?}",
                entry.name,
                entry.timestamp
            ),
        }
    }
    Ok(snapshots)
}

/// Parse an rbd timestamp. Day-of-month may be space padded.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, RBD_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
