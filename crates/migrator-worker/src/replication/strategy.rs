//! Per-pair replication algorithms.

use chrono::{DateTime, Utc};
use tracing;

use migrator_core::error::AppError;
use migrator_core::result::AppResult;
use migrator_core::traits::replication::{
    ImageSpec, ReplicationBackend, SnapshotInfo, TransferStats,
};
use migrator_core::types::ReplicationStrategy;

use super::pairing::VolumePair;

/// Snapshot timestamp layout.
const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Name of a migration snapshot taken at `at`: `<name>-snapshot-<YYYYmmddHHMMSS>`.
pub fn snapshot_name(volume_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{volume_name}-snapshot-{}",
        at.format(SNAPSHOT_TIMESTAMP_FORMAT)
    )
}

/// Most recent snapshot. With equal timestamps any of them may be returned.
pub fn latest(snapshots: &[SnapshotInfo]) -> Option<&SnapshotInfo> {
    snapshots.iter().max_by_key(|s| s.created_at)
}

/// Replicate one pair with `strategy`.
pub async fn replicate_one(
    backend: &dyn ReplicationBackend,
    pair: &VolumePair,
    strategy: ReplicationStrategy,
) -> AppResult<TransferStats> {
    match strategy {
        ReplicationStrategy::Snapshot => snapshot_copy(backend, pair).await,
        ReplicationStrategy::IncrementalDiff => incremental_diff(backend, pair).await,
        ReplicationStrategy::FullCopy => full_copy(backend, pair).await,
    }
}

/// Snapshot the source, recreate the target and import the snapshot's diff.
async fn snapshot_copy(
    backend: &dyn ReplicationBackend,
    pair: &VolumePair,
) -> AppResult<TransferStats> {
    let source = ImageSpec::source(&pair.source);
    let target = ImageSpec::target(&pair.target);
    let size_gb = pair.target.size.ok_or_else(|| {
        AppError::replication(format!("Size of target volume {target} is unknown"))
    })?;

    let label = if pair.source.name.is_empty() {
        &pair.source.volume_id
    } else {
        &pair.source.name
    };
    let snapshot = snapshot_name(label, Utc::now());

    backend.create_snapshot(&source, &snapshot).await?;
    backend.remove_image(&target).await?;
    backend.create_image(&target, size_gb).await?;
    backend
        .export_import_diff(&source, None, Some(&snapshot), &target)
        .await
}

/// Roll the target back to the latest common snapshot and import the
/// source's changes since then.
async fn incremental_diff(
    backend: &dyn ReplicationBackend,
    pair: &VolumePair,
) -> AppResult<TransferStats> {
    let source = ImageSpec::source(&pair.source);
    let target = ImageSpec::target(&pair.target);

    let snapshots = backend.list_snapshots(&source).await?;
    let snapshot = latest(&snapshots)
        .ok_or_else(|| AppError::replication(format!("No snapshot found on source {source}")))?
        .name
        .clone();

    let target_snapshots = backend.list_snapshots(&target).await?;
    if !target_snapshots.iter().any(|s| s.name == snapshot) {
        return Err(AppError::replication(format!(
            "Target {target} has no snapshot '{snapshot}'; replicate it with the snapshot strategy first"
        )));
    }

    tracing::debug!("Syncing {} into {} from snapshot {}", source, target, snapshot);
    backend.rollback(&target, &snapshot).await?;
    backend
        .export_import_diff(&source, Some(&snapshot), None, &target)
        .await
}

/// Remove the target and stream a full export into it.
async fn full_copy(backend: &dyn ReplicationBackend, pair: &VolumePair) -> AppResult<TransferStats> {
    let source = ImageSpec::source(&pair.source);
    let target = ImageSpec::target(&pair.target);

    backend.remove_image(&target).await?;
    backend.export_import(&source, &target).await
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_snapshot_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 7, 8, 9).unwrap();
        assert_eq!(snapshot_name("web01_vda", at), "web01_vda-snapshot-20240302070809");
    }

    #[test]
    fn test_latest_picks_max_timestamp() {
        let snap = |name: &str, h: u32| SnapshotInfo {
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap(),
        };
        let snapshots = vec![snap("a", 1), snap("c", 9), snap("b", 4)];
        assert_eq!(latest(&snapshots).map(|s| s.name.as_str()), Some("c"));
        assert!(latest(&[]).is_none());
    }
}
