//! Replication engine: drives every volume pair of a VM through its
//! strategy under a bounded number of concurrent pairs.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing;

use migrator_core::MIGRATION_TARGET;
use migrator_core::traits::replication::ReplicationBackend;
use migrator_core::types::{ReplicationStrategy, VolumeDescriptor};

use super::pairing::{VolumePair, pair_by_role};
use super::strategy::replicate_one;

/// Outcome counts of one VM's replication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    /// Pairs replicated successfully.
    pub succeeded: usize,
    /// Pairs whose replication failed.
    pub failed: usize,
    /// Volumes left out of the pairing.
    pub skipped: usize,
    /// Bytes streamed between the clusters.
    pub bytes: u64,
}

/// Replicates volume pairs through a [`ReplicationBackend`].
#[derive(Debug, Clone)]
pub struct ReplicationEngine {
    backend: Arc<dyn ReplicationBackend>,
}

impl ReplicationEngine {
    /// Create an engine over `backend`.
    pub fn new(backend: Arc<dyn ReplicationBackend>) -> Self {
        Self { backend }
    }

    /// Pair `source` with `target` volumes and replicate every pair.
    ///
    /// Pair failures are logged and counted; they do not stop other pairs.
    pub async fn replicate_all(
        &self,
        source: Vec<VolumeDescriptor>,
        target: Vec<VolumeDescriptor>,
        concurrency: usize,
        strategy: ReplicationStrategy,
    ) -> ReplicationReport {
        let pairing = pair_by_role(source, target);
        for (role, volume) in &pairing.unmatched_source {
            tracing::warn!(
                target: MIGRATION_TARGET,
                "No target volume for source {} ({}), skipping",
                volume.spec(),
                role
            );
        }
        for (role, volume) in &pairing.unmatched_target {
            tracing::warn!(
                target: MIGRATION_TARGET,
                "No source volume for target {} ({}), leaving it untouched",
                volume.spec(),
                role
            );
        }

        let mut report = ReplicationReport {
            skipped: pairing.skipped(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(pairing.pairs.len());
        for pair in pairing.pairs {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let label = format!("{} -> {}", pair.source.spec(), pair.target.spec());
            handles.push((
                label,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_pair(backend.as_ref(), &pair, strategy).await
                }),
            ));
        }

        for (label, handle) in handles {
            match handle.await {
                Ok(Some(bytes)) => {
                    report.succeeded += 1;
                    report.bytes += bytes;
                }
                Ok(None) => report.failed += 1,
                Err(e) => {
                    tracing::error!(
                        target: MIGRATION_TARGET,
                        "Replication task for {} aborted: {}",
                        label,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Replicate one pair, logging the outcome. Returns the bytes moved on
/// success.
async fn run_pair(
    backend: &dyn ReplicationBackend,
    pair: &VolumePair,
    strategy: ReplicationStrategy,
) -> Option<u64> {
    tracing::info!(
        target: MIGRATION_TARGET,
        "Replicating {} ({}) into {} with strategy {}",
        pair.source.name,
        pair.source.spec(),
        pair.target.spec(),
        strategy
    );

    match replicate_one(backend, pair, strategy).await {
        Ok(stats) => {
            tracing::info!(
                target: MIGRATION_TARGET,
                "Replicated {} into {} ({} bytes)",
                pair.source.name,
                pair.target.spec(),
                stats.bytes
            );
            Some(stats.bytes)
        }
        Err(e) => {
            tracing::error!(
                target: MIGRATION_TARGET,
                "Replication of {} into {} failed: {}",
                pair.source.name,
                pair.target.spec(),
                e
            );
            None
        }
    }
}
