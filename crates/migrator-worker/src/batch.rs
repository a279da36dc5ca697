//! Batch coordinator: runs every manifest row as a VM migration job with
//! at most `concurrency` jobs in flight.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing;

use migrator_core::MIGRATION_TARGET;
use migrator_core::error::AppError;
use migrator_core::result::AppResult;
use migrator_core::types::{MigrationRow, ReplicationStrategy};

use crate::context::MigrationContext;
use crate::jobs::VmMigrationJob;
use crate::manifest;

/// Runs batches of VM migrations.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    job: VmMigrationJob,
}

impl BatchCoordinator {
    /// Create a coordinator over `context`.
    pub fn new(context: MigrationContext) -> Self {
        Self {
            job: VmMigrationJob::new(context),
        }
    }

    /// Load the manifest at `path` and migrate every row.
    ///
    /// A manifest error aborts the batch before any VM is touched.
    pub async fn run_manifest(
        &self,
        path: &Path,
        concurrency: usize,
        strategy: ReplicationStrategy,
    ) -> AppResult<BTreeSet<String>> {
        let rows = manifest::load_manifest(path).await?;
        tracing::info!(
            target: MIGRATION_TARGET,
            "Loaded {} VM(s) from {}",
            rows.len(),
            path.display()
        );
        self.run_batch(rows, concurrency, strategy).await
    }

    /// Migrate every row, returning the names of the VMs that failed.
    ///
    /// `concurrency` bounds both the number of VMs in flight and the number
    /// of volume pairs replicated at once per VM.
    pub async fn run_batch(
        &self,
        rows: Vec<MigrationRow>,
        concurrency: usize,
        strategy: ReplicationStrategy,
    ) -> AppResult<BTreeSet<String>> {
        if concurrency == 0 {
            return Err(AppError::validation("Concurrency must be at least 1"));
        }
        if concurrency > 1 {
            tracing::warn!(
                target: MIGRATION_TARGET,
                "Up to {} volume transfers may run at once ({} VMs x {} volumes)",
                concurrency * concurrency,
                concurrency,
                concurrency
            );
        }

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let job = self.job.clone();
            let semaphore = Arc::clone(&semaphore);
            let vm_name = row.vm_name.clone();
            handles.push((
                vm_name,
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    job.migrate_one(&row.vm_name, concurrency, &row.target_az, strategy)
                        .await
                }),
            ));
        }

        let mut failed = BTreeSet::new();
        for (vm_name, handle) in handles {
            match handle.await {
                Ok(Some(name)) => {
                    failed.insert(name);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        target: MIGRATION_TARGET,
                        "Migration task for VM '{}' aborted: {}",
                        vm_name,
                        e
                    );
                    failed.insert(vm_name);
                }
            }
        }

        if failed.is_empty() {
            tracing::info!(target: MIGRATION_TARGET, "Batch completed without failures");
        } else {
            tracing::warn!(
                target: MIGRATION_TARGET,
                "Batch completed with {} failed VM(s): {:?}",
                failed.len(),
                failed
            );
        }
        Ok(failed)
    }
}
