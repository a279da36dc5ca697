//! Migration of a single VM.

use tracing;

use migrator_core::MIGRATION_TARGET;
use migrator_core::error::AppError;
use migrator_core::result::AppResult;
use migrator_core::types::{ReplicationStrategy, VolumeDescriptor};

use crate::context::MigrationContext;
use crate::jobs::provision::TargetProvisioner;
use crate::replication::{ReplicationEngine, ReplicationReport};

/// Migrates one VM: resolves it in the source cloud, makes sure the target
/// VM exists when the strategy needs one, and replicates its volumes.
#[derive(Debug, Clone)]
pub struct VmMigrationJob {
    context: MigrationContext,
}

impl VmMigrationJob {
    /// Create a job runner over `context`.
    pub fn new(context: MigrationContext) -> Self {
        Self { context }
    }

    /// Migrate `vm_name`. Returns the VM name if the migration failed.
    ///
    /// Errors are logged here and never reach the caller.
    pub async fn migrate_one(
        &self,
        vm_name: &str,
        concurrency: usize,
        target_az: &str,
        strategy: ReplicationStrategy,
    ) -> Option<String> {
        tracing::info!(
            target: MIGRATION_TARGET,
            "Migrating VM '{}' to zone '{}' with strategy {}",
            vm_name,
            target_az,
            strategy
        );

        match self.run(vm_name, concurrency, target_az, strategy).await {
            Ok(report) => {
                tracing::info!(
                    target: MIGRATION_TARGET,
                    "VM '{}' done: {} volume(s) replicated, {} failed, {} skipped",
                    vm_name,
                    report.succeeded,
                    report.failed,
                    report.skipped
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    target: MIGRATION_TARGET,
                    "Migration of VM '{}' failed: {}",
                    vm_name,
                    e
                );
                Some(vm_name.to_string())
            }
        }
    }

    /// Run every step, stopping at the first error.
    pub async fn run(
        &self,
        vm_name: &str,
        concurrency: usize,
        target_az: &str,
        strategy: ReplicationStrategy,
    ) -> AppResult<ReplicationReport> {
        let context = &self.context;

        let source_server = context
            .source
            .find_server(vm_name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("VM '{vm_name}' not found in source")))?;
        let boots_from_volume = source_server.boots_from_volume();
        let source_volumes = context.source.server_volumes(&source_server).await?;

        let target_name = context.target_name(vm_name);
        if strategy.provisions_target() {
            TargetProvisioner::new(context)
                .ensure(&source_server, &source_volumes, &target_name, target_az)
                .await?;
        }

        let target_server = context
            .target
            .find_server(&target_name)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("VM '{target_name}' not found in target"))
            })?;
        let target_volumes = context.target.server_volumes(&target_server).await?;

        let mut sources = Vec::with_capacity(source_volumes.len() + 1);
        if !boots_from_volume {
            sources.push(VolumeDescriptor::ephemeral_root(
                &source_server,
                &context.config.replication.ephemeral_pool,
            ));
        }
        sources.extend(
            source_volumes
                .iter()
                .map(|v| VolumeDescriptor::from_volume(v, &context.source_pool)),
        );
        let targets: Vec<VolumeDescriptor> = target_volumes
            .iter()
            .map(|v| VolumeDescriptor::from_volume(v, &context.target_pool))
            .collect();

        Ok(ReplicationEngine::new(context.backend.clone())
            .replicate_all(sources, targets, concurrency, strategy)
            .await)
    }
}
