//! RBD implementation of the replication capability.

pub mod command;
pub mod snapshot;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing;

use migrator_core::config::ReplicationConfig;
use migrator_core::result::AppResult;
use migrator_core::traits::replication::{
    ImageSpec, ReplicationBackend, Site, SnapshotInfo, TransferStats,
};

use self::command::{CommandRunner, CommandSpec};

/// Replication backend driving two Ceph clusters through the `rbd` tool.
///
/// Each site may carry its own cluster configuration file; without one
/// `rbd` falls back to its default configuration lookup.
#[derive(Debug, Clone)]
pub struct RbdBackend {
    /// `rbd` executable.
    binary: String,
    /// Cluster configuration for the source site.
    source_conf: Option<PathBuf>,
    /// Cluster configuration for the target site.
    target_conf: Option<PathBuf>,
    /// Object size used when recreating target images.
    object_size: String,
    /// Process runner.
    runner: CommandRunner,
}

impl RbdBackend {
    /// Create a backend for one migration run.
    pub fn new(
        config: &ReplicationConfig,
        source_conf: Option<PathBuf>,
        target_conf: Option<PathBuf>,
    ) -> Self {
        Self {
            binary: config.rbd_binary.clone(),
            source_conf,
            target_conf,
            object_size: config.object_size.clone(),
            runner: CommandRunner::new(config.command_timeout_seconds.map(Duration::from_secs)),
        }
    }

    /// Base command for a site: `rbd [--conf <file>]`.
    fn rbd(&self, site: Site) -> CommandSpec {
        let conf = match site {
            Site::Source => &self.source_conf,
            Site::Target => &self.target_conf,
        };
        let spec = CommandSpec::new(&self.binary);
        match conf {
            Some(path) => spec.arg("--conf").arg(path.to_string_lossy()),
            None => spec,
        }
    }

    fn snapshot_ls(&self, image: &ImageSpec) -> CommandSpec {
        self.rbd(image.site)
            .args(["snap", "ls", "--format", "json"])
            .arg(image.to_string())
    }

    fn create(&self, image: &ImageSpec, size_gb: u64) -> CommandSpec {
        self.rbd(image.site)
            .arg("create")
            .arg("--size")
            .arg(format!("{size_gb}G"))
            .arg("--object-size")
            .arg(&self.object_size)
            .arg(image.to_string())
    }

    fn export_diff(
        &self,
        image: &ImageSpec,
        from_snapshot: Option<&str>,
        at_snapshot: Option<&str>,
    ) -> CommandSpec {
        let mut spec = self.rbd(image.site).args(["export-diff", "--no-progress"]);
        if let Some(from) = from_snapshot {
            spec = spec.arg("--from-snap").arg(from);
        }
        let path = match at_snapshot {
            Some(at) => format!("{image}@{at}"),
            None => image.to_string(),
        };
        spec.arg(path).arg("-")
    }
}

#[async_trait]
impl ReplicationBackend for RbdBackend {
    async fn create_snapshot(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()> {
        let spec = self
            .rbd(image.site)
            .args(["snap", "create"])
            .arg(format!("{image}@{snapshot}"));
        self.runner.run(&spec).await?;
        tracing::info!(
            target: migrator_core::MIGRATION_TARGET,
            "Created snapshot {} of {}",
            snapshot,
            image
        );
        Ok(())
    }

    async fn list_snapshots(&self, image: &ImageSpec) -> AppResult<Vec<SnapshotInfo>> {
        let output = self.runner.run(&self.snapshot_ls(image)).await?;
        snapshot::parse_snapshot_listing(&output)
    }

    async fn remove_image(&self, image: &ImageSpec) -> AppResult<()> {
        let spec = self
            .rbd(image.site)
            .args(["rm", "--no-progress"])
            .arg(image.to_string());
        self.runner.run(&spec).await?;
        tracing::info!(target: migrator_core::MIGRATION_TARGET, "Removed {}", image);
        Ok(())
    }

    async fn create_image(&self, image: &ImageSpec, size_gb: u64) -> AppResult<()> {
        self.runner.run(&self.create(image, size_gb)).await?;
        tracing::info!(
            target: migrator_core::MIGRATION_TARGET,
            "Created {} ({} GB, object size {})",
            image,
            size_gb,
            self.object_size
        );
        Ok(())
    }

    async fn rollback(&self, image: &ImageSpec, snapshot: &str) -> AppResult<()> {
        let spec = self
            .rbd(image.site)
            .args(["snap", "rollback", "--no-progress"])
            .arg(format!("{image}@{snapshot}"));
        self.runner.run(&spec).await?;
        tracing::info!(
            target: migrator_core::MIGRATION_TARGET,
            "Rolled {} back to {}",
            image,
            snapshot
        );
        Ok(())
    }

    async fn export_import(
        &self,
        source: &ImageSpec,
        target: &ImageSpec,
    ) -> AppResult<TransferStats> {
        let exporter = self
            .rbd(source.site)
            .args(["export", "--no-progress"])
            .arg(source.to_string())
            .arg("-");
        let importer = self
            .rbd(target.site)
            .args(["import", "--no-progress", "-"])
            .arg(target.to_string());
        let bytes = self.runner.pipe(&exporter, &importer).await?;
        Ok(TransferStats { bytes })
    }

    async fn export_import_diff(
        &self,
        source: &ImageSpec,
        from_snapshot: Option<&str>,
        at_snapshot: Option<&str>,
        target: &ImageSpec,
    ) -> AppResult<TransferStats> {
        let exporter = self.export_diff(source, from_snapshot, at_snapshot);
        let importer = self
            .rbd(target.site)
            .args(["import-diff", "--no-progress", "-"])
            .arg(target.to_string());
        let bytes = self.runner.pipe(&exporter, &importer).await?;
        Ok(TransferStats { bytes })
    }
}
