//! Per-submission migration context.
//!
//! A [`MigrationContext`] bundles the two cloud connections, the storage
//! backend and the settings shared by every job of one batch.

use std::path::PathBuf;
use std::sync::Arc;

use migrator_cloud::{Credentials, OpenStackProvider};
use migrator_core::config::AppConfig;
use migrator_core::result::AppResult;
use migrator_core::traits::cloud::CloudProvider;
use migrator_core::traits::replication::ReplicationBackend;
use migrator_core::types::ReplicationStrategy;
use migrator_storage::RbdBackend;

/// A validated migration submission.
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    /// Saved manifest file.
    pub manifest_path: PathBuf,
    /// Manifest file name as uploaded.
    pub manifest_name: String,
    /// Source cloud credentials.
    pub source: Credentials,
    /// Target cloud credentials.
    pub target: Credentials,
    /// Saved source cluster configuration, if uploaded.
    pub source_storage_conf: Option<PathBuf>,
    /// Saved target cluster configuration, if uploaded.
    pub target_storage_conf: Option<PathBuf>,
    /// Pool holding the source volumes.
    pub source_pool: String,
    /// Pool holding the target volumes.
    pub target_pool: String,
    /// VM-level and pair-level concurrency.
    pub concurrency: usize,
    /// Replication strategy for the whole batch.
    pub strategy: ReplicationStrategy,
}

/// Everything a batch needs to talk to both environments.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    /// Source cloud.
    pub source: Arc<dyn CloudProvider>,
    /// Target cloud.
    pub target: Arc<dyn CloudProvider>,
    /// Storage replication backend.
    pub backend: Arc<dyn ReplicationBackend>,
    /// Pool holding the source volumes.
    pub source_pool: String,
    /// Pool holding the target volumes.
    pub target_pool: String,
    /// Application configuration.
    pub config: Arc<AppConfig>,
}

impl MigrationContext {
    /// Name of a VM in the target cloud.
    pub fn target_name(&self, vm_name: &str) -> String {
        format!("{vm_name}{}", self.config.migration.target_name_suffix)
    }
}

/// Builds the context for a submission.
pub trait ContextFactory: Send + Sync + std::fmt::Debug {
    /// Build a context for `request`.
    fn build(&self, request: &MigrationRequest) -> AppResult<MigrationContext>;
}

/// Factory connecting to OpenStack and driving `rbd`.
#[derive(Debug, Clone)]
pub struct LiveContextFactory {
    config: Arc<AppConfig>,
}

impl LiveContextFactory {
    /// Create a factory using the given configuration.
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl ContextFactory for LiveContextFactory {
    fn build(&self, request: &MigrationRequest) -> AppResult<MigrationContext> {
        let source =
            OpenStackProvider::new("source", request.source.clone(), &self.config.cloud)?;
        let target =
            OpenStackProvider::new("target", request.target.clone(), &self.config.cloud)?;
        let backend = RbdBackend::new(
            &self.config.replication,
            request.source_storage_conf.clone(),
            request.target_storage_conf.clone(),
        );

        Ok(MigrationContext {
            source: Arc::new(source),
            target: Arc::new(target),
            backend: Arc::new(backend),
            source_pool: request.source_pool.clone(),
            target_pool: request.target_pool.clone(),
            config: Arc::clone(&self.config),
        })
    }
}
