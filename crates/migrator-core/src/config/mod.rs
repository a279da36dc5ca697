//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field has a default so the server can start without
//! any configuration file.

pub mod app;
pub mod cloud;
pub mod logging;
pub mod migration;
pub mod provisioning;
pub mod replication;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::cloud::CloudConfig;
pub use self::logging::LoggingConfig;
pub use self::migration::MigrationConfig;
pub use self::provisioning::ProvisioningConfig;
pub use self::replication::ReplicationConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Batch and job orchestration settings.
    #[serde(default)]
    pub migration: MigrationConfig,
    /// Defaults used when recreating a VM in the target cloud.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Storage replication settings.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Cloud API client settings.
    #[serde(default)]
    pub cloud: CloudConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `MIGRATOR_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MIGRATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
