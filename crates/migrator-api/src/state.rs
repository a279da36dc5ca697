//! Application state shared across all handlers.

use std::sync::Arc;

use migrator_core::config::AppConfig;
use migrator_worker::{ContextFactory, TaskRegistry};

/// Application state passed to every handler via `State<AppState>`.
///
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Registry of submitted migration jobs
    pub registry: Arc<TaskRegistry>,
    /// Builds cloud and storage connections for a submission
    pub contexts: Arc<dyn ContextFactory>,
}

impl AppState {
    /// Create the state with an empty registry.
    pub fn new(config: Arc<AppConfig>, contexts: Arc<dyn ContextFactory>) -> Self {
        Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            contexts,
        }
    }
}
