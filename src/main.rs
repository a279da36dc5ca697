//! VM Migrator server
//!
//! Main entry point that wires all crates together and starts the server.

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use migrator_api::{AppState, build_router};
use migrator_core::config::AppConfig;
use migrator_core::error::AppError;
use migrator_worker::LiveContextFactory;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    let code = match run(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            1
        }
    };
    // Flush the log file before exiting.
    drop(guard);
    std::process::exit(code);
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("MIGRATOR_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing: console output plus the append-only log file.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(config: &AppConfig) -> Result<WorkerGuard, AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_path = Path::new(&config.logging.file);
    let file_name = log_path.file_name().ok_or_else(|| {
        AppError::configuration(format!("Invalid log file '{}'", config.logging.file))
    })?;
    let directory = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    let console = match config.logging.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        _ => fmt::layer().pretty().with_target(true).boxed(),
    };
    // `/logs` filters this file on the `migration` target, so it stays
    // single-line text with targets.
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| AppError::internal(format!("Failed to install subscriber: {e}")))?;

    Ok(guard)
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting VM migrator v{}", env!("CARGO_PKG_VERSION"));

    tokio::fs::create_dir_all(&config.migration.upload_dir)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "Failed to create upload dir '{}': {}",
                config.migration.upload_dir, e
            ))
        })?;

    let config = Arc::new(config);
    let contexts = Arc::new(LiveContextFactory::new(Arc::clone(&config)));
    let app = build_router(AppState::new(Arc::clone(&config), contexts));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!("VM migrator listening on {}", addr);

    let stopping = Arc::new(Notify::new());
    let signal = {
        let stopping = Arc::clone(&stopping);
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();

    // Blocking submissions hold their connection for the whole batch;
    // stop waiting for them after the grace period.
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    tokio::select! {
        result = server => {
            result.map_err(|e| AppError::internal(format!("Server error: {}", e)))?;
        }
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(
                "Shutdown grace period of {}s elapsed with requests still running",
                grace.as_secs()
            );
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let waiting = tokio::spawn(shutdown_signal());
        // Let the handlers install before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .expect("run kill");
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("shutdown after SIGTERM")
            .expect("signal task");
    }
}
