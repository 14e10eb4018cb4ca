//! # Encore Render Worker
//!
//! Long-running process that renders invoice and receipt PDFs.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Render Worker                                    │
//! │                                                                         │
//! │  every sweep_interval ──► pending documents ──► RenderWorker           │
//! │                                                     │                   │
//! │                                                     ▼                   │
//! │                    SQLite ◄── document_url ◄── HttpPdfRenderer         │
//! │                                                                         │
//! │  SIGINT / SIGTERM ──► RenderHandle::shutdown ──► pool closed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! `finance.toml` in the platform config directory, or the path given in
//! `ENCORE_FINANCE_CONFIG`. `ENCORE_*` variables override individual keys.

mod renderer;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use encore_db::{Database, DbConfig};
use encore_finance::{FinanceConfig, RenderService, RenderWorker, ServiceContext};

use crate::renderer::HttpPdfRenderer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Encore render worker...");

    let config_path = std::env::var_os("ENCORE_FINANCE_CONFIG").map(PathBuf::from);
    let config = Arc::new(FinanceConfig::load(config_path)?);
    info!(
        database = %config.database.path.display(),
        endpoint = %config.render.endpoint,
        sweep_secs = config.render.sweep_interval_secs,
        "Configuration loaded"
    );

    let db = Database::new(
        DbConfig::new(&config.database.path)
            .max_connections(config.database.max_connections)
            .busy_timeout(config.operation_timeout()),
    )
    .await?;
    info!("Database ready");

    let renderer = HttpPdfRenderer::new(config.render.endpoint.clone(), config.operation_timeout())?;
    let service = RenderService::new(ServiceContext::new(db.clone(), config.clone()), Arc::new(renderer));
    let (worker, handle) = RenderWorker::new(service, config.render.clone());
    let worker_task = tokio::spawn(worker.run());

    shutdown_signal().await;
    info!("Shutdown signal received, stopping render worker");

    if let Err(e) = handle.shutdown().await {
        error!("Failed to signal render worker: {}", e);
    }
    if let Err(e) = worker_task.await {
        error!("Render worker task failed: {}", e);
    }

    db.close().await;
    info!("Render worker stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
