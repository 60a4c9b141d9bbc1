//! Bagvault server - main entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;

use bagvault_common::logging::{init_logging, LogConfig};
use bagvault_server::config::Config;
use bagvault_server::index::IndexNotifier;
use bagvault_server::ingest::{
    IngestSettings, IngestionOrchestrator, InboxScanner, VersionChainManager,
};
use bagvault_server::pid::PidClient;
use bagvault_server::store::{PgArchiveStore, PgJobStore};
use bagvault_server::vault::VaultClient;
use bagvault_server::workflow::{ReconciliationLoop, ResultTarget, WorkflowClient};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env().unwrap_or_else(|_| LogConfig {
        log_file_prefix: "bagvault-server".to_string(),
        ..LogConfig::default()
    });
    init_logging(&log_config)?;

    info!("Starting bagvault server");

    let config = Config::load()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("cannot connect to database")?;
    info!("Database connection pool established");

    sqlx::migrate!()
        .run(&db_pool)
        .await
        .context("database migrations failed")?;
    info!("Database migrations completed");

    let archive_store = Arc::new(PgArchiveStore::new(db_pool.clone()));
    let job_store = Arc::new(PgJobStore::new(db_pool));

    let vault = VaultClient::new(
        config.vault.base_url.clone(),
        config.vault.offline_media_types.clone(),
    )?;
    let pid = PidClient::new(config.pid.base_url.clone(), config.pid.prefix.clone())?;
    let notifier = IndexNotifier::new(
        config.indexer.url.clone(),
        config.indexer.context.clone(),
        config.indexer.product.clone(),
        Duration::from_secs(config.indexer.visibility_poll_cap_secs),
    )?;

    let chain = Arc::new(VersionChainManager::new(archive_store.clone()));
    let orchestrator = IngestionOrchestrator::new(
        vault,
        pid,
        notifier,
        archive_store,
        chain,
        IngestSettings {
            tape_enabled: config.vault.tape_enabled,
            tx_timeout: Duration::from_secs(config.vault.tx_timeout_secs),
            retry_max_attempts: config.ingest.retry_max_attempts,
            retry_delay: Duration::from_millis(config.ingest.retry_delay_ms),
            descriptor_schema_path: config.ingest.descriptor_schema_path.clone().into(),
        },
    );

    tokio::fs::create_dir_all(&config.ingest.inbox_dir)
        .await
        .with_context(|| format!("cannot create inbox directory {}", config.ingest.inbox_dir))?;
    let scanner_handle = InboxScanner::new(
        config.ingest.inbox_dir.clone(),
        Duration::from_secs(config.ingest.inbox_scan_interval_secs),
        orchestrator,
    )
    .spawn();

    let workflow_client = WorkflowClient::new(config.workflow.base_url.clone())?;
    let reconcile_handle = ReconciliationLoop::new(
        workflow_client,
        job_store,
        ResultTarget {
            url: config.workflow.result_url.clone(),
            username: config.workflow.result_username.clone(),
            password: config.workflow.result_password.clone(),
        },
        Duration::from_secs(config.workflow.reconcile_interval_secs),
        Duration::from_secs(config.workflow.reconcile_first_delay_secs),
    )
    .spawn();

    info!("Background tasks started, server running");

    shutdown_signal().await;

    scanner_handle.abort();
    reconcile_handle.abort();
    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
