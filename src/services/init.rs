//! Initialization helpers for the application:
//! - database connection + migrations
//! - background loop spawn helpers (Scheduler, Worker Pool, DLQ monitor, cleanup)
//!
//! This module centralizes bits that used to live in `main.rs`.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use tokio::time::{interval, Duration};

use crate::config::Config;
use crate::services::dlq::DlqManager;
use crate::services::providers::ProviderRegistry;
use crate::services::retry::RetryManager;
use crate::services::{scheduler, worker};

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    // Extract the file path from the database URL
    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
            tracing::info!(
                "Database directory created or already exists: {}",
                parent.display()
            );
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    // Log successful database file creation or connection
    if db_file_path.exists() {
        tracing::info!(
            "Successfully connected to database file: {}",
            db_file_path.display()
        );
    } else {
        tracing::info!(
            "Database file created successfully: {}",
            db_file_path.display()
        );
    }

    tracing::info!("Running database migrations");
    // Keep the same path as before (relative to crate root)
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Build the provider registry once at startup (C1). Unconfigured integrations
/// are simply absent from the map; see `ProviderRegistry::from_config`.
pub fn build_provider_registry(config: &Config) -> ProviderRegistry {
    ProviderRegistry::from_config(config)
}

/// Spawn the engine's background loops:
/// - Scheduler (C5): promotes due notifications into the Redis queue
/// - Worker Pool (C6): `worker_count` loops dispatching through providers
/// - DLQ monitor: periodic unresolved-entry visibility log
/// - Cleanup: prunes stale advisory retry entries and resolved DLQ rows
///
/// All loops share one `broadcast::Sender<()>` shutdown channel, the same
/// cooperative-cancellation pattern the rest of this module previously used
/// for its periodic sync workers.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    handles.push(tokio::spawn(scheduler::run(
        state.db.clone(),
        state.kv.clone(),
        state.config.retry.scheduler_tick_seconds,
        shutdown.subscribe(),
    )));

    handles.extend(worker::spawn_pool(
        state.db.clone(),
        state.kv.clone(),
        state.registry.clone(),
        state.config.retry.clone(),
        state.config.worker.worker_count,
        shutdown.clone(),
    ));

    // DLQ monitor
    {
        let pool = state.db.clone();
        let tick_seconds = state.config.retry.dlq_monitor_interval_seconds;
        let mut shutdown_rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(tick_seconds.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => DlqManager::monitor_tick(&pool).await,
                    _ = shutdown_rx.recv() => {
                        tracing::info!("DLQ monitor shutting down");
                        break;
                    }
                }
            }
        }));
    }

    // Cleanup loop: DLQ + advisory retry-set housekeeping
    {
        let pool = state.db.clone();
        let kv = state.kv.clone();
        let tick_seconds = state.config.retry.cleanup_interval_seconds;
        let retention_days = state.config.retry.cleanup_retention_days;
        let mut shutdown_rx = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(tick_seconds.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        DlqManager::cleanup_old_entries(&pool, retention_days).await;
                        RetryManager::cleanup_old_retries(&kv, retention_days).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("cleanup loop shutting down");
                        break;
                    }
                }
            }
        }));
    }

    handles
}
