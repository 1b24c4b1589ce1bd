//! Worker Pool (C6): N parallel loops pulling envelopes off the Redis queue
//! and driving a single notification through provider dispatch. SPEC_FULL §4.6/§5.

use std::sync::Arc;

use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{timeout, Duration};

use crate::config::RetryConfig;
use crate::db::models::Notification;
use crate::db::repository::NotificationRepository;
use crate::kv::{KvStore, QUEUE_KEY};
use crate::services::providers::{ProviderRegistry, PROVIDER_SEND_TIMEOUT};
use crate::services::retry::RetryManager;

const BRPOP_TIMEOUT_SECONDS: f64 = 1.0;
const TASK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct QueueEnvelope {
    id: String,
    action: String,
}

/// Spawns `worker_count` loops sharing one `Semaphore` sized to `worker_count`
/// and one broadcast shutdown channel. Each loop hands a claimed envelope off
/// to its own bounded task and immediately brpops again, so the semaphore (not
/// loop count) is what actually caps in-flight dispatches, mirroring the
/// claim-and-dispatch push-notification worker pool pattern this loop is
/// grounded on.
pub fn spawn_pool(
    pool: SqlitePool,
    kv: KvStore,
    registry: Arc<ProviderRegistry>,
    retry_config: RetryConfig,
    worker_count: u32,
    shutdown: broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1) as usize));
    let mut handles = Vec::with_capacity(worker_count as usize);

    for id in 0..worker_count.max(1) {
        let pool = pool.clone();
        let kv = kv.clone();
        let registry = registry.clone();
        let retry_config = retry_config.clone();
        let semaphore = semaphore.clone();
        let mut shutdown_rx = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            tracing::info!(worker = id, "worker loop started");
            loop {
                tokio::select! {
                    popped = kv.brpop(QUEUE_KEY, BRPOP_TIMEOUT_SECONDS) => {
                        match popped {
                            Ok(Some(raw)) => {
                                let permit = semaphore.clone().acquire_owned().await.ok();
                                let pool = pool.clone();
                                let kv = kv.clone();
                                let registry = registry.clone();
                                let retry_config = retry_config.clone();
                                tokio::spawn(async move {
                                    handle_envelope(&pool, &kv, &registry, &retry_config, &raw).await;
                                    drop(permit);
                                });
                            }
                            Ok(None) => {} // timeout, loop again
                            Err(e) => {
                                tracing::warn!(worker = id, "brpop failed: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!(worker = id, "worker loop shutting down");
                        break;
                    }
                }
            }
        }));
    }

    handles
}

async fn handle_envelope(
    pool: &SqlitePool,
    kv: &KvStore,
    registry: &ProviderRegistry,
    retry_config: &RetryConfig,
    raw: &str,
) {
    let envelope: QueueEnvelope = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("dropping unparseable queue envelope: {e}");
            return;
        }
    };

    if envelope.action != "send" {
        tracing::warn!(action = %envelope.action, "dropping queue envelope with unknown action");
        return;
    }

    match timeout(TASK_TIMEOUT, process(pool, kv, registry, retry_config, &envelope.id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(notification_id = %envelope.id, "dispatch failed: {e}"),
        Err(_) => tracing::error!(notification_id = %envelope.id, "dispatch task timed out"),
    }
}

async fn process(
    pool: &SqlitePool,
    kv: &KvStore,
    registry: &ProviderRegistry,
    retry_config: &RetryConfig,
    id: &str,
) -> Result<(), crate::error::AppError> {
    let notification = match NotificationRepository::find_by_id(pool, id).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(notification_id = %id, "queued notification vanished: {e}");
            return Ok(());
        }
    };

    if !notification.is_pending() {
        tracing::debug!(notification_id = %id, status = %notification.status, "skipping non-pending notification");
        return Ok(());
    }

    let notification = NotificationRepository::mark_attempt_started(pool, id).await?;

    let outcome = dispatch(registry, &notification).await;

    match outcome {
        Ok(response) => {
            NotificationRepository::mark_sent(pool, id, &response).await?;
        }
        Err(error_message) => {
            let failed = NotificationRepository::mark_failed_attempt(pool, id, &error_message).await?;
            RetryManager::handle_failure(pool, kv, retry_config, &failed, &error_message).await?;
        }
    }

    Ok(())
}

async fn dispatch(registry: &ProviderRegistry, notification: &Notification) -> Result<String, String> {
    let provider = match registry.get(&notification.provider) {
        Some(p) => p,
        None => return Err(format!("provider not configured: {}", notification.provider)),
    };

    match timeout(PROVIDER_SEND_TIMEOUT, provider.send(notification)).await {
        Ok(Ok(outcome)) => Ok(outcome.provider_response),
        Ok(Err(e)) => Err(e.message().to_string()),
        Err(_) => Err(format!("provider {} timed out after {:?}", provider.name(), PROVIDER_SEND_TIMEOUT)),
    }
}
