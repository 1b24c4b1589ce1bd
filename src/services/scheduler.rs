//! Scheduler (C5): promotes due notifications from the DB into the Redis
//! queue. Read-only against the DB — it never flips `status` itself, so a
//! crash between promotion and worker pickup just means the next tick
//! re-selects the same row (SPEC_FULL §4.5).

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration};

use crate::db::repository::NotificationRepository;
use crate::kv::{KvStore, QUEUE_KEY};

const SELECT_DUE_BATCH_SIZE: i64 = 100;

/// Runs until `shutdown` fires. One tick = one `select_due` + one `lpush` per row.
pub async fn run(pool: SqlitePool, kv: KvStore, tick_seconds: u64, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(Duration::from_secs(tick_seconds.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&pool, &kv).await {
                    tracing::error!("scheduler tick failed: {e}");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("scheduler shutting down");
                break;
            }
        }
    }
}

async fn tick(pool: &SqlitePool, kv: &KvStore) -> Result<(), crate::error::AppError> {
    let now = Utc::now().naive_utc();
    let due = NotificationRepository::select_due(pool, now, SELECT_DUE_BATCH_SIZE).await?;

    if due.is_empty() {
        return Ok(());
    }

    let mut pushed = 0usize;
    for notification in &due {
        let envelope = json!({
            "id": notification.id,
            "action": "send",
        });
        if let Err(e) = kv.lpush(QUEUE_KEY, &envelope.to_string()).await {
            tracing::warn!(notification_id = %notification.id, "failed to enqueue due notification: {e}");
            continue;
        }
        pushed += 1;
    }

    tracing::info!(selected = due.len(), pushed, "scheduler tick promoted due notifications");
    Ok(())
}
