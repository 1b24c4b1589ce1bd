//! DLQ Manager (C8): terminal-failure storage and resurrection. SPEC_FULL §4.8.

use serde_json::json;
use sqlx::SqlitePool;

use crate::db::models::{DlqStats, ListDlqFilter, Notification, NotificationDlq};
use crate::db::repository::{DlqRepository, NotificationRepository};
use crate::error::{AppError, AppResult};

pub struct DlqManager;

impl DlqManager {
    /// Move a notification to the DLQ and mark it `failed`. The notification
    /// must already carry the just-recorded failure (`attempt_count`,
    /// `last_attempted`) so the snapshot reflects the final attempt.
    pub async fn move_to_dlq(
        pool: &SqlitePool,
        notification: &Notification,
        reason: &str,
        last_error: &str,
    ) -> AppResult<NotificationDlq> {
        let snapshot = json!({
            "total_attempts": notification.attempt_count,
            "last_error": last_error,
            "last_attempted": notification.last_attempted,
            "failure_reason": reason,
        });

        DlqRepository::move_to_dlq(pool, &notification.id, reason, &snapshot.to_string()).await
    }

    /// `RetryFromDLQ`: fails if already resolved; otherwise resets the
    /// notification to `pending` with `attempt_count = 0` and an immediate
    /// `send_at` so the next Scheduler tick re-promotes it.
    pub async fn retry_from_dlq(pool: &SqlitePool, dlq_id: &str) -> AppResult<Notification> {
        let entry = DlqRepository::find_by_id(pool, dlq_id).await?;
        if entry.resolved {
            return Err(AppError::Conflict(
                "DLQ entry is already resolved".to_string(),
            ));
        }

        let notification =
            NotificationRepository::reset_for_dlq_retry(pool, &entry.notification_id).await?;
        DlqRepository::delete_by_notification_id(pool, &entry.notification_id).await?;
        Ok(notification)
    }

    pub async fn resolve_entry(
        pool: &SqlitePool,
        dlq_id: &str,
        resolved_by: Option<&str>,
        note: Option<&str>,
    ) -> AppResult<NotificationDlq> {
        DlqRepository::resolve(pool, dlq_id, resolved_by, note).await
    }

    pub async fn list_entries(
        pool: &SqlitePool,
        filter: ListDlqFilter,
    ) -> AppResult<Vec<NotificationDlq>> {
        DlqRepository::list(pool, filter).await
    }

    pub async fn get_stats(pool: &SqlitePool) -> AppResult<DlqStats> {
        DlqRepository::stats(pool).await
    }

    /// Housekeeping: prune resolved entries older than `retention_days`.
    pub async fn cleanup_old_entries(pool: &SqlitePool, retention_days: i64) {
        match DlqRepository::cleanup_old(pool, retention_days).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "pruned resolved DLQ entries");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to prune resolved DLQ entries: {e}"),
        }
    }

    /// Observability-only: logs a warning when unresolved entries exist. Called
    /// from the DLQ monitor loop (tick interval configured by
    /// `RetryConfig::dlq_monitor_interval_seconds`).
    pub async fn monitor_tick(pool: &SqlitePool) {
        match DlqRepository::stats(pool).await {
            Ok(stats) if stats.unresolved > 0 => {
                tracing::warn!(
                    unresolved = stats.unresolved,
                    total = stats.total,
                    "DLQ has unresolved entries awaiting operator review"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("DLQ monitor failed to read stats: {e}"),
        }
    }
}
