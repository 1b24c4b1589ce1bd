use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{DlqStats, ListDlqFilter, NotificationDlq};
use crate::error::{AppError, AppResult};

const COLUMNS: &str = r#"
    id, notification_id, failure_reason, retry_history, moved_to_dlq_at,
    resolved, resolved_at, resolved_by, resolution_note
"#;

/// Repository for `notification_dlq` (C8). `notification_id` carries a unique
/// index enforcing I5/P4 — at most one DLQ row per notification.
pub struct DlqRepository;

impl DlqRepository {
    /// Insert a DLQ row for `notification_id`. Fails with `Conflict` if one
    /// already exists (the DB unique index is the authority, mirroring how
    /// `NotificationRepository::create` enforces I1 for idempotency keys).
    pub async fn move_to_dlq(
        pool: &SqlitePool,
        notification_id: &str,
        failure_reason: &str,
        retry_history: &str,
    ) -> AppResult<NotificationDlq> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, NotificationDlq>(&format!(
            r#"
            INSERT INTO notification_dlq (
                id, notification_id, failure_reason, retry_history, moved_to_dlq_at,
                resolved, resolved_at, resolved_by, resolution_note
            ) VALUES (?, ?, ?, ?, ?, 0, NULL, NULL, NULL)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(notification_id)
        .bind(failure_reason)
        .bind(retry_history)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                AppError::Conflict(format!(
                    "a DLQ entry already exists for notification {notification_id}"
                ))
            }
            _ => AppError::Database(e),
        })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<NotificationDlq> {
        sqlx::query_as::<_, NotificationDlq>(&format!(
            "SELECT {COLUMNS} FROM notification_dlq WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("DLQ entry {id} not found")))
    }

    pub async fn list(pool: &SqlitePool, filter: ListDlqFilter) -> AppResult<Vec<NotificationDlq>> {
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);
        let offset = filter.offset.unwrap_or(0).max(0);
        let resolved = filter.resolved.map(|b| b as i64);

        sqlx::query_as::<_, NotificationDlq>(&format!(
            r#"
            SELECT {COLUMNS} FROM notification_dlq
            WHERE (? IS NULL OR resolved = ?)
            ORDER BY moved_to_dlq_at DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(resolved)
        .bind(resolved)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn resolve(
        pool: &SqlitePool,
        id: &str,
        resolved_by: Option<&str>,
        note: Option<&str>,
    ) -> AppResult<NotificationDlq> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, NotificationDlq>(&format!(
            r#"
            UPDATE notification_dlq
            SET resolved = 1, resolved_at = ?, resolved_by = ?, resolution_note = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .bind(resolved_by)
        .bind(note)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("DLQ entry {id} not found")))
    }

    pub async fn stats(pool: &SqlitePool) -> AppResult<DlqStats> {
        let (total, unresolved, resolved): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE resolved = 0),
                COUNT(*) FILTER (WHERE resolved = 1)
            FROM notification_dlq
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(DlqStats {
            total,
            unresolved,
            resolved,
        })
    }

    /// Removes the DLQ row for a notification being resurrected via
    /// `RetryFromDLQ`, freeing the unique `notification_id` slot so a later
    /// re-exhaustion can file a fresh entry.
    pub async fn delete_by_notification_id(pool: &SqlitePool, notification_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM notification_dlq WHERE notification_id = ?")
            .bind(notification_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    /// Prune resolved entries older than `days`. Purely housekeeping; failures are
    /// logged by the caller rather than propagated (mirrors the Cleanup loop's
    /// best-effort posture for the advisory retry sorted set, SPEC_FULL §4.7).
    pub async fn cleanup_old(pool: &SqlitePool, days: i64) -> AppResult<u64> {
        let cutoff = Utc::now().naive_utc() - chrono::Duration::days(days);
        let result = sqlx::query(
            "DELETE FROM notification_dlq WHERE resolved = 1 AND resolved_at < ?",
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::notification_repository::{NewNotification, NotificationRepository};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed_notification(pool: &SqlitePool, idempotency_key: &str) -> String {
        let created = NotificationRepository::create(
            pool,
            NewNotification {
                user_id: "user-1".to_string(),
                message_type: "email".to_string(),
                provider: "local".to_string(),
                idempotency_key: idempotency_key.to_string(),
                payload: "{}".to_string(),
                max_retries: 1,
                send_at: None,
            },
        )
        .await
        .unwrap();
        created.id
    }

    /// I5/P4: at most one DLQ row per notification.
    #[tokio::test]
    async fn move_to_dlq_is_rejected_for_an_already_dlq_d_notification() {
        let pool = test_pool().await;
        let notification_id = seed_notification(&pool, "dlq-key").await;

        DlqRepository::move_to_dlq(&pool, &notification_id, "max_retries_exceeded", "{}")
            .await
            .unwrap();

        let second = DlqRepository::move_to_dlq(&pool, &notification_id, "max_retries_exceeded", "{}").await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn resolve_marks_entry_resolved_and_stats_reflect_it() {
        let pool = test_pool().await;
        let notification_id = seed_notification(&pool, "resolve-key").await;
        let entry = DlqRepository::move_to_dlq(&pool, &notification_id, "max_retries_exceeded", "{}")
            .await
            .unwrap();

        let stats_before = DlqRepository::stats(&pool).await.unwrap();
        assert_eq!(stats_before.unresolved, 1);
        assert_eq!(stats_before.resolved, 0);

        let resolved = DlqRepository::resolve(&pool, &entry.id, Some("operator-1"), Some("false positive"))
            .await
            .unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("operator-1"));
        assert_eq!(resolved.resolution_note.as_deref(), Some("false positive"));

        let stats_after = DlqRepository::stats(&pool).await.unwrap();
        assert_eq!(stats_after.unresolved, 0);
        assert_eq!(stats_after.resolved, 1);
    }

    #[tokio::test]
    async fn list_filters_by_resolved_status() {
        let pool = test_pool().await;
        let a = seed_notification(&pool, "list-a").await;
        let b = seed_notification(&pool, "list-b").await;
        DlqRepository::move_to_dlq(&pool, &a, "max_retries_exceeded", "{}").await.unwrap();
        let entry_b = DlqRepository::move_to_dlq(&pool, &b, "max_retries_exceeded", "{}").await.unwrap();
        DlqRepository::resolve(&pool, &entry_b.id, None, None).await.unwrap();

        let unresolved = DlqRepository::list(
            &pool,
            ListDlqFilter { resolved: Some(false), limit: None, offset: None },
        )
        .await
        .unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].notification_id, a);
    }

    /// A resurrected notification that exhausts retries a second time must be
    /// able to get a fresh DLQ row; `delete_by_notification_id` is what
    /// `DlqManager::retry_from_dlq` calls to free the unique slot.
    #[tokio::test]
    async fn deleting_the_entry_lets_a_resurrected_notification_be_re_filed() {
        let pool = test_pool().await;
        let notification_id = seed_notification(&pool, "resurrect-key").await;
        DlqRepository::move_to_dlq(&pool, &notification_id, "max_retries_exceeded", "{}")
            .await
            .unwrap();

        DlqRepository::delete_by_notification_id(&pool, &notification_id)
            .await
            .unwrap();

        let refiled = DlqRepository::move_to_dlq(&pool, &notification_id, "max_retries_exceeded", "{}").await;
        assert!(refiled.is_ok());
    }
}
