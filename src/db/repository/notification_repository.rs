use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{ListNotificationsFilter, Notification};
use crate::error::{AppError, AppResult};

/// Repository for the `notifications` table — the sole durable record the engine
/// mutates (C2). `idempotency_key` carries a unique index enforcing I1; the cancel
/// path uses an atomic conditional `UPDATE ... WHERE status = 'pending'` in place of
/// a pessimistic row lock, since SQLite has no `SELECT ... FOR UPDATE` (see DESIGN.md).
pub struct NotificationRepository;

const COLUMNS: &str = r#"
    id, user_id, message_type, provider, idempotency_key, status, payload,
    attempt_count, max_retries, send_at, last_attempted, sent_at, failed_at,
    error_message, provider_response, created_at, updated_at
"#;

/// Parameters required to insert a new notification. Constructed by `services::submit`
/// after validation and fingerprinting.
pub struct NewNotification {
    pub user_id: String,
    pub message_type: String,
    pub provider: String,
    pub idempotency_key: String,
    pub payload: String,
    pub max_retries: i64,
    pub send_at: Option<NaiveDateTime>,
}

impl NotificationRepository {
    pub async fn create(pool: &SqlitePool, input: NewNotification) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (
                id, user_id, message_type, provider, idempotency_key, status, payload,
                attempt_count, max_retries, send_at, last_attempted, sent_at, failed_at,
                error_message, provider_response, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', ?, 0, ?, ?, NULL, NULL, NULL, NULL, NULL, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(&input.user_id)
        .bind(&input.message_type)
        .bind(&input.provider)
        .bind(&input.idempotency_key)
        .bind(&input.payload)
        .bind(input.max_retries)
        .bind(input.send_at)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                AppError::Duplicate("a notification with this idempotency_key already exists".into())
            }
            _ => AppError::Database(e),
        })?;

        Ok(row)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        sqlx::query_as::<_, Notification>(&format!(
            "SELECT {COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: ListNotificationsFilter,
    ) -> AppResult<Vec<Notification>> {
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);
        let offset = filter.offset.unwrap_or(0).max(0);

        let rows = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE (? IS NULL OR user_id = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(&filter.user_id)
        .bind(&filter.user_id)
        .bind(&filter.status)
        .bind(&filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// I4: pending notifications whose `send_at` is null or due. Read-only — the
    /// Scheduler pushes envelopes from this result but never mutates rows here
    /// (see SPEC_FULL §4.5 step 3).
    pub async fn select_due(
        pool: &SqlitePool,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let limit = limit.clamp(1, 100);
        let rows = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE status = 'pending' AND (send_at IS NULL OR send_at <= ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Worker step 5: increment `attempt_count`, stamp `last_attempted`. I3 is
    /// enforced by the caller checking `attempt_count <= max_retries` before calling.
    pub async fn mark_attempt_started(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET attempt_count = attempt_count + 1, last_attempted = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn mark_sent(
        pool: &SqlitePool,
        id: &str,
        provider_response: &str,
    ) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET status = 'sent', sent_at = ?, provider_response = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .bind(provider_response)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Worker step 7 (failure branch): record the failed attempt. The Retry Manager
    /// decides afterwards whether this re-enters `pending` (backoff) or becomes
    /// terminal via the DLQ Manager.
    pub async fn mark_failed_attempt(
        pool: &SqlitePool,
        id: &str,
        error_message: &str,
    ) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET status = 'failed', error_message = ?, failed_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Retry Manager: re-enter `pending` with a future `send_at` (I2's one legal
    /// `failed -> pending` edge, outside of explicit DLQ-retry, happens here because
    /// the worker always writes `failed` first in `mark_failed_attempt` above).
    pub async fn schedule_retry(
        pool: &SqlitePool,
        id: &str,
        send_at: NaiveDateTime,
        error_message: &str,
    ) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET status = 'pending', send_at = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(send_at)
        .bind(error_message)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// DLQ Manager's `RetryFromDLQ`: resets attempt bookkeeping and schedules an
    /// immediate re-promotion.
    pub async fn reset_for_dlq_retry(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET status = 'pending', attempt_count = 0, failed_at = NULL,
                error_message = NULL, send_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Cancel path (C4): the atomic conditional UPDATE substitutes a pessimistic
    /// row lock (SQLite has no `SELECT ... FOR UPDATE`). Zero rows affected means
    /// the record was not `pending`, surfaced as `invalid-state`.
    pub async fn cancel(pool: &SqlitePool, id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        let updated = sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET status = 'cancelled', failed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match updated {
            Some(n) => Ok(n),
            None => {
                // Distinguish not-found from already-non-pending for a clearer error.
                Self::find_by_id(pool, id).await?;
                Err(AppError::InvalidState(
                    "notification is not in pending state".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn new_notification(idempotency_key: &str) -> NewNotification {
        NewNotification {
            user_id: "user-1".to_string(),
            message_type: "email".to_string(),
            provider: "local".to_string(),
            idempotency_key: idempotency_key.to_string(),
            payload: "{\"to\":\"a@b.com\",\"body\":\"hi\"}".to_string(),
            max_retries: 5,
            send_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let pool = test_pool().await;
        let created = NotificationRepository::create(&pool, new_notification("key-1"))
            .await
            .unwrap();
        assert_eq!(created.status, "pending");
        assert_eq!(created.attempt_count, 0);

        let found = NotificationRepository::find_by_id(&pool, &created.id).await.unwrap();
        assert_eq!(found.id, created.id);
    }

    /// I1: the unique index on `idempotency_key` is the ultimate dedup authority.
    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let pool = test_pool().await;
        NotificationRepository::create(&pool, new_notification("dup-key"))
            .await
            .unwrap();

        let result = NotificationRepository::create(&pool, new_notification("dup-key")).await;
        assert!(matches!(result, Err(AppError::Duplicate(_))));
    }

    #[tokio::test]
    async fn select_due_only_returns_pending_rows_without_mutating_them() {
        let pool = test_pool().await;
        let created = NotificationRepository::create(&pool, new_notification("due-key"))
            .await
            .unwrap();

        let due = NotificationRepository::select_due(&pool, Utc::now().naive_utc(), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, created.id);
        assert_eq!(due[0].status, "pending");

        // Calling it again returns the same row; select_due never mutates.
        let due_again = NotificationRepository::select_due(&pool, Utc::now().naive_utc(), 10)
            .await
            .unwrap();
        assert_eq!(due_again.len(), 1);
    }

    #[tokio::test]
    async fn cancel_succeeds_only_while_pending() {
        let pool = test_pool().await;
        let created = NotificationRepository::create(&pool, new_notification("cancel-key"))
            .await
            .unwrap();

        let cancelled = NotificationRepository::cancel(&pool, &created.id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");

        let second = NotificationRepository::cancel(&pool, &created.id).await;
        assert!(matches!(second, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn mark_sent_transitions_out_of_pending() {
        let pool = test_pool().await;
        let created = NotificationRepository::create(&pool, new_notification("sent-key"))
            .await
            .unwrap();

        NotificationRepository::mark_attempt_started(&pool, &created.id).await.unwrap();
        let sent = NotificationRepository::mark_sent(&pool, &created.id, "ok")
            .await
            .unwrap();
        assert_eq!(sent.status, "sent");
        assert!(sent.sent_at.is_some());
        assert!(!sent.is_pending());
    }
}
