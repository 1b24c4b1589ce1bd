//! Retry Manager (C7): backoff computation and the pending/DLQ escalation
//! decision. SPEC_FULL §4.7.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::json;
use sqlx::SqlitePool;

use crate::config::RetryConfig;
use crate::db::models::Notification;
use crate::db::repository::NotificationRepository;
use crate::error::AppResult;
use crate::kv::{KvStore, RETRIES_ZSET_KEY};
use crate::services::dlq::DlqManager;

/// `delay_s = min(BASE * EXPONENTIAL_BASE^attempt, MAX) + U(0, 0.1*delay)`
/// (P5, ignoring jitter: `median delay(attempt) = min(60*2^attempt, 3600)`).
pub fn compute_backoff_seconds(attempt: i64, config: &RetryConfig) -> f64 {
    let raw = config.base_seconds as f64 * config.exponential_base.powi(attempt as i32);
    let delay = raw.min(config.max_backoff_seconds as f64);
    let jitter = rand::thread_rng().gen_range(0.0..(0.1 * delay).max(f64::EPSILON));
    delay + jitter
}

pub struct RetryManager;

impl RetryManager {
    /// `notification` must already reflect the just-recorded failed attempt
    /// (i.e. the row returned by `NotificationRepository::mark_failed_attempt`).
    /// I3: `attempt_count >= max_retries` routes to the DLQ Manager instead of
    /// re-entering `pending`.
    pub async fn handle_failure(
        pool: &SqlitePool,
        kv: &KvStore,
        config: &RetryConfig,
        notification: &Notification,
        error_message: &str,
    ) -> AppResult<()> {
        if notification.attempt_count >= notification.max_retries {
            DlqManager::move_to_dlq(pool, notification, "max_retries_exceeded", error_message)
                .await?;
            tracing::warn!(
                notification_id = %notification.id,
                attempts = notification.attempt_count,
                "notification exhausted retry budget, moved to DLQ"
            );
            return Ok(());
        }

        let delay_seconds = compute_backoff_seconds(notification.attempt_count, config);
        let next_send_at = Utc::now().naive_utc()
            + ChronoDuration::milliseconds((delay_seconds * 1000.0) as i64);

        NotificationRepository::schedule_retry(pool, &notification.id, next_send_at, error_message)
            .await?;

        // Advisory observability write; failure is logged, never fatal (SPEC_FULL §4.7 step 4).
        let member = json!({
            "notification_id": notification.id,
            "attempt": notification.attempt_count,
            "retry_at": next_send_at.and_utc().timestamp(),
        });
        if let Err(e) = kv
            .zadd(
                RETRIES_ZSET_KEY,
                &member.to_string(),
                next_send_at.and_utc().timestamp() as f64,
            )
            .await
        {
            tracing::warn!("failed to record advisory retry entry: {e}");
        }

        Ok(())
    }

    /// Cleanup loop: prune advisory sorted-set entries older than the configured
    /// retention window. Best-effort; failures are logged and not propagated.
    pub async fn cleanup_old_retries(kv: &KvStore, retention_days: i64) {
        let cutoff = (Utc::now() - ChronoDuration::days(retention_days)).timestamp() as f64;
        match kv.zremrangebyscore(RETRIES_ZSET_KEY, cutoff).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "pruned stale advisory retry entries");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to prune advisory retry entries: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            base_seconds: 60,
            exponential_base: 2.0,
            max_backoff_seconds: 3600,
            default_max_retries: 5,
            scheduler_tick_seconds: 60,
            dlq_monitor_interval_seconds: 300,
            cleanup_interval_seconds: 86400,
            cleanup_retention_days: 7,
        }
    }

    /// P5: ignoring jitter, `delay(attempt) = min(60 * 2^attempt, 3600)`.
    #[test]
    fn backoff_follows_exponential_curve_before_the_cap() {
        let config = config();
        for (attempt, expected_floor) in [(0, 60.0), (1, 120.0), (2, 240.0), (3, 480.0)] {
            let delay = compute_backoff_seconds(attempt, &config);
            assert!(delay >= expected_floor, "attempt {attempt}: {delay} < {expected_floor}");
            assert!(delay <= expected_floor * 1.1 + 1.0, "attempt {attempt}: {delay} exceeds jitter bound");
        }
    }

    #[test]
    fn backoff_never_exceeds_the_configured_cap() {
        let config = config();
        for attempt in [6, 10, 20] {
            let delay = compute_backoff_seconds(attempt, &config);
            assert!(delay <= config.max_backoff_seconds as f64 * 1.1 + 1.0);
        }
    }

    #[test]
    fn backoff_is_always_non_negative_even_at_attempt_zero() {
        let config = config();
        assert!(compute_backoff_seconds(0, &config) >= 0.0);
    }
}
