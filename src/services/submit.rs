//! Submit API (C4): validate, fingerprint, dedup, persist. SPEC_FULL §4.4.

use chrono::DateTime;
use sqlx::SqlitePool;
use tokio::time::{timeout, Duration};

use crate::config::RetryConfig;
use crate::db::models::{Notification, SubmitNotificationInput};
use crate::db::repository::{NewNotification, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::kv::KvStore;
use crate::services::idempotency::{fingerprint, DedupResult, IdempotencyFilter};

const IDEMPOTENCY_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SubmitService<'a> {
    pool: &'a SqlitePool,
    kv: &'a KvStore,
    retry_config: &'a RetryConfig,
}

impl<'a> SubmitService<'a> {
    pub fn new(pool: &'a SqlitePool, kv: &'a KvStore, retry_config: &'a RetryConfig) -> Self {
        Self {
            pool,
            kv,
            retry_config,
        }
    }

    pub async fn submit(&self, input: SubmitNotificationInput) -> AppResult<Notification> {
        validate(&input)?;

        let key = match &input.idempotency_key {
            Some(k) => k.clone(),
            None => fingerprint(&input.user_id, &input.message_type, &input.payload),
        };

        let filter = IdempotencyFilter::new(self.kv);
        let dedup = timeout(IDEMPOTENCY_CHECK_TIMEOUT, filter.check_and_set(&key))
            .await
            .unwrap_or(DedupResult::FirstSeen); // timeout also fails open, per SPEC_FULL §4.3

        if dedup == DedupResult::Duplicate {
            return Err(AppError::Duplicate(format!(
                "a notification with idempotency_key {key} was already submitted"
            )));
        }

        let send_at = input
            .send_at
            .map(|ms| {
                DateTime::from_timestamp_millis(ms)
                    .map(|dt| dt.naive_utc())
                    .ok_or_else(|| AppError::Validation("send_at is not a valid epoch-millis timestamp".into()))
            })
            .transpose()?;

        let notification = NotificationRepository::create(
            self.pool,
            NewNotification {
                user_id: input.user_id,
                message_type: input.message_type,
                provider: input.provider,
                idempotency_key: key,
                payload: input.payload,
                max_retries: input.max_retries.unwrap_or(self.retry_config.default_max_retries),
                send_at,
            },
        )
        .await?;

        Ok(notification)
    }

    /// Bulk variant: sequential, non-transactional across items. The first
    /// error aborts the batch; already-inserted items are not rolled back
    /// (SPEC_FULL §4.4, §9 open question on bulk partial-success semantics).
    pub async fn submit_bulk(
        &self,
        inputs: Vec<SubmitNotificationInput>,
    ) -> AppResult<Vec<Notification>> {
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            created.push(self.submit(input).await?);
        }
        Ok(created)
    }

    pub async fn cancel(&self, id: &str) -> AppResult<Notification> {
        NotificationRepository::cancel(self.pool, id).await
    }
}

fn validate(input: &SubmitNotificationInput) -> AppResult<()> {
    if input.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".into()));
    }
    if input.payload.trim().is_empty() {
        return Err(AppError::Validation("payload must not be empty".into()));
    }
    if input.message_type.trim().is_empty() {
        return Err(AppError::Validation("message_type must not be empty".into()));
    }
    if !["sms", "email", "push"].contains(&input.message_type.as_str()) {
        return Err(AppError::Validation(format!(
            "message_type must be one of sms, email, push (got {})",
            input.message_type
        )));
    }
    if input.provider.trim().is_empty() {
        return Err(AppError::Validation("provider must not be empty".into()));
    }
    if let Some(max_retries) = input.max_retries {
        if max_retries <= 0 {
            return Err(AppError::Validation("max_retries must be positive".into()));
        }
    }
    Ok(())
}
