use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The central durable record the engine operates on.
///
/// Status transitions form the DAG `pending -> {sent, failed, cancelled}`; `failed`
/// may only re-enter `pending` via an explicit DLQ retry (see `DlqRepository::retry`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message_type: String,
    pub provider: String,
    pub idempotency_key: String,
    pub status: String,
    pub payload: String,
    pub attempt_count: i64,
    pub max_retries: i64,
    pub send_at: Option<NaiveDateTime>,
    pub last_attempted: Option<NaiveDateTime>,
    pub sent_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    pub provider_response: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Notification {
    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending.as_str()
    }
}

/// Closed set of `status` values. Stored as plain text in SQLite; this enum is the
/// application-side view onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

/// Validated input accepted by the Submit API (C4).
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitNotificationInput {
    pub user_id: String,
    pub message_type: String,
    pub provider: String,
    pub payload: String,
    pub idempotency_key: Option<String>,
    /// Epoch milliseconds; if set and in the future, dispatch is deferred until then.
    pub send_at: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Filter accepted by `NotificationRepository::list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListNotificationsFilter {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
