use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per notification that exhausted its retry budget. `notification_id`
/// carries a unique index (I5 / P4: at most one DLQ row per notification).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDlq {
    pub id: String,
    pub notification_id: String,
    pub failure_reason: String,
    /// Opaque JSON snapshot: `{total_attempts, last_error, last_attempted, failure_reason}`.
    pub retry_history: String,
    pub moved_to_dlq_at: NaiveDateTime,
    pub resolved: bool,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqStats {
    pub total: i64,
    pub unresolved: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDlqFilter {
    pub resolved: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDlqInput {
    pub resolved_by: Option<String>,
    pub note: Option<String>,
}
