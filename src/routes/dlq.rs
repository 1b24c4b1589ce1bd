use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::db::models::{DlqStats, ListDlqFilter, Notification, NotificationDlq, ResolveDlqInput};
use crate::error::AppResult;
use crate::services::dlq::DlqManager;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_dlq_entries))
        .route("/stats", get(get_dlq_stats))
        .route("/:id/retry", post(retry_from_dlq))
        .route("/:id/resolve", post(resolve_dlq_entry))
}

async fn list_dlq_entries(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ListDlqFilter>,
) -> AppResult<Json<Vec<NotificationDlq>>> {
    let entries = DlqManager::list_entries(&state.db, filter).await?;
    Ok(Json(entries))
}

async fn get_dlq_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<DlqStats>> {
    let stats = DlqManager::get_stats(&state.db).await?;
    Ok(Json(stats))
}

/// Resurrection: resets the notification to `pending` with `attempt_count = 0`
/// so the next Scheduler tick re-promotes it (SPEC_FULL §4.8.1).
async fn retry_from_dlq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = DlqManager::retry_from_dlq(&state.db, &id).await?;
    Ok(Json(notification))
}

async fn resolve_dlq_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ResolveDlqInput>,
) -> AppResult<Json<NotificationDlq>> {
    let entry = DlqManager::resolve_entry(
        &state.db,
        &id,
        body.resolved_by.as_deref(),
        body.note.as_deref(),
    )
    .await?;
    Ok(Json(entry))
}
