use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::db::models::{ListNotificationsFilter, Notification, SubmitNotificationInput};
use crate::db::repository::NotificationRepository;
use crate::error::AppResult;
use crate::services::submit::SubmitService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_notification).get(list_notifications))
        .route("/bulk", post(submit_bulk))
        .route(
            "/:id",
            get(get_notification).delete(cancel_notification),
        )
}

/// Submit API (C4): `POST /api/v1/notifications`.
async fn submit_notification(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SubmitNotificationInput>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    let svc = SubmitService::new(&state.db, &state.kv, &state.config.retry);
    let notification = svc.submit(input).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// `POST /api/v1/notifications/bulk`: sequential, abort-on-first-error.
async fn submit_bulk(
    State(state): State<Arc<AppState>>,
    Json(inputs): Json<Vec<SubmitNotificationInput>>,
) -> AppResult<(StatusCode, Json<Vec<Notification>>)> {
    let svc = SubmitService::new(&state.db, &state.kv, &state.config.retry);
    let created = svc.submit_bulk(inputs).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ListNotificationsFilter>,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = NotificationRepository::list(&state.db, filter).await?;
    Ok(Json(notifications))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = NotificationRepository::find_by_id(&state.db, &id).await?;
    Ok(Json(notification))
}

/// Cancel API (C4): `DELETE /api/v1/notifications/:id`, only legal while
/// `status = pending` (I2).
async fn cancel_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let svc = SubmitService::new(&state.db, &state.kv, &state.config.retry);
    svc.cancel(&id).await?;
    Ok(Json(json!({ "status": "cancelled" })))
}
