use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::page_limit;
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/user/:user_id", get(list_for_user))
        .route("/notifications/:id/read", put(mark_read))
}

#[derive(Deserialize)]
pub struct ListNotificationsQuery {
    pub read: Option<bool>,
    pub limit: Option<usize>,
}

async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListNotificationsQuery>,
) -> Json<Vec<Notification>> {
    let limit = page_limit(query.limit, 20, 100);
    Json(state.store.notifications_for(user_id, query.read, limit))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    state
        .store
        .mark_notification_read(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))
}
