use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::required_text;
use crate::error::AppError;
use crate::models::user::{GeoPoint, User, UserRole};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/active", patch(set_user_active))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub location: Option<GeoPoint>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let name = required_text(payload.name, "name")?;
    let email = required_text(payload.email, "email")?;
    if !email.contains('@') {
        return Err(AppError::Validation(format!("email {email} is not valid")));
    }
    if let Some(location) = &payload.location {
        if !location.is_valid() {
            return Err(AppError::Validation("location is out of range".to_string()));
        }
    }

    let user = state.store.insert_user(User {
        id: Uuid::new_v4(),
        name,
        email,
        phone: payload.phone,
        role: payload.role,
        active: payload.active.unwrap_or(true),
        location: payload.location,
        created_at: Utc::now(),
    });

    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    state
        .store
        .user(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

async fn set_user_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<User>, AppError> {
    state
        .store
        .set_user_active(id, payload.active)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}
