pub mod appointments;
pub mod assignments;
pub mod availability;
pub mod categories;
pub mod contractors;
pub mod evaluations;
pub mod notifications;
pub mod requests;
pub mod users;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(users::router())
        .merge(categories::router())
        .merge(contractors::router())
        .merge(requests::router())
        .merge(assignments::router())
        .merge(appointments::router())
        .merge(evaluations::router())
        .merge(notifications::router())
        .merge(availability::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    users: usize,
    active_clients: usize,
    active_contractors: usize,
    requests: usize,
    pending_requests: usize,
    assignments: usize,
    appointments: usize,
    completed_appointments: usize,
    evaluations: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let counts = state.store.counts();
    Json(HealthResponse {
        status: "ok",
        users: counts.users,
        active_clients: counts.active_clients,
        active_contractors: counts.active_contractors,
        requests: counts.requests,
        pending_requests: counts.pending_requests,
        assignments: counts.assignments,
        appointments: counts.appointments,
        completed_appointments: counts.completed_appointments,
        evaluations: counts.evaluations,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

pub(crate) fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("field {field} is required")))
}

pub(crate) fn required_text(value: Option<String>, field: &str) -> Result<String, AppError> {
    let value = required(value, field)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("field {field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn page_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}
