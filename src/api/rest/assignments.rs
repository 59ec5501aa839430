use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::page_limit;
use crate::engine::lifecycle::{Responded, SweepReport};
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/sweep", post(sweep_expired))
        .route(
            "/assignments/contractor/:contractor_id",
            get(list_for_contractor),
        )
        .route("/assignments/:id/accept", post(accept))
        .route("/assignments/:id/decline", post(decline))
}

#[derive(Deserialize)]
pub struct ListAssignmentsQuery {
    pub status: Option<AssignmentStatus>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct ContractorAssignmentsQuery {
    pub status: Option<AssignmentStatus>,
}

#[derive(Deserialize)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAssignmentsQuery>,
) -> Json<Vec<Assignment>> {
    let limit = page_limit(query.limit, 20, 100);
    Json(state.store.assignments(query.status, limit))
}

async fn list_for_contractor(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<Uuid>,
    Query(query): Query<ContractorAssignmentsQuery>,
) -> Json<Vec<Assignment>> {
    Json(
        state
            .store
            .assignments_for_contractor(contractor_id, query.status),
    )
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Responded>, AppError> {
    let responded = state.assignments.respond_accept(id).await?;
    Ok(Json(responded))
}

async fn decline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<DeclineRequest>>,
) -> Result<Json<Responded>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let responded = state.assignments.respond_decline(id, reason).await?;
    Ok(Json(responded))
}

async fn sweep_expired(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>, AppError> {
    let report = state.assignments.sweep_expired(Utc::now()).await?;
    Ok(Json(report))
}
