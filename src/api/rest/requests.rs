use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{page_limit, required, required_text};
use crate::engine::lifecycle::EffectOutcome;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::request::{RequestStatus, ServiceRequest, Urgency};
use crate::models::user::{GeoPoint, UserRole};
use crate::state::AppState;
use crate::store::{AssignmentRepository, ContractorDirectory};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/status", put(update_status))
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub client_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub service_address: Option<String>,
    pub location: Option<GeoPoint>,
    pub urgency: Option<Urgency>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<NaiveTime>,
    pub flexible_schedule: Option<bool>,
    pub max_budget: Option<f64>,
}

#[derive(Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<RequestStatus>,
}

#[derive(Serialize)]
pub struct CreatedRequest {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub dispatch: EffectOutcome,
}

#[derive(Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub assignments: Vec<Assignment>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<CreatedRequest>), AppError> {
    let client_id = required(payload.client_id, "client_id")?;
    let category_id = required(payload.category_id, "category_id")?;
    let title = required_text(payload.title, "title")?;
    let description = required_text(payload.description, "description")?;
    let service_address = required_text(payload.service_address, "service_address")?;

    let client = state
        .store
        .user(client_id)
        .filter(|user| user.role == UserRole::Client)
        .ok_or_else(|| AppError::Validation(format!("client {client_id} is not valid")))?;

    let category = state
        .store
        .category(category_id)?
        .ok_or_else(|| AppError::NotFound(format!("category {category_id} not found")))?;
    if !category.active {
        return Err(AppError::Validation(format!(
            "category {category_id} is not active"
        )));
    }

    if let Some(location) = &payload.location {
        if !location.is_valid() {
            return Err(AppError::Validation("location is out of range".to_string()));
        }
    }
    if payload.max_budget.is_some_and(|budget| budget <= 0.0) {
        return Err(AppError::Validation("max_budget must be > 0".to_string()));
    }

    let now = Utc::now();
    let request = state.store.insert_request(ServiceRequest {
        id: Uuid::new_v4(),
        client_id: client.id,
        category_id: category.id,
        title,
        description,
        service_address,
        location: payload.location,
        urgency: payload.urgency.unwrap_or_default(),
        preferred_date: payload.preferred_date,
        preferred_time: payload.preferred_time,
        flexible_schedule: payload.flexible_schedule.unwrap_or(true),
        max_budget: payload.max_budget,
        status: RequestStatus::Pending,
        created_at: now,
        updated_at: now,
    });

    info!(request_id = %request.id, category_id = %category.id, "service request created");

    let dispatch = state.assignments.dispatch_initial(&request).await;

    Ok((StatusCode::CREATED, Json(CreatedRequest { request, dispatch })))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRequestsQuery>,
) -> Json<Vec<ServiceRequest>> {
    let limit = page_limit(query.limit, 20, 100);
    Json(state.store.requests(query.status, limit))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestDetail>, AppError> {
    let request = state
        .store
        .request(id)?
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
    let assignments = state.store.assignments_for_request(id)?;

    Ok(Json(RequestDetail {
        request,
        assignments,
    }))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ServiceRequest>, AppError> {
    let status = required(payload.status, "status")?;

    let updated = state.store.update_request(id, |request| {
        if request.status.is_terminal() && request.status != status {
            return Err(AppError::Conflict(format!(
                "request {id} is already {}",
                request.status.as_str()
            )));
        }
        request.status = status;
        Ok(())
    })?;

    let updated = updated.ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
    info!(request_id = %id, status = updated.status.as_str(), "request status updated");
    Ok(Json(updated))
}
