use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{page_limit, required};
use crate::error::AppError;
use crate::models::appointment::{Appointment, AppointmentStatus};
use crate::models::notification::NotificationKind;
use crate::models::request::RequestStatus;
use crate::models::user::UserRole;
use crate::notify::{notify_quietly, NotificationDraft};
use crate::state::AppState;
use crate::store::{AssignmentRepository, StatusChange, StoreError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/appointments",
            post(create_appointment).get(list_appointments),
        )
        .route("/appointments/:id", get(get_appointment))
        .route("/appointments/:id/confirm", post(confirm))
        .route("/appointments/:id/start", post(start))
        .route("/appointments/:id/complete", post(complete))
}

#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    pub request_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub service_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub agreed_price: Option<f64>,
    pub client_notes: Option<String>,
    pub contractor_notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ListAppointmentsQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub final_notes: Option<String>,
}

async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let request_id = required(payload.request_id, "request_id")?;
    let contractor_id = required(payload.contractor_id, "contractor_id")?;
    let client_id = required(payload.client_id, "client_id")?;
    let service_date = required(payload.service_date, "service_date")?;
    let start_time = required(payload.start_time, "start_time")?;
    let agreed_price = required(payload.agreed_price, "agreed_price")?;

    if agreed_price <= 0.0 {
        return Err(AppError::Validation("agreed_price must be > 0".to_string()));
    }
    if payload.end_time.is_some_and(|end| end <= start_time) {
        return Err(AppError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }

    let request = state
        .store
        .request(request_id)?
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;
    if request.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "request {request_id} is already {}",
            request.status.as_str()
        )));
    }
    state
        .store
        .user(contractor_id)
        .filter(|user| user.role == UserRole::Contractor)
        .ok_or_else(|| AppError::NotFound(format!("contractor {contractor_id} not found")))?;
    state
        .store
        .user(client_id)
        .filter(|user| user.role == UserRole::Client)
        .ok_or_else(|| AppError::NotFound(format!("client {client_id} not found")))?;

    let appointment = state
        .store
        .insert_appointment(Appointment {
            id: Uuid::new_v4(),
            request_id,
            contractor_id,
            client_id,
            service_date,
            start_time,
            end_time: payload.end_time,
            agreed_price,
            status: AppointmentStatus::Scheduled,
            client_notes: payload.client_notes,
            contractor_notes: payload.contractor_notes,
            created_at: Utc::now(),
            confirmed_at: None,
            started_at: None,
            completed_at: None,
        })
        .map_err(|err| match err {
            StoreError::Duplicate(_) => AppError::Conflict(
                "contractor already has an appointment at that time".to_string(),
            ),
            other => AppError::Storage(other),
        })?;

    if let Err(err) = move_request(&state, request_id, RequestStatus::Confirmed) {
        state.store.update_appointment(appointment.id, |appointment| {
            appointment.status = AppointmentStatus::Cancelled;
            Ok::<(), AppError>(())
        })?;
        return Err(err);
    }

    info!(
        appointment_id = %appointment.id,
        request_id = %request_id,
        contractor_id = %contractor_id,
        "appointment scheduled"
    );

    for user_id in [client_id, contractor_id] {
        notify_quietly(
            state.notifier.as_ref(),
            NotificationDraft {
                user_id,
                kind: NotificationKind::AppointmentScheduled,
                title: "Appointment scheduled".to_string(),
                message: format!(
                    "\"{}\" is scheduled for {} at {}.",
                    request.title,
                    service_date,
                    start_time.format("%H:%M")
                ),
            },
        );
    }

    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Json<Vec<Appointment>> {
    let limit = page_limit(query.limit, 20, 100);
    Json(state.store.appointments(query.status, query.date, limit))
}

async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    state
        .store
        .appointment(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("appointment {id} not found")))
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = advance(&state, id, &[AppointmentStatus::Scheduled], |appointment| {
        appointment.status = AppointmentStatus::Confirmed;
        appointment.confirmed_at = Some(Utc::now());
    })?;
    Ok(Json(appointment))
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = advance_with_request(
        &state,
        id,
        &[AppointmentStatus::Scheduled, AppointmentStatus::Confirmed],
        |appointment| {
            appointment.status = AppointmentStatus::InProgress;
            appointment.started_at = Some(Utc::now());
        },
        RequestStatus::InProgress,
    )?;
    Ok(Json(appointment))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Appointment>, AppError> {
    let final_notes = payload.and_then(|Json(body)| body.final_notes);

    let appointment = advance_with_request(
        &state,
        id,
        &[AppointmentStatus::InProgress],
        |appointment| {
            appointment.status = AppointmentStatus::Completed;
            appointment.completed_at = Some(Utc::now());
            if final_notes.is_some() {
                appointment.contractor_notes = final_notes;
            }
        },
        RequestStatus::Completed,
    )?;
    info!(appointment_id = %id, "service completed");
    Ok(Json(appointment))
}

fn advance(
    state: &AppState,
    id: Uuid,
    allowed_from: &[AppointmentStatus],
    apply: impl FnOnce(&mut Appointment),
) -> Result<Appointment, AppError> {
    state
        .store
        .update_appointment(id, |appointment| {
            if !allowed_from.contains(&appointment.status) {
                return Err(AppError::Conflict(format!(
                    "appointment {id} cannot move on from {:?}",
                    appointment.status
                )));
            }
            apply(appointment);
            Ok(())
        })?
        .ok_or_else(|| AppError::NotFound(format!("appointment {id} not found")))
}

/// Applies an appointment transition together with the matching request
/// status. A request that went terminal in between undoes the appointment
/// change.
fn advance_with_request(
    state: &AppState,
    id: Uuid,
    allowed_from: &[AppointmentStatus],
    apply: impl FnOnce(&mut Appointment),
    request_to: RequestStatus,
) -> Result<Appointment, AppError> {
    let mut before = None;
    let appointment = advance(state, id, allowed_from, |appointment| {
        before = Some(appointment.clone());
        apply(appointment);
    })?;

    if let Err(err) = move_request(state, appointment.request_id, request_to) {
        if let Some(before) = before {
            state.store.update_appointment(id, |appointment| {
                *appointment = before;
                Ok::<(), AppError>(())
            })?;
        }
        return Err(err);
    }

    Ok(appointment)
}

fn move_request(state: &AppState, request_id: Uuid, to: RequestStatus) -> Result<(), AppError> {
    match state
        .store
        .update_request_status(request_id, &RequestStatus::OPEN, to)?
    {
        StatusChange::Applied(_) => Ok(()),
        StatusChange::NotFound => Err(AppError::NotFound(format!(
            "request {request_id} not found"
        ))),
        StatusChange::Refused(current) => Err(AppError::Conflict(format!(
            "request {request_id} is already {}",
            current.as_str()
        ))),
    }
}
