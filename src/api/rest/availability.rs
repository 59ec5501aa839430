use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{page_limit, required};
use crate::error::AppError;
use crate::models::availability::{AvailabilitySlot, BookedWindow};
use crate::models::user::UserRole;
use crate::state::AppState;

const DEFAULT_WINDOW_DAYS: u64 = 7;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/availability", post(create_slot))
        .route("/availability/:id", put(update_slot))
        .route(
            "/availability/contractor/:contractor_id",
            get(list_for_contractor),
        )
        .route(
            "/availability/contractor/:contractor_id/open",
            get(open_windows),
        )
}

#[derive(Deserialize)]
pub struct CreateSlotRequest {
    pub contractor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub available: Option<bool>,
    pub unavailable_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateSlotRequest {
    pub available: Option<bool>,
    pub unavailable_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub from: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct WindowQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct ContractorSlots {
    pub slots: Vec<AvailabilitySlot>,
    pub by_date: BTreeMap<NaiveDate, Vec<AvailabilitySlot>>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Serialize)]
pub struct OpenWindows {
    pub open: Vec<AvailabilitySlot>,
    pub booked: Vec<BookedWindow>,
    pub period: Period,
}

async fn create_slot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<AvailabilitySlot>), AppError> {
    let contractor_id = required(payload.contractor_id, "contractor_id")?;
    let date = required(payload.date, "date")?;
    let start_time = required(payload.start_time, "start_time")?;
    let end_time = required(payload.end_time, "end_time")?;

    if end_time <= start_time {
        return Err(AppError::Validation(
            "end_time must be after start_time".to_string(),
        ));
    }
    ensure_contractor(&state, contractor_id)?;

    let now = Utc::now();
    let slot = state.store.insert_slot(AvailabilitySlot {
        id: Uuid::new_v4(),
        contractor_id,
        date,
        start_time,
        end_time,
        available: payload.available.unwrap_or(true),
        unavailable_reason: clean_reason(payload.unavailable_reason),
        created_at: now,
        updated_at: now,
    });

    info!(slot_id = %slot.id, contractor_id = %contractor_id, date = %date, "availability slot created");
    Ok((StatusCode::CREATED, Json(slot)))
}

async fn update_slot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSlotRequest>,
) -> Result<Json<AvailabilitySlot>, AppError> {
    state
        .store
        .set_slot_availability(
            id,
            payload.available.unwrap_or(true),
            clean_reason(payload.unavailable_reason),
        )
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("availability slot {id} not found")))
}

async fn list_for_contractor(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<ContractorSlots>, AppError> {
    ensure_contractor(&state, contractor_id)?;

    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let limit = page_limit(query.limit, 30, 100);

    let mut slots = state.store.slots_for(contractor_id, from, None);
    slots.truncate(limit);

    let mut by_date: BTreeMap<NaiveDate, Vec<AvailabilitySlot>> = BTreeMap::new();
    for slot in &slots {
        by_date.entry(slot.date).or_default().push(slot.clone());
    }

    Ok(Json(ContractorSlots {
        total: slots.len(),
        slots,
        by_date,
    }))
}

async fn open_windows(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<OpenWindows>, AppError> {
    ensure_contractor(&state, contractor_id)?;

    let from = query.from.unwrap_or_else(|| Utc::now().date_naive());
    let to = match query.to {
        Some(to) => to,
        None => from
            .checked_add_days(Days::new(DEFAULT_WINDOW_DAYS))
            .ok_or_else(|| AppError::Validation("from is out of range".to_string()))?,
    };
    if to < from {
        return Err(AppError::Validation("to must not be before from".to_string()));
    }

    let open = state
        .store
        .slots_for(contractor_id, from, Some(to))
        .into_iter()
        .filter(|slot| slot.available)
        .collect();
    let booked = state.store.booked_windows(contractor_id, from, to);

    Ok(Json(OpenWindows {
        open,
        booked,
        period: Period { from, to },
    }))
}

fn ensure_contractor(state: &AppState, contractor_id: Uuid) -> Result<(), AppError> {
    state
        .store
        .user(contractor_id)
        .filter(|user| user.role == UserRole::Contractor)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("contractor {contractor_id} not found")))
}

fn clean_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
}
