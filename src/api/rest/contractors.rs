use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::{page_limit, required};
use crate::engine::search::{search_available, AvailableContractor, SearchCriteria};
use crate::error::AppError;
use crate::models::evaluation::{round_one_decimal, Evaluation};
use crate::models::user::{GeoPoint, Offering, User, UserRole};
use crate::state::AppState;
use crate::store::ContractorDirectory;

const RECENT_EVALUATIONS: usize = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/contractors", get(list_contractors))
        .route("/contractors/search", post(search_contractors))
        .route("/contractors/:id", get(get_contractor))
        .route("/contractors/:id/offerings", post(create_offering))
}

#[derive(Deserialize)]
pub struct ListContractorsQuery {
    pub category_id: Option<Uuid>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateOfferingRequest {
    pub category_id: Option<Uuid>,
    pub base_rate: Option<f64>,
    pub experience_years: Option<u32>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub category_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub service_date: Option<NaiveDate>,
    pub radius_km: Option<f64>,
}

#[derive(Serialize)]
pub struct SearchCriteriaEcho {
    pub category_id: Uuid,
    pub service_date: NaiveDate,
    pub radius_km: f64,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub contractors: Vec<AvailableContractor>,
    pub total: usize,
    pub criteria: SearchCriteriaEcho,
}

#[derive(Serialize)]
pub struct ContractorStatsView {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub average_rating: f64,
}

#[derive(Serialize)]
pub struct ContractorProfile {
    #[serde(flatten)]
    pub contractor: User,
    pub offerings: Vec<Offering>,
    pub recent_evaluations: Vec<Evaluation>,
    pub stats: ContractorStatsView,
}

async fn list_contractors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListContractorsQuery>,
) -> Json<Vec<User>> {
    let limit = page_limit(query.limit, 20, 100);
    Json(state.store.contractors(query.category_id, limit))
}

async fn get_contractor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContractorProfile>, AppError> {
    let contractor = load_contractor(&state, id)?;

    let mut recent_evaluations = state.store.client_evaluations_of(id);
    recent_evaluations.truncate(RECENT_EVALUATIONS);
    let stats = state.store.contractor_stats(id);

    Ok(Json(ContractorProfile {
        offerings: state.store.offerings_for(id),
        recent_evaluations,
        stats: ContractorStatsView {
            total_jobs: stats.total_jobs,
            completed_jobs: stats.completed_jobs,
            average_rating: stats.average_rating.map(round_one_decimal).unwrap_or(0.0),
        },
        contractor,
    }))
}

async fn create_offering(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateOfferingRequest>,
) -> Result<(StatusCode, Json<Offering>), AppError> {
    let contractor = load_contractor(&state, id)?;
    let category_id = required(payload.category_id, "category_id")?;
    state
        .store
        .category(category_id)?
        .ok_or_else(|| AppError::NotFound(format!("category {category_id} not found")))?;

    if payload.base_rate.is_some_and(|rate| rate < 0.0) {
        return Err(AppError::Validation("base_rate must be >= 0".to_string()));
    }

    let offering = state.store.insert_offering(Offering {
        id: Uuid::new_v4(),
        contractor_id: contractor.id,
        category_id,
        base_rate: payload.base_rate,
        experience_years: payload.experience_years.unwrap_or(0),
        active: true,
    });

    Ok((StatusCode::CREATED, Json(offering)))
}

async fn search_contractors(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let category_id = required(payload.category_id, "category_id")?;
    let radius_km = payload.radius_km.unwrap_or(state.search_radius_km);
    if radius_km <= 0.0 {
        return Err(AppError::Validation("radius_km must be > 0".to_string()));
    }

    let criteria = SearchCriteria {
        category_id,
        location: payload.location,
        service_date: payload
            .service_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        radius_km,
    };

    let contractors = search_available(&state.store, &criteria);

    Ok(Json(SearchResponse {
        total: contractors.len(),
        contractors,
        criteria: SearchCriteriaEcho {
            category_id,
            service_date: criteria.service_date,
            radius_km,
        },
    }))
}

fn load_contractor(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .store
        .user(id)
        .filter(|user| user.role == UserRole::Contractor)
        .ok_or_else(|| AppError::NotFound(format!("contractor {id} not found")))
}
