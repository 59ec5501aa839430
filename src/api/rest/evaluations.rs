use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{page_limit, required};
use crate::error::AppError;
use crate::models::appointment::AppointmentStatus;
use crate::models::evaluation::{Evaluation, EvaluatorKind, RatingSummary};
use crate::models::notification::NotificationKind;
use crate::notify::{notify_quietly, NotificationDraft};
use crate::state::AppState;
use crate::store::StoreError;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evaluations", post(create_evaluation))
        .route(
            "/evaluations/appointment/:appointment_id",
            get(list_for_appointment),
        )
        .route(
            "/evaluations/contractor/:contractor_id",
            get(list_for_contractor),
        )
}

#[derive(Deserialize)]
pub struct CreateEvaluationRequest {
    pub appointment_id: Option<Uuid>,
    pub evaluator_id: Option<Uuid>,
    pub evaluated_id: Option<Uuid>,
    pub evaluator_kind: Option<EvaluatorKind>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub punctuality: Option<i64>,
    pub quality: Option<i64>,
    pub communication: Option<i64>,
    pub cleanliness: Option<i64>,
}

#[derive(Deserialize)]
pub struct ContractorEvaluationsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ContractorEvaluations {
    pub evaluations: Vec<Evaluation>,
    pub summary: RatingSummary,
}

async fn create_evaluation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateEvaluationRequest>,
) -> Result<(StatusCode, Json<Evaluation>), AppError> {
    let appointment_id = required(payload.appointment_id, "appointment_id")?;
    let evaluator_id = required(payload.evaluator_id, "evaluator_id")?;
    let evaluated_id = required(payload.evaluated_id, "evaluated_id")?;
    let evaluator_kind = required(payload.evaluator_kind, "evaluator_kind")?;
    let rating = score(required(payload.rating, "rating")?, "rating")?;

    let appointment = state
        .store
        .appointment(appointment_id)
        .ok_or_else(|| AppError::NotFound(format!("appointment {appointment_id} not found")))?;
    if appointment.status != AppointmentStatus::Completed {
        return Err(AppError::Validation(
            "only completed appointments can be evaluated".to_string(),
        ));
    }

    let (expected_evaluator, expected_evaluated) = match evaluator_kind {
        EvaluatorKind::Client => (appointment.client_id, appointment.contractor_id),
        EvaluatorKind::Contractor => (appointment.contractor_id, appointment.client_id),
    };
    if evaluator_id != expected_evaluator || evaluated_id != expected_evaluated {
        return Err(AppError::Validation(
            "evaluator and evaluated user must be the appointment's client and contractor"
                .to_string(),
        ));
    }

    let evaluation = Evaluation {
        id: Uuid::new_v4(),
        appointment_id,
        evaluator_id,
        evaluated_id,
        evaluator_kind,
        rating,
        comment: payload.comment,
        punctuality: optional_score(payload.punctuality, "punctuality")?,
        quality: optional_score(payload.quality, "quality")?,
        communication: optional_score(payload.communication, "communication")?,
        cleanliness: optional_score(payload.cleanliness, "cleanliness")?,
        visible: true,
        created_at: Utc::now(),
    };

    let evaluation = state
        .store
        .insert_evaluation(evaluation)
        .map_err(|err| match err {
            StoreError::Duplicate(_) => {
                AppError::Conflict("appointment already evaluated by this user".to_string())
            }
            other => AppError::Storage(other),
        })?;

    info!(
        evaluation_id = %evaluation.id,
        appointment_id = %appointment_id,
        rating = evaluation.rating,
        "evaluation recorded"
    );

    notify_quietly(
        state.notifier.as_ref(),
        NotificationDraft {
            user_id: evaluated_id,
            kind: NotificationKind::Evaluation,
            title: "New evaluation received".to_string(),
            message: format!(
                "You received an evaluation: {} ({}/5 stars)",
                rating_label(rating),
                rating
            ),
        },
    );

    Ok((StatusCode::CREATED, Json(evaluation)))
}

async fn list_for_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
) -> Json<Vec<Evaluation>> {
    Json(state.store.evaluations_for_appointment(appointment_id))
}

async fn list_for_contractor(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<Uuid>,
    Query(query): Query<ContractorEvaluationsQuery>,
) -> Json<ContractorEvaluations> {
    let all = state.store.client_evaluations_of(contractor_id);
    let summary = RatingSummary::from_evaluations(&all);

    let limit = page_limit(query.limit, 10, 50);
    let evaluations = all.into_iter().take(limit).collect();

    Json(ContractorEvaluations {
        evaluations,
        summary,
    })
}

fn score(value: i64, field: &str) -> Result<u8, AppError> {
    match u8::try_from(value) {
        Ok(score @ 1..=5) => Ok(score),
        _ => Err(AppError::Validation(format!(
            "{field} must be between 1 and 5"
        ))),
    }
}

fn optional_score(value: Option<i64>, field: &str) -> Result<Option<u8>, AppError> {
    value.map(|value| score(value, field)).transpose()
}

fn rating_label(rating: u8) -> &'static str {
    match rating {
        1 => "very poor",
        2 => "poor",
        3 => "fair",
        4 => "good",
        5 => "excellent",
        _ => "unrated",
    }
}
