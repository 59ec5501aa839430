use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::required_text;
use crate::error::AppError;
use crate::models::user::Category;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/categories", post(create_category).get(list_categories))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let name = required_text(payload.name, "name")?;

    let category = state.store.insert_category(Category {
        id: Uuid::new_v4(),
        name,
        description: payload.description,
        active: payload.active.unwrap_or(true),
    });

    Ok((StatusCode::CREATED, Json(category)))
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Json<Vec<Category>> {
    Json(state.store.active_categories())
}
