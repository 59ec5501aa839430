use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Contractor,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub active: bool,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active_contractor(&self) -> bool {
        self.active && self.role == UserRole::Contractor
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

/// A contractor's declaration that they perform work in a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    pub contractor_id: Uuid,
    pub category_id: Uuid,
    pub base_rate: Option<f64>,
    pub experience_years: u32,
    pub active: bool,
}
