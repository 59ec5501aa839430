use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::GeoPoint;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    /// Every status a request can still leave.
    pub const OPEN: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Assigned,
        RequestStatus::Confirmed,
        RequestStatus::InProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub client_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub service_address: String,
    pub location: Option<GeoPoint>,
    pub urgency: Urgency,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<NaiveTime>,
    pub flexible_schedule: bool,
    pub max_budget: Option<f64>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
