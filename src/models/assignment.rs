use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Sent,
    Accepted,
    Declined,
    Expired,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub contractor_id: Uuid,
    pub status: AssignmentStatus,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl Assignment {
    pub fn is_live(&self) -> bool {
        self.status == AssignmentStatus::Sent
    }
}

/// Broadcast to websocket subscribers whenever an assignment is created or
/// leaves the `sent` state.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentEvent {
    pub kind: AssignmentEventKind,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEventKind {
    Created,
    Accepted,
    Declined,
    Expired,
    Withdrawn,
}
