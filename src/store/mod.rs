//! Persistence seams used by the dispatch engine.
//!
//! The engine never touches a concrete backend; it talks to a
//! [`ContractorDirectory`] for the candidate pool and an
//! [`AssignmentRepository`] for requests and assignments. [`MemoryStore`]
//! implements both and additionally serves the plain CRUD endpoints.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::user::{Category, GeoPoint};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A contractor that satisfies the eligibility predicate for a category,
/// with the attributes the selector ranks on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub contractor_id: Uuid,
    pub location: Option<GeoPoint>,
    pub rating: Option<f64>,
}

pub trait ContractorDirectory: Send + Sync {
    fn category(&self, id: Uuid) -> Result<Option<Category>, StoreError>;

    /// Active contractors holding an active offering for `category_id`.
    fn eligible_contractors(&self, category_id: Uuid) -> Result<Vec<Candidate>, StoreError>;
}

/// Requested change for an assignment still in `sent`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub to: AssignmentStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TransitionResult {
    Applied(Assignment),
    NotFound,
    /// The assignment had already left `sent`; carries the observed status.
    AlreadyProcessed(AssignmentStatus),
}

#[derive(Debug, Clone)]
pub enum StatusChange {
    Applied(ServiceRequest),
    NotFound,
    /// The request was in a status outside the allowed set; carries it.
    Refused(RequestStatus),
}

pub trait AssignmentRepository: Send + Sync {
    fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError>;

    /// Moves the request to `to` only if its current status is one of
    /// `allowed_from`.
    fn update_request_status(
        &self,
        id: Uuid,
        allowed_from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<StatusChange, StoreError>;

    fn assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;

    fn assignments_for_request(&self, request_id: Uuid) -> Result<Vec<Assignment>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the contractor already holds
    /// an assignment of any status for the same request.
    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError>;

    /// Applies `transition` only if the assignment is currently `sent`.
    fn transition_assignment(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<TransitionResult, StoreError>;

    /// `sent` assignments whose deadline is at or before `now`.
    fn expired_assignments(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>, StoreError>;
}
