use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::appointment::{Appointment, AppointmentStatus};
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::availability::{AvailabilitySlot, BookedWindow};
use crate::models::evaluation::{Evaluation, EvaluatorKind};
use crate::models::notification::Notification;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::models::user::{Category, Offering, User, UserRole};
use crate::store::{
    AssignmentRepository, Candidate, ContractorDirectory, StatusChange, StoreError, Transition,
    TransitionResult,
};

type SlotKey = (Uuid, NaiveDate, NaiveTime);

/// In-process store backed by one concurrent map per table plus unique
/// indexes for the pairs that must never repeat.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    categories: DashMap<Uuid, Category>,
    offerings: DashMap<Uuid, Offering>,
    requests: DashMap<Uuid, ServiceRequest>,
    assignments: DashMap<Uuid, Assignment>,
    assignment_pairs: DashMap<(Uuid, Uuid), Uuid>,
    appointments: DashMap<Uuid, Appointment>,
    appointment_slots: DashMap<SlotKey, Uuid>,
    evaluations: DashMap<Uuid, Evaluation>,
    evaluation_pairs: DashMap<(Uuid, Uuid), Uuid>,
    notifications: DashMap<Uuid, Notification>,
    availability: DashMap<Uuid, AvailabilitySlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: usize,
    pub active_clients: usize,
    pub active_contractors: usize,
    pub requests: usize,
    pub pending_requests: usize,
    pub assignments: usize,
    pub appointments: usize,
    pub completed_appointments: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContractorStats {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub average_rating: Option<f64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> StoreCounts {
        let active_with_role = |role: UserRole| {
            self.users
                .iter()
                .filter(|entry| entry.active && entry.role == role)
                .count()
        };

        StoreCounts {
            users: self.users.len(),
            active_clients: active_with_role(UserRole::Client),
            active_contractors: active_with_role(UserRole::Contractor),
            requests: self.requests.len(),
            pending_requests: self
                .requests
                .iter()
                .filter(|entry| entry.status == RequestStatus::Pending)
                .count(),
            assignments: self.assignments.len(),
            appointments: self.appointments.len(),
            completed_appointments: self
                .appointments
                .iter()
                .filter(|entry| entry.status == AppointmentStatus::Completed)
                .count(),
            evaluations: self.evaluations.len(),
        }
    }

    // users

    pub fn insert_user(&self, user: User) -> User {
        self.users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn set_user_active(&self, id: Uuid, active: bool) -> Option<User> {
        let mut user = self.users.get_mut(&id)?;
        user.active = active;
        Some(user.clone())
    }

    /// Active contractors, newest first, optionally restricted to those with
    /// an active offering in `category_id`.
    pub fn contractors(&self, category_id: Option<Uuid>, limit: usize) -> Vec<User> {
        let offering_holders: Option<HashSet<Uuid>> = category_id.map(|category_id| {
            self.offerings
                .iter()
                .filter(|entry| entry.active && entry.category_id == category_id)
                .map(|entry| entry.contractor_id)
                .collect()
        });

        let mut contractors: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.is_active_contractor())
            .filter(|entry| {
                offering_holders
                    .as_ref()
                    .is_none_or(|holders| holders.contains(&entry.id))
            })
            .map(|entry| entry.value().clone())
            .collect();

        contractors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        contractors.truncate(limit);
        contractors
    }

    // categories

    pub fn insert_category(&self, category: Category) -> Category {
        self.categories.insert(category.id, category.clone());
        category
    }

    pub fn active_categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self
            .categories
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.value().clone())
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        categories
    }

    // offerings

    pub fn insert_offering(&self, offering: Offering) -> Offering {
        self.offerings.insert(offering.id, offering.clone());
        offering
    }

    pub fn offerings_for(&self, contractor_id: Uuid) -> Vec<Offering> {
        self.offerings
            .iter()
            .filter(|entry| entry.active && entry.contractor_id == contractor_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Active contractors paired with their active offering in the category.
    pub fn category_offerings(&self, category_id: Uuid) -> Vec<(User, Offering)> {
        let offerings: Vec<Offering> = self
            .offerings
            .iter()
            .filter(|entry| entry.active && entry.category_id == category_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut seen = HashSet::new();
        offerings
            .into_iter()
            .filter(|offering| seen.insert(offering.contractor_id))
            .filter_map(|offering| {
                let user = self.user(offering.contractor_id)?;
                user.is_active_contractor().then_some((user, offering))
            })
            .collect()
    }

    // requests

    pub fn insert_request(&self, request: ServiceRequest) -> ServiceRequest {
        self.requests.insert(request.id, request.clone());
        request
    }

    pub fn requests(&self, status: Option<RequestStatus>, limit: usize) -> Vec<ServiceRequest> {
        let mut requests: Vec<ServiceRequest> = self
            .requests
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(limit);
        requests
    }

    /// Runs `apply` against the stored request while holding its entry lock.
    pub fn update_request<E>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut ServiceRequest) -> Result<(), E>,
    ) -> Result<Option<ServiceRequest>, E> {
        let Some(mut request) = self.requests.get_mut(&id) else {
            return Ok(None);
        };
        apply(&mut request)?;
        request.updated_at = Utc::now();
        Ok(Some(request.clone()))
    }

    // assignments

    pub fn assignments(&self, status: Option<AssignmentStatus>, limit: usize) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        assignments.truncate(limit);
        assignments
    }

    pub fn assignments_for_contractor(
        &self,
        contractor_id: Uuid,
        status: Option<AssignmentStatus>,
    ) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.contractor_id == contractor_id)
            .filter(|entry| status.is_none_or(|status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        assignments
    }

    // appointments

    /// Claims the contractor's (date, start time) slot. A slot still held by
    /// an active appointment is reported as [`StoreError::Duplicate`].
    pub fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let key = (
            appointment.contractor_id,
            appointment.service_date,
            appointment.start_time,
        );

        match self.appointment_slots.entry(key) {
            Entry::Occupied(mut slot) => {
                let holder_active = self
                    .appointments
                    .get(slot.get())
                    .is_some_and(|holder| holder.status.is_active());
                if holder_active {
                    return Err(StoreError::Duplicate(format!(
                        "contractor {} already booked on {} at {}",
                        appointment.contractor_id, appointment.service_date, appointment.start_time
                    )));
                }
                slot.insert(appointment.id);
                self.appointments.insert(appointment.id, appointment.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(appointment.id);
                self.appointments.insert(appointment.id, appointment.clone());
            }
        }

        Ok(appointment)
    }

    pub fn appointment(&self, id: Uuid) -> Option<Appointment> {
        self.appointments.get(&id).map(|entry| entry.value().clone())
    }

    pub fn appointments(
        &self,
        status: Option<AppointmentStatus>,
        date: Option<NaiveDate>,
        limit: usize,
    ) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.status == status))
            .filter(|entry| date.is_none_or(|date| entry.service_date == date))
            .map(|entry| entry.value().clone())
            .collect();
        appointments.sort_by(|a, b| {
            (b.service_date, b.start_time).cmp(&(a.service_date, a.start_time))
        });
        appointments.truncate(limit);
        appointments
    }

    pub fn update_appointment<E>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Appointment) -> Result<(), E>,
    ) -> Result<Option<Appointment>, E> {
        let Some(mut appointment) = self.appointments.get_mut(&id) else {
            return Ok(None);
        };
        apply(&mut appointment)?;
        Ok(Some(appointment.clone()))
    }

    pub fn has_active_appointment_on(&self, contractor_id: Uuid, date: NaiveDate) -> bool {
        self.appointments.iter().any(|entry| {
            entry.contractor_id == contractor_id
                && entry.service_date == date
                && entry.status.is_active()
        })
    }

    pub fn contractor_stats(&self, contractor_id: Uuid) -> ContractorStats {
        let (total_jobs, completed_jobs) = self
            .appointments
            .iter()
            .filter(|entry| entry.contractor_id == contractor_id)
            .fold((0, 0), |(total, completed), entry| {
                let done = entry.status == AppointmentStatus::Completed;
                (total + 1, completed + usize::from(done))
            });

        ContractorStats {
            total_jobs,
            completed_jobs,
            average_rating: self.average_client_rating(contractor_id),
        }
    }

    // evaluations

    /// One evaluation per (appointment, evaluator).
    pub fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, StoreError> {
        match self
            .evaluation_pairs
            .entry((evaluation.appointment_id, evaluation.evaluator_id))
        {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "evaluator {} already rated appointment {}",
                evaluation.evaluator_id, evaluation.appointment_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(evaluation.id);
                self.evaluations.insert(evaluation.id, evaluation.clone());
                Ok(evaluation)
            }
        }
    }

    pub fn evaluations_for_appointment(&self, appointment_id: Uuid) -> Vec<Evaluation> {
        let mut evaluations: Vec<Evaluation> = self
            .evaluations
            .iter()
            .filter(|entry| entry.visible && entry.appointment_id == appointment_id)
            .map(|entry| entry.value().clone())
            .collect();
        evaluations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        evaluations
    }

    /// Visible client evaluations of `user_id`, newest first.
    pub fn client_evaluations_of(&self, user_id: Uuid) -> Vec<Evaluation> {
        let mut evaluations: Vec<Evaluation> = self
            .evaluations
            .iter()
            .filter(|entry| {
                entry.visible
                    && entry.evaluated_id == user_id
                    && entry.evaluator_kind == EvaluatorKind::Client
            })
            .map(|entry| entry.value().clone())
            .collect();
        evaluations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        evaluations
    }

    pub fn average_client_rating(&self, user_id: Uuid) -> Option<f64> {
        let (sum, count) = self
            .evaluations
            .iter()
            .filter(|entry| {
                entry.visible
                    && entry.evaluated_id == user_id
                    && entry.evaluator_kind == EvaluatorKind::Client
            })
            .fold((0u32, 0u32), |(sum, count), entry| {
                (sum + entry.rating as u32, count + 1)
            });

        (count > 0).then(|| sum as f64 / count as f64)
    }

    // availability

    pub fn insert_slot(&self, slot: AvailabilitySlot) -> AvailabilitySlot {
        self.availability.insert(slot.id, slot.clone());
        slot
    }

    pub fn set_slot_availability(
        &self,
        id: Uuid,
        available: bool,
        reason: Option<String>,
    ) -> Option<AvailabilitySlot> {
        let mut slot = self.availability.get_mut(&id)?;
        slot.available = available;
        slot.unavailable_reason = reason;
        slot.updated_at = Utc::now();
        Some(slot.clone())
    }

    /// The contractor's slots dated `from..=to` (open-ended without `to`),
    /// earliest first.
    pub fn slots_for(
        &self,
        contractor_id: Uuid,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Vec<AvailabilitySlot> {
        let mut slots: Vec<AvailabilitySlot> = self
            .availability
            .iter()
            .filter(|entry| entry.contractor_id == contractor_id && entry.date >= from)
            .filter(|entry| to.is_none_or(|to| entry.date <= to))
            .map(|entry| entry.value().clone())
            .collect();
        slots.sort_by_key(|slot| (slot.date, slot.start_time, slot.id));
        slots
    }

    /// Windows held by the contractor's active appointments in `from..=to`.
    pub fn booked_windows(
        &self,
        contractor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<BookedWindow> {
        let mut windows: Vec<BookedWindow> = self
            .appointments
            .iter()
            .filter(|entry| {
                entry.contractor_id == contractor_id
                    && entry.status.is_active()
                    && (from..=to).contains(&entry.service_date)
            })
            .map(|entry| BookedWindow {
                appointment_id: entry.id,
                service_date: entry.service_date,
                start_time: entry.start_time,
                end_time: entry.end_time,
            })
            .collect();
        windows.sort_by_key(|window| (window.service_date, window.start_time));
        windows
    }

    // notifications

    pub fn insert_notification(&self, notification: Notification) -> Notification {
        self.notifications
            .insert(notification.id, notification.clone());
        notification
    }

    pub fn notifications_for(
        &self,
        user_id: Uuid,
        read: Option<bool>,
        limit: usize,
    ) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .filter(|entry| read.is_none_or(|read| entry.read == read))
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit);
        notifications
    }

    pub fn mark_notification_read(&self, id: Uuid) -> Option<Notification> {
        let mut notification = self.notifications.get_mut(&id)?;
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(Utc::now());
        }
        Some(notification.clone())
    }
}

impl ContractorDirectory for MemoryStore {
    fn category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        Ok(self.categories.get(&id).map(|entry| entry.value().clone()))
    }

    fn eligible_contractors(&self, category_id: Uuid) -> Result<Vec<Candidate>, StoreError> {
        let candidates = self
            .category_offerings(category_id)
            .into_iter()
            .map(|(user, _offering)| Candidate {
                contractor_id: user.id,
                location: user.location,
                rating: self.average_client_rating(user.id),
            })
            .collect();

        Ok(candidates)
    }
}

impl AssignmentRepository for MemoryStore {
    fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    fn update_request_status(
        &self,
        id: Uuid,
        allowed_from: &[RequestStatus],
        to: RequestStatus,
    ) -> Result<StatusChange, StoreError> {
        let Some(mut request) = self.requests.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };
        if !allowed_from.contains(&request.status) {
            return Ok(StatusChange::Refused(request.status));
        }

        request.status = to;
        request.updated_at = Utc::now();
        Ok(StatusChange::Applied(request.clone()))
    }

    fn assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments.get(&id).map(|entry| entry.value().clone()))
    }

    fn assignments_for_request(&self, request_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.request_id == request_id)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(assignments)
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError> {
        match self
            .assignment_pairs
            .entry((assignment.request_id, assignment.contractor_id))
        {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "contractor {} already contacted for request {}",
                assignment.contractor_id, assignment.request_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(assignment.id);
                self.assignments.insert(assignment.id, assignment.clone());
                Ok(assignment)
            }
        }
    }

    fn transition_assignment(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<TransitionResult, StoreError> {
        let Some(mut assignment) = self.assignments.get_mut(&id) else {
            return Ok(TransitionResult::NotFound);
        };

        if assignment.status != AssignmentStatus::Sent {
            return Ok(TransitionResult::AlreadyProcessed(assignment.status));
        }

        assignment.status = transition.to;
        assignment.responded_at = Some(transition.at);
        if transition.reason.is_some() {
            assignment.reason = transition.reason;
        }

        Ok(TransitionResult::Applied(assignment.clone()))
    }

    fn expired_assignments(&self, now: DateTime<Utc>) -> Result<Vec<Assignment>, StoreError> {
        let mut expired: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|entry| entry.status == AssignmentStatus::Sent && entry.expires_at <= now)
            .map(|entry| entry.value().clone())
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::models::appointment::{Appointment, AppointmentStatus};
    use crate::models::assignment::{Assignment, AssignmentStatus};
    use crate::models::availability::AvailabilitySlot;
    use crate::models::request::{RequestStatus, ServiceRequest, Urgency};
    use crate::store::{
        AssignmentRepository, StatusChange, StoreError, Transition, TransitionResult,
    };

    fn assignment(request_id: Uuid, contractor_id: Uuid) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Uuid::new_v4(),
            request_id,
            contractor_id,
            status: AssignmentStatus::Sent,
            sent_at: now,
            expires_at: now + Duration::hours(24),
            responded_at: None,
            reason: None,
        }
    }

    fn appointment(contractor_id: Uuid, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            contractor_id,
            client_id: Uuid::new_v4(),
            service_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: None,
            agreed_price: 100.0,
            status,
            client_notes: None,
            contractor_notes: None,
            created_at: Utc::now(),
            confirmed_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn second_assignment_for_same_pair_is_rejected() {
        let store = MemoryStore::new();
        let request_id = Uuid::new_v4();
        let contractor_id = Uuid::new_v4();

        store
            .insert_assignment(assignment(request_id, contractor_id))
            .unwrap();
        let err = store
            .insert_assignment(assignment(request_id, contractor_id))
            .unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.assignments_for_request(request_id).unwrap().len(), 1);
    }

    #[test]
    fn transition_only_applies_from_sent() {
        let store = MemoryStore::new();
        let created = store
            .insert_assignment(assignment(Uuid::new_v4(), Uuid::new_v4()))
            .unwrap();

        let declined = Transition {
            to: AssignmentStatus::Declined,
            at: Utc::now(),
            reason: Some("busy".to_string()),
        };

        let first = store.transition_assignment(created.id, declined.clone()).unwrap();
        assert!(matches!(first, TransitionResult::Applied(ref a) if a.status == AssignmentStatus::Declined));

        let second = store.transition_assignment(created.id, declined).unwrap();
        assert!(matches!(
            second,
            TransitionResult::AlreadyProcessed(AssignmentStatus::Declined)
        ));

        let missing = store
            .transition_assignment(
                Uuid::new_v4(),
                Transition {
                    to: AssignmentStatus::Accepted,
                    at: Utc::now(),
                    reason: None,
                },
            )
            .unwrap();
        assert!(matches!(missing, TransitionResult::NotFound));
    }

    #[test]
    fn booked_slot_frees_up_once_holder_is_inactive() {
        let store = MemoryStore::new();
        let contractor_id = Uuid::new_v4();

        let holder = store
            .insert_appointment(appointment(contractor_id, AppointmentStatus::Scheduled))
            .unwrap();
        assert!(store
            .insert_appointment(appointment(contractor_id, AppointmentStatus::Scheduled))
            .is_err());

        store
            .update_appointment(holder.id, |a| {
                a.status = AppointmentStatus::Cancelled;
                Ok::<(), StoreError>(())
            })
            .unwrap();

        assert!(store
            .insert_appointment(appointment(contractor_id, AppointmentStatus::Scheduled))
            .is_ok());
    }

    fn pending_request() -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            title: "Paint the hallway".to_string(),
            description: "Two coats, white".to_string(),
            service_address: "Av. Santa Fe 900".to_string(),
            location: None,
            urgency: Urgency::Low,
            preferred_date: None,
            preferred_time: None,
            flexible_schedule: true,
            max_budget: None,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot(contractor_id: Uuid, day: u32, hour: u32, available: bool) -> AvailabilitySlot {
        let now = Utc::now();
        AvailabilitySlot {
            id: Uuid::new_v4(),
            contractor_id,
            date: NaiveDate::from_ymd_opt(2026, 11, day).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 2, 0, 0).unwrap(),
            available,
            unavailable_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn terminal_request_refuses_status_changes() {
        let store = MemoryStore::new();
        let request = store.insert_request(pending_request());

        let cancelled = store
            .update_request_status(request.id, &RequestStatus::OPEN, RequestStatus::Cancelled)
            .unwrap();
        assert!(matches!(cancelled, StatusChange::Applied(ref r) if r.status == RequestStatus::Cancelled));

        let revived = store
            .update_request_status(request.id, &RequestStatus::OPEN, RequestStatus::InProgress)
            .unwrap();
        assert!(matches!(revived, StatusChange::Refused(RequestStatus::Cancelled)));
        assert_eq!(
            store.request(request.id).unwrap().unwrap().status,
            RequestStatus::Cancelled
        );

        let missing = store
            .update_request_status(Uuid::new_v4(), &RequestStatus::OPEN, RequestStatus::Assigned)
            .unwrap();
        assert!(matches!(missing, StatusChange::NotFound));
    }

    #[test]
    fn slots_come_back_in_date_order_within_range() {
        let store = MemoryStore::new();
        let contractor_id = Uuid::new_v4();

        let late = store.insert_slot(slot(contractor_id, 5, 14, true));
        let early = store.insert_slot(slot(contractor_id, 5, 9, true));
        let before_range = store.insert_slot(slot(contractor_id, 1, 9, true));
        let after_range = store.insert_slot(slot(contractor_id, 20, 9, true));
        store.insert_slot(slot(Uuid::new_v4(), 5, 9, true));

        let from = NaiveDate::from_ymd_opt(2026, 11, 3).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 11, 10).unwrap();

        let ids: Vec<Uuid> = store
            .slots_for(contractor_id, from, Some(to))
            .iter()
            .map(|slot| slot.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id]);

        let open_ended: Vec<Uuid> = store
            .slots_for(contractor_id, from, None)
            .iter()
            .map(|slot| slot.id)
            .collect();
        assert_eq!(open_ended, vec![early.id, late.id, after_range.id]);
        assert!(!open_ended.contains(&before_range.id));

        let blocked = store
            .set_slot_availability(late.id, false, Some("vacation".to_string()))
            .unwrap();
        assert!(!blocked.available);
        assert_eq!(blocked.unavailable_reason.as_deref(), Some("vacation"));
    }

    #[test]
    fn booked_windows_skip_inactive_appointments() {
        let store = MemoryStore::new();
        let contractor_id = Uuid::new_v4();

        let active = store
            .insert_appointment(appointment(contractor_id, AppointmentStatus::Confirmed))
            .unwrap();
        let mut done = appointment(contractor_id, AppointmentStatus::Completed);
        done.start_time = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        store.insert_appointment(done).unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
        let windows = store.booked_windows(contractor_id, day, day);

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].appointment_id, active.id);
    }
}
