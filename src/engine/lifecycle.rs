use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DispatchPolicy;
use crate::engine::selector::select_candidates;
use crate::error::AppError;
use crate::models::assignment::{
    Assignment, AssignmentEvent, AssignmentEventKind, AssignmentStatus,
};
use crate::models::notification::NotificationKind;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::notify::{notify_quietly, NotificationDraft, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::{
    AssignmentRepository, ContractorDirectory, StatusChange, StoreError, Transition,
    TransitionResult,
};

const DEFAULT_DECLINE_REASON: &str = "no reason given";
const WITHDRAWN_REASON: &str = "request assigned to another contractor";

/// Result of a best-effort side effect. Never turned into an error for the
/// operation that triggered it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EffectOutcome {
    Completed { assignments: Vec<Uuid> },
    /// No eligible, not-yet-contacted contractor remained.
    Exhausted,
    Skipped { reason: String },
    Failed { error: String },
}

impl EffectOutcome {
    fn label(&self) -> &'static str {
        match self {
            EffectOutcome::Completed { .. } => "completed",
            EffectOutcome::Exhausted => "exhausted",
            EffectOutcome::Skipped { .. } => "skipped",
            EffectOutcome::Failed { .. } => "failed",
        }
    }

    pub fn created(&self) -> &[Uuid] {
        match self {
            EffectOutcome::Completed { assignments } => assignments,
            _ => &[],
        }
    }
}

/// Primary outcome of a contractor's response plus whatever the follow-up
/// (withdrawing siblings, backfilling) achieved.
#[derive(Debug, Clone, Serialize)]
pub struct Responded {
    pub assignment: Assignment,
    pub follow_up: EffectOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    pub backfills: Vec<EffectOutcome>,
}

#[derive(Debug, Clone, Copy)]
enum DispatchKind {
    Initial,
    Backfill,
    Sweep,
}

impl DispatchKind {
    fn label(self) -> &'static str {
        match self {
            DispatchKind::Initial => "initial",
            DispatchKind::Backfill => "backfill",
            DispatchKind::Sweep => "sweep",
        }
    }
}

/// Owns every transition of an assignment and every dispatch round.
///
/// Work touching one request is serialized through a per-request lock, and
/// the repository rejects a second assignment for the same
/// (request, contractor) pair, so concurrent declines cannot double-book a
/// replacement.
pub struct AssignmentManager {
    directory: Arc<dyn ContractorDirectory>,
    repository: Arc<dyn AssignmentRepository>,
    notifier: Arc<dyn Notifier>,
    policy: DispatchPolicy,
    request_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    events_tx: broadcast::Sender<AssignmentEvent>,
    metrics: Metrics,
}

impl AssignmentManager {
    pub fn new(
        directory: Arc<dyn ContractorDirectory>,
        repository: Arc<dyn AssignmentRepository>,
        notifier: Arc<dyn Notifier>,
        policy: DispatchPolicy,
        events_tx: broadcast::Sender<AssignmentEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            directory,
            repository,
            notifier,
            policy,
            request_locks: DashMap::new(),
            events_tx,
            metrics,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Offers a freshly created request to the first batch of candidates.
    pub async fn dispatch_initial(&self, request: &ServiceRequest) -> EffectOutcome {
        self.dispatch_round(DispatchKind::Initial, request.id, self.policy.batch_size)
            .await
    }

    pub async fn respond_accept(&self, assignment_id: Uuid) -> Result<Responded, AppError> {
        let request_id = self.request_of(assignment_id)?;

        self.with_request_lock(request_id, || -> Result<Responded, AppError> {
            let current = self.load_assignment(assignment_id)?;
            if current.status != AssignmentStatus::Sent {
                return Err(AppError::AlreadyProcessed(assignment_id));
            }

            let request = self.load_request(request_id)?;
            if request.status != RequestStatus::Pending {
                return Err(AppError::Conflict(format!(
                    "request {request_id} is no longer open for acceptance"
                )));
            }

            let accepted = self.transition(assignment_id, AssignmentStatus::Accepted, None)?;
            self.record_response(&accepted, AssignmentEventKind::Accepted);
            info!(
                assignment_id = %accepted.id,
                request_id = %request_id,
                contractor_id = %accepted.contractor_id,
                "assignment accepted"
            );

            let follow_up = match self.settle_accepted(&request, &accepted) {
                Ok(withdrawn) => EffectOutcome::Completed {
                    assignments: withdrawn,
                },
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "failed to settle accepted request");
                    EffectOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };

            Ok(Responded {
                assignment: accepted,
                follow_up,
            })
        })
        .await
    }

    pub async fn respond_decline(
        &self,
        assignment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Responded, AppError> {
        let request_id = self.request_of(assignment_id)?;
        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| DEFAULT_DECLINE_REASON.to_string());

        let declined = self
            .with_request_lock(request_id, || {
                self.transition(assignment_id, AssignmentStatus::Declined, Some(reason))
            })
            .await?;

        self.record_response(&declined, AssignmentEventKind::Declined);
        info!(
            assignment_id = %declined.id,
            request_id = %request_id,
            contractor_id = %declined.contractor_id,
            "assignment declined"
        );

        let follow_up = self
            .dispatch_round(DispatchKind::Backfill, request_id, 1)
            .await;

        Ok(Responded {
            assignment: declined,
            follow_up,
        })
    }

    /// Expires every `sent` assignment past its deadline at `now` and
    /// backfills each one the same way a decline would.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let stale = self.repository.expired_assignments(now)?;
        let mut report = SweepReport::default();

        for assignment in stale {
            let expired = self
                .with_request_lock(assignment.request_id, || {
                    self.transition(assignment.id, AssignmentStatus::Expired, None)
                })
                .await;

            let expired = match expired {
                Ok(expired) => expired,
                Err(AppError::AlreadyProcessed(_)) | Err(AppError::NotFound(_)) => continue,
                Err(err) => {
                    error!(
                        assignment_id = %assignment.id,
                        request_id = %assignment.request_id,
                        error = %err,
                        "failed to expire assignment"
                    );
                    report.backfills.push(EffectOutcome::Failed {
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            self.record_response(&expired, AssignmentEventKind::Expired);
            info!(
                assignment_id = %expired.id,
                request_id = %expired.request_id,
                "assignment expired"
            );
            report.expired.push(expired.id);

            let backfill = self
                .dispatch_round(DispatchKind::Sweep, expired.request_id, 1)
                .await;
            report.backfills.push(backfill);
        }

        Ok(report)
    }

    async fn dispatch_round(
        &self,
        kind: DispatchKind,
        request_id: Uuid,
        max_count: usize,
    ) -> EffectOutcome {
        let start = Instant::now();

        let outcome = self
            .with_request_lock(request_id, || {
                self.offer_to_candidates(request_id, max_count)
                    .unwrap_or_else(|err| EffectOutcome::Failed {
                        error: err.to_string(),
                    })
            })
            .await;

        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[kind.label()])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .dispatch_rounds_total
            .with_label_values(&[kind.label(), outcome.label()])
            .inc();

        match &outcome {
            EffectOutcome::Completed { assignments } => info!(
                request_id = %request_id,
                kind = kind.label(),
                created = assignments.len(),
                "dispatch round completed"
            ),
            EffectOutcome::Exhausted => info!(
                request_id = %request_id,
                kind = kind.label(),
                "no eligible contractors remain"
            ),
            EffectOutcome::Skipped { reason } => info!(
                request_id = %request_id,
                kind = kind.label(),
                reason = %reason,
                "dispatch round skipped"
            ),
            EffectOutcome::Failed { error } => error!(
                request_id = %request_id,
                kind = kind.label(),
                error = %error,
                "dispatch round failed"
            ),
        }

        outcome
    }

    /// Must run under the request lock. Exclusions are recomputed from the
    /// repository right before inserting.
    fn offer_to_candidates(
        &self,
        request_id: Uuid,
        max_count: usize,
    ) -> Result<EffectOutcome, AppError> {
        let request = self.load_request(request_id)?;
        if request.status != RequestStatus::Pending {
            return Ok(EffectOutcome::Skipped {
                reason: format!("request is {}", request.status.as_str()),
            });
        }

        let contacted: HashSet<Uuid> = self
            .repository
            .assignments_for_request(request_id)?
            .into_iter()
            .map(|assignment| assignment.contractor_id)
            .collect();

        let candidates = select_candidates(
            self.directory.as_ref(),
            request.category_id,
            &contacted,
            max_count,
            request.location.as_ref(),
        )?;

        if candidates.is_empty() {
            return Ok(EffectOutcome::Exhausted);
        }

        let sent_at = Utc::now();
        let expires_at = sent_at + self.policy.assignment_ttl;
        let mut created = Vec::with_capacity(candidates.len());

        for contractor_id in candidates {
            let assignment = Assignment {
                id: Uuid::new_v4(),
                request_id,
                contractor_id,
                status: AssignmentStatus::Sent,
                sent_at,
                expires_at,
                responded_at: None,
                reason: None,
            };

            match self.repository.insert_assignment(assignment) {
                Ok(assignment) => {
                    self.metrics.assignments_created_total.inc();
                    self.publish(AssignmentEventKind::Created, &assignment);
                    notify_quietly(
                        self.notifier.as_ref(),
                        NotificationDraft {
                            user_id: contractor_id,
                            kind: NotificationKind::AssignmentOffered,
                            title: "New service request".to_string(),
                            message: format!(
                                "You have been offered \"{}\". Respond before {}.",
                                request.title,
                                expires_at.format("%Y-%m-%d %H:%M UTC")
                            ),
                        },
                    );
                    created.push(assignment.id);
                }
                Err(StoreError::Duplicate(msg)) => {
                    warn!(request_id = %request_id, contractor_id = %contractor_id, reason = %msg, "skipping contractor");
                }
                Err(err) => {
                    if !created.is_empty() {
                        warn!(
                            request_id = %request_id,
                            created = created.len(),
                            "dispatch round interrupted after partial success"
                        );
                    }
                    return Err(err.into());
                }
            }
        }

        if created.is_empty() {
            return Ok(EffectOutcome::Skipped {
                reason: "every candidate was already contacted".to_string(),
            });
        }

        Ok(EffectOutcome::Completed {
            assignments: created,
        })
    }

    /// Marks the request assigned and withdraws the other live offers.
    fn settle_accepted(
        &self,
        request: &ServiceRequest,
        accepted: &Assignment,
    ) -> Result<Vec<Uuid>, AppError> {
        match self.repository.update_request_status(
            request.id,
            &[RequestStatus::Pending],
            RequestStatus::Assigned,
        )? {
            StatusChange::Applied(_) => {}
            StatusChange::NotFound => {
                return Err(AppError::NotFound(format!(
                    "request {} not found",
                    request.id
                )));
            }
            StatusChange::Refused(current) => {
                return Err(AppError::Conflict(format!(
                    "request {} moved to {} before it could be assigned",
                    request.id,
                    current.as_str()
                )));
            }
        }

        let now = Utc::now();
        let mut withdrawn = Vec::new();
        for sibling in self.repository.assignments_for_request(request.id)? {
            if sibling.id == accepted.id || !sibling.is_live() {
                continue;
            }

            let transition = Transition {
                to: AssignmentStatus::Withdrawn,
                at: now,
                reason: Some(WITHDRAWN_REASON.to_string()),
            };
            if let TransitionResult::Applied(sibling) = self
                .repository
                .transition_assignment(sibling.id, transition)?
            {
                self.publish(AssignmentEventKind::Withdrawn, &sibling);
                withdrawn.push(sibling.id);
            }
        }

        notify_quietly(
            self.notifier.as_ref(),
            NotificationDraft {
                user_id: request.client_id,
                kind: NotificationKind::AssignmentAccepted,
                title: "Contractor found".to_string(),
                message: format!("A contractor accepted \"{}\".", request.title),
            },
        );

        Ok(withdrawn)
    }

    fn transition(
        &self,
        assignment_id: Uuid,
        to: AssignmentStatus,
        reason: Option<String>,
    ) -> Result<Assignment, AppError> {
        let transition = Transition {
            to,
            at: Utc::now(),
            reason,
        };

        match self
            .repository
            .transition_assignment(assignment_id, transition)?
        {
            TransitionResult::Applied(assignment) => Ok(assignment),
            TransitionResult::NotFound => Err(AppError::NotFound(format!(
                "assignment {assignment_id} not found"
            ))),
            TransitionResult::AlreadyProcessed(_) => {
                Err(AppError::AlreadyProcessed(assignment_id))
            }
        }
    }

    fn record_response(&self, assignment: &Assignment, kind: AssignmentEventKind) {
        let decision = match kind {
            AssignmentEventKind::Accepted => "accepted",
            AssignmentEventKind::Declined => "declined",
            AssignmentEventKind::Expired => "expired",
            AssignmentEventKind::Created | AssignmentEventKind::Withdrawn => return,
        };
        self.metrics
            .assignment_responses_total
            .with_label_values(&[decision])
            .inc();
        self.publish(kind, assignment);
    }

    fn publish(&self, kind: AssignmentEventKind, assignment: &Assignment) {
        let _ = self.events_tx.send(AssignmentEvent {
            kind,
            assignment: assignment.clone(),
        });
    }

    fn request_of(&self, assignment_id: Uuid) -> Result<Uuid, AppError> {
        Ok(self.load_assignment(assignment_id)?.request_id)
    }

    fn load_assignment(&self, assignment_id: Uuid) -> Result<Assignment, AppError> {
        self.repository
            .assignment(assignment_id)?
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))
    }

    fn load_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError> {
        self.repository
            .request(request_id)?
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))
    }

    async fn with_request_lock<T>(&self, request_id: Uuid, work: impl FnOnce() -> T) -> T {
        let lock = self.request_locks.entry(request_id).or_default().clone();
        let output = {
            let _guard = lock.lock().await;
            work()
        };
        drop(lock);
        self.request_locks
            .remove_if(&request_id, |_, lock| Arc::strong_count(lock) == 1);
        output
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{AssignmentManager, EffectOutcome};
    use crate::config::DispatchPolicy;
    use crate::error::AppError;
    use crate::models::assignment::{Assignment, AssignmentStatus};
    use crate::models::request::{RequestStatus, ServiceRequest, Urgency};
    use crate::models::user::{Category, Offering, User, UserRole};
    use crate::notify::{InAppNotifier, NotificationDraft, Notifier, NotifyError};
    use crate::observability::metrics::Metrics;
    use crate::store::{
        AssignmentRepository, Candidate, ContractorDirectory, MemoryStore, StatusChange,
        StoreError, Transition, TransitionResult,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        manager: AssignmentManager,
        category_id: Uuid,
        client_id: Uuid,
    }

    struct OfflineDirectory;

    impl ContractorDirectory for OfflineDirectory {
        fn category(&self, _id: Uuid) -> Result<Option<Category>, StoreError> {
            Err(StoreError::Unavailable("directory offline".to_string()))
        }

        fn eligible_contractors(&self, _category_id: Uuid) -> Result<Vec<Candidate>, StoreError> {
            Err(StoreError::Unavailable("directory offline".to_string()))
        }
    }

    /// Delegates to the memory store but cannot write one assignment.
    struct StuckAssignment {
        inner: Arc<MemoryStore>,
        stuck: Uuid,
    }

    impl AssignmentRepository for StuckAssignment {
        fn request(&self, id: Uuid) -> Result<Option<ServiceRequest>, StoreError> {
            self.inner.request(id)
        }

        fn update_request_status(
            &self,
            id: Uuid,
            allowed_from: &[RequestStatus],
            to: RequestStatus,
        ) -> Result<StatusChange, StoreError> {
            self.inner.update_request_status(id, allowed_from, to)
        }

        fn assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
            self.inner.assignment(id)
        }

        fn assignments_for_request(&self, request_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
            self.inner.assignments_for_request(request_id)
        }

        fn insert_assignment(&self, assignment: Assignment) -> Result<Assignment, StoreError> {
            self.inner.insert_assignment(assignment)
        }

        fn transition_assignment(
            &self,
            id: Uuid,
            transition: Transition,
        ) -> Result<TransitionResult, StoreError> {
            if id == self.stuck {
                return Err(StoreError::Unavailable("row locked".to_string()));
            }
            self.inner.transition_assignment(id, transition)
        }

        fn expired_assignments(
            &self,
            now: chrono::DateTime<Utc>,
        ) -> Result<Vec<Assignment>, StoreError> {
            self.inner.expired_assignments(now)
        }
    }

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&self, _draft: NotificationDraft) -> Result<(), NotifyError> {
            Err(NotifyError::Channel("gateway timeout".to_string()))
        }
    }

    fn contractor_id(seed: u128) -> Uuid {
        Uuid::from_u128(seed)
    }

    fn seed(store: &MemoryStore, contractors: u128) -> (Uuid, Uuid) {
        let category = store.insert_category(Category {
            id: Uuid::new_v4(),
            name: "locksmith".to_string(),
            description: None,
            active: true,
        });
        let client = store.insert_user(User {
            id: Uuid::new_v4(),
            name: "client".to_string(),
            email: "client@example.com".to_string(),
            phone: None,
            role: UserRole::Client,
            active: true,
            location: None,
            created_at: Utc::now(),
        });

        for n in 1..=contractors {
            store.insert_user(User {
                id: contractor_id(n),
                name: format!("contractor-{n}"),
                email: format!("c{n}@example.com"),
                phone: None,
                role: UserRole::Contractor,
                active: true,
                location: None,
                created_at: Utc::now(),
            });
            store.insert_offering(Offering {
                id: Uuid::new_v4(),
                contractor_id: contractor_id(n),
                category_id: category.id,
                base_rate: None,
                experience_years: 3,
                active: true,
            });
        }

        (category.id, client.id)
    }

    fn manager_over(
        store: &Arc<MemoryStore>,
        directory: Arc<dyn ContractorDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> AssignmentManager {
        AssignmentManager::new(
            directory,
            store.clone(),
            notifier,
            DispatchPolicy::default(),
            broadcast::channel(64).0,
            Metrics::new(),
        )
    }

    fn fixture(contractors: u128) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (category_id, client_id) = seed(&store, contractors);
        let notifier = Arc::new(InAppNotifier::new(store.clone()));
        let manager = manager_over(&store, store.clone(), notifier);

        Fixture {
            store,
            manager,
            category_id,
            client_id,
        }
    }

    impl Fixture {
        fn open_request(&self) -> ServiceRequest {
            let now = Utc::now();
            self.store.insert_request(ServiceRequest {
                id: Uuid::new_v4(),
                client_id: self.client_id,
                category_id: self.category_id,
                title: "Front door lock jammed".to_string(),
                description: "Key turns but the bolt does not move".to_string(),
                service_address: "Av. Corrientes 1234".to_string(),
                location: None,
                urgency: Urgency::High,
                preferred_date: None,
                preferred_time: None,
                flexible_schedule: true,
                max_budget: None,
                status: RequestStatus::Pending,
                created_at: now,
                updated_at: now,
            })
        }

        fn assignments(&self, request_id: Uuid) -> Vec<Assignment> {
            self.store.assignments_for_request(request_id).unwrap()
        }

        fn assignment_of(&self, request_id: Uuid, contractor: Uuid) -> Assignment {
            self.assignments(request_id)
                .into_iter()
                .find(|a| a.contractor_id == contractor)
                .unwrap()
        }
    }

    #[tokio::test]
    async fn initial_dispatch_offers_five_distinct_contractors_for_a_day() {
        let fx = fixture(8);
        let request = fx.open_request();

        let outcome = fx.manager.dispatch_initial(&request).await;

        assert_eq!(outcome.created().len(), 5);
        let assignments = fx.assignments(request.id);
        assert_eq!(assignments.len(), 5);

        let contractors: HashSet<Uuid> = assignments.iter().map(|a| a.contractor_id).collect();
        assert_eq!(contractors.len(), 5);
        for assignment in &assignments {
            assert_eq!(assignment.status, AssignmentStatus::Sent);
            assert_eq!(assignment.expires_at - assignment.sent_at, Duration::hours(24));
        }
    }

    #[tokio::test]
    async fn small_pool_gets_every_eligible_contractor() {
        let fx = fixture(3);
        let request = fx.open_request();

        let outcome = fx.manager.dispatch_initial(&request).await;

        assert_eq!(outcome.created().len(), 3);
        assert_eq!(fx.assignments(request.id).len(), 3);
    }

    #[tokio::test]
    async fn empty_pool_leaves_request_pending_without_error() {
        let fx = fixture(0);
        let request = fx.open_request();

        let outcome = fx.manager.dispatch_initial(&request).await;

        assert_eq!(outcome, EffectOutcome::Exhausted);
        assert!(fx.assignments(request.id).is_empty());
        let stored = fx.store.request(request.id).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn second_response_to_same_assignment_is_refused() {
        let fx = fixture(5);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;
        let target = fx.assignment_of(request.id, contractor_id(1));

        let accepted = fx.manager.respond_accept(target.id).await.unwrap();
        assert_eq!(accepted.assignment.status, AssignmentStatus::Accepted);

        let again = fx.manager.respond_accept(target.id).await;
        assert!(matches!(again, Err(AppError::AlreadyProcessed(id)) if id == target.id));
        let decline = fx.manager.respond_decline(target.id, None).await;
        assert!(matches!(decline, Err(AppError::AlreadyProcessed(_))));

        let stored = fx.store.assignment(target.id).unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Accepted);
    }

    #[tokio::test]
    async fn accepting_withdraws_the_other_live_offers() {
        let fx = fixture(5);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;
        let target = fx.assignment_of(request.id, contractor_id(3));

        let responded = fx.manager.respond_accept(target.id).await.unwrap();

        assert_eq!(responded.follow_up.created().len(), 4);
        let stored = fx.store.request(request.id).unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Assigned);
        for assignment in fx.assignments(request.id) {
            let expected = if assignment.id == target.id {
                AssignmentStatus::Accepted
            } else {
                AssignmentStatus::Withdrawn
            };
            assert_eq!(assignment.status, expected);
        }

        let client_inbox = fx.store.notifications_for(fx.client_id, None, 10);
        assert_eq!(client_inbox.len(), 1);
    }

    #[tokio::test]
    async fn unknown_assignment_is_not_found() {
        let fx = fixture(1);

        let accept = fx.manager.respond_accept(Uuid::new_v4()).await;
        assert!(matches!(accept, Err(AppError::NotFound(_))));

        let decline = fx.manager.respond_decline(Uuid::new_v4(), None).await;
        assert!(matches!(decline, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn decline_backfills_then_runs_dry() {
        // contractors 1..=6 are all eligible; 1..=5 get the first round
        let fx = fixture(6);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;

        let first = fx.assignment_of(request.id, contractor_id(1));
        let responded = fx
            .manager
            .respond_decline(first.id, Some("too far".to_string()))
            .await
            .unwrap();

        assert_eq!(responded.assignment.status, AssignmentStatus::Declined);
        assert_eq!(responded.assignment.reason.as_deref(), Some("too far"));
        assert_eq!(responded.follow_up.created().len(), 1);

        let replacement = fx.assignment_of(request.id, contractor_id(6));
        assert_eq!(replacement.status, AssignmentStatus::Sent);
        assert_eq!(responded.follow_up.created()[0], replacement.id);

        let responded = fx.manager.respond_decline(replacement.id, None).await.unwrap();
        assert_eq!(responded.follow_up, EffectOutcome::Exhausted);
        assert_eq!(
            responded.assignment.reason.as_deref(),
            Some("no reason given")
        );

        let assignments = fx.assignments(request.id);
        assert_eq!(assignments.len(), 6);
        for assignment in assignments {
            let expected = match assignment.contractor_id.as_u128() {
                1 | 6 => AssignmentStatus::Declined,
                _ => AssignmentStatus::Sent,
            };
            assert_eq!(assignment.status, expected);
        }
    }

    #[tokio::test]
    async fn repeated_declines_never_recontact_anyone() {
        let fx = fixture(9);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;

        let mut rounds = 0;
        while let Some(live) = fx.assignments(request.id).into_iter().find(|a| a.is_live()) {
            fx.manager.respond_decline(live.id, None).await.unwrap();
            rounds += 1;
            assert!(rounds <= 9);
        }

        let assignments = fx.assignments(request.id);
        assert_eq!(assignments.len(), 9);
        let contacted: HashSet<Uuid> = assignments.iter().map(|a| a.contractor_id).collect();
        assert_eq!(contacted.len(), 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_declines_pick_distinct_replacements() {
        let fx = fixture(7);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;

        let a = fx.assignment_of(request.id, contractor_id(1));
        let b = fx.assignment_of(request.id, contractor_id(2));

        let (first, second) = tokio::join!(
            fx.manager.respond_decline(a.id, None),
            fx.manager.respond_decline(b.id, None)
        );
        first.unwrap();
        second.unwrap();

        let assignments = fx.assignments(request.id);
        assert_eq!(assignments.len(), 7);
        let contacted: HashSet<Uuid> = assignments.iter().map(|a| a.contractor_id).collect();
        assert_eq!(contacted.len(), 7);
    }

    #[tokio::test]
    async fn directory_outage_is_reported_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let (category_id, client_id) = seed(&store, 3);
        let notifier = Arc::new(InAppNotifier::new(store.clone()));
        let healthy = manager_over(&store, store.clone(), notifier.clone());
        let offline = manager_over(&store, Arc::new(OfflineDirectory), notifier);

        let fx = Fixture {
            store: store.clone(),
            manager: healthy,
            category_id,
            client_id,
        };
        let request = fx.open_request();

        let outcome = offline.dispatch_initial(&request).await;
        assert!(matches!(outcome, EffectOutcome::Failed { .. }));
        assert!(fx.assignments(request.id).is_empty());

        fx.manager.dispatch_initial(&request).await;
        let target = fx.assignment_of(request.id, contractor_id(1));

        let responded = offline.respond_decline(target.id, None).await.unwrap();
        assert_eq!(responded.assignment.status, AssignmentStatus::Declined);
        assert!(matches!(responded.follow_up, EffectOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn notifier_failures_do_not_block_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let (category_id, client_id) = seed(&store, 2);
        let manager = manager_over(&store, store.clone(), Arc::new(BrokenNotifier));
        let fx = Fixture {
            store,
            manager,
            category_id,
            client_id,
        };
        let request = fx.open_request();

        let outcome = fx.manager.dispatch_initial(&request).await;

        assert_eq!(outcome.created().len(), 2);
    }

    #[tokio::test]
    async fn sweep_expires_overdue_offers_and_backfills() {
        let fx = fixture(6);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;

        let nothing = fx.manager.sweep_expired(Utc::now()).await.unwrap();
        assert!(nothing.expired.is_empty());

        let later = Utc::now() + Duration::hours(25);
        let report = fx.manager.sweep_expired(later).await.unwrap();

        assert_eq!(report.expired.len(), 5);
        let backfilled: usize = report.backfills.iter().map(|b| b.created().len()).sum();
        assert_eq!(backfilled, 1);

        let replacement = fx.assignment_of(request.id, contractor_id(6));
        assert_eq!(replacement.status, AssignmentStatus::Sent);
        let expired = fx
            .assignments(request.id)
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Expired)
            .count();
        assert_eq!(expired, 5);
    }

    #[tokio::test]
    async fn no_backfill_once_request_is_cancelled() {
        let fx = fixture(6);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;
        fx.store
            .update_request_status(request.id, &RequestStatus::OPEN, RequestStatus::Cancelled)
            .unwrap();

        let target = fx.assignment_of(request.id, contractor_id(2));
        let responded = fx.manager.respond_decline(target.id, None).await.unwrap();

        assert!(matches!(responded.follow_up, EffectOutcome::Skipped { .. }));
        assert_eq!(fx.assignments(request.id).len(), 5);
    }

    #[tokio::test]
    async fn sweep_keeps_going_past_a_failed_expiry() {
        let fx = fixture(6);
        let request = fx.open_request();
        fx.manager.dispatch_initial(&request).await;
        let stuck = fx.assignment_of(request.id, contractor_id(2));

        let manager = AssignmentManager::new(
            fx.store.clone(),
            Arc::new(StuckAssignment {
                inner: fx.store.clone(),
                stuck: stuck.id,
            }),
            Arc::new(InAppNotifier::new(fx.store.clone())),
            DispatchPolicy::default(),
            broadcast::channel(64).0,
            Metrics::new(),
        );

        let report = manager
            .sweep_expired(Utc::now() + Duration::hours(25))
            .await
            .unwrap();

        assert_eq!(report.expired.len(), 4);
        assert!(!report.expired.contains(&stuck.id));
        let failed = report
            .backfills
            .iter()
            .filter(|outcome| matches!(outcome, EffectOutcome::Failed { .. }))
            .count();
        assert_eq!(failed, 1);

        let still_sent = fx.store.assignment(stuck.id).unwrap().unwrap();
        assert_eq!(still_sent.status, AssignmentStatus::Sent);
        let expired = fx
            .assignments(request.id)
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Expired)
            .count();
        assert_eq!(expired, 4);
    }
}
