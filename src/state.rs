use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::DispatchPolicy;
use crate::engine::lifecycle::AssignmentManager;
use crate::models::assignment::AssignmentEvent;
use crate::notify::{InAppNotifier, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub assignments: AssignmentManager,
    pub notifier: Arc<dyn Notifier>,
    pub assignment_events_tx: broadcast::Sender<AssignmentEvent>,
    pub metrics: Metrics,
    pub search_radius_km: f64,
}

impl AppState {
    pub fn new(policy: DispatchPolicy, event_buffer_size: usize, search_radius_km: f64) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(InAppNotifier::new(store.clone()));
        Self::with_parts(store, notifier, policy, event_buffer_size, search_radius_km)
    }

    /// Wires the dispatch engine over an explicit store and notifier.
    pub fn with_parts(
        store: Arc<MemoryStore>,
        notifier: Arc<dyn Notifier>,
        policy: DispatchPolicy,
        event_buffer_size: usize,
        search_radius_km: f64,
    ) -> Self {
        let (assignment_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();

        let assignments = AssignmentManager::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            policy,
            assignment_events_tx.clone(),
            metrics.clone(),
        );

        Self {
            store,
            assignments,
            notifier,
            assignment_events_tx,
            metrics,
            search_radius_km,
        }
    }
}
