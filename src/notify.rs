use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationKind};
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification recipient {0} not found")]
    UnknownRecipient(Uuid),

    #[error("notification channel failed: {0}")]
    Channel(String),
}

#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

/// Outbound channel for user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, draft: NotificationDraft) -> Result<(), NotifyError>;
}

/// Keeps notifications in the store so users can page through them.
pub struct InAppNotifier {
    store: Arc<MemoryStore>,
}

impl InAppNotifier {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

impl Notifier for InAppNotifier {
    fn notify(&self, draft: NotificationDraft) -> Result<(), NotifyError> {
        if self.store.user(draft.user_id).is_none() {
            return Err(NotifyError::UnknownRecipient(draft.user_id));
        }

        let notification = self.store.insert_notification(Notification {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        });

        debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "notification stored"
        );
        Ok(())
    }
}

/// Delivery failures are logged and dropped; they never reach the caller.
pub fn notify_quietly(notifier: &dyn Notifier, draft: NotificationDraft) {
    let user_id = draft.user_id;
    if let Err(err) = notifier.notify(draft) {
        warn!(user_id = %user_id, error = %err, "notification dropped");
    }
}
