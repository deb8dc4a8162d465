//! Notification reconciliation.
//!
//! Two sources feed the same per-id state: best-effort push events and
//! the periodic authoritative poll snapshot. When they disagree the
//! snapshot wins, which bounds any push-channel inconsistency to one
//! polling interval. Unread count is always recomputed from current
//! state, never incremented, so it cannot drift.
//!
//! All mutations and snapshot application serialize behind one async
//! lock; an optimistic mutation holds it across its API call so a
//! concurrent snapshot cannot interleave with the rollback.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use crate::api::BackendApi;
use crate::error::SyncError;
use crate::protocol::NotificationEvent;

/// Point-in-time view handed to the UI layer.
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    /// Newest first.
    pub notifications: Vec<NotificationEvent>,
    pub unread: u64,
}

pub struct NotificationReconciler {
    api: Arc<dyn BackendApi>,
    known: AsyncMutex<HashMap<u64, NotificationEvent>>,
}

impl NotificationReconciler {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            api,
            known: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Apply one push-delivered event. New ids are inserted with the
    /// read flag the payload carries; ids already known are left
    /// untouched — push is at-most-once best effort, and the next
    /// snapshot corrects any disagreement.
    pub async fn apply_push(&self, event: NotificationEvent) {
        let mut known = self.known.lock().await;
        if known.contains_key(&event.id) {
            trace!(id = event.id, "push redelivery ignored");
            return;
        }
        debug!(id = event.id, kind = ?event.kind, "notification pushed");
        known.insert(event.id, event);
    }

    /// Apply a full authoritative snapshot. Ids the snapshot omits are
    /// treated as server-side deletions; read/unread flags in the
    /// snapshot override local state.
    pub async fn apply_snapshot(&self, snapshot: Vec<NotificationEvent>) {
        let mut known = self.known.lock().await;
        let before = known.len();
        *known = snapshot.into_iter().map(|n| (n.id, n)).collect();
        if known.len() != before {
            debug!(held = known.len(), "notification set reconciled");
        }
    }

    pub async fn state(&self) -> NotificationState {
        let known = self.known.lock().await;
        let unread = known.values().filter(|n| !n.read).count() as u64;
        let mut notifications: Vec<_> = known.values().cloned().collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        NotificationState {
            notifications,
            unread,
        }
    }

    pub async fn unread_count(&self) -> u64 {
        let known = self.known.lock().await;
        known.values().filter(|n| !n.read).count() as u64
    }

    /// Optimistically mark one notification read, then confirm with the
    /// server. On rejection the local flag reverts.
    pub async fn mark_read(&self, id: u64) -> Result<(), SyncError> {
        let mut known = self.known.lock().await;
        let entry = known.get_mut(&id).ok_or(SyncError::UnknownNotification(id))?;
        if entry.read {
            return Ok(());
        }
        entry.read = true;

        match self.api.mark_read(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(entry) = known.get_mut(&id) {
                    entry.read = false;
                }
                Err(SyncError::MutationRejected(err))
            }
        }
    }

    pub async fn mark_all_read(&self) -> Result<(), SyncError> {
        let mut known = self.known.lock().await;
        let changed: Vec<u64> = known
            .values_mut()
            .filter(|n| !n.read)
            .map(|n| {
                n.read = true;
                n.id
            })
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        match self.api.mark_all_read().await {
            Ok(()) => Ok(()),
            Err(err) => {
                for id in changed {
                    if let Some(entry) = known.get_mut(&id) {
                        entry.read = false;
                    }
                }
                Err(SyncError::MutationRejected(err))
            }
        }
    }

    /// Optimistically remove one notification; reinserted on rejection.
    pub async fn remove(&self, id: u64) -> Result<(), SyncError> {
        let mut known = self.known.lock().await;
        let removed = known.remove(&id).ok_or(SyncError::UnknownNotification(id))?;

        match self.api.delete_notification(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                known.insert(id, removed);
                Err(SyncError::MutationRejected(err))
            }
        }
    }

    pub async fn clear_all(&self) -> Result<(), SyncError> {
        let mut known = self.known.lock().await;
        if known.is_empty() {
            return Ok(());
        }
        let drained = std::mem::take(&mut *known);

        match self.api.delete_all_notifications().await {
            Ok(()) => Ok(()),
            Err(err) => {
                *known = drained;
                Err(SyncError::MutationRejected(err))
            }
        }
    }
}
