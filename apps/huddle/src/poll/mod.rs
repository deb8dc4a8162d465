//! Periodic snapshot pulls.
//!
//! Runs on a fixed cadence regardless of push-channel health: when the
//! push channel is down this is the sole source of truth, and when it
//! is degraded the snapshot corrects it. Fetch failures are logged and
//! retried on the next tick; they never reach consumers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::BackendApi;
use crate::notify::NotificationReconciler;
use crate::protocol::StudyEvent;

pub type EventCache = Arc<parking_lot::RwLock<Vec<StudyEvent>>>;

pub struct PollHandle {
    trigger: Arc<Notify>,
    task: tokio::task::JoinHandle<()>,
}

impl PollHandle {
    /// Run one snapshot pull now, without disturbing the periodic
    /// cadence. Used when a notification surface becomes visible.
    pub fn poke(&self) {
        self.trigger.notify_one();
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

pub fn spawn(
    api: Arc<dyn BackendApi>,
    reconciler: Arc<NotificationReconciler>,
    events: EventCache,
    interval: Duration,
) -> PollHandle {
    let trigger = Arc::new(Notify::new());
    let trigger_task = trigger.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = trigger_task.notified() => {}
            }
            run_tick(api.as_ref(), &reconciler, &events).await;
        }
    });

    PollHandle { trigger, task }
}

async fn run_tick(
    api: &dyn BackendApi,
    reconciler: &NotificationReconciler,
    events: &EventCache,
) {
    match api.fetch_notifications().await {
        Ok(snapshot) => {
            reconciler.apply_snapshot(snapshot).await;
            // Sanity check against the server's own counter; the local
            // count is derived, so a mismatch means the snapshot and
            // counter endpoints were read across a write.
            if let Ok(server_count) = api.fetch_unread_count().await {
                let local = reconciler.unread_count().await;
                if server_count != local {
                    debug!(server_count, local, "unread counts differ, next tick will settle");
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "notification snapshot fetch failed, retrying next tick");
        }
    }

    match api.fetch_upcoming_events().await {
        Ok(upcoming) => {
            *events.write() = upcoming;
        }
        Err(err) => {
            warn!(error = %err, "upcoming events fetch failed, retrying next tick");
        }
    }
}
