//! Desired-topic bookkeeping.
//!
//! The registry tracks which topics this session wants active and
//! replays subscribe intents after every reconnect. The server keeps
//! no client state across drops; this replay is what makes a
//! subscription survive one.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::protocol::{ClientFrame, Topic};
use crate::transport::Transport;

pub struct SubscriptionRegistry {
    desired: parking_lot::Mutex<HashSet<Topic>>,
    transport: Arc<dyn Transport>,
}

impl SubscriptionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            desired: parking_lot::Mutex::new(HashSet::new()),
            transport,
        }
    }

    /// Add a topic to the desired set. Idempotent; a second subscribe
    /// to the same topic sends nothing. While disconnected only the
    /// set is mutated — the intent goes out on the next connect.
    pub async fn subscribe(&self, topic: Topic) {
        let newly_added = self.desired.lock().insert(topic);
        if !newly_added {
            trace!(%topic, "already subscribed");
            return;
        }
        match self.transport.send(ClientFrame::subscribe(topic)).await {
            Ok(()) => debug!(%topic, "subscribe intent sent"),
            Err(_) => debug!(%topic, "offline, subscribe deferred to next connect"),
        }
    }

    /// Remove a topic from the desired set. Unsubscribing while
    /// disconnected has no network effect.
    pub async fn unsubscribe(&self, topic: Topic) {
        let was_present = self.desired.lock().remove(&topic);
        if !was_present {
            return;
        }
        if self
            .transport
            .send(ClientFrame::unsubscribe(topic))
            .await
            .is_ok()
        {
            debug!(%topic, "unsubscribe intent sent");
        }
    }

    pub fn desired(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.desired.lock().iter().copied().collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.desired.lock().contains(&topic)
    }

    /// Replay every desired topic on the live connection. Called on
    /// each `Connected { epoch }` transition.
    pub async fn resync(&self) {
        for topic in self.desired() {
            if self
                .transport
                .send(ClientFrame::subscribe(topic))
                .await
                .is_err()
            {
                // Connection flapped mid-replay; the next connect
                // triggers a fresh resync.
                debug!(%topic, "resync interrupted");
                return;
            }
        }
    }
}
