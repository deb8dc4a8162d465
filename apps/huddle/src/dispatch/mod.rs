//! Per-topic message buffers and consumer fan-out.
//!
//! Exactly one writer (the session frame pump) calls `ingest`; reads
//! are safe to issue concurrently. Buffers are keyed by server-assigned
//! message id, which gives id ordering and duplicate suppression in one
//! structure.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::broadcast;
use topic_bus::TopicBus;
use tracing::{trace, warn};

use crate::protocol::{ChatMessage, Topic};

pub struct MessageDispatcher {
    buffers: parking_lot::Mutex<HashMap<Topic, BTreeMap<u64, ChatMessage>>>,
    bus: TopicBus<ChatMessage>,
    retention_limit: usize,
}

impl MessageDispatcher {
    pub fn new(retention_limit: usize) -> Self {
        Self {
            buffers: parking_lot::Mutex::new(HashMap::new()),
            bus: TopicBus::default(),
            retention_limit,
        }
    }

    /// Register a consumer for a topic. Messages arrive in ascending
    /// id order, after buffer insertion completes.
    pub fn listen(&self, topic: Topic) -> broadcast::Receiver<ChatMessage> {
        self.bus.subscribe(&topic.to_string())
    }

    /// Insert one pushed message. Returns `true` if it was new.
    ///
    /// Redelivered ids (reconnect replay) are dropped before fan-out.
    /// A message older than the newest buffered id is kept for history
    /// reads but not fanned out, preserving the non-decreasing order
    /// consumers observe.
    pub fn ingest(&self, topic: Topic, message: ChatMessage) -> bool {
        let fan_out = {
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(topic).or_default();

            if buffer.contains_key(&message.id) {
                trace!(%topic, id = message.id, "duplicate message dropped");
                return false;
            }

            let newest = buffer.keys().next_back().copied();
            let is_latest = newest.map_or(true, |max| message.id > max);
            if !is_latest {
                warn!(%topic, id = message.id, "late out-of-order message buffered without fan-out");
            }

            buffer.insert(message.id, message.clone());
            Self::evict(buffer, self.retention_limit);
            is_latest && buffer.contains_key(&message.id)
        };

        if fan_out {
            let _ = self.bus.publish(&topic.to_string(), message);
        }
        true
    }

    /// Merge an HTTP-fetched history page with whatever realtime
    /// messages are already buffered. Id-based dedup; no fan-out, the
    /// caller reads the merged buffer synchronously.
    pub fn merge_history(&self, topic: Topic, messages: Vec<ChatMessage>) {
        let mut buffers = self.buffers.lock();
        let buffer = buffers.entry(topic).or_default();
        for message in messages {
            buffer.entry(message.id).or_insert(message);
        }
        Self::evict(buffer, self.retention_limit);
    }

    /// Snapshot of the current ordered buffer for a topic.
    pub fn history(&self, topic: Topic) -> Vec<ChatMessage> {
        self.buffers
            .lock()
            .get(&topic)
            .map(|buffer| buffer.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stop fan-out for a topic. Buffered history stays readable; only
    /// the live delivery channel is torn down.
    pub fn retire(&self, topic: Topic) {
        self.bus.retire(&topic.to_string());
    }

    fn evict(buffer: &mut BTreeMap<u64, ChatMessage>, limit: usize) {
        while buffer.len() > limit {
            buffer.pop_first();
        }
    }
}
