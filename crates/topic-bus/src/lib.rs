use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
}

pub type BusResult<T> = Result<T, BusError>;

/// In-memory broadcast bus keyed by topic string.
///
/// Publishing to a topic with no live subscribers is a no-op, not an
/// error: consumers come and go independently of producers.
#[derive(Debug)]
pub struct TopicBus<T: Clone> {
    topics: parking_lot::RwLock<std::collections::HashMap<String, broadcast::Sender<T>>>,
    capacity: usize,
}

impl<T: Clone> Default for TopicBus<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

impl<T: Clone> TopicBus<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: parking_lot::RwLock::new(std::collections::HashMap::new()),
            capacity,
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<T> {
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<T> {
        self.sender_for(topic).subscribe()
    }

    pub fn publish(&self, topic: &str, item: T) -> BusResult<usize> {
        let sender = self.sender_for(topic);
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender.send(item).map_err(|_| BusError::Closed)
    }

    /// Drop the channel for a topic; existing receivers see `Closed`.
    pub fn retire(&self, topic: &str) {
        self.topics.write().remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bus_round_trip() {
        let bus: TopicBus<String> = TopicBus::default();
        let mut sub = bus.subscribe("group:42");
        bus.publish("group:42", "hello".to_string()).expect("publish ok");
        let msg = sub.recv().await.expect("receive ok");
        assert_eq!(msg, "hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus: TopicBus<u32> = TopicBus::default();
        assert_eq!(bus.publish("group:1", 7).expect("publish ok"), 0);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus: TopicBus<u32> = TopicBus::default();
        let mut a = bus.subscribe("group:1");
        let mut b = bus.subscribe("group:2");
        bus.publish("group:1", 1).unwrap();
        bus.publish("group:2", 2).unwrap();
        assert_eq!(a.recv().await.unwrap(), 1);
        assert_eq!(b.recv().await.unwrap(), 2);
    }
}
