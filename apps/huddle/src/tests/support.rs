//! Shared fixtures: a scriptable backend API and frame builders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::api::{ApiError, BackendApi};
use crate::protocol::{
    ChatMessage, MessageContent, NotificationEvent, NotificationKind, ServerEvent, ServerFrame,
    StudyEvent, Topic,
};

#[derive(Default)]
pub struct StubApi {
    pub fail_mutations: AtomicBool,
    pub fail_reads: AtomicBool,
    pub notifications: parking_lot::Mutex<Vec<NotificationEvent>>,
    pub history: parking_lot::Mutex<Vec<ChatMessage>>,
    pub events: parking_lot::Mutex<Vec<StudyEvent>>,
    pub calls: parking_lot::Mutex<Vec<String>>,
}

impl StubApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_notifications(&self, notifications: Vec<NotificationEvent>) {
        *self.notifications.lock() = notifications;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn mutation_result(&self) -> Result<(), ApiError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(ApiError::Server(500))
        } else {
            Ok(())
        }
    }

    fn read_guard(&self) -> Result<(), ApiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(ApiError::Server(503))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackendApi for StubApi {
    async fn fetch_notifications(&self) -> Result<Vec<NotificationEvent>, ApiError> {
        self.record("fetch_notifications");
        self.read_guard()?;
        Ok(self.notifications.lock().clone())
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        self.read_guard()?;
        Ok(self.notifications.lock().iter().filter(|n| !n.read).count() as u64)
    }

    async fn fetch_history(&self, _topic: Topic) -> Result<Vec<ChatMessage>, ApiError> {
        self.record("fetch_history");
        self.read_guard()?;
        Ok(self.history.lock().clone())
    }

    async fn fetch_upcoming_events(&self) -> Result<Vec<StudyEvent>, ApiError> {
        self.read_guard()?;
        Ok(self.events.lock().clone())
    }

    async fn mark_read(&self, id: u64) -> Result<(), ApiError> {
        self.record(format!("mark_read:{id}"));
        self.mutation_result()
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.record("mark_all_read");
        self.mutation_result()
    }

    async fn delete_notification(&self, id: u64) -> Result<(), ApiError> {
        self.record(format!("delete:{id}"));
        self.mutation_result()
    }

    async fn delete_all_notifications(&self) -> Result<(), ApiError> {
        self.record("delete_all");
        self.mutation_result()
    }
}

pub fn text_message(id: u64, body: &str) -> ChatMessage {
    ChatMessage {
        id,
        sender: "ana".to_string(),
        content: MessageContent::Text {
            body: body.to_string(),
        },
        sent_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
    }
}

pub fn message_frame(topic: Topic, message: ChatMessage) -> ServerFrame {
    ServerFrame {
        topic,
        event: ServerEvent::Message(message),
    }
}

pub fn notification(id: u64, read: bool) -> NotificationEvent {
    NotificationEvent {
        id,
        kind: NotificationKind::Message,
        title: format!("notification {id}"),
        body: "body".to_string(),
        read,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
            + chrono::Duration::seconds(id as i64),
        event_id: None,
        group_id: Some(42),
    }
}

pub fn notification_frame(topic: Topic, event: NotificationEvent) -> ServerFrame {
    ServerFrame {
        topic,
        event: ServerEvent::Notification(event),
    }
}

/// Poll a condition until it holds or a second has passed.
pub async fn wait_for(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn ids(messages: &[ChatMessage]) -> Vec<u64> {
    messages.iter().map(|m| m.id).collect()
}
