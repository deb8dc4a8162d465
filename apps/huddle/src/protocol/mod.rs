use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod wire;

pub use wire::{decode_server_frame, encode_client_frame, WireError};

/// A logical subscription target: one group chat, or the account-wide
/// notification channel for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Group(u64),
    Account(u64),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Group(id) => write!(f, "group:{id}"),
            Topic::Account(id) => write!(f, "account:{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid topic: {0}")]
pub struct TopicParseError(String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError(s.to_string()))?;
        let id: u64 = id.parse().map_err(|_| TopicParseError(s.to_string()))?;
        match kind {
            "group" => Ok(Topic::Group(id)),
            "account" => Ok(Topic::Account(id)),
            _ => Err(TopicParseError(s.to_string())),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Broad content class of an attachment, derived server-side from the
/// MIME type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MimeClass {
    Image,
    Document,
    Archive,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Attachment {
        name: String,
        url: String,
        size_bytes: u64,
        mime_class: MimeClass,
    },
}

/// One chat message. Immutable once received; `id` is server-assigned,
/// unique within a topic and strictly increasing in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: u64,
    pub sender: String,
    #[serde(flatten)]
    pub content: MessageContent,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EventCreated,
    EventReminder,
    Message,
    Join,
    Invitation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub id: u64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

/// An upcoming study event as returned by the snapshot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyEvent {
    pub id: u64,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameAction {
    Subscribe,
    Unsubscribe,
    Publish,
}

/// Client -> server frame: `{topic, action, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientFrame {
    pub topic: Topic,
    pub action: FrameAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessageContent>,
}

impl ClientFrame {
    pub fn subscribe(topic: Topic) -> Self {
        Self {
            topic,
            action: FrameAction::Subscribe,
            payload: None,
        }
    }

    pub fn unsubscribe(topic: Topic) -> Self {
        Self {
            topic,
            action: FrameAction::Unsubscribe,
            payload: None,
        }
    }

    pub fn publish(topic: Topic, content: MessageContent) -> Self {
        Self {
            topic,
            action: FrameAction::Publish,
            payload: Some(content),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(ChatMessage),
    Notification(NotificationEvent),
}

/// Server -> client frame: `{topic, event, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerFrame {
    pub topic: Topic,
    #[serde(flatten)]
    pub event: ServerEvent,
}
