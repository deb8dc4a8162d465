//! HTTP snapshot and mutation client.
//!
//! Every call carries the session bearer credential. Snapshot reads
//! return full JSON collections; mutations are fire-and-confirm and
//! map non-2xx statuses to typed failures.

use async_trait::async_trait;
use serde::Deserialize;

use crate::protocol::{ChatMessage, NotificationEvent, StudyEvent, Topic};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("server error: status {0}")]
    Server(u16),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Seam between the sync engine and the backend HTTP API. The engine
/// only ever talks through this trait, which keeps the reconciler and
/// poller testable without a live server.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_notifications(&self) -> Result<Vec<NotificationEvent>, ApiError>;
    async fn fetch_unread_count(&self) -> Result<u64, ApiError>;
    async fn fetch_history(&self, topic: Topic) -> Result<Vec<ChatMessage>, ApiError>;
    async fn fetch_upcoming_events(&self) -> Result<Vec<StudyEvent>, ApiError>;
    async fn mark_read(&self, id: u64) -> Result<(), ApiError>;
    async fn mark_all_read(&self) -> Result<(), ApiError>;
    async fn delete_notification(&self, id: u64) -> Result<(), ApiError>;
    async fn delete_all_notifications(&self) -> Result<(), ApiError>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct NotificationListBody {
    #[serde(default)]
    notifications: Vec<NotificationEvent>,
}

#[derive(Deserialize)]
struct UnreadCountBody {
    #[serde(default)]
    count: u64,
}

#[derive(Deserialize)]
struct MessageListBody {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct EventListBody {
    #[serde(default)]
    events: Vec<StudyEvent>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(response)
    }

    async fn post(&self, path: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(response).map(|_| ())
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(response).map(|_| ())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(ApiError::Unauthorized),
        404 => Err(ApiError::NotFound),
        code if status.is_server_error() => Err(ApiError::Server(code)),
        code => Err(ApiError::Status(code)),
    }
}

#[async_trait]
impl BackendApi for ApiClient {
    async fn fetch_notifications(&self) -> Result<Vec<NotificationEvent>, ApiError> {
        let body: NotificationListBody = self.get("/notifications").await?.json().await?;
        Ok(body.notifications)
    }

    async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        let body: UnreadCountBody = self
            .get("/notifications/unread-count")
            .await?
            .json()
            .await?;
        Ok(body.count)
    }

    async fn fetch_history(&self, topic: Topic) -> Result<Vec<ChatMessage>, ApiError> {
        let path = match topic {
            Topic::Group(id) => format!("/groups/{id}/messages"),
            // Account topics have no message history; notifications are
            // fetched through their own endpoint.
            Topic::Account(_) => return Ok(Vec::new()),
        };
        let body: MessageListBody = self.get(&path).await?.json().await?;
        Ok(body.messages)
    }

    async fn fetch_upcoming_events(&self) -> Result<Vec<StudyEvent>, ApiError> {
        let body: EventListBody = self.get("/events/upcoming").await?.json().await?;
        Ok(body.events)
    }

    async fn mark_read(&self, id: u64) -> Result<(), ApiError> {
        self.post(&format!("/notifications/{id}/read")).await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.post("/notifications/mark-all-read").await
    }

    async fn delete_notification(&self, id: u64) -> Result<(), ApiError> {
        self.delete(&format!("/notifications/{id}")).await
    }

    async fn delete_all_notifications(&self) -> Result<(), ApiError> {
        self.delete("/notifications").await
    }
}
