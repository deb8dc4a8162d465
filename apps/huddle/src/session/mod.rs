//! Session facade.
//!
//! One `SyncSession` per authenticated user, created at login and torn
//! down at logout. It owns the transport, the subscription registry,
//! the dispatcher, the reconciler, and the poller, and is the only
//! surface the UI layer talks to.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use crate::api::{ApiClient, BackendApi};
use crate::config::Config;
use crate::dispatch::MessageDispatcher;
use crate::error::SyncError;
use crate::notify::{NotificationReconciler, NotificationState};
use crate::poll::{self, EventCache, PollHandle};
use crate::protocol::{ChatMessage, ClientFrame, MessageContent, ServerEvent, StudyEvent, Topic};
use crate::subscription::SubscriptionRegistry;
use crate::transport::{ConnectionStatus, Transport, WebSocketConfig, WebSocketTransport};

pub struct SyncSession {
    config: Config,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<MessageDispatcher>,
    reconciler: Arc<NotificationReconciler>,
    api: Arc<dyn BackendApi>,
    events: EventCache,
    poller: PollHandle,
    pump: tokio::task::JoinHandle<()>,
    resubscriber: tokio::task::JoinHandle<()>,
}

impl SyncSession {
    /// Open a session against the configured backend: websocket push
    /// channel plus HTTP snapshot client, both authenticated with the
    /// bearer token.
    pub fn connect(config: &Config, token: &str) -> Self {
        let api: Arc<dyn BackendApi> = Arc::new(ApiClient::new(&config.api_url, token));
        let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport::connect(
            WebSocketConfig::new(config, token),
        ));
        Self::attach(config, transport, api)
    }

    /// Wire the engine onto an existing transport and API client. This
    /// is the seam tests use with the mock transport.
    pub fn attach(
        config: &Config,
        transport: Arc<dyn Transport>,
        api: Arc<dyn BackendApi>,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(transport.clone()));
        let dispatcher = Arc::new(MessageDispatcher::new(config.retention_limit));
        let reconciler = Arc::new(NotificationReconciler::new(api.clone()));
        let events: EventCache = Arc::new(parking_lot::RwLock::new(Vec::new()));

        let poller = poll::spawn(
            api.clone(),
            reconciler.clone(),
            events.clone(),
            config.poll_interval,
        );

        let pump = tokio::spawn(pump_frames(
            transport.clone(),
            dispatcher.clone(),
            reconciler.clone(),
        ));

        let resubscriber = tokio::spawn(resubscribe_on_connect(
            transport.status(),
            registry.clone(),
        ));

        Self {
            config: config.clone(),
            transport,
            registry,
            dispatcher,
            reconciler,
            api,
            events,
            poller,
            pump,
            resubscriber,
        }
    }

    /// Start receiving messages for a topic. Returns the live delivery
    /// channel; buffered history is read separately via `history`.
    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ChatMessage> {
        let receiver = self.dispatcher.listen(topic);
        self.registry.subscribe(topic).await;
        receiver
    }

    /// Stop delivery for a topic. Already-buffered history stays
    /// readable for the rest of the session.
    pub async fn unsubscribe(&self, topic: Topic) {
        self.registry.unsubscribe(topic).await;
        self.dispatcher.retire(topic);
    }

    pub async fn send(&self, topic: Topic, content: MessageContent) -> Result<(), SyncError> {
        match *self.transport.status().borrow() {
            ConnectionStatus::Lost => {
                return Err(SyncError::ConnectionLost {
                    attempts: self.config.max_reconnect_attempts,
                });
            }
            ConnectionStatus::Closed => return Err(SyncError::Closed),
            _ => {}
        }
        self.transport
            .send(ClientFrame::publish(topic, content))
            .await
    }

    /// Synchronous snapshot of the buffered messages for a topic.
    pub fn history(&self, topic: Topic) -> Vec<ChatMessage> {
        self.dispatcher.history(topic)
    }

    /// Fetch message history over HTTP and merge it with any already
    /// buffered realtime messages. Returns the merged buffer.
    pub async fn load_history(&self, topic: Topic) -> Result<Vec<ChatMessage>, SyncError> {
        let page = self
            .api
            .fetch_history(topic)
            .await
            .map_err(SyncError::SnapshotFetchFailed)?;
        self.dispatcher.merge_history(topic, page);
        Ok(self.dispatcher.history(topic))
    }

    pub async fn notification_state(&self) -> NotificationState {
        self.reconciler.state().await
    }

    pub async fn mark_read(&self, id: u64) -> Result<(), SyncError> {
        self.reconciler.mark_read(id).await
    }

    pub async fn mark_all_read(&self) -> Result<(), SyncError> {
        self.reconciler.mark_all_read().await
    }

    pub async fn remove_notification(&self, id: u64) -> Result<(), SyncError> {
        self.reconciler.remove(id).await
    }

    pub async fn clear_notifications(&self) -> Result<(), SyncError> {
        self.reconciler.clear_all().await
    }

    pub fn upcoming_events(&self) -> Vec<StudyEvent> {
        self.events.read().clone()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.transport.status()
    }

    /// Pull a fresh snapshot now, e.g. when a notification surface
    /// becomes visible.
    pub fn refresh(&self) {
        self.poller.poke();
    }

    /// Deterministic teardown: poller, frame pump, resubscriber, and
    /// transport (with any in-flight backoff timer) all stop here.
    pub async fn close(&self) {
        info!("closing sync session");
        self.poller.shutdown();
        self.pump.abort();
        self.resubscriber.abort();
        self.transport.close().await;
    }
}

/// Drain inbound frames, discard stale epochs, and route by event
/// shape: chat messages to the dispatcher, notifications to the
/// reconciler.
async fn pump_frames(
    transport: Arc<dyn Transport>,
    dispatcher: Arc<MessageDispatcher>,
    reconciler: Arc<NotificationReconciler>,
) {
    while let Some(inbound) = transport.recv().await {
        let live = transport.epoch();
        if inbound.epoch != live {
            trace!(
                frame_epoch = inbound.epoch,
                live_epoch = live,
                "discarding stale-epoch frame"
            );
            continue;
        }
        match inbound.frame.event {
            ServerEvent::Message(message) => {
                dispatcher.ingest(inbound.frame.topic, message);
            }
            ServerEvent::Notification(event) => {
                reconciler.apply_push(event).await;
            }
        }
    }
    debug!("frame pump stopped");
}

/// Replay subscription intents on every new connection epoch.
async fn resubscribe_on_connect(
    mut status: watch::Receiver<ConnectionStatus>,
    registry: Arc<SubscriptionRegistry>,
) {
    // A connect may already have happened before this task first polls.
    if status.borrow_and_update().is_connected() {
        registry.resync().await;
    }
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        if let ConnectionStatus::Connected { epoch } = current {
            debug!(epoch, "replaying subscriptions");
            registry.resync().await;
        }
    }
}
