//! Websocket implementation of the push channel.
//!
//! One supervisor task owns the dial/reconnect loop. Each successful
//! dial bumps the epoch; inbound frames are tagged with the epoch they
//! arrived under so a slow frame from a dead connection can never
//! mutate state after a reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{backoff_delay, with_jitter, ConnectionStatus, InboundFrame, Transport};
use crate::config::Config;
use crate::error::SyncError;
use crate::protocol::{decode_server_frame, encode_client_frame, ClientFrame};

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: String,
    pub token: String,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub max_attempts: u32,
}

impl WebSocketConfig {
    pub fn new(config: &Config, token: impl Into<String>) -> Self {
        Self {
            url: config.ws_url.clone(),
            token: token.into(),
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

pub struct WebSocketTransport {
    outbound_tx: mpsc::UnboundedSender<ClientFrame>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<InboundFrame>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    epoch: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    supervisor: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Start the transport. Dialing happens on a background task; the
    /// status channel reports progress, including the first connect.
    pub fn connect(config: WebSocketConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundFrame>();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let status_tx = Arc::new(status_tx);
        let epoch = Arc::new(AtomicU64::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        let supervisor = tokio::spawn(supervise(
            config,
            Arc::new(AsyncMutex::new(outbound_rx)),
            inbound_tx,
            status_tx.clone(),
            epoch.clone(),
            closed.clone(),
        ));

        Self {
            outbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            status_tx,
            status_rx,
            epoch,
            closed,
            supervisor: parking_lot::Mutex::new(Some(supervisor)),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: ClientFrame) -> Result<(), SyncError> {
        if !self.status_rx.borrow().is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.outbound_tx
            .send(frame)
            .map_err(|_| SyncError::NotConnected)
    }

    async fn recv(&self) -> Option<InboundFrame> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let task = self.supervisor.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        let _ = self.status_tx.send(ConnectionStatus::Closed);
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.supervisor.lock().take() {
            task.abort();
        }
    }
}

/// Dial/reconnect loop. Runs until `close()` aborts it or the retry
/// budget is exhausted.
async fn supervise(
    config: WebSocketConfig,
    outbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<ClientFrame>>>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    epoch: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        match dial(&config).await {
            Ok(stream) => {
                attempt = 0;
                let current = epoch.fetch_add(1, Ordering::SeqCst) + 1;
                info!(epoch = current, "push channel connected");
                let _ = status_tx.send(ConnectionStatus::Connected { epoch: current });

                run_connection(stream, outbound_rx.clone(), inbound_tx.clone(), current, &epoch)
                    .await;

                if closed.load(Ordering::SeqCst) {
                    return;
                }
                debug!(epoch = current, "push channel dropped");
            }
            Err(err) => {
                debug!(attempt, error = %err, "dial failed");
            }
        }

        attempt += 1;
        if attempt > config.max_attempts {
            warn!(
                attempts = config.max_attempts,
                "reconnect budget exhausted, giving up"
            );
            let _ = status_tx.send(ConnectionStatus::Lost);
            return;
        }
        let _ = status_tx.send(ConnectionStatus::Reconnecting { attempt });
        let delay = with_jitter(backoff_delay(attempt, config.backoff_base, config.backoff_cap));
        tokio::time::sleep(delay).await;
    }
}

async fn dial(
    config: &WebSocketConfig,
) -> anyhow::Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let mut request = config.url.as_str().into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {}", config.token).parse()?,
    );
    let (stream, _) = connect_async(request).await?;
    Ok(stream)
}

/// Pump one live connection until it drops. Outbound frames drain from
/// the shared queue; inbound frames are decoded, tagged with this
/// connection's epoch, and forwarded unless a newer epoch has started.
async fn run_connection(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<ClientFrame>>>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    connection_epoch: u64,
    epoch: &AtomicU64,
) {
    let (mut sink, mut source) = stream.split();

    let send_task = tokio::spawn(async move {
        let mut rx = outbound_rx.lock().await;
        while let Some(frame) = rx.recv().await {
            let text = encode_client_frame(&frame);
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = source.next().await {
        let raw = match msg {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue, // Ping/Pong
        };

        let frame = match decode_server_frame(&raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                continue;
            }
        };

        if epoch.load(Ordering::SeqCst) != connection_epoch {
            debug!(
                frame_epoch = connection_epoch,
                "dropping frame from superseded connection"
            );
            break;
        }

        if inbound_tx
            .send(InboundFrame {
                epoch: connection_epoch,
                frame,
            })
            .is_err()
        {
            break;
        }
    }

    send_task.abort();
    let _ = send_task.await;
}
