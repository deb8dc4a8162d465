use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::SyncError;
use crate::protocol::{ClientFrame, ServerFrame};

pub mod mock;
pub mod websocket;

pub use websocket::{WebSocketConfig, WebSocketTransport};

/// Connection lifecycle of the single push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected { epoch: u64 },
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted. Terminal until a new session is
    /// created by the caller.
    Lost,
    Closed,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

/// An inbound frame tagged with the epoch of the connection it arrived
/// on. Consumers drop frames whose epoch is older than the live one.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub epoch: u64,
    pub frame: ServerFrame,
}

/// Transport seam for the push channel. One live duplex connection per
/// session; all topics are multiplexed over it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enqueue a frame. Fails fast with `NotConnected` when no live
    /// connection exists; never blocks on the network.
    async fn send(&self, frame: ClientFrame) -> Result<(), SyncError>;

    /// Next inbound frame, or `None` once the transport has shut down.
    async fn recv(&self) -> Option<InboundFrame>;

    fn status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Epoch of the currently live connection (0 before the first
    /// successful connect).
    fn epoch(&self) -> u64;

    /// Deterministic teardown; suppresses any further reconnects.
    async fn close(&self);
}

/// Exponential reconnect delay: `base * 2^(attempt-1)`, capped.
/// Attempt numbering starts at 1. Jitter is applied separately so this
/// stays deterministic for tests.
pub(crate) fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << shift);
    delay.min(cap)
}

pub(crate) fn with_jitter(delay: Duration) -> Duration {
    use rand::Rng;
    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    delay.mul_f64(1.0 + jitter)
}
