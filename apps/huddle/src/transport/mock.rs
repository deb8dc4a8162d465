//! Scriptable in-memory transport for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use super::{ConnectionStatus, InboundFrame, Transport};
use crate::error::SyncError;
use crate::protocol::{ClientFrame, ServerFrame};

pub struct MockTransport {
    sent: parking_lot::Mutex<Vec<ClientFrame>>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<InboundFrame>>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    epoch: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            status_tx,
            status_rx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Simulate a successful (re)connect at the given epoch.
    pub fn connect_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::SeqCst);
        let _ = self.status_tx.send(ConnectionStatus::Connected { epoch });
    }

    /// Simulate an unexpected drop of the live connection.
    pub fn drop_connection(&self) {
        let _ = self
            .status_tx
            .send(ConnectionStatus::Reconnecting { attempt: 1 });
    }

    pub fn mark_lost(&self) {
        let _ = self.status_tx.send(ConnectionStatus::Lost);
    }

    /// Inject an inbound frame tagged with an arbitrary epoch. The
    /// epoch check is the receiver's job, so stale frames are delivered
    /// as-is.
    pub fn push_frame(&self, epoch: u64, frame: ServerFrame) {
        let _ = self.inbound_tx.send(InboundFrame { epoch, frame });
    }

    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: ClientFrame) -> Result<(), SyncError> {
        if !self.status_rx.borrow().is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.sent.lock().push(frame);
        Ok(())
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
        let _ = self.status_tx.send(ConnectionStatus::Closed);
    }
}
