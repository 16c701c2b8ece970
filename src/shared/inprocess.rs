//! In-process loopback transport.
//!
//! [`InProcessTransport::pair`] returns two connected ends; frames cross by
//! value with no serialization boundary. Useful for tests and for embedding
//! a server and client in one process.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, TransportError};
use crate::shared::{Transport, TransportMessage};

/// One end of an in-process transport pair.
pub struct InProcessTransport {
    tx: mpsc::UnboundedSender<TransportMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<TransportMessage>>,
    closed: AtomicBool,
    session_id: String,
}

impl InProcessTransport {
    /// Create two connected ends sharing one session id.
    pub fn pair() -> (Self, Self) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let session_id = format!("inprocess-{nanos}");

        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            closed: AtomicBool::new(false),
            session_id: session_id.clone(),
        };
        let b = Self {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            closed: AtomicBool::new(false),
            session_id,
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, message: TransportMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        self.tx
            .send(message)
            .map_err(|_| TransportError::ConnectionClosed.into())
    }

    async fn receive(&self) -> Result<TransportMessage> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(message) => Ok(message),
            None => {
                self.closed.store(true, Ordering::Release);
                Err(TransportError::ConnectionClosed.into())
            },
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        // Dropping our receiver half is not possible through &self; closing
        // the sender is what signals the peer's receive loop.
        self.rx.lock().await.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    fn transport_type(&self) -> &'static str {
        "inprocess"
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }
}

impl std::fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("session_id", &self.session_id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
