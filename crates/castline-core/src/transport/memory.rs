//! In-process loopback connector
//!
//! [`MemoryConnector`] plays the client side, [`MemoryServer`] lets the other
//! side inspect emitted frames and push events back.

use super::{Connector, Frame, Link, LinkSignal};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct MemoryState {
    opened: usize,
    fail_next: Option<String>,
    to_client: Option<mpsc::UnboundedSender<LinkSignal>>,
    from_client: Option<mpsc::UnboundedReceiver<Frame>>,
    sent: Vec<Frame>,
}

impl MemoryState {
    fn drain(&mut self) {
        if let Some(rx) = self.from_client.as_mut() {
            while let Ok(frame) = rx.try_recv() {
                self.sent.push(frame);
            }
        }
    }
}

/// Client half of the loopback
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    /// Create a connector and the server handle that observes it
    pub fn new() -> (Self, MemoryServer) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: state.clone(),
            },
            MemoryServer { state },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _auth_token: Option<&str>) -> Result<Link> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next.take() {
            return Err(Error::Transport(reason));
        }

        // Keep what the previous link sent before replacing it.
        state.drain();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        state.opened += 1;
        state.to_client = Some(in_tx);
        state.from_client = Some(out_rx);

        Ok(Link {
            connection_id: format!("mem-{}", state.opened),
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Server half of the loopback
#[derive(Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryServer {
    /// Deliver an event to the client. Returns false without a live link.
    pub fn push<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> bool {
        let Ok(data) = serde_json::to_value(payload) else {
            return false;
        };
        let state = self.state.lock();
        state
            .to_client
            .as_ref()
            .is_some_and(|tx| tx.send(LinkSignal::Frame(Frame::new(event, data))).is_ok())
    }

    /// Every frame the client has emitted so far, oldest first
    pub fn sent(&self) -> Vec<Frame> {
        let mut state = self.state.lock();
        state.drain();
        state.sent.clone()
    }

    /// Payloads of emitted frames named `event`
    pub fn sent_payloads(&self, event: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|frame| frame.event == event)
            .map(|frame| frame.data)
            .collect()
    }

    /// Number of links opened
    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Make the next `open` fail with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// Close the current link from the server side
    pub fn close(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(tx) = state.to_client.take() {
            let _ = tx.send(LinkSignal::Closed {
                reason: reason.into(),
            });
        }
    }
}
