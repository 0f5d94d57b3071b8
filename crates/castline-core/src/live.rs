//! Live-Session Control - start/end broadcast requests over the transport
//!
//! Each request emits one command and waits for the first of: the success
//! event, `streamError`, a `streamAck` carrying an error (start only), a
//! transport drop, or the timeout. Listeners for the request are held as
//! [`Subscription`](crate::transport::Subscription) guards and released on
//! every exit path, including the caller dropping the future.

use crate::{
    config::Timings,
    transport::StreamTransport,
    types::{ConnectionState, LiveSessionRequest, TransportStatus},
    Error, Result,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, instrument, warn};

pub const EVENT_START_STREAM: &str = "startStream";
pub const EVENT_END_STREAM: &str = "endStream";
pub const EVENT_STREAM_STARTED: &str = "streamStarted";
pub const EVENT_STREAM_ENDED: &str = "streamEnded";
pub const EVENT_STREAM_ERROR: &str = "streamError";
pub const EVENT_STREAM_ACK: &str = "streamAck";

/// Single-resolution slot shared by competing callbacks. The first
/// `resolve` wins; later calls are ignored.
pub struct Settle<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Settle<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver `value` if nothing was delivered yet
    pub fn resolve(&self, value: T) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// `streamError` payload: a bare string or `{message}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Text(String),
    Object { message: Option<String> },
}

fn error_message(data: &Value) -> String {
    match serde_json::from_value::<ErrorPayload>(data.clone()) {
        Ok(ErrorPayload::Text(text)) if !text.is_empty() => text,
        Ok(ErrorPayload::Object { message: Some(m) }) if !m.is_empty() => m,
        _ => "unknown stream error".to_string(),
    }
}

#[derive(Deserialize)]
struct StreamAck {
    #[serde(default)]
    error: Option<String>,
}

fn ack_error(data: &Value) -> Option<String> {
    serde_json::from_value::<StreamAck>(data.clone())
        .ok()
        .and_then(|ack| ack.error)
        .filter(|e| !e.is_empty())
}

async fn wait_for_drop(mut status: watch::Receiver<TransportStatus>) {
    loop {
        if status.borrow_and_update().state != ConnectionState::Connected {
            return;
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}

/// Broadcaster-side start/end control
#[derive(Clone)]
pub struct LiveControl {
    transport: StreamTransport,
    timeout: Duration,
}

impl LiveControl {
    pub fn new(transport: StreamTransport, timings: &Timings) -> Self {
        Self {
            transport,
            timeout: timings.live_request_timeout(),
        }
    }

    /// Ask the server to start a broadcast
    #[instrument(skip(self, request), fields(stream_id = %request.stream_id))]
    pub async fn start_stream(&self, request: &LiveSessionRequest) -> Result<()> {
        self.exchange(EVENT_START_STREAM, EVENT_STREAM_STARTED, true, request)
            .await
    }

    /// Ask the server to end a broadcast. The payload is sent with
    /// `status: "ended"`; bare acknowledgements are not awaited.
    #[instrument(skip(self, request), fields(stream_id = %request.stream_id))]
    pub async fn end_stream(&self, request: &LiveSessionRequest) -> Result<()> {
        self.exchange(EVENT_END_STREAM, EVENT_STREAM_ENDED, false, &request.ended())
            .await
    }

    async fn exchange(
        &self,
        command: &str,
        success: &str,
        watch_ack: bool,
        payload: &LiveSessionRequest,
    ) -> Result<()> {
        if !self.transport.is_connected() {
            warn!(command, "Transport not connected, request not sent");
            return Err(Error::ConnectionLost);
        }

        let (settle, outcome) = Settle::<Result<()>>::new();
        let mut guards = Vec::with_capacity(3);

        guards.push(self.transport.on(success, {
            let settle = settle.clone();
            move |_| {
                settle.resolve(Ok(()));
            }
        }));
        guards.push(self.transport.on(EVENT_STREAM_ERROR, {
            let settle = settle.clone();
            move |data| {
                settle.resolve(Err(Error::StreamRejected(error_message(data))));
            }
        }));
        if watch_ack {
            guards.push(self.transport.on(EVENT_STREAM_ACK, {
                let settle = settle.clone();
                move |data| {
                    if let Some(reason) = ack_error(data) {
                        settle.resolve(Err(Error::StreamRejected(reason)));
                    }
                }
            }));
        }

        let status = self.transport.status();
        if !self.transport.emit(command, payload) {
            return Err(Error::ConnectionLost);
        }

        let result = tokio::select! {
            received = outcome => received.unwrap_or(Err(Error::ConnectionLost)),
            _ = wait_for_drop(status) => Err(Error::ConnectionLost),
            _ = tokio::time::sleep(self.timeout) => Err(Error::RequestTimeout {
                event: command.to_string(),
                timeout: self.timeout,
            }),
        };
        drop(guards);

        match &result {
            Ok(()) => info!(command, "Live session request confirmed"),
            Err(e) => warn!(command, code = e.error_code(), error = %e, "Live session request failed"),
        }
        result
    }
}
