//! Stream Session Transport - one shared realtime channel per client
//!
//! Every realtime feature (chat, view counting, live control) shares a single
//! [`StreamTransport`]. Features register their own listeners and remove only
//! those: [`StreamTransport::on`] hands back a [`Subscription`] that removes
//! exactly the listener it created when dropped.
//!
//! The wire side is pluggable through [`Connector`]; [`ws::WsConnector`]
//! speaks WebSocket, [`memory::MemoryConnector`] is an in-process loopback.

pub mod memory;
pub mod ws;

use crate::{
    types::{ConnectionState, TransportStatus},
    Result,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lifecycle event dispatched after a connection is established
pub const EVENT_CONNECT: &str = "connect";
/// Lifecycle event dispatched after the connection is gone
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Lifecycle event dispatched when connecting failed
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// One event on the wire: `{"event": name, "data": payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// What a connector reports from the remote side
#[derive(Debug, Clone)]
pub enum LinkSignal {
    /// An inbound event
    Frame(Frame),
    /// A transient error; the link may still be usable
    Error(String),
    /// The link is gone
    Closed { reason: String },
}

/// An open connection produced by a [`Connector`]
pub struct Link {
    /// Identifier exposed through [`TransportStatus::connection_id`]
    pub connection_id: String,
    /// Frames to send; dropping the sender closes the link
    pub outbound: mpsc::UnboundedSender<Frame>,
    /// Frames and lifecycle signals from the remote side
    pub inbound: mpsc::UnboundedReceiver<LinkSignal>,
}

/// Opens links to the realtime backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new link, attaching the auth token at connect time
    async fn open(&self, auth_token: Option<&str>) -> Result<Link>;
}

/// Identifies one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Handler)>>,
}

struct ActiveLink {
    outbound: mpsc::UnboundedSender<Frame>,
    reader: JoinHandle<()>,
    generation: u64,
}

struct Inner {
    connector: Arc<dyn Connector>,
    auth_token: RwLock<Option<String>>,
    status: watch::Sender<TransportStatus>,
    errors: broadcast::Sender<String>,
    registry: Mutex<Registry>,
    link: Mutex<Option<ActiveLink>>,
    /// Bumped by every disconnect so a connect still in flight is discarded
    generation: AtomicU64,
}

impl Inner {
    fn add_listener(&self, event: &str, handler: Handler) -> ListenerId {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn remove_listener(&self, event: &str, id: Option<ListenerId>) -> usize {
        let mut registry = self.registry.lock();
        let Some(handlers) = registry.listeners.get_mut(event) else {
            return 0;
        };
        let before = handlers.len();
        match id {
            Some(id) => handlers.retain(|(existing, _)| *existing != id),
            None => handlers.clear(),
        }
        let removed = before - handlers.len();
        if handlers.is_empty() {
            registry.listeners.remove(event);
        }
        removed
    }

    fn dispatch(&self, event: &str, data: &Value) {
        // Handlers run outside the lock so they can subscribe or unsubscribe.
        let handlers: Vec<Handler> = self
            .registry
            .lock()
            .listeners
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        debug!(event, listeners = handlers.len(), "Dispatching event");
        for handler in handlers {
            handler(data);
        }
    }

    fn notify_error(&self, message: String) {
        warn!(error = %message, "Transport error");
        let _ = self.errors.send(message.clone());
        self.dispatch(EVENT_CONNECT_ERROR, &json!({ "message": message }));
    }

    fn link_dropped(&self, generation: u64, reason: &str) {
        {
            let mut link = self.link.lock();
            if link.as_ref().map(|l| l.generation) != Some(generation) {
                return;
            }
            *link = None;
        }

        info!(reason, "Transport disconnected");
        self.status.send_replace(TransportStatus::default());
        self.dispatch(EVENT_DISCONNECT, &json!({ "reason": reason }));
    }
}

/// Shared realtime transport. Cheap to clone; clones share the connection
/// and the listener registry.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<Inner>,
}

impl StreamTransport {
    /// Create a disconnected transport
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(TransportStatus::default());
        let (errors, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                connector,
                auth_token: RwLock::new(None),
                status,
                errors,
                registry: Mutex::new(Registry::default()),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Create a transport that sends `token` on every connect
    pub fn with_auth_token(connector: Arc<dyn Connector>, token: impl Into<String>) -> Self {
        let transport = Self::new(connector);
        transport.set_auth_token(Some(token.into()));
        transport
    }

    /// Replace the token used by the next connect
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.inner.auth_token.write() = token;
    }

    /// Open the connection. No-op while connecting or connected.
    ///
    /// Failures never surface as errors here: the status drops back to
    /// disconnected and the message goes to [`StreamTransport::errors`].
    #[instrument(skip(self))]
    pub async fn connect(&self) {
        let claimed = self.inner.status.send_if_modified(|status| {
            if status.state == ConnectionState::Disconnected {
                status.state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = %self.state(), "Connect ignored");
            return;
        }

        let generation = self.inner.generation.load(Ordering::Acquire);
        let token = self.inner.auth_token.read().clone();

        match self.inner.connector.open(token.as_deref()).await {
            Ok(link) => self.attach(link, generation),
            Err(e) => {
                if self.inner.generation.load(Ordering::Acquire) != generation {
                    return;
                }
                self.inner.status.send_replace(TransportStatus::default());
                self.inner.notify_error(e.to_string());
            }
        }
    }

    fn attach(&self, link: Link, generation: u64) {
        let Link {
            connection_id,
            outbound,
            mut inbound,
        } = link;

        {
            let mut slot = self.inner.link.lock();
            if self.inner.generation.load(Ordering::Acquire) != generation {
                debug!(connection_id = %connection_id, "Discarding link opened before disconnect");
                return;
            }

            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let reader = tokio::spawn(async move {
                let mut reason = String::from("link closed");
                while let Some(signal) = inbound.recv().await {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    match signal {
                        LinkSignal::Frame(frame) => inner.dispatch(&frame.event, &frame.data),
                        LinkSignal::Error(message) => inner.notify_error(message),
                        LinkSignal::Closed { reason: closed } => {
                            reason = closed;
                            break;
                        }
                    }
                }
                if let Some(inner) = weak.upgrade() {
                    inner.link_dropped(generation, &reason);
                }
            });

            *slot = Some(ActiveLink {
                outbound,
                reader,
                generation,
            });
            self.inner.status.send_replace(TransportStatus {
                state: ConnectionState::Connected,
                connection_id: Some(connection_id.clone()),
            });
        }

        info!(connection_id = %connection_id, "Transport connected");
        self.inner
            .dispatch(EVENT_CONNECT, &json!({ "id": connection_id }));
    }

    /// Close the connection. Safe to call when already disconnected.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let taken = self.inner.link.lock().take();

        let changed = self.inner.status.send_if_modified(|status| {
            if status.state != ConnectionState::Disconnected {
                *status = TransportStatus::default();
                true
            } else {
                false
            }
        });

        match taken {
            Some(active) => {
                active.reader.abort();
                drop(active.outbound);
                info!("Transport disconnected by client");
                self.inner
                    .dispatch(EVENT_DISCONNECT, &json!({ "reason": "client disconnect" }));
            }
            None if changed => debug!("Pending connect cancelled"),
            None => debug!("Disconnect ignored, already disconnected"),
        }
    }

    /// User-triggered reconnect: drop the current link and open a new one
    pub async fn reconnect(&self) {
        self.disconnect();
        self.connect().await;
    }

    /// Send an event. Fire-and-forget: while disconnected the event is
    /// dropped with a warning and `false` is returned.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> bool {
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(event, error = %e, "Dropping emit, payload not serializable");
                return false;
            }
        };

        let link = self.inner.link.lock();
        match link.as_ref() {
            Some(active) => {
                let sent = active.outbound.send(Frame::new(event, data)).is_ok();
                if sent {
                    debug!(event, "Event emitted");
                } else {
                    warn!(event, "Dropping emit, link is closing");
                }
                sent
            }
            None => {
                warn!(event, "Dropping emit, transport not connected");
                false
            }
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.add_listener(event, Arc::new(handler));
        debug!(event, listener = id.0, "Listener registered");
        Subscription {
            event: event.to_string(),
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Remove one listener, or every listener for `event` when `listener` is
    /// `None`. The latter also removes other features' listeners, so feature
    /// code should always pass the id it registered.
    pub fn off(&self, event: &str, listener: Option<ListenerId>) -> usize {
        self.inner.remove_listener(event, listener)
    }

    /// Number of listeners registered for `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .registry
            .lock()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Subscribe to status changes
    pub fn status(&self) -> watch::Receiver<TransportStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to transient error notices
    pub fn errors(&self) -> broadcast::Receiver<String> {
        self.inner.errors.subscribe()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Identifier of the live connection
    pub fn connection_id(&self) -> Option<String> {
        self.inner.status.borrow().connection_id.clone()
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

/// A registered listener; dropping it removes that listener and no other
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    event: String,
    id: ListenerId,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_listener(&self.event, Some(self.id));
            debug!(event = %self.event, listener = self.id.0, "Listener removed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryConnector;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn transport() -> (StreamTransport, memory::MemoryServer) {
        let (connector, server) = MemoryConnector::new();
        (StreamTransport::new(Arc::new(connector)), server)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (transport, server) = transport();
        transport.connect().await;
        transport.connect().await;

        assert!(transport.is_connected());
        assert_eq!(server.connections_opened(), 1);
        assert_eq!(transport.connection_id().as_deref(), Some("mem-1"));
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let (transport, server) = transport();
        transport.disconnect();
        transport.disconnect();
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        transport.connect().await;
        transport.disconnect();
        transport.disconnect();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(transport.connection_id().is_none());
        assert_eq!(server.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_is_dropped() {
        let (transport, server) = transport();
        assert!(!transport.emit("incrementViewCount", &7u64));

        transport.connect().await;
        assert!(transport.emit("incrementViewCount", &7u64));
        let sent = server.sent();
        assert_eq!(sent, vec![Frame::new("incrementViewCount", json!(7))]);
    }

    #[tokio::test]
    async fn test_subscription_drop_removes_only_its_listener() {
        let (transport, server) = transport();
        transport.connect().await;

        let hits = Arc::new(AtomicUsize::new(0));
        let first = {
            let hits = hits.clone();
            transport.on("streamStarted", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let hits = hits.clone();
            transport.on("streamStarted", move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        assert_eq!(transport.listener_count("streamStarted"), 2);

        drop(first);
        assert_eq!(transport.listener_count("streamStarted"), 1);

        server.push("streamStarted", &json!({}));
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_off_without_listener_clears_event() {
        let (transport, _server) = transport();
        let a = transport.on("chat", |_| {});
        let b = transport.on("chat", |_| {});
        assert_eq!(transport.off("chat", Some(a.id())), 1);
        assert_eq!(transport.off("chat", None), 1);
        assert_eq!(transport.listener_count("chat"), 0);
        drop(b);
        assert_eq!(transport.listener_count("chat"), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error() {
        let (transport, server) = transport();
        let mut errors = transport.errors();
        server.fail_next_open("handshake refused");

        transport.connect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        let notice = errors.recv().await.unwrap();
        assert!(notice.contains("handshake refused"));

        // Manual reconnect succeeds
        transport.reconnect().await;
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_remote_close_updates_status() {
        let (transport, server) = transport();
        transport.connect().await;
        let mut status = transport.status();

        server.close("server restart");
        tokio::time::timeout(Duration::from_secs(1), status.wait_for(|s| {
            s.state == ConnectionState::Disconnected
        }))
        .await
        .unwrap()
        .unwrap();
        assert!(!transport.emit("ping", &()));
    }

    #[tokio::test]
    async fn test_listeners_survive_reconnect() {
        let (transport, server) = transport();
        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let hits = hits.clone();
            transport.on("getVideoViewCountResponse", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        transport.connect().await;
        transport.disconnect();
        transport.connect().await;
        server.push("getVideoViewCountResponse", &json!({}));
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
