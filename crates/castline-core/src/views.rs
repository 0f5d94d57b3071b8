//! Watch-Session View Counter
//!
//! A view is counted once per forward-watch session, when playback first
//! reaches a fraction of the duration. [`WatchSession`] is the pure state
//! machine; [`ViewCounter`] wires it to the media events of one mount and to
//! the shared transport.
//!
//! The displayed count is never incremented locally. It only changes when
//! the server acknowledges with the authoritative value for this video.

use crate::{
    config::Timings,
    engine::{MediaEvent, MediaSurface},
    events::{EventBus, PlayerEvent},
    transport::{StreamTransport, Subscription, EVENT_CONNECT},
    types::VideoId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const EVENT_INCREMENT_VIEW_COUNT: &str = "incrementViewCount";
pub const EVENT_GET_VIEW_COUNT: &str = "getVideoViewCount";
pub const EVENT_INCREMENT_RESPONSE: &str = "incrementViewCountResponse";
pub const EVENT_GET_RESPONSE: &str = "getVideoViewCountResponse";

/// Server acknowledgement carrying the authoritative count
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCountResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(deserialize_with = "video_id_from_any")]
    pub video_id: VideoId,
    pub view_count: u64,
}

/// The backend sends ids as numbers or numeric strings
fn video_id_from_any<'de, D>(deserializer: D) -> std::result::Result<VideoId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AnyId {
        Number(u64),
        Text(String),
    }

    match AnyId::deserialize(deserializer)? {
        AnyId::Number(id) => Ok(id),
        AnyId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Progress tracking for one mounted video
#[derive(Debug, Clone)]
pub struct WatchSession {
    video_id: VideoId,
    total_duration_secs: Option<f64>,
    high_watermark_secs: f64,
    view_counted: bool,
    is_playing: bool,
    is_seeking: bool,
    threshold_ratio: f64,
    restart_threshold_secs: f64,
}

impl WatchSession {
    pub fn new(video_id: VideoId, timings: &Timings) -> Self {
        Self {
            video_id,
            total_duration_secs: None,
            high_watermark_secs: 0.0,
            view_counted: false,
            is_playing: false,
            is_seeking: false,
            threshold_ratio: timings.view_threshold_ratio,
            restart_threshold_secs: timings.restart_threshold_secs,
        }
    }

    /// Adopt a duration. Only finite, positive values are accepted.
    pub fn set_duration(&mut self, secs: f64) -> bool {
        if secs.is_finite() && secs > 0.0 {
            self.total_duration_secs = Some(secs);
            true
        } else {
            false
        }
    }

    pub fn play(&mut self) {
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn seeking(&mut self) {
        self.is_seeking = true;
    }

    /// A seek finished. Landing near the start begins a new session.
    pub fn seeked(&mut self, position: f64) {
        self.is_seeking = false;
        if position < self.restart_threshold_secs {
            debug!(video_id = self.video_id, position, "Seek to start, watch session restarted");
            self.reset();
        }
    }

    /// Playback reached the end; a replay may count again
    pub fn ended(&mut self) {
        self.is_playing = false;
        self.reset();
    }

    /// Feed a playback position. Returns true exactly when this tick
    /// crosses the view threshold; the latch is set before returning.
    pub fn observe(&mut self, position: f64) -> bool {
        if !self.is_playing || self.is_seeking || !position.is_finite() {
            return false;
        }
        if position <= self.high_watermark_secs {
            return false;
        }
        self.high_watermark_secs = position;

        if self.view_counted {
            return false;
        }
        match self.threshold_secs() {
            Some(threshold) if position >= threshold => {
                self.view_counted = true;
                true
            }
            _ => false,
        }
    }

    /// Position that counts as a view, once the duration is known
    pub fn threshold_secs(&self) -> Option<f64> {
        self.total_duration_secs.map(|d| d * self.threshold_ratio)
    }

    pub fn video_id(&self) -> VideoId {
        self.video_id
    }

    pub fn duration(&self) -> Option<f64> {
        self.total_duration_secs
    }

    pub fn high_watermark(&self) -> f64 {
        self.high_watermark_secs
    }

    pub fn view_counted(&self) -> bool {
        self.view_counted
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    fn reset(&mut self) {
        self.high_watermark_secs = 0.0;
        self.view_counted = false;
    }
}

/// View counting for one mount. Dropping it removes its transport
/// listeners and stops the duration probe.
pub struct ViewCounter {
    video_id: VideoId,
    transport: StreamTransport,
    session: Arc<Mutex<WatchSession>>,
    count: Arc<watch::Sender<Option<u64>>>,
    events: EventBus,
    poll_interval: Duration,
    poll_attempts: u64,
    probe: Mutex<Option<JoinHandle<()>>>,
    _subscriptions: Vec<Subscription>,
}

impl ViewCounter {
    /// Register acknowledgement listeners and request the current count
    pub fn attach(
        transport: StreamTransport,
        video_id: VideoId,
        timings: &Timings,
        events: EventBus,
    ) -> Self {
        let (count, _) = watch::channel(None);
        let count = Arc::new(count);

        let mut subscriptions = Vec::with_capacity(3);
        for event in [EVENT_INCREMENT_RESPONSE, EVENT_GET_RESPONSE] {
            let count = Arc::clone(&count);
            let events = events.clone();
            subscriptions.push(transport.on(event, move |data| {
                apply_response(video_id, data, &count, &events);
            }));
        }

        // Re-request after every (re)connect; the count may have moved
        subscriptions.push(transport.on(EVENT_CONNECT, {
            let transport = transport.clone();
            move |_| {
                transport.emit(EVENT_GET_VIEW_COUNT, &video_id);
            }
        }));

        if transport.is_connected() {
            transport.emit(EVENT_GET_VIEW_COUNT, &video_id);
        }
        debug!(video_id, "View counter attached");

        Self {
            video_id,
            transport,
            session: Arc::new(Mutex::new(WatchSession::new(video_id, timings))),
            count,
            events,
            poll_interval: timings.duration_poll_interval(),
            poll_attempts: timings.duration_poll_attempts(),
            probe: Mutex::new(None),
            _subscriptions: subscriptions,
        }
    }

    /// Route a media element event into the watch session
    pub fn handle_media_event(&self, event: MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                if self.session.lock().set_duration(duration) {
                    debug!(video_id = self.video_id, duration, "Duration from metadata");
                    self.stop_duration_probe();
                }
            }
            MediaEvent::Play => self.session.lock().play(),
            MediaEvent::Pause => self.session.lock().pause(),
            MediaEvent::Seeking => self.session.lock().seeking(),
            MediaEvent::Seeked { position } => self.session.lock().seeked(position),
            MediaEvent::TimeUpdate { position } => self.on_time_update(position),
            MediaEvent::Ended => self.session.lock().ended(),
        }
    }

    /// Check a progress tick against the threshold
    pub fn on_time_update(&self, position: f64) {
        // Latch under the lock, emit after releasing it
        let crossed = self.session.lock().observe(position);
        if !crossed {
            return;
        }

        info!(video_id = self.video_id, position, "View threshold reached");
        if !self.transport.emit(EVENT_INCREMENT_VIEW_COUNT, &self.video_id) {
            warn!(video_id = self.video_id, "View increment not delivered, transport offline");
        }
        self.events.publish(PlayerEvent::ViewCounted {
            video_id: self.video_id,
        });
    }

    /// Poll `surface` for a usable duration where metadata is unreliable.
    /// Bounded by the configured attempts; stops at the first valid value.
    pub fn start_duration_probe(&self, surface: Arc<dyn MediaSurface>) {
        if self.session.lock().duration().is_some() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!(video_id = self.video_id, "No runtime, duration probe skipped");
            return;
        };

        let session = Arc::clone(&self.session);
        let interval = self.poll_interval;
        let attempts = self.poll_attempts;
        let video_id = self.video_id;

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            for attempt in 1..=attempts {
                ticker.tick().await;
                let mut session = session.lock();
                if session.duration().is_some() {
                    return;
                }
                if let Some(duration) = surface.duration() {
                    if session.set_duration(duration) {
                        debug!(video_id, duration, attempt, "Duration from probe");
                        return;
                    }
                }
            }
            debug!(video_id, attempts, "Duration probe gave up");
        });

        if let Some(previous) = self.probe.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_duration_probe(&self) {
        if let Some(task) = self.probe.lock().take() {
            task.abort();
        }
    }

    /// Last authoritative count from the server
    pub fn view_count(&self) -> Option<u64> {
        *self.count.borrow()
    }

    pub fn subscribe_count(&self) -> watch::Receiver<Option<u64>> {
        self.count.subscribe()
    }

    /// Snapshot of the watch session
    pub fn session(&self) -> WatchSession {
        self.session.lock().clone()
    }

    pub fn video_id(&self) -> VideoId {
        self.video_id
    }
}

impl Drop for ViewCounter {
    fn drop(&mut self) {
        self.stop_duration_probe();
        debug!(video_id = self.video_id, "View counter detached");
    }
}

impl std::fmt::Debug for ViewCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCounter")
            .field("video_id", &self.video_id)
            .field("view_count", &self.view_count())
            .finish_non_exhaustive()
    }
}

fn apply_response(
    video_id: VideoId,
    data: &Value,
    count: &watch::Sender<Option<u64>>,
    events: &EventBus,
) {
    let response = match serde_json::from_value::<ViewCountResponse>(data.clone()) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed view count response");
            return;
        }
    };
    if response.video_id != video_id {
        return;
    }
    count.send_replace(Some(response.view_count));
    events.publish(PlayerEvent::ViewCountUpdated {
        video_id,
        view_count: response.view_count,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, MemoryServer};
    use serde_json::json;

    fn session() -> WatchSession {
        let mut session = WatchSession::new(7, &Timings::default());
        session.set_duration(100.0);
        session.play();
        session
    }

    #[test]
    fn test_threshold_latches_once() {
        let mut session = session();
        assert!(!session.observe(5.0));
        assert!(session.observe(10.0));
        assert!(!session.observe(10.0));
        assert!(!session.observe(11.0));
        assert!(session.view_counted());
    }

    #[test]
    fn test_no_count_while_paused_or_seeking() {
        let mut session = session();
        session.pause();
        assert!(!session.observe(50.0));
        session.play();
        session.seeking();
        assert!(!session.observe(50.0));
        session.seeked(50.0);
        assert!(session.observe(50.5));
    }

    #[test]
    fn test_unknown_duration_never_counts() {
        let mut session = WatchSession::new(7, &Timings::default());
        session.play();
        assert!(!session.observe(500.0));
        assert!(!session.set_duration(f64::NAN));
        assert!(!session.set_duration(f64::INFINITY));
        assert!(!session.set_duration(0.0));
        assert!(session.set_duration(1000.0));
        assert!(session.observe(501.0));
    }

    #[test]
    fn test_restart_rules() {
        let mut session = session();
        assert!(session.observe(20.0));

        session.seeking();
        session.seeked(2.0);
        assert_eq!(session.high_watermark(), 0.0);
        assert!(!session.view_counted());
        assert!(session.observe(12.0));

        session.ended();
        assert!(!session.view_counted());
        session.play();
        assert!(session.observe(15.0));
    }

    #[test]
    fn test_backward_seek_keeps_watermark() {
        let mut session = session();
        assert!(!session.observe(8.0));
        session.seeking();
        session.seeked(4.0);
        assert_eq!(session.high_watermark(), 8.0);
        assert!(!session.observe(6.0));
        assert!(!session.observe(8.0));
        assert!(session.observe(10.0));
    }

    #[test]
    fn test_response_accepts_string_ids() {
        let response: ViewCountResponse = serde_json::from_value(json!({
            "status": "success",
            "videoId": "42",
            "viewCount": 1001
        }))
        .unwrap();
        assert_eq!(response.video_id, 42);
        assert_eq!(response.view_count, 1001);
    }

    async fn connected() -> (StreamTransport, MemoryServer) {
        let (connector, server) = MemoryConnector::new();
        let transport = StreamTransport::new(Arc::new(connector));
        transport.connect().await;
        (transport, server)
    }

    async fn yield_a_bit() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_attach_requests_count_and_filters_by_video() {
        let (transport, server) = connected().await;
        let counter = ViewCounter::attach(transport.clone(), 42, &Timings::default(), EventBus::default());
        assert_eq!(server.sent_payloads(EVENT_GET_VIEW_COUNT), vec![json!(42)]);

        server.push(EVENT_GET_RESPONSE, &json!({ "videoId": 41, "viewCount": 5 }));
        yield_a_bit().await;
        assert_eq!(counter.view_count(), None);

        server.push(EVENT_INCREMENT_RESPONSE, &json!({ "videoId": 42, "viewCount": 9 }));
        yield_a_bit().await;
        assert_eq!(counter.view_count(), Some(9));
    }

    #[tokio::test]
    async fn test_crossing_emits_without_local_increment() {
        let (transport, server) = connected().await;
        let counter = ViewCounter::attach(transport, 42, &Timings::default(), EventBus::default());

        counter.handle_media_event(MediaEvent::LoadedMetadata { duration: 60.0 });
        counter.handle_media_event(MediaEvent::Play);
        for tick in 0..20 {
            counter.handle_media_event(MediaEvent::TimeUpdate { position: tick as f64 });
        }

        assert_eq!(server.sent_payloads(EVENT_INCREMENT_VIEW_COUNT), vec![json!(42)]);
        assert_eq!(counter.view_count(), None);
    }

    #[tokio::test]
    async fn test_reconnect_requests_count_again() {
        let (transport, server) = connected().await;
        let _counter = ViewCounter::attach(transport.clone(), 3, &Timings::default(), EventBus::default());
        transport.reconnect().await;
        assert_eq!(server.sent_payloads(EVENT_GET_VIEW_COUNT).len(), 2);
    }

    #[tokio::test]
    async fn test_drop_removes_listeners() {
        let (transport, _server) = connected().await;
        let counter = ViewCounter::attach(transport.clone(), 3, &Timings::default(), EventBus::default());
        assert_eq!(transport.listener_count(EVENT_INCREMENT_RESPONSE), 1);
        drop(counter);
        assert_eq!(transport.listener_count(EVENT_INCREMENT_RESPONSE), 0);
        assert_eq!(transport.listener_count(EVENT_GET_RESPONSE), 0);
        assert_eq!(transport.listener_count(EVENT_CONNECT), 0);
    }

    struct SlowSurface {
        duration: Mutex<Option<f64>>,
    }

    impl MediaSurface for SlowSurface {
        fn set_source(&self, _url: &str) {}
        fn duration(&self) -> Option<f64> {
            *self.duration.lock()
        }
        fn inject_style(&self, _id: &str, _css: &str) {}
        fn remove_style(&self, _id: &str) {}
        fn release(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_probe_adopts_first_valid_value() {
        let (transport, _server) = connected().await;
        let counter = ViewCounter::attach(transport, 3, &Timings::default(), EventBus::default());
        let surface = Arc::new(SlowSurface {
            duration: Mutex::new(Some(f64::NAN)),
        });
        counter.start_duration_probe(surface.clone());

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(counter.session().duration(), None);

        *surface.duration.lock() = Some(240.0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(counter.session().duration(), Some(240.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_probe_is_bounded() {
        let (transport, _server) = connected().await;
        let counter = ViewCounter::attach(transport, 3, &Timings::default(), EventBus::default());
        let surface = Arc::new(SlowSurface {
            duration: Mutex::new(None),
        });
        counter.start_duration_probe(surface.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        *surface.duration.lock() = Some(90.0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.session().duration(), None);
    }
}
