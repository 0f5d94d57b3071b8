//! Player - one mount of a stream onto a media surface
//!
//! Coordinates:
//! - client creation, or the native fallback where the client is unsupported
//! - translation of client events into quality and state updates
//! - ABR decisions and fatal-error recovery
//! - view counting over the shared transport
//! - deterministic teardown on dispose or remount
//!
//! Options are fixed for the lifetime of a mount. [`Player::remount`] tears
//! the whole mount down and builds a new one.

use crate::{
    abr::{AbrPolicy, LevelCommand, Recovery},
    config::{PlayerOptions, Timings},
    engine::{translate, ClientConfig, ClientEvent, ClientFactory, EngineEvent, MediaEvent, MediaSurface, StreamingClient},
    events::{EventBus, PlayerEvent, PlayerEventRecord, QualityChangeReason},
    theme::{PlayerTheme, StyleGuard},
    transport::StreamTransport,
    types::{sorted_for_display, EngineState, ErrorCategory, MountId, PlaybackQualityState, QualityLevel},
    views::ViewCounter,
    Error, Result,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Collaborators injected into every mount
#[derive(Clone)]
pub struct PlayerHost {
    pub factory: Arc<dyn ClientFactory>,
    pub surface: Arc<dyn MediaSurface>,
    /// Shared realtime transport; view counting is off without it
    pub transport: Option<StreamTransport>,
    pub timings: Timings,
    pub theme: PlayerTheme,
    pub events: EventBus,
}

impl PlayerHost {
    pub fn new(factory: Arc<dyn ClientFactory>, surface: Arc<dyn MediaSurface>) -> Self {
        Self {
            factory,
            surface,
            transport: None,
            timings: Timings::default(),
            theme: PlayerTheme::default(),
            events: EventBus::default(),
        }
    }

    pub fn with_transport(mut self, transport: StreamTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_theme(mut self, theme: PlayerTheme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for PlayerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHost")
            .field("transport", &self.transport)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// State of one mount. Refresh tasks hold it weakly.
struct Mount {
    id: MountId,
    options: PlayerOptions,
    native: bool,
    timings: Timings,
    surface: Arc<dyn MediaSurface>,
    /// Taken exactly once, by a terminal error or by dispose
    client: Mutex<Option<Arc<dyn StreamingClient>>>,
    policy: Mutex<AbrPolicy>,
    state_tx: watch::Sender<EngineState>,
    quality_tx: watch::Sender<PlaybackQualityState>,
    events: EventBus,
    views: Mutex<Option<ViewCounter>>,
    style: Mutex<Option<StyleGuard>>,
    refresh: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Mount {
    fn create(options: PlayerOptions, host: &PlayerHost) -> Result<Arc<Self>> {
        options.validate()?;

        let id = MountId::new();
        let events = host.events.for_mount(id);
        let policy = AbrPolicy::new(options.abr, options.start_level);
        let native = !host.factory.is_supported();

        let client = if native {
            None
        } else {
            let config = ClientConfig {
                start_level: policy.initial_level(),
                max_buffer_length: options.buffer_size_secs,
                auto_start_load: true,
            };
            Some(host.factory.create(&config)?)
        };

        let scope = PlayerTheme::scope_id(id);
        let style = StyleGuard::inject(Arc::clone(&host.surface), scope.clone(), &host.theme.stylesheet(&scope));

        let views = match (&host.transport, options.video_id) {
            (Some(transport), Some(video_id)) => {
                let counter = ViewCounter::attach(transport.clone(), video_id, &host.timings, events.clone());
                counter.start_duration_probe(Arc::clone(&host.surface));
                Some(counter)
            }
            (None, Some(video_id)) => {
                debug!(video_id, "No transport, views are not counted");
                None
            }
            _ => None,
        };

        let (state_tx, _) = watch::channel(EngineState::Idle);
        let (quality_tx, _) = watch::channel(PlaybackQualityState::default());

        let mount = Arc::new(Self {
            id,
            options,
            native,
            timings: host.timings.clone(),
            surface: Arc::clone(&host.surface),
            client: Mutex::new(client),
            policy: Mutex::new(policy),
            state_tx,
            quality_tx,
            events,
            views: Mutex::new(views),
            style: Mutex::new(Some(style)),
            refresh: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });
        mount.attach();
        Ok(mount)
    }

    fn attach(&self) {
        self.set_state(EngineState::Initializing);
        match self.client() {
            Some(client) => {
                client.attach_media();
                client.load_source(&self.options.src);
            }
            None => {
                // Native playback: no level introspection
                self.surface.set_source(&self.options.src);
                self.set_state(EngineState::Ready);
            }
        }
        info!(mount_id = %self.id, src = %self.options.src, native = self.native, "Player mounted");
        self.events.publish(PlayerEvent::Mounted {
            src: self.options.src.clone(),
            native: self.native,
        });
    }

    fn client(&self) -> Option<Arc<dyn StreamingClient>> {
        self.client.lock().clone()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, target: EngineState) -> bool {
        let mut from = target;
        let changed = self.state_tx.send_if_modified(|state| {
            from = *state;
            if *state != target && state.can_transition_to(target) {
                *state = target;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(mount_id = %self.id, from = %from, to = %target, "State transition");
        } else if from != target {
            debug!(mount_id = %self.id, from = %from, to = %target, "State transition ignored");
        }
        changed
    }

    fn apply_level(&self, command: LevelCommand) {
        let Some(client) = self.client() else {
            return;
        };
        match command {
            LevelCommand::Auto => client.set_current_level(command.client_level()),
            LevelCommand::Pin(_) => {
                client.set_next_level(command.client_level());
                client.set_current_level(command.client_level());
            }
        }
    }

    /// Push the policy's label into the quality state; notify when it moved
    fn sync_quality(&self, reason: QualityChangeReason) {
        let (label, auto) = {
            let policy = self.policy.lock();
            (policy.label(), policy.is_auto())
        };
        let changed = self.quality_tx.send_if_modified(|quality| {
            if quality.current_quality_name == label && quality.is_auto == auto {
                return false;
            }
            quality.current_quality_name = label.clone();
            quality.is_auto = auto;
            true
        });
        if changed {
            info!(mount_id = %self.id, label = %label, auto, ?reason, "Quality changed");
            self.events.publish(PlayerEvent::QualityChanged { label, auto, reason });
        }
    }

    fn apply_engine_event(&self, event: EngineEvent) {
        if self.is_disposed() || self.state().is_terminal() {
            debug!(mount_id = %self.id, ?event, "Event after teardown ignored");
            return;
        }

        match event {
            EngineEvent::ManifestReady { levels } => self.on_manifest(levels),
            EngineEvent::LevelChanged { index } => {
                self.quality_tx.send_if_modified(|quality| {
                    let changed = quality.active_level != Some(index);
                    quality.active_level = Some(index);
                    changed
                });
                debug!(mount_id = %self.id, index, "Level switched");
            }
            EngineEvent::BufferStateChanged { buffering } => {
                let changed = self.quality_tx.send_if_modified(|quality| {
                    let changed = quality.is_buffering != buffering;
                    quality.is_buffering = buffering;
                    changed
                });
                let target = if buffering {
                    EngineState::Buffering
                } else {
                    EngineState::Playing
                };
                self.set_state(target);
                if changed {
                    self.events.publish(PlayerEvent::BufferingChanged { buffering });
                }
            }
            EngineEvent::FragmentLoaded {
                bandwidth_estimate_bps: Some(bps),
            } => {
                self.quality_tx.send_if_modified(|quality| {
                    let changed = quality.last_bandwidth_estimate_bps != bps;
                    quality.last_bandwidth_estimate_bps = bps;
                    changed
                });
            }
            EngineEvent::FragmentLoaded { .. } => {}
            EngineEvent::FatalError { category, details } => self.on_fatal(category, details),
        }
    }

    fn on_manifest(&self, levels: Vec<QualityLevel>) {
        let count = levels.len();
        let command = self.policy.lock().on_levels(levels.clone());
        if let Some(command) = command {
            self.apply_level(command);
        }
        self.set_state(EngineState::Ready);
        info!(mount_id = %self.id, levels = count, ?command, "Manifest ready");
        self.events.publish(PlayerEvent::LevelsReady { levels });

        let reason = match command {
            Some(LevelCommand::Pin(_)) => QualityChangeReason::Initial,
            _ => QualityChangeReason::Abr,
        };
        self.sync_quality(reason);
    }

    fn on_fatal(&self, category: ErrorCategory, details: String) {
        match AbrPolicy::recovery_for(&category) {
            Recovery::ResumeLoad => {
                warn!(mount_id = %self.id, %category, details = %details, "Fatal network error, resuming load");
                if let Some(client) = self.client() {
                    client.start_load();
                }
                self.events.publish(PlayerEvent::Recovering { category, details });
            }
            Recovery::RecoverMedia => {
                warn!(mount_id = %self.id, %category, details = %details, "Fatal media error, recovering");
                if let Some(client) = self.client() {
                    client.recover_media_error();
                }
                self.events.publish(PlayerEvent::Recovering { category, details });
            }
            Recovery::Destroy => {
                error!(mount_id = %self.id, %category, details = %details, "Unrecoverable error, client destroyed");
                self.cancel_refresh();
                let client = self.client.lock().take();
                if let Some(client) = client {
                    client.destroy();
                }
                self.set_state(EngineState::Failed);
                self.events.publish(PlayerEvent::Failed { category, details });
            }
        }
    }

    fn cancel_refresh(&self) {
        if let Some(task) = self.refresh.lock().take() {
            task.abort();
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel_refresh();
        let client = self.client.lock().take();
        if let Some(client) = client {
            client.destroy();
        }
        let style = self.style.lock().take();
        drop(style);
        let views = self.views.lock().take();
        drop(views);
        self.surface.release();

        self.set_state(EngineState::Disposed);
        info!(mount_id = %self.id, "Player disposed");
        self.events.publish(PlayerEvent::Disposed);
    }
}

/// A mounted player
pub struct Player {
    host: PlayerHost,
    mount: Arc<Mount>,
}

impl Player {
    /// Mount `options` on the host's surface
    #[instrument(skip(host), fields(src = %options.src))]
    pub fn mount(options: PlayerOptions, host: PlayerHost) -> Result<Self> {
        let mount = Mount::create(options, &host)?;
        Ok(Self { host, mount })
    }

    /// Tear down and mount again if any playback option changed. Returns
    /// whether a remount happened.
    #[instrument(skip(self, options), fields(mount_id = %self.mount.id))]
    pub fn remount(&mut self, options: PlayerOptions) -> Result<bool> {
        if !self.mount.options.requires_remount(&options) {
            debug!("Options unchanged, keeping mount");
            return Ok(false);
        }
        options.validate()?;
        self.mount.dispose();
        self.mount = Mount::create(options, &self.host)?;
        Ok(true)
    }

    /// Feed a raw streaming client callback
    pub fn handle_client_event(&self, event: &ClientEvent) {
        if let Some(event) = translate(event) {
            self.mount.apply_engine_event(event);
        }
    }

    /// Feed an already translated engine event
    pub fn apply_engine_event(&self, event: EngineEvent) {
        self.mount.apply_engine_event(event);
    }

    /// Feed a media element notification
    pub fn handle_media_event(&self, event: MediaEvent) {
        if self.mount.is_disposed() {
            return;
        }
        if let Some(views) = self.mount.views.lock().as_ref() {
            views.handle_media_event(event);
        }
    }

    /// Manual quality selection; `-1` returns to automatic
    pub fn select_quality(&self, index: i32) -> Result<()> {
        if self.mount.is_disposed() {
            return Err(Error::Disposed);
        }
        if self.mount.state().is_terminal() {
            return Err(Error::MountFailed);
        }
        self.mount.cancel_refresh();
        let command = self.mount.policy.lock().select(index)?;
        self.mount.apply_level(command);
        self.mount.sync_quality(QualityChangeReason::Manual);
        Ok(())
    }

    /// Nudge the client's estimator: command the lowest level, then return
    /// to automatic after the refresh delay. No-op while pinned. Returns
    /// whether a refresh started.
    pub fn force_refresh(&self) -> bool {
        let mount = &self.mount;
        if mount.is_disposed() || mount.client().is_none() {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(mount_id = %mount.id, "No runtime, refresh skipped");
            return false;
        };
        let Some((lowest, token)) = mount.policy.lock().begin_refresh() else {
            return false;
        };

        mount.apply_level(LevelCommand::Pin(lowest));
        debug!(mount_id = %mount.id, lowest, "Refresh started");

        let weak: Weak<Mount> = Arc::downgrade(mount);
        let delay = mount.timings.abr_refresh_delay();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(mount) = weak.upgrade() else {
                return;
            };
            if mount.is_disposed() || !mount.policy.lock().finish_refresh(token) {
                return;
            }
            mount.apply_level(LevelCommand::Auto);
            debug!(mount_id = %mount.id, "Refresh reverted to auto");
        });

        if let Some(previous) = mount.refresh.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Release the client, styles, listeners and timers. Idempotent.
    pub fn dispose(&self) {
        self.mount.dispose();
    }

    pub fn id(&self) -> MountId {
        self.mount.id
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.mount.options
    }

    pub fn state(&self) -> EngineState {
        self.mount.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.mount.state_tx.subscribe()
    }

    pub fn quality(&self) -> PlaybackQualityState {
        self.mount.quality_tx.borrow().clone()
    }

    pub fn subscribe_quality(&self) -> watch::Receiver<PlaybackQualityState> {
        self.mount.quality_tx.subscribe()
    }

    /// Levels in client order
    pub fn levels(&self) -> Vec<QualityLevel> {
        self.mount.policy.lock().levels().to_vec()
    }

    /// Levels tallest first, for the quality menu
    pub fn display_levels(&self) -> Vec<QualityLevel> {
        sorted_for_display(self.mount.policy.lock().levels())
    }

    /// True on the native playback fallback
    pub fn is_native(&self) -> bool {
        self.mount.native
    }

    /// Server-confirmed view count for this mount's video
    pub fn view_count(&self) -> Option<u64> {
        self.mount.views.lock().as_ref().and_then(ViewCounter::view_count)
    }

    pub fn subscribe_view_count(&self) -> Option<watch::Receiver<Option<u64>>> {
        self.mount.views.lock().as_ref().map(ViewCounter::subscribe_count)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEventRecord> {
        self.mount.events.subscribe()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.mount.dispose();
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.mount.id)
            .field("src", &self.mount.options.src)
            .field("state", &self.mount.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::translate::{BUFFER_APPENDED, BUFFER_CREATED, ERROR, LEVEL_SWITCHED, MANIFEST_PARSED};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        levels: Mutex<Vec<(&'static str, i32)>>,
        start_load: AtomicUsize,
        recover: AtomicUsize,
        destroy: AtomicUsize,
    }

    struct Client(Arc<Calls>);

    impl StreamingClient for Client {
        fn load_source(&self, _url: &str) {}
        fn attach_media(&self) {}
        fn set_current_level(&self, index: i32) {
            self.0.levels.lock().push(("current", index));
        }
        fn set_next_level(&self, index: i32) {
            self.0.levels.lock().push(("next", index));
        }
        fn start_load(&self) {
            self.0.start_load.fetch_add(1, Ordering::SeqCst);
        }
        fn recover_media_error(&self) {
            self.0.recover.fetch_add(1, Ordering::SeqCst);
        }
        fn destroy(&self) {
            self.0.destroy.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Factory {
        supported: bool,
        calls: Arc<Calls>,
    }

    impl ClientFactory for Factory {
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn create(&self, _config: &ClientConfig) -> Result<Arc<dyn StreamingClient>> {
            Ok(Arc::new(Client(self.calls.clone())))
        }
    }

    #[derive(Default)]
    struct Surface {
        source: Mutex<Option<String>>,
        styles: AtomicUsize,
        released: AtomicUsize,
    }

    impl MediaSurface for Surface {
        fn set_source(&self, url: &str) {
            *self.source.lock() = Some(url.to_string());
        }
        fn duration(&self) -> Option<f64> {
            None
        }
        fn inject_style(&self, _id: &str, _css: &str) {
            self.styles.fetch_add(1, Ordering::SeqCst);
        }
        fn remove_style(&self, _id: &str) {
            self.styles.fetch_sub(1, Ordering::SeqCst);
        }
        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn host(supported: bool) -> (PlayerHost, Arc<Calls>, Arc<Surface>) {
        let calls = Arc::new(Calls::default());
        let surface = Arc::new(Surface::default());
        let factory = Arc::new(Factory {
            supported,
            calls: calls.clone(),
        });
        (PlayerHost::new(factory, surface.clone()), calls, surface)
    }

    fn manifest() -> ClientEvent {
        ClientEvent::new(
            MANIFEST_PARSED,
            json!({ "levels": [
                { "height": 1080, "width": 1920, "bitrate": 5000000 },
                { "height": 480, "width": 854, "bitrate": 1200000 }
            ]}),
        )
    }

    #[test]
    fn test_state_follows_client_events() {
        let (host, _, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        assert_eq!(player.state(), EngineState::Initializing);

        player.handle_client_event(&manifest());
        assert_eq!(player.state(), EngineState::Ready);

        player.handle_client_event(&ClientEvent::new(BUFFER_CREATED, json!({})));
        assert_eq!(player.state(), EngineState::Buffering);
        assert!(player.quality().is_buffering);

        player.handle_client_event(&ClientEvent::new(BUFFER_APPENDED, json!({})));
        assert_eq!(player.state(), EngineState::Playing);
        assert!(!player.quality().is_buffering);
    }

    #[test]
    fn test_start_level_pinned_after_manifest() {
        let (host, calls, _) = host(true);
        let options = PlayerOptions::new("a.m3u8").with_abr(false).with_start_level(1);
        let player = Player::mount(options, host).unwrap();

        player.handle_client_event(&manifest());
        assert_eq!(*calls.levels.lock(), vec![("next", 1), ("current", 1)]);
        assert_eq!(player.quality().current_quality_name, "480p");
        assert!(!player.quality().is_auto);
    }

    #[test]
    fn test_select_quality_labels() {
        let (host, calls, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());

        player.select_quality(1).unwrap();
        assert_eq!(player.quality().current_quality_name, "480p");
        player.select_quality(-1).unwrap();
        assert_eq!(player.quality().current_quality_name, "Auto");
        assert_eq!(calls.levels.lock().last(), Some(&("current", -1)));

        assert!(matches!(player.select_quality(4), Err(Error::UnknownLevel { .. })));
        assert_eq!(player.quality().current_quality_name, "Auto");
    }

    #[test]
    fn test_new_manifest_without_pinned_level_unpins_client() {
        let (host, calls, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());
        player.select_quality(1).unwrap();
        assert_eq!(calls.levels.lock().last(), Some(&("current", 1)));

        player.handle_client_event(&ClientEvent::new(
            MANIFEST_PARSED,
            json!({ "levels": [{ "height": 720, "width": 1280, "bitrate": 2800000 }] }),
        ));
        assert_eq!(calls.levels.lock().last(), Some(&("current", -1)));
        assert!(player.quality().is_auto);
        assert_eq!(player.quality().current_quality_name, "Auto");
    }

    #[test]
    fn test_active_level_tracked_in_auto() {
        let (host, _, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());
        player.handle_client_event(&ClientEvent::new(LEVEL_SWITCHED, json!({ "level": 0 })));

        let quality = player.quality();
        assert_eq!(quality.active_level, Some(0));
        assert_eq!(quality.current_quality_name, "Auto");
    }

    #[test]
    fn test_native_fallback() {
        let (host, calls, surface) = host(false);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        assert!(player.is_native());
        assert_eq!(player.state(), EngineState::Ready);
        assert_eq!(surface.source.lock().as_deref(), Some("a.m3u8"));
        assert!(player.levels().is_empty());
        assert!(!player.force_refresh());

        drop(player);
        assert_eq!(calls.destroy.load(Ordering::SeqCst), 0);
        assert_eq!(surface.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_media_and_other_fatal_errors() {
        let (host, calls, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());

        player.handle_client_event(&ClientEvent::new(
            ERROR,
            json!({ "fatal": true, "type": "mediaError", "details": "bufferAppendError" }),
        ));
        assert_eq!(calls.recover.load(Ordering::SeqCst), 1);
        assert_eq!(player.state(), EngineState::Ready);

        player.handle_client_event(&ClientEvent::new(
            ERROR,
            json!({ "fatal": true, "type": "otherError", "details": "internalException" }),
        ));
        assert_eq!(calls.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(player.state(), EngineState::Failed);

        // The client is gone, so the menu must not claim a new level
        let levels_before = calls.levels.lock().len();
        assert!(matches!(player.select_quality(1), Err(Error::MountFailed)));
        assert_eq!(player.quality().current_quality_name, "Auto");
        assert_eq!(calls.levels.lock().len(), levels_before);
        assert!(!player.force_refresh());

        // Terminal: later events and dispose do not touch the client again
        player.handle_client_event(&manifest());
        assert_eq!(player.state(), EngineState::Failed);
        player.dispose();
        assert_eq!(calls.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(player.state(), EngineState::Disposed);
    }

    #[test]
    fn test_dispose_is_idempotent_and_removes_style() {
        let (host, calls, surface) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        assert_eq!(surface.styles.load(Ordering::SeqCst), 1);

        player.dispose();
        player.dispose();
        drop(player);
        assert_eq!(calls.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(surface.styles.load(Ordering::SeqCst), 0);
        assert_eq!(surface.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remount_only_on_change() {
        let (host, calls, surface) = host(true);
        let mut player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        let first = player.id();

        assert!(!player.remount(PlayerOptions::new("a.m3u8")).unwrap());
        assert_eq!(player.id(), first);

        assert!(player.remount(PlayerOptions::new("b.m3u8")).unwrap());
        assert_ne!(player.id(), first);
        assert_eq!(calls.destroy.load(Ordering::SeqCst), 1);
        assert_eq!(surface.styles.load(Ordering::SeqCst), 1);
        assert_eq!(player.state(), EngineState::Initializing);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let (host, _, surface) = host(true);
        let err = Player::mount(PlayerOptions::new(""), host).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert_eq!(surface.styles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_reverts_to_auto() {
        let (host, calls, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());
        calls.levels.lock().clear();

        assert!(player.force_refresh());
        assert_eq!(*calls.levels.lock(), vec![("next", 1), ("current", 1)]);
        assert_eq!(player.quality().current_quality_name, "Auto");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.levels.lock().last(), Some(&("current", -1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_pin_cancels_refresh_revert() {
        let (host, calls, _) = host(true);
        let player = Player::mount(PlayerOptions::new("a.m3u8"), host).unwrap();
        player.handle_client_event(&manifest());

        assert!(player.force_refresh());
        player.select_quality(0).unwrap();
        assert!(!player.force_refresh());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.levels.lock().last(), Some(&("current", 0)));
        assert_eq!(player.quality().current_quality_name, "1080p");
    }
}
