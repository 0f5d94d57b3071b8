//! Test doubles for the streaming client and the media surface

#![allow(dead_code)]

use castline_core::engine::{ClientConfig, ClientFactory, MediaSurface, StreamingClient};
use castline_core::transport::memory::{MemoryConnector, MemoryServer};
use castline_core::{PlayerHost, Result, StreamTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Every call a client received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    LoadSource(String),
    AttachMedia,
    SetCurrentLevel(i32),
    SetNextLevel(i32),
    StartLoad,
    RecoverMediaError,
    Destroy,
}

#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<ClientCall>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &ClientCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: ClientCall) {
        self.calls.lock().push(call);
    }
}

pub struct RecordingClient {
    log: Arc<CallLog>,
}

impl StreamingClient for RecordingClient {
    fn load_source(&self, url: &str) {
        self.log.push(ClientCall::LoadSource(url.to_string()));
    }
    fn attach_media(&self) {
        self.log.push(ClientCall::AttachMedia);
    }
    fn set_current_level(&self, index: i32) {
        self.log.push(ClientCall::SetCurrentLevel(index));
    }
    fn set_next_level(&self, index: i32) {
        self.log.push(ClientCall::SetNextLevel(index));
    }
    fn start_load(&self) {
        self.log.push(ClientCall::StartLoad);
    }
    fn recover_media_error(&self) {
        self.log.push(ClientCall::RecoverMediaError);
    }
    fn destroy(&self) {
        self.log.push(ClientCall::Destroy);
    }
}

/// Factory whose clients all write to one shared log
#[derive(Default)]
pub struct RecordingFactory {
    pub log: Arc<CallLog>,
    pub configs: Mutex<Vec<ClientConfig>>,
}

impl ClientFactory for RecordingFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn StreamingClient>> {
        self.configs.lock().push(config.clone());
        Ok(Arc::new(RecordingClient {
            log: Arc::clone(&self.log),
        }))
    }
}

#[derive(Default)]
pub struct FakeSurface {
    pub source: Mutex<Option<String>>,
    pub duration: Mutex<Option<f64>>,
    pub styles: Mutex<HashMap<String, String>>,
    pub releases: Mutex<usize>,
}

impl MediaSurface for FakeSurface {
    fn set_source(&self, url: &str) {
        *self.source.lock() = Some(url.to_string());
    }
    fn duration(&self) -> Option<f64> {
        *self.duration.lock()
    }
    fn inject_style(&self, id: &str, css: &str) {
        self.styles.lock().insert(id.to_string(), css.to_string());
    }
    fn remove_style(&self, id: &str) {
        self.styles.lock().remove(id);
    }
    fn release(&self) {
        *self.releases.lock() += 1;
    }
}

pub struct Harness {
    pub factory: Arc<RecordingFactory>,
    pub surface: Arc<FakeSurface>,
    pub transport: StreamTransport,
    pub server: MemoryServer,
}

impl Harness {
    /// Connected transport plus recording client and surface
    pub async fn connected() -> Self {
        let (connector, server) = MemoryConnector::new();
        let transport = StreamTransport::new(Arc::new(connector));
        transport.connect().await;
        Self {
            factory: Arc::new(RecordingFactory::default()),
            surface: Arc::new(FakeSurface::default()),
            transport,
            server,
        }
    }

    pub fn host(&self) -> PlayerHost {
        PlayerHost::new(self.factory.clone(), self.surface.clone()).with_transport(self.transport.clone())
    }

    pub fn log(&self) -> &CallLog {
        &self.factory.log
    }
}

/// Let spawned reader tasks run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
