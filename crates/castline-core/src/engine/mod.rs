//! Playback engine boundary
//!
//! The segmented-streaming client (hls.js in the browser build) and the
//! media element sit behind [`StreamingClient`] and [`MediaSurface`]. Raw
//! client callbacks arrive as duck-typed [`ClientEvent`]s and are
//! translated once, in [`translate`], into the closed [`EngineEvent`] union
//! the rest of the crate works with.

pub mod translate;

pub use translate::translate;

use crate::{
    types::{ErrorCategory, QualityLevel},
    Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Configuration handed to the client at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// First level to load; `-1` lets the client decide
    pub start_level: i32,
    /// Forward buffer target in seconds
    pub max_buffer_length: f64,
    /// Start fetching segments as soon as the manifest is parsed
    pub auto_start_load: bool,
}

/// Commands the player issues to the segmented-streaming client
pub trait StreamingClient: Send + Sync {
    /// Point the client at a playlist URL
    fn load_source(&self, url: &str);
    /// Bind the client to the media surface
    fn attach_media(&self);
    /// Switch immediately; `-1` hands control back to the client
    fn set_current_level(&self, index: i32);
    /// Level to use for the next fragment
    fn set_next_level(&self, index: i32);
    /// Resume loading after a network failure
    fn start_load(&self);
    /// Rebuild the media pipeline after a decode failure
    fn recover_media_error(&self);
    /// Release every resource held by the client
    fn destroy(&self);
}

/// Creates streaming clients for the current platform
pub trait ClientFactory: Send + Sync {
    /// False where the client cannot run (native HLS playback is used)
    fn is_supported(&self) -> bool;
    fn create(&self, config: &ClientConfig) -> Result<Arc<dyn StreamingClient>>;
}

/// The media element a player renders into
pub trait MediaSurface: Send + Sync {
    /// Native playback path: assign the URL directly
    fn set_source(&self, url: &str);
    /// Duration in seconds, if the element knows it yet
    fn duration(&self) -> Option<f64>;
    /// Add a stylesheet under `id`
    fn inject_style(&self, id: &str, css: &str);
    /// Remove the stylesheet added under `id`
    fn remove_style(&self, id: &str);
    /// Detach the source; the surface may be reused by a later mount
    fn release(&self);
}

/// A raw client callback: event name plus untyped payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Application-level playback events
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Manifest parsed; levels in library order
    ManifestReady { levels: Vec<QualityLevel> },
    /// The client switched to a level
    LevelChanged { index: usize },
    /// Buffer filling (`true`) or media flowing (`false`)
    BufferStateChanged { buffering: bool },
    /// A fragment arrived, with the client's bandwidth estimate if reported
    FragmentLoaded { bandwidth_estimate_bps: Option<u64> },
    /// Unrecoverable-by-the-client error
    FatalError { category: ErrorCategory, details: String },
}

/// Media element notifications the player listens to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    Play,
    Pause,
    Seeking,
    Seeked { position: f64 },
    TimeUpdate { position: f64 },
    Ended,
}
