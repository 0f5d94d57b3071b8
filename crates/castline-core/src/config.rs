//! Configuration for player mounts, protocol timings, and client endpoints

use crate::{types::VideoId, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for one player mount. Immutable for the lifetime of the mount;
/// changing any playback field means a full remount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerOptions {
    /// Stream URL (HLS playlist)
    pub src: String,
    /// Level to pin once levels are known (ignored when `abr` is on)
    pub start_level: Option<usize>,
    /// Let the streaming client pick levels
    pub abr: bool,
    /// Forward buffer target in seconds
    pub buffer_size_secs: f64,
    /// Video whose views this mount counts
    pub video_id: Option<VideoId>,
}

impl PlayerOptions {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            start_level: None,
            abr: true,
            buffer_size_secs: 30.0,
            video_id: None,
        }
    }

    pub fn with_start_level(mut self, level: usize) -> Self {
        self.start_level = Some(level);
        self
    }

    pub fn with_abr(mut self, abr: bool) -> Self {
        self.abr = abr;
        self
    }

    pub fn with_buffer_size(mut self, secs: f64) -> Self {
        self.buffer_size_secs = secs;
        self
    }

    pub fn with_video_id(mut self, video_id: VideoId) -> Self {
        self.video_id = Some(video_id);
        self
    }

    /// True when `other` needs the client torn down and rebuilt
    pub fn requires_remount(&self, other: &PlayerOptions) -> bool {
        self.src != other.src
            || self.start_level != other.start_level
            || self.abr != other.abr
            || self.buffer_size_secs != other.buffer_size_secs
            || self.video_id != other.video_id
    }

    pub fn validate(&self) -> Result<()> {
        if self.src.trim().is_empty() {
            return Err(Error::InvalidConfig("stream source is empty".into()));
        }
        if !(self.buffer_size_secs.is_finite() && self.buffer_size_secs > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "buffer size must be positive, got {}",
                self.buffer_size_secs
            )));
        }
        Ok(())
    }
}

/// Protocol timings and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// How long a start/end request waits for an acknowledgement
    pub live_request_timeout_ms: u64,
    /// Delay before a forced quality refresh returns to automatic
    pub abr_refresh_delay_ms: u64,
    /// Interval of the duration fallback probe
    pub duration_poll_interval_ms: u64,
    /// Total time the duration probe keeps trying
    pub duration_poll_timeout_ms: u64,
    /// Fraction of the duration that counts as a view
    pub view_threshold_ratio: f64,
    /// Seeking below this position restarts the watch session
    pub restart_threshold_secs: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            live_request_timeout_ms: 10_000,
            abr_refresh_delay_ms: 200,
            duration_poll_interval_ms: 500,
            duration_poll_timeout_ms: 10_000,
            view_threshold_ratio: 0.10,
            restart_threshold_secs: 3.0,
        }
    }
}

impl Timings {
    pub fn live_request_timeout(&self) -> Duration {
        Duration::from_millis(self.live_request_timeout_ms)
    }

    pub fn abr_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.abr_refresh_delay_ms)
    }

    pub fn duration_poll_interval(&self) -> Duration {
        Duration::from_millis(self.duration_poll_interval_ms.max(1))
    }

    /// Number of probe attempts before giving up
    pub fn duration_poll_attempts(&self) -> u64 {
        (self.duration_poll_timeout_ms / self.duration_poll_interval_ms.max(1)).max(1)
    }
}

/// Endpoint settings read from `CASTLINE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// Realtime socket endpoint (`CASTLINE_SOCKET_URL`)
    pub socket_url: String,
    /// Prefix prepended to stream keys to build playback URLs
    #[serde(default)]
    pub stream_url_prefix: Option<String>,
    /// REST API base URL
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Token attached when the socket connects
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl ClientSettings {
    pub fn from_env() -> Result<Self> {
        envy::prefixed("CASTLINE_")
            .from_env::<ClientSettings>()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Playback URL for a stream key
    pub fn stream_url(&self, stream_key: &str) -> String {
        match &self.stream_url_prefix {
            Some(prefix) => format!("{}/{}.m3u8", prefix.trim_end_matches('/'), stream_key),
            None => format!("{stream_key}.m3u8"),
        }
    }
}
