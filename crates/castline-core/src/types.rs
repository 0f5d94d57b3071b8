//! Core types for Castline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric video identifier used by the view-count events
pub type VideoId = u64;

/// Label shown while the streaming client chooses levels itself
pub const AUTO_LABEL: &str = "Auto";

/// Level index the streaming client interprets as "automatic selection"
pub const AUTO_LEVEL: i32 = -1;

/// Unique identifier for one player mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountId(pub Uuid);

impl MountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One rung of the quality ladder, as reported by the streaming client.
///
/// `index` is the client-assigned position in its level list and is only
/// meaningful for the manifest it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityLevel {
    /// Frame height in pixels (0 when unknown)
    #[serde(default)]
    pub height: u32,
    /// Frame width in pixels (0 when unknown)
    #[serde(default)]
    pub width: u32,
    /// Advertised bitrate in bits per second
    #[serde(default, alias = "bitrate")]
    pub bitrate_bps: u64,
    /// Name from the manifest, if any
    #[serde(default)]
    pub name: Option<String>,
    /// Library-assigned index used for selection
    pub index: usize,
}

impl QualityLevel {
    pub fn new(index: usize, width: u32, height: u32, bitrate_bps: u64) -> Self {
        Self {
            height,
            width,
            bitrate_bps,
            name: None,
            index,
        }
    }

    /// Human-readable label: `"{height}p"`, or `"Level {index}"` when the
    /// height is unknown
    pub fn display_name(&self) -> String {
        if self.height > 0 {
            format!("{}p", self.height)
        } else {
            format!("Level {}", self.index)
        }
    }
}

/// Sort levels for display (tallest first) without touching their indices
pub fn sorted_for_display(levels: &[QualityLevel]) -> Vec<QualityLevel> {
    let mut sorted = levels.to_vec();
    sorted.sort_by(|a, b| b.height.cmp(&a.height).then(a.index.cmp(&b.index)));
    sorted
}

/// Quality state observed by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackQualityState {
    /// Label for the quality selector
    pub current_quality_name: String,
    /// True while the client picks levels itself
    pub is_auto: bool,
    /// True while the client is filling its buffer
    pub is_buffering: bool,
    /// Last bandwidth estimate reported by the client
    pub last_bandwidth_estimate_bps: u64,
    /// Level the client last switched to, if any
    pub active_level: Option<usize>,
}

impl Default for PlaybackQualityState {
    fn default() -> Self {
        Self {
            current_quality_name: AUTO_LABEL.to_string(),
            is_auto: true,
            is_buffering: false,
            last_bandwidth_estimate_bps: 0,
            active_level: None,
        }
    }
}

/// Lifecycle of one player mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// Nothing attached yet
    Idle,
    /// Source handed to the client, waiting for the manifest
    Initializing,
    /// Quality levels known (or native playback attached)
    Ready,
    /// Media is flowing into the buffer
    Playing,
    /// Waiting for data
    Buffering,
    /// Client destroyed after an unrecoverable error; needs a fresh mount
    Failed,
    /// Released on unmount
    Disposed,
}

impl EngineState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, target),
            (Idle, Initializing) |
            (Initializing, Ready) | (Initializing, Failed) |
            (Ready, Playing) | (Ready, Buffering) | (Ready, Ready) | (Ready, Failed) |
            (Playing, Buffering) | (Playing, Ready) | (Playing, Failed) |
            (Buffering, Playing) | (Buffering, Ready) | (Buffering, Failed) |
            (_, Disposed)
        )
    }

    /// True once the mount can no longer play
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Failed | EngineState::Disposed)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Initializing => write!(f, "initializing"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Buffering => write!(f, "buffering"),
            EngineState::Failed => write!(f, "failed"),
            EngineState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Error category reported by the streaming client for fatal errors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Media,
    Other(String),
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Media => write!(f, "media"),
            ErrorCategory::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// Broadcast status carried by live-session requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Live,
    Ended,
}

/// Payload for starting or ending a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSessionRequest {
    pub stream_id: String,
    pub title: String,
    pub description: String,
    pub stream_url: String,
    pub status: StreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl LiveSessionRequest {
    /// Copy of this request marked as ended
    pub fn ended(&self) -> Self {
        Self {
            status: StreamStatus::Ended,
            ..self.clone()
        }
    }
}

/// Connection state of the shared transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Observable transport status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatus {
    pub state: ConnectionState,
    /// Identifier of the live connection, if any
    pub connection_id: Option<String>,
}

impl Default for TransportStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connection_id: None,
        }
    }
}
