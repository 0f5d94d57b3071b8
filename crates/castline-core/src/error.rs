//! Error types for Castline Core

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Castline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Castline error types
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("No acknowledgement for `{event}` within {timeout:?}")]
    RequestTimeout { event: String, timeout: Duration },

    #[error("Server rejected the request: {0}")]
    StreamRejected(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Playback errors
    #[error("Unknown quality level {index} ({available} available)")]
    UnknownLevel { index: i32, available: usize },

    #[error("Player is disposed")]
    Disposed,

    #[error("Player failed, remount to play again")]
    MountFailed,

    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(#[from] reqwest::Error),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the caller may retry the same operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::ConnectionLost
                | Error::RequestTimeout { .. }
                | Error::WebSocket(_)
                | Error::ManifestFetch(_)
        )
    }

    /// Returns the error code for notifications and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "TRANSPORT",
            Error::ConnectionLost => "CONNECTION_LOST",
            Error::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            Error::StreamRejected(_) => "STREAM_REJECTED",
            Error::WebSocket(_) => "WEBSOCKET",
            Error::UnknownLevel { .. } => "UNKNOWN_LEVEL",
            Error::Disposed => "DISPOSED",
            Error::MountFailed => "MOUNT_FAILED",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }

    /// Text for the transient notification shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Error::ConnectionLost => {
                "Connection lost. Please reconnect and try again.".to_string()
            }
            Error::RequestTimeout { .. } => {
                "The server did not respond in time. Please try again.".to_string()
            }
            Error::StreamRejected(reason) => format!("Stream request failed: {reason}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ConnectionLost.is_recoverable());
        assert!(Error::RequestTimeout {
            event: "startStream".into(),
            timeout: Duration::from_secs(10),
        }
        .is_recoverable());
        assert!(!Error::StreamRejected("denied".into()).is_recoverable());
        assert!(!Error::Disposed.is_recoverable());
        assert!(!Error::MountFailed.is_recoverable());
        assert_eq!(Error::MountFailed.error_code(), "MOUNT_FAILED");
    }

    #[test]
    fn test_user_message_carries_server_reason() {
        let err = Error::StreamRejected("stream key revoked".into());
        assert_eq!(err.error_code(), "STREAM_REJECTED");
        assert!(err.user_message().contains("stream key revoked"));
    }
}
