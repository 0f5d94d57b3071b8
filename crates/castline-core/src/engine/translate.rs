//! Client event translation
//!
//! Event names and payload fields follow hls.js. Anything not listed here
//! is dropped.

use super::{ClientEvent, EngineEvent};
use crate::types::{ErrorCategory, QualityLevel};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const MANIFEST_PARSED: &str = "hlsManifestParsed";
pub const LEVEL_SWITCHED: &str = "hlsLevelSwitched";
pub const BUFFER_CREATED: &str = "hlsBufferCreated";
pub const BUFFER_APPENDED: &str = "hlsBufferAppended";
pub const FRAG_LOADED: &str = "hlsFragLoaded";
pub const ERROR: &str = "hlsError";

const BUFFER_STALLED: &str = "bufferStalledError";

#[derive(Deserialize)]
struct RawLevel {
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    bitrate: Option<u64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    fatal: bool,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

fn parse_levels(data: &Value) -> Vec<QualityLevel> {
    let Some(raw) = data.get("levels").and_then(Value::as_array) else {
        return Vec::new();
    };
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            let level = serde_json::from_value::<RawLevel>(value.clone()).unwrap_or(RawLevel {
                height: None,
                width: None,
                bitrate: None,
                name: None,
            });
            QualityLevel {
                height: level.height.unwrap_or(0),
                width: level.width.unwrap_or(0),
                bitrate_bps: level.bitrate.unwrap_or(0),
                name: level.name.filter(|n| !n.is_empty()),
                index,
            }
        })
        .collect()
}

fn category(kind: Option<&str>) -> ErrorCategory {
    match kind {
        Some("networkError") => ErrorCategory::Network,
        Some("mediaError") => ErrorCategory::Media,
        Some(other) => ErrorCategory::Other(other.to_string()),
        None => ErrorCategory::Other("unknown".to_string()),
    }
}

/// Translate a raw client callback into an [`EngineEvent`]
pub fn translate(event: &ClientEvent) -> Option<EngineEvent> {
    match event.kind.as_str() {
        MANIFEST_PARSED => Some(EngineEvent::ManifestReady {
            levels: parse_levels(&event.data),
        }),
        LEVEL_SWITCHED => event
            .data
            .get("level")
            .and_then(Value::as_u64)
            .and_then(|level| usize::try_from(level).ok())
            .map(|index| EngineEvent::LevelChanged { index }),
        BUFFER_CREATED => Some(EngineEvent::BufferStateChanged { buffering: true }),
        BUFFER_APPENDED => Some(EngineEvent::BufferStateChanged { buffering: false }),
        FRAG_LOADED => Some(EngineEvent::FragmentLoaded {
            bandwidth_estimate_bps: event
                .data
                .pointer("/frag/stats/bwEstimate")
                .or_else(|| event.data.get("bandwidthEstimate"))
                .and_then(Value::as_f64)
                .filter(|bps| bps.is_finite() && *bps > 0.0)
                .map(|bps| bps as u64),
        }),
        ERROR => {
            let raw: RawError = serde_json::from_value(event.data.clone()).ok()?;
            let details = raw.details.unwrap_or_default();
            if raw.fatal {
                Some(EngineEvent::FatalError {
                    category: category(raw.kind.as_deref()),
                    details,
                })
            } else if details == BUFFER_STALLED {
                Some(EngineEvent::BufferStateChanged { buffering: true })
            } else {
                debug!(details = %details, "Ignoring non-fatal client error");
                None
            }
        }
        other => {
            debug!(kind = other, "Ignoring client event");
            None
        }
    }
}
