//! Player notifications for the UI layer
//!
//! Every error outcome and state change a mount wants the UI to show is
//! published as a [`PlayerEventRecord`] on a broadcast channel. Nothing is
//! thrown across the callback boundary; the UI decides what to display.

use crate::types::{ErrorCategory, MountId, QualityLevel, VideoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Player notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Source attached
    Mounted { src: String, native: bool },

    /// Quality levels known
    LevelsReady { levels: Vec<QualityLevel> },

    /// Selector label changed
    QualityChanged {
        label: String,
        auto: bool,
        reason: QualityChangeReason,
    },

    /// Buffering toggled
    BufferingChanged { buffering: bool },

    /// A fatal client error is being recovered
    Recovering { category: ErrorCategory, details: String },

    /// The mount is finished and must be remounted to play again
    Failed { category: ErrorCategory, details: String },

    /// The view threshold was crossed and the increment request sent
    ViewCounted { video_id: VideoId },

    /// Server-confirmed view count
    ViewCountUpdated { video_id: VideoId, view_count: u64 },

    /// Mount released
    Disposed,
}

/// Why the quality label changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityChangeReason {
    /// Start level applied once levels were known
    Initial,
    /// User selection
    Manual,
    /// The client's estimator took over
    Abr,
}

/// Notification with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Mount that produced the event
    pub mount_id: MountId,
    pub timestamp: DateTime<Utc>,
    /// Per-bus sequence number
    pub sequence: u64,
    #[serde(flatten)]
    pub event: PlayerEvent,
}

/// Broadcast bus for player notifications. Clones share the channel and
/// the sequence counter.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEventRecord>,
    sequence: Arc<AtomicU64>,
    mount_id: MountId,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
            mount_id: MountId::new(),
        }
    }

    /// Handle on the same channel that stamps records with `mount_id`
    pub fn for_mount(&self, mount_id: MountId) -> Self {
        Self {
            tx: self.tx.clone(),
            sequence: Arc::clone(&self.sequence),
            mount_id,
        }
    }

    pub fn publish(&self, event: PlayerEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let record = PlayerEventRecord {
            id: Uuid::new_v4(),
            mount_id: self.mount_id,
            timestamp: Utc::now(),
            sequence,
            event,
        };
        trace!(sequence, event = ?record.event, "Player event");
        // No subscribers is fine
        let _ = self.tx.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEventRecord> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
