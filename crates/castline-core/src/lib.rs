//! Castline Core - playback control library for Castline
//!
//! This crate provides the logic layered over a segmented-streaming client:
//! - Shared realtime transport with per-feature listener ownership
//! - Client event translation and the per-mount player state machine
//! - Quality policy (automatic, manual pins, refresh nudge, recovery)
//! - At-most-once view counting per watch session
//! - Broadcaster start/end requests with acknowledgement and timeout
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Castline Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Engine    │  │     ABR      │  │    Theme     │           │
//! │  │  Translate   │  │    Policy    │  │    Guard     │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Player    │                              │
//! │                    │   (mount)   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │     Live     │  │    View     │  │    Event     │            │
//! │  │   Control    │  │   Counter   │  │     Bus      │            │
//! │  └──────┬───────┘  └──────┬──────┘  └──────────────┘            │
//! │         └────────┬────────┘                                     │
//! │           ┌──────┴──────┐                                       │
//! │           │  Transport  │                                       │
//! │           └─────────────┘                                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod transport;
pub mod engine;
pub mod abr;
pub mod views;
pub mod live;
pub mod events;
pub mod theme;
pub mod player;
pub mod manifest;

pub use error::{Error, Result};
pub use types::*;
pub use config::{ClientSettings, PlayerOptions, Timings};
pub use transport::{Connector, StreamTransport, Subscription};
pub use engine::{ClientEvent, ClientFactory, EngineEvent, MediaEvent, MediaSurface, StreamingClient};
pub use abr::{AbrPolicy, LevelCommand, QualityMode, Recovery};
pub use views::{ViewCounter, WatchSession};
pub use live::LiveControl;
pub use events::{EventBus, PlayerEvent, PlayerEventRecord};
pub use theme::PlayerTheme;
pub use player::{Player, PlayerHost};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Castline Core initialized");
}
