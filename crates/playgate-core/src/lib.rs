//! Playgate Core - Playback and Access-Control Engine
//!
//! This crate provides the client side of tiered streaming access:
//! - Stream resolution (obfuscated URLs, mixed-content upgrade, transport sniffing)
//! - An explicit playback engine state machine over a host media surface
//! - HLS master playlist parsing into discrete quality levels
//! - A preview gate that meters watch time and locks playback for good
//! - Controls, gestures and keyboard shortcuts that honor the lock
//! - Progress reporting for resumable viewing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Playgate Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Stream    │  │   Playback   │  │   Preview    │           │
//! │  │   Resolver   │─▶│    Engine    │◀─│     Gate     │           │
//! │  └──────────────┘  └──────┬───────┘  └──────┬───────┘           │
//! │                           │                 │                   │
//! │                    ┌──────┴─────────────────┴──┐                │
//! │                    │          Player           │                │
//! │                    └──────┬─────────────┬──────┘                │
//! │                           │             │                       │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌───┴──────────┐            │
//! │  │   Controls   │  │   Session   │  │  Floor Store │            │
//! │  │  & Gestures  │  │   (tokio)   │  │              │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Without the default `runtime` feature the crate has no tokio or reqwest
//! dependency and builds for `wasm32-unknown-unknown`.

pub mod error;
pub mod types;
pub mod config;
pub mod transport;
pub mod resolver;
pub mod manifest;
pub mod engine;
pub mod surface;
pub mod gate;
pub mod storage;
pub mod controls;
pub mod gestures;
pub mod events;
pub mod player;
pub mod entitlement;
pub mod progress;
#[cfg(feature = "runtime")]
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use config::{ConversionGateConfig, GateParams, GateSettings, PlayerConfig};
pub use transport::{RecoveryAction, RecoveryTracker, RetryBudget, RetryPolicy, TransportError, TransportErrorKind};
pub use resolver::StreamResolver;
pub use manifest::{capped_level, HlsParser, MasterManifest};
pub use engine::{EngineSignal, LevelSelection, PlaybackEngine};
pub use surface::{NullSurface, RecordingSurface};
pub use gate::{GateDecision, LockNotice, LockReason, PlaybackSample, PreviewGate, PreviewGateState, Redirect};
pub use storage::{FloorStore, JsonFileFloorStore, MemoryFloorStore};
pub use controls::{ControlAction, ControlOutcome, Controls};
pub use gestures::{key_action, GestureTracker, Viewport};
pub use events::{PlayerEvent, PlayerEventRecord};
pub use player::{MountRequest, Player, PlayerSnapshot};
pub use entitlement::{EntitlementProvider, RedeemResult, StaticEntitlement};
pub use progress::{ProgressApi, ProgressReporter, ProgressUpdate, ResumePosition};

#[cfg(feature = "runtime")]
pub use manifest::{HttpManifestLoader, ManifestLoader};
#[cfg(feature = "runtime")]
pub use events::EventEmitter;
#[cfg(feature = "runtime")]
pub use session::PlayerSession;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Playgate Core initialized");
}
