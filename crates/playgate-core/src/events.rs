//! Page-facing player events
//!
//! The player records events synchronously into an [`EventLog`]; the host
//! drains it after every call. With the `runtime` feature the session forwards
//! drained records through an [`EventEmitter`] channel.

use crate::gate::LockReason;
use crate::types::{EngineState, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "runtime")]
use tokio::sync::{mpsc, RwLock};
#[cfg(feature = "runtime")]
use tracing::{debug, warn};

/// Events surfaced to the surrounding page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Source attached and playable (`onReady`)
    Ready,

    /// Playback failed (`onError`)
    Error { message: String },

    /// Preview gate armed on first play (`onPreviewStart`)
    PreviewStart {
        limit_seconds: f64,
        remaining_seconds: f64,
        remaining_today: Option<u32>,
    },

    /// Preview budget or daily quota spent (`onGateLocked`)
    GateLocked {
        reason: LockReason,
        effective_elapsed: f64,
        content_label: Option<String>,
        upgrade_href: Option<String>,
        remaining_today: Option<u32>,
    },

    /// Redirect timer armed
    RedirectScheduled { href: String, delay_ms: u64 },

    /// Redirect timer fired; the page navigates
    Redirect { href: String },

    /// Entitlement confirmed, gate disarmed
    Unlocked,

    StateChange { from: EngineState, to: EngineState },

    QualityChange { index: usize, height: u32 },

    Buffering { active: bool },

    ControlsVisibility { visible: bool },
}

/// Event with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEventRecord {
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    #[serde(flatten)]
    pub event: PlayerEvent,
}

/// Ordered outbox of events for one player
#[derive(Debug, Clone)]
pub struct EventLog {
    session_id: SessionId,
    sequence: u64,
    pending: Vec<PlayerEventRecord>,
}

impl EventLog {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            sequence: 0,
            pending: Vec::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn record(&mut self, event: PlayerEvent) {
        self.sequence += 1;
        self.pending.push(PlayerEventRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            sequence: self.sequence,
            event,
        });
    }

    pub fn drain(&mut self) -> Vec<PlayerEventRecord> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Forwards event records to a consumer task and keeps a bounded history
#[cfg(feature = "runtime")]
pub struct EventEmitter {
    event_tx: mpsc::Sender<PlayerEventRecord>,
    history: RwLock<Vec<PlayerEventRecord>>,
    max_history: usize,
}

#[cfg(feature = "runtime")]
impl EventEmitter {
    /// Create an emitter and the receiving end for the page
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PlayerEventRecord>) {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let emitter = Self {
            event_tx,
            history: RwLock::new(Vec::new()),
            max_history: 256,
        };
        (emitter, event_rx)
    }

    pub async fn emit(&self, record: PlayerEventRecord) {
        debug!(sequence = record.sequence, event = ?record.event, "Player event");

        {
            let mut history = self.history.write().await;
            history.push(record.clone());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(..excess);
            }
        }

        if self.event_tx.send(record).await.is_err() {
            warn!("Event receiver dropped");
        }
    }

    pub async fn emit_all(&self, records: Vec<PlayerEventRecord>) {
        for record in records {
            self.emit(record).await;
        }
    }

    /// Recently emitted events, oldest first
    pub async fn history(&self) -> Vec<PlayerEventRecord> {
        self.history.read().await.clone()
    }

    pub async fn clear(&self) {
        self.history.write().await.clear();
    }
}
