//! Transport error taxonomy and bounded retry policy
//!
//! Network, manifest and fragment failures each draw from their own retry
//! budget and restart loading; media failures reset the decoder. This holds
//! for fatal errors too. Only an exhausted budget or a fatal error of no known
//! class (unsupported source) surfaces as a playback failure.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Where a transport error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Variant/level playlist or generic request failure
    Network,
    /// Master playlist load or parse
    Manifest,
    /// Media segment load
    Fragment,
    /// Decode pipeline / buffer append
    Media,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Manifest => write!(f, "manifest"),
            TransportErrorKind::Fragment => write!(f, "fragment"),
            TransportErrorKind::Media => write!(f, "media"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Error reported by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// The adaptive client gave up (or the element reported an unsupported source)
    pub fatal: bool,
    #[serde(default)]
    pub details: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, fatal: bool, details: impl Into<String>) -> Self {
        Self { kind, fatal, details: details.into() }
    }

    pub fn recoverable(kind: TransportErrorKind, details: impl Into<String>) -> Self {
        Self::new(kind, false, details)
    }

    pub fn fatal(kind: TransportErrorKind, details: impl Into<String>) -> Self {
        Self::new(kind, true, details)
    }
}

/// Retry settings for one request class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub retry_delay_ms: u64,
}

impl RetryBudget {
    pub const fn new(max_retries: u32, timeout_ms: u64, retry_delay_ms: u64) -> Self {
        Self { max_retries, timeout_ms, retry_delay_ms }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Exponential backoff, capped at 8x the base delay
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(3);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }
}

/// Retry policy handed to the adaptive client when it is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub network: RetryBudget,
    pub manifest: RetryBudget,
    pub fragment: RetryBudget,
    /// Decode pipeline resets before giving up
    pub media_recoveries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network: RetryBudget::new(4, 10_000, 1_000),
            manifest: RetryBudget::new(3, 10_000, 1_000),
            fragment: RetryBudget::new(6, 20_000, 1_000),
            media_recoveries: 2,
        }
    }
}

impl RetryPolicy {
    pub fn budget(&self, kind: TransportErrorKind) -> Option<&RetryBudget> {
        match kind {
            TransportErrorKind::Network => Some(&self.network),
            TransportErrorKind::Manifest => Some(&self.manifest),
            TransportErrorKind::Fragment => Some(&self.fragment),
            TransportErrorKind::Media | TransportErrorKind::Other => None,
        }
    }
}

/// What the engine should do about a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing to do, the client handles it
    Ignore,
    /// Restart loading from the current position
    RestartLoad,
    /// Reset the decode pipeline
    ResetDecoder,
    /// Give up, enter the error state
    Fail,
}

/// Counts recovery attempts per error class for one attached source
#[derive(Debug, Clone, Default)]
pub struct RecoveryTracker {
    policy: RetryPolicy,
    network: u32,
    manifest: u32,
    fragment: u32,
    media: u32,
}

impl RecoveryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, ..Default::default() }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Forget previous failures, e.g. after playback made progress
    pub fn reset(&mut self) {
        self.network = 0;
        self.manifest = 0;
        self.fragment = 0;
        self.media = 0;
    }

    /// Attempts spent on a given class
    pub fn attempts(&self, kind: TransportErrorKind) -> u32 {
        match kind {
            TransportErrorKind::Network => self.network,
            TransportErrorKind::Manifest => self.manifest,
            TransportErrorKind::Fragment => self.fragment,
            TransportErrorKind::Media => self.media,
            TransportErrorKind::Other => 0,
        }
    }

    /// Decide how to handle an error and record the attempt
    pub fn on_error(&mut self, error: &TransportError) -> RecoveryAction {
        let (counter, limit, action) = match error.kind {
            TransportErrorKind::Network => {
                (&mut self.network, self.policy.network.max_retries, RecoveryAction::RestartLoad)
            }
            TransportErrorKind::Manifest => {
                (&mut self.manifest, self.policy.manifest.max_retries, RecoveryAction::RestartLoad)
            }
            TransportErrorKind::Fragment => {
                (&mut self.fragment, self.policy.fragment.max_retries, RecoveryAction::RestartLoad)
            }
            TransportErrorKind::Media => {
                (&mut self.media, self.policy.media_recoveries, RecoveryAction::ResetDecoder)
            }
            TransportErrorKind::Other if error.fatal => {
                warn!(details = %error.details, "Unrecoverable transport error");
                return RecoveryAction::Fail;
            }
            TransportErrorKind::Other => return RecoveryAction::Ignore,
        };

        if *counter >= limit {
            warn!(kind = %error.kind, attempts = *counter, "Transport retries exhausted");
            return RecoveryAction::Fail;
        }

        *counter += 1;
        if error.fatal {
            warn!(kind = %error.kind, details = %error.details, attempt = *counter, limit, "Fatal transport error, recovering");
        } else {
            debug!(kind = %error.kind, attempt = *counter, limit, "Recovering from transport error");
        }
        action
    }
}
