//! Error types for Playgate Core

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Manifest declares no quality levels")]
    NoQualityLevels,

    // Transport errors
    #[error("Transport retries exhausted for {kind} after {attempts} attempts")]
    RetriesExhausted { kind: String, attempts: u32 },

    #[error("Fatal media error: {0}")]
    FatalMedia(String),

    #[error("Request timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Playback is locked")]
    PlaybackLocked,

    #[error("Quality level {0} does not exist")]
    UnknownQualityLevel(usize),

    #[error("No source mounted")]
    NoSource,

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Entitlement errors
    #[error("Redeem failed: {0}")]
    Redeem(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Network errors
    #[cfg(feature = "runtime")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error may go away on retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ManifestFetch(_) | Error::Timeout { .. } => true,
            #[cfg(feature = "runtime")]
            Error::Network(e) => !e.is_status() || e.status().is_some_and(|s| s.is_server_error()),
            _ => false,
        }
    }

    /// Returns the error code for event records
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::NoQualityLevels => "NO_LEVELS",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::FatalMedia(_) => "FATAL_MEDIA",
            Error::Timeout { .. } => "TIMEOUT",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::PlaybackLocked => "LOCKED",
            Error::UnknownQualityLevel(_) => "UNKNOWN_LEVEL",
            Error::NoSource => "NO_SOURCE",
            Error::Storage(_) => "STORAGE",
            Error::Redeem(_) => "REDEEM",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            #[cfg(feature = "runtime")]
            Error::Network(_) => "NETWORK",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable() {
        assert!(Error::ManifestFetch("503".into()).is_recoverable());
        assert!(Error::Timeout { url: "https://a/b.m3u8".into(), timeout_ms: 10 }.is_recoverable());
        assert!(!Error::PlaybackLocked.is_recoverable());
        assert!(!Error::FatalMedia("decode".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::PlaybackLocked.error_code(), "LOCKED");
        assert_eq!(Error::NoQualityLevels.error_code(), "NO_LEVELS");
        assert_eq!(
            Error::InvalidStateTransition { from: "idle".into(), to: "playing".into() }.error_code(),
            "INVALID_STATE"
        );
    }
}
