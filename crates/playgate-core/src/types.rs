//! Core types for Playgate

use crate::transport::{RetryPolicy, TransportError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a restricted piece of content, independent of which mirror serves it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetId {
    /// e.g. "movie", "episode", "match"
    pub content_type: String,
    pub content_id: String,
}

impl AssetId {
    pub fn new(content_type: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_id: content_id.into(),
        }
    }

    /// Key used by the persisted floor store
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.content_type, self.content_id)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.content_type, self.content_id)
    }
}

/// Transport type declared by whoever configured the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    #[serde(alias = "m3u8", alias = "hls")]
    Segmented,
    #[serde(alias = "mpd", alias = "dash")]
    Manifest,
    #[serde(alias = "iframe", alias = "embed")]
    Frame,
    #[serde(alias = "video", alias = "mp4")]
    File,
    #[default]
    Auto,
}

impl DeclaredType {
    /// Concrete transport, or `None` for `Auto`
    pub fn concrete(self) -> Option<TransportType> {
        match self {
            DeclaredType::Segmented => Some(TransportType::Segmented),
            DeclaredType::Manifest => Some(TransportType::Manifest),
            DeclaredType::Frame => Some(TransportType::Frame),
            DeclaredType::File => Some(TransportType::File),
            DeclaredType::Auto => None,
        }
    }
}

impl std::str::FromStr for DeclaredType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "segmented" | "m3u8" | "hls" => Ok(DeclaredType::Segmented),
            "manifest" | "mpd" | "dash" => Ok(DeclaredType::Manifest),
            "frame" | "iframe" | "embed" => Ok(DeclaredType::Frame),
            "file" | "video" | "mp4" => Ok(DeclaredType::File),
            "auto" | "" => Ok(DeclaredType::Auto),
            other => Err(crate::Error::InvalidConfig(format!("unknown source type '{}'", other))),
        }
    }
}

/// Concrete transport a source is played through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Segmented adaptive stream (HLS)
    Segmented,
    /// Manifest-based stream (DASH)
    Manifest,
    /// Embedded third-party frame
    Frame,
    /// Progressive file
    File,
}

impl TransportType {
    /// Frames are opaque: no levels, no rate, no trustworthy clock
    pub fn has_media_element(&self) -> bool {
        !matches!(self, TransportType::Frame)
    }

    pub fn exposes_quality_levels(&self) -> bool {
        matches!(self, TransportType::Segmented)
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Segmented => write!(f, "segmented"),
            TransportType::Manifest => write!(f, "manifest"),
            TransportType::Frame => write!(f, "frame"),
            TransportType::File => write!(f, "file"),
        }
    }
}

/// A playable source as configured for a mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "type")]
    pub declared_type: Option<DeclaredType>,
    #[serde(default, alias = "isProtected")]
    pub is_obfuscated: bool,
}

impl StreamSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
            declared_type: None,
            is_obfuscated: false,
        }
    }

    pub fn with_type(mut self, declared_type: DeclaredType) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn obfuscated(mut self) -> Self {
        self.is_obfuscated = true;
        self
    }
}

impl From<&str> for StreamSource {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// Output of the stream resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSource {
    pub effective_url: String,
    pub transport_type: TransportType,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A discrete quality level exposed by a segmented source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Stable for the lifetime of one resolved source
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bitrate: u64,
}

impl QualityLevel {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Playback engine state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No source attached
    Idle,
    /// Transport attaching
    Loading,
    /// Source ready, waiting for a user-initiated play
    Ready,
    Playing,
    Paused,
    /// Overlay reported over Ready/Playing/Paused, never stored as the base state
    Buffering,
    Error,
    /// Commanded by the preview gate
    Locked,
}

impl EngineState {
    /// Check if transition of the base state machine is valid
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, target),
            // Teardown is always allowed
            (_, Idle) |
            (Idle, Loading) | (Idle, Locked) |
            (Loading, Ready) | (Loading, Error) | (Loading, Locked) |
            (Ready, Playing) | (Ready, Paused) | (Ready, Loading) | (Ready, Error) | (Ready, Locked) |
            (Playing, Paused) | (Playing, Loading) | (Playing, Error) | (Playing, Locked) |
            (Paused, Playing) | (Paused, Loading) | (Paused, Error) | (Paused, Locked) |
            (Error, Loading) | (Error, Locked) |
            // Only reachable through an explicit unlock
            (Locked, Loading)
        )
    }

    /// States in which the buffering overlay may be set
    pub fn accepts_buffering(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Playing | EngineState::Paused)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Playing => write!(f, "playing"),
            EngineState::Paused => write!(f, "paused"),
            EngineState::Buffering => write!(f, "buffering"),
            EngineState::Error => write!(f, "error"),
            EngineState::Locked => write!(f, "locked"),
        }
    }
}

/// Events reported by the host's media surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MediaEvent {
    /// Adaptive client parsed the master playlist
    ManifestParsed { levels: Vec<QualityLevel> },
    /// Progressive / native element has metadata
    LoadedMetadata { duration: Option<f64> },
    /// Embedded frame finished loading
    FrameLoaded,
    Play,
    Pause,
    Playing,
    Waiting,
    Ended,
    TimeUpdate { position: f64 },
    DurationChange { duration: f64 },
    VolumeChange { volume: f64, muted: bool },
    LevelSwitched { index: usize },
    /// `native` is true for OS-level (mobile) fullscreen
    FullscreenChange { active: bool, native: bool },
    PipChange { active: bool },
    TransportError(TransportError),
}

/// Commands issued to the host's media surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MediaCommand {
    /// Construct the adaptive client (loaded on demand) and attach it
    AttachAdaptive { url: String, retry: RetryPolicy },
    AttachProgressive { url: String },
    ShowFrame { url: String },
    SetFrameVisible { visible: bool },
    Detach,
    Play,
    Pause,
    Seek { position: f64 },
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
    SetPlaybackRate { rate: f64 },
    /// Highest level the adaptive client may pick on its own
    SetMaxLevel { index: Option<usize> },
    /// Pin a level, `None` returns to automatic selection
    SetLevel { index: Option<usize> },
    StartLoad,
    StopLoad,
    RecoverMediaError,
    ReloadSource,
    EnterFullscreen,
    ExitFullscreen,
    EnterPip,
    ExitPip,
}

/// The host side of a player: a video element, an iframe, a native pipeline
pub trait MediaSurface: Send {
    fn execute(&mut self, command: MediaCommand);
}
