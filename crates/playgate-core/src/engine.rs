//! Adaptive Playback Engine
//!
//! Explicit state machine over whatever the host renders into:
//!
//! ```text
//! Idle -> Loading -> Ready -> Playing <-> Paused
//!                      \________\_________\____ Buffering (overlay flag)
//! any -> Error, any -> Locked
//! ```
//!
//! The engine never infers play/pause optimistically: it issues a command and
//! waits for the matching media event. Frame transports have no element to
//! listen to, so for them play/pause is a visibility toggle.

use crate::manifest::capped_level;
use crate::transport::{RecoveryAction, RecoveryTracker, RetryPolicy};
use crate::types::*;
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Something the owner of the engine should react to
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    StateChanged { from: EngineState, to: EngineState },
    /// Source attached and playable
    Ready,
    Failed { message: String },
    LevelSwitched { index: usize, height: u32 },
    Buffering(bool),
}

/// Result of a quality selection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSelection {
    Applied,
    /// Level is above the active ceiling
    UpgradeRequired,
    /// Transport has no selectable levels
    Unsupported,
}

/// Playback engine for one mounted source at a time
pub struct PlaybackEngine {
    surface: Box<dyn MediaSurface>,
    state: EngineState,
    buffering: bool,
    ended: bool,
    source: Option<ResolvedSource>,
    levels: Vec<QualityLevel>,
    /// Level the adaptive client reports as playing
    current_level: Option<usize>,
    /// Pinned by the viewer, `None` for automatic
    manual_level: Option<usize>,
    ceiling: Option<u32>,
    position: f64,
    duration: Option<f64>,
    volume: f64,
    muted: bool,
    playback_rate: f64,
    fullscreen: bool,
    native_fullscreen: bool,
    pip: bool,
    recovery: RecoveryTracker,
    last_error: Option<String>,
    signals: Vec<EngineSignal>,
}

impl PlaybackEngine {
    pub fn new(surface: Box<dyn MediaSurface>, retry: RetryPolicy) -> Self {
        Self {
            surface,
            state: EngineState::Idle,
            buffering: false,
            ended: false,
            source: None,
            levels: Vec::new(),
            current_level: None,
            manual_level: None,
            ceiling: None,
            position: 0.0,
            duration: None,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            fullscreen: false,
            native_fullscreen: false,
            pip: false,
            recovery: RecoveryTracker::new(retry),
            last_error: None,
            signals: Vec::new(),
        }
    }

    /// Base state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// State with the buffering overlay applied
    pub fn display_state(&self) -> EngineState {
        if self.buffering && self.state.accepts_buffering() {
            EngineState::Buffering
        } else {
            self.state
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn is_locked(&self) -> bool {
        self.state == EngineState::Locked
    }

    pub fn source(&self) -> Option<&ResolvedSource> {
        self.source.as_ref()
    }

    pub fn transport(&self) -> Option<TransportType> {
        self.source.as_ref().map(|s| s.transport_type)
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn current_level(&self) -> Option<usize> {
        self.current_level
    }

    pub fn manual_level(&self) -> Option<usize> {
        self.manual_level
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_pip(&self) -> bool {
        self.pip
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Media is advancing: playing and not ended
    pub fn is_advancing(&self) -> bool {
        self.state == EngineState::Playing && !self.ended
    }

    /// Signals accumulated since the last drain
    pub fn drain_signals(&mut self) -> Vec<EngineSignal> {
        std::mem::take(&mut self.signals)
    }

    fn set_state(&mut self, new_state: EngineState) -> Result<()> {
        let current = self.state;
        if current == new_state {
            return Ok(());
        }
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }

        self.state = new_state;
        if !new_state.accepts_buffering() && self.buffering {
            self.buffering = false;
        }
        info!(from = %current, to = %new_state, "State transition");
        self.signals.push(EngineSignal::StateChanged { from: current, to: new_state });
        Ok(())
    }

    fn send(&mut self, command: MediaCommand) {
        debug!(command = ?command, "Media command");
        self.surface.execute(command);
    }

    /// Attach a resolved source, replacing any current one
    pub fn attach(&mut self, source: ResolvedSource) -> Result<()> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        if self.source.is_some() {
            self.send(MediaCommand::Detach);
        }

        self.levels.clear();
        self.current_level = None;
        self.manual_level = None;
        self.position = 0.0;
        self.duration = None;
        self.ended = false;
        self.last_error = None;
        self.recovery.reset();

        if self.state != EngineState::Loading {
            self.set_state(EngineState::Loading)?;
        }
        self.source = Some(source.clone());
        self.send_attach(&source);
        Ok(())
    }

    fn send_attach(&mut self, source: &ResolvedSource) {
        let url = source.effective_url.clone();
        let command = match source.transport_type {
            TransportType::Segmented => MediaCommand::AttachAdaptive {
                url,
                retry: *self.recovery.policy(),
            },
            TransportType::Manifest | TransportType::File => MediaCommand::AttachProgressive { url },
            TransportType::Frame => MediaCommand::ShowFrame { url },
        };
        info!(transport = %source.transport_type, url = %source.effective_url, "Attaching source");
        self.send(command);
    }

    /// Tear down the current source
    pub fn detach(&mut self) {
        if self.source.take().is_some() {
            self.send(MediaCommand::Detach);
        }
        self.levels.clear();
        self.current_level = None;
        self.manual_level = None;
        self.buffering = false;
        self.fullscreen = false;
        self.native_fullscreen = false;
        self.pip = false;
        self.ended = false;
        // Teardown is always a valid transition
        let _ = self.set_state(EngineState::Idle);
    }

    /// User-invoked retry from the error state
    pub fn retry(&mut self) -> Result<()> {
        if self.state != EngineState::Error {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: EngineState::Loading.to_string(),
            });
        }
        let source = self.source.clone().ok_or(Error::NoSource)?;
        self.attach(source)
    }

    /// Feed a media event from the host
    pub fn handle_event(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::ManifestParsed { levels } => self.on_manifest_parsed(levels),
            MediaEvent::LoadedMetadata { duration } => {
                if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                    self.duration = Some(d);
                }
                if self.state == EngineState::Loading {
                    self.become_ready();
                }
            }
            MediaEvent::FrameLoaded => {
                if self.state == EngineState::Loading && self.transport() == Some(TransportType::Frame) {
                    self.become_ready();
                }
            }
            MediaEvent::Play => self.on_play(),
            MediaEvent::Playing => {
                self.set_buffering(false);
                if !self.is_locked() {
                    self.recovery.reset();
                }
                self.on_play();
            }
            MediaEvent::Pause => {
                if self.state == EngineState::Playing {
                    let _ = self.set_state(EngineState::Paused);
                }
            }
            MediaEvent::Ended => {
                self.ended = true;
                if self.state == EngineState::Playing {
                    let _ = self.set_state(EngineState::Paused);
                }
            }
            MediaEvent::Waiting => self.set_buffering(true),
            MediaEvent::TimeUpdate { position } => {
                if position.is_finite() && *position >= 0.0 {
                    self.position = *position;
                }
            }
            MediaEvent::DurationChange { duration } => {
                if duration.is_finite() && *duration > 0.0 {
                    self.duration = Some(*duration);
                }
            }
            MediaEvent::VolumeChange { volume, muted } => {
                self.volume = volume.clamp(0.0, 1.0);
                self.muted = *muted;
            }
            MediaEvent::LevelSwitched { index } => self.on_level_switched(*index),
            MediaEvent::FullscreenChange { active, native } => {
                self.fullscreen = *active;
                self.native_fullscreen = *active && *native;
                if self.is_locked() && *active {
                    // Native fullscreen would cover the paywall
                    self.send(MediaCommand::ExitFullscreen);
                }
            }
            MediaEvent::PipChange { active } => {
                self.pip = *active;
                if self.is_locked() && *active {
                    self.send(MediaCommand::ExitPip);
                }
            }
            MediaEvent::TransportError(error) => self.on_transport_error(error),
        }
    }

    fn become_ready(&mut self) {
        if self.set_state(EngineState::Ready).is_ok() {
            self.signals.push(EngineSignal::Ready);
        }
    }

    fn on_manifest_parsed(&mut self, levels: &[QualityLevel]) {
        if self.state != EngineState::Loading || self.transport() != Some(TransportType::Segmented) {
            debug!(state = %self.state, "Ignoring manifest outside of loading");
            return;
        }
        self.levels = levels.to_vec();
        self.recovery.reset();
        info!(levels = self.levels.len(), "Quality levels available");
        self.apply_ceiling();
        self.become_ready();
    }

    fn on_play(&mut self) {
        match self.state {
            EngineState::Locked => {
                // The element started anyway (native controls, autoplay)
                self.send(MediaCommand::Pause);
            }
            EngineState::Ready | EngineState::Paused => {
                self.ended = false;
                let _ = self.set_state(EngineState::Playing);
            }
            EngineState::Loading => {
                // Autoplay is suppressed until the gate has armed
                warn!("Media started before the source was ready, pausing");
                self.send(MediaCommand::Pause);
            }
            _ => {}
        }
    }

    fn on_level_switched(&mut self, index: usize) {
        let Some(level) = self.levels.iter().find(|l| l.index == index).copied() else {
            warn!(index, "Adaptive client switched to an unknown level");
            return;
        };

        if let Some(ceiling) = self.ceiling {
            if level.height > ceiling {
                // Client overrode the cap; pin it back
                let capped = capped_level(&self.levels, ceiling);
                warn!(index, height = level.height, ceiling, "Level above ceiling, pinning");
                self.send(MediaCommand::SetLevel { index: capped });
                return;
            }
        }

        self.current_level = Some(index);
        debug!(index, height = level.height, "Level switched");
        self.signals.push(EngineSignal::LevelSwitched { index, height: level.height });
    }

    fn on_transport_error(&mut self, error: &crate::transport::TransportError) {
        if matches!(self.state, EngineState::Idle | EngineState::Locked | EngineState::Error) {
            return;
        }

        match self.recovery.on_error(error) {
            RecoveryAction::Ignore => {}
            RecoveryAction::RestartLoad => self.send(MediaCommand::StartLoad),
            RecoveryAction::ResetDecoder => self.send(MediaCommand::RecoverMediaError),
            RecoveryAction::Fail => {
                let message = if error.details.is_empty() {
                    format!("Stream unavailable ({} error)", error.kind)
                } else {
                    format!("Stream unavailable ({} error: {})", error.kind, error.details)
                };
                // The adaptive client is torn down; `retry` builds a new one
                if self.transport() == Some(TransportType::Segmented) {
                    self.send(MediaCommand::Detach);
                }
                if self.set_state(EngineState::Error).is_ok() {
                    self.last_error = Some(message.clone());
                    self.signals.push(EngineSignal::Failed { message });
                }
            }
        }
    }

    fn set_buffering(&mut self, buffering: bool) {
        let buffering = buffering && self.state.accepts_buffering();
        if self.buffering != buffering {
            self.buffering = buffering;
            self.signals.push(EngineSignal::Buffering(buffering));
        }
    }

    /// Ask the surface to start playback; state follows the media event
    pub fn request_play(&mut self) -> Result<()> {
        match self.state {
            EngineState::Locked => {
                self.send(MediaCommand::Pause);
                Err(Error::PlaybackLocked)
            }
            EngineState::Playing => Ok(()),
            EngineState::Ready | EngineState::Paused => {
                if self.transport() == Some(TransportType::Frame) {
                    self.send(MediaCommand::SetFrameVisible { visible: true });
                    self.set_state(EngineState::Playing)
                } else {
                    if self.ended {
                        self.send(MediaCommand::Seek { position: 0.0 });
                    }
                    self.send(MediaCommand::Play);
                    Ok(())
                }
            }
            other => Err(Error::InvalidStateTransition {
                from: other.to_string(),
                to: EngineState::Playing.to_string(),
            }),
        }
    }

    pub fn request_pause(&mut self) -> Result<()> {
        match self.state {
            EngineState::Playing if self.transport() == Some(TransportType::Frame) => {
                self.send(MediaCommand::SetFrameVisible { visible: false });
                self.set_state(EngineState::Paused)
            }
            EngineState::Playing | EngineState::Locked => {
                self.send(MediaCommand::Pause);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Seek within the known duration. Frames cannot seek.
    pub fn seek(&mut self, position: f64) -> Result<()> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        if !self.transport().is_some_and(|t| t.has_media_element()) {
            return Ok(());
        }
        if !position.is_finite() {
            return Err(Error::InvalidConfig(format!("seek position {} is not finite", position)));
        }

        let clamped = match self.duration {
            Some(d) => position.clamp(0.0, d),
            None => position.max(0.0),
        };
        debug!(from = self.position, to = clamped, "Seeking");
        self.ended = false;
        self.send(MediaCommand::Seek { position: clamped });
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { self.volume };
        self.volume = volume;
        self.send(MediaCommand::SetVolume { volume });
        if volume > 0.0 && self.muted {
            self.set_muted(false);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.send(MediaCommand::SetMuted { muted });
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::InvalidConfig(format!("playback rate {} must be positive", rate)));
        }
        if self.transport() == Some(TransportType::Frame) {
            return Ok(());
        }
        self.playback_rate = rate;
        self.send(MediaCommand::SetPlaybackRate { rate });
        Ok(())
    }

    /// Pin a quality level, or return to automatic with `None`
    pub fn select_level(&mut self, index: Option<usize>) -> Result<LevelSelection> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        if self.levels.is_empty() {
            return Ok(LevelSelection::Unsupported);
        }

        let Some(index) = index else {
            self.manual_level = None;
            self.send(MediaCommand::SetLevel { index: None });
            return Ok(LevelSelection::Applied);
        };

        let level = self
            .levels
            .iter()
            .find(|l| l.index == index)
            .copied()
            .ok_or(Error::UnknownQualityLevel(index))?;

        if self.ceiling.is_some_and(|c| level.height > c) {
            info!(index, height = level.height, "Level above ceiling requested");
            return Ok(LevelSelection::UpgradeRequired);
        }

        self.manual_level = Some(index);
        self.send(MediaCommand::SetLevel { index: Some(index) });
        Ok(LevelSelection::Applied)
    }

    /// Install or clear the quality ceiling (vertical resolution)
    pub fn set_quality_ceiling(&mut self, ceiling: Option<u32>) {
        if self.ceiling == ceiling {
            return;
        }
        self.ceiling = ceiling;
        self.apply_ceiling();
    }

    pub fn quality_ceiling(&self) -> Option<u32> {
        self.ceiling
    }

    fn apply_ceiling(&mut self) {
        if self.levels.is_empty() {
            return;
        }
        let Some(ceiling) = self.ceiling else {
            self.send(MediaCommand::SetMaxLevel { index: None });
            return;
        };

        let cap = capped_level(&self.levels, ceiling);
        info!(ceiling, cap = ?cap, "Applying quality ceiling");
        self.send(MediaCommand::SetMaxLevel { index: cap });

        let pinned_too_high = self
            .manual_level
            .and_then(|i| self.levels.iter().find(|l| l.index == i))
            .is_some_and(|l| l.height > ceiling);
        let playing_too_high = self
            .current_level
            .and_then(|i| self.levels.iter().find(|l| l.index == i))
            .is_some_and(|l| l.height > ceiling);

        // No level fits: force the lowest outright
        let none_fit = self.levels.iter().all(|l| l.height > ceiling);

        if pinned_too_high || playing_too_high || none_fit {
            self.manual_level = cap;
            self.send(MediaCommand::SetLevel { index: cap });
        }
    }

    pub fn enter_fullscreen(&mut self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        self.send(MediaCommand::EnterFullscreen);
        Ok(())
    }

    pub fn exit_fullscreen(&mut self) {
        self.send(MediaCommand::ExitFullscreen);
    }

    pub fn enter_pip(&mut self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }
        if !self.transport().is_some_and(|t| t.has_media_element()) {
            return Ok(());
        }
        self.send(MediaCommand::EnterPip);
        Ok(())
    }

    pub fn exit_pip(&mut self) {
        self.send(MediaCommand::ExitPip);
    }

    /// Enter the locked state on command from the preview gate. Idempotent.
    pub fn lock(&mut self) {
        if self.is_locked() {
            return;
        }
        // Every state may lock
        let _ = self.set_state(EngineState::Locked);

        match self.transport() {
            Some(TransportType::Frame) => self.send(MediaCommand::SetFrameVisible { visible: false }),
            Some(TransportType::Segmented) => {
                self.send(MediaCommand::Pause);
                self.send(MediaCommand::StopLoad);
            }
            Some(_) => self.send(MediaCommand::Pause),
            None => {}
        }
        if self.fullscreen || self.native_fullscreen {
            self.send(MediaCommand::ExitFullscreen);
        }
        if self.pip {
            self.send(MediaCommand::ExitPip);
        }
    }

    /// Leave the locked state after an entitlement upgrade, re-attaching the source
    pub fn unlock(&mut self) -> Result<()> {
        if !self.is_locked() {
            return Ok(());
        }
        match self.source.clone() {
            Some(source) => {
                self.set_state(EngineState::Loading)?;
                self.attach(source)
            }
            None => self.set_state(EngineState::Idle),
        }
    }
}
