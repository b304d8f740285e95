//! Playback controls
//!
//! Buttons, keyboard shortcuts and touch gestures all end up as a
//! [`ControlAction`] dispatched through [`Controls::dispatch`]. The lock check
//! lives here and nowhere else, so there is no input path around it.

use crate::config::PlayerConfig;
use crate::engine::{LevelSelection, PlaybackEngine};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Viewer intent, independent of the input device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ControlAction {
    PlayPause,
    Play,
    Pause,
    /// Relative seek in seconds
    SeekBy(f64),
    SeekTo(f64),
    SkipForward,
    SkipBackward,
    SetVolume(f64),
    /// Relative volume change, clamped to [0, 1]
    VolumeBy(f64),
    ToggleMute,
    ToggleFullscreen,
    TogglePip,
    SetPlaybackRate(f64),
    /// `None` returns to automatic quality
    SelectQuality(Option<usize>),
    /// Relative brightness change, display only
    BrightnessBy(f64),
    Retry,
    /// Pointer or touch activity; reveals the controls
    Reveal,
}

impl ControlAction {
    /// Still permitted after the gate locks
    fn allowed_while_locked(&self) -> bool {
        matches!(
            self,
            ControlAction::SetVolume(_)
                | ControlAction::VolumeBy(_)
                | ControlAction::ToggleMute
                | ControlAction::BrightnessBy(_)
                | ControlAction::Reveal
        )
    }

    /// Playback is refused with an upgrade prompt rather than silently
    fn prompts_upgrade(&self) -> bool {
        matches!(
            self,
            ControlAction::PlayPause
                | ControlAction::Play
                | ControlAction::SelectQuality(Some(_))
        )
    }
}

/// Result of dispatching an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    Applied,
    /// Nothing to do in the current state
    Ignored,
    /// Refused while locked
    Blocked,
    /// Send the viewer to the upgrade path
    UpgradeRequired { href: Option<String> },
}

/// Gate status as seen by the controls
#[derive(Debug, Clone, Copy, Default)]
pub struct LockView<'a> {
    pub locked: bool,
    pub daily_cap_locked: bool,
    pub upgrade_href: Option<&'a str>,
}

impl LockView<'_> {
    fn is_locked(&self) -> bool {
        self.locked || self.daily_cap_locked
    }
}

/// Controls state: visibility timer, rate menu and brightness
#[derive(Debug, Clone)]
pub struct Controls {
    visible: bool,
    last_activity_ms: f64,
    hide_after_ms: f64,
    seek_step: f64,
    rates: Vec<f64>,
    brightness: f64,
}

impl Controls {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            visible: true,
            last_activity_ms: 0.0,
            hide_after_ms: config.controls_hide_ms as f64,
            seek_step: config.seek_step_secs,
            rates: config.playback_rates.clone(),
            brightness: 1.0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Next entry of the speed menu, wrapping around
    pub fn next_rate(&self, current: f64) -> f64 {
        self.rates
            .iter()
            .copied()
            .find(|r| *r > current + f64::EPSILON)
            .or_else(|| self.rates.first().copied())
            .unwrap_or(1.0)
    }

    /// Show the controls and restart the hide timer
    pub fn reveal(&mut self, now_ms: f64) {
        self.visible = true;
        self.last_activity_ms = now_ms;
    }

    /// Hide after inactivity while playing. Returns true when visibility changed.
    pub fn tick(&mut self, now_ms: f64, playing: bool) -> bool {
        if !playing {
            let changed = !self.visible;
            self.visible = true;
            return changed;
        }
        if self.visible && now_ms - self.last_activity_ms >= self.hide_after_ms {
            self.visible = false;
            return true;
        }
        false
    }

    /// Apply an action to the engine after the lock check
    pub fn dispatch(
        &mut self,
        action: ControlAction,
        now_ms: f64,
        engine: &mut PlaybackEngine,
        lock: LockView<'_>,
    ) -> Result<ControlOutcome> {
        self.reveal(now_ms);

        if (lock.is_locked() || engine.is_locked()) && !action.allowed_while_locked() {
            debug!(action = ?action, "Control refused while locked");
            if engine.is_locked() {
                // Belt for elements that started on their own
                engine.request_pause()?;
            }
            return Ok(if action.prompts_upgrade() {
                ControlOutcome::UpgradeRequired {
                    href: lock.upgrade_href.map(str::to_string),
                }
            } else {
                ControlOutcome::Blocked
            });
        }

        let outcome = match action {
            ControlAction::PlayPause => {
                if engine.is_advancing() {
                    engine.request_pause()?;
                } else {
                    engine.request_play()?;
                }
                ControlOutcome::Applied
            }
            ControlAction::Play => {
                engine.request_play()?;
                ControlOutcome::Applied
            }
            ControlAction::Pause => {
                engine.request_pause()?;
                ControlOutcome::Applied
            }
            ControlAction::SeekBy(delta) => {
                let target = engine.position() + delta;
                self.seek(engine, target)?
            }
            ControlAction::SeekTo(position) => self.seek(engine, position)?,
            ControlAction::SkipForward => {
                let target = engine.position() + self.seek_step;
                self.seek(engine, target)?
            }
            ControlAction::SkipBackward => {
                let target = engine.position() - self.seek_step;
                self.seek(engine, target)?
            }
            ControlAction::SetVolume(volume) => {
                engine.set_volume(volume);
                ControlOutcome::Applied
            }
            ControlAction::VolumeBy(delta) => {
                engine.set_volume(engine.volume() + delta);
                ControlOutcome::Applied
            }
            ControlAction::ToggleMute => {
                engine.set_muted(!engine.is_muted());
                ControlOutcome::Applied
            }
            ControlAction::ToggleFullscreen => {
                if engine.is_fullscreen() {
                    engine.exit_fullscreen();
                } else {
                    engine.enter_fullscreen()?;
                }
                ControlOutcome::Applied
            }
            ControlAction::TogglePip => {
                if engine.transport().is_some_and(|t| t.has_media_element()) {
                    if engine.is_pip() {
                        engine.exit_pip();
                    } else {
                        engine.enter_pip()?;
                    }
                    ControlOutcome::Applied
                } else {
                    ControlOutcome::Ignored
                }
            }
            ControlAction::SetPlaybackRate(rate) => {
                engine.set_playback_rate(rate)?;
                ControlOutcome::Applied
            }
            ControlAction::SelectQuality(index) => match engine.select_level(index)? {
                LevelSelection::Applied => ControlOutcome::Applied,
                LevelSelection::Unsupported => ControlOutcome::Ignored,
                LevelSelection::UpgradeRequired => ControlOutcome::UpgradeRequired {
                    href: lock.upgrade_href.map(str::to_string),
                },
            },
            ControlAction::BrightnessBy(delta) => {
                self.brightness = (self.brightness + delta).clamp(0.0, 1.0);
                ControlOutcome::Applied
            }
            ControlAction::Retry => match engine.retry() {
                Ok(()) => ControlOutcome::Applied,
                Err(Error::InvalidStateTransition { .. }) => ControlOutcome::Ignored,
                Err(e) => return Err(e),
            },
            ControlAction::Reveal => ControlOutcome::Applied,
        };

        Ok(outcome)
    }

    fn seek(&self, engine: &mut PlaybackEngine, target: f64) -> Result<ControlOutcome> {
        if !engine.transport().is_some_and(|t| t.has_media_element()) {
            return Ok(ControlOutcome::Ignored);
        }
        engine.seek(target)?;
        Ok(ControlOutcome::Applied)
    }
}
