//! Touch gestures and keyboard shortcuts
//!
//! Both translate into [`ControlAction`]s and go through the same dispatch as
//! the on-screen buttons.

use crate::controls::ControlAction;
use serde::{Deserialize, Serialize};

/// Movement in pixels before a touch counts as a swipe
pub const SWIPE_THRESHOLD_PX: f64 = 20.0;
/// Seek range of a swipe across the full width
pub const SWIPE_SEEK_SECS: f64 = 30.0;
/// Volume range of a swipe across the full height
pub const SWIPE_VOLUME_SCALE: f64 = 2.0;
/// Two taps closer than this are a double tap
pub const DOUBLE_TAP_MS: f64 = 300.0;
/// Arrow up/down volume step
pub const KEY_VOLUME_STEP: f64 = 0.1;

/// Gesture area size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Seek,
    Volume,
    Brightness,
}

#[derive(Debug, Clone, Copy)]
struct TouchStart {
    x: f64,
    y: f64,
    volume: f64,
    brightness: f64,
}

/// Tracks one touch at a time
#[derive(Debug, Clone)]
pub struct GestureTracker {
    viewport: Viewport,
    start: Option<TouchStart>,
    kind: Option<GestureKind>,
    seek_delta: f64,
    last_tap_ms: Option<f64>,
}

impl GestureTracker {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            start: None,
            kind: None,
            seek_delta: 0.0,
            last_tap_ms: None,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Gesture in progress, for the on-screen indicator
    pub fn active(&self) -> Option<GestureKind> {
        self.kind
    }

    /// Pending seek offset of a horizontal swipe
    pub fn seek_preview(&self) -> f64 {
        self.seek_delta
    }

    /// Single-finger touch began. Multi-touch is ignored by the caller.
    pub fn touch_start(&mut self, x: f64, y: f64, volume: f64, brightness: f64) {
        self.start = Some(TouchStart { x, y, volume, brightness });
        self.kind = None;
        self.seek_delta = 0.0;
    }

    /// Finger moved. Volume and brightness apply live; seeking waits for release.
    pub fn touch_move(&mut self, x: f64, y: f64) -> Option<ControlAction> {
        let start = self.start?;
        let dx = x - start.x;
        let dy = y - start.y;

        if self.kind.is_none() && (dx.abs() > SWIPE_THRESHOLD_PX || dy.abs() > SWIPE_THRESHOLD_PX) {
            self.kind = Some(if dx.abs() > dy.abs() {
                GestureKind::Seek
            } else if x < self.viewport.width / 2.0 {
                GestureKind::Brightness
            } else {
                GestureKind::Volume
            });
        }

        let height = self.viewport.height.max(1.0);
        match self.kind? {
            GestureKind::Seek => {
                self.seek_delta = dx / self.viewport.width.max(1.0) * SWIPE_SEEK_SECS;
                None
            }
            GestureKind::Volume => {
                let change = -(dy / height) * SWIPE_VOLUME_SCALE;
                Some(ControlAction::SetVolume((start.volume + change).clamp(0.0, 1.0)))
            }
            GestureKind::Brightness => {
                let change = -(dy / height) * SWIPE_VOLUME_SCALE;
                let target = (start.brightness + change).clamp(0.0, 1.0);
                Some(ControlAction::BrightnessBy(target - start.brightness))
            }
        }
    }

    /// Finger lifted. Returns the seek of a finished swipe, or the tap action.
    pub fn touch_end(&mut self, now_ms: f64) -> Option<ControlAction> {
        let start = self.start.take()?;
        let kind = self.kind.take();
        let seek_delta = std::mem::take(&mut self.seek_delta);

        match kind {
            Some(GestureKind::Seek) if seek_delta != 0.0 => Some(ControlAction::SeekBy(seek_delta)),
            Some(_) => None,
            None => Some(self.tap(start.x, now_ms)),
        }
    }

    fn tap(&mut self, x: f64, now_ms: f64) -> ControlAction {
        let double = self
            .last_tap_ms
            .is_some_and(|last| now_ms - last > 0.0 && now_ms - last < DOUBLE_TAP_MS);

        if !double {
            self.last_tap_ms = Some(now_ms);
            return ControlAction::Reveal;
        }

        self.last_tap_ms = None;
        let third = self.viewport.width / 3.0;
        if x < third {
            ControlAction::SkipBackward
        } else if x > third * 2.0 {
            ControlAction::SkipForward
        } else {
            ControlAction::PlayPause
        }
    }
}

/// Keyboard shortcut for a DOM `KeyboardEvent.key` value
pub fn key_action(key: &str) -> Option<ControlAction> {
    let action = match key {
        " " | "k" | "K" => ControlAction::PlayPause,
        "ArrowLeft" | "j" | "J" => ControlAction::SkipBackward,
        "ArrowRight" | "l" | "L" => ControlAction::SkipForward,
        "ArrowUp" => ControlAction::VolumeBy(KEY_VOLUME_STEP),
        "ArrowDown" => ControlAction::VolumeBy(-KEY_VOLUME_STEP),
        "f" | "F" => ControlAction::ToggleFullscreen,
        "m" | "M" => ControlAction::ToggleMute,
        "p" | "P" => ControlAction::TogglePip,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GestureTracker {
        GestureTracker::new(Viewport { width: 1000.0, height: 500.0 })
    }

    #[test]
    fn test_horizontal_swipe_seeks_on_release() {
        let mut g = tracker();
        g.touch_start(100.0, 250.0, 1.0, 1.0);
        assert_eq!(g.touch_move(130.0, 255.0), None);
        assert_eq!(g.active(), Some(GestureKind::Seek));
        assert_eq!(g.touch_move(600.0, 255.0), None);
        assert_eq!(g.seek_preview(), 15.0);
        assert_eq!(g.touch_end(0.0), Some(ControlAction::SeekBy(15.0)));
    }

    #[test]
    fn test_small_move_is_a_tap() {
        let mut g = tracker();
        g.touch_start(500.0, 250.0, 1.0, 1.0);
        assert_eq!(g.touch_move(510.0, 260.0), None);
        assert_eq!(g.active(), None);
        assert_eq!(g.touch_end(0.0), Some(ControlAction::Reveal));
    }

    #[test]
    fn test_vertical_swipe_right_half_sets_volume() {
        let mut g = tracker();
        g.touch_start(800.0, 400.0, 0.2, 1.0);
        // Up by 125px on a 500px tall area: +0.5
        assert_eq!(g.touch_move(800.0, 275.0), Some(ControlAction::SetVolume(0.7)));
        assert_eq!(g.active(), Some(GestureKind::Volume));
        assert_eq!(g.touch_move(800.0, 0.0), Some(ControlAction::SetVolume(1.0)));
        assert_eq!(g.touch_end(0.0), None);
    }

    #[test]
    fn test_vertical_swipe_left_half_is_brightness() {
        let mut g = tracker();
        g.touch_start(100.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_move(100.0, 225.0), Some(ControlAction::BrightnessBy(-0.5)));
        assert_eq!(g.active(), Some(GestureKind::Brightness));
    }

    #[test]
    fn test_double_tap_regions() {
        let mut g = tracker();
        g.touch_start(100.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_end(1_000.0), Some(ControlAction::Reveal));
        g.touch_start(100.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_end(1_200.0), Some(ControlAction::SkipBackward));

        g.touch_start(900.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_end(5_000.0), Some(ControlAction::Reveal));
        g.touch_start(900.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_end(5_100.0), Some(ControlAction::SkipForward));

        // Too slow for a double tap
        g.touch_start(500.0, 100.0, 1.0, 1.0);
        g.touch_end(9_000.0);
        g.touch_start(500.0, 100.0, 1.0, 1.0);
        assert_eq!(g.touch_end(9_500.0), Some(ControlAction::Reveal));
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(key_action(" "), Some(ControlAction::PlayPause));
        assert_eq!(key_action("ArrowRight"), Some(ControlAction::SkipForward));
        assert_eq!(key_action("ArrowDown"), Some(ControlAction::VolumeBy(-0.1)));
        assert_eq!(key_action("p"), Some(ControlAction::TogglePip));
        assert_eq!(key_action("Escape"), None);
    }
}
