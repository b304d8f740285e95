//! Preview Gate
//!
//! Measures how much of a restricted asset an unentitled viewer has consumed
//! and locks playback once the preview budget is spent.
//!
//! Two clocks feed the decision:
//! - a wall-clock accumulator, credited only while playback advances and
//!   scaled by the drain multiplier
//! - the media element's own clock
//!
//! The lock decision uses the larger of the two. Switching mirrors resets the
//! media clock but not the accumulator; pausing stops the accumulator but the
//! media clock cannot run ahead of what was watched. The accumulator is also
//! persisted as a floor per asset identity so reloads resume from it.
//!
//! All accrual goes through [`PreviewGate::advance`], which credits only the
//! wall-clock delta since the previous call. The tick timer and `timeupdate`
//! events may both call it in the same turn without double counting.

use crate::config::GateParams;
use crate::storage::FloorStore;
use crate::types::AssetId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Gate state for one restricted asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewGateState {
    /// Milliseconds on the host clock when the first qualifying play happened
    pub session_started_at: Option<f64>,
    pub accumulated_seconds: f64,
    pub limit_seconds: f64,
    pub drain_multiplier: f64,
    pub locked: bool,
    pub daily_cap_locked: bool,
    pub persisted_floor_seconds: f64,
}

/// Why the gate locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    PreviewExhausted,
    DailyLimitReached,
}

/// Redirect to the upgrade destination after a delay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub href: String,
    pub delay_ms: u64,
}

/// Emitted exactly once per session, when the gate locks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockNotice {
    pub reason: LockReason,
    pub effective_elapsed: f64,
    pub redirect: Option<Redirect>,
}

/// Outcome of feeding the gate
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Gate not armed (entitled viewer or unrestricted asset)
    Disarmed,
    /// Armed, waiting for the first qualifying play
    Waiting,
    /// Budget remaining
    Open { remaining: f64 },
    /// Just locked
    Lock(LockNotice),
    /// Already locked
    Locked,
}

impl GateDecision {
    pub fn is_locked(&self) -> bool {
        matches!(self, GateDecision::Lock(_) | GateDecision::Locked)
    }
}

/// What the media side looked like at the moment of an update
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackSample {
    /// Media is playing (or the frame is visible) and not ended
    pub advancing: bool,
    /// Media element clock, absent for frame transports
    pub media_clock: Option<f64>,
}

impl PlaybackSample {
    pub fn playing(media_clock: f64) -> Self {
        Self { advancing: true, media_clock: Some(media_clock) }
    }

    pub fn paused(media_clock: f64) -> Self {
        Self { advancing: false, media_clock: Some(media_clock) }
    }

    /// Frame transports: no clock, always advancing once armed
    pub fn frame() -> Self {
        Self { advancing: true, media_clock: None }
    }
}

/// Time-accumulation state machine for one asset identity
#[derive(Debug)]
pub struct PreviewGate {
    asset: AssetId,
    params: GateParams,
    armed: bool,
    state: PreviewGateState,
    /// Host-clock milliseconds of the last accrual, `None` while not advancing
    last_tick_at: Option<f64>,
    max_tick_delta: f64,
    /// Largest media clock observed this session
    media_high_water: f64,
    notified: bool,
    /// Persistence failed; accrual continues in memory only
    degraded: bool,
}

impl PreviewGate {
    /// Create a gate. `armed` is false for entitled viewers and unrestricted assets.
    pub fn new(asset: AssetId, params: GateParams, armed: bool, max_tick_delta: f64) -> Self {
        let state = PreviewGateState {
            session_started_at: None,
            accumulated_seconds: 0.0,
            limit_seconds: params.limit_seconds,
            drain_multiplier: params.drain_multiplier,
            locked: false,
            daily_cap_locked: params.daily_cap_reached,
            persisted_floor_seconds: 0.0,
        };

        Self {
            asset,
            params,
            armed,
            state,
            last_tick_at: None,
            max_tick_delta,
            media_high_water: 0.0,
            notified: false,
            degraded: false,
        }
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn params(&self) -> &GateParams {
        &self.params
    }

    pub fn state(&self) -> &PreviewGateState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked
    }

    pub fn is_started(&self) -> bool {
        self.state.session_started_at.is_some()
    }

    /// Running on the in-memory accumulator only
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Larger of accumulated wall time and the media clock
    pub fn effective_elapsed(&self) -> f64 {
        self.state.accumulated_seconds.max(self.media_high_water)
    }

    /// Budget left for the countdown display
    pub fn remaining(&self) -> f64 {
        (self.state.limit_seconds - self.effective_elapsed()).max(0.0)
    }

    /// Ceiling height while armed, if one is configured
    pub fn quality_ceiling(&self) -> Option<u32> {
        if self.armed {
            self.params.quality_ceiling
        } else {
            None
        }
    }

    /// First qualifying play, or resumption after a pause.
    ///
    /// On the first call the persisted floor is read into the accumulator.
    pub fn on_play_started(&mut self, now_ms: f64, sample: PlaybackSample, store: &mut dyn FloorStore) -> GateDecision {
        if !self.armed {
            return GateDecision::Disarmed;
        }
        if self.state.locked {
            return GateDecision::Locked;
        }

        if self.state.session_started_at.is_none() {
            self.state.session_started_at = Some(now_ms);
            let floor = match store.read(&self.asset.storage_key()) {
                Ok(floor) => floor.unwrap_or(0.0),
                Err(e) => {
                    self.degrade(&e);
                    0.0
                }
            };
            self.state.persisted_floor_seconds = floor;
            self.state.accumulated_seconds = self.state.accumulated_seconds.max(floor);
            info!(
                asset = %self.asset,
                floor_secs = floor,
                limit_secs = self.state.limit_seconds,
                drain = self.state.drain_multiplier,
                "Preview gate armed"
            );
        }

        // Nothing between the last stop and now is credited
        self.last_tick_at = Some(now_ms);
        self.observe_media_clock(sample.media_clock);
        self.evaluate(store)
    }

    /// Credit the wall-clock delta since the previous update, if advancing.
    ///
    /// Called from the periodic tick and from media time updates.
    pub fn advance(&mut self, now_ms: f64, sample: PlaybackSample, store: &mut dyn FloorStore) -> GateDecision {
        if !self.armed {
            return GateDecision::Disarmed;
        }
        if self.state.locked {
            return GateDecision::Locked;
        }
        if self.state.session_started_at.is_none() {
            // Daily cap locks without any play having happened yet only once
            // the viewer tries to play; see `on_play_started`.
            return GateDecision::Waiting;
        }

        if sample.advancing {
            match self.last_tick_at {
                Some(last) => {
                    let elapsed = ((now_ms - last) / 1000.0).clamp(0.0, self.max_tick_delta);
                    if now_ms > last {
                        self.last_tick_at = Some(now_ms);
                    }
                    if elapsed > 0.0 {
                        self.state.accumulated_seconds += elapsed * self.state.drain_multiplier;
                        debug!(
                            elapsed_secs = elapsed,
                            accumulated = self.state.accumulated_seconds,
                            "Preview time accrued"
                        );
                    }
                }
                None => self.last_tick_at = Some(now_ms),
            }
        } else {
            self.last_tick_at = None;
        }

        self.observe_media_clock(sample.media_clock);
        self.evaluate(store)
    }

    /// Playback stopped advancing (pause, end, buffering). Credits up to `now_ms` first.
    pub fn on_play_stopped(&mut self, now_ms: f64, media_clock: Option<f64>, store: &mut dyn FloorStore) -> GateDecision {
        let decision = self.advance(now_ms, PlaybackSample { advancing: true, media_clock }, store);
        self.last_tick_at = None;
        decision
    }

    /// External daily-quota signal
    pub fn set_daily_cap_reached(&mut self, reached: bool, store: &mut dyn FloorStore) -> GateDecision {
        if !self.armed {
            return GateDecision::Disarmed;
        }
        // Clearing the flag never unlocks
        self.state.daily_cap_locked = self.state.daily_cap_locked || reached;
        self.params.daily_cap_reached = self.state.daily_cap_locked;
        if self.state.session_started_at.is_none() {
            return if self.state.locked { GateDecision::Locked } else { GateDecision::Waiting };
        }
        self.evaluate(store)
    }

    /// Confirmed entitlement upgrade: disarm and clear the lock
    pub fn confirm_entitlement(&mut self) {
        info!(asset = %self.asset, "Entitlement confirmed, preview gate disarmed");
        self.armed = false;
        self.state.locked = false;
        self.state.daily_cap_locked = false;
        self.last_tick_at = None;
    }

    fn observe_media_clock(&mut self, media_clock: Option<f64>) {
        if let Some(clock) = media_clock.filter(|c| c.is_finite() && *c > 0.0) {
            self.media_high_water = self.media_high_water.max(clock);
        }
    }

    fn persist(&mut self, store: &mut dyn FloorStore) {
        if self.degraded {
            return;
        }
        let value = self
            .state
            .persisted_floor_seconds
            .max(self.state.accumulated_seconds)
            .max(self.media_high_water);

        match store.merge_max(&self.asset.storage_key(), value) {
            Ok(stored) => self.state.persisted_floor_seconds = stored,
            Err(e) => self.degrade(&e),
        }
    }

    fn degrade(&mut self, error: &crate::Error) {
        if !self.degraded {
            warn!(asset = %self.asset, error = %error, "Floor persistence failed, continuing in memory");
        }
        self.degraded = true;
    }

    fn evaluate(&mut self, store: &mut dyn FloorStore) -> GateDecision {
        self.persist(store);

        let effective = self.effective_elapsed();
        let reason = if self.state.daily_cap_locked {
            Some(LockReason::DailyLimitReached)
        } else if effective >= self.state.limit_seconds {
            Some(LockReason::PreviewExhausted)
        } else {
            None
        };

        match reason {
            Some(reason) => self.lock(reason, effective),
            None => GateDecision::Open {
                remaining: self.remaining(),
            },
        }
    }

    fn lock(&mut self, reason: LockReason, effective: f64) -> GateDecision {
        self.state.locked = true;
        self.last_tick_at = None;

        if self.notified {
            return GateDecision::Locked;
        }
        self.notified = true;

        let redirect = match (&self.params.cta_href, self.params.force_redirect_on_lock) {
            (Some(href), true) => Some(Redirect {
                href: href.clone(),
                delay_ms: self.params.redirect_delay_ms,
            }),
            _ => None,
        };

        info!(
            asset = %self.asset,
            reason = ?reason,
            effective_elapsed = effective,
            limit_secs = self.state.limit_seconds,
            "Preview gate locked"
        );

        GateDecision::Lock(LockNotice {
            reason,
            effective_elapsed: effective,
            redirect,
        })
    }
}
