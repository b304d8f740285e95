//! Player: engine, preview gate and controls for one mount
//!
//! Everything here is synchronous and clock-free; the host passes the current
//! time (milliseconds on a monotonic clock) into every call and drains
//! [`Player::drain_events`] afterwards. [`crate::session`] is one such host.

use crate::config::{ConversionGateConfig, GateParams, GateSettings, PlayerConfig};
use crate::controls::{ControlAction, ControlOutcome, Controls, LockView};
use crate::engine::{EngineSignal, PlaybackEngine};
use crate::events::{EventLog, PlayerEvent, PlayerEventRecord};
use crate::gate::{GateDecision, PlaybackSample, PreviewGate, PreviewGateState};
use crate::resolver::StreamResolver;
use crate::storage::FloorStore;
use crate::types::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// What to mount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountRequest {
    pub source: StreamSource,
    pub asset: AssetId,
    #[serde(default)]
    pub gate: ConversionGateConfig,
    /// Viewer is entitled (premium); the gate never arms
    #[serde(default)]
    pub entitled: bool,
}

/// Read-only view for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub state: EngineState,
    pub transport: Option<TransportType>,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub levels: Vec<QualityLevel>,
    pub current_level: Option<usize>,
    pub quality_ceiling: Option<u32>,
    pub controls_visible: bool,
    pub locked: bool,
    pub gate_armed: bool,
    pub remaining_seconds: Option<f64>,
    pub effective_elapsed: Option<f64>,
    pub gate: Option<PreviewGateState>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingRedirect {
    href: String,
    due_ms: f64,
}

pub struct Player {
    config: PlayerConfig,
    settings: GateSettings,
    resolver: StreamResolver,
    engine: PlaybackEngine,
    controls: Controls,
    gate: Option<PreviewGate>,
    store: Box<dyn FloorStore>,
    events: EventLog,
    source: Option<StreamSource>,
    resume_position: Option<f64>,
    preview_announced: bool,
    pending_redirect: Option<PendingRedirect>,
}

impl Player {
    pub fn new(
        config: PlayerConfig,
        settings: GateSettings,
        surface: Box<dyn MediaSurface>,
        store: Box<dyn FloorStore>,
        secure_origin: bool,
    ) -> Self {
        let resolver = StreamResolver::new(secure_origin, config.live_signatures.clone());
        let engine = PlaybackEngine::new(surface, config.retry);
        let controls = Controls::new(&config);
        Self {
            config,
            settings,
            resolver,
            engine,
            controls,
            gate: None,
            store,
            events: EventLog::new(SessionId::new()),
            source: None,
            resume_position: None,
            preview_announced: false,
            pending_redirect: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn gate(&self) -> Option<&PreviewGate> {
        self.gate.as_ref()
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn source(&self) -> Option<&StreamSource> {
        self.source.as_ref()
    }

    pub fn asset(&self) -> Option<&AssetId> {
        self.gate.as_ref().map(|g| g.asset())
    }

    pub fn session_id(&self) -> SessionId {
        self.events.session_id()
    }

    /// Locked by the gate (preview spent or daily cap)
    pub fn is_locked(&self) -> bool {
        self.engine.is_locked() || self.gate.as_ref().is_some_and(|g| g.is_locked())
    }

    /// Gate armed for this mount
    pub fn is_gated(&self) -> bool {
        self.gate.as_ref().is_some_and(|g| g.is_armed())
    }

    /// Host-clock deadline of a scheduled redirect
    pub fn redirect_deadline(&self) -> Option<f64> {
        self.pending_redirect.as_ref().map(|r| r.due_ms)
    }

    pub fn drain_events(&mut self) -> Vec<PlayerEventRecord> {
        self.events.drain()
    }

    /// Mount a source for an asset. Replaces any previous mount and its gate.
    #[instrument(skip(self, request), fields(asset = %request.asset))]
    pub fn mount(&mut self, now_ms: f64, request: MountRequest) -> Result<ResolvedSource> {
        self.stop_gate(now_ms);
        self.engine.detach();

        let params = GateParams::resolve(&request.gate, &self.settings);
        let armed = request.gate.enabled && !request.entitled;
        let gate = PreviewGate::new(
            request.asset,
            params,
            armed,
            self.config.max_tick_delta_secs,
        );
        info!(armed, limit_secs = gate.state().limit_seconds, "Mounting asset");

        self.engine.set_quality_ceiling(gate.quality_ceiling());
        self.gate = Some(gate);
        self.preview_announced = false;
        self.pending_redirect = None;
        self.resume_position = None;

        let resolved = self.resolver.resolve(&request.source);
        self.source = Some(request.source);
        self.engine.attach(resolved.clone())?;
        self.collect_signals();
        Ok(resolved)
    }

    /// Switch to another mirror of the same asset, keeping the gate
    #[instrument(skip(self, source))]
    pub fn switch_source(&mut self, now_ms: f64, source: StreamSource) -> Result<ResolvedSource> {
        if self.gate.is_none() {
            return Err(Error::NoSource);
        }
        if self.is_locked() {
            return Err(Error::PlaybackLocked);
        }

        self.stop_gate(now_ms);
        let resolved = self.resolver.resolve(&source);
        info!(url = %resolved.effective_url, transport = %resolved.transport_type, "Switching mirror");
        self.source = Some(source);
        self.engine.attach(resolved.clone())?;
        self.collect_signals();
        Ok(resolved)
    }

    /// Tear down the mount
    pub fn unmount(&mut self, now_ms: f64) {
        self.stop_gate(now_ms);
        self.engine.detach();
        self.gate = None;
        self.source = None;
        self.pending_redirect = None;
        self.collect_signals();
    }

    /// Position to seek to on the first play of an entitled viewer
    pub fn set_resume_position(&mut self, position: Option<f64>) {
        self.resume_position = position.filter(|p| p.is_finite() && *p > 0.0);
    }

    /// Feed a media event from the host surface
    pub fn handle_media_event(&mut self, now_ms: f64, event: &MediaEvent) {
        let was_accruing = self.accruing();
        self.engine.handle_event(event);

        if matches!(event, MediaEvent::TimeUpdate { .. }) {
            let sample = self.sample();
            if let Some(gate) = self.gate.as_mut() {
                let decision = gate.advance(now_ms, sample, self.store.as_mut());
                self.apply_decision(now_ms, decision);
            }
        }

        self.sync_gate(now_ms, was_accruing);
        self.collect_signals();
    }

    /// Periodic tick: gate accrual, control auto-hide, redirect timer
    pub fn tick(&mut self, now_ms: f64) {
        let sample = self.sample();
        if let Some(gate) = self.gate.as_mut() {
            let decision = gate.advance(now_ms, sample, self.store.as_mut());
            self.apply_decision(now_ms, decision);
        }

        if self.controls.tick(now_ms, self.engine.is_advancing()) {
            self.events.record(PlayerEvent::ControlsVisibility {
                visible: self.controls.is_visible(),
            });
        }

        self.fire_redirect(now_ms);
        self.collect_signals();
    }

    /// Emit the scheduled redirect once its deadline has passed
    pub fn fire_redirect(&mut self, now_ms: f64) -> bool {
        match self.pending_redirect.take() {
            Some(redirect) if now_ms >= redirect.due_ms => {
                info!(href = %redirect.href, "Redirecting to upgrade");
                self.events.record(PlayerEvent::Redirect { href: redirect.href });
                true
            }
            pending => {
                self.pending_redirect = pending;
                false
            }
        }
    }

    /// Viewer input from any device
    pub fn dispatch(&mut self, now_ms: f64, action: ControlAction) -> Result<ControlOutcome> {
        let was_advancing = self.engine.is_advancing();
        let was_accruing = self.accruing();

        let play_intent = match action {
            ControlAction::Play => true,
            ControlAction::PlayPause => !was_advancing,
            _ => false,
        };
        if play_intent && !was_advancing {
            // The first qualifying play arms the gate before media time moves
            let sample = PlaybackSample {
                advancing: false,
                media_clock: self.sample().media_clock,
            };
            if let Some(gate) = self.gate.as_mut().filter(|g| g.is_armed()) {
                let decision = gate.on_play_started(now_ms, sample, self.store.as_mut());
                self.apply_decision(now_ms, decision);
            }
        }

        let lock = match self.gate.as_ref().filter(|g| g.is_armed()) {
            Some(gate) => LockView {
                locked: gate.is_locked(),
                daily_cap_locked: gate.state().daily_cap_locked,
                upgrade_href: gate.params().cta_href.as_deref(),
            },
            None => LockView::default(),
        };
        let outcome = self.controls.dispatch(action, now_ms, &mut self.engine, lock);

        self.sync_gate(now_ms, was_accruing);
        self.collect_signals();
        outcome
    }

    /// External daily-quota signal
    pub fn set_daily_cap_reached(&mut self, now_ms: f64, reached: bool) {
        if let Some(gate) = self.gate.as_mut() {
            let decision = gate.set_daily_cap_reached(reached, self.store.as_mut());
            self.apply_decision(now_ms, decision);
        }
        self.collect_signals();
    }

    /// Confirmed entitlement upgrade: disarm the gate and resume
    pub fn confirm_entitlement(&mut self) -> Result<()> {
        let Some(gate) = self.gate.as_mut() else {
            return Ok(());
        };
        let was_locked = gate.is_locked();
        gate.confirm_entitlement();
        self.pending_redirect = None;
        self.engine.set_quality_ceiling(None);
        if was_locked || self.engine.is_locked() {
            self.engine.unlock()?;
        }
        self.events.record(PlayerEvent::Unlocked);
        self.collect_signals();
        Ok(())
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let armed_gate = self.gate.as_ref().filter(|g| g.is_armed());
        PlayerSnapshot {
            state: self.engine.display_state(),
            transport: self.engine.transport(),
            position: self.engine.position(),
            duration: self.engine.duration(),
            volume: self.engine.volume(),
            muted: self.engine.is_muted(),
            playback_rate: self.engine.playback_rate(),
            levels: self.engine.levels().to_vec(),
            current_level: self.engine.current_level(),
            quality_ceiling: self.engine.quality_ceiling(),
            controls_visible: self.controls.is_visible(),
            locked: self.is_locked(),
            gate_armed: armed_gate.is_some(),
            remaining_seconds: armed_gate.map(|g| g.remaining()),
            effective_elapsed: armed_gate.map(|g| g.effective_elapsed()),
            gate: self.gate.as_ref().map(|g| g.state().clone()),
            error: self.engine.last_error().map(str::to_string),
        }
    }

    /// Whether the gate should be crediting time. A frame keeps accruing once
    /// the preview started, even while hidden, since the embed can keep playing.
    fn accruing(&self) -> bool {
        match self.engine.transport() {
            Some(TransportType::Frame) => self
                .gate
                .as_ref()
                .is_some_and(|g| g.is_armed() && g.is_started() && !g.is_locked()),
            _ => self.engine.is_advancing(),
        }
    }

    fn sample(&self) -> PlaybackSample {
        let advancing = self.accruing();
        match self.engine.transport() {
            Some(TransportType::Frame) | None => PlaybackSample { advancing, media_clock: None },
            Some(_) => PlaybackSample {
                advancing,
                media_clock: Some(self.engine.position()),
            },
        }
    }

    /// Start or stop gate accrual when the accruing state flips
    fn sync_gate(&mut self, now_ms: f64, was_accruing: bool) {
        let advancing = self.accruing();
        if advancing == was_accruing {
            return;
        }

        let sample = self.sample();
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        let decision = if advancing {
            gate.on_play_started(now_ms, sample, self.store.as_mut())
        } else {
            gate.on_play_stopped(now_ms, sample.media_clock, self.store.as_mut())
        };
        let armed = gate.is_armed();
        self.apply_decision(now_ms, decision);

        if advancing && !armed {
            if let Some(position) = self.resume_position.take() {
                debug!(position, "Resuming from saved position");
                // Resume is best effort
                let _ = self.engine.seek(position);
            }
        }
    }

    fn stop_gate(&mut self, now_ms: f64) {
        if !self.accruing() {
            return;
        }
        let clock = self.sample().media_clock;
        if let Some(gate) = self.gate.as_mut() {
            let decision = gate.on_play_stopped(now_ms, clock, self.store.as_mut());
            self.apply_decision(now_ms, decision);
        }
    }

    fn apply_decision(&mut self, now_ms: f64, decision: GateDecision) {
        match decision {
            GateDecision::Lock(notice) => {
                self.engine.lock();
                let (content_label, upgrade_href, remaining_today) = match self.gate.as_ref() {
                    Some(gate) => (
                        gate.params().content_label.clone(),
                        gate.params().cta_href.clone(),
                        gate.params().remaining_today(),
                    ),
                    None => (None, None, None),
                };
                self.events.record(PlayerEvent::GateLocked {
                    reason: notice.reason,
                    effective_elapsed: notice.effective_elapsed,
                    content_label,
                    upgrade_href,
                    remaining_today,
                });
                if let Some(redirect) = notice.redirect {
                    self.events.record(PlayerEvent::RedirectScheduled {
                        href: redirect.href.clone(),
                        delay_ms: redirect.delay_ms,
                    });
                    self.pending_redirect = Some(PendingRedirect {
                        href: redirect.href,
                        due_ms: now_ms + redirect.delay_ms as f64,
                    });
                }
            }
            GateDecision::Locked => self.engine.lock(),
            GateDecision::Open { remaining } => {
                if !self.preview_announced {
                    self.preview_announced = true;
                    let (limit_seconds, remaining_today) = match self.gate.as_ref() {
                        Some(gate) => (gate.state().limit_seconds, gate.params().remaining_today()),
                        None => (0.0, None),
                    };
                    self.events.record(PlayerEvent::PreviewStart {
                        limit_seconds,
                        remaining_seconds: remaining,
                        remaining_today,
                    });
                }
            }
            GateDecision::Waiting | GateDecision::Disarmed => {}
        }
    }

    fn collect_signals(&mut self) {
        for signal in self.engine.drain_signals() {
            let event = match signal {
                EngineSignal::StateChanged { from, to } => PlayerEvent::StateChange { from, to },
                EngineSignal::Ready => PlayerEvent::Ready,
                EngineSignal::Failed { message } => PlayerEvent::Error { message },
                EngineSignal::LevelSwitched { index, height } => PlayerEvent::QualityChange { index, height },
                EngineSignal::Buffering(active) => PlayerEvent::Buffering { active },
            };
            self.events.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryFloorStore;
    use crate::surface::RecordingSurface;
    use std::sync::{Arc, Mutex};

    fn player(store: Arc<Mutex<MemoryFloorStore>>) -> (Player, RecordingSurface) {
        let surface = RecordingSurface::new();
        let player = Player::new(
            PlayerConfig::default(),
            GateSettings::default(),
            Box::new(surface.clone()),
            Box::new(store),
            true,
        );
        (player, surface)
    }

    fn request(url: &str, limit: f64) -> MountRequest {
        MountRequest {
            source: StreamSource::new(url),
            asset: AssetId::new("movie", "m1"),
            gate: ConversionGateConfig {
                enabled: true,
                preview_seconds: Some(limit),
                cta_href: Some("/subscribe".into()),
                ..Default::default()
            },
            entitled: false,
        }
    }

    fn events(player: &mut Player) -> Vec<PlayerEvent> {
        player.drain_events().into_iter().map(|r| r.event).collect()
    }

    #[test]
    fn test_mount_resolves_and_upgrades() {
        let (mut player, _) = player(Default::default());
        let resolved = player
            .mount(0.0, request("http://cdn.example.com/film.mp4", 60.0))
            .unwrap();
        assert_eq!(resolved.effective_url, "https://cdn.example.com/film.mp4");
        assert_eq!(resolved.transport_type, TransportType::File);
        assert_eq!(player.engine().state(), EngineState::Loading);
        assert!(player.is_gated());
    }

    #[test]
    fn test_preview_start_then_lock() {
        let (mut player, surface) = player(Default::default());
        player.mount(0.0, request("https://cdn.example.com/film.mp4", 5.0)).unwrap();
        player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: Some(600.0) });
        assert!(events(&mut player).contains(&PlayerEvent::Ready));

        player.dispatch(0.0, ControlAction::Play).unwrap();
        player.handle_media_event(100.0, &MediaEvent::Play);
        assert!(events(&mut player)
            .iter()
            .any(|e| matches!(e, PlayerEvent::PreviewStart { limit_seconds, .. } if *limit_seconds == 5.0)));

        let mut now = 100.0;
        while now < 6_000.0 {
            now += 500.0;
            player.tick(now);
        }
        assert!(player.is_locked());
        assert_eq!(player.engine().state(), EngineState::Locked);
        assert!(surface.commands().contains(&MediaCommand::Pause));
        let locked = events(&mut player)
            .into_iter()
            .filter(|e| matches!(e, PlayerEvent::GateLocked { .. }))
            .count();
        assert_eq!(locked, 1);

        let outcome = player.dispatch(now, ControlAction::Play).unwrap();
        assert_eq!(outcome, ControlOutcome::UpgradeRequired { href: Some("/subscribe".into()) });
    }

    #[test]
    fn test_frame_accrues_without_media_clock() {
        let (mut player, _) = player(Default::default());
        player
            .mount(0.0, request("https://embed.example.com/e/abc", 10.0))
            .unwrap();
        player.handle_media_event(0.0, &MediaEvent::FrameLoaded);
        player.dispatch(1_000.0, ControlAction::Play).unwrap();
        assert!(player.engine().is_advancing());

        player.tick(6_000.0);
        assert!(!player.is_locked());
        player.tick(11_000.0);
        assert!(player.is_locked());
    }

    #[test]
    fn test_hidden_frame_keeps_accruing() {
        let (mut player, surface) = player(Default::default());
        player
            .mount(0.0, request("https://embed.example.com/e/abc", 10.0))
            .unwrap();
        player.handle_media_event(0.0, &MediaEvent::FrameLoaded);
        player.dispatch(0.0, ControlAction::Play).unwrap();
        player.tick(2_000.0);

        player.dispatch(2_000.0, ControlAction::PlayPause).unwrap();
        assert!(surface.commands().contains(&MediaCommand::SetFrameVisible { visible: false }));
        assert!(!player.engine().is_advancing());

        let mut now = 2_000.0;
        while now < 12_000.0 {
            now += 500.0;
            player.tick(now);
        }
        assert!(player.is_locked());
        let elapsed = player.snapshot().effective_elapsed.unwrap();
        assert!(elapsed >= 10.0 && elapsed < 11.0);
    }

    #[test]
    fn test_redirect_fires_after_delay() {
        let (mut player, _) = player(Default::default());
        let mut req = request("https://cdn.example.com/film.mp4", 60.0);
        req.gate.reached_daily_limit = true;
        req.gate.force_redirect_on_lock = true;
        req.gate.redirect_delay_ms = Some(1_000);
        player.mount(0.0, req).unwrap();
        player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: None });

        let outcome = player.dispatch(0.0, ControlAction::Play).unwrap();
        assert!(matches!(outcome, ControlOutcome::UpgradeRequired { .. }));
        assert_eq!(player.redirect_deadline(), Some(1_000.0));

        player.tick(500.0);
        assert!(!events(&mut player).iter().any(|e| matches!(e, PlayerEvent::Redirect { .. })));
        player.tick(1_000.0);
        assert!(events(&mut player).contains(&PlayerEvent::Redirect { href: "/subscribe".into() }));
        assert_eq!(player.redirect_deadline(), None);
    }

    #[test]
    fn test_entitled_viewer_resumes() {
        let (mut player, surface) = player(Default::default());
        let mut req = request("https://cdn.example.com/film.mp4", 1.0);
        req.entitled = true;
        player.mount(0.0, req).unwrap();
        player.set_resume_position(Some(420.0));
        player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: Some(3600.0) });
        player.dispatch(0.0, ControlAction::Play).unwrap();
        player.handle_media_event(10.0, &MediaEvent::Play);

        assert!(surface.commands().contains(&MediaCommand::Seek { position: 420.0 }));
        player.tick(60_000.0);
        assert!(!player.is_locked());
    }

    #[test]
    fn test_confirm_entitlement_unlocks() {
        let (mut player, surface) = player(Default::default());
        let mut req = request("https://cdn.example.com/master.m3u8", 60.0);
        req.gate.reached_daily_limit = true;
        req.gate.quality_cap = Some(480);
        player.mount(0.0, req).unwrap();
        player.dispatch(0.0, ControlAction::Play).unwrap();
        assert!(player.is_locked());

        surface.clear();
        player.confirm_entitlement().unwrap();
        assert!(!player.is_locked());
        assert!(!player.is_gated());
        assert_eq!(player.engine().state(), EngineState::Loading);
        assert_eq!(player.engine().quality_ceiling(), None);
        assert!(events(&mut player).contains(&PlayerEvent::Unlocked));
    }
}
