//! Player session
//!
//! Hosts a [`Player`] on the tokio runtime: owns the gate tick timer, the
//! redirect timer and the progress reporter task, and forwards player events
//! to the page through an [`EventEmitter`]. Every timer belongs to one mount
//! and is aborted when the source changes or the session drops.

use crate::controls::{ControlAction, ControlOutcome};
use crate::entitlement::{EntitlementProvider, RedeemResult};
use crate::events::{EventEmitter, PlayerEventRecord};
use crate::player::{MountRequest, Player, PlayerSnapshot};
use crate::progress::{ProgressApi, ProgressReporter};
use crate::types::*;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Monotonic milliseconds since the session started
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn instant_at(&self, ms: f64) -> Instant {
        self.origin + Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Viewer account used for progress reporting
#[derive(Clone)]
struct ProgressTarget {
    api: Arc<dyn ProgressApi>,
    user_id: String,
}

pub struct PlayerSession {
    player: Arc<Mutex<Player>>,
    emitter: Arc<EventEmitter>,
    clock: SessionClock,
    entitlement: Option<Arc<dyn EntitlementProvider>>,
    progress: Option<ProgressTarget>,
    tasks: Vec<JoinHandle<()>>,
}

impl PlayerSession {
    /// Create a session and the stream of page events
    pub fn new(player: Player) -> (Self, mpsc::Receiver<PlayerEventRecord>) {
        let (emitter, events) = EventEmitter::channel(256);
        let session = Self {
            player: Arc::new(Mutex::new(player)),
            emitter: Arc::new(emitter),
            clock: SessionClock::new(),
            entitlement: None,
            progress: None,
            tasks: Vec::new(),
        };
        (session, events)
    }

    pub fn with_entitlement(mut self, provider: Arc<dyn EntitlementProvider>) -> Self {
        self.entitlement = Some(provider);
        self
    }

    pub fn with_progress(mut self, api: Arc<dyn ProgressApi>, user_id: impl Into<String>) -> Self {
        self.progress = Some(ProgressTarget {
            api,
            user_id: user_id.into(),
        });
        self
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Mount an asset. Entitlement is looked up first so the gate never arms for premium viewers.
    #[instrument(skip(self, source, asset, gate), fields(asset = %asset))]
    pub async fn mount(
        &mut self,
        source: StreamSource,
        asset: AssetId,
        gate: crate::config::ConversionGateConfig,
    ) -> Result<ResolvedSource> {
        self.teardown();

        let entitled = match &self.entitlement {
            Some(provider) => provider.is_premium().await.unwrap_or_else(|e| {
                warn!(error = %e, "Entitlement lookup failed, treating viewer as free");
                false
            }),
            None => false,
        };

        let resume = match (&self.progress, entitled) {
            (Some(target), true) => match target.api.resume(&target.user_id, &asset).await {
                Ok(resume) => resume.start_at(),
                Err(e) => {
                    warn!(error = %e, "Resume lookup failed");
                    None
                }
            },
            _ => None,
        };

        let request = MountRequest {
            source,
            asset: asset.clone(),
            gate,
            entitled,
        };
        let resolved = self
            .with_player(|player, now| {
                let resolved = player.mount(now, request)?;
                player.set_resume_position(resume);
                Ok::<_, Error>(resolved)
            })
            .await?;

        self.spawn_ticker().await;
        if entitled {
            self.spawn_progress(asset).await;
        }
        info!(entitled, transport = %resolved.transport_type, "Session mounted");
        Ok(resolved)
    }

    /// Switch mirror for the current asset
    pub async fn switch_source(&self, source: StreamSource) -> Result<ResolvedSource> {
        self.with_player(|player, now| player.switch_source(now, source)).await
    }

    pub async fn handle_media_event(&self, event: MediaEvent) {
        self.with_player(|player, now| player.handle_media_event(now, &event))
            .await
    }

    pub async fn dispatch(&self, action: ControlAction) -> Result<ControlOutcome> {
        self.with_player(|player, now| player.dispatch(now, action)).await
    }

    pub async fn set_daily_cap_reached(&self, reached: bool) {
        self.with_player(|player, now| player.set_daily_cap_reached(now, reached))
            .await
    }

    /// Redeem a code for the mounted asset; success disarms the gate and
    /// starts progress reporting
    #[instrument(skip(self, code))]
    pub async fn redeem(&mut self, code: &str) -> Result<RedeemResult> {
        let provider = self
            .entitlement
            .clone()
            .ok_or_else(|| Error::Redeem("no entitlement provider configured".into()))?;
        let (asset, was_gated) = {
            let player = self.player.lock().await;
            let asset = player.asset().cloned().ok_or(Error::NoSource)?;
            (asset, player.is_gated())
        };

        let result = provider.redeem_code(code, &asset).await?;
        if result.success {
            self.with_player(|player, _| player.confirm_entitlement()).await?;
            // Entitled mounts already report
            if was_gated {
                self.spawn_progress(asset).await;
            }
        } else {
            info!(error = ?result.error, "Redeem code rejected");
        }
        Ok(result)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.player.lock().await.snapshot()
    }

    /// Stop all timers and unmount
    pub async fn unmount(&mut self) {
        self.teardown();
        self.with_player(|player, now| player.unmount(now)).await
    }

    /// Run `f` against the player at the current time, then forward its events
    async fn with_player<R>(&self, f: impl FnOnce(&mut Player, f64) -> R) -> R {
        let (result, records) = {
            let mut player = self.player.lock().await;
            let result = f(&mut player, self.clock.now_ms());
            (result, player.drain_events())
        };
        self.emitter.emit_all(records).await;
        result
    }

    async fn spawn_ticker(&mut self) {
        let player = self.player.clone();
        let emitter = self.emitter.clone();
        let clock = self.clock;
        let period = Duration::from_millis(player.lock().await.config().tick_interval_ms);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let redirect_at = player.lock().await.redirect_deadline();
                let redirect_due = tokio::select! {
                    _ = interval.tick() => false,
                    _ = sleep_until_deadline(clock, redirect_at) => true,
                };

                // Float round-trip of the deadline must not leave the redirect pending
                let now = match redirect_at {
                    Some(due) if redirect_due => clock.now_ms().max(due),
                    _ => clock.now_ms(),
                };
                let records = {
                    let mut player = player.lock().await;
                    player.tick(now);
                    player.drain_events()
                };
                emitter.emit_all(records).await;
            }
        });
        self.tasks.push(handle);
    }

    async fn spawn_progress(&mut self, asset: AssetId) {
        let Some(target) = self.progress.clone() else {
            return;
        };
        let player = self.player.clone();
        let clock = self.clock;
        let interval_secs = player.lock().await.config().progress_interval_secs.max(1);

        let handle = tokio::spawn(async move {
            let mut reporter = ProgressReporter::new(target.user_id.clone(), asset, interval_secs);
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let update = {
                    let player = player.lock().await;
                    let engine = player.engine();
                    if engine.is_advancing() {
                        reporter.due(clock.now_ms(), engine.position(), engine.duration())
                    } else {
                        reporter.flush(clock.now_ms(), engine.position(), engine.duration())
                    }
                };
                if let Some(update) = update {
                    if let Err(e) = target.api.save(&update).await {
                        warn!(error = %e, "Progress report failed");
                    }
                }
            }
        });
        self.tasks.push(handle);
    }

    fn teardown(&mut self) {
        if !self.tasks.is_empty() {
            debug!(tasks = self.tasks.len(), "Stopping session timers");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn sleep_until_deadline(clock: SessionClock, deadline_ms: Option<f64>) {
    match deadline_ms {
        Some(ms) => tokio::time::sleep_until(clock.instant_at(ms)).await,
        None => std::future::pending::<()>().await,
    }
}
