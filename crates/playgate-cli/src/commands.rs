//! CLI command implementations

use crate::output::{self, EventRow, FloorRow, LevelRow, OutputFormat};
use anyhow::Context;
use playgate_core::resolver::obfuscate_url;
use playgate_core::{
    capped_level, AssetId, ControlAction, ConversionGateConfig, DeclaredType, FloorStore, GateSettings,
    HttpManifestLoader, JsonFileFloorStore, ManifestLoader, MediaCommand, MediaEvent, MountRequest, Player,
    PlayerConfig, PlayerEventRecord, QualityLevel, RecordingSurface, RetryPolicy, StreamResolver,
    StreamSource, TransportType,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Duration reported for simulated progressive sources
const SIMULATED_DURATION_SECS: f64 = 5_400.0;

/// Parse `type:id` into an asset identity
pub fn parse_asset(value: &str) -> anyhow::Result<AssetId> {
    match value.split_once(':') {
        Some((content_type, content_id)) if !content_type.is_empty() && !content_id.is_empty() => {
            Ok(AssetId::new(content_type, content_id))
        }
        _ => anyhow::bail!("asset must look like type:id, got '{}'", value),
    }
}

/// Resolve a source URL
pub fn resolve(
    url: &str,
    protected: bool,
    declared_type: Option<&str>,
    secure_origin: bool,
    format: &str,
) -> anyhow::Result<()> {
    let mut source = StreamSource::new(url);
    if protected {
        source = source.obfuscated();
    }
    if let Some(declared) = declared_type {
        source = source.with_type(declared.parse::<DeclaredType>()?);
    }

    let resolver = StreamResolver::new(secure_origin, PlayerConfig::default().live_signatures);
    let resolved = resolver.resolve(&source);

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::format_output(&resolved, format)),
        OutputFormat::Table | OutputFormat::Text => {
            println!("Resolved source:");
            println!("  URL:       {}", resolved.effective_url);
            println!("  Transport: {}", resolved.transport_type);
        }
    }
    Ok(())
}

/// Print the protected form of a URL
pub fn protect(url: &str) {
    println!("{}", obfuscate_url(url));
}

/// List quality levels of a master playlist
pub async fn levels(manifest_url: &str, cap: Option<u32>, format: &str) -> anyhow::Result<()> {
    let url = Url::parse(manifest_url)?;
    let loader = HttpManifestLoader::new(RetryPolicy::default().manifest);
    let manifest = loader.load(&url).await?;

    let capped = cap.and_then(|c| capped_level(&manifest.levels, c));
    let rows: Vec<LevelRow> = manifest
        .levels
        .iter()
        .map(|level| LevelRow::new(level, cap, capped))
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "url": manifest_url,
                "multivariant": manifest.is_multivariant,
                "levels": manifest.levels,
                "cappedIndex": capped,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table | OutputFormat::Text => {
            if rows.is_empty() {
                println!("Single-variant stream, no quality levels");
            } else {
                println!("{}", output::table(rows));
            }
        }
    }
    Ok(())
}

/// Options of the `simulate` command
pub struct SimulateOptions {
    pub url: String,
    pub asset: String,
    pub preview_seconds: Option<f64>,
    pub drain: Option<f64>,
    pub watch_secs: f64,
    pub seek_to: Option<f64>,
    pub daily_cap_reached: bool,
    pub entitled: bool,
    pub cta: Option<String>,
    pub redirect: bool,
    pub store: PathBuf,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Plays the part of the host media surface: echoes commands back as events
struct SimulatedHost {
    surface: RecordingSurface,
    position: f64,
    playing: bool,
    verbose: bool,
}

impl SimulatedHost {
    fn new(surface: RecordingSurface, verbose: bool) -> Self {
        Self {
            surface,
            position: 0.0,
            playing: false,
            verbose,
        }
    }

    fn settle(&mut self, player: &mut Player, now_ms: f64) {
        // Each reply may trigger further commands
        for _ in 0..4 {
            let commands = self.surface.take();
            if commands.is_empty() {
                return;
            }
            for command in commands {
                if self.verbose {
                    println!("  {:>8.1}s  -> {:?}", now_ms / 1000.0, command);
                }
                let reply = match command {
                    MediaCommand::Play => {
                        self.playing = true;
                        Some(MediaEvent::Play)
                    }
                    MediaCommand::Pause | MediaCommand::StopLoad => {
                        let was_playing = std::mem::replace(&mut self.playing, false);
                        was_playing.then_some(MediaEvent::Pause)
                    }
                    MediaCommand::Seek { position } => {
                        self.position = position;
                        Some(MediaEvent::TimeUpdate { position })
                    }
                    MediaCommand::Detach => {
                        self.playing = false;
                        self.position = 0.0;
                        None
                    }
                    _ => None,
                };
                if let Some(event) = reply {
                    player.handle_media_event(now_ms, &event);
                }
            }
        }
    }

    fn advance(&mut self, player: &mut Player, now_ms: f64, step_secs: f64) {
        if !self.playing {
            return;
        }
        self.position += step_secs * player.engine().playback_rate();
        player.handle_media_event(now_ms, &MediaEvent::TimeUpdate { position: self.position });
    }
}

/// Quality ladder reported for simulated segmented sources
fn simulated_ladder() -> Vec<QualityLevel> {
    [(640, 360, 800_000), (854, 480, 1_400_000), (1280, 720, 2_800_000), (1920, 1080, 5_000_000)]
        .iter()
        .enumerate()
        .map(|(index, &(width, height, bitrate))| QualityLevel {
            index,
            width,
            height,
            bitrate,
        })
        .collect()
}

/// Drive a player through a scripted viewing session
pub fn simulate(options: SimulateOptions, format: &str) -> anyhow::Result<()> {
    let config = match &options.config {
        Some(path) => PlayerConfig::from_file(path)
            .with_context(|| format!("loading player config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    let asset = parse_asset(&options.asset)?;
    let step_ms = config.tick_interval_ms.max(1) as f64;

    let surface = RecordingSurface::new();
    let mut host = SimulatedHost::new(surface.clone(), options.verbose);
    let mut player = Player::new(
        config,
        GateSettings::default(),
        Box::new(surface),
        Box::new(JsonFileFloorStore::new(&options.store)),
        true,
    );

    let gate = ConversionGateConfig {
        enabled: true,
        preview_seconds: options.preview_seconds,
        timer_speed_multiplier: options.drain,
        reached_daily_limit: options.daily_cap_reached,
        cta_href: options.cta.clone(),
        force_redirect_on_lock: options.redirect,
        ..Default::default()
    };

    let resolved = player.mount(
        0.0,
        MountRequest {
            source: StreamSource::new(options.url.as_str()),
            asset: asset.clone(),
            gate,
            entitled: options.entitled,
        },
    )?;
    info!(asset = %asset, transport = %resolved.transport_type, "Simulating");

    let mut timeline: Vec<(f64, PlayerEventRecord)> = Vec::new();
    let mut now = 0.0;

    let ready = match resolved.transport_type {
        TransportType::Segmented => MediaEvent::ManifestParsed { levels: simulated_ladder() },
        TransportType::Frame => MediaEvent::FrameLoaded,
        TransportType::Manifest | TransportType::File => MediaEvent::LoadedMetadata {
            duration: Some(SIMULATED_DURATION_SECS),
        },
    };
    host.settle(&mut player, now);
    player.handle_media_event(now, &ready);
    let outcome = player.dispatch(now, ControlAction::Play)?;
    debug!(outcome = ?outcome, "Play requested");
    host.settle(&mut player, now);
    timeline.extend(player.drain_events().into_iter().map(|r| (now, r)));

    let mut seek_pending = options.seek_to;
    let end = options.watch_secs.max(0.0) * 1000.0;
    while now < end {
        now += step_ms;
        host.advance(&mut player, now, step_ms / 1000.0);
        player.tick(now);

        if now >= 1000.0 {
            if let Some(target) = seek_pending.take() {
                player.dispatch(now, ControlAction::SeekTo(target))?;
            }
        }
        host.settle(&mut player, now);
        timeline.extend(player.drain_events().into_iter().map(|r| (now, r)));

        if player.is_locked() {
            break;
        }
    }

    // Let a scheduled redirect fire
    if let Some(deadline) = player.redirect_deadline() {
        now = now.max(deadline);
        player.tick(now);
        timeline.extend(player.drain_events().into_iter().map(|r| (now, r)));
    }

    let snapshot = player.snapshot();
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let events: Vec<_> = timeline
                .iter()
                .map(|(at, record)| serde_json::json!({ "atSeconds": at / 1000.0, "record": record }))
                .collect();
            let report = serde_json::json!({
                "resolved": resolved,
                "events": events,
                "snapshot": snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let rows: Vec<EventRow> = timeline.iter().map(|(at, r)| EventRow::new(*at, &r.event)).collect();
            println!("{}", output::table(rows));
            output::print_summary(&snapshot);
        }
        OutputFormat::Text => {
            for (at, record) in &timeline {
                println!("  {:>8.1}s  {}", at / 1000.0, output::describe(&record.event));
            }
            output::print_summary(&snapshot);
        }
    }
    Ok(())
}

/// Show every stored floor
pub fn floor_show(store: &Path, format: &str) -> anyhow::Result<()> {
    let entries = JsonFileFloorStore::new(store).entries()?;
    let mut rows: Vec<FloorRow> = entries
        .into_iter()
        .map(|(asset, seconds)| FloorRow { asset, seconds: format!("{:.1}", seconds) })
        .collect();
    rows.sort_by(|a, b| a.asset.cmp(&b.asset));

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::format_output(&rows, format)),
        OutputFormat::Table | OutputFormat::Text => {
            if rows.is_empty() {
                println!("No floors stored in {}", store.display());
            } else {
                println!("{}", output::table(rows));
            }
        }
    }
    Ok(())
}

/// Forget the floor of one asset
pub fn floor_clear(store: &Path, asset: &str) -> anyhow::Result<()> {
    let asset = parse_asset(asset)?;
    let mut floors = JsonFileFloorStore::new(store);
    floors.remove(&asset.storage_key())?;
    println!("Cleared preview floor for {}", asset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset() {
        let asset = parse_asset("episode:s01e02").unwrap();
        assert_eq!(asset.content_type, "episode");
        assert_eq!(asset.content_id, "s01e02");
        assert!(parse_asset("no-colon").is_err());
        assert!(parse_asset(":id").is_err());
    }

    #[test]
    fn test_simulated_host_echoes_play() {
        let surface = RecordingSurface::new();
        let mut host = SimulatedHost::new(surface.clone(), false);
        let mut player = Player::new(
            PlayerConfig::default(),
            GateSettings::default(),
            Box::new(surface),
            Box::new(playgate_core::MemoryFloorStore::new()),
            true,
        );
        player
            .mount(
                0.0,
                MountRequest {
                    source: StreamSource::new("https://cdn.example.com/film.mp4"),
                    asset: AssetId::new("movie", "film"),
                    gate: ConversionGateConfig::default(),
                    entitled: false,
                },
            )
            .unwrap();
        player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: Some(60.0) });
        player.dispatch(0.0, ControlAction::Play).unwrap();
        host.settle(&mut player, 0.0);

        assert_eq!(player.engine().state(), playgate_core::EngineState::Playing);
        host.advance(&mut player, 500.0, 0.5);
        assert_eq!(player.engine().position(), 0.5);
    }
}
