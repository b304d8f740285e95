//! Integration tests for Playgate Core

use playgate_core::{
    key_action, AssetId, ControlAction, ControlOutcome, ConversionGateConfig, EngineState, FloorStore,
    GateSettings, LockReason, MediaCommand, MediaEvent, MemoryFloorStore, MountRequest, Player,
    PlayerConfig, PlayerEvent, QualityLevel, RecordingSurface, StreamResolver, StreamSource,
    TransportType,
};
use std::sync::{Arc, Mutex};

type SharedStore = Arc<Mutex<MemoryFloorStore>>;

const MIRROR_A: &str = "https://mirror-a.example.com/movies/heist.mp4";
const MIRROR_B: &str = "https://mirror-b.example.net/v/heist.mp4";

fn new_player(store: &SharedStore) -> (Player, RecordingSurface) {
    let surface = RecordingSurface::new();
    let player = Player::new(
        PlayerConfig::default(),
        GateSettings::default(),
        Box::new(surface.clone()),
        Box::new(store.clone()),
        true,
    );
    (player, surface)
}

fn gate(limit: f64, drain: f64) -> ConversionGateConfig {
    ConversionGateConfig {
        enabled: true,
        preview_seconds: Some(limit),
        timer_speed_multiplier: Some(drain),
        cta_href: Some("/pricing".into()),
        ..Default::default()
    }
}

fn heist() -> AssetId {
    AssetId::new("movie", "heist")
}

fn mount(player: &mut Player, now: f64, url: &str, gate: ConversionGateConfig) {
    player
        .mount(
            now,
            MountRequest {
                source: StreamSource::new(url),
                asset: heist(),
                gate,
                entitled: false,
            },
        )
        .unwrap();
    player.handle_media_event(now, &MediaEvent::LoadedMetadata { duration: Some(5_400.0) });
}

fn press_play(player: &mut Player, now: f64) {
    player.dispatch(now, ControlAction::Play).unwrap();
    player.handle_media_event(now, &MediaEvent::Play);
}

/// Play `secs` of media in 500ms steps, firing both the tick and `timeupdate`
fn play_for(player: &mut Player, now: f64, secs: f64) -> f64 {
    let mut now = now;
    let mut position = player.engine().position();
    let end = now + secs * 1000.0;
    while now < end {
        now += 500.0;
        position += 0.5;
        player.handle_media_event(now, &MediaEvent::TimeUpdate { position });
        player.tick(now);
    }
    now
}

fn floor(store: &SharedStore) -> f64 {
    store.read(&heist().storage_key()).unwrap().unwrap_or(0.0)
}

fn lock_events(player: &mut Player) -> Vec<PlayerEvent> {
    player
        .drain_events()
        .into_iter()
        .map(|r| r.event)
        .filter(|e| matches!(e, PlayerEvent::GateLocked { .. }))
        .collect()
}

fn levels() -> Vec<QualityLevel> {
    [(640, 360), (854, 480), (1280, 720), (1920, 1080)]
        .iter()
        .enumerate()
        .map(|(index, &(width, height))| QualityLevel {
            index,
            width,
            height,
            bitrate: height as u64 * 3_000,
        })
        .collect()
}

// =============================================================================
// Preview Gate Properties
// =============================================================================

#[test]
fn test_persisted_floor_is_monotonic() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    let mut floors = Vec::new();

    mount(&mut player, 0.0, MIRROR_A, gate(600.0, 1.0));
    press_play(&mut player, 0.0);
    let mut now = play_for(&mut player, 0.0, 10.0);
    floors.push(floor(&store));

    // Pause and sit idle
    player.handle_media_event(now, &MediaEvent::Pause);
    now += 60_000.0;
    player.tick(now);
    floors.push(floor(&store));

    // Seek backwards and resume
    player.dispatch(now, ControlAction::SeekTo(2.0)).unwrap();
    player.handle_media_event(now, &MediaEvent::TimeUpdate { position: 2.0 });
    press_play(&mut player, now);
    now = play_for(&mut player, now, 5.0);
    floors.push(floor(&store));

    // Mirror switch resets the media clock
    player.switch_source(now, StreamSource::new(MIRROR_B)).unwrap();
    player.handle_media_event(now, &MediaEvent::LoadedMetadata { duration: Some(5_400.0) });
    floors.push(floor(&store));
    press_play(&mut player, now);
    now = play_for(&mut player, now, 5.0);
    floors.push(floor(&store));

    // Reload of the same asset
    let (mut reloaded, _) = new_player(&store);
    mount(&mut reloaded, now, MIRROR_A, gate(600.0, 1.0));
    press_play(&mut reloaded, now);
    floors.push(floor(&store));
    play_for(&mut reloaded, now, 1.0);
    floors.push(floor(&store));

    assert!(floors.windows(2).all(|w| w[1] >= w[0]), "floor decreased: {:?}", floors);
    assert_eq!(floors[0], 10.0);
    assert_eq!(floors.last().copied(), Some(21.0));
}

#[test]
fn test_tick_and_timeupdate_do_not_double_count() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(600.0, 1.0));
    press_play(&mut player, 0.0);

    player.tick(250.0);
    player.handle_media_event(250.0, &MediaEvent::TimeUpdate { position: 0.25 });
    player.handle_media_event(500.0, &MediaEvent::TimeUpdate { position: 0.5 });
    player.tick(500.0);

    let state = player.snapshot().gate.unwrap();
    assert_eq!(state.accumulated_seconds, 0.5);
}

#[test]
fn test_lock_is_one_way() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(5.0, 1.0));
    press_play(&mut player, 0.0);
    let now = play_for(&mut player, 0.0, 6.0);
    assert_eq!(player.engine().state(), EngineState::Locked);

    let attempts = [
        ControlAction::Play,
        ControlAction::PlayPause,
        ControlAction::SeekTo(1.0),
        ControlAction::SkipBackward,
        ControlAction::SelectQuality(Some(0)),
        ControlAction::SelectQuality(None),
        ControlAction::SetPlaybackRate(0.5),
        ControlAction::ToggleFullscreen,
        ControlAction::Retry,
    ];
    for action in attempts {
        let outcome = player.dispatch(now, action).unwrap();
        assert!(
            matches!(outcome, ControlOutcome::Blocked | ControlOutcome::UpgradeRequired { .. }),
            "{:?} was not refused",
            action
        );
        player.handle_media_event(now, &MediaEvent::Play);
        player.handle_media_event(now, &MediaEvent::Playing);
        assert_eq!(player.engine().state(), EngineState::Locked);
    }

    assert!(player.switch_source(now, StreamSource::new(MIRROR_B)).is_err());
    player.set_daily_cap_reached(now, false);
    assert!(player.is_locked());
}

#[test]
fn test_mirror_switch_does_not_reset_budget() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(60.0, 1.0));
    press_play(&mut player, 0.0);
    let mut now = play_for(&mut player, 0.0, 50.0);
    assert!(!player.is_locked());

    player.switch_source(now, StreamSource::new(MIRROR_B)).unwrap();
    player.handle_media_event(now, &MediaEvent::LoadedMetadata { duration: Some(5_400.0) });
    assert_eq!(player.engine().position(), 0.0);
    press_play(&mut player, now);

    now = play_for(&mut player, now, 9.0);
    assert!(!player.is_locked());
    play_for(&mut player, now, 6.0);

    assert!(player.is_locked());
    let locked = lock_events(&mut player);
    assert_eq!(locked.len(), 1);
    match &locked[0] {
        PlayerEvent::GateLocked { reason, effective_elapsed, .. } => {
            assert_eq!(*reason, LockReason::PreviewExhausted);
            assert_eq!(*effective_elapsed, 60.0);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_floor_survives_reload() {
    let store = SharedStore::default();
    let (mut first, _) = new_player(&store);
    mount(&mut first, 0.0, MIRROR_A, gate(30.0, 1.0));
    press_play(&mut first, 0.0);
    play_for(&mut first, 0.0, 20.0);
    drop(first);

    let (mut second, _) = new_player(&store);
    mount(&mut second, 0.0, MIRROR_B, gate(30.0, 1.0));
    press_play(&mut second, 0.0);
    let now = play_for(&mut second, 0.0, 9.5);
    assert!(!second.is_locked());
    play_for(&mut second, now, 0.5);
    assert!(second.is_locked());
}

#[test]
fn test_seek_past_budget_locks() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(120.0, 1.0));
    press_play(&mut player, 0.0);
    player.dispatch(1_000.0, ControlAction::SeekTo(900.0)).unwrap();
    player.handle_media_event(1_000.0, &MediaEvent::TimeUpdate { position: 900.0 });
    assert!(player.is_locked());
}

#[test]
fn test_drain_multiplier_scenario() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(30.0, 2.0));
    press_play(&mut player, 0.0);

    let now = play_for(&mut player, 0.0, 14.5);
    assert!(!player.is_locked());
    assert_eq!(player.snapshot().gate.unwrap().accumulated_seconds, 29.0);

    play_for(&mut player, now, 0.5);
    assert!(player.is_locked());
    let state = player.snapshot().gate.unwrap();
    assert!((state.accumulated_seconds - 30.0).abs() < 1e-9);
}

#[test]
fn test_premium_viewer_is_never_gated() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    player
        .mount(
            0.0,
            MountRequest {
                source: StreamSource::new(MIRROR_A),
                asset: heist(),
                gate: gate(1.0, 12.0),
                entitled: true,
            },
        )
        .unwrap();
    player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: Some(5_400.0) });
    press_play(&mut player, 0.0);
    play_for(&mut player, 0.0, 120.0);

    assert!(!player.is_gated());
    assert!(!player.is_locked());
    assert_eq!(player.engine().state(), EngineState::Playing);
    assert_eq!(floor(&store), 0.0);
}

#[test]
fn test_daily_cap_locks_on_first_play() {
    let store = SharedStore::default();
    let (mut player, surface) = new_player(&store);
    let mut config = gate(600.0, 1.0);
    config.reached_daily_limit = true;
    config.daily_limit = Some(2);
    config.used_today = Some(2);
    mount(&mut player, 0.0, MIRROR_A, config);
    surface.clear();

    let outcome = player.dispatch(0.0, ControlAction::Play).unwrap();
    assert_eq!(outcome, ControlOutcome::UpgradeRequired { href: Some("/pricing".into()) });
    assert!(player.is_locked());
    assert!(!surface.commands().contains(&MediaCommand::Play));

    match lock_events(&mut player).as_slice() {
        [PlayerEvent::GateLocked { reason, effective_elapsed, remaining_today, .. }] => {
            assert_eq!(*reason, LockReason::DailyLimitReached);
            assert_eq!(*effective_elapsed, 0.0);
            assert_eq!(*remaining_today, Some(0));
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[test]
fn test_daily_cap_signal_during_playback() {
    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(600.0, 1.0));
    press_play(&mut player, 0.0);
    let now = play_for(&mut player, 0.0, 3.0);

    player.set_daily_cap_reached(now, true);
    assert!(player.is_locked());
}

// =============================================================================
// Quality Ceiling
// =============================================================================

#[test]
fn test_quality_ceiling_refuses_higher_levels() {
    let store = SharedStore::default();
    let (mut player, surface) = new_player(&store);
    let mut config = gate(600.0, 1.0);
    config.quality_cap = Some(720);
    player
        .mount(
            0.0,
            MountRequest {
                source: StreamSource::new("https://cdn.example.com/heist/master.m3u8"),
                asset: heist(),
                gate: config,
                entitled: false,
            },
        )
        .unwrap();
    player.handle_media_event(0.0, &MediaEvent::ManifestParsed { levels: levels() });
    assert_eq!(player.engine().transport(), Some(TransportType::Segmented));
    assert!(surface.commands().contains(&MediaCommand::SetMaxLevel { index: Some(2) }));

    let outcome = player.dispatch(0.0, ControlAction::SelectQuality(Some(3))).unwrap();
    assert_eq!(outcome, ControlOutcome::UpgradeRequired { href: Some("/pricing".into()) });
    assert!(!surface.commands().contains(&MediaCommand::SetLevel { index: Some(3) }));

    // The adaptive client trying 1080 on its own is pinned back
    player.handle_media_event(0.0, &MediaEvent::LevelSwitched { index: 3 });
    assert_ne!(player.engine().current_level(), Some(3));

    for index in [1, 2] {
        let outcome = player.dispatch(0.0, ControlAction::SelectQuality(Some(index))).unwrap();
        assert_eq!(outcome, ControlOutcome::Applied);
        player.handle_media_event(0.0, &MediaEvent::LevelSwitched { index });
        assert_eq!(player.engine().current_level(), Some(index));
    }
}

// =============================================================================
// Controls Surface
// =============================================================================

#[test]
fn test_shortcuts_share_the_lock_check() {
    let store = SharedStore::default();
    let (mut player, surface) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, gate(2.0, 1.0));
    press_play(&mut player, 0.0);
    player.handle_media_event(0.0, &MediaEvent::FullscreenChange { active: true, native: true });
    surface.clear();

    let now = play_for(&mut player, 0.0, 3.0);
    assert!(player.is_locked());
    assert!(surface.commands().contains(&MediaCommand::ExitFullscreen));

    for key in ["ArrowRight", "f", "p", " "] {
        let action = key_action(key).unwrap();
        let outcome = player.dispatch(now, action).unwrap();
        assert_ne!(outcome, ControlOutcome::Applied, "{} bypassed the lock", key);
    }
}

// =============================================================================
// Stream Resolver
// =============================================================================

#[test]
fn test_resolver_end_to_end() {
    let resolver = StreamResolver::new(true, PlayerConfig::default().live_signatures);

    let protected = StreamSource::new(playgate_core::resolver::obfuscate_url(
        "http://live.example.com/channel/index.m3u8",
    ))
    .obfuscated();
    let resolved = resolver.resolve(&protected);
    assert_eq!(resolved.effective_url, "https://live.example.com/channel/index.m3u8");
    assert_eq!(resolved.transport_type, TransportType::Segmented);

    let garbage = StreamSource::new("not base64 at all!").obfuscated();
    assert_eq!(resolver.resolve(&garbage).transport_type, TransportType::Frame);

    let dash = StreamSource::new("https://cdn.example.com/a/manifest.mpd");
    assert_eq!(resolver.resolve(&dash).transport_type, TransportType::Manifest);
}

// =============================================================================
// Storage & Config
// =============================================================================

#[test]
fn test_file_store_carries_floor_across_players() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("floors.json");

    let mut first = Player::new(
        PlayerConfig::default(),
        GateSettings::default(),
        Box::new(RecordingSurface::new()),
        Box::new(playgate_core::JsonFileFloorStore::new(&path)),
        true,
    );
    mount(&mut first, 0.0, MIRROR_A, gate(12.0, 1.0));
    press_play(&mut first, 0.0);
    play_for(&mut first, 0.0, 8.0);
    drop(first);

    let entries = playgate_core::JsonFileFloorStore::new(&path).entries().unwrap();
    assert_eq!(entries.get("movie:heist").copied(), Some(8.0));

    let mut second = Player::new(
        PlayerConfig::default(),
        GateSettings::default(),
        Box::new(RecordingSurface::new()),
        Box::new(playgate_core::JsonFileFloorStore::new(&path)),
        true,
    );
    mount(&mut second, 0.0, MIRROR_B, gate(12.0, 1.0));
    press_play(&mut second, 0.0);
    play_for(&mut second, 0.0, 4.0);
    assert!(second.is_locked());
}

#[test]
fn test_gate_config_from_page_json() {
    let json = r#"{
        "enabled": true,
        "previewSeconds": 90,
        "qualityCap": 480,
        "timerSpeedMultiplier": 3,
        "reachedDailyLimit": false,
        "ctaHref": "/subscribe",
        "forceRedirectOnLock": true
    }"#;
    let config: ConversionGateConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.preview_seconds, Some(90.0));
    assert_eq!(config.quality_cap, Some(480));
    assert!(config.force_redirect_on_lock);

    let store = SharedStore::default();
    let (mut player, _) = new_player(&store);
    mount(&mut player, 0.0, MIRROR_A, config);
    press_play(&mut player, 0.0);
    let now = play_for(&mut player, 0.0, 30.0);
    assert!(player.is_locked());

    let deadline = player.redirect_deadline().unwrap();
    player.tick(deadline);
    let redirected = player
        .drain_events()
        .into_iter()
        .any(|r| matches!(r.event, PlayerEvent::Redirect { ref href } if href == "/subscribe"));
    assert!(redirected);
    assert_eq!(deadline, now + 2_500.0);
}
