//! Benchmark tests for playgate-core operations
//!
//! Run with: cargo bench -p playgate-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use url::Url;

use playgate_core::config::{ConversionGateConfig, GateParams, GateSettings, PlayerConfig};
use playgate_core::resolver::{deobfuscate_url, obfuscate_url};
use playgate_core::*;

// ============================================================================
// Helpers
// ============================================================================

fn generate_hls_master(variant_count: usize) -> String {
    let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for i in 0..variant_count {
        let height = 240 + i * 120;
        let width = height * 16 / 9;
        manifest.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},CODECS=\"avc1.4d401f,mp4a.40.2\"\n{}p/index.m3u8\n",
            400_000 + i * 600_000,
            width,
            height,
            height
        ));
    }
    manifest
}

fn levels(count: usize) -> Vec<QualityLevel> {
    (0..count)
        .map(|index| QualityLevel {
            index,
            width: (240 + index as u32 * 120) * 16 / 9,
            height: 240 + index as u32 * 120,
            bitrate: 400_000 + index as u64 * 600_000,
        })
        .collect()
}

fn armed_gate() -> PreviewGate {
    let config = ConversionGateConfig {
        enabled: true,
        preview_seconds: Some(1_000_000.0),
        ..Default::default()
    };
    let params = GateParams::resolve(&config, &GateSettings::default());
    PreviewGate::new(AssetId::new("movie", "bench"), params, true, 15.0)
}

// ============================================================================
// Resolver Benchmarks
// ============================================================================

fn bench_resolver(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stream Resolver");
    let resolver = StreamResolver::new(true, PlayerConfig::default().live_signatures);

    let sources = [
        ("plain_file", StreamSource::new("http://cdn.example.com/movies/film.mp4")),
        ("segmented", StreamSource::new("https://cdn.example.com/live/master.m3u8?token=abc")),
        (
            "obfuscated",
            StreamSource::new(obfuscate_url("http://live.example.com/channel/index.m3u8")).obfuscated(),
        ),
        ("embed", StreamSource::new("https://player.example.org/embed/48213")),
    ];

    for (name, source) in sources.iter() {
        group.bench_with_input(BenchmarkId::new("resolve", name), source, |b, source| {
            b.iter(|| black_box(resolver.resolve(black_box(source))))
        });
    }

    group.bench_function("deobfuscate_garbage", |b| {
        b.iter(|| black_box(deobfuscate_url(black_box("not-base64!!/watch?v=1"))))
    });

    group.finish();
}

// ============================================================================
// HLS Manifest Parsing Benchmarks
// ============================================================================

fn bench_hls_master_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("HLS Master Parsing");
    let parser = HlsParser::new();
    let base_url = Url::parse("https://cdn.example.com/live/master.m3u8").unwrap();

    for &variant_count in &[3, 7, 12] {
        let manifest = generate_hls_master(variant_count);
        group.bench_with_input(
            BenchmarkId::new("parse_master", format!("{}_variants", variant_count)),
            &manifest,
            |b, manifest| b.iter(|| black_box(parser.parse(black_box(manifest.as_bytes()), &base_url).unwrap())),
        );
    }

    let ladder = levels(12);
    group.bench_function("capped_level_720", |b| {
        b.iter(|| black_box(capped_level(black_box(&ladder), 720)))
    });

    group.finish();
}

// ============================================================================
// Preview Gate Benchmarks
// ============================================================================

fn bench_gate_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preview Gate");

    for &ticks in &[100usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("advance", ticks), &ticks, |b, &ticks| {
            b.iter(|| {
                let mut gate = armed_gate();
                let mut store = MemoryFloorStore::new();
                gate.on_play_started(0.0, PlaybackSample::playing(0.0), &mut store);
                for i in 1..=ticks {
                    let now = i as f64 * 500.0;
                    black_box(gate.advance(now, PlaybackSample::playing(now / 1000.0), &mut store));
                }
                gate.effective_elapsed()
            })
        });
    }

    group.bench_function("player_tick", |b| {
        let mut player = Player::new(
            PlayerConfig::default(),
            GateSettings::default(),
            Box::new(NullSurface),
            Box::new(MemoryFloorStore::new()),
            true,
        );
        player
            .mount(
                0.0,
                MountRequest {
                    source: StreamSource::new("https://cdn.example.com/film.mp4"),
                    asset: AssetId::new("movie", "bench"),
                    gate: ConversionGateConfig {
                        enabled: true,
                        preview_seconds: Some(f64::MAX),
                        ..Default::default()
                    },
                    entitled: false,
                },
            )
            .unwrap();
        player.handle_media_event(0.0, &MediaEvent::LoadedMetadata { duration: Some(7_200.0) });
        player.dispatch(0.0, ControlAction::Play).unwrap();
        player.handle_media_event(0.0, &MediaEvent::Play);

        let mut now = 0.0;
        b.iter(|| {
            now += 500.0;
            player.tick(black_box(now));
            player.drain_events()
        })
    });

    group.finish();
}

criterion_group!(resolver_benches, bench_resolver);

criterion_group!(hls_benches, bench_hls_master_parsing);

criterion_group!(gate_benches, bench_gate_ticks);

criterion_main!(resolver_benches, hls_benches, gate_benches);
