//! Preview gate example
//!
//! Mounts a gated title in a session, watches until the preview runs out,
//! then redeems a code to unlock it. Time is simulated, so it finishes at once.
//!
//! Run with: cargo run -p playgate-core --example preview_gate

use playgate_core::entitlement::StaticEntitlement;
use playgate_core::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> Result<()> {
    println!("Playgate Core - Preview Gate Example");
    println!("====================================\n");

    let player = Player::new(
        PlayerConfig::default(),
        GateSettings::default(),
        Box::new(NullSurface),
        Box::new(MemoryFloorStore::new()),
        true,
    );
    let entitlement = StaticEntitlement::new(false).with_code("WELCOME", None);
    let (session, mut events) = PlayerSession::new(player);
    let mut session = session.with_entitlement(Arc::new(entitlement));

    let printer = tokio::spawn(async move {
        while let Some(record) = events.recv().await {
            println!("  #{:<3} {}", record.sequence, serde_json::to_string(&record.event).unwrap_or_default());
        }
    });

    let gate = ConversionGateConfig {
        enabled: true,
        preview_seconds: Some(20.0),
        cta_href: Some("/pricing".into()),
        content_label: Some("The Heist".into()),
        ..Default::default()
    };
    let resolved = session
        .mount(
            StreamSource::new("http://cdn.example.com/movies/heist.mp4"),
            AssetId::new("movie", "heist"),
            gate,
        )
        .await?;
    println!("Mounted {} ({})\n", resolved.effective_url, resolved.transport_type);

    session
        .handle_media_event(MediaEvent::LoadedMetadata { duration: Some(5_400.0) })
        .await;
    session.dispatch(ControlAction::Play).await?;
    session.handle_media_event(MediaEvent::Play).await;

    let mut position = 0.0;
    while !session.snapshot().await.locked {
        tokio::time::sleep(Duration::from_millis(250)).await;
        position += 0.25;
        session.handle_media_event(MediaEvent::TimeUpdate { position }).await;
    }

    let snapshot = session.snapshot().await;
    println!("\nLocked after {:.1}s of preview", snapshot.effective_elapsed.unwrap_or_default());

    let outcome = session.dispatch(ControlAction::Play).await?;
    println!("Play while locked: {:?}", outcome);

    let redeemed = session.redeem("welcome").await?;
    println!("Redeem: {:?}", redeemed);
    println!("Locked now: {}\n", session.snapshot().await.locked);

    session.unmount().await;
    // Let the printer catch up before exiting
    tokio::time::sleep(Duration::from_millis(10)).await;
    printer.abort();
    Ok(())
}
