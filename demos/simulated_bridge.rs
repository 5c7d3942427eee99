//! Simulated bridge example.
//!
//! Drives the bridge with the mock backend and enumerator: selects a
//! microphone and two speakers, unplugs one speaker, plugs it back in and
//! follows the auto-select request like a UI would.
//!
//! Run with: cargo run --example simulated_bridge

use std::time::Duration;

use bridge_audio::{
    AudioBridge, BridgeEvent, DeviceClass, DeviceInfo, MockBackend, MockEnumerator, SettingsStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bridge_audio=info".parse()?))
        .init();

    let backend = MockBackend::new();
    let enumerator = MockEnumerator::new()
        .with_device(DeviceInfo::capture("mic", "USB Microphone"))
        .with_device(DeviceInfo::render("spk", "Speakers"))
        .with_device(DeviceInfo::render("hp", "Headphones"));

    let bridge = AudioBridge::builder()
        .backend(backend.clone())
        .enumerator(enumerator.clone())
        .settings(SettingsStore::in_memory())
        .on_event(|event| match event {
            BridgeEvent::RouteCreated { input, output } => {
                println!("route up:   {} -> {}", input.name(), output.name());
            }
            BridgeEvent::RouteRemoved { input, output } => {
                println!("route down: {} -> {}", input.name(), output.name());
            }
            BridgeEvent::RouteFailed { output, stage, reason, .. } => {
                eprintln!("route to {} failed at {}: {}", output.name(), stage, reason);
            }
            _ => {}
        })
        .start()
        .await?;

    // Give the watchers a moment to report the initial devices
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mic = bridge.captures().await?.remove(0);
    let speakers = bridge.renders().await?;
    bridge.select_input(None, Some(&mic), &[]).await?;
    bridge.select_outputs(Some(&mic), &speakers, &[]).await?;
    println!("{} live routes", bridge.routes().await?.len());

    // Unplug the headphones, then deselect them like a UI would
    let mut events = bridge.subscribe();
    enumerator.remove(DeviceClass::Render, "hp").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let headphones = speakers
        .iter()
        .find(|d| d.id().as_str() == "hp")
        .cloned()
        .ok_or("headphones missing")?;
    bridge.select_outputs(Some(&mic), &[], &[headphones]).await?;

    // Plug them back in; their preference survived, so the bridge asks for them
    enumerator.add(DeviceInfo::render("hp", "Headphones")).await;
    let deadline = tokio::time::sleep(Duration::from_secs(1));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(BridgeEvent::RequestAutoSelectRender { device }) => {
                    println!("auto-selecting {}", device.name());
                    bridge.select_outputs(Some(&mic), &[device], &[]).await?;
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            },
        }
    }

    println!("\nActivity log:");
    print!("{}", bridge.log_text().await?);
    println!("{} routes live in the backend", backend.live_routes().len());

    bridge.shutdown().await?;
    Ok(())
}
