//! Live Client Application
//!
//! Streams the microphone to a live endpoint and plays back its replies.
//!
//! Usage: `live-client [URL]`, or set `LIVE_CLIENT_URL`.
//!
//! Audio only. No camera backend ships with the crate: applications that
//! want webcam video pass their own `VideoDevices` to
//! `LiveClientBuilder::video_devices`. Screen sharing is available when
//! built with `--features screen`.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_media_client::{audio::list_devices, config::AppConfig, events::LiveEvent, LiveClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting live client");

    let mut config = AppConfig::load_or_default();
    if let Ok(url) = std::env::var("LIVE_CLIENT_URL") {
        config.session.url = url;
    }
    if let Some(url) = std::env::args().nth(1) {
        config.session.url = url;
    }

    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let kind = if device.is_input { "Input" } else { "Output" };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}", device.name, kind, default_marker);
        println!("    ID: {}", device.id);
    }
    println!();

    let client = LiveClient::builder(config.clone()).build()?;
    let mut events = client.subscribe();

    tracing::info!("Connecting to {}", config.session.url);
    client.connect().await?;
    client.start_recording().await?;
    tracing::info!("Recording - press Ctrl+C to stop");

    let mut stats_timer = tokio::time::interval(Duration::from_secs(30));
    stats_timer.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            _ = stats_timer.tick() => {
                let capture = client.capture().stats();
                let playback = client.playback().stats();
                let session = client.session().stats();
                tracing::info!(
                    "Stats: {} blocks sent, {} dropped, {} chunks played, {} failed, {} messages received",
                    capture.blocks_sent,
                    capture.blocks_dropped,
                    playback.chunks_played,
                    playback.chunks_failed,
                    session.messages_received
                );
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LiveEvent::Text(text) => println!("< {}", text),
                    LiveEvent::TurnComplete => println!("[turn complete]"),
                    LiveEvent::Interrupted(reason) => println!("[interrupted] {:?}", reason),
                    LiveEvent::RemoteError(error) => eprintln!("[endpoint error] {:?}", error),
                    LiveEvent::LocalError(error) => eprintln!("[error] {}", error),
                    LiveEvent::SessionId(id) => println!("[session {}]", id),
                    LiveEvent::StateChanged(state) => tracing::debug!("Session {:?}", state),
                    _ => {}
                }
            }
        }
    }

    client.stop_recording();
    client.close();
    Ok(())
}
