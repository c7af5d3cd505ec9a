//! Strobe Player (strobe-player) - headless command-line player
//!
//! Loads a media location, plays it through the headless outputs, optionally
//! seeks, and writes a JSON report of where playback ended up.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use strobe_common::config::{LoggingConfig, TomlConfig};
use strobe_common::time::format_timestamp;
use strobe_common::PlayerSettings;
use strobe_player::media::headless::{HeadlessRenderer, HeadlessSamplerFactory};
use strobe_player::media::synthetic::SyntheticDecoderFactory;
use strobe_player::{
    BufferLevels, ControllerConfig, PlaybackStatsSnapshot, PlayerController, PlayerEvent, PrepareRequest, ReadyStatus,
};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for strobe-player
#[derive(Parser, Debug)]
#[command(name = "strobe-player")]
#[command(about = "Headless player for the strobe playback engine")]
#[command(version)]
struct Args {
    /// Media location, e.g. synthetic:av?duration_ms=5000
    location: String,

    /// Configuration file (defaults to $STROBE_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after playing this many milliseconds
    #[arg(long)]
    play_ms: Option<u64>,

    /// Seek here right after starting playback
    #[arg(long)]
    seek_ms: Option<u64>,

    /// Playback speed factor
    #[arg(long)]
    speed: Option<f32>,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    location: String,
    final_state: String,
    completed: bool,
    buffer_timestamp_ms: u128,
    playback_timestamp_ms: u128,
    stats: Option<PlaybackStatsSnapshot>,
    levels: Option<BufferLevels>,
    frames_rendered: u64,
    audio_frames_written: u64,
    errors: Vec<String>,
    finished_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting strobe player for {}", args.location);

    let samplers = Arc::new(HeadlessSamplerFactory::new());
    let renderer = Arc::new(HeadlessRenderer::new());
    let controller = PlayerController::new(
        ControllerConfig::from_player_config(&config.player).context("Invalid [player] configuration")?,
        Arc::new(SyntheticDecoderFactory),
        samplers.clone(),
    );
    let mut events = controller.subscribe_events();
    controller.attach_renderer(renderer.clone()).await;

    if let Some(speed) = args.speed {
        let settings = PlayerSettings {
            playback_speed_factor: speed,
            ..controller.settings()
        };
        controller.change_settings(settings).await.context("Invalid playback speed")?;
    }

    controller
        .prepare(PrepareRequest::from_config(args.location.clone(), &config.player))
        .await
        .context("Failed to prepare media")?;
    controller.play().await.context("Failed to start playback")?;

    if let Some(seek_ms) = args.seek_ms {
        let target = Duration::from_millis(seek_ms);
        controller.seek_to(target).await.context("Seek failed")?;
        info!("Seeked to {}", format_timestamp(controller.playback_timestamp()));
        controller.resume().await.context("Failed to resume after seek")?;
    }

    let completed = tokio::select! {
        completed = wait_for_completion(&controller) => completed,
        _ = play_limit(args.play_ms) => {
            info!("Play time limit reached");
            false
        }
        _ = shutdown_signal() => false,
    };

    let report = Report {
        location: args.location.clone(),
        final_state: controller.state().to_string(),
        completed,
        buffer_timestamp_ms: controller.buffer_timestamp().as_millis(),
        playback_timestamp_ms: controller.playback_timestamp().as_millis(),
        stats: controller.playback_stats().await,
        levels: controller.buffer_levels().await,
        frames_rendered: renderer.frames_rendered(),
        audio_frames_written: samplers.stats().frames_written.load(Ordering::Relaxed),
        errors: collect_errors(&mut events),
        finished_at: Utc::now(),
    };

    if let Err(e) = controller.release().await {
        warn!("Release reported a teardown failure: {}", e);
    }
    controller.close().await.context("Failed to close player")?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    info!("Player shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    let file_layer = match &logging.file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Resolve once the player reaches `Completed`; false if it leaves `Ready` first
async fn wait_for_completion(controller: &PlayerController) -> bool {
    let mut state = controller.subscribe_state();
    let settled = state
        .wait_for(|s| s.status() == Some(ReadyStatus::Completed) || s.status().is_none())
        .await
        .map(|s| s.status());
    matches!(settled, Ok(Some(ReadyStatus::Completed)))
}

async fn play_limit(limit_ms: Option<u64>) {
    match limit_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending::<()>().await,
    }
}

fn collect_errors(events: &mut broadcast::Receiver<PlayerEvent>) -> Vec<String> {
    let mut errors = Vec::new();
    loop {
        match events.try_recv() {
            Ok(PlayerEvent::Error(e)) => errors.push(e.to_string()),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Report missed {} events", skipped);
            }
            Err(_) => break,
        }
    }
    errors
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
