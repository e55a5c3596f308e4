// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! nvr-replay: query and reconstruct segmented recordings.
//!
//! Usage:
//!   nvr-replay serve    --config config.toml
//!   nvr-replay manifest --config config.toml --camera cam1 --start 1700000000 --end 1700000600
//!   nvr-replay clip     --config config.toml --camera cam1 --start 1700000000 --end 1700000600
//!   nvr-replay activity --config config.toml --camera cam1 --after 1700000000 --timezone +02:00

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nvr_replay::activity::activity_series;
use nvr_replay::api::{start_server, AppState};
use nvr_replay::config::Config;
use nvr_replay::frames::StillFrameSource;
use nvr_replay::model::{SegmentKind, TimeWindow};
use nvr_replay::storage::sqlite::SqliteStore;
use nvr_replay::storage::{CameraScope, SharedStore};
use nvr_replay::time::{minute_modifier, now_epoch, parse_utc_offset, HOUR_SECS};
use nvr_replay::transcode::FfmpegTranscoder;

#[derive(Parser)]
#[command(name = "nvr-replay", about = "Segmented recording query & reconstruction", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the playback manifest for a time range.
    Manifest {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long)]
        camera: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },
    /// Materialize a clip into the cache directory and print its path.
    Clip {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long)]
        camera: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },
    /// Print per-minute activity for a camera.
    Activity {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long)]
        camera: String,
        /// Defaults to one hour ago.
        #[arg(long)]
        after: Option<f64>,
        /// Defaults to now.
        #[arg(long)]
        before: Option<f64>,
        #[arg(long, default_value = "utc")]
        timezone: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => run_serve(config).await,
        Command::Manifest { config, camera, start, end } => run_manifest(config, &camera, start, end).await,
        Command::Clip { config, camera, start, end } => run_clip(config, &camera, start, end).await,
        Command::Activity { config, camera, after, before, timezone } => {
            run_activity(config, &camera, after, before, &timezone).await
        }
    }
}

fn load_state(config_path: &PathBuf) -> anyhow::Result<AppState> {
    let cfg = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let store: SharedStore = Arc::new(SqliteStore::new(&cfg.storage.database));
    let tool = Arc::new(FfmpegTranscoder::new(&cfg.transcode.ffmpeg_path));
    let frames = Arc::new(StillFrameSource::new(&cfg.storage.preview_frames_dir));
    Ok(AppState::new(cfg, store, tool, frames))
}

async fn run_serve(config_path: PathBuf) -> anyhow::Result<()> {
    let state = load_state(&config_path)?;

    info!(
        cameras = state.config.cameras.len(),
        database = ?state.config.storage.database,
        cache_dir = ?state.config.storage.cache_dir,
        "Starting replay engine"
    );

    if !state.config.api.enabled {
        warn!("HTTP API disabled in config, nothing to serve");
        return Ok(());
    }

    let port = state.config.api.port;
    start_server(Arc::new(state), port).await;
    Ok(())
}

async fn run_manifest(config_path: PathBuf, camera: &str, start: f64, end: f64) -> anyhow::Result<()> {
    let state = load_state(&config_path)?;
    state.config.require_camera(camera)?;

    let window = TimeWindow::new(start, end)?;
    let recordings = state
        .store
        .find(CameraScope::One(camera), window, SegmentKind::Recording)
        .await?;
    let manifest = state.manifests.build(&recordings, &window, now_epoch())?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

async fn run_clip(config_path: PathBuf, camera: &str, start: f64, end: f64) -> anyhow::Result<()> {
    let state = load_state(&config_path)?;
    state.config.require_camera(camera)?;

    let window = TimeWindow::new(start, end)?;
    let recordings = state
        .store
        .find(CameraScope::One(camera), window, SegmentKind::Recording)
        .await?;
    let artifact = state.clips.materialize(camera, &recordings, &window).await?;
    if artifact.size == 0 {
        bail!("Clip {} is empty", artifact.path.display());
    }
    println!("{}", artifact.path.display());
    Ok(())
}

async fn run_activity(
    config_path: PathBuf,
    camera: &str,
    after: Option<f64>,
    before: Option<f64>,
    timezone: &str,
) -> anyhow::Result<()> {
    let state = load_state(&config_path)?;
    state.config.require_camera(camera)?;

    let now = now_epoch();
    let after = after.unwrap_or(now - HOUR_SECS as f64);
    let before = before.unwrap_or(now);
    let offset = parse_utc_offset(timezone)?;

    let segments = state.store.activity_segments(camera, after, before).await?;
    for (hour, samples) in activity_series(
        &segments,
        after,
        minute_modifier(&offset),
        state.config.activity.gap_advance,
    ) {
        println!("{hour}: {}", serde_json::to_string(&samples)?);
    }
    Ok(())
}
