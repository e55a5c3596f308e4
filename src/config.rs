// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::activity::GapAdvance;
use crate::error::{ReplayError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Where segments, caches and frame stills live.
    pub storage: StorageConfig,
    /// Cameras this instance serves.
    pub cameras: Vec<CameraConfig>,
    /// Playback manifest parameters.
    #[serde(default)]
    pub vod: VodConfig,
    /// External transcoder settings.
    #[serde(default)]
    pub transcode: TranscodeConfig,
    /// Animated preview rendering.
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Live MJPEG stream pacing.
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub activity: ActivityConfig,
    /// HTTP API configuration (optional).
    #[serde(default)]
    pub api: ApiConfig,
}

/// HTTP API configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Whether to enable the HTTP API.
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    /// Port to listen on.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: default_api_enabled(), port: default_api_port() }
    }
}

fn default_api_enabled() -> bool { true }
fn default_api_port() -> u16 { 5000 }

/// Filesystem locations.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database holding recordings, previews, timeline and events.
    pub database: PathBuf,
    /// Prefix stripped from preview paths before handing them to clients.
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    /// Directory for materialized clips.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory of periodically captured preview stills.
    /// Files are named `preview_<camera>-<epoch>.jpg`.
    #[serde(default = "default_preview_frames_dir")]
    pub preview_frames_dir: PathBuf,
    /// Pre-rendered event clips, `<camera>-<event_id>.mp4`.
    #[serde(default = "default_clips_dir")]
    pub clips_dir: PathBuf,
    /// User exports, renamed/deleted through the API.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ActivityConfig {
    /// `single_hour` or `every_hour`, for segments starting past the current bucket.
    #[serde(default)]
    pub gap_advance: GapAdvance,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VodConfig {
    /// Clips at or above this length are treated as corrupt metadata.
    #[serde(default = "default_max_segment_duration")]
    pub max_segment_duration_secs: u64,
    /// Also shorten the first clip by the part before the window start.
    #[serde(default)]
    pub trim_leading_edge: bool,
    /// Windows starting this long ago are marked cacheable.
    #[serde(default = "default_cacheable_after")]
    pub cacheable_after_secs: u64,
}

impl Default for VodConfig {
    fn default() -> Self {
        Self {
            max_segment_duration_secs: default_max_segment_duration(),
            trim_leading_edge: false,
            cacheable_after_secs: default_cacheable_after(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscodeConfig {
    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Wall-clock limit for a single invocation.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self { ffmpeg_path: default_ffmpeg_path(), timeout_secs: default_tool_timeout() }
    }
}

impl TranscodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewConfig {
    /// Output frame rate of animated previews.
    #[serde(default = "default_preview_fps")]
    pub frame_rate: u32,
    /// `setpts` factor applied to preview video.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Display time of each still in fallback mode.
    #[serde(default = "default_still_duration")]
    pub still_duration_secs: f64,
    /// Event previews never cover more than this.
    #[serde(default = "default_event_max")]
    pub event_max_secs: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_preview_fps(),
            time_scale: default_time_scale(),
            still_duration_secs: default_still_duration(),
            event_max_secs: default_event_max(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_fps")]
    pub default_fps: u32,
    #[serde(default = "default_stream_max_fps")]
    pub max_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { default_fps: default_stream_fps(), max_fps: default_stream_max_fps() }
    }
}

/// Per-camera configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Unique identifier, as stored with each segment.
    pub id: String,
    /// Human-readable label.
    #[serde(default)]
    pub name: String,
}

fn default_media_root() -> PathBuf { PathBuf::from("/media/nvr") }
fn default_cache_dir() -> PathBuf { PathBuf::from("/tmp/cache") }
fn default_preview_frames_dir() -> PathBuf { PathBuf::from("/tmp/cache/preview_frames") }
fn default_clips_dir() -> PathBuf { PathBuf::from("/media/nvr/clips") }
fn default_export_dir() -> PathBuf { PathBuf::from("/media/nvr/exports") }
fn default_max_segment_duration() -> u64 { 600 }
fn default_cacheable_after() -> u64 { 3600 }
fn default_ffmpeg_path() -> PathBuf { PathBuf::from("ffmpeg") }
fn default_tool_timeout() -> u64 { 120 }
fn default_preview_fps() -> u32 { 8 }
fn default_time_scale() -> f64 { 0.12 }
fn default_still_duration() -> f64 { 0.12 }
fn default_event_max() -> f64 { 20.0 }
fn default_stream_fps() -> u32 { 3 }
fn default_stream_max_fps() -> u32 { 30 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ReplayError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn has_camera(&self, camera_id: &str) -> bool {
        self.cameras.iter().any(|c| c.id == camera_id)
    }

    /// Fail with `CameraNotFound` for ids not in the config.
    pub fn require_camera(&self, camera_id: &str) -> Result<()> {
        if self.has_camera(camera_id) {
            Ok(())
        } else {
            Err(ReplayError::CameraNotFound { id: camera_id.to_string() })
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(ReplayError::Config("No cameras defined".into()));
        }
        if self.vod.max_segment_duration_secs == 0 {
            return Err(ReplayError::Config("max_segment_duration_secs must be > 0".into()));
        }
        if self.transcode.timeout_secs == 0 {
            return Err(ReplayError::Config("timeout_secs must be > 0".into()));
        }
        if self.preview.frame_rate == 0 {
            return Err(ReplayError::Config("preview frame_rate must be > 0".into()));
        }
        if !(self.preview.time_scale > 0.0) || !(self.preview.still_duration_secs > 0.0) {
            return Err(ReplayError::Config("preview timings must be > 0".into()));
        }
        if self.stream.default_fps == 0 || self.stream.max_fps < self.stream.default_fps {
            return Err(ReplayError::Config("stream fps must satisfy 0 < default_fps <= max_fps".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for cam in &self.cameras {
            if cam.id.is_empty() {
                return Err(ReplayError::Config("Camera id must not be empty".into()));
            }
            if !seen.insert(cam.id.as_str()) {
                return Err(ReplayError::Config(format!("Duplicate camera id '{}'", cam.id)));
            }
        }
        Ok(())
    }
}
