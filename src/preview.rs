// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Low-resolution previews.
//!
//! Two sources, chosen by how recent the window is:
//!
//! * **Video mode** — windows that start before the current hour have a
//!   preview segment. The covering segment is cut and time-compressed into a
//!   looping GIF streamed straight back to the caller (no disk cache).
//! * **Still mode** — the current hour has not been flushed to a preview
//!   segment yet, so the periodically captured stills in
//!   `preview_frames_dir` (`preview_<camera>-<epoch>.jpg`) are stitched
//!   together instead.
//!
//! Still timestamps are parsed out of the file name and compared numerically.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PreviewConfig;
use crate::error::{ReplayError, Result};
use crate::model::{EventRecord, Segment, SegmentKind, TimeWindow};
use crate::storage::{CameraScope, SharedStore};
use crate::time::floor_hour;
use crate::transcode::{concat_input_args, gif_output_args, ConcatPlaylist, ToolJob, Transcoder};

/// Client-facing description of one preview file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewClip {
    pub camera: String,
    pub src: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub start: f64,
    pub end: f64,
}

/// A captured still and the time embedded in its name.
#[derive(Debug, Clone, PartialEq)]
pub struct StillFrame {
    pub path: PathBuf,
    pub timestamp: f64,
}

/// Timestamp of `preview_<camera>-<epoch>.jpg`, if the name belongs to `camera`.
pub fn parse_still_name(file_name: &str, camera: &str) -> Option<f64> {
    let rest = file_name.strip_prefix("preview_")?.strip_prefix(camera)?.strip_prefix('-')?;
    let ts = rest.strip_suffix(".jpg")?;
    ts.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// All stills of `camera` in `dir`, oldest first.
pub async fn list_stills(dir: &Path, camera: &str) -> Result<Vec<StillFrame>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut stills = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(timestamp) = parse_still_name(name, camera) {
            stills.push(StillFrame { path: entry.path(), timestamp });
        }
    }
    stills.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(stills)
}

/// Stills inside `window`, both ends inclusive.
pub fn select_stills<'a>(stills: &'a [StillFrame], window: &TimeWindow) -> Vec<&'a StillFrame> {
    stills.iter().filter(|s| window.contains(s.timestamp)).collect()
}

/// First still strictly after `ts`.
pub fn first_still_after(stills: &[StillFrame], ts: f64) -> Option<&StillFrame> {
    stills.iter().find(|s| s.timestamp > ts)
}

/// Concat playlist showing each still for `display_secs`.
///
/// The last still is listed twice; the concat demuxer ignores the duration
/// of the final entry otherwise.
pub fn still_playlist(stills: &[&StillFrame], display_secs: f64) -> ConcatPlaylist {
    let mut playlist = ConcatPlaylist::new();
    for still in stills {
        playlist.file(&still.path.display().to_string());
        playlist.duration(display_secs);
    }
    if let Some(last) = stills.last() {
        playlist.file(&last.path.display().to_string());
    }
    playlist
}

pub struct PreviewReconstructor {
    store: SharedStore,
    tool: Arc<dyn Transcoder>,
    frames_dir: PathBuf,
    media_root: PathBuf,
    cfg: PreviewConfig,
    timeout: Duration,
}

impl PreviewReconstructor {
    pub fn new(
        store: SharedStore,
        tool: Arc<dyn Transcoder>,
        frames_dir: &Path,
        media_root: &Path,
        cfg: PreviewConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            tool,
            frames_dir: frames_dir.to_path_buf(),
            media_root: media_root.to_path_buf(),
            cfg,
            timeout,
        }
    }

    /// Preview files overlapping `window`, for one camera or all of them.
    pub async fn preview_clips(&self, camera: CameraScope<'_>, window: TimeWindow) -> Result<Vec<PreviewClip>> {
        let previews = self.store.find(camera, window, SegmentKind::Preview).await?;
        if previews.is_empty() {
            return Err(ReplayError::not_found("Previews not found for the requested time range"));
        }
        Ok(previews.iter().map(|p| self.to_clip(p)).collect())
    }

    fn to_clip(&self, seg: &Segment) -> PreviewClip {
        let src = Path::new(&seg.path)
            .strip_prefix(&self.media_root)
            .map(|rel| format!("/{}", rel.display()))
            .unwrap_or_else(|_| seg.path.clone());
        PreviewClip {
            camera: seg.camera.clone(),
            src,
            kind: "video/mp4",
            start: seg.start_time,
            end: seg.end_time,
        }
    }

    /// Looping GIF for `window`. Picks video or still mode from `now`.
    pub async fn preview_animation(&self, camera: &str, window: TimeWindow, now: f64) -> Result<Bytes> {
        if window.start < floor_hour(now) as f64 {
            self.from_preview_video(camera, window).await
        } else {
            self.from_stills(camera, window).await
        }
    }

    /// Preview of an event, capped at `event_max_secs` from its start.
    pub async fn event_preview(&self, event: &EventRecord, now: f64) -> Result<Bytes> {
        let start = event.start_time;
        let span = match event.end_time {
            Some(end) => (end - start).min(self.cfg.event_max_secs),
            None => self.cfg.event_max_secs,
        };
        let window = TimeWindow::new(start, start + span.max(0.0))?;
        self.preview_animation(&event.camera, window, now).await
    }

    async fn from_preview_video(&self, camera: &str, window: TimeWindow) -> Result<Bytes> {
        let previews = self.store.find(CameraScope::One(camera), window, SegmentKind::Preview).await?;
        let Some(preview) = previews.first() else {
            return Err(ReplayError::not_found("Preview not found"));
        };

        let offset = (window.start - preview.start_time).max(0.0);
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-ss".into(),
            format!("{}", offset as i64),
            "-t".into(),
            format!("{}", window.length()),
            "-i".into(),
            preview.path.clone(),
            "-r".into(),
            self.cfg.frame_rate.to_string(),
            "-vf".into(),
            format!("setpts={}*PTS", self.cfg.time_scale),
        ];
        args.extend(gif_output_args());

        debug!(camera, preview = %preview.path, offset, "Rendering preview from video");
        let gif = self.tool.run(ToolJob::new(args, self.timeout)).await?;
        Ok(gif)
    }

    async fn from_stills(&self, camera: &str, window: TimeWindow) -> Result<Bytes> {
        let stills = list_stills(&self.frames_dir, camera).await?;
        let selected = select_stills(&stills, &window);
        if selected.is_empty() {
            return Err(ReplayError::not_found("Preview not found"));
        }

        let playlist = still_playlist(&selected, self.cfg.still_duration_secs);
        let mut args = concat_input_args();
        args.extend(gif_output_args());

        info!(camera, frames = selected.len(), "Rendering preview from stills");
        let gif = self.tool.run(ToolJob::new(args, self.timeout).with_stdin(playlist.render())).await?;
        Ok(gif)
    }

    /// The first still captured strictly after `frame_time`.
    pub async fn preview_thumbnail(&self, camera: &str, frame_time: f64) -> Result<Bytes> {
        let stills = list_stills(&self.frames_dir, camera).await?;
        let Some(still) = first_still_after(&stills, frame_time) else {
            return Err(ReplayError::not_found("Could not find valid preview jpg."));
        };
        let bytes = tokio::fs::read(&still.path)
            .await
            .map_err(|e| ReplayError::PartialData(format!("Could not read preview frame: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}
