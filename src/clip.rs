// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Clip materialization: turn a time range into one concrete `.mp4`.
//!
//! The overlapping segments are described as an ffmpeg concat playlist (with
//! `inpoint`/`outpoint` on the boundary segments), fed to the transcoder over
//! stdin and stream-copied into a file under the cache directory.
//!
//! The file name is derived from `(camera, start, end)` only, so the presence
//! of the file is the cache hit. Output is written to a sibling `.partial`
//! path and renamed into place after a successful exit, so nobody ever sees a
//! half-written clip at the published name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReplayError, Result};
use crate::model::{EventRecord, Segment, TimeWindow};
use crate::transcode::{concat_input_args, ConcatPlaylist, ToolJob, Transcoder};

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Render an epoch timestamp the way it appears in clip URLs:
/// `1000` for whole seconds, `1000.5` otherwise.
pub fn format_ts(ts: f64) -> String {
    if ts.fract() == 0.0 && ts.abs() < 1e15 {
        format!("{}", ts as i64)
    } else {
        format!("{ts}")
    }
}

/// Reduce `name` to a safe single path component.
///
/// Non-ASCII characters are dropped, separators and whitespace become `_`,
/// anything outside `[A-Za-z0-9_.-]` is removed and leading/trailing dots and
/// underscores are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Deterministic cache file name for a clip.
pub fn clip_file_name(camera: &str, window: &TimeWindow) -> String {
    sanitize_filename(&format!(
        "clip_{camera}_{}-{}.mp4",
        format_ts(window.start),
        format_ts(window.end)
    ))
}

/// Concat playlist covering `window`.
///
/// A segment starting before the window gets `inpoint = start - seg.start`;
/// one ending after it gets `outpoint = end - seg.start` (relative to the
/// segment itself). Offsets are truncated to whole seconds.
pub fn concat_for_window(segments: &[Segment], window: &TimeWindow) -> ConcatPlaylist {
    let mut playlist = ConcatPlaylist::new();
    for seg in segments {
        playlist.file(&seg.path);
        if seg.start_time < window.start {
            playlist.inpoint((window.start - seg.start_time) as i64);
        }
        if seg.end_time > window.end {
            playlist.outpoint((window.end - seg.start_time) as i64);
        }
    }
    playlist
}

/// Pre-rendered clip for an event, if the detection pipeline wrote one.
pub fn event_clip_path(clips_dir: &Path, event: &EventRecord) -> PathBuf {
    clips_dir.join(format!("{}-{}.mp4", event.camera, event.id))
}

/// A materialized (or reused) clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    /// `true` when the file existed before this request.
    pub cached: bool,
}

/// Removes an unpublished output file when dropped.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = ?self.path, error = %e, "Failed to remove partial clip");
                }
            }
        }
    }
}

type InflightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A request's claim on the per-key lock. The map entry is dropped with it,
/// including when the request future is cancelled.
struct InflightSlot<'a> {
    map: &'a InflightMap,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn claim(map: &'a InflightMap, key: &str) -> Self {
        let lock = map.lock().entry(key.to_string()).or_default().clone();
        Self { map, key: key.to_string(), lock }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        // Only the last holder removes the entry; waiters still share it.
        if map.get(&self.key).is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) <= 2) {
            map.remove(&self.key);
        }
    }
}

/// Builds and caches clips under one directory.
pub struct ClipMaterializer {
    cache_dir: PathBuf,
    tool: Arc<dyn Transcoder>,
    timeout: Duration,
    /// One async lock per clip name currently being produced.
    inflight: InflightMap,
}

impl ClipMaterializer {
    pub fn new(cache_dir: &Path, tool: Arc<dyn Transcoder>, timeout: Duration) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            tool,
            timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn artifact_path(&self, camera: &str, window: &TimeWindow) -> PathBuf {
        self.cache_dir.join(clip_file_name(camera, window))
    }

    /// Return the clip for `(camera, window)`, producing it if needed.
    ///
    /// Concurrent calls for the same key wait for the first one and then reuse
    /// its file; different keys never block each other.
    pub async fn materialize(&self, camera: &str, segments: &[Segment], window: &TimeWindow) -> Result<ClipArtifact> {
        let file_name = clip_file_name(camera, window);
        let path = self.cache_dir.join(&file_name);

        if let Some(artifact) = existing(&path, &file_name).await? {
            debug!(path = ?path, "Ignoring subsequent request, clip already exists in the cache");
            return Ok(artifact);
        }

        if segments.is_empty() {
            return Err(ReplayError::not_found("Recordings not found for the requested time range"));
        }

        let slot = InflightSlot::claim(&self.inflight, &file_name);
        let _guard = slot.lock.lock().await;
        let found = existing(&path, &file_name).await?;
        match found {
            Some(artifact) => {
                debug!(path = ?path, "Clip produced by a concurrent request");
                Ok(artifact)
            }
            None => self.produce(camera, segments, window, &path, &file_name).await,
        }
    }

    /// Keys with a request currently holding or waiting for their lock.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    async fn produce(
        &self,
        camera: &str,
        segments: &[Segment],
        window: &TimeWindow,
        path: &Path,
        file_name: &str,
    ) -> Result<ClipArtifact> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let partial = PartialFile::new(
            self.cache_dir
                .join(format!("{file_name}.{}.{seq}.partial", std::process::id())),
        );

        let playlist = concat_for_window(segments, window);
        let mut args = concat_input_args();
        args.extend(
            ["-c", "copy", "-movflags", "+faststart", "-f", "mp4"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(partial.path.display().to_string());

        let job = ToolJob::new(args, self.timeout).with_stdin(playlist.render());
        self.tool.run(job).await?;

        let size = tokio::fs::metadata(&partial.path)
            .await
            .map_err(|e| ReplayError::PartialData(format!("transcoder produced no output: {e}")))?
            .len();
        tokio::fs::rename(&partial.path, path).await?;
        partial.disarm();

        info!(
            camera,
            segments = segments.len(),
            start = window.start,
            end = window.end,
            bytes = size,
            path = ?path,
            "Clip materialized"
        );

        Ok(ClipArtifact { path: path.to_path_buf(), file_name: file_name.to_string(), size, cached: false })
    }
}

async fn existing(path: &Path, file_name: &str) -> Result<Option<ClipArtifact>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(ClipArtifact {
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            size: meta.len(),
            cached: true,
        })),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Append `.mp4` unless already present.
pub fn with_mp4_extension(name: &str) -> String {
    if name.ends_with(".mp4") { name.to_string() } else { format!("{name}.mp4") }
}

/// Export names may only use `[:_A-Za-z0-9]` and never claim the
/// `in_progress.` prefix used by running exports.
pub fn export_name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("in_progress.")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_')
}

/// Explicit rename/delete of exported files.
#[derive(Debug, Clone)]
pub struct ExportDir {
    dir: PathBuf,
}

impl ExportDir {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(sanitize_filename(&with_mp4_extension(name)))
    }

    pub async fn rename(&self, current: &str, new: &str) -> Result<PathBuf> {
        let from = self.resolve(current);
        if !tokio::fs::try_exists(&from).await? {
            return Err(ReplayError::not_found(format!("{current} not found.")));
        }
        if !export_name_is_valid(new) {
            return Err(ReplayError::invalid(format!("{new} contains illegal characters.")));
        }
        let to = self.resolve(new);
        if tokio::fs::try_exists(&to).await? {
            return Err(ReplayError::invalid(format!("{new} already exists.")));
        }
        tokio::fs::rename(&from, &to).await?;
        info!(from = ?from, to = ?to, "Export renamed");
        Ok(to)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(ReplayError::not_found(format!("{name} not found.")));
        }
        tokio::fs::remove_file(&path).await?;
        info!(path = ?path, "Export deleted");
        Ok(())
    }
}
