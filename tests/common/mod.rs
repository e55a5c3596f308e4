//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use nvr_replay::config::Config;
use nvr_replay::frames::FrameSource;
use nvr_replay::model::{Segment, TrackedObject};
use nvr_replay::transcode::{ToolError, ToolJob, Transcoder};

pub const GIF_BYTES: &[u8] = b"GIF89a-fake";
pub const CLIP_BYTES: &[u8] = b"fake-mp4-payload";

pub fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

/// Recording segment with motion/object stats.
pub fn seg(camera: &str, start: f64, end: f64) -> Segment {
    Segment {
        camera: camera.to_string(),
        path: format!("/media/nvr/recordings/{camera}/{start}.mp4"),
        start_time: start,
        end_time: end,
        duration: end - start,
        motion: 0,
        objects: 0,
    }
}

pub fn seg_with_stats(camera: &str, start: f64, end: f64, motion: u32, objects: u32) -> Segment {
    Segment { motion, objects, ..seg(camera, start, end) }
}

/// Config rooted in `dir` with cameras `cam1` and `cam2`.
pub fn test_config(dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
[storage]
database = "{root}/replay.db"
media_root = "{root}/media"
cache_dir = "{root}/cache"
preview_frames_dir = "{root}/frames"
clips_dir = "{root}/clips"
export_dir = "{root}/exports"

[[cameras]]
id = "cam1"
name = "Front Door"

[[cameras]]
id = "cam2"
name = "Backyard"
"#,
        root = dir.display()
    );
    Config::from_toml(&toml).expect("valid test config")
}

/// What the fake transcoder does when invoked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeMode {
    Succeed,
    /// Exit non-zero without touching the output.
    Fail,
    /// Exit zero without writing the output file.
    NoOutput,
}

/// Records every job and imitates ffmpeg's observable effects.
///
/// Jobs whose last argument is a file path get [`CLIP_BYTES`] written there;
/// jobs writing to stdout (`-`) get [`GIF_BYTES`] back.
pub struct FakeTranscoder {
    mode: FakeMode,
    delay: Duration,
    calls: AtomicUsize,
    jobs: Mutex<Vec<ToolJob>>,
}

impl FakeTranscoder {
    pub fn new(mode: FakeMode) -> Arc<Self> {
        Arc::new(Self { mode, delay: Duration::ZERO, calls: AtomicUsize::new(0), jobs: Mutex::new(Vec::new()) })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { mode: FakeMode::Succeed, delay, calls: AtomicUsize::new(0), jobs: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<ToolJob> {
        self.jobs.lock().clone()
    }

    pub fn last_job(&self) -> ToolJob {
        self.jobs.lock().last().cloned().expect("at least one job")
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, job: ToolJob) -> Result<Bytes, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().push(job.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.mode {
            FakeMode::Fail => Err(ToolError::Exit { code: Some(1), stderr: "simulated failure".into() }),
            FakeMode::NoOutput => Ok(Bytes::new()),
            FakeMode::Succeed => match job.output() {
                Some("-") | None => Ok(Bytes::from_static(GIF_BYTES)),
                Some(path) => {
                    tokio::fs::write(path, CLIP_BYTES).await?;
                    Ok(Bytes::new())
                }
            },
        }
    }
}

/// Frame source with a fixed frame per camera and optional tracked objects.
#[derive(Default)]
pub struct FakeFrames {
    pub frames: Mutex<Vec<(String, Bytes)>>,
    pub tracked: Mutex<Vec<TrackedObject>>,
}

impl FakeFrames {
    pub fn with_frame(camera: &str, jpeg: &'static [u8]) -> Arc<Self> {
        let frames = Self::default();
        frames.frames.lock().push((camera.to_string(), Bytes::from_static(jpeg)));
        Arc::new(frames)
    }
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn current_frame(&self, camera: &str) -> Option<Bytes> {
        self.frames.lock().iter().find(|(c, _)| c == camera).map(|(_, b)| b.clone())
    }

    async fn tracked(&self, camera: &str, id: &str) -> Option<TrackedObject> {
        self.tracked.lock().iter().find(|t| t.camera == camera && t.id == id).cloned()
    }
}
