// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Live frame lookup and the MJPEG stream built on it.
//!
//! The engine never owns live camera state. Whatever process is decoding
//! the cameras is exposed through [`FrameSource`]; the default
//! implementation serves the newest preview still from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::model::TrackedObject;
use crate::preview::list_stills;

pub const MJPEG_BOUNDARY: &str = "frame";

/// Read-only access to live per-camera state.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Latest JPEG for `camera`, if one is available right now.
    async fn current_frame(&self, camera: &str) -> Option<Bytes>;

    /// An object currently being tracked on `camera`.
    async fn tracked(&self, camera: &str, id: &str) -> Option<TrackedObject>;
}

/// Serves the newest `preview_<camera>-<epoch>.jpg` as the current frame.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    dir: PathBuf,
}

impl StillFrameSource {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    async fn current_frame(&self, camera: &str) -> Option<Bytes> {
        let stills = list_stills(&self.dir, camera).await.ok()?;
        let newest = stills.last()?;
        match tokio::fs::read(&newest.path).await {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                debug!(camera, path = ?newest.path, error = %e, "Latest still unreadable");
                None
            }
        }
    }

    async fn tracked(&self, _camera: &str, _id: &str) -> Option<TrackedObject> {
        None
    }
}

/// One multipart part carrying `jpeg`.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(jpeg.len() + 64);
    buf.put_slice(format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// Endless multipart stream of frames for one camera, paced at `fps`.
///
/// Ticks with no frame available are skipped. The stream ends when the
/// consumer drops it, which is how a closed client connection stops it.
pub fn mjpeg_stream(
    source: Arc<dyn FrameSource>,
    camera: String,
    fps: u32,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(interval);

    stream! {
        info!(camera = %camera, fps, "MJPEG stream opened");
        while ticks.next().await.is_some() {
            if let Some(frame) = source.current_frame(&camera).await {
                yield Ok(mjpeg_part(&frame));
            }
        }
    }
}
