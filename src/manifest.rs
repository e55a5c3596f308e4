// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Virtual playback manifests.
//!
//! A manifest tells a mapping-mode VOD packager which source files to stitch
//! together and how long each one plays. Nothing is transcoded here; the
//! packager does the work on the fly.
//!
//! ```text
//!   window:          |<-------------------------->|
//!   segments:   [ seg 0 ][ seg 1 ][ seg 2 ][ seg 3 ]
//!   clip ms:     full     full     full    end - seg.start
//! ```
//!
//! Only the trailing edge is trimmed by default. The leading segment plays in
//! full unless `trim_leading_edge` is enabled.

use serde::Serialize;
use tracing::warn;

use crate::config::VodConfig;
use crate::error::{ReplayError, Result};
use crate::model::{Segment, TimeWindow};

/// One source file in a sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
    #[serde(rename = "keyFrameDurations", skip_serializing_if = "Option::is_none")]
    pub key_frame_durations: Option<Vec<i64>>,
    /// Playback length of this clip.
    #[serde(skip)]
    pub duration_ms: i64,
}

impl ClipDescriptor {
    fn source(path: &str, duration_ms: i64, key_frames: bool) -> Self {
        Self {
            kind: "source",
            path: path.to_string(),
            key_frame_durations: key_frames.then(|| vec![duration_ms]),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    pub clips: Vec<ClipDescriptor>,
}

/// Manifest document returned to the packager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    /// Whether downstream HTTP caches may keep this response.
    pub cache: bool,
    pub discontinuity: bool,
    #[serde(rename = "consistentSequenceMediaInfo", skip_serializing_if = "Option::is_none")]
    pub consistent_sequence_media_info: Option<bool>,
    pub durations: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_duration: Option<i64>,
    pub sequences: Vec<Sequence>,
}

impl Manifest {
    /// Manifest for one already-rendered file.
    pub fn single_file(path: &str, duration_ms: i64) -> Self {
        Self {
            cache: true,
            discontinuity: false,
            consistent_sequence_media_info: None,
            durations: vec![duration_ms],
            segment_duration: None,
            sequences: vec![Sequence { clips: vec![ClipDescriptor::source(path, duration_ms, false)] }],
        }
    }

    pub fn clips(&self) -> impl Iterator<Item = &ClipDescriptor> {
        self.sequences.iter().flat_map(|s| s.clips.iter())
    }

    /// Sum of all clip durations.
    pub fn total_ms(&self) -> i64 {
        self.durations.iter().sum()
    }
}

/// Builds manifests from overlapping segments.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    max_clip_duration_ms: i64,
    trim_leading_edge: bool,
    cacheable_after_secs: f64,
}

impl ManifestBuilder {
    pub fn new(max_clip_duration_secs: u64) -> Self {
        Self {
            max_clip_duration_ms: (max_clip_duration_secs as i64).saturating_mul(1000),
            trim_leading_edge: false,
            cacheable_after_secs: 3600.0,
        }
    }

    pub fn from_config(cfg: &VodConfig) -> Self {
        Self::new(cfg.max_segment_duration_secs)
            .trim_leading_edge(cfg.trim_leading_edge)
            .cacheable_after(cfg.cacheable_after_secs)
    }

    pub fn trim_leading_edge(mut self, enabled: bool) -> Self {
        self.trim_leading_edge = enabled;
        self
    }

    pub fn cacheable_after(mut self, secs: u64) -> Self {
        self.cacheable_after_secs = secs as f64;
        self
    }

    /// Playback length of `seg` inside `window`, before bounds filtering.
    pub fn clip_duration_ms(&self, seg: &Segment, window: &TimeWindow) -> i64 {
        let mut duration = (seg.duration * 1000.0) as i64;
        if seg.end_time > window.end {
            duration -= ((seg.end_time - window.end) * 1000.0) as i64;
        }
        if self.trim_leading_edge && seg.start_time < window.start {
            duration -= ((window.start - seg.start_time) * 1000.0) as i64;
        }
        duration
    }

    /// Build a single-sequence manifest from `segments` (ascending by start).
    ///
    /// Clips whose duration is `<= 0` or `>= max_clip_duration` are skipped
    /// with a warning. If nothing survives the caller gets `NotFound`.
    pub fn build(&self, segments: &[Segment], window: &TimeWindow, now: f64) -> Result<Manifest> {
        let mut clips = Vec::with_capacity(segments.len());
        let mut durations = Vec::with_capacity(segments.len());

        for seg in segments {
            let duration = self.clip_duration_ms(seg, window);
            if 0 < duration && duration < self.max_clip_duration_ms {
                clips.push(ClipDescriptor::source(&seg.path, duration, true));
                durations.push(duration);
            } else {
                warn!(path = %seg.path, duration_ms = duration, "Recording clip is missing or empty");
            }
        }

        if clips.is_empty() {
            warn!(start = window.start, end = window.end, "No recordings found for the requested time range");
            return Err(ReplayError::not_found("Recordings not found for the requested time range"));
        }

        let segment_duration = durations.iter().copied().max();
        Ok(Manifest {
            cache: now - self.cacheable_after_secs > window.start,
            discontinuity: false,
            consistent_sequence_media_info: Some(true),
            durations,
            segment_duration,
            sequences: vec![Sequence { clips }],
        })
    }
}
