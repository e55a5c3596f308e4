// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Records read from the segment store.
//!
//! Times are seconds since the Unix epoch as `f64`, matching what the
//! capture pipeline writes. Nothing here is mutated by the engine.

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// Which segment table a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Full-resolution recordings.
    Recording,
    /// Low-resolution preview videos.
    Preview,
}

impl SegmentKind {
    pub fn table(&self) -> &'static str {
        match self {
            SegmentKind::Recording => "recordings",
            SegmentKind::Preview => "previews",
        }
    }
}

/// A stored, time-bounded unit of video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub camera: String,
    pub path: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Container duration; may differ slightly from `end_time - start_time`.
    pub duration: f64,
    #[serde(default)]
    pub motion: u32,
    #[serde(default)]
    pub objects: u32,
}

impl Segment {
    /// Midpoint used when the segment is reduced to a single activity sample.
    pub fn midpoint(&self) -> f64 {
        self.start_time + self.duration / 2.0
    }
}

/// Closed query interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Rejects reversed and non-finite windows.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ReplayError::invalid("Time range must be finite"));
        }
        if start > end {
            return Err(ReplayError::invalid(format!(
                "Invalid time range: start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window ending "now" when the caller left the end open.
    pub fn open_ended(start: f64, end: Option<f64>, now: f64) -> Result<Self> {
        Self::new(start, end.unwrap_or(now))
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, ts: f64) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// One row of the detection timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: f64,
    pub camera: String,
    pub source: String,
    pub source_id: String,
    pub class_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl TimelineEntry {
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(|v| v.as_str())
    }
}

/// A detection event with its recorded time span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub camera: String,
    pub label: String,
    pub start_time: f64,
    /// `None` while the event is still in progress.
    pub end_time: Option<f64>,
    pub has_clip: bool,
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
}

impl EventRecord {
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Live state of an object still being tracked.
#[derive(Debug, Clone, Default)]
pub struct TrackedObject {
    pub id: String,
    pub camera: String,
    pub thumbnail: Option<Vec<u8>>,
}
