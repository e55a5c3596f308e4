// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage subsystem — segment store interface, in-memory index, SQLite back-end.

pub mod filter;
pub mod index;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{EventRecord, Segment, SegmentKind, TimeWindow, TimelineEntry};
use filter::Filter;

/// Which cameras a segment lookup covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraScope<'a> {
    One(&'a str),
    All,
}

impl<'a> CameraScope<'a> {
    /// `"all"` selects every camera.
    pub fn parse(camera: &'a str) -> Self {
        if camera == "all" { CameraScope::All } else { CameraScope::One(camera) }
    }

    pub fn matches(&self, camera: &str) -> bool {
        match self {
            CameraScope::One(id) => *id == camera,
            CameraScope::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Three-clause overlap test shared by every back-end.
///
/// A segment matches when its start lies in the window, its end lies in the
/// window, or it strictly contains the window.
pub fn overlaps(start_time: f64, end_time: f64, window: &TimeWindow) -> bool {
    window.contains(start_time)
        || window.contains(end_time)
        || (start_time < window.start && end_time > window.end)
}

/// Read-only view of the datastore populated by the capture pipeline.
///
/// Every query returns rows ordered by start time (ascending) unless an
/// explicit [`SortOrder`] says otherwise. An empty result is not an error.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Segments of `kind` overlapping `window`.
    async fn find(&self, camera: CameraScope<'_>, window: TimeWindow, kind: SegmentKind) -> Result<Vec<Segment>>;

    /// Recordings with `end >= after` and `start <= before`.
    async fn recordings_between(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>>;

    /// Recordings with motion, `start > after` and `end < before`.
    async fn activity_segments(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>>;

    /// Every recording of a camera.
    async fn recordings_for_camera(&self, camera: &str) -> Result<Vec<Segment>>;

    /// Timeline rows matching `filter`, ordered by timestamp.
    async fn timeline(&self, filter: &Filter, order: SortOrder, limit: usize) -> Result<Vec<TimelineEntry>>;

    async fn event(&self, id: &str) -> Result<Option<EventRecord>>;

    /// Events of a camera that have recordings.
    async fn events_with_clips(&self, camera: &str) -> Result<Vec<EventRecord>>;
}

pub type SharedStore = Arc<dyn SegmentStore>;
