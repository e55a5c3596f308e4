// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! In-memory segment index — maps (kind, camera_id, start) → Segment.
//!
//! Used when the engine is embedded without a database, and by the tests.
//! Entries are kept in a `BTreeMap` so per-camera scans come out in
//! chronological order without sorting.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{EventRecord, Segment, SegmentKind, TimeWindow, TimelineEntry};
use crate::storage::filter::Filter;
use crate::storage::{overlaps, CameraScope, SegmentStore, SortOrder};

/// Key for the ordered index: (kind, camera_id, start).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey {
    kind: SegmentKind,
    camera_id: String,
    start_ms: i64,
    /// tiebreak on insertion order
    seq: u64,
}

/// Ordered index of segments across all cameras.
#[derive(Default)]
pub struct SegmentIndex {
    entries: BTreeMap<IndexKey, Segment>,
    counter: u64,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment; returns its insertion sequence number.
    pub fn insert(&mut self, kind: SegmentKind, segment: Segment) -> u64 {
        let seq = self.counter;
        self.counter += 1;
        let key = IndexKey {
            kind,
            camera_id: segment.camera.clone(),
            start_ms: (segment.start_time * 1000.0).round() as i64,
            seq,
        };
        self.entries.insert(key, segment);
        seq
    }

    /// All segments of `kind` for a camera in chronological order.
    pub fn segments_for_camera(&self, kind: SegmentKind, camera_id: &str) -> Vec<&Segment> {
        self.entries
            .iter()
            .filter(|(k, _)| k.kind == kind && k.camera_id == camera_id)
            .map(|(_, v)| v)
            .collect()
    }

    /// Segments overlapping `window`, ascending by start time.
    ///
    /// With [`CameraScope::All`] the per-camera runs are merged back into
    /// global start-time order.
    pub fn segments_in_range(&self, kind: SegmentKind, camera: CameraScope<'_>, window: &TimeWindow) -> Vec<&Segment> {
        let mut found: Vec<&Segment> = self
            .entries
            .iter()
            .filter(|(k, v)| {
                k.kind == kind && camera.matches(&k.camera_id) && overlaps(v.start_time, v.end_time, window)
            })
            .map(|(_, v)| v)
            .collect();
        if camera == CameraScope::All {
            found.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// [`SegmentStore`] backed by in-process collections.
#[derive(Default)]
pub struct MemoryStore {
    segments: RwLock<SegmentIndex>,
    timeline: RwLock<Vec<TimelineEntry>>,
    events: RwLock<BTreeMap<String, EventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recording(&self, segment: Segment) {
        self.segments.write().insert(SegmentKind::Recording, segment);
    }

    pub fn add_preview(&self, segment: Segment) {
        self.segments.write().insert(SegmentKind::Preview, segment);
    }

    pub fn add_timeline(&self, entry: TimelineEntry) {
        self.timeline.write().push(entry);
    }

    pub fn add_event(&self, event: EventRecord) {
        self.events.write().insert(event.id.clone(), event);
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn find(&self, camera: CameraScope<'_>, window: TimeWindow, kind: SegmentKind) -> Result<Vec<Segment>> {
        let index = self.segments.read();
        Ok(index.segments_in_range(kind, camera, &window).into_iter().cloned().collect())
    }

    async fn recordings_between(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>> {
        let index = self.segments.read();
        Ok(index
            .segments_for_camera(SegmentKind::Recording, camera)
            .into_iter()
            .filter(|s| s.end_time >= after && s.start_time <= before)
            .cloned()
            .collect())
    }

    async fn activity_segments(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>> {
        let index = self.segments.read();
        Ok(index
            .segments_for_camera(SegmentKind::Recording, camera)
            .into_iter()
            .filter(|s| s.motion > 0 && s.start_time > after && s.end_time < before)
            .cloned()
            .collect())
    }

    async fn recordings_for_camera(&self, camera: &str) -> Result<Vec<Segment>> {
        let index = self.segments.read();
        Ok(index.segments_for_camera(SegmentKind::Recording, camera).into_iter().cloned().collect())
    }

    async fn timeline(&self, filter: &Filter, order: SortOrder, limit: usize) -> Result<Vec<TimelineEntry>> {
        let mut rows: Vec<TimelineEntry> = self
            .timeline
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        if order == SortOrder::Descending {
            rows.reverse();
        }
        rows.truncate(limit);
        Ok(rows)
    }

    async fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        Ok(self.events.read().get(id).cloned())
    }

    async fn events_with_clips(&self, camera: &str) -> Result<Vec<EventRecord>> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.camera == camera && e.has_clip)
            .cloned()
            .collect())
    }
}
