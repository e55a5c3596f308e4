// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Time-bucketed activity.
//!
//! * [`hourly_timeline`] groups detection timeline rows into hour buckets.
//! * [`recording_activity`] turns per-segment motion/object statistics into
//!   one magnitude sample per segment, bucketed by hour, and
//!   [`resample_minutes`] spreads each hour onto a fixed 60-minute grid.
//! * [`summarize_recordings`] sums a camera's recordings per local hour/day.
//!
//! Bucket keys are epoch seconds. `minute_modifier` is the sub-hour part of
//! the caller's UTC offset (see [`crate::time::minute_modifier`]).

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::model::{EventRecord, Segment, TimelineEntry};
use crate::time::{floor_hour, floor_minute, local_hour_label, HOUR_SECS};

const MINUTES_PER_HOUR: i64 = 60;

/// Start of the UTC hour containing `ts`, moved by the caller's sub-hour offset.
pub fn timeline_hour_bucket(ts: f64, minute_modifier: i64) -> i64 {
    floor_hour(ts) + minute_modifier * 60
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTimeline {
    /// Timestamp of the first row seen (the newest).
    pub start: f64,
    /// Timestamp of the last row seen (the oldest), 0 with fewer than two rows.
    pub end: f64,
    pub count: usize,
    /// Rows per hour, oldest first.
    pub hours: BTreeMap<i64, VecDeque<TimelineEntry>>,
}

/// Group newest-first timeline rows into hour buckets.
///
/// Rows are pushed to the front of their bucket, so each bucket ends up
/// oldest-first even though the input is scanned newest-first.
pub fn hourly_timeline(entries: impl IntoIterator<Item = TimelineEntry>, minute_modifier: i64) -> HourlyTimeline {
    let mut out = HourlyTimeline { start: 0.0, end: 0.0, count: 0, hours: BTreeMap::new() };

    for entry in entries {
        if out.count == 0 {
            out.start = entry.timestamp;
        } else {
            out.end = entry.timestamp;
        }
        out.count += 1;

        let hour = timeline_hour_bucket(entry.timestamp, minute_modifier);
        out.hours.entry(hour).or_default().push_front(entry);
    }

    out
}

/// Raw `(timestamp, magnitude, has_objects)` sample before resampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub magnitude: f64,
    pub has_objects: bool,
}

impl RawSample {
    fn boundary(timestamp: f64) -> Self {
        Self { timestamp, magnitude: 0.0, has_objects: false }
    }
}

/// One minute of the resampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivitySample {
    pub date: i64,
    pub count: i64,
    #[serde(rename = "hasObjects")]
    pub has_objects: bool,
}

/// `log2(motion + objects)`, or 0 when both are zero.
pub fn magnitude(motion: u32, objects: u32) -> f64 {
    let total = motion as u64 + objects as u64;
    if total == 0 { 0.0 } else { (total as f64).log2() }
}

/// How far the current bucket moves when a segment starts past its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapAdvance {
    /// Move one hour, whatever the gap. Later segments of a long gap land in
    /// that next bucket.
    #[default]
    SingleHour,
    /// Open and close every hour up to the one containing the segment.
    EveryHour,
}

/// Bucket segment statistics by hour.
///
/// `segments` must be ascending by start time. The first bucket starts at
/// `after` truncated to the minute plus `minute_modifier`, and every bucket
/// is opened and closed with a zero sample so the hour is fully represented.
/// `gaps` decides how many buckets a segment past the current one opens.
pub fn recording_activity(
    segments: &[Segment],
    after: f64,
    minute_modifier: i64,
    gaps: GapAdvance,
) -> BTreeMap<i64, Vec<RawSample>> {
    let mut hours: BTreeMap<i64, Vec<RawSample>> = BTreeMap::new();

    let mut key = floor_minute(after) + minute_modifier * 60;
    let mut check = (key + HOUR_SECS) as f64;
    hours.entry(key).or_default().push(RawSample::boundary(key as f64));

    for seg in segments {
        while seg.start_time > check {
            hours
                .entry(key)
                .or_default()
                .push(RawSample::boundary((key + HOUR_SECS - 1) as f64));
            key += HOUR_SECS;
            check = (key + HOUR_SECS) as f64;
            hours.entry(key).or_default().push(RawSample::boundary(key as f64));
            if gaps == GapAdvance::SingleHour {
                break;
            }
        }

        hours.entry(key).or_default().push(RawSample {
            timestamp: seg.midpoint(),
            magnitude: magnitude(seg.motion, seg.objects),
            has_objects: seg.objects > 0,
        });
    }

    hours
}

/// Spread one hour of samples onto 60 one-minute slots starting at `bucket_start`.
///
/// Each slot holds the mean of the samples falling in it; `count` is that
/// mean truncated to an integer and `hasObjects` is set when any sample in
/// the slot had objects. Empty slots are zero. Samples outside the hour are
/// folded into the first or last slot.
pub fn resample_minutes(bucket_start: i64, samples: &[RawSample]) -> Vec<ActivitySample> {
    let mut sums = [(0.0f64, 0u32, 0u32); MINUTES_PER_HOUR as usize];

    for s in samples {
        let offset = (floor_minute(s.timestamp.trunc()) - bucket_start) / 60;
        let slot = offset.clamp(0, MINUTES_PER_HOUR - 1) as usize;
        let (magnitude, with_objects, n) = &mut sums[slot];
        *magnitude += s.magnitude;
        *with_objects += s.has_objects as u32;
        *n += 1;
    }

    sums.iter()
        .enumerate()
        .map(|(i, (magnitude, with_objects, n))| {
            let (count, has_objects) = if *n == 0 {
                (0, false)
            } else {
                ((magnitude / *n as f64) as i64, *with_objects > 0)
            };
            ActivitySample { date: bucket_start + i as i64 * 60, count: count.max(0), has_objects }
        })
        .collect()
}

/// [`recording_activity`] followed by [`resample_minutes`] for every hour.
pub fn activity_series(
    segments: &[Segment],
    after: f64,
    minute_modifier: i64,
    gaps: GapAdvance,
) -> BTreeMap<i64, Vec<ActivitySample>> {
    recording_activity(segments, after, minute_modifier, gaps)
        .into_iter()
        .map(|(key, samples)| (key, resample_minutes(key, &samples)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourSummary {
    pub hour: String,
    pub events: u64,
    pub motion: u64,
    pub objects: u64,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub day: String,
    pub events: u64,
    pub hours: Vec<HourSummary>,
}

#[derive(Default)]
struct HourTotals {
    duration: f64,
    motion: u64,
    objects: u64,
}

/// Per-day, per-hour totals of a camera's recordings, newest first.
///
/// Hours are local to `offset`. `events` counts the clip-bearing events that
/// started in the same local hour.
pub fn summarize_recordings(recordings: &[Segment], events: &[EventRecord], offset: &FixedOffset) -> Vec<DaySummary> {
    let mut event_counts: HashMap<String, u64> = HashMap::new();
    for ev in events.iter().filter(|e| e.has_clip) {
        *event_counts.entry(local_hour_label(ev.start_time, offset)).or_default() += 1;
    }

    let mut sorted: Vec<&Segment> = recordings.iter().collect();
    sorted.sort_by(|a, b| b.start_time.total_cmp(&a.start_time));

    // Hour labels in newest-first order of first appearance.
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, HourTotals> = HashMap::new();
    for seg in sorted {
        let label = local_hour_label(seg.start_time, offset);
        let t = totals.entry(label.clone()).or_insert_with(|| {
            order.push(label.clone());
            HourTotals::default()
        });
        t.duration += seg.duration;
        t.motion += seg.motion as u64;
        t.objects += seg.objects as u64;
    }

    let mut days: Vec<DaySummary> = Vec::new();
    for label in order {
        let Some((day, hour)) = label.split_once(' ') else { continue };
        let t = &totals[&label];
        let events = event_counts.get(&label).copied().unwrap_or(0);
        let hour = HourSummary {
            hour: hour.to_string(),
            events,
            motion: t.motion,
            objects: t.objects,
            duration: t.duration.round() as i64,
        };
        match days.iter_mut().find(|d| d.day == day) {
            Some(d) => {
                d.events += events;
                d.hours.push(hour);
            }
            None => days.push(DaySummary { day: day.to_string(), events, hours: vec![hour] }),
        }
    }
    days
}
