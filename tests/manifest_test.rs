//! Manifest builder tests.

mod common;

use nvr_replay::error::ReplayError;
use nvr_replay::manifest::{Manifest, ManifestBuilder};
use nvr_replay::model::TimeWindow;

use common::seg;

fn window(start: f64, end: f64) -> TimeWindow {
    TimeWindow::new(start, end).expect("valid window")
}

fn three_segments() -> Vec<nvr_replay::model::Segment> {
    vec![seg("cam1", 0.0, 300.0), seg("cam1", 300.0, 600.0), seg("cam1", 600.0, 900.0)]
}

#[test]
fn test_trailing_edge_trim_only() {
    let builder = ManifestBuilder::new(600);
    let manifest = builder.build(&three_segments(), &window(250.0, 650.0), 10_000.0).expect("manifest");

    // The leading segment plays in full; only the trailing one is cut.
    assert_eq!(manifest.durations, vec![300_000, 300_000, 50_000]);
    assert_eq!(manifest.clips().count(), 3);
    assert_eq!(manifest.segment_duration, Some(300_000));
    assert_eq!(manifest.total_ms(), 650_000);
}

#[test]
fn test_leading_edge_trim_when_enabled() {
    let builder = ManifestBuilder::new(600).trim_leading_edge(true);
    let manifest = builder.build(&three_segments(), &window(250.0, 650.0), 10_000.0).expect("manifest");
    assert_eq!(manifest.durations, vec![50_000, 300_000, 50_000]);
    assert_eq!(manifest.total_ms(), 400_000);
}

#[test]
fn test_out_of_bounds_clips_are_skipped() {
    let segments = vec![
        seg("cam1", 0.0, 0.0),      // empty
        seg("cam1", 0.0, 600.0),    // exactly the maximum
        seg("cam1", 600.0, 900.0),
        seg("cam1", 900.0, 5000.0), // corrupt duration, trimmed to 100s by the window end
    ];
    let builder = ManifestBuilder::new(600);
    let manifest = builder.build(&segments, &window(0.0, 1000.0), 0.0).expect("manifest");

    assert_eq!(manifest.durations, vec![300_000, 100_000]);
    for clip in manifest.clips() {
        assert!(clip.duration_ms > 0 && clip.duration_ms < 600_000);
    }
}

#[test]
fn test_no_surviving_clips_is_not_found() {
    let builder = ManifestBuilder::new(600);
    let err = builder.build(&[], &window(0.0, 100.0), 0.0).expect_err("no segments");
    assert!(matches!(err, ReplayError::NotFound(ref msg) if msg.contains("not found")));

    let err = builder
        .build(&[seg("cam1", 0.0, 0.0)], &window(0.0, 100.0), 0.0)
        .expect_err("only empty segments");
    assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
}

#[test]
fn test_cache_flag_follows_window_age() {
    let builder = ManifestBuilder::new(600);
    let segments = vec![seg("cam1", 1000.0, 1010.0)];
    let w = window(1000.0, 1010.0);

    assert!(builder.build(&segments, &w, 1000.0 + 3601.0).expect("old").cache);
    assert!(!builder.build(&segments, &w, 1000.0 + 3600.0).expect("recent").cache);
    assert!(!builder.cacheable_after(7200).build(&segments, &w, 1000.0 + 3601.0).expect("custom").cache);
}

#[test]
fn test_manifest_json_shape() {
    let manifest = ManifestBuilder::new(600)
        .build(&[seg("cam1", 0.0, 10.0)], &window(0.0, 10.0), 0.0)
        .expect("manifest");
    let json = serde_json::to_value(&manifest).expect("serialize");

    assert_eq!(json["discontinuity"], false);
    assert_eq!(json["consistentSequenceMediaInfo"], true);
    assert_eq!(json["segment_duration"], 10_000);
    let clip = &json["sequences"][0]["clips"][0];
    assert_eq!(clip["type"], "source");
    assert_eq!(clip["path"], "/media/nvr/recordings/cam1/0.mp4");
    assert_eq!(clip["keyFrameDurations"], serde_json::json!([10_000]));
    assert!(clip.get("duration_ms").is_none());
}

#[test]
fn test_single_file_manifest() {
    let manifest = Manifest::single_file("/media/nvr/clips/cam1-ev1.mp4", 30_000);
    let json = serde_json::to_value(&manifest).expect("serialize");
    assert_eq!(json["cache"], true);
    assert_eq!(json["durations"], serde_json::json!([30_000]));
    assert!(json.get("consistentSequenceMediaInfo").is_none());
    assert!(json["sequences"][0]["clips"][0].get("keyFrameDurations").is_none());
}
