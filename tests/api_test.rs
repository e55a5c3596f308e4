//! HTTP router tests, driven through `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tokio_stream::StreamExt;
use tower::ServiceExt;

use nvr_replay::api::{build_router, AppState};
use nvr_replay::frames::{mjpeg_part, mjpeg_stream};
use nvr_replay::model::{EventRecord, Segment, TimelineEntry, TrackedObject};
use nvr_replay::storage::index::MemoryStore;

use common::{seg, seg_with_stats, test_config, tmp_dir, FakeFrames, FakeMode, FakeTranscoder, CLIP_BYTES};

struct Harness {
    dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    tool: Arc<FakeTranscoder>,
    app: Router,
}

fn harness() -> Harness {
    let dir = tmp_dir();
    let store = Arc::new(MemoryStore::new());
    let tool = FakeTranscoder::new(FakeMode::Succeed);
    let frames = FakeFrames::with_frame("cam1", b"\xFF\xD8jpeg");
    frames.tracked.lock().push(TrackedObject {
        id: "live-1".into(),
        camera: "cam2".into(),
        thumbnail: Some(b"live-thumb".to_vec()),
    });

    let state = AppState::new(test_config(dir.path()), store.clone(), tool.clone(), frames);
    let app = build_router(Arc::new(state));
    Harness { dir, store, tool, app }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().method(method).uri(uri).body(Body::empty()).expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, headers, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, "GET", uri).await
}

fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("json body")
}

fn event(id: &str, has_clip: bool, thumbnail: Option<&[u8]>) -> EventRecord {
    EventRecord {
        id: id.into(),
        camera: "cam1".into(),
        label: "person".into(),
        start_time: 100.0,
        end_time: Some(130.0),
        has_clip,
        thumbnail: thumbnail.map(<[u8]>::to_vec),
    }
}

fn timeline_entry(ts: f64, camera: &str, label: &str) -> TimelineEntry {
    TimelineEntry {
        timestamp: ts,
        camera: camera.into(),
        source: "tracked_object".into(),
        source_id: format!("{camera}-{ts}"),
        class_type: "visible".into(),
        data: serde_json::json!({ "label": label }),
    }
}

#[tokio::test]
async fn test_vod_without_recordings_is_not_found() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/api/vod/cam1/start/0/end/100").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = json(&body);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().expect("message").contains("not found"));
}

#[tokio::test]
async fn test_vod_manifest() {
    let h = harness();
    for (s, e) in [(0.0, 300.0), (300.0, 600.0), (600.0, 900.0)] {
        h.store.add_recording(seg("cam1", s, e));
    }

    let (status, _, body) = get(&h.app, "/api/vod/cam1/start/250/end/650").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["durations"], serde_json::json!([300_000, 300_000, 50_000]));
    assert_eq!(body["cache"], true);
    assert_eq!(body["sequences"][0]["clips"].as_array().expect("clips").len(), 3);
}

#[tokio::test]
async fn test_reversed_window_is_bad_request() {
    let h = harness();
    let (status, _, body) = get(&h.app, "/api/vod/cam1/start/500/end/100").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["success"], false);
}

#[tokio::test]
async fn test_vod_hour_uses_local_offset() {
    let h = harness();
    // 2024-01-02 03:00 at +02:00 is 01:00 UTC.
    let utc_start = 1_704_157_200.0;
    h.store.add_recording(seg("cam1", utc_start + 10.0, utc_start + 20.0));

    let (status, _, body) = get(&h.app, "/api/vod/hour/2024-01/2/3/cam1/+02:00").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["durations"], serde_json::json!([10_000]));

    let (status, _, _) = get(&h.app, "/api/vod/hour/2024-01/2/3/cam1/utc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Named zone, with `,` standing in for `/`.
    let (status, _, body) = get(&h.app, "/api/vod/hour/2024-01/2/3/cam1/Africa,Cairo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["durations"], serde_json::json!([10_000]));
}

#[tokio::test]
async fn test_vod_hour_defaults_to_utc() {
    let h = harness();
    // 2024-01-02 03:00 UTC.
    let utc_start = 1_704_164_400.0;
    h.store.add_recording(seg("cam1", utc_start + 60.0, utc_start + 70.0));

    let (status, _, body) = get(&h.app, "/api/vod/hour/2024-01/2/3/cam1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["durations"], serde_json::json!([10_000]));
}

#[tokio::test]
async fn test_unknown_camera_differs_from_empty_range() {
    let h = harness();

    for uri in [
        "/api/vod/garage/start/0/end/10",
        "/api/vod/hour/2024-01/2/3/garage/utc",
        "/api/garage/start/0/end/10/clip.mp4",
        "/api/garage/start/0/end/10/preview.gif",
        "/api/preview/garage/start/0/end/10",
        "/api/preview/garage/10/thumbnail.jpg",
    ] {
        let (status, _, body) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json(&body)["message"], "Camera 'garage' not found", "{uri}");
    }

    // A configured camera with nothing recorded in the window.
    let (status, _, body) = get(&h.app, "/api/vod/cam2/start/0/end/10").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["message"], "Recordings not found for the requested time range");

    let (status, _, body) = get(&h.app, "/api/cam2/start/0/end/10/clip.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["message"], "Recordings not found for the requested time range");
    assert_eq!(h.tool.calls(), 0);
}

#[tokio::test]
async fn test_clip_download_is_materialized_once() {
    let h = harness();
    h.store.add_recording(seg("cam1", 900.0, 1200.0));
    h.store.add_recording(seg("cam1", 1200.0, 1500.0));

    let (status, headers, body) = get(&h.app, "/api/cam1/start/1000/end/1300/clip.mp4?download=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=\"clip_cam1_1000-1300.mp4\"");
    assert_eq!(headers["content-description"], "File Transfer");
    assert_eq!(&body[..], CLIP_BYTES);

    let (status, headers, _) = get(&h.app, "/api/cam1/start/1000/end/1300/clip.mp4").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(h.tool.calls(), 1);
    assert!(h.dir.path().join("cache/clip_cam1_1000-1300.mp4").exists());
}

#[tokio::test]
async fn test_clip_without_recordings_is_not_found() {
    let h = harness();
    let (status, _, _) = get(&h.app, "/api/cam1/start/1000/end/1300/clip.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.tool.calls(), 0);
}

#[tokio::test]
async fn test_recordings_listing_and_unknown_camera() {
    let h = harness();
    h.store.add_recording(seg_with_stats("cam1", 100.0, 110.0, 3, 1));
    h.store.add_recording(seg("cam1", 5000.0, 5010.0));

    let (status, _, body) = get(&h.app, "/api/cam1/recordings?after=0&before=1000").await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<Segment> = serde_json::from_slice(&body).expect("segments");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].motion, 3);

    let (status, _, body) = get(&h.app, "/api/garage/recordings").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["message"], "Camera 'garage' not found");
}

#[tokio::test]
async fn test_hourly_activity_endpoint() {
    let h = harness();
    h.store.add_recording(seg_with_stats("cam1", 100.0, 110.0, 4, 0));

    let (status, _, body) = get(&h.app, "/api/cam1/recording/hourly/activity?after=0&before=3600").await;
    assert_eq!(status, StatusCode::OK);
    let hours = json(&body);
    let hours = hours.as_object().expect("keyed by hour");
    assert_eq!(hours.keys().collect::<Vec<_>>(), vec!["0"]);
    let samples = hours["0"].as_array().expect("samples");
    assert_eq!(samples.len(), 60);
    assert_eq!(samples[1], serde_json::json!({ "date": 60, "count": 2, "hasObjects": false }));

    let (status, _, _) = get(&h.app, "/api/garage/recording/hourly/activity").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recordings_summary_endpoint() {
    let h = harness();
    h.store.add_recording(seg_with_stats("cam1", 0.0, 300.0, 2, 0));
    h.store.add_event(event("ev1", true, None));

    let (status, _, body) = get(&h.app, "/api/cam1/recordings/summary?timezone=utc").await;
    assert_eq!(status, StatusCode::OK);
    let days = json(&body);
    assert_eq!(days[0]["day"], "1970-01-01");
    assert_eq!(days[0]["events"], 1);
    assert_eq!(days[0]["hours"][0]["duration"], 300);
}

#[tokio::test]
async fn test_preview_listing_for_all_cameras() {
    let h = harness();
    let media = h.dir.path().join("media");
    for camera in ["cam1", "cam2"] {
        let mut preview = seg(camera, 3600.0, 7200.0);
        preview.path = media.join(format!("clips/previews/{camera}/3600.mp4")).display().to_string();
        h.store.add_preview(preview);
    }

    let (status, _, body) = get(&h.app, "/api/preview/all/start/4000/end/5000").await;
    assert_eq!(status, StatusCode::OK);
    let clips = json(&body);
    assert_eq!(clips.as_array().expect("array").len(), 2);
    assert_eq!(clips[0]["src"], "/clips/previews/cam1/3600.mp4");
    assert_eq!(clips[0]["type"], "video/mp4");

    let (status, _, _) = get(&h.app, "/api/preview/cam1/start/0/end/10").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_timeline_endpoints() {
    let h = harness();
    h.store.add_timeline(timeline_entry(3650.0, "cam1", "person"));
    h.store.add_timeline(timeline_entry(3700.0, "cam2", "car"));
    h.store.add_timeline(timeline_entry(7300.0, "cam1", "car"));

    let (status, _, body) = get(&h.app, "/api/timeline?camera=cam1&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json(&body);
    assert_eq!(rows.as_array().expect("array").len(), 1);
    assert_eq!(rows[0]["timestamp"], 3650.0);

    let (status, _, body) = get(&h.app, "/api/timeline/hourly?labels=car").await;
    assert_eq!(status, StatusCode::OK);
    let hourly = json(&body);
    assert_eq!(hourly["count"], 2);
    assert_eq!(hourly["start"], 7300.0);
    assert_eq!(hourly["hours"]["3600"][0]["camera"], "cam2");
    assert_eq!(hourly["hours"]["7200"][0]["camera"], "cam1");

    // Kolkata is +05:30: buckets move by the half hour.
    let (status, _, body) = get(&h.app, "/api/timeline/hourly?labels=car&timezone=Asia/Kolkata").await;
    assert_eq!(status, StatusCode::OK);
    let hourly = json(&body);
    assert_eq!(hourly["hours"]["5400"][0]["camera"], "cam2");
    assert_eq!(hourly["hours"]["9000"][0]["camera"], "cam1");

    let (status, _, _) = get(&h.app, "/api/timeline/hourly?timezone=mars").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_manifest() {
    let h = harness();
    h.store.add_event(event("no-clip", false, None));
    h.store.add_event(event("ev1", true, None));

    let (status, _, body) = get(&h.app, "/api/vod/event/no-clip").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["message"], "Recordings not available.");

    let (status, _, _) = get(&h.app, "/api/vod/event/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Falls back to the recordings covering the event.
    h.store.add_recording(seg("cam1", 90.0, 120.0));
    h.store.add_recording(seg("cam1", 120.0, 150.0));
    let (status, _, body) = get(&h.app, "/api/vod/event/ev1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["durations"], serde_json::json!([30_000, 10_000]));

    // A pre-rendered clip wins.
    let clips_dir = h.dir.path().join("clips");
    std::fs::create_dir_all(&clips_dir).expect("clips dir");
    std::fs::write(clips_dir.join("cam1-ev1.mp4"), b"clip").expect("clip");
    let (status, _, body) = get(&h.app, "/api/vod/event/ev1").await;
    assert_eq!(status, StatusCode::OK);
    let manifest = json(&body);
    assert_eq!(manifest["durations"], serde_json::json!([30_000]));
    assert!(manifest["sequences"][0]["clips"][0]["path"].as_str().expect("path").ends_with("cam1-ev1.mp4"));
}

#[tokio::test]
async fn test_event_clip_prefers_prerendered_file() {
    let h = harness();
    h.store.add_event(event("ev1", true, None));
    let clips_dir = h.dir.path().join("clips");
    std::fs::create_dir_all(&clips_dir).expect("clips dir");
    std::fs::write(clips_dir.join("cam1-ev1.mp4"), b"prerendered").expect("clip");

    let (status, headers, body) = get(&h.app, "/api/events/ev1/clip.mp4?download=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"prerendered");
    assert_eq!(headers[header::CONTENT_DISPOSITION], "attachment; filename=\"cam1-ev1.mp4\"");
    assert_eq!(h.tool.calls(), 0);
}

#[tokio::test]
async fn test_event_preview_gif() {
    let h = harness();
    h.store.add_event(event("ev1", true, None));
    let mut preview = seg("cam1", 0.0, 3600.0);
    preview.path = "/media/nvr/clips/previews/cam1/0.mp4".into();
    h.store.add_preview(preview);

    let (status, headers, body) = get(&h.app, "/api/events/ev1/preview.gif").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/gif");
    assert_eq!(&body[..], common::GIF_BYTES);

    let (status, _, _) = get(&h.app, "/api/events/nope/preview.gif").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_thumbnail_sources() {
    let h = harness();
    h.store.add_event(event("ev1", true, Some(b"stored-thumb")));

    let (status, headers, body) = get(&h.app, "/api/events/ev1/thumbnail.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"stored-thumb");
    assert_eq!(headers[header::CACHE_CONTROL], "private, max-age=31536000");

    let (status, headers, body) = get(&h.app, "/api/events/live-1/thumbnail.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"live-thumb");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");

    let (status, _, _) = get(&h.app, "/api/events/unknown/thumbnail.jpg").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_latest_frame() {
    let h = harness();
    let (status, headers, body) = get(&h.app, "/api/cam1/latest.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(&body[..], b"\xFF\xD8jpeg");

    let (status, _, body) = get(&h.app, "/api/cam2/latest.jpg").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["message"], "Unable to get valid frame");
}

#[tokio::test]
async fn test_mjpeg_endpoint_headers() {
    let h = harness();
    let request = Request::builder().uri("/api/cam1/mjpeg?fps=500").body(Body::empty()).expect("request");
    let response = h.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "multipart/x-mixed-replace;boundary=frame");
}

#[tokio::test]
async fn test_mjpeg_stream_parts() {
    let part = mjpeg_part(b"JPEG");
    assert_eq!(&part[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n\r\n");

    let frames = FakeFrames::with_frame("cam1", b"JPEG");
    let parts: Vec<Bytes> = mjpeg_stream(frames, "cam1".into(), 30)
        .take(2)
        .map(|p| p.expect("part"))
        .collect()
        .await;
    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(|p| p == &part));
}

#[tokio::test]
async fn test_export_maintenance() {
    let h = harness();
    let exports = h.dir.path().join("exports");
    std::fs::create_dir_all(&exports).expect("exports dir");
    std::fs::write(exports.join("old.mp4"), b"x").expect("export");

    let (status, _, body) = send(&h.app, "PATCH", "/api/export/old/new_name").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], true);
    assert!(exports.join("new_name.mp4").exists());

    let (status, _, body) = send(&h.app, "PATCH", "/api/export/new_name/bad%20name").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["message"].as_str().expect("message").contains("illegal characters"));

    let (status, _, _) = send(&h.app, "DELETE", "/api/export/new_name").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&h.app, "DELETE", "/api/export/new_name").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
