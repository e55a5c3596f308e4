// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! HTTP API: read-only access to recordings, previews and activity.
//!
//! Endpoints (all `GET` unless noted):
//!   /api/{camera}/recordings?after&before                    → recording list (JSON)
//!   /api/{camera}/recordings/summary?timezone                → per day/hour totals
//!   /api/{camera}/recording/hourly/activity?after&before     → 60 samples per hour bucket
//!   /api/{camera}/start/{start}/end/{end}/clip.mp4           → materialized clip
//!   /api/{camera}/start/{start}/end/{end}/preview.gif        → animated preview
//!   /api/{camera}/latest.jpg                                 → current frame
//!   /api/{camera}/mjpeg?fps                                  → multipart stream
//!   /api/vod/{camera}/start/{start}/end/{end}                → packager manifest
//!   /api/vod/hour/{year_month}/{day}/{hour}/{camera}[/{tz}]  → manifest for one hour (UTC default)
//!   /api/vod/event/{id}                                      → manifest for an event
//!   /api/preview/{camera}/start/{start}/end/{end}            → preview files
//!   /api/preview/hour/{year_month}/{day}/{hour}/{camera}/{tz}
//!   /api/preview/{camera}/{frame_time}/thumbnail.jpg         → nearest still
//!   /api/events/{id}/clip.mp4 | preview.gif | thumbnail.jpg
//!   /api/timeline?camera&source_id&limit
//!   /api/timeline/hourly?cameras&labels&before&after&limit&timezone
//!   PATCH  /api/export/{name}/{new_name}
//!   DELETE /api/export/{name}
//!
//! Failures are rendered by [`ReplayError`] as `{ "success": false, "message": ... }`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::activity::{activity_series, hourly_timeline, summarize_recordings, ActivitySample};
use crate::clip::{event_clip_path, ClipArtifact, ClipMaterializer, ExportDir};
use crate::config::Config;
use crate::error::{ReplayError, Result};
use crate::frames::{mjpeg_stream, FrameSource, MJPEG_BOUNDARY};
use crate::manifest::{Manifest, ManifestBuilder};
use crate::model::{EventRecord, SegmentKind, TimeWindow};
use crate::preview::PreviewReconstructor;
use crate::storage::filter::{list_param, FilterBuilder, Predicate};
use crate::storage::{CameraScope, SharedStore, SortOrder};
use crate::time::{hour_window, minute_modifier, now_epoch, parse_utc_offset, CallerZone, HOUR_SECS};
use crate::transcode::Transcoder;

const DEFAULT_TIMELINE_LIMIT: usize = 100;
const DEFAULT_HOURLY_LIMIT: usize = 200;

/// Shared state passed to all handlers.
pub struct AppState {
    pub config: Config,
    pub store: SharedStore,
    pub frames: Arc<dyn FrameSource>,
    pub manifests: ManifestBuilder,
    pub clips: ClipMaterializer,
    pub previews: PreviewReconstructor,
    pub exports: ExportDir,
}

impl AppState {
    pub fn new(
        config: Config,
        store: SharedStore,
        tool: Arc<dyn Transcoder>,
        frames: Arc<dyn FrameSource>,
    ) -> Self {
        let timeout = config.transcode.timeout();
        let manifests = ManifestBuilder::from_config(&config.vod);
        let clips = ClipMaterializer::new(&config.storage.cache_dir, tool.clone(), timeout);
        let previews = PreviewReconstructor::new(
            store.clone(),
            tool,
            &config.storage.preview_frames_dir,
            &config.storage.media_root,
            config.preview.clone(),
            timeout,
        );
        let exports = ExportDir::new(&config.storage.export_dir);
        Self { config, store, frames, manifests, clips, previews, exports }
    }
}

// ──────────────── request types ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct RangeParams {
    after: Option<f64>,
    before: Option<f64>,
    timezone: Option<String>,
}

#[derive(Deserialize)]
pub struct TimezoneParams {
    timezone: Option<String>,
}

#[derive(Deserialize)]
pub struct ClipParams {
    download: Option<String>,
}

#[derive(Deserialize)]
pub struct StreamParams {
    fps: Option<u32>,
}

#[derive(Deserialize)]
pub struct TimelineParams {
    camera: Option<String>,
    source_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct HourlyTimelineParams {
    cameras: Option<String>,
    labels: Option<String>,
    before: Option<f64>,
    after: Option<f64>,
    limit: Option<usize>,
    timezone: Option<String>,
}

// ──────────────── router ──────────────────────────────────────────────────

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Recordings
        .route("/api/{camera}/recordings", get(handle_recordings))
        .route("/api/{camera}/recordings/summary", get(handle_recordings_summary))
        .route("/api/{camera}/recording/hourly/activity", get(handle_hourly_activity))
        .route("/api/{camera}/start/{start}/end/{end}/clip.mp4", get(handle_recording_clip))
        .route("/api/{camera}/start/{start}/end/{end}/preview.gif", get(handle_preview_gif))
        // Live frames
        .route("/api/{camera}/latest.jpg", get(handle_latest_frame))
        .route("/api/{camera}/mjpeg", get(handle_mjpeg))
        // Packager manifests
        .route("/api/vod/{camera}/start/{start}/end/{end}", get(handle_vod_range))
        .route("/api/vod/hour/{year_month}/{day}/{hour}/{camera}", get(handle_vod_hour_utc))
        .route("/api/vod/hour/{year_month}/{day}/{hour}/{camera}/{tz}", get(handle_vod_hour))
        .route("/api/vod/event/{id}", get(handle_vod_event))
        // Previews
        .route("/api/preview/{camera}/start/{start}/end/{end}", get(handle_preview_range))
        .route("/api/preview/hour/{year_month}/{day}/{hour}/{camera}/{tz}", get(handle_preview_hour))
        .route("/api/preview/{camera}/{frame_time}/thumbnail.jpg", get(handle_preview_thumbnail))
        // Events
        .route("/api/events/{id}/clip.mp4", get(handle_event_clip))
        .route("/api/events/{id}/preview.gif", get(handle_event_preview))
        .route("/api/events/{id}/thumbnail.jpg", get(handle_event_thumbnail))
        // Timeline
        .route("/api/timeline", get(handle_timeline))
        .route("/api/timeline/hourly", get(handle_hourly_timeline))
        // Exports
        .route("/api/export/{name}/{new_name}", patch(handle_export_rename))
        .route("/api/export/{name}", delete(handle_export_delete))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until CTRL+C.
pub async fn start_server(state: Arc<AppState>, port: u16) {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!(port, "HTTP API listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Signal error");
        }
        info!("Received CTRL+C, shutting down…");
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(error = %e, "HTTP server error");
    }
}

// ──────────────── helpers ─────────────────────────────────────────────────

fn offset_or_utc(tz: Option<&str>) -> Result<chrono::FixedOffset> {
    parse_utc_offset(tz.unwrap_or("utc"))
}

/// Query flags count as set unless empty, `0` or `false`.
fn flag(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
}

fn image_response(content_type: &'static str, cache_control: &'static str, body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, cache_control)],
        body,
    )
        .into_response()
}

async fn clip_response(artifact: &ClipArtifact, download: bool) -> Result<Response> {
    let body = tokio::fs::read(&artifact.path).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("content-description", HeaderValue::from_static("File Transfer"));
    if download {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", artifact.file_name))
            .map_err(|e| ReplayError::invalid(format!("Invalid clip name: {e}")))?;
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((StatusCode::OK, headers, body).into_response())
}

/// `all`, or a configured camera.
fn require_scope<'a>(state: &AppState, camera: &'a str) -> Result<CameraScope<'a>> {
    let scope = CameraScope::parse(camera);
    if let CameraScope::One(id) = scope {
        state.config.require_camera(id)?;
    }
    Ok(scope)
}

async fn find_event(state: &AppState, id: &str) -> Result<EventRecord> {
    state
        .store
        .event(id)
        .await?
        .ok_or_else(|| ReplayError::not_found("Event not found"))
}

async fn vod_for_window(state: &AppState, camera: &str, window: TimeWindow) -> Result<Manifest> {
    let recordings = state
        .store
        .find(CameraScope::One(camera), window, SegmentKind::Recording)
        .await?;
    state.manifests.build(&recordings, &window, now_epoch())
}

async fn materialize_clip(state: &AppState, camera: &str, window: TimeWindow) -> Result<ClipArtifact> {
    let path = state.clips.artifact_path(camera, &window);
    if tokio::fs::try_exists(&path).await? {
        // Already cached: skip the store lookup entirely.
        return state.clips.materialize(camera, &[], &window).await;
    }
    let recordings = state
        .store
        .find(CameraScope::One(camera), window, SegmentKind::Recording)
        .await?;
    state.clips.materialize(camera, &recordings, &window).await
}

// ──────────────── recording handlers ──────────────────────────────────────

async fn handle_recordings(
    State(state): State<Arc<AppState>>,
    Path(camera): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let now = now_epoch();
    let after = params.after.unwrap_or(now - HOUR_SECS as f64);
    let before = params.before.unwrap_or(now);
    let recordings = state.store.recordings_between(&camera, after, before).await?;
    Ok(Json(recordings).into_response())
}

async fn handle_recordings_summary(
    State(state): State<Arc<AppState>>,
    Path(camera): Path<String>,
    Query(params): Query<TimezoneParams>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let offset = offset_or_utc(params.timezone.as_deref())?;
    let recordings = state.store.recordings_for_camera(&camera).await?;
    let events = state.store.events_with_clips(&camera).await?;
    Ok(Json(summarize_recordings(&recordings, &events, &offset)).into_response())
}

async fn handle_hourly_activity(
    State(state): State<Arc<AppState>>,
    Path(camera): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let now = now_epoch();
    let after = params.after.unwrap_or(now - HOUR_SECS as f64);
    let before = params.before.unwrap_or(now);
    let offset = offset_or_utc(params.timezone.as_deref())?;

    let segments = state.store.activity_segments(&camera, after, before).await?;
    let gaps = state.config.activity.gap_advance;
    let series: BTreeMap<i64, Vec<ActivitySample>> =
        activity_series(&segments, after, minute_modifier(&offset), gaps);
    Ok(Json(series).into_response())
}

async fn handle_recording_clip(
    State(state): State<Arc<AppState>>,
    Path((camera, start, end)): Path<(String, f64, f64)>,
    Query(params): Query<ClipParams>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let window = TimeWindow::new(start, end)?;
    let artifact = materialize_clip(&state, &camera, window).await?;
    clip_response(&artifact, flag(params.download.as_deref())).await
}

async fn handle_preview_gif(
    State(state): State<Arc<AppState>>,
    Path((camera, start, end)): Path<(String, f64, f64)>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let window = TimeWindow::new(start, end)?;
    let gif = state.previews.preview_animation(&camera, window, now_epoch()).await?;
    Ok(image_response("image/gif", "private, max-age=31536000", gif))
}

// ──────────────── live frame handlers ─────────────────────────────────────

async fn handle_latest_frame(
    State(state): State<Arc<AppState>>,
    Path(camera): Path<String>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let frame = state
        .frames
        .current_frame(&camera)
        .await
        .ok_or_else(|| ReplayError::PartialData("Unable to get valid frame".into()))?;
    Ok(image_response("image/jpeg", "no-store", frame))
}

async fn handle_mjpeg(
    State(state): State<Arc<AppState>>,
    Path(camera): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let stream_cfg = &state.config.stream;
    let fps = params.fps.unwrap_or(stream_cfg.default_fps).clamp(1, stream_cfg.max_fps);

    let body = Body::from_stream(mjpeg_stream(state.frames.clone(), camera, fps));
    let content_type = format!("multipart/x-mixed-replace;boundary={MJPEG_BOUNDARY}");
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

// ──────────────── manifest handlers ───────────────────────────────────────

async fn handle_vod_range(
    State(state): State<Arc<AppState>>,
    Path((camera, start, end)): Path<(String, f64, f64)>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let window = TimeWindow::new(start, end)?;
    let manifest = vod_for_window(&state, &camera, window).await?;
    Ok(Json(manifest).into_response())
}

async fn vod_for_hour(
    state: &AppState,
    year_month: &str,
    day: u32,
    hour: u32,
    camera: &str,
    zone: &CallerZone,
) -> Result<Response> {
    state.config.require_camera(camera)?;
    let (start, end) = hour_window(year_month, day, hour, zone)?;
    let manifest = vod_for_window(state, camera, TimeWindow::new(start, end)?).await?;
    Ok(Json(manifest).into_response())
}

async fn handle_vod_hour(
    State(state): State<Arc<AppState>>,
    Path((year_month, day, hour, camera, tz)): Path<(String, u32, u32, String, String)>,
) -> Result<Response> {
    let zone = CallerZone::parse(&tz)?;
    vod_for_hour(&state, &year_month, day, hour, &camera, &zone).await
}

async fn handle_vod_hour_utc(
    State(state): State<Arc<AppState>>,
    Path((year_month, day, hour, camera)): Path<(String, u32, u32, String)>,
) -> Result<Response> {
    let zone = CallerZone::parse("utc")?;
    vod_for_hour(&state, &year_month, day, hour, &camera, &zone).await
}

async fn handle_vod_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let event = find_event(&state, &id).await?;
    if !event.has_clip {
        return Err(ReplayError::not_found("Recordings not available."));
    }

    let clip_path = event_clip_path(&state.config.storage.clips_dir, &event);
    if !tokio::fs::try_exists(&clip_path).await? {
        let window = TimeWindow::open_ended(event.start_time, event.end_time, now_epoch())?;
        let manifest = vod_for_window(&state, &event.camera, window).await?;
        return Ok(Json(manifest).into_response());
    }

    let end = event.end_time.unwrap_or_else(now_epoch);
    let duration_ms = ((end - event.start_time) * 1000.0) as i64;
    let manifest = Manifest::single_file(&clip_path.display().to_string(), duration_ms);
    Ok(Json(manifest).into_response())
}

// ──────────────── preview handlers ────────────────────────────────────────

async fn handle_preview_range(
    State(state): State<Arc<AppState>>,
    Path((camera, start, end)): Path<(String, f64, f64)>,
) -> Result<Response> {
    let scope = require_scope(&state, &camera)?;
    let window = TimeWindow::new(start, end)?;
    let clips = state.previews.preview_clips(scope, window).await?;
    Ok(Json(clips).into_response())
}

async fn handle_preview_hour(
    State(state): State<Arc<AppState>>,
    Path((year_month, day, hour, camera, tz)): Path<(String, u32, u32, String, String)>,
) -> Result<Response> {
    let scope = require_scope(&state, &camera)?;
    let zone = CallerZone::parse(&tz)?;
    let (start, end) = hour_window(&year_month, day, hour, &zone)?;
    let window = TimeWindow::new(start, end)?;
    let clips = state.previews.preview_clips(scope, window).await?;
    Ok(Json(clips).into_response())
}

async fn handle_preview_thumbnail(
    State(state): State<Arc<AppState>>,
    Path((camera, frame_time)): Path<(String, f64)>,
) -> Result<Response> {
    state.config.require_camera(&camera)?;
    let jpg = state.previews.preview_thumbnail(&camera, frame_time).await?;
    Ok(image_response("image/jpeg", "private, max-age=31536000", jpg))
}

// ──────────────── event handlers ──────────────────────────────────────────

async fn handle_event_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ClipParams>,
) -> Result<Response> {
    let event = find_event(&state, &id).await?;
    if !event.has_clip {
        return Err(ReplayError::not_found("Clip not available"));
    }
    let download = flag(params.download.as_deref());

    let clip_path = event_clip_path(&state.config.storage.clips_dir, &event);
    if let Ok(meta) = tokio::fs::metadata(&clip_path).await {
        let artifact = ClipArtifact {
            file_name: format!("{}-{}.mp4", event.camera, event.id),
            path: clip_path,
            size: meta.len(),
            cached: true,
        };
        return clip_response(&artifact, download).await;
    }

    let window = TimeWindow::open_ended(event.start_time, event.end_time, now_epoch())?;
    let artifact = materialize_clip(&state, &event.camera, window).await?;
    clip_response(&artifact, download).await
}

async fn handle_event_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let event = find_event(&state, &id).await?;
    let gif = state.previews.event_preview(&event, now_epoch()).await?;
    Ok(image_response("image/gif", "private, max-age=2592000", gif))
}

async fn handle_event_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Some(event) = state.store.event(&id).await? {
        if let Some(thumbnail) = event.thumbnail {
            let cache = if event.end_time.is_some() { "private, max-age=31536000" } else { "no-store" };
            return Ok(image_response("image/jpeg", cache, Bytes::from(thumbnail)));
        }
    }

    // Still being tracked: ask the live side.
    for camera in &state.config.cameras {
        if let Some(tracked) = state.frames.tracked(&camera.id, &id).await {
            if let Some(thumbnail) = tracked.thumbnail {
                return Ok(image_response("image/jpeg", "no-store", Bytes::from(thumbnail)));
            }
        }
    }

    Err(ReplayError::not_found("Event not found"))
}

// ──────────────── timeline handlers ───────────────────────────────────────

async fn handle_timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimelineParams>,
) -> Result<Response> {
    let filter = FilterBuilder::new()
        .and_maybe(list_param(params.camera.as_deref()).map(Predicate::CameraIn))?
        .and_maybe(params.source_id.map(Predicate::SourceId))?
        .build();
    let limit = params.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT);

    let entries = state.store.timeline(&filter, SortOrder::Ascending, limit).await?;
    Ok(Json(entries).into_response())
}

async fn handle_hourly_timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HourlyTimelineParams>,
) -> Result<Response> {
    let offset = offset_or_utc(params.timezone.as_deref())?;
    let filter = FilterBuilder::new()
        .and_maybe(list_param(params.cameras.as_deref()).map(Predicate::CameraIn))?
        .and_maybe(list_param(params.labels.as_deref()).map(Predicate::LabelIn))?
        .and_maybe(params.before.map(Predicate::Before))?
        .and_maybe(params.after.map(Predicate::After))?
        .build();
    let limit = params.limit.unwrap_or(DEFAULT_HOURLY_LIMIT);

    let entries = state.store.timeline(&filter, SortOrder::Descending, limit).await?;
    Ok(Json(hourly_timeline(entries, minute_modifier(&offset))).into_response())
}

// ──────────────── export handlers ─────────────────────────────────────────

async fn handle_export_rename(
    State(state): State<Arc<AppState>>,
    Path((name, new_name)): Path<(String, String)>,
) -> Result<Response> {
    state.exports.rename(&name, &new_name).await?;
    Ok(Json(serde_json::json!({ "success": true, "message": "Successfully renamed file." })).into_response())
}

async fn handle_export_delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response> {
    state.exports.delete(&name).await?;
    Ok(Json(serde_json::json!({ "success": true, "message": "Successfully deleted file." })).into_response())
}
