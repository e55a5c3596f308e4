// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! SQLite segment store.
//!
//! The database is written by the capture and detection pipelines; this
//! module only reads it. Every query opens its own read-only connection on a
//! blocking thread and drops it when the closure returns, so a failed query
//! never leaves a connection checked out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{ReplayError, Result};
use crate::model::{EventRecord, Segment, SegmentKind, TimeWindow, TimelineEntry};
use crate::storage::filter::Filter;
use crate::storage::{CameraScope, SegmentStore, SortOrder};

/// Tables this store reads. Applied by [`init_schema`] for fresh databases.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recordings (
    id          TEXT PRIMARY KEY,
    camera      TEXT NOT NULL,
    path        TEXT NOT NULL,
    start_time  REAL NOT NULL,
    end_time    REAL NOT NULL,
    duration    REAL NOT NULL,
    motion      INTEGER NOT NULL DEFAULT 0,
    objects     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS recordings_camera_start ON recordings (camera, start_time);
CREATE INDEX IF NOT EXISTS recordings_end ON recordings (end_time);

CREATE TABLE IF NOT EXISTS previews (
    id          TEXT PRIMARY KEY,
    camera      TEXT NOT NULL,
    path        TEXT NOT NULL,
    start_time  REAL NOT NULL,
    end_time    REAL NOT NULL,
    duration    REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS previews_camera_start ON previews (camera, start_time);

CREATE TABLE IF NOT EXISTS timeline (
    timestamp   REAL NOT NULL,
    camera      TEXT NOT NULL,
    source      TEXT NOT NULL,
    source_id   TEXT NOT NULL,
    class_type  TEXT NOT NULL,
    data        TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS timeline_timestamp ON timeline (timestamp);

CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    camera      TEXT NOT NULL,
    label       TEXT NOT NULL,
    start_time  REAL NOT NULL,
    end_time    REAL,
    has_clip    INTEGER NOT NULL DEFAULT 1,
    thumbnail   BLOB
);
";

const OVERLAP_CLAUSE: &str = "((start_time BETWEEN ?1 AND ?2) \
     OR (end_time BETWEEN ?1 AND ?2) \
     OR (?1 > start_time AND ?2 < end_time))";

/// Create the tables on a writable connection.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn row_to_segment(row: &Row) -> std::result::Result<Segment, rusqlite::Error> {
    Ok(Segment {
        camera: row.get("camera")?,
        path: row.get("path")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        duration: row.get("duration")?,
        motion: counter(row.get("motion")?),
        objects: counter(row.get("objects")?),
    })
}

/// Stored counters are clamped into `0..=u32::MAX`.
fn counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn row_to_timeline(row: &Row) -> std::result::Result<TimelineEntry, rusqlite::Error> {
    let raw: String = row.get("data")?;
    let timestamp: f64 = row.get("timestamp")?;
    let data = serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(timestamp, error = %e, "Malformed timeline data, treating as empty");
        serde_json::Value::Null
    });
    Ok(TimelineEntry {
        timestamp,
        camera: row.get("camera")?,
        source: row.get("source")?,
        source_id: row.get("source_id")?,
        class_type: row.get("class_type")?,
        data,
    })
}

fn row_to_event(row: &Row) -> std::result::Result<EventRecord, rusqlite::Error> {
    Ok(EventRecord {
        id: row.get("id")?,
        camera: row.get("camera")?,
        label: row.get("label")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        has_clip: row.get::<_, i64>("has_clip")? != 0,
        thumbnail: row.get("thumbnail")?,
    })
}

fn segment_columns(kind: SegmentKind) -> &'static str {
    match kind {
        SegmentKind::Recording => "camera, path, start_time, end_time, duration, motion, objects",
        SegmentKind::Preview => "camera, path, start_time, end_time, duration, 0 AS motion, 0 AS objects",
    }
}

const RECORDING_COLUMNS: &str = "camera, path, start_time, end_time, duration, motion, objects";
const EVENT_COLUMNS: &str = "id, camera, label, start_time, end_time, has_clip, thumbnail";

/// Read-only store over a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), busy_timeout: Duration::from_secs(5) }
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| ReplayError::Store(format!("open {path:?}: {e}")))?;
            conn.busy_timeout(busy)?;
            f(&conn)
        })
        .await
        .map_err(|e| ReplayError::Store(format!("query task failed: {e}")))?
    }

    async fn query_segments(&self, sql: String, args: Vec<Value>) -> Result<Vec<Segment>> {
        self.with_conn(move |conn| {
            debug!(sql = %sql, "segment query");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_segment)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl SegmentStore for SqliteStore {
    async fn find(&self, camera: CameraScope<'_>, window: TimeWindow, kind: SegmentKind) -> Result<Vec<Segment>> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {OVERLAP_CLAUSE}",
            segment_columns(kind),
            kind.table()
        );
        let mut args = vec![Value::Real(window.start), Value::Real(window.end)];
        if let CameraScope::One(id) = camera {
            sql.push_str(" AND camera = ?3");
            args.push(Value::Text(id.to_string()));
        }
        sql.push_str(" ORDER BY start_time ASC");
        self.query_segments(sql, args).await
    }

    async fn recordings_between(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>> {
        let sql = format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings \
             WHERE camera = ?1 AND end_time >= ?2 AND start_time <= ?3 ORDER BY start_time ASC"
        );
        self.query_segments(sql, vec![Value::Text(camera.to_string()), Value::Real(after), Value::Real(before)])
            .await
    }

    async fn activity_segments(&self, camera: &str, after: f64, before: f64) -> Result<Vec<Segment>> {
        let sql = format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings \
             WHERE camera = ?1 AND motion > 0 AND start_time > ?2 AND end_time < ?3 \
             ORDER BY start_time ASC"
        );
        self.query_segments(sql, vec![Value::Text(camera.to_string()), Value::Real(after), Value::Real(before)])
            .await
    }

    async fn recordings_for_camera(&self, camera: &str) -> Result<Vec<Segment>> {
        let sql = format!("SELECT {RECORDING_COLUMNS} FROM recordings WHERE camera = ?1 ORDER BY start_time ASC");
        self.query_segments(sql, vec![Value::Text(camera.to_string())]).await
    }

    async fn timeline(&self, filter: &Filter, order: SortOrder, limit: usize) -> Result<Vec<TimelineEntry>> {
        let mut args = Vec::new();
        let clause = filter.to_sql(&mut args);
        let dir = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let sql = format!(
            "SELECT timestamp, camera, source, source_id, class_type, data FROM timeline \
             WHERE {clause} ORDER BY timestamp {dir} LIMIT {limit}"
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_timeline)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], row_to_event).optional()?)
        })
        .await
    }

    async fn events_with_clips(&self, camera: &str) -> Result<Vec<EventRecord>> {
        let camera = camera.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE camera = ?1 AND has_clip != 0 ORDER BY start_time ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![camera], row_to_event)?;
            Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
        })
        .await
    }
}
