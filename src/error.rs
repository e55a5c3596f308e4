// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::transcode::ToolError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Segment store error: {0}")]
    Store(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Camera '{id}' not found")]
    CameraNotFound { id: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("External tool failed: {0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    PartialData(String),
}

impl ReplayError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ReplayError::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ReplayError::InvalidRequest(msg.into())
    }

    /// HTTP status a client sees for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ReplayError::NotFound(_) | ReplayError::CameraNotFound { .. } => StatusCode::NOT_FOUND,
            ReplayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ReplayError::Config(_)
            | ReplayError::Io(_)
            | ReplayError::Store(_)
            | ReplayError::Tool(_)
            | ReplayError::PartialData(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for ReplayError {
    fn from(e: rusqlite::Error) -> Self {
        ReplayError::Store(e.to_string())
    }
}

impl IntoResponse for ReplayError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Tool diagnostics stay in the log; clients get a stable message.
        let message = match &self {
            ReplayError::Tool(_) => "Could not create media from recordings".to_string(),
            other => other.to_string(),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ReplayError>;
