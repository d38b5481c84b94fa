//! Relay endpoints: ingest, status, and fetch.
//!
//! Each handler is one synchronous pass over the store. Bodies are typed at
//! the boundary; anything that does not match is rejected before the store
//! sees it.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::Method;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::error::ApiError;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

/// `POST /api/stream` body.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub stream_id: String,
    pub frame: serde_json::Value,
    /// Kept loose so a malformed timestamp falls back to server time instead of rejecting.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

impl IngestRequest {
    /// Client timestamp when present and an integer.
    #[must_use]
    pub fn client_timestamp(&self) -> Option<i64> {
        self.timestamp.as_ref().and_then(serde_json::Value::as_i64)
    }
}

#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub stream_active: bool,
    pub server_time: i64,
    pub last_frame_time: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub status: &'static str,
    pub frame: serde_json::Value,
    pub timestamp: i64,
    pub stream_id: String,
}

/// Parse and validate an ingest body.
///
/// # Errors
///
/// Returns [`ApiError::InvalidData`] when the body is not a JSON object, or
/// when `stream_id` or `frame` is missing or null.
pub(crate) fn parse_ingest(body: &[u8]) -> Result<IngestRequest, ApiError> {
    let req: IngestRequest = serde_json::from_slice(body).map_err(|_| ApiError::InvalidData)?;
    if req.frame.is_null() {
        return Err(ApiError::InvalidData);
    }
    Ok(req)
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/stream`: replace the current frame.
///
/// An unreadable body (over the size limit, or a broken stream) is invalid
/// data, not a transport error.
pub async fn ingest(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<IngestAck>, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }

    let body = body.map_err(|e| {
        warn!(error = %e, "ingest body rejected");
        ApiError::InvalidData
    })?;
    let req = parse_ingest(&body)?;
    let client_timestamp = req.client_timestamp();

    let record = state
        .store
        .put(req.stream_id, req.frame, client_timestamp)
        .inspect_err(|e| error!(error = %e, "frame write failed"))?;

    info!(
        stream_id = %record.stream_id,
        timestamp = record.client_timestamp,
        server_time = record.server_receive_time,
        "frame received"
    );
    Ok(Json(IngestAck { status: "success", message: "Frame received" }))
}

/// `GET /api/status`: liveness plus whether a fresh frame exists.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let now = state.store.now();
    let fresh = state.store.get_fresh_at(now);
    Json(StatusResponse {
        status: "online",
        stream_active: fresh.is_some(),
        server_time: now,
        last_frame_time: fresh.map(|r| r.client_timestamp),
    })
}

/// `GET /api/get_frame`: the current frame, or 404 when idle.
pub async fn get_frame(State(state): State<AppState>) -> Result<Json<FrameResponse>, ApiError> {
    let record = state.store.get_fresh().ok_or(ApiError::NoActiveStream)?;
    Ok(Json(FrameResponse {
        status: "success",
        frame: record.frame,
        timestamp: record.client_timestamp,
        stream_id: record.stream_id,
    }))
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
