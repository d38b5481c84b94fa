//! Handler-boundary errors rendered as `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid data")]
    InvalidData,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Failed to save frame")]
    SaveFailed(#[source] StoreError),
    #[error("No active stream")]
    NoActiveStream,
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidData => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::SaveFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoActiveStream => StatusCode::NOT_FOUND,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::SaveFailed(err)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
