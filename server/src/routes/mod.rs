//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Three relay endpoints plus a discovery fallback for every other path.
//! Methods are checked inside the handlers rather than by the router so
//! that a wrong method gets the relay's JSON error body instead of axum's
//! empty 405.
//!
//! Every response carries permissive CORS headers and a JSON content type.
//! `OPTIONS` on any path is answered by the CORS layer with an empty 200 and
//! never reaches a handler.

pub mod error;
pub mod stream;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::any;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

/// Relay routes with CORS, preflight short-circuit, and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/stream", any(stream::ingest))
        .route("/api/status", any(stream::status))
        .route("/api/get_frame", any(stream::get_frame))
        .fallback(discovery)
        .layer(cors)
        .layer(middleware::from_fn(relay_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Stamp the relay's fixed headers on every response, preflights included.
/// The CORS layer only sends allow-methods/allow-headers on `OPTIONS`.
async fn relay_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    response
}

// =============================================================================
// DISCOVERY
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Endpoints {
    #[serde(rename = "POST /api/stream")]
    pub stream: &'static str,
    #[serde(rename = "GET /api/status")]
    pub status: &'static str,
    #[serde(rename = "GET /api/get_frame")]
    pub get_frame: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub message: &'static str,
    pub endpoints: Endpoints,
    pub server_time: i64,
}

/// Fallback for unknown paths: list the endpoints. Never touches the slot.
async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        message: "Live Stream Server API",
        endpoints: Endpoints {
            stream: "Receive stream data from the sender",
            status: "Check server and stream status",
            get_frame: "Get latest frame for readers",
        },
        server_time: state.store.now(),
    })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
