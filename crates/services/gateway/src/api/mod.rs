//! HTTP API for the relaybox gateway
//!
//! - `POST /api/whip` - publish (WHIP), `DELETE` is accepted as a no-op
//! - `POST /api/whep` - subscribe (WHEP)
//! - `GET /api/sse/:session_id` - one `layers` server-sent event
//! - `POST /api/layer/:session_id` - switch simulcast layer
//! - `GET /api/streams` - known stream keys
//! - `GET /api/status`, `GET /api/status/:stream_key` - engine status
//! - `GET /health`
//!
//! Every route answers CORS preflights with wildcard headers.

pub mod layers;
pub mod status;
pub mod whep;
pub mod whip;

use axum::{
    body::{Body, Bytes},
    http::header::{ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_TYPE, LOCATION},
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use relaybox_core::MediaEngine;
use relaybox_credential_store::CredentialStore;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ApiError;

/// Upper bound for request bodies (SDP offers, layer requests)
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Streamer credentials for WHIP authorization and stream enumeration
    pub store: Arc<dyn CredentialStore>,
    /// Media engine owning every negotiated session
    pub engine: Arc<dyn MediaEngine>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        engine: Arc<dyn MediaEngine>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let mut router = Router::new()
        .route("/api/whip", post(whip::publish).delete(whip::unpublish))
        .route("/api/whep", post(whep::subscribe))
        .route("/api/sse/:session_id", get(layers::layer_events))
        .route("/api/layer/:session_id", post(layers::switch_layer))
        .route("/api/streams", get(status::list_streams));

    if !state.config.api.disable_status {
        router = router
            .route("/api/status", get(status::all_statuses))
            .route("/api/status/:stream_key", get(status::stream_status));
    }

    router
        .route("/health", get(health_check))
        .layer(cors)
        .layer(middleware::map_response(expose_headers_on_preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `CorsLayer` answers preflights without `Access-Control-Expose-Headers`
async fn expose_headers_on_preflight(method: Method, mut response: Response) -> Response {
    if method == Method::OPTIONS {
        response
            .headers_mut()
            .entry(ACCESS_CONTROL_EXPOSE_HEADERS)
            .or_insert(HeaderValue::from_static("*"));
    }
    response
}

async fn health_check() -> &'static str {
    "OK"
}

/// Read the whole request body
pub(crate) async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BodyRead(e.to_string()))
}

/// Read the request body as an SDP offer
pub(crate) async fn read_sdp(body: Body) -> Result<String, ApiError> {
    let bytes = read_body(body).await?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::BodyRead("SDP offer is not valid UTF-8".to_string()))
}

/// `201 Created` with an SDP answer body
pub(crate) fn sdp_created(location: &'static str, answer: String) -> Response {
    (
        StatusCode::CREATED,
        [(LOCATION, location), (CONTENT_TYPE, SDP_CONTENT_TYPE)],
        answer,
    )
        .into_response()
}
