//! WHIP ingest endpoint

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};

use super::{read_sdp, sdp_created, AppState};
use crate::auth;
use crate::error::ApiError;

pub const WHIP_LOCATION: &str = "/api/whip";

/// Publish a stream
///
/// POST /api/whip
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let streamer = auth::authorize_publisher(state.store.as_ref(), &headers).await?;
    let offer = read_sdp(body).await?;

    let answer = state
        .engine
        .negotiate_ingest(offer, &streamer.stream_key)
        .await?;

    tracing::info!(
        stream_key = %streamer.stream_key,
        streamer = %streamer.name,
        "WHIP publish negotiated"
    );

    Ok(sdp_created(WHIP_LOCATION, answer))
}

/// Session teardown is owned by the media engine, so this only acknowledges
///
/// DELETE /api/whip
pub async fn unpublish() -> StatusCode {
    StatusCode::OK
}
