//! Simulcast layer discovery and switching for WHEP sessions

use axum::{
    body::Body,
    extract::{Path, State},
    http::header::CONNECTION,
    http::{HeaderName, StatusCode},
    response::sse::{Event, Sse},
    response::AppendHeaders,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;

use super::{read_body, AppState};
use crate::error::ApiError;

/// Request body for a layer switch
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRequest {
    pub media_id: String,
    pub encoding_id: String,
}

/// Available layers as a single `layers` event
///
/// GET /api/sse/:session_id
///
/// `Sse` sets the content type and `Cache-Control: no-cache`. The
/// `Connection` header is dropped by hyper on HTTP/2.
pub async fn layer_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<
    (
        AppendHeaders<[(HeaderName, &'static str); 1]>,
        Sse<impl Stream<Item = Result<Event, Infallible>>>,
    ),
    ApiError,
> {
    let layers = state.engine.layers(&session_id).await?;

    let event = Event::default()
        .event("layers")
        .json_data(&layers)
        .map_err(|e| ApiError::Engine(e.to_string()))?;

    Ok((
        AppendHeaders([(CONNECTION, "keep-alive")]),
        Sse::new(stream::once(async move { Ok(event) })),
    ))
}

/// Switch the session to another encoding
///
/// POST /api/layer/:session_id
pub async fn switch_layer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let bytes = read_body(body).await?;
    let request: LayerRequest =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;

    state
        .engine
        .set_layer(&session_id, &request.encoding_id)
        .await?;

    tracing::info!(
        session_id = %session_id,
        media_id = %request.media_id,
        encoding_id = %request.encoding_id,
        "Layer switched"
    );

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_request_requires_both_fields() {
        let request: LayerRequest =
            serde_json::from_str(r#"{"mediaId":"1","encodingId":"h"}"#).unwrap();
        assert_eq!(request.encoding_id, "h");

        assert!(serde_json::from_str::<LayerRequest>(r#"{"mediaId":"1"}"#).is_err());
    }
}
