//! WHEP egress endpoint

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::header::{CONTENT_TYPE, LINK, LOCATION},
    http::{HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
};

use super::{read_sdp, AppState, SDP_CONTENT_TYPE};
use crate::auth;
use crate::error::ApiError;

pub const WHEP_LOCATION: &str = "/api/whep";

pub const SSE_REL: &str = "urn:ietf:params:whep:ext:core:server-sent-events";
pub const LAYER_REL: &str = "urn:ietf:params:whep:ext:core:layer";

/// Prefix that session sub-resources hang off: the request path minus `whep`
pub fn link_base(path: &str) -> &str {
    path.strip_suffix("whep").unwrap_or(path)
}

/// `Link` header values advertising a session's SSE and layer endpoints
pub fn session_links(base: &str, session_id: &str) -> [String; 2] {
    [
        format!(
            r#"<{}sse/{}>; rel="{}"; events="layers""#,
            base, session_id, SSE_REL
        ),
        format!(r#"<{}layer/{}>; rel="{}""#, base, session_id, LAYER_REL),
    ]
}

/// Subscribe to a stream
///
/// POST /api/whep
pub async fn subscribe(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let stream_key = auth::view_stream_key(&headers)?;
    let offer = read_sdp(body).await?;

    let answer = state.engine.negotiate_egress(offer, &stream_key).await?;

    tracing::info!(
        stream_key = %stream_key,
        session_id = %answer.session_id,
        "WHEP subscribe negotiated"
    );

    let [sse_link, layer_link] = session_links(link_base(uri.path()), &answer.session_id);

    Ok((
        StatusCode::CREATED,
        [(LOCATION, WHEP_LOCATION), (CONTENT_TYPE, SDP_CONTENT_TYPE)],
        AppendHeaders([(LINK, sse_link), (LINK, layer_link)]),
        answer.sdp,
    )
        .into_response())
}
