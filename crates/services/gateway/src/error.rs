//! HTTP error type for the gateway API
//!
//! Every handler failure becomes an [`ApiError`]. The response carries the
//! status code for the failure class and a JSON body:
//!
//! ```json
//! {"error": "unauthorized", "message": "Not an authorized streamer"}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relaybox_credential_store::StoreError;
use serde::Serialize;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authorization was not set")]
    AuthMissing,

    #[error("Not a valid token: {0}")]
    AuthMalformed(String),

    #[error("Not an authorized streamer")]
    Unauthorized,

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Invalid request body: {0}")]
    Decode(String),

    #[error("Invalid stream key format")]
    InvalidStreamKey,

    /// Engine negotiation failure; the engine's text is passed through as is
    #[error("{0}")]
    Negotiation(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("{0}")]
    UnknownLayer(String),

    #[error("{0}")]
    Engine(String),

    #[error("Stream {0} not found")]
    StreamNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthMissing
            | ApiError::AuthMalformed(_)
            | ApiError::BodyRead(_)
            | ApiError::Decode(_)
            | ApiError::InvalidStreamKey
            | ApiError::Negotiation(_)
            | ApiError::SessionNotFound(_)
            | ApiError::UnknownLayer(_)
            | ApiError::Engine(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::StreamNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthMissing => "auth_missing",
            ApiError::AuthMalformed(_) => "auth_malformed",
            ApiError::Unauthorized => "unauthorized",
            ApiError::BodyRead(_) => "body_read",
            ApiError::Decode(_) => "decode",
            ApiError::InvalidStreamKey => "invalid_stream_key",
            ApiError::Negotiation(_) => "negotiation_failed",
            ApiError::SessionNotFound(_) => "session_not_found",
            ApiError::UnknownLayer(_) => "unknown_layer",
            ApiError::Engine(_) => "engine_error",
            ApiError::StreamNotFound(_) => "stream_not_found",
            ApiError::Store(e) if e.is_transient() => "store_unavailable",
            ApiError::Store(_) => "store_error",
        }
    }
}

impl From<relaybox_core::Error> for ApiError {
    fn from(e: relaybox_core::Error) -> Self {
        match e {
            relaybox_core::Error::Negotiation(msg) => ApiError::Negotiation(msg),
            relaybox_core::Error::SessionNotFound(id) => ApiError::SessionNotFound(id),
            e @ relaybox_core::Error::UnknownLayer { .. } => ApiError::UnknownLayer(e.to_string()),
            relaybox_core::Error::Internal(msg) => ApiError::Engine(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", message);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", message);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.code().to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::AuthMissing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::StreamNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Store(StoreError::Unavailable("timeout".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Store(StoreError::DuplicateStreamKey("k".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_negotiation_message_is_verbatim() {
        let err: ApiError = relaybox_core::Error::Negotiation("bad m-line".into()).into();
        assert_eq!(err.to_string(), "bad m-line");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_engine_errors_map_to_bad_request() {
        let err: ApiError = relaybox_core::Error::UnknownLayer {
            session_id: "s".into(),
            encoding_id: "h".into(),
        }
        .into();
        assert_eq!(err.code(), "unknown_layer");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = relaybox_core::Error::SessionNotFound("s".into()).into();
        assert_eq!(err.code(), "session_not_found");
    }
}
