//! Error types for the WebRTC media engine

/// Result type alias using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in WebRTC engine operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebRTC stack error (API setup, peer connection, tracks)
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Requested simulcast layer is not published
    #[error("Layer {encoding_id} is not available for session {session_id}")]
    UnknownLayer {
        session_id: String,
        encoding_id: String,
    },

    /// ICE did not reach a connected state
    #[error("ICE connection failed: {0}")]
    IceFailed(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),
}

impl From<Error> for relaybox_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::SdpError(msg) => relaybox_core::Error::Negotiation(msg),
            Error::SessionNotFound(id) => relaybox_core::Error::SessionNotFound(id),
            Error::UnknownLayer {
                session_id,
                encoding_id,
            } => relaybox_core::Error::UnknownLayer {
                session_id,
                encoding_id,
            },
            other => relaybox_core::Error::Internal(other.to_string()),
        }
    }
}
