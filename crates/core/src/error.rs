//! Error types for relaybox media engines

use thiserror::Error;

/// Result type alias for media engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a [`MediaEngine`](crate::MediaEngine) reports back to the gateway
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The SDP offer was rejected or the peer connection could not be set up
    #[error("{0}")]
    Negotiation(String),

    /// No live session is registered under the given id
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The requested encoding is not published on the session's stream
    #[error("layer {encoding_id} is not available for session {session_id}")]
    UnknownLayer {
        /// Session the switch was requested for
        session_id: String,
        /// Encoding id that was requested
        encoding_id: String,
    },

    /// Engine-internal failure unrelated to the caller's input
    #[error("engine error: {0}")]
    Internal(String),
}
