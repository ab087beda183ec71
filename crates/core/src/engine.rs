//! Media engine capability interface
//!
//! The gateway never touches peer connections, ICE or RTP directly. It
//! authorizes requests and then delegates to a [`MediaEngine`], which owns the
//! session registry: it mints session ids at answer time and is the only
//! place live session state exists.
//!
//! # Example
//!
//! ```ignore
//! use relaybox_core::{EgressAnswer, MediaEngine, Result};
//!
//! let answer: EgressAnswer = engine.negotiate_egress(offer, "studio").await?;
//! let layers = engine.layers(&answer.session_id).await?;
//! ```

use async_trait::async_trait;

use crate::layer::SimulcastLayer;
use crate::status::StreamStatus;
use crate::Result;

/// Result of a successful WHEP negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressAnswer {
    /// SDP answer for the viewer
    pub sdp: String,
    /// Engine-assigned id of the new egress session
    pub session_id: String,
}

/// Session negotiation and simulcast control, implemented by a media engine
///
/// # Thread Safety
///
/// Implementations are shared across every request task, so any internal
/// synchronization of the session registry is the engine's concern.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Accept a publisher's SDP offer for `stream_key` and return the SDP answer
    ///
    /// # Errors
    ///
    /// * `Error::Negotiation` - the offer could not be applied
    async fn negotiate_ingest(&self, offer: String, stream_key: &str) -> Result<String>;

    /// Accept a viewer's SDP offer for `stream_key`
    ///
    /// Creates a new egress session and returns its id with the SDP answer.
    async fn negotiate_egress(&self, offer: String, stream_key: &str) -> Result<EgressAnswer>;

    /// Simulcast layers currently available to an egress session
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - no live session has this id
    async fn layers(&self, session_id: &str) -> Result<Vec<SimulcastLayer>>;

    /// Switch an egress session to the encoding `encoding_id`
    ///
    /// # Errors
    ///
    /// * `Error::SessionNotFound` - no live session has this id
    /// * `Error::UnknownLayer` - the stream does not publish that encoding
    async fn set_layer(&self, session_id: &str, encoding_id: &str) -> Result<()>;

    /// Status of one stream, `None` when the engine holds no state for it
    async fn status(&self, stream_key: &str) -> Option<StreamStatus>;

    /// Status of every stream the engine currently holds state for
    async fn statuses(&self) -> Vec<StreamStatus>;
}
