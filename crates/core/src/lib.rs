//! Relaybox core
//!
//! Transport-agnostic building blocks shared by the gateway, the credential
//! store and the WebRTC media engine:
//!
//! - [`stream_key`] - the stream key grammar used for addressing broadcasts
//! - [`engine`] - the [`MediaEngine`] capability trait the gateway negotiates through
//! - [`layer`] - simulcast layer descriptors
//! - [`status`] - per-stream status snapshots
//!
//! The gateway only ever talks to a media engine through [`MediaEngine`], so
//! handlers can be exercised against a fake engine in tests and the WebRTC
//! engine can evolve independently.

pub mod engine;
pub mod error;
pub mod layer;
pub mod status;
pub mod stream_key;

pub use engine::{EgressAnswer, MediaEngine};
pub use error::{Error, Result};
pub use layer::SimulcastLayer;
pub use status::{StreamStatus, VideoStreamStatus, WhepSessionStatus};
pub use stream_key::validate_stream_key;
