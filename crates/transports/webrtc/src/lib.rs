//! WebRTC media engine for relaybox
//!
//! Implements [`relaybox_core::MediaEngine`] on top of the `webrtc` crate so
//! the gateway can hand WHIP and WHEP offers to a real peer connection stack.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  WHIP publisher (OBS, browser)                             │
//! │  ↓ RTP, one track per simulcast encoding (RID)             │
//! │  Stream (per stream key)                                   │
//! │  ├─ video layers (rid, ssrc, packet counters)              │
//! │  ├─ broadcast: video packets tagged with their rid         │
//! │  └─ broadcast: audio packets                               │
//! │     ↓ fan-out, filtered by each viewer's current layer     │
//! │  WhepSession (per viewer, keyed by session id)             │
//! │  └─ TrackLocalStaticRTP video + audio                      │
//! │     ↓                                                      │
//! │  WHEP viewer                                               │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions and streams live in a [`Registry`](registry::Registry) owned by
//! [`WebRtcEngine`]; peer connection state changes remove them again.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod probe;

mod egress;
mod engine;
mod registry;
mod rtc;
mod stream;

pub use config::EngineConfig;
pub use engine::WebRtcEngine;
pub use error::{Error, Result};
pub use probe::ProbeClient;
