//! relaybox gateway
//!
//! WHIP/WHEP signaling gateway for a WebRTC broadcast relay. Publishers and
//! viewers exchange SDP over HTTP; the gateway authorizes them against the
//! credential store and hands the offers to the media engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         relaybox-gateway                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐                                            │
//! │  │  HTTP API (axum) │ ← POST /api/whip   (Bearer key;token)      │
//! │  │  CORS + tracing  │ ← POST /api/whep   (Bearer key)            │
//! │  └───┬──────────┬───┘ ← GET  /api/sse/:id, POST /api/layer/:id   │
//! │      │          │                                                │
//! │      ▼          ▼                                                │
//! │  ┌─────────┐  ┌───────────────────────────┐                      │
//! │  │  auth   │  │  MediaEngine (WebRtcEngine)│ owns all sessions   │
//! │  └────┬────┘  └───────────────────────────┘                      │
//! │       ▼                                                          │
//! │  ┌────────────────────────────┐                                  │
//! │  │ CredentialStore (Pg / mem) │                                  │
//! │  └────────────────────────────┘                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod redirect;
pub mod selftest;
pub mod server;

pub use api::{build_router, AppState};
pub use config::Config;
pub use error::ApiError;
