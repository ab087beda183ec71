//! Streamer credential store
//!
//! A credential authorizes a streamer to publish on any of its stream keys
//! when the caller also presents the streamer's auth token. Credentials are
//! created and revoked outside of relaybox; this crate only reads them, and
//! every call goes to the backing store so revocation applies on the next
//! request.
//!
//! Two adapters implement [`CredentialStore`]:
//! - [`PgCredentialStore`] - the `streamers` table in Postgres, over a bounded pool
//! - [`MemoryCredentialStore`] - a static list, for development and tests

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryCredentialStore;
pub use postgres::{PgCredentialStore, PgStoreConfig};

/// Result type for credential store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// A streamer record as held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Display name
    pub name: String,
    /// Stream keys this streamer may publish on
    pub stream_keys: Vec<String>,
    /// Secret presented alongside a stream key when publishing
    pub auth_token: String,
}

/// An authorized publisher: the credential's name and the stream key it matched on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Streamer {
    pub name: String,
    pub stream_key: String,
}

/// Read-only access to streamer credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the streamer owning `stream_key` whose auth token is exactly `auth_token`
    ///
    /// Returns `Ok(None)` when no credential matches. A failure to reach the
    /// store is an `Err`, never `Ok(None)`.
    async fn find_streamer(&self, stream_key: &str, auth_token: &str) -> Result<Option<Streamer>>;

    /// Distinct stream keys across all credentials, sorted
    async fn stream_keys(&self) -> Result<Vec<String>>;

    /// Release pooled resources. Called once on shutdown.
    async fn close(&self) {}
}

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No connection could be acquired (pool exhausted, database unreachable)
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    /// The query itself failed
    #[error("credential query failed: {0}")]
    Query(String),

    /// More than one credential claims the same stream key
    #[error("stream key {0} is assigned to more than one streamer")]
    DuplicateStreamKey(String),
}

impl StoreError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
