//! Postgres-backed credential store
//!
//! Expects a `streamers` table with a `name` column, a `stream_key text[]`
//! column and an `auth_token` column.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{CredentialStore, Result, StoreError, Streamer};

const LOOKUP_STREAMER: &str = "SELECT name FROM streamers \
     WHERE $1 = ANY(stream_key) \
     AND auth_token = $2 \
     LIMIT 2";

const LIST_STREAM_KEYS: &str = "SELECT DISTINCT unnest(stream_key) AS stream_key \
     FROM streamers \
     ORDER BY stream_key";

/// Connection settings for [`PgCredentialStore`]
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// `postgres://` connection URL
    pub url: String,
    pub max_connections: u32,
    /// How long a request waits for a pooled connection before giving up
    pub acquire_timeout: Duration,
}

impl PgStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Credential store over a bounded Postgres connection pool
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Build the pool. Connections are opened on first use, so an unreachable
    /// database shows up as [`StoreError::Unavailable`] on requests rather
    /// than at startup.
    pub fn connect_lazy(config: &PgStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.url)
            .map_err(map_sqlx_error)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_streamer(&self, stream_key: &str, auth_token: &str) -> Result<Option<Streamer>> {
        let names: Vec<String> = sqlx::query_scalar(LOOKUP_STREAMER)
            .bind(stream_key)
            .bind(auth_token)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match names.as_slice() {
            [] => Ok(None),
            [name] => Ok(Some(Streamer {
                name: name.clone(),
                stream_key: stream_key.to_string(),
            })),
            _ => Err(StoreError::DuplicateStreamKey(stream_key.to_string())),
        }
    }

    async fn stream_keys(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(LIST_STREAM_KEYS)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn close(&self) {
        tracing::info!("Closing credential store pool");
        self.pool.close().await;
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(map_sqlx_error(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn test_query_errors_are_not_transient() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Query(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_malformed_url() {
        let config = PgStoreConfig::new("not a url");
        assert!(PgCredentialStore::connect_lazy(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_lazy_does_not_touch_the_database() {
        let config = PgStoreConfig::new("postgres://relaybox@127.0.0.1:1/relaybox");
        assert!(PgCredentialStore::connect_lazy(&config).is_ok());
    }
}
