//! In-memory credential store

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{Credential, CredentialStore, Result, StoreError, Streamer};

/// Credential store holding a fixed set of streamers in process memory
///
/// Applies the same matching rules as the Postgres adapter: the stream key
/// must be one of the credential's keys and the auth token must match
/// exactly.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<Vec<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Add a credential
    pub fn insert(&self, credential: Credential) {
        self.credentials.write().push(credential);
    }

    /// Remove every credential named `name`, returning how many were removed
    pub fn revoke(&self, name: &str) -> usize {
        let mut credentials = self.credentials.write();
        let before = credentials.len();
        credentials.retain(|c| c.name != name);
        before - credentials.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_streamer(&self, stream_key: &str, auth_token: &str) -> Result<Option<Streamer>> {
        let credentials = self.credentials.read();
        let mut matches = credentials
            .iter()
            .filter(|c| c.auth_token == auth_token && c.stream_keys.iter().any(|k| k == stream_key));

        let Some(found) = matches.next() else {
            return Ok(None);
        };
        if matches.next().is_some() {
            return Err(StoreError::DuplicateStreamKey(stream_key.to_string()));
        }

        Ok(Some(Streamer {
            name: found.name.clone(),
            stream_key: stream_key.to_string(),
        }))
    }

    async fn stream_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .credentials
            .read()
            .iter()
            .flat_map(|c| c.stream_keys.iter().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
