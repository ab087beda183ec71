//! Live streams and WHEP sessions held by an engine

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relaybox_core::StreamStatus;
use tracing::debug;

use crate::egress::WhepSession;
use crate::stream::Stream;

#[derive(Default)]
pub(crate) struct Registry {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
    sessions: RwLock<HashMap<String, Arc<WhepSession>>>,
}

impl Registry {
    pub fn stream(&self, key: &str) -> Option<Arc<Stream>> {
        self.streams.read().get(key).cloned()
    }

    pub fn stream_or_create(&self, key: &str) -> Arc<Stream> {
        if let Some(stream) = self.stream(key) {
            return stream;
        }
        let mut streams = self.streams.write();
        Arc::clone(
            streams
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Stream::new(key))),
        )
    }

    pub fn session(&self, id: &str) -> Option<Arc<WhepSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn insert_session(&self, session: Arc<WhepSession>) {
        self.sessions.write().insert(session.id.clone(), session);
    }

    pub fn remove_session(&self, id: &str) -> Option<Arc<WhepSession>> {
        self.sessions.write().remove(id)
    }

    fn sessions_for(&self, key: &str) -> Vec<Arc<WhepSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.stream_key == key)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Drop a stream once it has neither a publisher nor viewers
    pub fn prune(&self, key: &str) {
        let has_viewers = self.sessions.read().values().any(|s| s.stream_key == key);
        if has_viewers {
            return;
        }

        let mut streams = self.streams.write();
        if streams.get(key).is_some_and(|s| !s.has_publisher()) {
            streams.remove(key);
            debug!("Pruned idle stream {}", key);
        }
    }

    pub fn status(&self, key: &str) -> Option<StreamStatus> {
        let stream = self.stream(key)?;
        Some(self.build_status(&stream))
    }

    pub fn statuses(&self) -> Vec<StreamStatus> {
        let mut streams: Vec<_> = self.streams.read().values().cloned().collect();
        streams.sort_by(|a, b| a.key.cmp(&b.key));
        streams.iter().map(|s| self.build_status(s)).collect()
    }

    fn build_status(&self, stream: &Stream) -> StreamStatus {
        StreamStatus {
            stream_key: stream.key.clone(),
            first_seen_epoch: stream.first_seen_epoch,
            audio_packets_received: stream
                .audio_packets_received
                .load(std::sync::atomic::Ordering::Relaxed),
            video_streams: stream.video_statuses(),
            whep_sessions: self
                .sessions_for(&stream.key)
                .iter()
                .map(|s| s.status())
                .collect(),
        }
    }

    /// Remove everything, handing back what was held so it can be closed
    pub fn drain(&self) -> (Vec<Arc<Stream>>, Vec<Arc<WhepSession>>) {
        let streams = self.streams.write().drain().map(|(_, s)| s).collect();
        let sessions = self.sessions.write().drain().map(|(_, s)| s).collect();
        (streams, sessions)
    }
}
