//! Per-stream status snapshots reported by a media engine

use serde::{Deserialize, Serialize};

/// Point-in-time view of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub stream_key: String,

    /// Unix time (seconds) the engine first saw this stream
    pub first_seen_epoch: u64,

    pub audio_packets_received: u64,

    /// Video encodings currently published
    pub video_streams: Vec<VideoStreamStatus>,

    /// Viewers attached to the stream
    pub whep_sessions: Vec<WhepSessionStatus>,
}

impl StreamStatus {
    /// Status for a registered stream the engine has no live state for
    pub fn idle(stream_key: impl Into<String>) -> Self {
        Self {
            stream_key: stream_key.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamStatus {
    pub rid: String,
    pub packets_received: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhepSessionStatus {
    pub id: String,
    pub current_layer: String,
    pub packets_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status_serialization() {
        let json = serde_json::to_value(StreamStatus::idle("studio")).unwrap();
        assert_eq!(json["streamKey"], "studio");
        assert_eq!(json["firstSeenEpoch"], 0);
        assert_eq!(json["videoStreams"], serde_json::json!([]));
        assert_eq!(json["whepSessions"], serde_json::json!([]));
    }
}
