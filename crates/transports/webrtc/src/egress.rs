//! WHEP viewer sessions and RTP continuity across layer switches

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relaybox_core::WhepSessionStatus;
use tokio_util::sync::CancellationToken;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::header::Header;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

/// Timestamp advance inserted at a layer switch (one 30 fps frame at 90 kHz)
const SWITCH_TIMESTAMP_GAP: u32 = 3000;

/// Keeps outgoing sequence numbers and timestamps continuous when the
/// source encoding changes underneath a viewer
#[derive(Debug, Default)]
pub(crate) struct PacketRewriter {
    seq_offset: u16,
    ts_offset: u32,
    last: Option<(u16, u32)>,
    resync_pending: bool,
}

impl PacketRewriter {
    /// Re-anchor offsets on the next packet
    pub fn resync(&mut self) {
        self.resync_pending = true;
    }

    pub fn rewrite(&mut self, header: &mut Header) {
        if self.resync_pending {
            if let Some((last_seq, last_ts)) = self.last {
                self.seq_offset = last_seq.wrapping_add(1).wrapping_sub(header.sequence_number);
                self.ts_offset = last_ts
                    .wrapping_add(SWITCH_TIMESTAMP_GAP)
                    .wrapping_sub(header.timestamp);
            }
            self.resync_pending = false;
        }

        header.sequence_number = header.sequence_number.wrapping_add(self.seq_offset);
        header.timestamp = header.timestamp.wrapping_add(self.ts_offset);
        self.last = Some((header.sequence_number, header.timestamp));
    }
}

/// A WHEP viewer attached to one stream
pub(crate) struct WhepSession {
    pub id: String,
    pub stream_key: String,
    pub pc: Arc<RTCPeerConnection>,
    pub video_track: Arc<TrackLocalStaticRTP>,
    pub audio_track: Arc<TrackLocalStaticRTP>,
    pub cancel: CancellationToken,
    current_layer: Mutex<Option<String>>,
    rewriter: Mutex<PacketRewriter>,
    packets_written: AtomicU64,
}

impl WhepSession {
    pub fn new(
        stream_key: impl Into<String>,
        pc: Arc<RTCPeerConnection>,
        video_track: Arc<TrackLocalStaticRTP>,
        audio_track: Arc<TrackLocalStaticRTP>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stream_key: stream_key.into(),
            pc,
            video_track,
            audio_track,
            cancel: CancellationToken::new(),
            current_layer: Mutex::new(None),
            rewriter: Mutex::new(PacketRewriter::default()),
            packets_written: AtomicU64::new(0),
        }
    }

    /// Whether a video packet from encoding `rid` should go to this viewer
    ///
    /// A viewer with no layer selected adopts the first encoding it sees.
    pub fn accepts(&self, rid: &str) -> bool {
        let mut current = self.current_layer.lock();
        match current.as_deref() {
            Some(layer) => layer == rid,
            None => {
                *current = Some(rid.to_string());
                true
            }
        }
    }

    pub fn current_layer(&self) -> Option<String> {
        self.current_layer.lock().clone()
    }

    /// Switch to `rid`; returns false when it was already selected
    pub fn switch_layer(&self, rid: &str) -> bool {
        let mut current = self.current_layer.lock();
        if current.as_deref() == Some(rid) {
            return false;
        }
        *current = Some(rid.to_string());
        self.rewriter.lock().resync();
        true
    }

    pub fn rewrite(&self, header: &mut Header) {
        self.rewriter.lock().rewrite(header);
    }

    pub fn record_written(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> WhepSessionStatus {
        WhepSessionStatus {
            id: self.id.clone(),
            current_layer: self.current_layer().unwrap_or_default(),
            packets_written: self.packets_written.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::rtc;
    use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

    async fn session() -> WhepSession {
        let config = EngineConfig::host_only();
        let api = rtc::build_api(&config).unwrap();
        let pc = rtc::new_peer_connection(&api, &config).await.unwrap();

        let track = |mime: &str, kind: &str| {
            Arc::new(TrackLocalStaticRTP::new(
                RTCRtpCodecCapability {
                    mime_type: mime.to_string(),
                    ..Default::default()
                },
                kind.to_string(),
                "test".to_string(),
            ))
        };

        WhepSession::new(
            "studio",
            pc,
            track(MIME_TYPE_VP8, "video"),
            track(MIME_TYPE_OPUS, "audio"),
        )
    }

    fn header(seq: u16, ts: u32) -> Header {
        Header {
            sequence_number: seq,
            timestamp: ts,
            ..Default::default()
        }
    }

    #[test]
    fn test_rewriter_passes_through_until_resync() {
        let mut rewriter = PacketRewriter::default();
        let mut h = header(100, 9000);
        rewriter.rewrite(&mut h);
        assert_eq!((h.sequence_number, h.timestamp), (100, 9000));
    }

    #[test]
    fn test_rewriter_continues_after_switch() {
        let mut rewriter = PacketRewriter::default();
        let mut h = header(100, 9000);
        rewriter.rewrite(&mut h);

        rewriter.resync();

        let mut next = header(5000, 123_456);
        rewriter.rewrite(&mut next);
        assert_eq!(next.sequence_number, 101);
        assert_eq!(next.timestamp, 9000 + SWITCH_TIMESTAMP_GAP);

        let mut after = header(5001, 126_456);
        rewriter.rewrite(&mut after);
        assert_eq!(after.sequence_number, 102);
        assert_eq!(after.timestamp, 9000 + SWITCH_TIMESTAMP_GAP + 3000);
    }

    #[test]
    fn test_rewriter_wraps_sequence_numbers() {
        let mut rewriter = PacketRewriter::default();
        let mut h = header(u16::MAX, u32::MAX - 10);
        rewriter.rewrite(&mut h);

        rewriter.resync();

        let mut next = header(7, 0);
        rewriter.rewrite(&mut next);
        assert_eq!(next.sequence_number, 0);
        assert_eq!(next.timestamp, (u32::MAX - 10).wrapping_add(SWITCH_TIMESTAMP_GAP));
    }

    #[test]
    fn test_resync_before_first_packet_is_passthrough() {
        let mut rewriter = PacketRewriter::default();
        rewriter.resync();
        let mut h = header(42, 4200);
        rewriter.rewrite(&mut h);
        assert_eq!((h.sequence_number, h.timestamp), (42, 4200));
    }

    #[tokio::test]
    async fn test_first_seen_layer_is_adopted() {
        let session = session().await;
        assert_eq!(session.current_layer(), None);

        assert!(session.accepts("h"));
        assert!(!session.accepts("l"));
        assert!(session.accepts("h"));
        assert_eq!(session.current_layer().as_deref(), Some("h"));
        assert_eq!(session.status().current_layer, "h");

        session.pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_layer_changes_accepted_packets() {
        let session = session().await;
        assert!(session.accepts("h"));

        assert!(session.switch_layer("l"));
        assert!(session.accepts("l"));
        assert!(!session.accepts("h"));

        // Selecting the current layer again is a no-op
        assert!(!session.switch_layer("l"));
        assert_eq!(session.status().current_layer, "l");

        session.pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_before_any_packet_pins_layer() {
        let session = session().await;

        assert!(session.switch_layer("l"));
        assert!(!session.accepts("h"));
        assert!(session.accepts("l"));

        session.pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_keeps_outgoing_sequence_continuous() {
        let session = session().await;
        assert!(session.accepts("h"));

        let mut first = header(100, 9000);
        session.rewrite(&mut first);
        session.record_written();

        session.switch_layer("l");
        let mut next = header(7000, 50);
        session.rewrite(&mut next);
        session.record_written();

        assert_eq!(next.sequence_number, 101);
        assert_eq!(next.timestamp, 9000 + SWITCH_TIMESTAMP_GAP);
        assert_eq!(session.status().packets_written, 2);

        session.pc.close().await.unwrap();
    }
}
