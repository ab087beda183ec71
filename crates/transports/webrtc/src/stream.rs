//! Per-stream-key media state: publisher, simulcast layers and fan-out channels

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use relaybox_core::{SimulcastLayer, VideoStreamStatus};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

/// Media section id reported for every video layer
pub(crate) const VIDEO_MEDIA_ID: &str = "1";

/// Encoding id used for a publisher that sends a single, untagged encoding
pub(crate) const DEFAULT_RID: &str = "default";

const VIDEO_CHANNEL_CAPACITY: usize = 1024;
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Video RTP packet tagged with the simulcast encoding it arrived on
#[derive(Clone)]
pub(crate) struct VideoPacket {
    pub rid: Arc<str>,
    pub packet: Packet,
}

/// One video encoding received from the publisher
pub(crate) struct VideoLayer {
    pub rid: String,
    pub ssrc: u32,
    pub packets_received: AtomicU64,
}

/// The WHIP peer currently feeding a stream
#[derive(Clone)]
pub(crate) struct Publisher {
    pub id: String,
    pub pc: Arc<RTCPeerConnection>,
    pub cancel: CancellationToken,
}

pub(crate) struct Stream {
    pub key: String,
    pub first_seen_epoch: u64,
    pub audio_packets_received: AtomicU64,
    pub layers: RwLock<Vec<Arc<VideoLayer>>>,
    pub video_codec: RwLock<Option<RTCRtpCodecCapability>>,
    pub audio_codec: RwLock<Option<RTCRtpCodecCapability>>,
    pub publisher: Mutex<Option<Publisher>>,
    pub video_tx: broadcast::Sender<VideoPacket>,
    pub audio_tx: broadcast::Sender<Packet>,
}

impl Stream {
    pub fn new(key: impl Into<String>) -> Self {
        let (video_tx, _) = broadcast::channel(VIDEO_CHANNEL_CAPACITY);
        let (audio_tx, _) = broadcast::channel(AUDIO_CHANNEL_CAPACITY);

        Self {
            key: key.into(),
            first_seen_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            audio_packets_received: AtomicU64::new(0),
            layers: RwLock::new(Vec::new()),
            video_codec: RwLock::new(None),
            audio_codec: RwLock::new(None),
            publisher: Mutex::new(None),
            video_tx,
            audio_tx,
        }
    }

    /// Install a new publisher, returning the one it replaces
    ///
    /// Layers and codecs from the previous publisher are discarded.
    pub fn replace_publisher(&self, publisher: Publisher) -> Option<Publisher> {
        let previous = self.publisher.lock().replace(publisher);
        self.layers.write().clear();
        *self.video_codec.write() = None;
        *self.audio_codec.write() = None;
        previous
    }

    /// Clear the publisher if it is still the one with `publisher_id`
    pub fn clear_publisher(&self, publisher_id: &str) -> bool {
        let mut publisher = self.publisher.lock();
        if publisher.as_ref().is_some_and(|p| p.id == publisher_id) {
            *publisher = None;
            drop(publisher);
            self.layers.write().clear();
            true
        } else {
            false
        }
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.lock().is_some()
    }

    /// Record a video encoding, returning its shared counter handle
    pub fn add_layer(&self, rid: &str, ssrc: u32) -> Arc<VideoLayer> {
        let rid = if rid.is_empty() { DEFAULT_RID } else { rid };
        let layer = Arc::new(VideoLayer {
            rid: rid.to_string(),
            ssrc,
            packets_received: AtomicU64::new(0),
        });

        let mut layers = self.layers.write();
        layers.retain(|l| l.rid != rid);
        layers.push(Arc::clone(&layer));
        layer
    }

    pub fn has_layer(&self, rid: &str) -> bool {
        self.layers.read().iter().any(|l| l.rid == rid)
    }

    pub fn simulcast_layers(&self) -> Vec<SimulcastLayer> {
        self.layers
            .read()
            .iter()
            .map(|l| SimulcastLayer::new(VIDEO_MEDIA_ID, l.rid.clone()))
            .collect()
    }

    pub fn video_statuses(&self) -> Vec<VideoStreamStatus> {
        self.layers
            .read()
            .iter()
            .map(|l| VideoStreamStatus {
                rid: l.rid.clone(),
                packets_received: l.packets_received.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Ask the publisher for a keyframe on one layer, or on all of them
    pub async fn request_keyframe(&self, rid: Option<&str>) {
        let Some(pc) = self.publisher.lock().as_ref().map(|p| Arc::clone(&p.pc)) else {
            return;
        };

        let ssrcs: Vec<u32> = self
            .layers
            .read()
            .iter()
            .filter(|l| rid.map_or(true, |rid| l.rid == rid))
            .map(|l| l.ssrc)
            .collect();

        for ssrc in ssrcs {
            let pli = PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc: ssrc,
            };
            if let Err(e) = pc.write_rtcp(&[Box::new(pli)]).await {
                warn!("PLI send error for stream {}: {}", self.key, e);
            } else {
                debug!("Requested keyframe on stream {} ssrc {}", self.key, ssrc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rid_maps_to_default_layer() {
        let stream = Stream::new("studio");
        stream.add_layer("", 1111);

        assert!(stream.has_layer(DEFAULT_RID));
        assert_eq!(
            stream.simulcast_layers(),
            vec![SimulcastLayer::new(VIDEO_MEDIA_ID, DEFAULT_RID)]
        );
    }

    #[test]
    fn test_readding_layer_replaces_ssrc() {
        let stream = Stream::new("studio");
        stream.add_layer("h", 1);
        stream.add_layer("l", 2);
        stream.add_layer("h", 3);

        let layers = stream.layers.read();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].rid, "l");
        assert_eq!(layers[1].ssrc, 3);
    }

    #[test]
    fn test_video_statuses_report_packet_counts() {
        let stream = Stream::new("studio");
        let layer = stream.add_layer("q", 9);
        layer.packets_received.fetch_add(5, Ordering::Relaxed);

        assert_eq!(
            stream.video_statuses(),
            vec![VideoStreamStatus {
                rid: "q".to_string(),
                packets_received: 5
            }]
        );
    }

    #[tokio::test]
    async fn test_keyframe_request_without_publisher_is_noop() {
        let stream = Stream::new("studio");
        stream.add_layer("h", 1);
        stream.request_keyframe(Some("h")).await;
        assert!(!stream.has_publisher());
    }
}
