//! [`MediaEngine`] implementation backed by `webrtc` peer connections

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use relaybox_core::{EgressAnswer, MediaEngine, SimulcastLayer, StreamStatus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::API;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use crate::config::EngineConfig;
use crate::egress::WhepSession;
use crate::registry::Registry;
use crate::rtc;
use crate::stream::{Publisher, Stream, VideoPacket};
use crate::{Error, Result};

const TRACK_STREAM_ID: &str = "relaybox";

/// WebRTC media engine
///
/// One publisher per stream key feeds any number of WHEP viewers. Viewers
/// receive a single simulcast encoding at a time and can switch between the
/// encodings the publisher sends.
pub struct WebRtcEngine {
    api: Arc<API>,
    config: EngineConfig,
    registry: Arc<Registry>,
}

impl WebRtcEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let api = rtc::build_api(&config)?;

        info!(
            "WebRTC engine ready (stun_servers={:?}, nat_1to1_ips={:?})",
            config.stun_servers, config.nat_1to1_ips
        );

        Ok(Self {
            api,
            config,
            registry: Arc::new(Registry::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close every peer connection and forget all streams and sessions
    pub async fn shutdown(&self) {
        let (streams, sessions) = self.registry.drain();

        for session in sessions {
            session.cancel.cancel();
            if let Err(e) = session.pc.close().await {
                debug!("Error closing WHEP session {}: {}", session.id, e);
            }
        }

        for stream in streams {
            let publisher = stream.publisher.lock().take();
            if let Some(publisher) = publisher {
                publisher.cancel.cancel();
                if let Err(e) = publisher.pc.close().await {
                    debug!("Error closing publisher for {}: {}", stream.key, e);
                }
            }
        }

        info!("WebRTC engine shut down");
    }

    async fn ingest(&self, offer: String, stream_key: &str) -> Result<String> {
        let pc = rtc::new_peer_connection(&self.api, &self.config).await?;
        let stream = self.registry.stream_or_create(stream_key);

        let publisher = Publisher {
            id: uuid::Uuid::new_v4().to_string(),
            pc: Arc::clone(&pc),
            cancel: CancellationToken::new(),
        };
        let publisher_id = publisher.id.clone();
        let cancel = publisher.cancel.clone();

        if let Some(previous) = stream.replace_publisher(publisher) {
            info!(
                stream_key = %stream_key,
                "Replacing publisher {} with {}", previous.id, publisher_id
            );
            previous.cancel.cancel();
            if let Err(e) = previous.pc.close().await {
                debug!("Error closing replaced publisher {}: {}", previous.id, e);
            }
        }

        install_publisher_tracks(&pc, &stream, &cancel);
        install_publisher_state_handler(&pc, &self.registry, &stream, &publisher_id, &cancel);

        match rtc::answer_offer(&pc, offer).await {
            Ok(answer) => {
                spawn_keyframe_requests(
                    Arc::clone(&stream),
                    Duration::from_millis(self.config.pli_interval_ms),
                    cancel,
                );
                info!(stream_key = %stream_key, "Publisher {} negotiated", publisher_id);
                Ok(answer)
            }
            Err(e) => {
                cancel.cancel();
                stream.clear_publisher(&publisher_id);
                let _ = pc.close().await;
                self.registry.prune(stream_key);
                Err(e)
            }
        }
    }

    async fn egress(&self, offer: String, stream_key: &str) -> Result<EgressAnswer> {
        let stream = self.registry.stream_or_create(stream_key);

        let video_codec = stream
            .video_codec
            .read()
            .clone()
            .unwrap_or_else(default_video_codec);
        let audio_codec = stream
            .audio_codec
            .read()
            .clone()
            .unwrap_or_else(default_audio_codec);

        let pc = match rtc::new_peer_connection(&self.api, &self.config).await {
            Ok(pc) => pc,
            Err(e) => {
                self.registry.prune(stream_key);
                return Err(e);
            }
        };

        let video_track = Arc::new(TrackLocalStaticRTP::new(
            video_codec,
            "video".to_string(),
            TRACK_STREAM_ID.to_string(),
        ));
        let audio_track = Arc::new(TrackLocalStaticRTP::new(
            audio_codec,
            "audio".to_string(),
            TRACK_STREAM_ID.to_string(),
        ));

        let session = Arc::new(WhepSession::new(
            stream_key,
            Arc::clone(&pc),
            Arc::clone(&video_track),
            Arc::clone(&audio_track),
        ));

        let sdp = match self.attach_session(&session, &stream, offer).await {
            Ok(sdp) => sdp,
            Err(e) => {
                session.cancel.cancel();
                self.registry.remove_session(&session.id);
                let _ = pc.close().await;
                self.registry.prune(stream_key);
                return Err(e);
            }
        };

        spawn_video_forwarder(Arc::clone(&session), stream.video_tx.subscribe());
        spawn_audio_forwarder(Arc::clone(&session), stream.audio_tx.subscribe());
        stream.request_keyframe(None).await;

        info!(
            stream_key = %stream_key,
            session_id = %session.id,
            "WHEP session negotiated"
        );

        Ok(EgressAnswer {
            sdp,
            session_id: session.id.clone(),
        })
    }

    async fn attach_session(
        &self,
        session: &Arc<WhepSession>,
        stream: &Arc<Stream>,
        offer: String,
    ) -> Result<String> {
        let pc = &session.pc;

        let video_sender = pc
            .add_track(Arc::clone(&session.video_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to add video track: {}", e)))?;
        let audio_sender = pc
            .add_track(Arc::clone(&session.audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to add audio track: {}", e)))?;

        spawn_rtcp_reader(
            video_sender,
            session.cancel.clone(),
            Some((Arc::clone(session), Arc::clone(stream))),
        );
        spawn_rtcp_reader(audio_sender, session.cancel.clone(), None);

        self.registry.insert_session(Arc::clone(session));
        install_session_state_handler(session, &self.registry);

        rtc::answer_offer(pc, offer).await
    }

    async fn switch_layer(&self, session_id: &str, encoding_id: &str) -> Result<()> {
        let session = self
            .registry
            .session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let stream = self
            .registry
            .stream(&session.stream_key)
            .filter(|s| s.has_layer(encoding_id))
            .ok_or_else(|| Error::UnknownLayer {
                session_id: session_id.to_string(),
                encoding_id: encoding_id.to_string(),
            })?;

        if session.switch_layer(encoding_id) {
            info!(session_id = %session_id, "Switched to layer {}", encoding_id);
            stream.request_keyframe(Some(encoding_id)).await;
        }

        Ok(())
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn negotiate_ingest(
        &self,
        offer: String,
        stream_key: &str,
    ) -> relaybox_core::Result<String> {
        self.ingest(offer, stream_key).await.map_err(|e| {
            warn!(stream_key = %stream_key, "WHIP negotiation failed: {}", e);
            relaybox_core::Error::Negotiation(e.to_string())
        })
    }

    async fn negotiate_egress(
        &self,
        offer: String,
        stream_key: &str,
    ) -> relaybox_core::Result<EgressAnswer> {
        self.egress(offer, stream_key).await.map_err(|e| {
            warn!(stream_key = %stream_key, "WHEP negotiation failed: {}", e);
            relaybox_core::Error::Negotiation(e.to_string())
        })
    }

    async fn layers(&self, session_id: &str) -> relaybox_core::Result<Vec<SimulcastLayer>> {
        let session = self
            .registry
            .session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        Ok(self
            .registry
            .stream(&session.stream_key)
            .map(|s| s.simulcast_layers())
            .unwrap_or_default())
    }

    async fn set_layer(&self, session_id: &str, encoding_id: &str) -> relaybox_core::Result<()> {
        Ok(self.switch_layer(session_id, encoding_id).await?)
    }

    async fn status(&self, stream_key: &str) -> Option<StreamStatus> {
        self.registry.status(stream_key)
    }

    async fn statuses(&self) -> Vec<StreamStatus> {
        self.registry.statuses()
    }
}

fn default_video_codec() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            .to_string(),
        rtcp_feedback: vec![],
    }
}

fn default_audio_codec() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_string(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Route publisher RTP into the stream's broadcast channels
fn install_publisher_tracks(
    pc: &Arc<RTCPeerConnection>,
    stream: &Arc<Stream>,
    cancel: &CancellationToken,
) {
    let stream = Arc::clone(stream);
    let cancel = cancel.clone();

    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let stream = Arc::clone(&stream);
        let cancel = cancel.clone();

        Box::pin(async move {
            let rid = track.rid().to_string();
            info!(
                stream_key = %stream.key,
                "Track received: kind={}, ssrc={}, rid={:?}",
                track.kind(),
                track.ssrc(),
                rid
            );

            if track.kind() == RTPCodecType::Video {
                *stream.video_codec.write() = Some(track.codec().capability.clone());
                tokio::spawn(read_video_track(track, stream, cancel));
            } else {
                *stream.audio_codec.write() = Some(track.codec().capability.clone());
                tokio::spawn(read_audio_track(track, stream, cancel));
            }
        })
    }));
}

async fn read_video_track(track: Arc<TrackRemote>, stream: Arc<Stream>, cancel: CancellationToken) {
    let layer = stream.add_layer(&track.rid().to_string(), track.ssrc());
    let rid: Arc<str> = Arc::from(layer.rid.as_str());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = track.read_rtp() => match result {
                Ok((packet, _)) => {
                    layer.packets_received.fetch_add(1, Ordering::Relaxed);
                    let _ = stream.video_tx.send(VideoPacket {
                        rid: Arc::clone(&rid),
                        packet,
                    });
                }
                Err(e) => {
                    debug!(stream_key = %stream.key, "RTP read ended (video {}): {}", rid, e);
                    break;
                }
            }
        }
    }
}

async fn read_audio_track(track: Arc<TrackRemote>, stream: Arc<Stream>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = track.read_rtp() => match result {
                Ok((packet, _)) => {
                    stream.audio_packets_received.fetch_add(1, Ordering::Relaxed);
                    let _ = stream.audio_tx.send(packet);
                }
                Err(e) => {
                    debug!(stream_key = %stream.key, "RTP read ended (audio): {}", e);
                    break;
                }
            }
        }
    }
}

fn install_publisher_state_handler(
    pc: &Arc<RTCPeerConnection>,
    registry: &Arc<Registry>,
    stream: &Arc<Stream>,
    publisher_id: &str,
    cancel: &CancellationToken,
) {
    let registry = Arc::clone(registry);
    let stream = Arc::clone(stream);
    let publisher_id = publisher_id.to_string();
    let cancel = cancel.clone();
    let weak_pc = Arc::downgrade(pc);

    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let registry = Arc::clone(&registry);
        let stream = Arc::clone(&stream);
        let publisher_id = publisher_id.clone();
        let cancel = cancel.clone();
        let pc = open_peer(&weak_pc, state);

        Box::pin(async move {
            info!(stream_key = %stream.key, "Publisher {} state: {}", publisher_id, state);
            if is_terminal(state) {
                retire_publisher(&registry, &stream, &publisher_id, &cancel, pc);
            }
        })
    }));
}

/// Stop a publisher's tasks, detach it from its stream and close its peer
/// connection
fn retire_publisher(
    registry: &Registry,
    stream: &Stream,
    publisher_id: &str,
    cancel: &CancellationToken,
    pc: Option<Arc<RTCPeerConnection>>,
) {
    cancel.cancel();
    if stream.clear_publisher(publisher_id) {
        registry.prune(&stream.key);
    }
    if let Some(pc) = pc {
        spawn_close(pc, format!("publisher {}", publisher_id));
    }
}

fn install_session_state_handler(session: &Arc<WhepSession>, registry: &Arc<Registry>) {
    let registry = Arc::clone(registry);
    let session_id = session.id.clone();
    let stream_key = session.stream_key.clone();
    let cancel = session.cancel.clone();
    let weak_pc = Arc::downgrade(&session.pc);

    session
        .pc
        .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let registry = Arc::clone(&registry);
            let session_id = session_id.clone();
            let stream_key = stream_key.clone();
            let cancel = cancel.clone();
            let pc = open_peer(&weak_pc, state);

            Box::pin(async move {
                info!(session_id = %session_id, "WHEP session state: {}", state);
                if is_terminal(state) {
                    retire_session(&registry, &session_id, &stream_key, &cancel, pc);
                }
            })
        }));
}

/// Stop a viewer's tasks, forget the session and close its peer connection
fn retire_session(
    registry: &Registry,
    session_id: &str,
    stream_key: &str,
    cancel: &CancellationToken,
    pc: Option<Arc<RTCPeerConnection>>,
) {
    cancel.cancel();
    if registry.remove_session(session_id).is_some() {
        registry.prune(stream_key);
    }
    if let Some(pc) = pc {
        spawn_close(pc, format!("WHEP session {}", session_id));
    }
}

fn is_terminal(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Failed
            | RTCPeerConnectionState::Disconnected
            | RTCPeerConnectionState::Closed
    )
}

/// The peer connection still to be closed after `state`, if any
///
/// Handlers hold a weak reference; the connection owns its handlers.
fn open_peer(
    pc: &Weak<RTCPeerConnection>,
    state: RTCPeerConnectionState,
) -> Option<Arc<RTCPeerConnection>> {
    match state {
        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected => pc.upgrade(),
        _ => None,
    }
}

/// Close off the state-change callback; `close` waits on the connection's
/// own operations
fn spawn_close(pc: Arc<RTCPeerConnection>, label: String) {
    tokio::spawn(async move {
        if let Err(e) = pc.close().await {
            debug!("Error closing {}: {}", label, e);
        }
    });
}

/// Periodic PLI so new viewers and layer switches see a keyframe soon
fn spawn_keyframe_requests(stream: Arc<Stream>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => stream.request_keyframe(None).await,
            }
        }
    });
}

/// Drain RTCP from a viewer's sender, forwarding PLI to the publisher
///
/// Reading is required for the interceptors to process incoming RTCP. The
/// reader stops with the session even if the peer goes silent.
fn spawn_rtcp_reader(
    sender: Arc<RTCRtpSender>,
    cancel: CancellationToken,
    forward: Option<(Arc<WhepSession>, Arc<Stream>)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let packets = tokio::select! {
                _ = cancel.cancelled() => break,
                result = sender.read_rtcp() => match result {
                    Ok((packets, _)) => packets,
                    Err(_) => break,
                },
            };
            let Some((session, stream)) = &forward else {
                continue;
            };
            let wants_keyframe = packets.iter().any(|p| {
                p.as_any()
                    .downcast_ref::<PictureLossIndication>()
                    .is_some()
            });
            if wants_keyframe {
                stream.request_keyframe(session.current_layer().as_deref()).await;
            }
        }
    })
}

fn spawn_video_forwarder(session: Arc<WhepSession>, mut rx: broadcast::Receiver<VideoPacket>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(VideoPacket { rid, mut packet }) => {
                        if !session.accepts(&rid) {
                            continue;
                        }
                        session.rewrite(&mut packet.header);
                        match session.video_track.write_rtp(&packet).await {
                            Ok(_) => session.record_written(),
                            Err(e) => debug!(session_id = %session.id, "write_rtp error (video): {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %session.id, "Video forwarder lagged by {} packets", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });
}

fn spawn_audio_forwarder(session: Arc<WhepSession>, mut rx: broadcast::Receiver<Packet>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(packet) => match session.audio_track.write_rtp(&packet).await {
                        Ok(_) => session.record_written(),
                        Err(e) => debug!(session_id = %session.id, "write_rtp error (audio): {}", e),
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(session_id = %session.id, "Audio forwarder lagged by {} packets", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });
}
