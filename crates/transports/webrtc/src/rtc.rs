//! Shared WebRTC API construction and SDP helpers

use std::sync::Arc;

use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpHeaderExtensionCapability, RTPCodecType};

use crate::config::EngineConfig;
use crate::{Error, Result};

/// RTP header extensions a publisher needs to tag simulcast encodings
const SIMULCAST_HEADER_EXTENSIONS: [&str; 3] = [
    "urn:ietf:params:rtp-hdrext:sdes:mid",
    "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id",
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id",
];

/// Build the WebRTC API shared by every peer connection of an engine
pub(crate) fn build_api(config: &EngineConfig) -> Result<Arc<API>> {
    let mut media_engine = MediaEngine::default();

    // Opus for audio, VP8/VP9/H.264 for video
    media_engine
        .register_default_codecs()
        .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

    for uri in SIMULCAST_HEADER_EXTENSIONS {
        media_engine
            .register_header_extension(
                RTCRtpHeaderExtensionCapability {
                    uri: uri.to_string(),
                },
                RTPCodecType::Video,
                None,
            )
            .map_err(|e| {
                Error::WebRtcError(format!("Failed to register header extension {}: {}", uri, e))
            })?;
    }

    let interceptor_registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

    let mut setting_engine = SettingEngine::default();
    if !config.nat_1to1_ips.is_empty() {
        debug!("Advertising 1:1 NAT IPs {:?}", config.nat_1to1_ips);
        setting_engine.set_nat_1to1_ips(config.nat_1to1_ips.clone(), RTCIceCandidateType::Host);
    }

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(interceptor_registry)
        .with_setting_engine(setting_engine)
        .build();

    Ok(Arc::new(api))
}

/// Peer connection configuration with the configured STUN servers
pub(crate) fn rtc_configuration(config: &EngineConfig) -> RTCConfiguration {
    let ice_servers: Vec<RTCIceServer> = config
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .collect();

    RTCConfiguration {
        ice_servers,
        ..Default::default()
    }
}

/// Create a new peer connection from the shared API
pub(crate) async fn new_peer_connection(
    api: &API,
    config: &EngineConfig,
) -> Result<Arc<RTCPeerConnection>> {
    let pc = api
        .new_peer_connection(rtc_configuration(config))
        .await
        .map_err(|e| Error::WebRtcError(format!("Failed to create peer connection: {}", e)))?;
    Ok(Arc::new(pc))
}

/// Apply a remote offer and return the local answer
///
/// Waits for ICE gathering to finish so the returned SDP carries every
/// candidate; WHIP and WHEP have no trickle path here.
pub(crate) async fn answer_offer(pc: &RTCPeerConnection, offer_sdp: String) -> Result<String> {
    let offer = RTCSessionDescription::offer(offer_sdp)
        .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;

    pc.set_remote_description(offer)
        .await
        .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

    let answer = pc
        .create_answer(None)
        .await
        .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

    let mut gather_complete = pc.gathering_complete_promise().await;

    pc.set_local_description(answer)
        .await
        .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

    let _ = gather_complete.recv().await;

    let local_desc = pc
        .local_description()
        .await
        .ok_or_else(|| Error::SdpError("No local description after setting answer".to_string()))?;

    Ok(local_desc.sdp)
}
