//! Minimal WebRTC client used to verify the engine end to end
//!
//! [`ProbeClient::new`] offers to receive one video and one audio track,
//! exactly like a browser viewer would, and reports whether ICE connects.
//! [`ProbeClient::publisher`] makes the send-only offer of a WHIP encoder.
//!
//! ```ignore
//! let probe = ProbeClient::new(&EngineConfig::default()).await?;
//! let offer = probe.create_offer().await?;
//! // POST the offer to /api/whep ...
//! probe.apply_answer(answer).await?;
//! probe.wait_connected(Duration::from_secs(10)).await?;
//! probe.close().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::config::EngineConfig;
use crate::rtc;
use crate::{Error, Result};

pub struct ProbeClient {
    pc: Arc<RTCPeerConnection>,
    ice_state: watch::Receiver<RTCIceConnectionState>,
}

impl ProbeClient {
    /// Receive-only client, as used by a WHEP viewer
    pub async fn new(config: &EngineConfig) -> Result<Self> {
        Self::with_direction(config, RTCRtpTransceiverDirection::Recvonly).await
    }

    /// Send-only client, as used by a WHIP publisher
    pub async fn publisher(config: &EngineConfig) -> Result<Self> {
        Self::with_direction(config, RTCRtpTransceiverDirection::Sendonly).await
    }

    async fn with_direction(
        config: &EngineConfig,
        direction: RTCRtpTransceiverDirection,
    ) -> Result<Self> {
        let api = rtc::build_api(config)?;
        let pc = rtc::new_peer_connection(&api, config).await?;

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| Error::WebRtcError(format!("Failed to add {} transceiver: {}", kind, e)))?;
        }

        let (tx, rx) = watch::channel(RTCIceConnectionState::New);
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!("Probe ICE state: {}", state);
            let _ = tx.send(state);
            Box::pin(async {})
        }));

        Ok(Self { pc, ice_state: rx })
    }

    /// Create the local offer, waiting for ICE gathering to complete
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let _ = gather_complete.recv().await;

        let local_desc = self.pc.local_description().await.ok_or_else(|| {
            Error::SdpError("No local description after setting offer".to_string())
        })?;

        Ok(local_desc.sdp)
    }

    pub async fn apply_answer(&self, answer_sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    /// Wait until ICE reports connected (or completed)
    ///
    /// # Errors
    ///
    /// * `Error::IceFailed` - ICE failed or the connection was closed
    /// * `Error::OperationTimeout` - `timeout` elapsed first
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.ice_state.clone();

        let wait = async move {
            loop {
                let state = *rx.borrow_and_update();
                match state {
                    RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                        return Ok(());
                    }
                    RTCIceConnectionState::Failed | RTCIceConnectionState::Closed => {
                        return Err(Error::IceFailed(format!("ICE connection {}", state)));
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(Error::IceFailed("ICE state channel closed".to_string()));
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            Error::OperationTimeout(format!("ICE did not connect within {:?}", timeout))
        })?
    }

    pub async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!("Error closing probe peer connection: {}", e);
        }
    }
}
