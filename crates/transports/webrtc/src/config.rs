//! Configuration types for the WebRTC media engine

use serde::{Deserialize, Serialize};

/// Configuration for [`WebRtcEngine`](crate::WebRtcEngine)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// STUN server URLs used for server reflexive candidates
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    /// Public IPs to advertise in place of host candidate addresses (1:1 NAT)
    #[serde(default)]
    pub nat_1to1_ips: Vec<String>,

    /// How often publishers are asked for a keyframe, in milliseconds
    #[serde(default = "default_pli_interval_ms")]
    pub pli_interval_ms: u64,
}

fn default_stun_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_pli_interval_ms() -> u64 {
    3000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
            nat_1to1_ips: Vec::new(),
            pli_interval_ms: default_pli_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Configuration without STUN servers, gathering host candidates only
    pub fn host_only() -> Self {
        Self {
            stun_servers: Vec::new(),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(crate::Error::InvalidConfig(format!(
                "STUN server URL must start with stun: or stuns:, got {url}"
            )));
        }

        if self.pli_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "pli_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
