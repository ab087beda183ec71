//! Simulcast layer descriptors

use serde::{Deserialize, Serialize};

/// One selectable simulcast encoding of a media section
///
/// Serialized as `{"mediaId": "...", "encodingId": "..."}`, which is the shape
/// WHEP clients receive in the `layers` server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulcastLayer {
    /// Media section the encoding belongs to
    pub media_id: String,
    /// Encoding identifier (the RTP stream id of the simulcast encoding)
    pub encoding_id: String,
}

impl SimulcastLayer {
    pub fn new(media_id: impl Into<String>, encoding_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            encoding_id: encoding_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_uses_camel_case_fields() {
        let json = serde_json::to_string(&vec![SimulcastLayer::new("1", "h")]).unwrap();
        assert_eq!(json, r#"[{"mediaId":"1","encodingId":"h"}]"#);
    }
}
