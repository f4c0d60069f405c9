use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::sdp_type::RTCSdpType;
use shared::error::{Error, Result};

/// One session description of an offer/answer exchange. The SDP body is
/// carried as opaque text; only the handful of attributes the connection
/// needs are interpreted, by the internal reader.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,
}

impl RTCSessionDescription {
    /// Creates a session description of type offer.
    pub fn offer(sdp: String) -> Self {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            sdp,
        }
    }

    /// Creates a session description of type answer.
    pub fn answer(sdp: String) -> Self {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Answer,
            sdp,
        }
    }

    /// Creates a session description of type pranswer.
    pub fn pranswer(sdp: String) -> Self {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Pranswer,
            sdp,
        }
    }

    /// Creates the rollback marker description.
    pub fn rollback() -> Self {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            sdp: String::new(),
        }
    }

    /// Serializes to the `{"type": ..., "sdp": ...}` JSON exchanged over
    /// signaling.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Other(e.to_string()))
    }

    /// Base64-wraps the JSON form for transports that cannot carry newlines.
    pub fn encode(&self) -> Result<String> {
        Ok(BASE64_STANDARD.encode(self.to_json()?))
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let json = BASE64_STANDARD
            .decode(raw.trim())
            .map_err(|e| Error::Other(e.to_string()))?;
        let json = String::from_utf8(json)?;
        RTCSessionDescription::from_json(&json)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let desc = RTCSessionDescription::offer("v=0\r\n".to_string());
        let json = desc.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""), "{json}");
        assert!(json.contains("\"sdp\":\"v=0\\r\\n\""), "{json}");

        let parsed = RTCSessionDescription::from_json(&json).unwrap();
        assert_eq!(parsed, desc);
    }

    #[test]
    fn test_base64_roundtrip() {
        let desc = RTCSessionDescription::answer("v=0\r\nm=application 9\r\n".to_string());
        let encoded = desc.encode().unwrap();
        assert!(!encoded.contains('\n'));
        let decoded = RTCSessionDescription::decode(&encoded).unwrap();
        assert_eq!(decoded, desc);
    }
}
