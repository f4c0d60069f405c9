use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a [`RTCSessionDescription`](super::session_description::RTCSessionDescription).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum RTCSdpType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified = 0,

    /// The description is the initial proposal in an offer/answer exchange.
    #[serde(rename = "offer")]
    Offer,

    /// The description is a provisional answer and may be changed when the
    /// definitive answer is given.
    #[serde(rename = "pranswer")]
    Pranswer,

    /// The description is the definitive choice in an offer/answer exchange.
    #[serde(rename = "answer")]
    Answer,

    /// The description rolls back to offer/answer state to the last stable state.
    #[serde(rename = "rollback")]
    Rollback,
}

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_PRANSWER_STR: &str = "pranswer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const SDP_TYPE_ROLLBACK_STR: &str = "rollback";

impl From<&str> for RTCSdpType {
    fn from(raw: &str) -> Self {
        match raw {
            SDP_TYPE_OFFER_STR => RTCSdpType::Offer,
            SDP_TYPE_PRANSWER_STR => RTCSdpType::Pranswer,
            SDP_TYPE_ANSWER_STR => RTCSdpType::Answer,
            SDP_TYPE_ROLLBACK_STR => RTCSdpType::Rollback,
            _ => RTCSdpType::Unspecified,
        }
    }
}

impl fmt::Display for RTCSdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCSdpType::Offer => write!(f, "{SDP_TYPE_OFFER_STR}"),
            RTCSdpType::Pranswer => write!(f, "{SDP_TYPE_PRANSWER_STR}"),
            RTCSdpType::Answer => write!(f, "{SDP_TYPE_ANSWER_STR}"),
            RTCSdpType::Rollback => write!(f, "{SDP_TYPE_ROLLBACK_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sdp_type_string_roundtrip() {
        let tests = vec![
            RTCSdpType::Offer,
            RTCSdpType::Pranswer,
            RTCSdpType::Answer,
            RTCSdpType::Rollback,
        ];
        for t in tests {
            assert_eq!(RTCSdpType::from(t.to_string().as_str()), t);
        }
    }

    #[test]
    fn test_sdp_type_serde() {
        assert_eq!(
            serde_json::to_string(&RTCSdpType::Offer).unwrap(),
            "\"offer\""
        );
        let parsed: RTCSdpType = serde_json::from_str("\"answer\"").unwrap();
        assert_eq!(parsed, RTCSdpType::Answer);
    }
}
