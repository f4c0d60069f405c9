pub mod offer_answer_options;

use std::fmt;

/// Describes one STUN or TURN server the external ICE agent may use.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// How aggressively media sections share one transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCBundlePolicy {
    Unspecified = 0,
    /// Gather candidates per media type, bundle if the peer supports it.
    #[default]
    Balanced,
    /// Gather candidates per media section.
    MaxCompat,
    /// Gather candidates for one transport only; this core always bundles.
    MaxBundle,
}

impl From<&str> for RTCBundlePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            "balanced" => RTCBundlePolicy::Balanced,
            "max-compat" => RTCBundlePolicy::MaxCompat,
            "max-bundle" => RTCBundlePolicy::MaxBundle,
            _ => RTCBundlePolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCBundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCBundlePolicy::Balanced => write!(f, "balanced"),
            RTCBundlePolicy::MaxCompat => write!(f, "max-compat"),
            RTCBundlePolicy::MaxBundle => write!(f, "max-bundle"),
            _ => write!(f, "Unspecified"),
        }
    }
}

/// Whether RTCP travels multiplexed with RTP. This core requires muxing.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCRtcpMuxPolicy {
    Unspecified = 0,
    Negotiate = 1,
    #[default]
    Require = 2,
}

impl fmt::Display for RTCRtcpMuxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCRtcpMuxPolicy::Negotiate => write!(f, "negotiate"),
            RTCRtcpMuxPolicy::Require => write!(f, "require"),
            _ => write!(f, "Unspecified"),
        }
    }
}

/// Configuration of an [`RTCPeerConnection`](crate::RTCPeerConnection).
#[derive(Default, Debug, Clone)]
pub struct RTCConfiguration {
    /// Servers handed to the external ICE agent.
    pub ice_servers: Vec<RTCIceServer>,
    pub bundle_policy: RTCBundlePolicy,
    pub rtcp_mux_policy: RTCRtcpMuxPolicy,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bundle_policy_string_roundtrip() {
        for policy in [
            RTCBundlePolicy::Balanced,
            RTCBundlePolicy::MaxCompat,
            RTCBundlePolicy::MaxBundle,
        ] {
            assert_eq!(RTCBundlePolicy::from(policy.to_string().as_str()), policy);
        }
    }
}
