//! Stream metadata passed to interceptor bind/unbind callbacks.

/// RTP header extension as negotiated via SDP (RFC 8285).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTPHeaderExtension {
    /// URI identifying the extension type (e.g., "urn:ietf:params:rtp-hdrext:sdes:mid")
    pub uri: String,
    /// Local identifier used in RTP packets to reference this extension
    pub id: u16,
}

/// RTCP feedback mechanism negotiated for the stream.
///
/// | Type | Parameter | Description |
/// |------|-----------|-------------|
/// | `nack` | (empty) | Generic NACK for retransmission (RFC 4585) |
/// | `nack` | `pli` | Picture Loss Indication (RFC 4585) |
/// | `ccm` | `fir` | Full Intra Request (RFC 5104) |
/// | `transport-cc` | (empty) | Transport-wide CC feedback |
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCPFeedback {
    /// Type of feedback mechanism: "ack", "ccm", "nack", "goog-remb" or
    /// "transport-cc".
    pub typ: String,
    /// Parameter value that depends on the feedback type. An empty string
    /// indicates the base feedback type without additional parameters.
    pub parameter: String,
}

/// Stream context passed to interceptor bind/unbind callbacks.
#[derive(Default, Debug, Clone)]
pub struct StreamInfo {
    /// Synchronization Source identifier of the stream.
    pub ssrc: u32,
    /// RTP payload type (e.g., 96 for VP8, 111 for Opus).
    pub payload_type: u8,
    /// Negotiated RTP header extensions for this stream.
    pub rtp_header_extensions: Vec<RTPHeaderExtension>,
    /// MIME type of the codec (e.g., "video/VP8", "audio/opus").
    pub mime_type: String,
    /// Clock rate in Hz (e.g., 90000 for video, 48000 for Opus audio).
    pub clock_rate: u32,
    /// Number of audio channels (0 for video, 1 for mono, 2 for stereo).
    pub channels: u16,
    /// Format-specific parameters from SDP (fmtp line).
    pub sdp_fmtp_line: String,
    /// RTCP feedback mechanisms negotiated for this stream.
    pub rtcp_feedback: Vec<RTCPFeedback>,
}

impl StreamInfo {
    /// Looks up the id a header extension was negotiated under.
    pub fn header_extension_id(&self, uri: &str) -> Option<u16> {
        self.rtp_header_extensions
            .iter()
            .find(|e| e.uri == uri)
            .map(|e| e.id)
    }

    /// Whether a given RTCP feedback mechanism was negotiated.
    pub fn supports_feedback(&self, typ: &str, parameter: &str) -> bool {
        self.rtcp_feedback
            .iter()
            .any(|fb| fb.typ == typ && fb.parameter == parameter)
    }
}
