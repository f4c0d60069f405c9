use std::fmt;

use interceptor::stream_info::RTCPFeedback;

/// Kind of a media track.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTPCodecType {
    #[default]
    Unspecified = 0,
    Audio,
    Video,
}

impl From<&str> for RTPCodecType {
    fn from(raw: &str) -> Self {
        match raw {
            "audio" => RTPCodecType::Audio,
            "video" => RTPCodecType::Video,
            _ => RTPCodecType::Unspecified,
        }
    }
}

impl fmt::Display for RTPCodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTPCodecType::Audio => write!(f, "audio"),
            RTPCodecType::Video => write!(f, "video"),
            _ => write!(f, "Unspecified"),
        }
    }
}

/// Codec capability as registered with the media engine and exchanged
/// through SDP rtpmap/fmtp/rtcp-fb lines.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCRtpCodecCapability {
    /// The full mime type, e.g. "video/VP8" or "audio/opus".
    pub mime_type: String,
    pub clock_rate: u32,
    /// Audio channel count; zero for video.
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub rtcp_feedback: Vec<RTCPFeedback>,
}

impl RTCRtpCodecCapability {
    /// The codec name as it appears in an rtpmap line, e.g. "VP8".
    pub fn name(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.mime_type)
    }

    /// The media kind derived from the mime type prefix.
    pub fn kind(&self) -> RTPCodecType {
        if self.mime_type.starts_with("audio/") {
            RTPCodecType::Audio
        } else if self.mime_type.starts_with("video/") {
            RTPCodecType::Video
        } else {
            RTPCodecType::Unspecified
        }
    }
}

/// A codec capability bound to a negotiated payload type.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RTCRtpCodecParameters {
    pub capability: RTCRtpCodecCapability,
    pub payload_type: u8,
}

/// Whether two capabilities describe the same codec, ignoring feedback.
pub(crate) fn codecs_match(a: &RTCRtpCodecCapability, b: &RTCRtpCodecCapability) -> bool {
    a.mime_type.eq_ignore_ascii_case(&b.mime_type)
        && a.clock_rate == b.clock_rate
        && (a.channels == b.channels || a.channels == 0 || b.channels == 0)
}

pub mod mime {
    pub const MIME_TYPE_OPUS: &str = "audio/opus";
    pub const MIME_TYPE_G722: &str = "audio/G722";
    pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
    pub const MIME_TYPE_PCMA: &str = "audio/PCMA";
    pub const MIME_TYPE_VP8: &str = "video/VP8";
    pub const MIME_TYPE_VP9: &str = "video/VP9";
    pub const MIME_TYPE_H264: &str = "video/H264";
    pub const MIME_TYPE_H265: &str = "video/H265";
    pub const MIME_TYPE_AV1: &str = "video/AV1";
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_codec_name_and_kind() {
        let codec = RTCRtpCodecCapability {
            mime_type: mime::MIME_TYPE_VP8.to_string(),
            clock_rate: 90000,
            ..Default::default()
        };
        assert_eq!(codec.name(), "VP8");
        assert_eq!(codec.kind(), RTPCodecType::Video);

        let codec = RTCRtpCodecCapability {
            mime_type: mime::MIME_TYPE_OPUS.to_string(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        };
        assert_eq!(codec.name(), "opus");
        assert_eq!(codec.kind(), RTPCodecType::Audio);
    }

    #[test]
    fn test_codecs_match_is_case_insensitive() {
        let a = RTCRtpCodecCapability {
            mime_type: "video/vp8".to_string(),
            clock_rate: 90000,
            ..Default::default()
        };
        let b = RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            ..Default::default()
        };
        assert!(codecs_match(&a, &b));
    }
}
