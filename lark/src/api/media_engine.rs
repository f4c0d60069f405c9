use crate::rtp_transceiver::rtp_codec::{
    codecs_match, mime, RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use interceptor::stream_info::{RTCPFeedback, RTPHeaderExtension};
use interceptor::twcc::TRANSPORT_CC_URI;
use shared::error::{Error, Result};

pub const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
pub const SDES_RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";

/// MediaEngine holds the codecs and header extensions this connection is
/// willing to negotiate. The registration table is immutable once the
/// connection is constructed; build a new API object to change it.
#[derive(Default, Debug, Clone)]
pub struct MediaEngine {
    audio_codecs: Vec<RTCRtpCodecParameters>,
    video_codecs: Vec<RTCRtpCodecParameters>,
    header_extensions: Vec<RTPHeaderExtension>,
}

impl MediaEngine {
    /// Registers the default codec set: Opus/G722/PCMU/PCMA for audio,
    /// VP8/VP9/H264/H265/AV1 for video with the standard feedback set.
    pub fn register_default_codecs(&mut self) -> Result<()> {
        for codec in [
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_G722.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 9,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_PCMU.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 0,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_PCMA.to_owned(),
                    clock_rate: 8000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 8,
            },
        ] {
            self.register_codec(codec, RTPCodecType::Audio)?;
        }

        let video_rtcp_feedback = vec![
            RTCPFeedback {
                typ: "goog-remb".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "ccm".to_owned(),
                parameter: "fir".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "".to_owned(),
            },
            RTCPFeedback {
                typ: "nack".to_owned(),
                parameter: "pli".to_owned(),
            },
            RTCPFeedback {
                typ: "transport-cc".to_owned(),
                parameter: "".to_owned(),
            },
        ];

        for codec in [
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: video_rtcp_feedback.clone(),
                },
                payload_type: 96,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_VP9.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "profile-id=0".to_owned(),
                    rtcp_feedback: video_rtcp_feedback.clone(),
                },
                payload_type: 98,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_H264.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f"
                            .to_owned(),
                    rtcp_feedback: video_rtcp_feedback.clone(),
                },
                payload_type: 102,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_H265.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: video_rtcp_feedback.clone(),
                },
                payload_type: 104,
            },
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_AV1.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "".to_owned(),
                    rtcp_feedback: video_rtcp_feedback.clone(),
                },
                payload_type: 45,
            },
        ] {
            self.register_codec(codec, RTPCodecType::Video)?;
        }

        Ok(())
    }

    /// Adds a codec to the engine; duplicate payload types are rejected.
    pub fn register_codec(
        &mut self,
        codec: RTCRtpCodecParameters,
        typ: RTPCodecType,
    ) -> Result<()> {
        let list = match typ {
            RTPCodecType::Audio => &mut self.audio_codecs,
            RTPCodecType::Video => &mut self.video_codecs,
            RTPCodecType::Unspecified => return Err(Error::ErrCodecNotFound),
        };
        if list.iter().any(|c| c.payload_type == codec.payload_type) {
            return Err(Error::ErrExistingTrack);
        }
        list.push(codec);
        Ok(())
    }

    /// Registers the default header extension set (mid, rid, transport-cc).
    pub fn register_default_header_extensions(&mut self) -> Result<()> {
        for (id, uri) in [
            (3u16, TRANSPORT_CC_URI),
            (4, SDES_MID_URI),
            (5, SDES_RTP_STREAM_ID_URI),
        ] {
            self.register_header_extension(RTPHeaderExtension {
                id,
                uri: uri.to_owned(),
            })?;
        }
        Ok(())
    }

    pub fn register_header_extension(&mut self, extension: RTPHeaderExtension) -> Result<()> {
        if self
            .header_extensions
            .iter()
            .any(|e| e.id == extension.id || e.uri == extension.uri)
        {
            return Err(Error::ErrExistingTrack);
        }
        self.header_extensions.push(extension);
        Ok(())
    }

    pub fn codecs(&self, typ: RTPCodecType) -> &[RTCRtpCodecParameters] {
        match typ {
            RTPCodecType::Audio => &self.audio_codecs,
            RTPCodecType::Video => &self.video_codecs,
            RTPCodecType::Unspecified => &[],
        }
    }

    pub fn header_extensions(&self) -> &[RTPHeaderExtension] {
        &self.header_extensions
    }

    pub(crate) fn header_extension_id(&self, uri: &str) -> Option<u16> {
        self.header_extensions
            .iter()
            .find(|e| e.uri == uri)
            .map(|e| e.id)
    }

    /// Finds the locally registered codec matching a capability offered by
    /// the remote.
    pub(crate) fn match_remote_codec(
        &self,
        remote: &RTCRtpCodecCapability,
        typ: RTPCodecType,
    ) -> Option<&RTCRtpCodecParameters> {
        self.codecs(typ)
            .iter()
            .find(|local| codecs_match(&local.capability, remote))
    }

    pub(crate) fn find_codec_by_payload_type(
        &self,
        payload_type: u8,
    ) -> Option<&RTCRtpCodecParameters> {
        self.audio_codecs
            .iter()
            .chain(self.video_codecs.iter())
            .find(|c| c.payload_type == payload_type)
    }

    pub(crate) fn find_codec_by_mime_type(
        &self,
        mime_type: &str,
    ) -> Option<&RTCRtpCodecParameters> {
        self.audio_codecs
            .iter()
            .chain(self.video_codecs.iter())
            .find(|c| c.capability.mime_type.eq_ignore_ascii_case(mime_type))
    }
}

#[cfg(test)]
mod media_engine_test {
    use super::*;

    #[test]
    fn test_register_default_codecs() {
        let mut engine = MediaEngine::default();
        engine.register_default_codecs().unwrap();

        assert!(!engine.codecs(RTPCodecType::Audio).is_empty());
        assert!(!engine.codecs(RTPCodecType::Video).is_empty());
        assert!(engine.find_codec_by_mime_type("audio/opus").is_some());
        assert!(engine.find_codec_by_mime_type("video/VP8").is_some());
        assert_eq!(
            engine.find_codec_by_payload_type(111).unwrap().capability.mime_type,
            "audio/opus"
        );
    }

    #[test]
    fn test_register_duplicate_payload_type_rejected() {
        let mut engine = MediaEngine::default();
        engine.register_default_codecs().unwrap();
        let dup = RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: "video/duplicate".to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            payload_type: 96,
        };
        assert!(engine.register_codec(dup, RTPCodecType::Video).is_err());
    }

    #[test]
    fn test_match_remote_codec_fuzzy() {
        let mut engine = MediaEngine::default();
        engine.register_default_codecs().unwrap();

        // the remote offers VP8 under a different payload type
        let remote = RTCRtpCodecCapability {
            mime_type: "video/vp8".to_owned(),
            clock_rate: 90000,
            ..Default::default()
        };
        let local = engine
            .match_remote_codec(&remote, RTPCodecType::Video)
            .expect("VP8 must match");
        assert_eq!(local.payload_type, 96);
    }
}
