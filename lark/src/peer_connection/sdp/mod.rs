//! The minimal SDP surface the connection needs: media sections with the
//! mid/rtpmap/fmtp/rtcp-fb/extmap/msid/ssrc/setup/ice-/fingerprint/sctp-port
//! semantics of RFC 8866 + RFC 8829. Everything else in a description is
//! carried opaquely and ignored.

pub mod sdp_type;
pub mod session_description;

use std::fmt::Write as _;

use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};
use interceptor::stream_info::RTCPFeedback;
use shared::error::{Error, Result};

pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";
pub(crate) const SDP_PROTO_MEDIA: &str = "UDP/TLS/RTP/SAVPF";
pub(crate) const SDP_PROTO_APPLICATION: &str = "UDP/DTLS/SCTP";

/// One parsed m= section.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct MediaDescription {
    /// "audio", "video" or "application"
    pub(crate) kind: String,
    pub(crate) mid: String,
    pub(crate) direction: RTCRtpTransceiverDirection,
    pub(crate) codecs: Vec<RTCRtpCodecParameters>,
    /// (id, uri) pairs from a=extmap
    pub(crate) extmaps: Vec<(u16, String)>,
    pub(crate) ssrcs: Vec<u32>,
    /// "streamid trackid" from a=msid
    pub(crate) msid: Option<String>,
    /// simulcast layer ids from a=rid lines
    pub(crate) rids: Vec<String>,
    pub(crate) sctp_port: Option<u16>,
    pub(crate) max_message_size: Option<u32>,
    /// "actpass", "active" or "passive"
    pub(crate) setup: Option<String>,
    pub(crate) ice_ufrag: Option<String>,
    pub(crate) ice_pwd: Option<String>,
    /// "sha-256 AB:CD:..."
    pub(crate) fingerprint: Option<String>,
}

/// A parsed session description, reduced to what negotiation needs.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct SessionSdp {
    pub(crate) session_id: u64,
    pub(crate) media: Vec<MediaDescription>,
}

impl SessionSdp {
    pub(crate) fn find_by_mid(&self, mid: &str) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.mid == mid)
    }

    /// Serializes the session into SDP text.
    pub(crate) fn marshal(&self) -> String {
        let mut out = String::new();
        out += "v=0\r\n";
        let _ = write!(out, "o=- {} 2 IN IP4 127.0.0.1\r\n", self.session_id);
        out += "s=-\r\n";
        out += "t=0 0\r\n";

        if !self.media.is_empty() {
            let mids: Vec<&str> = self.media.iter().map(|m| m.mid.as_str()).collect();
            let _ = write!(out, "a=group:BUNDLE {}\r\n", mids.join(" "));
        }

        for media in &self.media {
            if media.kind == MEDIA_SECTION_APPLICATION {
                let _ = write!(
                    out,
                    "m={} 9 {} webrtc-datachannel\r\n",
                    media.kind, SDP_PROTO_APPLICATION
                );
            } else {
                let pts: Vec<String> = media
                    .codecs
                    .iter()
                    .map(|c| c.payload_type.to_string())
                    .collect();
                let _ = write!(
                    out,
                    "m={} 9 {} {}\r\n",
                    media.kind,
                    SDP_PROTO_MEDIA,
                    pts.join(" ")
                );
            }
            out += "c=IN IP4 0.0.0.0\r\n";
            let _ = write!(out, "a=mid:{}\r\n", media.mid);

            if let Some(ufrag) = &media.ice_ufrag {
                let _ = write!(out, "a=ice-ufrag:{ufrag}\r\n");
            }
            if let Some(pwd) = &media.ice_pwd {
                let _ = write!(out, "a=ice-pwd:{pwd}\r\n");
            }
            if let Some(fingerprint) = &media.fingerprint {
                let _ = write!(out, "a=fingerprint:{fingerprint}\r\n");
            }
            if let Some(setup) = &media.setup {
                let _ = write!(out, "a=setup:{setup}\r\n");
            }

            if media.kind == MEDIA_SECTION_APPLICATION {
                if let Some(port) = media.sctp_port {
                    let _ = write!(out, "a=sctp-port:{port}\r\n");
                }
                if let Some(size) = media.max_message_size {
                    let _ = write!(out, "a=max-message-size:{size}\r\n");
                }
                continue;
            }

            out += "a=rtcp-mux\r\n";
            if media.direction != RTCRtpTransceiverDirection::Unspecified {
                let _ = write!(out, "a={}\r\n", media.direction);
            }

            for (id, uri) in &media.extmaps {
                let _ = write!(out, "a=extmap:{id} {uri}\r\n");
            }

            for codec in &media.codecs {
                let channels = if codec.capability.channels > 0 {
                    format!("/{}", codec.capability.channels)
                } else {
                    String::new()
                };
                let _ = write!(
                    out,
                    "a=rtpmap:{} {}/{}{}\r\n",
                    codec.payload_type,
                    codec.capability.name(),
                    codec.capability.clock_rate,
                    channels
                );
                if !codec.capability.sdp_fmtp_line.is_empty() {
                    let _ = write!(
                        out,
                        "a=fmtp:{} {}\r\n",
                        codec.payload_type, codec.capability.sdp_fmtp_line
                    );
                }
                for fb in &codec.capability.rtcp_feedback {
                    if fb.parameter.is_empty() {
                        let _ = write!(out, "a=rtcp-fb:{} {}\r\n", codec.payload_type, fb.typ);
                    } else {
                        let _ = write!(
                            out,
                            "a=rtcp-fb:{} {} {}\r\n",
                            codec.payload_type, fb.typ, fb.parameter
                        );
                    }
                }
            }

            for rid in &media.rids {
                let _ = write!(out, "a=rid:{rid} recv\r\n");
            }

            if let Some(msid) = &media.msid {
                let _ = write!(out, "a=msid:{msid}\r\n");
            }
            for ssrc in &media.ssrcs {
                let _ = write!(out, "a=ssrc:{ssrc} cname:lark\r\n");
            }
        }

        out
    }

    /// Parses SDP text, keeping only the attributes negotiation consumes.
    pub(crate) fn unmarshal(raw: &str) -> Result<SessionSdp> {
        let mut session = SessionSdp::default();
        let mut current: Option<MediaDescription> = None;

        for line in raw.lines() {
            let line = line.trim_end();
            if line.len() < 2 {
                continue;
            }

            if let Some(rest) = line.strip_prefix("o=") {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.len() >= 2 {
                    session.session_id = fields[1].parse().unwrap_or(0);
                }
            } else if let Some(rest) = line.strip_prefix("m=") {
                if let Some(media) = current.take() {
                    session.media.push(media);
                }
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.is_empty() {
                    return Err(Error::ErrSessionDescriptionMalformed(line.to_string()));
                }
                let mut media = MediaDescription {
                    kind: fields[0].to_string(),
                    ..Default::default()
                };
                // remember the announced payload types so rtpmap lines can
                // be validated against them
                if media.kind != MEDIA_SECTION_APPLICATION {
                    for pt in &fields[3..] {
                        if let Ok(pt) = pt.parse::<u8>() {
                            media.codecs.push(RTCRtpCodecParameters {
                                payload_type: pt,
                                ..Default::default()
                            });
                        }
                    }
                }
                current = Some(media);
            } else if let Some(rest) = line.strip_prefix("a=") {
                let media = match current.as_mut() {
                    Some(m) => m,
                    None => continue, // session level attribute
                };

                if let Some(v) = rest.strip_prefix("mid:") {
                    media.mid = v.to_string();
                } else if let Some(v) = rest.strip_prefix("rtpmap:") {
                    parse_rtpmap(media, v)?;
                } else if let Some(v) = rest.strip_prefix("fmtp:") {
                    parse_fmtp(media, v);
                } else if let Some(v) = rest.strip_prefix("rtcp-fb:") {
                    parse_rtcp_fb(media, v);
                } else if let Some(v) = rest.strip_prefix("extmap:") {
                    if let Some((id, uri)) = v.split_once(' ') {
                        if let Ok(id) = id.parse::<u16>() {
                            media.extmaps.push((id, uri.to_string()));
                        }
                    }
                } else if let Some(v) = rest.strip_prefix("msid:") {
                    media.msid = Some(v.to_string());
                } else if let Some(v) = rest.strip_prefix("ssrc:") {
                    if let Some(ssrc) = v.split_whitespace().next() {
                        if let Ok(ssrc) = ssrc.parse::<u32>() {
                            if !media.ssrcs.contains(&ssrc) {
                                media.ssrcs.push(ssrc);
                            }
                        }
                    }
                } else if let Some(v) = rest.strip_prefix("rid:") {
                    if let Some((rid, _)) = v.split_once(' ') {
                        media.rids.push(rid.to_string());
                    } else {
                        media.rids.push(v.to_string());
                    }
                } else if let Some(v) = rest.strip_prefix("setup:") {
                    media.setup = Some(v.to_string());
                } else if let Some(v) = rest.strip_prefix("ice-ufrag:") {
                    media.ice_ufrag = Some(v.to_string());
                } else if let Some(v) = rest.strip_prefix("ice-pwd:") {
                    media.ice_pwd = Some(v.to_string());
                } else if let Some(v) = rest.strip_prefix("fingerprint:") {
                    media.fingerprint = Some(v.to_string());
                } else if let Some(v) = rest.strip_prefix("sctp-port:") {
                    media.sctp_port = v.parse().ok();
                } else if let Some(v) = rest.strip_prefix("max-message-size:") {
                    media.max_message_size = v.parse().ok();
                } else if rest == "sendrecv" || rest == "sendonly" || rest == "recvonly"
                    || rest == "inactive"
                {
                    media.direction = RTCRtpTransceiverDirection::from(rest);
                }
            }
        }

        if let Some(media) = current.take() {
            session.media.push(media);
        }

        // duplicate mids are a protocol violation
        for i in 0..session.media.len() {
            for j in i + 1..session.media.len() {
                if session.media[i].mid == session.media[j].mid {
                    return Err(Error::ErrDuplicateMid);
                }
            }
        }

        Ok(session)
    }
}

fn parse_rtpmap(media: &mut MediaDescription, v: &str) -> Result<()> {
    // "96 VP8/90000" or "111 opus/48000/2"
    let (pt, encoding) = v
        .split_once(' ')
        .ok_or_else(|| Error::ErrSessionDescriptionMalformed(v.to_string()))?;
    let pt: u8 = pt
        .parse()
        .map_err(|_| Error::ErrSessionDescriptionMalformed(v.to_string()))?;

    let parts: Vec<&str> = encoding.split('/').collect();
    if parts.len() < 2 {
        return Err(Error::ErrSessionDescriptionMalformed(v.to_string()));
    }
    let name = parts[0];
    let clock_rate: u32 = parts[1]
        .parse()
        .map_err(|_| Error::ErrSessionDescriptionMalformed(v.to_string()))?;
    let channels: u16 = if parts.len() > 2 {
        parts[2].parse().unwrap_or(0)
    } else {
        0
    };

    let mime_type = format!("{}/{}", media.kind, name);
    if let Some(codec) = media.codecs.iter_mut().find(|c| c.payload_type == pt) {
        codec.capability.mime_type = mime_type;
        codec.capability.clock_rate = clock_rate;
        codec.capability.channels = channels;
    } else {
        media.codecs.push(RTCRtpCodecParameters {
            payload_type: pt,
            capability: RTCRtpCodecCapability {
                mime_type,
                clock_rate,
                channels,
                ..Default::default()
            },
        });
    }
    Ok(())
}

fn parse_fmtp(media: &mut MediaDescription, v: &str) {
    if let Some((pt, line)) = v.split_once(' ') {
        if let Ok(pt) = pt.parse::<u8>() {
            if let Some(codec) = media.codecs.iter_mut().find(|c| c.payload_type == pt) {
                codec.capability.sdp_fmtp_line = line.to_string();
            }
        }
    }
}

fn parse_rtcp_fb(media: &mut MediaDescription, v: &str) {
    let mut fields = v.splitn(2, ' ');
    let Some(pt) = fields.next().and_then(|p| p.parse::<u8>().ok()) else {
        return;
    };
    let Some(fb) = fields.next() else {
        return;
    };
    let (typ, parameter) = match fb.split_once(' ') {
        Some((t, p)) => (t.to_string(), p.to_string()),
        None => (fb.to_string(), String::new()),
    };
    if let Some(codec) = media.codecs.iter_mut().find(|c| c.payload_type == pt) {
        codec.capability.rtcp_feedback.push(RTCPFeedback { typ, parameter });
    }
}

#[cfg(test)]
mod sdp_test {
    use super::*;
    use crate::rtp_transceiver::rtp_codec::mime;

    fn vp8_section() -> MediaDescription {
        MediaDescription {
            kind: "video".to_string(),
            mid: "0".to_string(),
            direction: RTCRtpTransceiverDirection::Sendrecv,
            codecs: vec![RTCRtpCodecParameters {
                payload_type: 96,
                capability: RTCRtpCodecCapability {
                    mime_type: mime::MIME_TYPE_VP8.to_string(),
                    clock_rate: 90000,
                    rtcp_feedback: vec![RTCPFeedback {
                        typ: "nack".to_string(),
                        parameter: "pli".to_string(),
                    }],
                    ..Default::default()
                },
            }],
            extmaps: vec![(3, "http://example.com/twcc".to_string())],
            ssrcs: vec![0xcafe],
            msid: Some("stream track".to_string()),
            setup: Some("actpass".to_string()),
            ice_ufrag: Some("someufrag".to_string()),
            ice_pwd: Some("somepwdsomepwdsomepwd0".to_string()),
            fingerprint: Some("sha-256 AA:BB".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sdp_roundtrip_media_section() {
        let session = SessionSdp {
            session_id: 42,
            media: vec![vp8_section()],
        };

        let text = session.marshal();
        let parsed = SessionSdp::unmarshal(&text).unwrap();

        assert_eq!(parsed.session_id, 42);
        assert_eq!(parsed.media.len(), 1);
        let m = &parsed.media[0];
        assert_eq!(m.kind, "video");
        assert_eq!(m.mid, "0");
        assert_eq!(m.direction, RTCRtpTransceiverDirection::Sendrecv);
        assert_eq!(m.codecs.len(), 1);
        assert_eq!(m.codecs[0].payload_type, 96);
        assert_eq!(m.codecs[0].capability.mime_type, "video/VP8");
        assert_eq!(m.codecs[0].capability.clock_rate, 90000);
        assert_eq!(m.codecs[0].capability.rtcp_feedback.len(), 1);
        assert_eq!(m.extmaps, vec![(3, "http://example.com/twcc".to_string())]);
        assert_eq!(m.ssrcs, vec![0xcafe]);
        assert_eq!(m.setup.as_deref(), Some("actpass"));
        assert_eq!(m.ice_ufrag.as_deref(), Some("someufrag"));
    }

    #[test]
    fn test_sdp_roundtrip_application_section() {
        let session = SessionSdp {
            session_id: 1,
            media: vec![MediaDescription {
                kind: MEDIA_SECTION_APPLICATION.to_string(),
                mid: "2".to_string(),
                sctp_port: Some(5000),
                max_message_size: Some(262144),
                setup: Some("active".to_string()),
                ..Default::default()
            }],
        };

        let text = session.marshal();
        assert!(text.contains("m=application 9 UDP/DTLS/SCTP webrtc-datachannel"));

        let parsed = SessionSdp::unmarshal(&text).unwrap();
        let m = &parsed.media[0];
        assert_eq!(m.sctp_port, Some(5000));
        assert_eq!(m.max_message_size, Some(262144));
        assert_eq!(m.setup.as_deref(), Some("active"));
    }

    #[test]
    fn test_sdp_duplicate_mid_rejected() {
        let session = SessionSdp {
            session_id: 1,
            media: vec![
                MediaDescription {
                    kind: "audio".to_string(),
                    mid: "0".to_string(),
                    ..Default::default()
                },
                MediaDescription {
                    kind: "video".to_string(),
                    mid: "0".to_string(),
                    ..Default::default()
                },
            ],
        };

        let text = session.marshal();
        assert_eq!(SessionSdp::unmarshal(&text), Err(Error::ErrDuplicateMid));
    }

    #[test]
    fn test_sdp_opus_channels() {
        let sdp = "v=0\r\no=- 7 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
                   m=audio 9 UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\na=mid:0\r\n\
                   a=rtpmap:111 opus/48000/2\r\na=sendrecv\r\n";
        let parsed = SessionSdp::unmarshal(sdp).unwrap();
        let codec = &parsed.media[0].codecs[0];
        assert_eq!(codec.capability.mime_type, "audio/opus");
        assert_eq!(codec.capability.channels, 2);
    }
}
