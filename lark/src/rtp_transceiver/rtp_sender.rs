use crate::peer_connection::RTCPeerConnection;
use crate::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;
use crate::rtp_transceiver::TransceiverId;
use crate::track::track_local::{TrackLocalStaticRTP, TrackLocalStaticSample};
use interceptor::Interceptor;
use media::Sample;
use shared::error::Result;

/// The track feeding a sender.
pub(crate) enum LocalTrack {
    Sample(TrackLocalStaticSample),
    Rtp(TrackLocalStaticRTP),
}

impl LocalTrack {
    pub(crate) fn ssrc(&self) -> u32 {
        match self {
            LocalTrack::Sample(t) => t.ssrc,
            LocalTrack::Rtp(t) => t.ssrc,
        }
    }

    pub(crate) fn mime_type(&self) -> &str {
        match self {
            LocalTrack::Sample(t) => &t.codec().mime_type,
            LocalTrack::Rtp(t) => &t.codec().mime_type,
        }
    }

    pub(crate) fn track_id(&self) -> &str {
        match self {
            LocalTrack::Sample(t) => t.id(),
            LocalTrack::Rtp(t) => t.id(),
        }
    }

    pub(crate) fn stream_id(&self) -> &str {
        match self {
            LocalTrack::Sample(t) => t.stream_id(),
            LocalTrack::Rtp(t) => t.stream_id(),
        }
    }
}

/// Connection-owned sending state of one transceiver.
pub(crate) struct RTCRtpSenderInternal {
    pub(crate) track: LocalTrack,
    /// Codec chosen by negotiation; `None` until the first answer applies.
    pub(crate) negotiated_codec: Option<RTCRtpCodecParameters>,
    pub(crate) bound: bool,
}

impl RTCRtpSenderInternal {
    pub(crate) fn new(track: LocalTrack) -> Self {
        RTCRtpSenderInternal {
            track,
            negotiated_codec: None,
            bound: false,
        }
    }
}

/// A handle to the sending half of a transceiver.
pub struct RTCRtpSender<'a, I: Interceptor> {
    pub(crate) peer_connection: &'a mut RTCPeerConnection<I>,
    pub(crate) transceiver: TransceiverId,
}

impl<I: Interceptor> RTCRtpSender<'_, I> {
    /// Packetizes one sample onto the track's stream and submits the
    /// packets to the interceptor chain.
    pub fn write_sample(&mut self, sample: &Sample, now: std::time::Instant) -> Result<usize> {
        self.peer_connection
            .sender_write_sample(self.transceiver, sample, now)
    }

    /// Submits one pre-packetized RTP packet, rewritten onto the track.
    pub fn write_rtp(&mut self, packet: rtp::Packet, now: std::time::Instant) -> Result<()> {
        self.peer_connection
            .sender_write_rtp(self.transceiver, packet, now)
    }

    /// Replaces the sending track without renegotiating. The new track must
    /// carry the same codec kind.
    pub fn replace_track(&mut self, track: TrackLocalStaticSample) -> Result<()> {
        self.peer_connection
            .sender_replace_track(self.transceiver, track)
    }
}
