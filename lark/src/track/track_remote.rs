use std::collections::VecDeque;

use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};

/// Identifier of a remote track within its connection.
pub type TrackRemoteId = u32;

/// How many packets a remote track buffers before dropping the oldest.
const INGRESS_QUEUE_LIMIT: usize = 512;

/// An inbound media stream, materialized by the demuxer the first time an
/// unseen SSRC matches a transceiver's accepted codecs. The application
/// drains packets with [`read`](TrackRemote::read) and feeds them to a
/// sample builder.
#[derive(Debug)]
pub struct TrackRemote {
    pub(crate) id: TrackRemoteId,
    pub(crate) ssrc: u32,
    pub(crate) rid: Option<String>,
    pub(crate) kind: RTPCodecType,
    pub(crate) codec: RTCRtpCodecParameters,
    pub(crate) queue: VecDeque<rtp::Packet>,
    pub(crate) dropped: u64,
}

impl TrackRemote {
    pub(crate) fn new(
        id: TrackRemoteId,
        ssrc: u32,
        rid: Option<String>,
        kind: RTPCodecType,
        codec: RTCRtpCodecParameters,
    ) -> Self {
        TrackRemote {
            id,
            ssrc,
            rid,
            kind,
            codec,
            queue: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn id(&self) -> TrackRemoteId {
        self.id
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// The simulcast layer id (RID header extension), when present.
    pub fn rid(&self) -> Option<&str> {
        self.rid.as_deref()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn codec(&self) -> &RTCRtpCodecParameters {
        &self.codec
    }

    /// Packets dropped because the application did not keep up.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn push(&mut self, packet: rtp::Packet) {
        if self.queue.len() >= INGRESS_QUEUE_LIMIT {
            self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(packet);
    }

    /// Returns the next packet of this track, in arrival order.
    pub fn read(&mut self) -> Option<rtp::Packet> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod track_remote_test {
    use super::*;

    fn packet(seq: u16) -> rtp::Packet {
        rtp::Packet {
            header: rtp::header::Header {
                sequence_number: seq,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_track_remote_fifo() {
        let mut track = TrackRemote::new(
            0,
            1234,
            None,
            RTPCodecType::Video,
            RTCRtpCodecParameters::default(),
        );
        track.push(packet(1));
        track.push(packet(2));

        assert_eq!(track.read().unwrap().header.sequence_number, 1);
        assert_eq!(track.read().unwrap().header.sequence_number, 2);
        assert!(track.read().is_none());
    }

    #[test]
    fn test_track_remote_bounded_queue() {
        let mut track = TrackRemote::new(
            0,
            1234,
            None,
            RTPCodecType::Video,
            RTCRtpCodecParameters::default(),
        );
        for seq in 0..600u16 {
            track.push(packet(seq));
        }
        assert_eq!(track.queue.len(), INGRESS_QUEUE_LIMIT);
        assert!(track.dropped() > 0);
        // oldest packets were the ones dropped
        assert_eq!(track.read().unwrap().header.sequence_number, 600 - 512);
    }
}
