//! NACK Responder - retransmits sent packets the peer reports missing.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use log::trace;

use super::send_buffer::SendBuffer;
use super::stream_supports_nack;
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use shared::error::Result;
use shared::TransportContext;

/// Builder for [`NackResponderInterceptor`].
pub struct NackResponderBuilder {
    size: u16,
}

impl Default for NackResponderBuilder {
    fn default() -> Self {
        Self { size: 1024 }
    }
}

impl NackResponderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the history ring per stream; must be a power of 2 up to 32768.
    pub fn with_size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> NackResponderInterceptor<P> {
        move |inner| NackResponderInterceptor {
            inner,
            size: self.size,
            send_buffers: HashMap::new(),
            write_queue: VecDeque::new(),
        }
    }
}

/// Keeps a history of sent packets per local stream and answers inbound
/// NACKs by retransmitting from the history.
pub struct NackResponderInterceptor<P> {
    inner: P,
    size: u16,
    send_buffers: HashMap<u32, SendBuffer>,
    write_queue: VecDeque<TaggedPacket>,
}

impl<P> NackResponderInterceptor<P> {
    fn resend_packets(&mut self, now: Instant, nack: &TransportLayerNack) {
        let Some(buffer) = self.send_buffers.get(&nack.media_ssrc) else {
            return;
        };

        for pair in &nack.nacks {
            for seq in pair.packet_list() {
                if let Some(packet) = buffer.get(seq) {
                    trace!("nack responder: retransmitting seq {}", seq);
                    self.write_queue.push_back(TaggedPacket {
                        now,
                        transport: TransportContext::default(),
                        message: Packet::Rtp(packet.clone()),
                    });
                }
            }
        }
    }
}

impl<P: Interceptor> Interceptor for NackResponderInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtcp(ref packets) = msg.message {
            let now = msg.now;
            let nacks: Vec<TransportLayerNack> = packets
                .iter()
                .filter_map(|p| p.as_any().downcast_ref::<TransportLayerNack>().cloned())
                .collect();
            for nack in &nacks {
                self.resend_packets(now, nack);
            }
        }

        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            if let Some(buffer) = self.send_buffers.get_mut(&rtp_packet.header.ssrc) {
                buffer.add(rtp_packet.clone());
            }
        }

        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<TaggedPacket> {
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        self.inner.poll_write()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.inner.poll_timeout()
    }

    fn bind_local_stream(&mut self, info: &StreamInfo) {
        if stream_supports_nack(info) {
            if let Some(buffer) = SendBuffer::new(self.size) {
                self.send_buffers.insert(info.ssrc, buffer);
            }
        }
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.send_buffers.remove(&info.ssrc);
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }

    fn close(&mut self) -> Result<()> {
        self.write_queue.clear();
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_info::RTCPFeedback;
    use crate::Registry;
    use rtcp::transport_feedbacks::transport_layer_nack::NackPair;

    fn nack_stream_info(ssrc: u32) -> StreamInfo {
        StreamInfo {
            ssrc,
            clock_rate: 90000,
            rtcp_feedback: vec![RTCPFeedback {
                typ: "nack".to_string(),
                parameter: "".to_string(),
            }],
            ..Default::default()
        }
    }

    fn rtp_write(ssrc: u32, seq: u16) -> TaggedPacket {
        TaggedPacket {
            now: Instant::now(),
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header: rtp::header::Header {
                    ssrc,
                    sequence_number: seq,
                    ..Default::default()
                },
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_responder_retransmits_nacked_packets() {
        let mut chain = Registry::new()
            .with(NackResponderBuilder::new().with_size(8).build())
            .build();

        chain.bind_local_stream(&nack_stream_info(7777));

        for seq in 0..4u16 {
            chain.handle_write(rtp_write(7777, seq)).unwrap();
        }
        // drain the writes that passed through
        while chain.poll_write().is_some() {}

        let nack = TransportLayerNack {
            sender_ssrc: 1,
            media_ssrc: 7777,
            nacks: vec![NackPair {
                packet_id: 1,
                lost_packets: 0b1, // 1 and 2
            }],
        };
        chain
            .handle_read(TaggedPacket {
                now: Instant::now(),
                transport: Default::default(),
                message: Packet::Rtcp(vec![Box::new(nack)]),
            })
            .unwrap();

        let mut resent = vec![];
        while let Some(pkt) = chain.poll_write() {
            if let Packet::Rtp(p) = pkt.message {
                resent.push(p.header.sequence_number);
            }
        }
        assert_eq!(resent, vec![1, 2]);
    }

    #[test]
    fn test_responder_ignores_unknown_ssrc() {
        let mut chain = Registry::new()
            .with(NackResponderBuilder::new().with_size(8).build())
            .build();

        let nack = TransportLayerNack {
            sender_ssrc: 1,
            media_ssrc: 9999,
            nacks: vec![NackPair::new(5)],
        };
        chain
            .handle_read(TaggedPacket {
                now: Instant::now(),
                transport: Default::default(),
                message: Packet::Rtcp(vec![Box::new(nack)]),
            })
            .unwrap();

        // only the original RTCP passes through, nothing is queued for resend
        assert!(chain.poll_write().is_none());
    }
}
