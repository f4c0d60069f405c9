//! NACK Generator - requests retransmission of missing inbound packets.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::trace;

use super::receive_log::ReceiveLog;
use super::stream_supports_nack;
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};
use shared::error::Result;
use shared::TransportContext;

/// Builder for [`NackGeneratorInterceptor`].
pub struct NackGeneratorBuilder {
    size: u16,
    interval: Duration,
    skip_last_n: u16,
}

impl Default for NackGeneratorBuilder {
    fn default() -> Self {
        Self {
            size: 512,
            interval: Duration::from_millis(100),
            skip_last_n: 0,
        }
    }
}

impl NackGeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the receive log; must be a power of 2 between 64 and 32768.
    pub fn with_size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    /// Interval between NACK generation cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Number of most recent packets to exclude from NACKs, leaving room
    /// for ordinary reordering to resolve itself.
    pub fn with_skip_last_n(mut self, skip_last_n: u16) -> Self {
        self.skip_last_n = skip_last_n;
        self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> NackGeneratorInterceptor<P> {
        move |inner| NackGeneratorInterceptor {
            inner,
            size: self.size,
            interval: self.interval,
            skip_last_n: self.skip_last_n,
            eto: None,
            sender_ssrc: rand::random(),
            receive_logs: HashMap::new(),
            write_queue: VecDeque::new(),
        }
    }
}

/// Tracks inbound sequence numbers per remote stream and periodically emits
/// RTCP TransportLayerNack packets for the gaps.
pub struct NackGeneratorInterceptor<P> {
    inner: P,

    size: u16,
    interval: Duration,
    skip_last_n: u16,

    /// Next NACK generation deadline; armed on the first timeout poll.
    eto: Option<Instant>,
    sender_ssrc: u32,
    receive_logs: HashMap<u32, ReceiveLog>,
    write_queue: VecDeque<TaggedPacket>,
}

impl<P> NackGeneratorInterceptor<P> {
    fn generate_nacks(&mut self, now: Instant) {
        for (&ssrc, receive_log) in &self.receive_logs {
            let missing = receive_log.missing_seq_numbers(self.skip_last_n);
            if missing.is_empty() {
                continue;
            }

            trace!("nack generator: {} missing from ssrc {:x}", missing.len(), ssrc);
            let nack = TransportLayerNack {
                sender_ssrc: self.sender_ssrc,
                media_ssrc: ssrc,
                nacks: nack_pairs_from_sequence_numbers(&missing),
            };

            self.write_queue.push_back(TaggedPacket {
                now,
                transport: TransportContext::default(),
                message: Packet::Rtcp(vec![Box::new(nack)]),
            });
        }
    }
}

impl<P: Interceptor> Interceptor for NackGeneratorInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            if let Some(receive_log) = self.receive_logs.get_mut(&rtp_packet.header.ssrc) {
                receive_log.add(rtp_packet.header.sequence_number);
            }
        }

        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<TaggedPacket> {
        // drain generated NACKs first
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        self.inner.poll_write()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        match self.eto {
            Some(eto) if eto <= now => {
                self.eto = Some(now + self.interval);
                self.generate_nacks(now);
            }
            None => {
                self.eto = Some(now + self.interval);
            }
            _ => {}
        }

        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        match (self.eto, self.inner.poll_timeout()) {
            (Some(a), Some(b)) => Some(std::cmp::min(a, b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        if stream_supports_nack(info) {
            if let Some(receive_log) = ReceiveLog::new(self.size) {
                self.receive_logs.insert(info.ssrc, receive_log);
            }
        }
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.receive_logs.remove(&info.ssrc);
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

    fn make_rtp_packet(ssrc: u32, seq: u16) -> TaggedPacket {
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

    #[test]
    fn test_no_nack_without_binding() {
        let mut chain = Registry::new()
            .with(NackGeneratorBuilder::new().build())
            .build();

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();
        chain.handle_read(make_rtp_packet(12345, 0)).unwrap();
        chain.handle_read(make_rtp_packet(12345, 2)).unwrap(); // gap at 1
        chain.handle_timeout(base + Duration::from_millis(200)).unwrap();

        assert!(chain.poll_write().is_none());
    }

    #[test]
    fn test_generates_nack_for_gap() {
        let mut chain = Registry::new()
            .with(NackGeneratorBuilder::new().with_size(64).build())
            .build();

        chain.bind_remote_stream(&nack_stream_info(12345));

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();
        chain.handle_read(make_rtp_packet(12345, 10)).unwrap();
        chain.handle_read(make_rtp_packet(12345, 12)).unwrap(); // gap at 11
        chain.poll_read();
        chain.poll_read();

        chain
            .handle_timeout(base + Duration::from_millis(200))
            .unwrap();

        let tagged = chain.poll_write().expect("NACK should be generated");
        let Packet::Rtcp(packets) = tagged.message else {
            panic!("expected RTCP");
        };
        let nack = packets[0]
            .as_any()
            .downcast_ref::<TransportLayerNack>()
            .expect("expected TransportLayerNack");
        assert_eq!(nack.media_ssrc, 12345);
        assert_eq!(nack.nacks[0].packet_list(), vec![11]);
    }

    #[test]
    fn test_no_nack_without_feedback_support() {
        let mut chain = Registry::new()
            .with(NackGeneratorBuilder::new().with_size(64).build())
            .build();

        // no `nack` feedback negotiated
        let info = StreamInfo {
            ssrc: 12345,
            clock_rate: 90000,
            ..Default::default()
        };
        chain.bind_remote_stream(&info);

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();
        chain.handle_read(make_rtp_packet(12345, 10)).unwrap();
        chain.handle_read(make_rtp_packet(12345, 12)).unwrap();
        chain
            .handle_timeout(base + Duration::from_millis(200))
            .unwrap();

        assert!(chain.poll_write().is_none());
    }

    #[test]
    fn test_unbind_removes_stream() {
        let mut chain = Registry::new()
            .with(NackGeneratorBuilder::new().with_size(64).build())
            .build();

        let info = nack_stream_info(12345);
        chain.bind_remote_stream(&info);
        assert!(chain.receive_logs.contains_key(&12345));

        chain.unbind_remote_stream(&info);
        assert!(!chain.receive_logs.contains_key(&12345));
    }
}
