//! Records arrival times of TWCC-stamped packets and reports them back to
//! the sender as TransportLayerCc feedback.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::{TransportCcExtension, TRANSPORT_CC_URI};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::transport_feedbacks::transport_layer_cc::{
    PacketStatusChunk, RecvDelta, StatusVectorChunk, SymbolTypeTcc, TransportLayerCc,
    TYPE_TCC_DELTA_SCALE_FACTOR, TYPE_TCC_SYMBOL_SIZE_TWO_BIT,
};
use shared::error::Result;
use shared::TransportContext;

const DEFAULT_TWCC_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for [`TwccReceiverInterceptor`].
pub struct TwccReceiverBuilder {
    interval: Duration,
}

impl Default for TwccReceiverBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TWCC_INTERVAL,
        }
    }
}

impl TwccReceiverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> TwccReceiverInterceptor<P> {
        move |inner| TwccReceiverInterceptor {
            inner,
            interval: self.interval,
            eto: None,
            sender_ssrc: rand::random(),
            media_ssrc: 0,
            ext_id: None,
            recorder: Recorder::default(),
            write_queue: VecDeque::new(),
        }
    }
}

/// Accumulates (transport sequence, arrival) pairs between feedback rounds.
#[derive(Default, Debug)]
pub struct Recorder {
    arrivals: Vec<(u16, Instant)>,
    epoch: Option<Instant>,
    fb_pkt_count: u8,
}

impl Recorder {
    pub fn record(&mut self, seq: u16, now: Instant) {
        self.epoch.get_or_insert(now);
        self.arrivals.push((seq, now));
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }

    /// Builds one feedback packet covering everything recorded so far.
    pub fn build_feedback(
        &mut self,
        sender_ssrc: u32,
        media_ssrc: u32,
    ) -> Option<TransportLayerCc> {
        if self.arrivals.is_empty() {
            return None;
        }
        let epoch = self.epoch?;

        let mut arrivals = std::mem::take(&mut self.arrivals);
        arrivals.sort_by_key(|&(seq, _)| seq);
        arrivals.dedup_by_key(|&mut (seq, _)| seq);

        let base_seq = arrivals[0].0;
        let last_seq = arrivals[arrivals.len() - 1].0;
        let status_count = last_seq.wrapping_sub(base_seq).wrapping_add(1);

        // reference time in multiples of 64ms since the recorder epoch
        let first_arrival = arrivals[0].1;
        let reference_time_us =
            first_arrival.saturating_duration_since(epoch).as_micros() as i64;
        let reference_time = (reference_time_us / 64_000) as u32 & 0x00FF_FFFF;
        let mut prev_time_us = (reference_time as i64) * 64_000;

        let mut symbols = vec![];
        let mut recv_deltas = vec![];
        let mut arrival_iter = arrivals.iter().peekable();
        for offset in 0..status_count {
            let seq = base_seq.wrapping_add(offset);
            match arrival_iter.peek() {
                Some(&&(s, at)) if s == seq => {
                    arrival_iter.next();
                    let at_us = at.saturating_duration_since(epoch).as_micros() as i64;
                    let delta_us = at_us - prev_time_us;
                    let delta_ticks = delta_us / TYPE_TCC_DELTA_SCALE_FACTOR;
                    prev_time_us += delta_ticks * TYPE_TCC_DELTA_SCALE_FACTOR;

                    let symbol = if (0..=255).contains(&delta_ticks) {
                        SymbolTypeTcc::PacketReceivedSmallDelta
                    } else {
                        SymbolTypeTcc::PacketReceivedLargeDelta
                    };
                    symbols.push(symbol);
                    recv_deltas.push(RecvDelta {
                        type_tcc_packet: symbol,
                        delta: delta_ticks * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                }
                _ => symbols.push(SymbolTypeTcc::PacketNotReceived),
            }
        }

        // two-bit status vector chunks, seven symbols each
        let mut packet_chunks = vec![];
        for chunk_symbols in symbols.chunks(7) {
            let mut symbol_list = chunk_symbols.to_vec();
            while symbol_list.len() < 7 {
                symbol_list.push(SymbolTypeTcc::PacketNotReceived);
            }
            packet_chunks.push(PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                symbol_size: TYPE_TCC_SYMBOL_SIZE_TWO_BIT,
                symbol_list,
            }));
        }

        let fb_pkt_count = self.fb_pkt_count;
        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);

        Some(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number: base_seq,
            packet_status_count: status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}

/// Reads the TWCC extension off inbound packets and periodically emits
/// TransportLayerCc feedback with the observed arrival timings.
pub struct TwccReceiverInterceptor<P> {
    inner: P,
    interval: Duration,
    eto: Option<Instant>,
    sender_ssrc: u32,
    media_ssrc: u32,
    ext_id: Option<u8>,
    recorder: Recorder,
    write_queue: VecDeque<TaggedPacket>,
}

impl<P: Interceptor> Interceptor for TwccReceiverInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            if let Some(ext_id) = self.ext_id {
                if let Some(raw) = rtp_packet.header.get_extension(ext_id) {
                    if let Some(ext) = TransportCcExtension::unmarshal(&raw) {
                        self.media_ssrc = rtp_packet.header.ssrc;
                        self.recorder.record(ext.transport_sequence, msg.now);
                    }
                }
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
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        self.inner.poll_write()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        match self.eto {
            Some(eto) if eto <= now => {
                self.eto = Some(now + self.interval);
                if let Some(cc) = self
                    .recorder
                    .build_feedback(self.sender_ssrc, self.media_ssrc)
                {
                    self.write_queue.push_back(TaggedPacket {
                        now,
                        transport: TransportContext::default(),
                        message: Packet::Rtcp(vec![Box::new(cc)]),
                    });
                }
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
        if let Some(id) = info.header_extension_id(TRANSPORT_CC_URI) {
            self.ext_id = Some(id as u8);
        }
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
    use crate::stream_info::RTPHeaderExtension;
    use crate::Registry;

    fn stamped(ssrc: u32, ext_id: u8, twcc_seq: u16, now: Instant) -> TaggedPacket {
        let mut header = rtp::header::Header {
            ssrc,
            ..Default::default()
        };
        header
            .set_extension(
                ext_id,
                TransportCcExtension {
                    transport_sequence: twcc_seq,
                }
                .marshal(),
            )
            .unwrap();
        TaggedPacket {
            now,
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_receiver_builds_feedback() {
        let mut chain = Registry::new()
            .with(
                TwccReceiverBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_remote_stream(&StreamInfo {
            ssrc: 33,
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: TRANSPORT_CC_URI.to_string(),
                id: 5,
            }],
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();

        // seq 10 and 12 arrive, 11 is lost
        chain.handle_read(stamped(33, 5, 10, base)).unwrap();
        chain
            .handle_read(stamped(33, 5, 12, base + Duration::from_millis(5)))
            .unwrap();
        while chain.poll_read().is_some() {}

        chain
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();

        let tagged = chain.poll_write().expect("feedback should be generated");
        let Packet::Rtcp(packets) = tagged.message else {
            panic!("expected RTCP");
        };
        let cc = packets[0]
            .as_any()
            .downcast_ref::<TransportLayerCc>()
            .expect("expected TransportLayerCc");

        assert_eq!(cc.media_ssrc, 33);
        assert_eq!(cc.base_sequence_number, 10);
        assert_eq!(cc.packet_status_count, 3);
        assert_eq!(cc.recv_deltas.len(), 2, "two packets actually arrived");

        let symbols: Vec<SymbolTypeTcc> = cc
            .packet_chunks
            .iter()
            .flat_map(|c| c.symbols())
            .take(3)
            .collect();
        assert_eq!(symbols[0], SymbolTypeTcc::PacketReceivedSmallDelta);
        assert_eq!(symbols[1], SymbolTypeTcc::PacketNotReceived);
        assert_eq!(symbols[2], SymbolTypeTcc::PacketReceivedSmallDelta);
    }

    #[test]
    fn test_receiver_feedback_counter_increments() {
        let mut chain = Registry::new()
            .with(
                TwccReceiverBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_remote_stream(&StreamInfo {
            ssrc: 33,
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: TRANSPORT_CC_URI.to_string(),
                id: 5,
            }],
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();

        chain.handle_read(stamped(33, 5, 1, base)).unwrap();
        chain
            .handle_timeout(base + Duration::from_millis(60))
            .unwrap();
        chain
            .handle_read(stamped(33, 5, 2, base + Duration::from_millis(70)))
            .unwrap();
        chain
            .handle_timeout(base + Duration::from_millis(120))
            .unwrap();

        let mut counts = vec![];
        while let Some(tagged) = chain.poll_write() {
            if let Packet::Rtcp(packets) = tagged.message {
                if let Some(cc) = packets[0].as_any().downcast_ref::<TransportLayerCc>() {
                    counts.push(cc.fb_pkt_count);
                }
            }
        }
        assert_eq!(counts, vec![0, 1]);
    }
}
