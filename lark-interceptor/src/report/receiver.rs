//! Receiver report generation for inbound streams.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::DEFAULT_REPORT_INTERVAL;
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::receiver_report::ReceiverReport;
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use shared::error::Result;
use shared::TransportContext;

/// Builder for [`ReceiverReportInterceptor`].
pub struct ReceiverReportBuilder {
    interval: Duration,
}

impl Default for ReceiverReportBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl ReceiverReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> ReceiverReportInterceptor<P> {
        move |inner| ReceiverReportInterceptor {
            inner,
            interval: self.interval,
            eto: None,
            ssrc: rand::random(),
            streams: HashMap::new(),
            write_queue: VecDeque::new(),
        }
    }
}

/// Per-stream reception statistics, RFC 3550 Appendix A.
#[derive(Debug)]
struct ReceiverStream {
    clock_rate: u32,
    epoch: Option<Instant>,

    started: bool,
    base_seq: u16,
    max_seq: u16,
    cycles: u32,
    packets_received: u32,

    // for fraction-lost between reports
    expected_prior: u32,
    received_prior: u32,

    jitter: f64,
    last_transit: f64,

    last_sender_report: u32,
    last_sr_at: Option<Instant>,
}

impl ReceiverStream {
    fn new(clock_rate: u32) -> Self {
        ReceiverStream {
            clock_rate,
            epoch: None,
            started: false,
            base_seq: 0,
            max_seq: 0,
            cycles: 0,
            packets_received: 0,
            expected_prior: 0,
            received_prior: 0,
            jitter: 0.0,
            last_transit: 0.0,
            last_sender_report: 0,
            last_sr_at: None,
        }
    }

    fn on_packet(&mut self, now: Instant, seq: u16, rtp_timestamp: u32) {
        let epoch = *self.epoch.get_or_insert(now);
        self.packets_received = self.packets_received.wrapping_add(1);

        if !self.started {
            self.started = true;
            self.base_seq = seq;
            self.max_seq = seq;
        } else {
            let delta = seq.wrapping_sub(self.max_seq);
            if delta < 0x8000 && delta != 0 {
                if seq < self.max_seq {
                    self.cycles += 1 << 16;
                }
                self.max_seq = seq;
            }
        }

        // interarrival jitter, RFC 3550 A.8
        if self.clock_rate > 0 {
            let arrival = now.saturating_duration_since(epoch).as_secs_f64()
                * self.clock_rate as f64;
            let transit = arrival - rtp_timestamp as f64;
            if self.last_transit != 0.0 {
                let d = (transit - self.last_transit).abs();
                self.jitter += (d - self.jitter) / 16.0;
            }
            self.last_transit = transit;
        }
    }

    fn extended_max(&self) -> u32 {
        self.cycles | self.max_seq as u32
    }

    fn expected(&self) -> u32 {
        self.extended_max()
            .wrapping_sub(self.base_seq as u32)
            .wrapping_add(1)
    }

    fn build_report(&mut self, now: Instant, ssrc: u32) -> ReceptionReport {
        let expected = self.expected();
        let lost = expected.saturating_sub(self.packets_received);

        let expected_interval = expected.wrapping_sub(self.expected_prior);
        let received_interval = self.packets_received.wrapping_sub(self.received_prior);
        let lost_interval = expected_interval.saturating_sub(received_interval);
        self.expected_prior = expected;
        self.received_prior = self.packets_received;

        let fraction_lost = if expected_interval == 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval) as u8
        };

        let delay = self
            .last_sr_at
            .map(|at| (now.saturating_duration_since(at).as_secs_f64() * 65536.0) as u32)
            .unwrap_or(0);

        ReceptionReport {
            ssrc,
            fraction_lost,
            total_lost: lost & 0x00FF_FFFF,
            last_sequence_number: self.extended_max(),
            jitter: self.jitter as u32,
            last_sender_report: self.last_sender_report,
            delay,
        }
    }
}

/// Emits a periodic RTCP ReceiverReport covering every bound remote stream.
pub struct ReceiverReportInterceptor<P> {
    inner: P,
    interval: Duration,
    eto: Option<Instant>,
    ssrc: u32,
    streams: HashMap<u32, ReceiverStream>,
    write_queue: VecDeque<TaggedPacket>,
}

impl<P> ReceiverReportInterceptor<P> {
    fn generate_reports(&mut self, now: Instant) {
        let mut reports = vec![];
        for (&ssrc, stream) in &mut self.streams {
            if !stream.started {
                continue;
            }
            reports.push(stream.build_report(now, ssrc));
        }

        if reports.is_empty() {
            return;
        }

        let rr = ReceiverReport {
            ssrc: self.ssrc,
            reports,
            ..Default::default()
        };
        self.write_queue.push_back(TaggedPacket {
            now,
            transport: TransportContext::default(),
            message: Packet::Rtcp(vec![Box::new(rr)]),
        });
    }
}

impl<P: Interceptor> Interceptor for ReceiverReportInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        match &msg.message {
            Packet::Rtp(rtp_packet) => {
                if let Some(stream) = self.streams.get_mut(&rtp_packet.header.ssrc) {
                    stream.on_packet(
                        msg.now,
                        rtp_packet.header.sequence_number,
                        rtp_packet.header.timestamp,
                    );
                }
            }
            Packet::Rtcp(packets) => {
                for p in packets {
                    if let Some(sr) = p.as_any().downcast_ref::<SenderReport>() {
                        if let Some(stream) = self.streams.get_mut(&sr.ssrc) {
                            // middle 32 bits of the NTP timestamp
                            stream.last_sender_report = (sr.ntp_time >> 16) as u32;
                            stream.last_sr_at = Some(msg.now);
                        }
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
                self.generate_reports(now);
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
        self.streams
            .insert(info.ssrc, ReceiverStream::new(info.clock_rate));
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.streams.remove(&info.ssrc);
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
    use crate::Registry;

    fn inbound(ssrc: u32, seq: u16, now: Instant) -> TaggedPacket {
        TaggedPacket {
            now,
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header: rtp::header::Header {
                    ssrc,
                    sequence_number: seq,
                    timestamp: seq as u32 * 3000,
                    ..Default::default()
                },
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_receiver_report_lost_packets() {
        let mut chain = Registry::new()
            .with(
                ReceiverReportBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_remote_stream(&StreamInfo {
            ssrc: 5555,
            clock_rate: 90000,
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();

        // 10 expected (0..=9), two missing
        for seq in [0u16, 1, 2, 3, 5, 6, 8, 9] {
            chain.handle_read(inbound(5555, seq, base)).unwrap();
        }
        while chain.poll_read().is_some() {}

        chain
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();

        let tagged = chain.poll_write().expect("RR should be generated");
        let Packet::Rtcp(packets) = tagged.message else {
            panic!("expected RTCP");
        };
        let rr = packets[0]
            .as_any()
            .downcast_ref::<ReceiverReport>()
            .expect("expected ReceiverReport");
        assert_eq!(rr.reports.len(), 1);
        let report = &rr.reports[0];
        assert_eq!(report.ssrc, 5555);
        assert_eq!(report.total_lost, 2);
        assert_eq!(report.last_sequence_number, 9);
        assert!(report.fraction_lost > 0);
    }

    #[test]
    fn test_receiver_report_tracks_last_sr() {
        let mut chain = Registry::new()
            .with(
                ReceiverReportBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_remote_stream(&StreamInfo {
            ssrc: 5555,
            clock_rate: 90000,
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();
        chain.handle_read(inbound(5555, 0, base)).unwrap();

        let sr = SenderReport {
            ssrc: 5555,
            ntp_time: 0x0102030405060708,
            ..Default::default()
        };
        chain
            .handle_read(TaggedPacket {
                now: base,
                transport: Default::default(),
                message: Packet::Rtcp(vec![Box::new(sr)]),
            })
            .unwrap();

        chain
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();

        let tagged = chain.poll_write().unwrap();
        let Packet::Rtcp(packets) = tagged.message else {
            panic!("expected RTCP");
        };
        let rr = packets[0]
            .as_any()
            .downcast_ref::<ReceiverReport>()
            .unwrap();
        assert_eq!(rr.reports[0].last_sender_report, 0x03040506);
    }
}
