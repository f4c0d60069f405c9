//! Sender report generation for locally sent streams.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::{ntp_time, DEFAULT_REPORT_INTERVAL};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::sender_report::SenderReport;
use shared::error::Result;
use shared::TransportContext;

/// Builder for [`SenderReportInterceptor`].
pub struct SenderReportBuilder {
    interval: Duration,
}

impl Default for SenderReportBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl SenderReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> SenderReportInterceptor<P> {
        move |inner| SenderReportInterceptor {
            inner,
            interval: self.interval,
            eto: None,
            epoch: None,
            streams: HashMap::new(),
            write_queue: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
struct SenderStream {
    clock_rate: u32,
    packet_count: u32,
    octet_count: u32,
    last_rtp_timestamp: u32,
    last_sent_at: Option<Instant>,
}

/// Emits a periodic RTCP SenderReport per locally bound SSRC.
pub struct SenderReportInterceptor<P> {
    inner: P,
    interval: Duration,
    eto: Option<Instant>,
    epoch: Option<Instant>,
    streams: HashMap<u32, SenderStream>,
    write_queue: VecDeque<TaggedPacket>,
}

impl<P> SenderReportInterceptor<P> {
    fn generate_reports(&mut self, now: Instant) {
        let epoch = *self.epoch.get_or_insert(now);
        for (&ssrc, stream) in &self.streams {
            if stream.packet_count == 0 {
                continue;
            }

            // project the RTP clock forward from the last packet sent
            let rtp_time = match stream.last_sent_at {
                Some(at) => {
                    let advance = now.saturating_duration_since(at).as_secs_f64()
                        * stream.clock_rate as f64;
                    stream.last_rtp_timestamp.wrapping_add(advance as u32)
                }
                None => stream.last_rtp_timestamp,
            };

            let sr = SenderReport {
                ssrc,
                ntp_time: ntp_time(now.saturating_duration_since(epoch)),
                rtp_time,
                packet_count: stream.packet_count,
                octet_count: stream.octet_count,
                ..Default::default()
            };

            self.write_queue.push_back(TaggedPacket {
                now,
                transport: TransportContext::default(),
                message: Packet::Rtcp(vec![Box::new(sr)]),
            });
        }
    }
}

impl<P: Interceptor> Interceptor for SenderReportInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            if let Some(stream) = self.streams.get_mut(&rtp_packet.header.ssrc) {
                stream.packet_count = stream.packet_count.wrapping_add(1);
                stream.octet_count = stream
                    .octet_count
                    .wrapping_add(rtp_packet.payload.len() as u32);
                stream.last_rtp_timestamp = rtp_packet.header.timestamp;
                stream.last_sent_at = Some(msg.now);
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
        self.streams.insert(
            info.ssrc,
            SenderStream {
                clock_rate: info.clock_rate,
                packet_count: 0,
                octet_count: 0,
                last_rtp_timestamp: 0,
                last_sent_at: None,
            },
        );
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.streams.remove(&info.ssrc);
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
    use crate::Registry;
    use bytes::Bytes;

    #[test]
    fn test_sender_report_counts_outbound() {
        let mut chain = Registry::new()
            .with(
                SenderReportBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_local_stream(&StreamInfo {
            ssrc: 1234,
            clock_rate: 90000,
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();

        for seq in 0..3u16 {
            chain
                .handle_write(TaggedPacket {
                    now: base,
                    transport: Default::default(),
                    message: Packet::Rtp(rtp::Packet {
                        header: rtp::header::Header {
                            ssrc: 1234,
                            sequence_number: seq,
                            timestamp: 3000,
                            ..Default::default()
                        },
                        payload: Bytes::from_static(&[0u8; 100]),
                        ..Default::default()
                    }),
                })
                .unwrap();
        }
        while let Some(p) = chain.poll_write() {
            // outbound media passes through
            assert!(matches!(p.message, Packet::Rtp(_)));
        }

        chain
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();

        let tagged = chain.poll_write().expect("SR should be generated");
        let Packet::Rtcp(packets) = tagged.message else {
            panic!("expected RTCP");
        };
        let sr = packets[0]
            .as_any()
            .downcast_ref::<SenderReport>()
            .expect("expected SenderReport");
        assert_eq!(sr.ssrc, 1234);
        assert_eq!(sr.packet_count, 3);
        assert_eq!(sr.octet_count, 300);
    }

    #[test]
    fn test_sender_report_silent_before_media() {
        let mut chain = Registry::new()
            .with(
                SenderReportBuilder::new()
                    .with_interval(Duration::from_millis(50))
                    .build(),
            )
            .build();

        chain.bind_local_stream(&StreamInfo {
            ssrc: 1234,
            clock_rate: 90000,
            ..Default::default()
        });

        let base = Instant::now();
        chain.handle_timeout(base).unwrap();
        chain
            .handle_timeout(base + Duration::from_millis(100))
            .unwrap();
        assert!(chain.poll_write().is_none(), "no SR before any packet");
    }
}
