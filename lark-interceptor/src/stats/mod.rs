//! Per-SSRC traffic counters, queryable as a snapshot.

use std::collections::HashMap;
use std::time::Instant;

use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Result;

/// Counters for one direction of one stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub packets: u64,
    pub bytes: u64,
    pub malformed_dropped: u64,
}

/// A point-in-time view of every tracked stream.
#[derive(Debug, Default, Clone)]
pub struct StatsSnapshot {
    pub inbound: HashMap<u32, StreamStats>,
    pub outbound: HashMap<u32, StreamStats>,
}

/// Builder for [`StatsInterceptor`].
#[derive(Default)]
pub struct StatsBuilder;

impl StatsBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> StatsInterceptor<P> {
        move |inner| StatsInterceptor {
            inner,
            inbound: HashMap::new(),
            outbound: HashMap::new(),
        }
    }
}

/// Observes traffic in both directions and yields per-SSRC statistics on
/// query. Packets pass through untouched.
pub struct StatsInterceptor<P> {
    inner: P,
    inbound: HashMap<u32, StreamStats>,
    outbound: HashMap<u32, StreamStats>,
}

impl<P> StatsInterceptor<P> {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
        }
    }

    /// Records a parse failure attributed to `ssrc` (0 when unattributable).
    pub fn record_malformed(&mut self, ssrc: u32) {
        self.inbound.entry(ssrc).or_default().malformed_dropped += 1;
    }
}

impl<P: Interceptor> Interceptor for StatsInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            let stats = self.inbound.entry(rtp_packet.header.ssrc).or_default();
            stats.packets += 1;
            stats.bytes += rtp_packet.payload.len() as u64;
        }
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            let stats = self.outbound.entry(rtp_packet.header.ssrc).or_default();
            stats.packets += 1;
            stats.bytes += rtp_packet.payload.len() as u64;
        }
        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_write()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.inner.poll_timeout()
    }

    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.outbound.entry(info.ssrc).or_default();
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inbound.entry(info.ssrc).or_default();
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
