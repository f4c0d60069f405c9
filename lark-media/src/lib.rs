#![warn(rust_2018_idioms)]

pub mod sample_builder;

use bytes::Bytes;
use std::time::Duration;

/// A Sample contains encoded media and timing information
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sample {
    /// The assembled data in media format
    pub data: Bytes,

    /// The length of time this sample contains, derived from the RTP
    /// timestamp delta to the following sample.
    pub duration: Duration,

    /// The RTP packet timestamp of this sample
    pub packet_timestamp: u32,

    /// The number of packets that were dropped prior to building this sample.
    /// Packet loss isn't always explicit loss, it can also be the SampleBuilder
    /// dropping packets it gave up waiting for.
    pub prev_dropped_packets: u16,

    /// The number of padding packets seen prior to building this sample.
    pub prev_padding_packets: u16,
}
