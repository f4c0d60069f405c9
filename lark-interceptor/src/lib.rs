//! Composable RTP/RTCP processing stages.
//!
//! An interceptor chain sits between the tracks and the secure transport.
//! Each stage wraps the next one; the outermost stage is what the transport
//! drives (`handle_read` for inbound traffic, `poll_write` for outbound),
//! and packets written by tracks enter through `handle_write`. Stages see
//! traffic in wrap order, deterministically: the stage registered last is
//! closest to the transport.

#![warn(rust_2018_idioms)]

pub mod nack;
pub mod noop;
pub mod registry;
pub mod report;
pub mod stats;
pub mod stream_info;
pub mod twcc;

use std::time::Instant;

use shared::error::Result;
use shared::TransportMessage;

pub use noop::NoopInterceptor;
pub use registry::Registry;
pub use stream_info::{RTCPFeedback, RTPHeaderExtension, StreamInfo};

/// A packet traveling through the chain.
#[derive(Debug, Clone)]
pub enum Packet {
    Rtp(rtp::Packet),
    Rtcp(Vec<Box<dyn rtcp::Packet>>),
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Packet::Rtp(a), Packet::Rtp(b)) => a == b,
            (Packet::Rtcp(a), Packet::Rtcp(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equal(y.as_ref()))
            }
            _ => false,
        }
    }
}

/// A packet tagged with its arrival/departure time and transport context.
pub type TaggedPacket = TransportMessage<Packet>;

/// One stage of the RTP/RTCP processing chain.
///
/// A stage owns the next-inner stage and delegates whatever it does not
/// care about. A failing stage should drop the offending packet and keep the
/// chain alive; only transport-fatal conditions surface as errors.
pub trait Interceptor {
    /// Handles a packet arriving from the transport.
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()>;

    /// Polls packets for the application side (tracks).
    fn poll_read(&mut self) -> Option<TaggedPacket>;

    /// Handles a packet leaving the application side (tracks).
    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()>;

    /// Polls packets for the transport.
    fn poll_write(&mut self) -> Option<TaggedPacket>;

    /// Drives periodic work; `now` comes from the owner's clock.
    fn handle_timeout(&mut self, now: Instant) -> Result<()>;

    /// The next instant at which `handle_timeout` should run.
    fn poll_timeout(&mut self) -> Option<Instant>;

    /// Informs the stage about an outbound (locally sent) stream.
    fn bind_local_stream(&mut self, info: &StreamInfo);

    /// Removes an outbound stream.
    fn unbind_local_stream(&mut self, info: &StreamInfo);

    /// Informs the stage about an inbound (remote) stream.
    fn bind_remote_stream(&mut self, info: &StreamInfo);

    /// Removes an inbound stream.
    fn unbind_remote_stream(&mut self, info: &StreamInfo);

    /// Tears the stage down.
    fn close(&mut self) -> Result<()>;
}
