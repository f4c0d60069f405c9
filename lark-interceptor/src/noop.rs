//! NoOp Interceptor - the pass-through terminal of every chain.

use std::collections::VecDeque;
use std::time::Instant;

use crate::{Interceptor, StreamInfo, TaggedPacket};
use shared::error::Result;

/// A no-operation interceptor that simply queues messages for pass-through.
///
/// `NoopInterceptor` serves as the innermost layer of an interceptor chain:
/// whatever the outer stages hand down is queued and returned unchanged.
#[derive(Default)]
pub struct NoopInterceptor {
    read_queue: VecDeque<TaggedPacket>,
    write_queue: VecDeque<TaggedPacket>,
}

impl NoopInterceptor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Interceptor for NoopInterceptor {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        self.read_queue.push_back(msg);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<()> {
        self.write_queue.push_back(msg);
        Ok(())
    }

    fn poll_write(&mut self) -> Option<TaggedPacket> {
        self.write_queue.pop_front()
    }

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }

    fn bind_local_stream(&mut self, _info: &StreamInfo) {}

    fn unbind_local_stream(&mut self, _info: &StreamInfo) {}

    fn bind_remote_stream(&mut self, _info: &StreamInfo) {}

    fn unbind_remote_stream(&mut self, _info: &StreamInfo) {}

    fn close(&mut self) -> Result<()> {
        self.read_queue.clear();
        self.write_queue.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;
    use shared::TransportContext;

    fn dummy_rtp_packet() -> TaggedPacket {
        TaggedPacket {
            now: Instant::now(),
            transport: TransportContext::default(),
            message: Packet::Rtp(rtp::Packet::default()),
        }
    }

    #[test]
    fn test_noop_read_write() {
        let mut noop = NoopInterceptor::new();

        let pkt1 = dummy_rtp_packet();
        let pkt2 = dummy_rtp_packet();
        noop.handle_read(pkt1.clone()).unwrap();
        noop.handle_read(pkt2.clone()).unwrap();
        assert_eq!(noop.poll_read().map(|p| p.message), Some(pkt1.message));
        assert_eq!(noop.poll_read().map(|p| p.message), Some(pkt2.message));
        assert!(noop.poll_read().is_none());

        let pkt3 = dummy_rtp_packet();
        noop.handle_write(pkt3.clone()).unwrap();
        assert_eq!(noop.poll_write().map(|p| p.message), Some(pkt3.message));
        assert!(noop.poll_write().is_none());
    }

    #[test]
    fn test_noop_close_clears_queues() {
        let mut noop = NoopInterceptor::new();

        noop.handle_read(dummy_rtp_packet()).unwrap();
        noop.handle_write(dummy_rtp_packet()).unwrap();

        noop.close().unwrap();

        assert!(noop.poll_read().is_none());
        assert!(noop.poll_write().is_none());
    }
}
