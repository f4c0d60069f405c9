//! Stamps outbound RTP packets with a transport-wide sequence number.

use std::collections::HashMap;
use std::time::Instant;

use super::{TransportCcExtension, TRANSPORT_CC_URI};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Result;

/// Builder for [`TwccSenderInterceptor`].
#[derive(Default)]
pub struct TwccSenderBuilder;

impl TwccSenderBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build<P>(self) -> impl FnOnce(P) -> TwccSenderInterceptor<P> {
        move |inner| TwccSenderInterceptor {
            inner,
            next_sequence: rand::random(),
            ext_ids: HashMap::new(),
        }
    }
}

/// Assigns one monotonically increasing sequence number across every
/// outbound stream that negotiated the TWCC header extension.
pub struct TwccSenderInterceptor<P> {
    inner: P,
    next_sequence: u16,
    /// SSRC -> negotiated extension id
    ext_ids: HashMap<u32, u8>,
}

impl<P: Interceptor> Interceptor for TwccSenderInterceptor<P> {
    fn handle_read(&mut self, msg: TaggedPacket) -> Result<()> {
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<TaggedPacket> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, mut msg: TaggedPacket) -> Result<()> {
        if let Packet::Rtp(ref mut rtp_packet) = msg.message {
            if let Some(&ext_id) = self.ext_ids.get(&rtp_packet.header.ssrc) {
                let seq = self.next_sequence;
                self.next_sequence = self.next_sequence.wrapping_add(1);
                let ext = TransportCcExtension {
                    transport_sequence: seq,
                };
                // a failed set leaves the packet unstamped but deliverable
                let _ = rtp_packet.header.set_extension(ext_id, ext.marshal());
            }
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
        if let Some(id) = info.header_extension_id(TRANSPORT_CC_URI) {
            self.ext_ids.insert(info.ssrc, id as u8);
        }
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.ext_ids.remove(&info.ssrc);
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_info::RTPHeaderExtension;
    use crate::Registry;
    use bytes::Bytes;

    #[test]
    fn test_sender_stamps_sequence_numbers() {
        let mut chain = Registry::new().with(TwccSenderBuilder::new().build()).build();

        chain.bind_local_stream(&StreamInfo {
            ssrc: 42,
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: TRANSPORT_CC_URI.to_string(),
                id: 5,
            }],
            ..Default::default()
        });

        let mut seqs = vec![];
        for _ in 0..3 {
            chain
                .handle_write(TaggedPacket {
                    now: Instant::now(),
                    transport: Default::default(),
                    message: Packet::Rtp(rtp::Packet {
                        header: rtp::header::Header {
                            ssrc: 42,
                            ..Default::default()
                        },
                        ..Default::default()
                    }),
                })
                .unwrap();

            let out = chain.poll_write().unwrap();
            let Packet::Rtp(p) = out.message else {
                panic!("expected RTP");
            };
            let raw = p.header.get_extension(5).expect("extension stamped");
            seqs.push(TransportCcExtension::unmarshal(&raw).unwrap().transport_sequence);
        }

        assert_eq!(seqs[1], seqs[0].wrapping_add(1));
        assert_eq!(seqs[2], seqs[0].wrapping_add(2));
    }

    #[test]
    fn test_sender_skips_streams_without_extension() {
        let mut chain = Registry::new().with(TwccSenderBuilder::new().build()).build();

        chain.bind_local_stream(&StreamInfo {
            ssrc: 42,
            ..Default::default()
        });

        chain
            .handle_write(TaggedPacket {
                now: Instant::now(),
                transport: Default::default(),
                message: Packet::Rtp(rtp::Packet {
                    header: rtp::header::Header {
                        ssrc: 42,
                        ..Default::default()
                    },
                    payload: Bytes::from_static(&[1]),
                    ..Default::default()
                }),
            })
            .unwrap();

        let out = chain.poll_write().unwrap();
        let Packet::Rtp(p) = out.message else {
            panic!("expected RTP");
        };
        assert!(!p.header.extension);
    }
}
