//! Opus RTP payload format (RFC 7587). Packets carry one frame verbatim.

use bytes::Bytes;

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

#[derive(Default, Debug, Clone)]
pub struct OpusPayloader;

impl Payloader for OpusPayloader {
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() || mtu == 0 {
            return Ok(vec![]);
        }

        Ok(vec![payload.clone()])
    }
}

/// OpusDepacketizer depacketizes an Opus RTP payload.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct OpusDepacketizer;

impl Depacketizer for OpusDepacketizer {
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        if packet.is_empty() {
            Err(Error::ErrShortPacket)
        } else {
            Ok(packet.clone())
        }
    }

    fn is_partition_head(&self, _payload: &Bytes) -> bool {
        true
    }

    fn is_partition_tail(&self, _marker: bool, _payload: &Bytes) -> bool {
        true
    }
}

#[cfg(test)]
mod opus_test {
    use super::*;

    #[test]
    fn test_opus_unmarshal() {
        let mut pck = OpusDepacketizer;

        // Empty packet
        assert!(pck.depacketize(&Bytes::new()).is_err());

        // Normal packet
        let raw = Bytes::from_static(&[0x00, 0x00]);
        assert_eq!(pck.depacketize(&raw).unwrap(), raw);
    }

    #[test]
    fn test_opus_payload() {
        let mut payloader = OpusPayloader;
        let payload = Bytes::from_static(&[0x90, 0x90, 0x90]);

        // Positive MTU, small payload
        assert_eq!(payloader.payload(1, &payload).unwrap().len(), 1);

        // Positive MTU, small payload
        assert_eq!(payloader.payload(2, &payload).unwrap().len(), 1);

        // Zero MTU
        assert!(payloader.payload(0, &payload).unwrap().is_empty());
    }
}
