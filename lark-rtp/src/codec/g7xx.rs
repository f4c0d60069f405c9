//! G.711/G.722 RTP payload: raw samples split at the MTU boundary.

use bytes::Bytes;

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

pub type G711Payloader = G7xxPayloader;
pub type G722Payloader = G7xxPayloader;

#[derive(Default, Debug, Clone)]
pub struct G7xxPayloader;

impl Payloader for G7xxPayloader {
    /// Slices the raw sample stream into MTU sized chunks.
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() || mtu == 0 {
            return Ok(vec![]);
        }

        let mut payload_data_remaining = payload.len();
        let mut payload_data_index = 0;
        let mut payloads = Vec::with_capacity(payload_data_remaining / mtu);
        while payload_data_remaining > 0 {
            let current_fragment_size = std::cmp::min(mtu, payload_data_remaining);
            payloads.push(
                payload.slice(payload_data_index..payload_data_index + current_fragment_size),
            );

            payload_data_remaining -= current_fragment_size;
            payload_data_index += current_fragment_size;
        }

        Ok(payloads)
    }
}

#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct G7xxDepacketizer;

impl Depacketizer for G7xxDepacketizer {
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
mod g7xx_test {
    use super::*;

    #[test]
    fn test_g7xx_payload() {
        let mut payloader = G711Payloader::default();

        let payload = Bytes::from_static(&[0x90, 0x90, 0x90]);

        // Positive MTU, small payload
        let result = payloader.payload(1, &payload).unwrap();
        assert_eq!(result.len(), payload.len());

        // Positive MTU, small payload
        let result = payloader.payload(2, &payload).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 2);
        assert_eq!(result[1].len(), 1);

        // Large payload split across MTU
        let payload = Bytes::from(vec![0u8; 1000]);
        let result = payloader.payload(400, &payload).unwrap();
        assert_eq!(result.len(), 3);
    }
}
