use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

/// A contiguous block of received TSNs above the cumulative ack point,
/// expressed as offsets from the cumulative TSN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct GapAckBlock {
    pub(crate) start: u16,
    pub(crate) end: u16,
}

/// ChunkSelectiveAck represents an SCTP SACK chunk (RFC 4960 §3.3.4).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkSelectiveAck {
    pub(crate) cumulative_tsn_ack: u32,
    pub(crate) advertised_receiver_window_credit: u32,
    pub(crate) gap_ack_blocks: Vec<GapAckBlock>,
    pub(crate) duplicate_tsn: Vec<u32>,
}

impl ChunkSelectiveAck {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        if value.len() < 12 {
            return Err(Error::ErrSackSizeNotLargeEnoughInfo);
        }

        let cumulative_tsn_ack = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let advertised_receiver_window_credit =
            u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        let num_gap_ack_blocks = u16::from_be_bytes([value[8], value[9]]) as usize;
        let num_duplicate_tsn = u16::from_be_bytes([value[10], value[11]]) as usize;

        if value.len() < 12 + num_gap_ack_blocks * 4 + num_duplicate_tsn * 4 {
            return Err(Error::ErrSackSizeNotLargeEnoughInfo);
        }

        let mut offset = 12;
        let mut gap_ack_blocks = Vec::with_capacity(num_gap_ack_blocks);
        for _ in 0..num_gap_ack_blocks {
            gap_ack_blocks.push(GapAckBlock {
                start: u16::from_be_bytes([value[offset], value[offset + 1]]),
                end: u16::from_be_bytes([value[offset + 2], value[offset + 3]]),
            });
            offset += 4;
        }

        let mut duplicate_tsn = Vec::with_capacity(num_duplicate_tsn);
        for _ in 0..num_duplicate_tsn {
            duplicate_tsn.push(u32::from_be_bytes([
                value[offset],
                value[offset + 1],
                value[offset + 2],
                value[offset + 3],
            ]));
            offset += 4;
        }

        Ok(ChunkSelectiveAck {
            cumulative_tsn_ack,
            advertised_receiver_window_credit,
            gap_ack_blocks,
            duplicate_tsn,
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        out.put_u32(self.cumulative_tsn_ack);
        out.put_u32(self.advertised_receiver_window_credit);
        out.put_u16(self.gap_ack_blocks.len() as u16);
        out.put_u16(self.duplicate_tsn.len() as u16);
        for block in &self.gap_ack_blocks {
            out.put_u16(block.start);
            out.put_u16(block.end);
        }
        for tsn in &self.duplicate_tsn {
            out.put_u32(*tsn);
        }
    }
}

#[cfg(test)]
mod chunk_selective_ack_test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_sack_roundtrip() {
        let sack = ChunkSelectiveAck {
            cumulative_tsn_ack: 1000,
            advertised_receiver_window_credit: 128 * 1024,
            gap_ack_blocks: vec![GapAckBlock { start: 2, end: 3 }],
            duplicate_tsn: vec![999],
        };

        let mut out = BytesMut::new();
        Chunk::Sack(sack.clone()).marshal_to(&mut out);

        let (decoded, _) = Chunk::unmarshal(&out.freeze()).unwrap();
        assert_eq!(decoded, Chunk::Sack(sack));
    }

    #[test]
    fn test_sack_declared_blocks_overrun() {
        let mut raw = BytesMut::new();
        raw.put_u32(1000);
        raw.put_u32(1024);
        raw.put_u16(5); // promises five gap blocks
        raw.put_u16(0);

        assert_eq!(
            ChunkSelectiveAck::unmarshal(&raw.freeze()),
            Err(Error::ErrSackSizeNotLargeEnoughInfo)
        );
    }
}
