use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_32_ISCSI};

use crate::chunk::chunk_type::CT_INIT;
use crate::chunk::Chunk;
use ::shared::error::{Error, Result};

pub(crate) const PACKET_HEADER_SIZE: usize = 12;

static CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// The 12-byte header every SCTP packet starts with (RFC 4960 §3.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Source Port Number        |     Destination Port Number   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Verification Tag                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Checksum                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CommonHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub verification_tag: u32,
}

/// A complete decoded SCTP packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Packet {
    pub(crate) common_header: CommonHeader,
    pub(crate) chunks: Vec<Chunk>,
}

impl Packet {
    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        let partial = PartialDecode::unmarshal(raw)?;
        partial.finish()
    }

    pub(crate) fn marshal(&self) -> Result<Bytes> {
        if self.common_header.source_port == 0 {
            return Err(Error::ErrSctpPacketSourcePortZero);
        }
        if self.common_header.destination_port == 0 {
            return Err(Error::ErrSctpPacketDestinationPortZero);
        }

        let mut out = BytesMut::new();
        out.put_u16(self.common_header.source_port);
        out.put_u16(self.common_header.destination_port);
        out.put_u32(self.common_header.verification_tag);
        out.put_u32(0); // checksum, filled below

        for chunk in &self.chunks {
            chunk.marshal_to(&mut out);
        }

        let checksum = generate_packet_checksum(&out);
        out[8..12].copy_from_slice(&checksum.to_le_bytes());

        Ok(out.freeze())
    }
}

/// Computes the RFC 4960 Appendix B checksum: CRC32c over the packet with
/// the checksum field taken as zero.
pub(crate) fn generate_packet_checksum(raw: &[u8]) -> u32 {
    let mut digest = CRC32C.digest();
    digest.update(&raw[0..8]);
    digest.update(&[0, 0, 0, 0]);
    digest.update(&raw[12..]);
    digest.finalize()
}

/// The header plus enough of the first chunk to route a datagram, produced
/// before the receiving association does a full decode.
#[derive(Debug, Clone)]
pub struct PartialDecode {
    pub(crate) common_header: CommonHeader,
    pub(crate) first_chunk_type: u8,
    /// Initiate tag of the first chunk when it is an INIT.
    pub(crate) initiate_tag: Option<u32>,
    pub(crate) raw: Bytes,
}

impl PartialDecode {
    pub(crate) fn unmarshal(raw: &Bytes) -> Result<Self> {
        if raw.len() < PACKET_HEADER_SIZE + 4 {
            return Err(Error::ErrPacketRawTooSmall);
        }

        let common_header = CommonHeader {
            source_port: u16::from_be_bytes([raw[0], raw[1]]),
            destination_port: u16::from_be_bytes([raw[2], raw[3]]),
            verification_tag: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        };

        let their_checksum = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let our_checksum = generate_packet_checksum(raw);
        if their_checksum != our_checksum {
            return Err(Error::ErrChecksumMismatch);
        }

        let first_chunk_type = raw[PACKET_HEADER_SIZE];
        let initiate_tag = if first_chunk_type == CT_INIT {
            // header(4) + initiate tag(4) must be present in the INIT chunk
            if raw.len() >= PACKET_HEADER_SIZE + 8 {
                Some(u32::from_be_bytes([
                    raw[PACKET_HEADER_SIZE + 4],
                    raw[PACKET_HEADER_SIZE + 5],
                    raw[PACKET_HEADER_SIZE + 6],
                    raw[PACKET_HEADER_SIZE + 7],
                ]))
            } else {
                None
            }
        } else {
            None
        };

        Ok(PartialDecode {
            common_header,
            first_chunk_type,
            initiate_tag,
            raw: raw.clone(),
        })
    }

    /// Performs the full chunk decode.
    pub(crate) fn finish(&self) -> Result<Packet> {
        let mut chunks = vec![];
        let mut offset = PACKET_HEADER_SIZE;
        while offset < self.raw.len() {
            if self.raw.len() - offset < 4 {
                return Err(Error::ErrParseSctpChunkNotEnoughData);
            }
            let (chunk, consumed) = Chunk::unmarshal(&self.raw.slice(offset..))?;
            chunks.push(chunk);
            offset += consumed;
        }

        // An INIT chunk must stand alone in its packet
        if chunks.len() > 1 && chunks.iter().any(|c| c.chunk_type() == CT_INIT) {
            return Err(Error::ErrInitChunkBundled);
        }

        Ok(Packet {
            common_header: self.common_header,
            chunks,
        })
    }
}

#[cfg(test)]
mod packet_test {
    use super::*;
    use crate::chunk::chunk_payload_data::{ChunkPayloadData, PayloadProtocolIdentifier};

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet {
            common_header: CommonHeader {
                source_port: 5000,
                destination_port: 5000,
                verification_tag: 0x11223344,
            },
            chunks: vec![Chunk::PayloadData(ChunkPayloadData {
                beginning_fragment: true,
                ending_fragment: true,
                tsn: 1,
                stream_identifier: 0,
                stream_sequence_number: 0,
                payload_type: PayloadProtocolIdentifier::Binary,
                user_data: Bytes::from_static(&[1, 2, 3]),
                ..Default::default()
            })],
        };

        let raw = packet.marshal().unwrap();
        let decoded = Packet::unmarshal(&raw).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_packet_checksum_mismatch() {
        let packet = Packet {
            common_header: CommonHeader {
                source_port: 5000,
                destination_port: 5000,
                verification_tag: 1,
            },
            chunks: vec![Chunk::PayloadData(ChunkPayloadData {
                beginning_fragment: true,
                ending_fragment: true,
                tsn: 1,
                user_data: Bytes::from_static(&[1, 2, 3, 4]),
                ..Default::default()
            })],
        };

        let raw = packet.marshal().unwrap();
        let mut corrupted = BytesMut::from(&raw[..]);
        let tail = corrupted.len() - 1;
        corrupted[tail] ^= 0xff;
        assert_eq!(
            Packet::unmarshal(&corrupted.freeze()),
            Err(Error::ErrChecksumMismatch)
        );
    }

    #[test]
    fn test_packet_zero_ports_rejected() {
        let packet = Packet {
            common_header: CommonHeader::default(),
            chunks: vec![],
        };
        assert_eq!(packet.marshal(), Err(Error::ErrSctpPacketSourcePortZero));
    }

    #[test]
    fn test_packet_too_small() {
        let raw = Bytes::from_static(&[0u8; 8]);
        assert_eq!(Packet::unmarshal(&raw), Err(Error::ErrPacketRawTooSmall));
    }
}
