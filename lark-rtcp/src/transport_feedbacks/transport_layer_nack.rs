use std::any::Any;
use std::fmt;

use bytes::Buf;

use crate::header::*;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// PacketBitmap shouldn't be used like a normal integral,
/// so it's type is masked here. Access it with PacketList().
type PacketBitmap = u16;

/// NackPair is a wire-representation of a collection of
/// Lost RTP packets
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct NackPair {
    /// ID of lost packets
    pub packet_id: u16,
    /// Bitmask of following lost packets
    pub lost_packets: PacketBitmap,
}

impl NackPair {
    pub fn new(seq: u16) -> Self {
        NackPair {
            packet_id: seq,
            lost_packets: Default::default(),
        }
    }

    /// Returns a list of Nack'd packets that's referenced by a NackPair.
    pub fn packet_list(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(17);
        out.push(self.packet_id);

        let mut b = self.lost_packets;
        let mut i = 0u16;
        while b != 0 {
            if (b & 1) != 0 {
                out.push(self.packet_id.wrapping_add(i + 1));
            }
            b >>= 1;
            i += 1;
        }

        out
    }
}

const TLN_LENGTH: usize = 2;
const NACK_OFFSET: usize = 8;

/// The TransportLayerNack packet informs the encoder about the loss of a
/// transport packet. See RFC 4585 §6.2.1.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TransportLayerNack {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl fmt::Display for TransportLayerNack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("TransportLayerNack from {:x}\n", self.sender_ssrc);
        out += format!("\tMedia Ssrc {:x}\n", self.media_ssrc).as_str();
        out += "\tID\tLostPackets\n";
        for nack in &self.nacks {
            out += format!("\t{}\t{:b}\n", nack.packet_id, nack.lost_packets).as_str();
        }
        write!(f, "{out}")
    }
}

/// Packs a sorted set of sequence numbers into NackPairs.
pub fn nack_pairs_from_sequence_numbers(sequence_numbers: &[u16]) -> Vec<NackPair> {
    if sequence_numbers.is_empty() {
        return vec![];
    }

    let mut nack_pair = NackPair::new(sequence_numbers[0]);
    let mut pairs = vec![];

    for &seq in &sequence_numbers[1..] {
        let diff = seq.wrapping_sub(nack_pair.packet_id);
        if diff > 0 && diff <= 16 {
            nack_pair.lost_packets |= 1 << (diff - 1);
        } else {
            pairs.push(nack_pair);
            nack_pair = NackPair::new(seq);
        }
    }

    pairs.push(nack_pair);
    pairs
}

impl Packet for TransportLayerNack {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TLN,
            packet_type: PacketType::TransportSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + NACK_OFFSET + self.nacks.len() * 4
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerNack>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for TransportLayerNack {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for TransportLayerNack {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.nacks.len() + TLN_LENGTH > COUNT_MAX {
            return Err(Error::TooManyReports);
        }
        if buf.len() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let header = self.header();
        let mut n = header.marshal_to(buf)?;

        buf[n..n + 4].copy_from_slice(&self.sender_ssrc.to_be_bytes());
        n += 4;
        buf[n..n + 4].copy_from_slice(&self.media_ssrc.to_be_bytes());
        n += 4;

        for nack in &self.nacks {
            buf[n..n + 2].copy_from_slice(&nack.packet_id.to_be_bytes());
            n += 2;
            buf[n..n + 2].copy_from_slice(&nack.lost_packets.to_be_bytes());
            n += 2;
        }

        Ok(n)
    }
}

impl Unmarshal for TransportLayerNack {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_len = raw_packet.remaining();
        if raw_len < HEADER_LENGTH + SSRC_LENGTH * 2 {
            return Err(Error::PacketTooShort);
        }

        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::TransportSpecificFeedback
            || header.count != FORMAT_TLN
        {
            return Err(Error::WrongType);
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let mut nacks = vec![];
        while raw_packet.remaining() >= 4 {
            nacks.push(NackPair {
                packet_id: raw_packet.get_u16(),
                lost_packets: raw_packet.get_u16(),
            });
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

#[cfg(test)]
mod transport_layer_nack_test {
    use super::*;

    #[test]
    fn test_nack_pair_packet_list() {
        let tests = vec![
            (NackPair::new(42), vec![42]),
            (
                NackPair {
                    packet_id: 42,
                    lost_packets: 0x01,
                },
                vec![42, 43],
            ),
            (
                NackPair {
                    packet_id: 42,
                    lost_packets: 0x8000,
                },
                vec![42, 58],
            ),
            (
                NackPair {
                    packet_id: 42,
                    lost_packets: 0x0005,
                },
                vec![42, 43, 45],
            ),
        ];

        for (pair, want) in tests {
            assert_eq!(pair.packet_list(), want);
        }
    }

    #[test]
    fn test_nack_pairs_from_sequence_numbers() {
        let pairs = nack_pairs_from_sequence_numbers(&[13, 15, 17, 40]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].packet_id, 13);
        assert_eq!(pairs[0].lost_packets, 0b1010);
        assert_eq!(pairs[1].packet_id, 40);
        assert_eq!(pairs[1].lost_packets, 0);
    }

    #[test]
    fn test_transport_layer_nack_roundtrip() {
        let nack = TransportLayerNack {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            nacks: vec![NackPair {
                packet_id: 0xaaa,
                lost_packets: 0x5555,
            }],
        };

        let data = nack.marshal().unwrap();
        let mut buf = data.freeze();
        let decoded = TransportLayerNack::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, nack);
    }
}
