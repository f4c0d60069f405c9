//! Transport-wide congestion control feedback
//! (draft-holmer-rmcat-transport-wide-cc-extensions-01).

use std::any::Any;
use std::fmt;

use bytes::Buf;

use crate::header::*;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// 20 bytes of fixed fields before the packet chunks:
/// header(4) + sender ssrc(4) + media ssrc(4) + base seq(2) +
/// status count(2) + reference time(3) + fb pkt count(1)
pub const PACKET_STATUS_CHUNK_OFFSET: usize = 20;
pub const PACKET_CHUNK_SIZE: usize = 2;
/// Each delta is a multiple of 250 microseconds on the wire.
pub const TYPE_TCC_DELTA_SCALE_FACTOR: i64 = 250;

pub const TYPE_TCC_RUN_LENGTH_CHUNK: u16 = 0;
pub const TYPE_TCC_STATUS_VECTOR_CHUNK: u16 = 1;

pub const TYPE_TCC_SYMBOL_SIZE_ONE_BIT: u16 = 0;
pub const TYPE_TCC_SYMBOL_SIZE_TWO_BIT: u16 = 1;

/// The status of a packet covered by a feedback message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SymbolTypeTcc {
    /// Packet not received
    #[default]
    PacketNotReceived = 0,
    /// Packet received, small delta (one byte on the wire)
    PacketReceivedSmallDelta = 1,
    /// Packet received, large or negative delta (two bytes on the wire)
    PacketReceivedLargeDelta = 2,
    /// Packet received, no timestamp recorded
    PacketReceivedWithoutDelta = 3,
}

impl From<u16> for SymbolTypeTcc {
    fn from(val: u16) -> Self {
        match val & 0x3 {
            1 => SymbolTypeTcc::PacketReceivedSmallDelta,
            2 => SymbolTypeTcc::PacketReceivedLargeDelta,
            3 => SymbolTypeTcc::PacketReceivedWithoutDelta,
            _ => SymbolTypeTcc::PacketNotReceived,
        }
    }
}

/// A run of packets sharing one status symbol.
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |T| S |       Run Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct RunLengthChunk {
    pub packet_status_symbol: SymbolTypeTcc,
    pub run_length: u16,
}

impl RunLengthChunk {
    fn marshal_u16(&self) -> Result<u16> {
        if self.run_length > 0x1FFF {
            return Err(Error::PacketStatusChunkLength);
        }
        Ok((TYPE_TCC_RUN_LENGTH_CHUNK << 15)
            | ((self.packet_status_symbol as u16) << 13)
            | self.run_length)
    }

    fn unmarshal_u16(raw: u16) -> Self {
        RunLengthChunk {
            packet_status_symbol: SymbolTypeTcc::from((raw >> 13) & 0x3),
            run_length: raw & 0x1FFF,
        }
    }
}

/// Individual status symbols for up to 14 packets.
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |T|S|       symbol list         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct StatusVectorChunk {
    /// 0: one-bit symbols (received / not received), 1: two-bit symbols
    pub symbol_size: u16,
    pub symbol_list: Vec<SymbolTypeTcc>,
}

impl StatusVectorChunk {
    fn marshal_u16(&self) -> Result<u16> {
        let mut raw = TYPE_TCC_STATUS_VECTOR_CHUNK << 15;
        raw |= self.symbol_size << 14;

        if self.symbol_size == TYPE_TCC_SYMBOL_SIZE_ONE_BIT {
            if self.symbol_list.len() > 14 {
                return Err(Error::PacketStatusChunkLength);
            }
            for (i, symbol) in self.symbol_list.iter().enumerate() {
                raw |= ((*symbol as u16) & 0x1) << (13 - i);
            }
        } else {
            if self.symbol_list.len() > 7 {
                return Err(Error::PacketStatusChunkLength);
            }
            for (i, symbol) in self.symbol_list.iter().enumerate() {
                raw |= ((*symbol as u16) & 0x3) << (12 - i * 2);
            }
        }
        Ok(raw)
    }

    fn unmarshal_u16(raw: u16) -> Self {
        let symbol_size = (raw >> 14) & 0x1;
        let mut symbol_list = vec![];
        if symbol_size == TYPE_TCC_SYMBOL_SIZE_ONE_BIT {
            for i in 0..14u16 {
                symbol_list.push(SymbolTypeTcc::from((raw >> (13 - i)) & 0x1));
            }
        } else {
            for i in 0..7u16 {
                symbol_list.push(SymbolTypeTcc::from((raw >> (12 - i * 2)) & 0x3));
            }
        }
        StatusVectorChunk {
            symbol_size,
            symbol_list,
        }
    }
}

/// One 16-bit packet status chunk.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PacketStatusChunk {
    RunLengthChunk(RunLengthChunk),
    StatusVectorChunk(StatusVectorChunk),
}

impl PacketStatusChunk {
    fn marshal_u16(&self) -> Result<u16> {
        match self {
            PacketStatusChunk::RunLengthChunk(c) => c.marshal_u16(),
            PacketStatusChunk::StatusVectorChunk(c) => c.marshal_u16(),
        }
    }

    fn unmarshal_u16(raw: u16) -> Self {
        if (raw >> 15) & 0x1 == TYPE_TCC_RUN_LENGTH_CHUNK {
            PacketStatusChunk::RunLengthChunk(RunLengthChunk::unmarshal_u16(raw))
        } else {
            PacketStatusChunk::StatusVectorChunk(StatusVectorChunk::unmarshal_u16(raw))
        }
    }

    /// Status symbols covered by this chunk, in order.
    pub fn symbols(&self) -> Vec<SymbolTypeTcc> {
        match self {
            PacketStatusChunk::RunLengthChunk(c) => {
                vec![c.packet_status_symbol; c.run_length as usize]
            }
            PacketStatusChunk::StatusVectorChunk(c) => c.symbol_list.clone(),
        }
    }
}

/// The arrival-time delta of one received packet, in microseconds.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct RecvDelta {
    pub type_tcc_packet: SymbolTypeTcc,
    /// Microseconds; a multiple of 250.
    pub delta: i64,
}

impl RecvDelta {
    fn wire_size(&self) -> usize {
        match self.type_tcc_packet {
            SymbolTypeTcc::PacketReceivedSmallDelta => 1,
            SymbolTypeTcc::PacketReceivedLargeDelta => 2,
            _ => 0,
        }
    }
}

/// The TransportLayerCc packet reports per-packet arrival times back to the
/// sender for transport-wide congestion control.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TransportLayerCc {
    /// SSRC of the packet sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    /// Transport-wide sequence number of the first packet covered
    pub base_sequence_number: u16,
    /// Number of packets this feedback covers
    pub packet_status_count: u16,
    /// Time of the feedback, in multiples of 64ms (24 bits on the wire)
    pub reference_time: u32,
    /// Feedback packet counter, wraps
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl fmt::Display for TransportLayerCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("TransportLayerCc:\n\tSender Ssrc {:x}\n", self.sender_ssrc);
        out += format!("\tMedia Ssrc {:x}\n", self.media_ssrc).as_str();
        out += format!("\tBase Sequence Number {}\n", self.base_sequence_number).as_str();
        out += format!("\tStatus Count {}\n", self.packet_status_count).as_str();
        out += format!("\tReference Time {}\n", self.reference_time).as_str();
        out += format!("\tFeedback Packet Count {}\n", self.fb_pkt_count).as_str();
        write!(f, "{out}")
    }
}

impl Packet for TransportLayerCc {
    fn header(&self) -> Header {
        Header {
            padding: self.marshal_size() != self.raw_size(),
            count: FORMAT_TCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        let mut n = PACKET_STATUS_CHUNK_OFFSET + self.packet_chunks.len() * PACKET_CHUNK_SIZE;
        for d in &self.recv_deltas {
            n += d.wire_size();
        }
        n
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerCc>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + shared::marshal::get_padding_size(l)
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }
        if self.reference_time >= (1 << 24) {
            return Err(Error::DeltaExceedLimit);
        }

        let header = self.header();
        let mut n = header.marshal_to(buf)?;

        buf[n..n + 4].copy_from_slice(&self.sender_ssrc.to_be_bytes());
        n += 4;
        buf[n..n + 4].copy_from_slice(&self.media_ssrc.to_be_bytes());
        n += 4;
        buf[n..n + 2].copy_from_slice(&self.base_sequence_number.to_be_bytes());
        n += 2;
        buf[n..n + 2].copy_from_slice(&self.packet_status_count.to_be_bytes());
        n += 2;
        buf[n] = (self.reference_time >> 16) as u8;
        buf[n + 1] = (self.reference_time >> 8) as u8;
        buf[n + 2] = self.reference_time as u8;
        n += 3;
        buf[n] = self.fb_pkt_count;
        n += 1;

        for chunk in &self.packet_chunks {
            buf[n..n + 2].copy_from_slice(&chunk.marshal_u16()?.to_be_bytes());
            n += 2;
        }

        for delta in &self.recv_deltas {
            let ticks = delta.delta / TYPE_TCC_DELTA_SCALE_FACTOR;
            match delta.type_tcc_packet {
                SymbolTypeTcc::PacketReceivedSmallDelta => {
                    if !(0..=255).contains(&ticks) {
                        return Err(Error::DeltaExceedLimit);
                    }
                    buf[n] = ticks as u8;
                    n += 1;
                }
                SymbolTypeTcc::PacketReceivedLargeDelta => {
                    if ticks < i16::MIN as i64 || ticks > i16::MAX as i64 {
                        return Err(Error::DeltaExceedLimit);
                    }
                    buf[n..n + 2].copy_from_slice(&(ticks as i16).to_be_bytes());
                    n += 2;
                }
                _ => {}
            }
        }

        for _ in 0..shared::marshal::get_padding_size(self.raw_size()) {
            buf[n] = 0;
            n += 1;
        }

        Ok(n)
    }
}

impl Unmarshal for TransportLayerCc {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_len = raw_packet.remaining();
        if raw_len < PACKET_STATUS_CHUNK_OFFSET {
            return Err(Error::PacketTooShort);
        }

        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::TransportSpecificFeedback
            || header.count != FORMAT_TCC
        {
            return Err(Error::WrongType);
        }

        let total_length = (header.length as usize + 1) * 4;
        if total_length > raw_len {
            return Err(Error::PacketTooShort);
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();
        let base_sequence_number = raw_packet.get_u16();
        let packet_status_count = raw_packet.get_u16();
        let r0 = raw_packet.get_u8() as u32;
        let r1 = raw_packet.get_u8() as u32;
        let r2 = raw_packet.get_u8() as u32;
        let reference_time = (r0 << 16) | (r1 << 8) | r2;
        let fb_pkt_count = raw_packet.get_u8();

        let mut consumed = PACKET_STATUS_CHUNK_OFFSET;

        let mut packet_chunks = vec![];
        let mut symbols = vec![];
        while symbols.len() < packet_status_count as usize {
            if consumed + PACKET_CHUNK_SIZE > total_length {
                return Err(Error::PacketTooShort);
            }
            let chunk = PacketStatusChunk::unmarshal_u16(raw_packet.get_u16());
            consumed += PACKET_CHUNK_SIZE;
            symbols.extend(chunk.symbols());
            packet_chunks.push(chunk);
        }

        let mut recv_deltas = vec![];
        for symbol in symbols.iter().take(packet_status_count as usize) {
            match symbol {
                SymbolTypeTcc::PacketReceivedSmallDelta => {
                    if consumed + 1 > total_length {
                        return Err(Error::PacketTooShort);
                    }
                    let ticks = raw_packet.get_u8() as i64;
                    consumed += 1;
                    recv_deltas.push(RecvDelta {
                        type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                        delta: ticks * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                }
                SymbolTypeTcc::PacketReceivedLargeDelta => {
                    if consumed + 2 > total_length {
                        return Err(Error::PacketTooShort);
                    }
                    let ticks = raw_packet.get_i16() as i64;
                    consumed += 2;
                    recv_deltas.push(RecvDelta {
                        type_tcc_packet: SymbolTypeTcc::PacketReceivedLargeDelta,
                        delta: ticks * TYPE_TCC_DELTA_SCALE_FACTOR,
                    });
                }
                _ => {}
            }
        }

        // discard any padding
        while consumed < total_length {
            if !raw_packet.has_remaining() {
                break;
            }
            raw_packet.get_u8();
            consumed += 1;
        }

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}

#[cfg(test)]
mod transport_layer_cc_test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_run_length_chunk_roundtrip() {
        let chunk = RunLengthChunk {
            packet_status_symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
            run_length: 200,
        };
        let raw = chunk.marshal_u16().unwrap();
        assert_eq!(RunLengthChunk::unmarshal_u16(raw), chunk);
    }

    #[test]
    fn test_status_vector_chunk_roundtrip() {
        let chunk = StatusVectorChunk {
            symbol_size: TYPE_TCC_SYMBOL_SIZE_TWO_BIT,
            symbol_list: vec![
                SymbolTypeTcc::PacketReceivedSmallDelta,
                SymbolTypeTcc::PacketNotReceived,
                SymbolTypeTcc::PacketReceivedLargeDelta,
                SymbolTypeTcc::PacketNotReceived,
                SymbolTypeTcc::PacketNotReceived,
                SymbolTypeTcc::PacketNotReceived,
                SymbolTypeTcc::PacketNotReceived,
            ],
        };
        let raw = chunk.marshal_u16().unwrap();
        assert_eq!(StatusVectorChunk::unmarshal_u16(raw), chunk);
    }

    #[test]
    fn test_transport_layer_cc_roundtrip() {
        let cc = TransportLayerCc {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x12345678,
            base_sequence_number: 120,
            packet_status_count: 3,
            reference_time: 64,
            fb_pkt_count: 1,
            packet_chunks: vec![PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                packet_status_symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
                run_length: 3,
            })],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 250,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 500,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 2000,
                },
            ],
        };

        let data = cc.marshal().unwrap();
        assert_eq!(data.len() % 4, 0);

        let mut buf = data.freeze();
        let decoded = TransportLayerCc::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, cc);
    }

    #[test]
    fn test_transport_layer_cc_parse_example() {
        // one run length chunk, one small delta
        let mut raw = Bytes::from_static(&[
            0x8f, 0xcd, 0x00, 0x05, 0x90, 0x2f, 0x9e, 0x2e, 0x12, 0x34, 0x56, 0x78, 0x00, 0x78,
            0x00, 0x01, 0x00, 0x00, 0x01, 0x01, 0x20, 0x01, 0x94, 0x00,
        ]);

        let cc = TransportLayerCc::unmarshal(&mut raw).unwrap();
        assert_eq!(cc.base_sequence_number, 0x78);
        assert_eq!(cc.packet_status_count, 1);
        assert_eq!(cc.fb_pkt_count, 1);
        assert_eq!(cc.recv_deltas.len(), 1);
        assert_eq!(cc.recv_deltas[0].delta, 0x94 * 250);
    }
}
