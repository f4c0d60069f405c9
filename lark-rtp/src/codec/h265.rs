//! H.265/HEVC RTP payload format (RFC 7798): single NALU, AP and FU.

use bytes::{BufMut, Bytes, BytesMut};

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

pub const H265NALU_HEADER_SIZE: usize = 2;
/// <https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.2>
pub const H265NALU_AGGREGATION_PACKET_TYPE: u8 = 48;
/// <https://datatracker.ietf.org/doc/html/rfc7798#section-4.4.3>
pub const H265NALU_FRAGMENTATION_UNIT_TYPE: u8 = 49;
pub const H265NALU_PACI_PACKET_TYPE: u8 = 50;

pub const H265FRAGMENTATION_UNIT_HEADER_SIZE: usize = 1;

static ANNEXB_NALUSTART_CODE: Bytes = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01]);

/// The two-byte NALU header shared by every H265 payload structure.
///
/// ```text
/// +---------------+---------------+
/// |0|1|2|3|4|5|6|7|0|1|2|3|4|5|6|7|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |F|   Type    |  LayerID  | TID |
/// +-------------+-----------------+
/// ```
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct H265NALUHeader(pub u16);

impl H265NALUHeader {
    pub fn new(high_byte: u8, low_byte: u8) -> Self {
        H265NALUHeader(((high_byte as u16) << 8) | low_byte as u16)
    }

    /// Forbidden zero bit, must be 0.
    pub fn f(&self) -> bool {
        (self.0 >> 15) != 0
    }

    /// NAL unit type.
    pub fn nalu_type(&self) -> u8 {
        const MASK: u16 = 0b0111_1110_0000_0000;
        ((self.0 & MASK) >> 9) as u8
    }

    pub fn layer_id(&self) -> u8 {
        const MASK: u16 = 0b0000_0001_1111_1000;
        ((self.0 & MASK) >> 3) as u8
    }

    pub fn tid(&self) -> u8 {
        (self.0 & 0b111) as u8
    }

    pub fn is_aggregation_packet(&self) -> bool {
        self.nalu_type() == H265NALU_AGGREGATION_PACKET_TYPE
    }

    pub fn is_fragmentation_unit(&self) -> bool {
        self.nalu_type() == H265NALU_FRAGMENTATION_UNIT_TYPE
    }

    pub fn is_paci_packet(&self) -> bool {
        self.nalu_type() == H265NALU_PACI_PACKET_TYPE
    }
}

fn next_ind(nalu: &Bytes, start: usize) -> (isize, isize) {
    let mut zero_count = 0;
    for (i, &b) in nalu[start..].iter().enumerate() {
        if b == 0 {
            zero_count += 1;
            continue;
        } else if b == 1 && zero_count >= 2 {
            return ((start + i - zero_count) as isize, (zero_count + 1) as isize);
        }
        zero_count = 0;
    }
    (-1, -1)
}

/// H265Payloader payloads H265 packets
#[derive(Default, Debug, Clone)]
pub struct H265Payloader;

impl H265Payloader {
    fn emit(&mut self, nalu: &Bytes, mtu: usize, payloads: &mut Vec<Bytes>) {
        if nalu.len() < H265NALU_HEADER_SIZE {
            return;
        }

        let header = H265NALUHeader::new(nalu[0], nalu[1]);
        if header.f() {
            return;
        }

        // Single NALU
        if nalu.len() <= mtu {
            payloads.push(nalu.clone());
            return;
        }

        // FU
        if mtu <= H265NALU_HEADER_SIZE + H265FRAGMENTATION_UNIT_HEADER_SIZE {
            return;
        }
        let max_fragment_size = mtu - H265NALU_HEADER_SIZE - H265FRAGMENTATION_UNIT_HEADER_SIZE;

        // The PayloadHdr of the FU packet carries type 49 with the layer and
        // TID of the fragmented NALU; the original type moves into FuHeader.
        let payload_hdr = (header.0 & 0b1000_0001_1111_1111)
            | ((H265NALU_FRAGMENTATION_UNIT_TYPE as u16) << 9);

        let nalu_data = nalu.slice(H265NALU_HEADER_SIZE..);
        let nalu_data_length = nalu_data.len();
        let mut nalu_data_index = 0;
        let mut nalu_data_remaining = nalu_data_length;

        while nalu_data_remaining > 0 {
            let current_fragment_size = std::cmp::min(max_fragment_size, nalu_data_remaining);
            let mut out = BytesMut::with_capacity(
                H265NALU_HEADER_SIZE + H265FRAGMENTATION_UNIT_HEADER_SIZE + current_fragment_size,
            );

            out.put_u16(payload_hdr);

            //  +---------------+
            //  |0|1|2|3|4|5|6|7|
            //  +-+-+-+-+-+-+-+-+
            //  |S|E|  FuType   |
            //  +---------------+
            let mut fu_header = header.nalu_type();
            if nalu_data_remaining == nalu_data_length {
                fu_header |= 0x80;
            }
            if nalu_data_remaining == current_fragment_size {
                fu_header |= 0x40;
            }
            out.put_u8(fu_header);

            out.put(nalu_data.slice(nalu_data_index..nalu_data_index + current_fragment_size));
            payloads.push(out.freeze());

            nalu_data_remaining -= current_fragment_size;
            nalu_data_index += current_fragment_size;
        }
    }
}

impl Payloader for H265Payloader {
    /// Fragments an H265 Annex-B stream across one or more byte arrays.
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        let mut payloads = vec![];
        if payload.is_empty() || mtu == 0 {
            return Ok(payloads);
        }

        let (mut next_ind_start, mut next_ind_len) = next_ind(payload, 0);
        if next_ind_start == -1 {
            self.emit(payload, mtu, &mut payloads);
        } else {
            while next_ind_start != -1 {
                let prev_start = (next_ind_start + next_ind_len) as usize;
                let (next_ind_start2, next_ind_len2) = next_ind(payload, prev_start);
                next_ind_start = next_ind_start2;
                next_ind_len = next_ind_len2;
                if next_ind_start != -1 {
                    self.emit(
                        &payload.slice(prev_start..next_ind_start as usize),
                        mtu,
                        &mut payloads,
                    );
                } else {
                    self.emit(&payload.slice(prev_start..), mtu, &mut payloads);
                }
            }
        }

        Ok(payloads)
    }
}

/// H265Depacketizer depacketizes an H265 RTP payload into an Annex-B stream.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct H265Depacketizer {
    fu_buffer: Option<BytesMut>,
}

impl Depacketizer for H265Depacketizer {
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        if packet.len() <= H265NALU_HEADER_SIZE {
            return Err(Error::ErrShortPacket);
        }

        let header = H265NALUHeader::new(packet[0], packet[1]);
        if header.f() {
            return Err(Error::ErrH265CorruptedPacket);
        }

        let mut payload = BytesMut::new();
        match header.nalu_type() {
            H265NALU_AGGREGATION_PACKET_TYPE => {
                let mut curr_offset = H265NALU_HEADER_SIZE;
                while curr_offset < packet.len() {
                    if curr_offset + 2 > packet.len() {
                        return Err(Error::ErrShortPacket);
                    }
                    let nalu_size =
                        ((packet[curr_offset] as usize) << 8) | packet[curr_offset + 1] as usize;
                    curr_offset += 2;

                    if packet.len() < curr_offset + nalu_size {
                        return Err(Error::ErrShortPacket);
                    }

                    payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                    payload.put(&*packet.slice(curr_offset..curr_offset + nalu_size));
                    curr_offset += nalu_size;
                }
                Ok(payload.freeze())
            }
            H265NALU_FRAGMENTATION_UNIT_TYPE => {
                if packet.len() <= H265NALU_HEADER_SIZE + H265FRAGMENTATION_UNIT_HEADER_SIZE {
                    return Err(Error::ErrShortPacket);
                }

                let fu_header = packet[H265NALU_HEADER_SIZE];

                if self.fu_buffer.is_none() {
                    self.fu_buffer = Some(BytesMut::new());
                }
                if let Some(fu_buffer) = &mut self.fu_buffer {
                    fu_buffer.put(
                        &*packet
                            .slice(H265NALU_HEADER_SIZE + H265FRAGMENTATION_UNIT_HEADER_SIZE..),
                    );
                }

                if fu_header & 0x40 != 0 {
                    // End bit set, reconstruct the original NALU header
                    let fu_type = fu_header & 0b0011_1111;
                    let orig_header =
                        (header.0 & 0b1000_0001_1111_1111) | ((fu_type as u16) << 9);

                    if let Some(fu_buffer) = self.fu_buffer.take() {
                        payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                        payload.put_u16(orig_header);
                        payload.put(fu_buffer);
                    }
                    Ok(payload.freeze())
                } else {
                    Ok(Bytes::new())
                }
            }
            H265NALU_PACI_PACKET_TYPE => Err(Error::ErrInvalidH265PacketType),
            _ => {
                // Single NALU
                payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                payload.put(&*packet.clone());
                Ok(payload.freeze())
            }
        }
    }

    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.len() < 3 {
            return false;
        }

        let header = H265NALUHeader::new(payload[0], payload[1]);
        if header.is_fragmentation_unit() {
            payload[2] & 0x80 != 0
        } else {
            true
        }
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

#[cfg(test)]
mod h265_test {
    use super::*;

    #[test]
    fn test_h265_nalu_header() {
        // fragmentation unit header: type 49
        let header = H265NALUHeader::new(0x62, 0x01);
        assert!(!header.f());
        assert_eq!(header.nalu_type(), H265NALU_FRAGMENTATION_UNIT_TYPE);
        assert!(header.is_fragmentation_unit());
        assert_eq!(header.tid(), 1);
    }

    #[test]
    fn test_h265_single_nalu_roundtrip() {
        let mut payloader = H265Payloader;
        let mut depacketizer = H265Depacketizer::default();

        // type 32 (VPS) NALU
        let raw = Bytes::from_static(&[0x00, 0x00, 0x01, 0x40, 0x01, 0xAA, 0xBB]);
        let payloads = payloader.payload(100, &raw).unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], Bytes::from_static(&[0x40, 0x01, 0xAA, 0xBB]));

        let out = depacketizer.depacketize(&payloads[0]).unwrap();
        assert_eq!(
            out,
            Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0xAA, 0xBB])
        );
    }

    #[test]
    fn test_h265_fu_roundtrip() {
        let mut payloader = H265Payloader;
        let mut depacketizer = H265Depacketizer::default();

        // type 19 (IDR_W_RADL) with a large body
        let mut nalu = vec![0x26, 0x01];
        nalu.extend((0u8..=199).collect::<Vec<u8>>());
        let mut raw = vec![0x00, 0x00, 0x00, 0x01];
        raw.extend_from_slice(&nalu);

        let payloads = payloader.payload(50, &Bytes::from(raw)).unwrap();
        assert!(payloads.len() > 1);

        assert!(depacketizer.is_partition_head(&payloads[0]));
        for p in &payloads[1..] {
            assert!(!depacketizer.is_partition_head(p));
        }

        let mut out = BytesMut::new();
        for p in &payloads {
            out.put(depacketizer.depacketize(p).unwrap());
        }

        let mut expected = BytesMut::new();
        expected.put(&*ANNEXB_NALUSTART_CODE.clone());
        expected.put(&nalu[..]);
        assert_eq!(out, expected);
    }
}
