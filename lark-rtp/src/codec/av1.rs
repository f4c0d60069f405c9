//! AV1 RTP payload format (<https://aomediacodec.github.io/av1-rtp-spec/>).
//!
//! OBU elements travel length-prefixed behind a one byte aggregation header;
//! large OBUs are fragmented across packets with the Z/Y continuation flags.

use bytes::{BufMut, Bytes, BytesMut};

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

// Aggregation header bit masks
// |Z|Y| W |N|-|-|-|
pub const AV1_Z_MASK: u8 = 0b1000_0000;
pub const AV1_Y_MASK: u8 = 0b0100_0000;
pub const AV1_W_MASK: u8 = 0b0011_0000;
pub const AV1_N_MASK: u8 = 0b0000_1000;

pub const OBU_TYPE_MASK: u8 = 0b0111_1000;
pub const OBU_HAS_SIZE_BIT: u8 = 0b0000_0010;
pub const OBU_HAS_EXTENSION_BIT: u8 = 0b0000_0100;

pub const OBU_TYPE_SEQUENCE_HEADER: u8 = 1;
pub const OBU_TYPE_TEMPORAL_DELIMITER: u8 = 2;
pub const OBU_TYPE_TILE_LIST: u8 = 8;

/// Reads an unsigned LEB128 value; returns the value and the number of bytes
/// consumed, or (0, 0) when the buffer ends mid-value.
pub fn read_leb128(bytes: &Bytes) -> (u32, usize) {
    let mut value: u32 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= ((b & 0x7F) as u32) << (i * 7);
        if b & 0x80 == 0 {
            return (value, i + 1);
        }
        if i >= 4 {
            break;
        }
    }
    (0, 0)
}

/// Appends `value` as unsigned LEB128.
pub fn write_leb128(out: &mut BytesMut, mut value: u32) {
    loop {
        let mut b = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            b |= 0x80;
        }
        out.put_u8(b);
        if value == 0 {
            return;
        }
    }
}

fn obu_type(header: u8) -> u8 {
    (header & OBU_TYPE_MASK) >> 3
}

/// Av1Payloader fragments an AV1 low overhead bitstream into RTP payloads.
#[derive(Default, Debug, Clone)]
pub struct Av1Payloader;

impl Av1Payloader {
    /// Splits the input into OBUs. Each OBU must carry a size field so the
    /// stream can be delimited; a trailing OBU without one consumes the rest.
    fn split_obus(payload: &Bytes) -> Result<Vec<Bytes>> {
        let mut obus = vec![];
        let mut offset = 0;
        while offset < payload.len() {
            let header = payload[offset];
            let header_size = if header & OBU_HAS_EXTENSION_BIT != 0 {
                2
            } else {
                1
            };
            if offset + header_size > payload.len() {
                return Err(Error::ErrPayloadTooSmallForObuExtensionHeader);
            }

            if header & OBU_HAS_SIZE_BIT == 0 {
                // Without a size field the OBU extends to the end of the frame.
                obus.push(payload.slice(offset..));
                break;
            }

            let size_slice = payload.slice(offset + header_size..);
            let (obu_size, leb_size) = read_leb128(&size_slice);
            if leb_size == 0 {
                return Err(Error::ErrPayloadTooSmallForObuPayloadSize);
            }
            let total = header_size + leb_size + obu_size as usize;
            if offset + total > payload.len() {
                return Err(Error::ErrPayloadTooSmallForObuPayloadSize);
            }
            obus.push(payload.slice(offset..offset + total));
            offset += total;
        }
        Ok(obus)
    }
}

impl Payloader for Av1Payloader {
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() {
            return Ok(vec![]);
        }
        if mtu < 8 {
            return Err(Error::ErrShortPacket);
        }

        let mut elements = vec![];
        let mut new_sequence = false;
        for obu in Av1Payloader::split_obus(payload)? {
            let typ = obu_type(obu[0]);
            if typ == OBU_TYPE_TEMPORAL_DELIMITER || typ == OBU_TYPE_TILE_LIST {
                continue;
            }
            if typ == OBU_TYPE_SEQUENCE_HEADER {
                new_sequence = true;
            }
            elements.push(obu);
        }

        let mut payloads: Vec<Bytes> = vec![];
        let mut current = BytesMut::new();
        current.put_u8(0); // aggregation header, patched below
        let mut continues_fragment = false;

        for element in elements {
            let mut remaining = element;
            loop {
                // room left after the length prefix of this element
                let prefix_max = 5;
                if current.len() + prefix_max >= mtu {
                    payloads.push(current.freeze());
                    current = BytesMut::new();
                    current.put_u8(if continues_fragment { AV1_Z_MASK } else { 0 });
                }
                let room = mtu - current.len();
                let mut length_budget = BytesMut::new();
                let take = std::cmp::min(remaining.len(), room.saturating_sub(prefix_max));
                write_leb128(&mut length_budget, take as u32);

                current.put(length_budget);
                current.put(remaining.slice(..take));

                if take == remaining.len() {
                    continues_fragment = false;
                    break;
                }

                // element continues in the next packet
                remaining = remaining.slice(take..);
                current[0] |= AV1_Y_MASK;
                payloads.push(current.freeze());
                current = BytesMut::new();
                current.put_u8(AV1_Z_MASK);
                continues_fragment = true;
            }
        }

        if current.len() > 1 {
            payloads.push(current.freeze());
        }

        if new_sequence {
            if let Some(first) = payloads.first_mut() {
                let mut patched = BytesMut::from(&first[..]);
                patched[0] |= AV1_N_MASK;
                *first = patched.freeze();
            }
        }

        Ok(payloads)
    }
}

/// Av1Depacketizer reassembles AV1 RTP payloads into a low overhead
/// bitstream with obu_size fields.
#[derive(Default, Debug, Clone)]
pub struct Av1Depacketizer {
    /// Partial OBU carried over from the previous packet
    fragment: BytesMut,
    /// Z flag of the last parsed packet
    pub z: bool,
    /// Y flag of the last parsed packet
    pub y: bool,
    /// N flag of the last parsed packet
    pub n: bool,
}

impl Av1Depacketizer {
    /// Emits one complete OBU element, adding the size field when absent.
    fn emit_obu(&mut self, obu: Bytes, out: &mut BytesMut) -> Result<()> {
        if obu.is_empty() {
            return Ok(());
        }

        let typ = obu_type(obu[0]);
        if typ == OBU_TYPE_TEMPORAL_DELIMITER || typ == OBU_TYPE_TILE_LIST {
            return Ok(());
        }

        let header_size = if obu[0] & OBU_HAS_EXTENSION_BIT != 0 {
            2
        } else {
            1
        };
        if obu.len() < header_size {
            return Err(Error::ErrShortPacket);
        }

        if obu[0] & OBU_HAS_SIZE_BIT != 0 {
            let size_slice = obu.slice(header_size..);
            let (obu_size, leb_size) = read_leb128(&size_slice);
            if leb_size == 0 || header_size + leb_size + obu_size as usize != obu.len() {
                return Err(Error::ErrShortPacket);
            }
            out.extend_from_slice(&obu);
        } else {
            out.put_u8(obu[0] | OBU_HAS_SIZE_BIT);
            if header_size == 2 {
                out.put_u8(obu[1]);
            }
            write_leb128(out, (obu.len() - header_size) as u32);
            out.extend_from_slice(&obu[header_size..]);
        }
        Ok(())
    }
}

impl Depacketizer for Av1Depacketizer {
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        if packet.len() <= 1 {
            return Err(Error::ErrShortPacket);
        }

        self.z = packet[0] & AV1_Z_MASK != 0;
        self.y = packet[0] & AV1_Y_MASK != 0;
        self.n = packet[0] & AV1_N_MASK != 0;
        let obu_count = (packet[0] & AV1_W_MASK) >> 4;

        if self.n {
            self.fragment.clear();
        }
        if !self.z && !self.fragment.is_empty() {
            // first fragment was lost, drop the leftover
            self.fragment.clear();
        }

        let mut out = BytesMut::new();
        let mut offset = 1;
        let mut element_index = 0u8;

        while offset < packet.len() {
            let last_counted = obu_count != 0 && element_index == obu_count - 1;

            let (element_len, is_last) = if last_counted {
                // last element when W != 0 carries no length field
                (packet.len() - offset, true)
            } else {
                let slice = packet.slice(offset..);
                let (len, n) = read_leb128(&slice);
                if n == 0 {
                    return Err(Error::ErrShortPacket);
                }
                offset += n;
                let ends_packet = offset + len as usize == packet.len();
                (len as usize, obu_count == 0 && ends_packet)
            };

            if offset + element_len > packet.len() {
                return Err(Error::ErrShortPacket);
            }
            let element = packet.slice(offset..offset + element_len);
            offset += element_len;

            let first = element_index == 0;
            element_index += 1;

            if first && self.z {
                if self.fragment.is_empty() {
                    // lost the beginning of this OBU, skip it
                    continue;
                }
                self.fragment.extend_from_slice(&element);
                if is_last && self.y {
                    // still not complete
                    return Ok(out.freeze());
                }
                let whole = std::mem::take(&mut self.fragment).freeze();
                self.emit_obu(whole, &mut out)?;
                continue;
            }

            if is_last && self.y {
                // last element continues in the next packet
                self.fragment = BytesMut::from(&element[..]);
                break;
            }

            self.emit_obu(element, &mut out)?;

            if is_last {
                break;
            }
        }

        Ok(out.freeze())
    }

    /// A payload whose first element does not continue a previous OBU starts
    /// a new partition.
    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.is_empty() {
            return false;
        }
        payload[0] & AV1_Z_MASK == 0
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

#[cfg(test)]
mod av1_test {
    use super::*;

    fn obu_with_size(typ: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![(typ << 3) | OBU_HAS_SIZE_BIT];
        let mut len = BytesMut::new();
        write_leb128(&mut len, body.len() as u32);
        out.extend_from_slice(&len);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_leb128_roundtrip() {
        let tests = vec![0u32, 5, 127, 128, 1000, 16383, 16384, 100000];
        for value in tests {
            let mut out = BytesMut::new();
            write_leb128(&mut out, value);
            let (parsed, n) = read_leb128(&out.freeze());
            assert_eq!(parsed, value);
            assert!(n > 0);
        }
    }

    #[test]
    fn test_av1_single_packet_roundtrip() {
        let mut payloader = Av1Payloader;
        let mut depacketizer = Av1Depacketizer::default();

        let frame = Bytes::from(obu_with_size(6, &[1, 2, 3, 4, 5]));
        let payloads = payloader.payload(1200, &frame).unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(depacketizer.is_partition_head(&payloads[0]));

        let out = depacketizer.depacketize(&payloads[0]).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_av1_fragmented_roundtrip() {
        let mut payloader = Av1Payloader;
        let mut depacketizer = Av1Depacketizer::default();

        let body: Vec<u8> = (0u8..=255).cycle().take(300).collect();
        let frame = Bytes::from(obu_with_size(6, &body));
        let payloads = payloader.payload(100, &frame).unwrap();
        assert!(payloads.len() > 1);

        assert!(depacketizer.is_partition_head(&payloads[0]));
        for p in &payloads[1..] {
            assert!(!depacketizer.is_partition_head(p));
        }

        let mut out = BytesMut::new();
        for p in &payloads {
            out.put(depacketizer.depacketize(p).unwrap());
        }
        assert_eq!(out.freeze(), frame);
    }

    #[test]
    fn test_av1_temporal_delimiter_skipped() {
        let mut payloader = Av1Payloader;

        let mut frame = obu_with_size(OBU_TYPE_TEMPORAL_DELIMITER, &[]);
        frame.extend_from_slice(&obu_with_size(6, &[9, 9, 9]));
        let payloads = payloader.payload(1200, &Bytes::from(frame)).unwrap();
        assert_eq!(payloads.len(), 1);

        let mut depacketizer = Av1Depacketizer::default();
        let out = depacketizer.depacketize(&payloads[0]).unwrap();
        assert_eq!(out, Bytes::from(obu_with_size(6, &[9, 9, 9])));
    }

    #[test]
    fn test_av1_new_sequence_sets_n() {
        let mut payloader = Av1Payloader;

        let frame = Bytes::from(obu_with_size(OBU_TYPE_SEQUENCE_HEADER, &[0xAA]));
        let payloads = payloader.payload(1200, &frame).unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0][0] & AV1_N_MASK != 0);
    }
}
