//! VP8 RTP payload format (RFC 7741).

use bytes::{BufMut, Bytes, BytesMut};

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

pub const VP8_HEADER_SIZE: usize = 1;

/// Vp8Payloader payloads VP8 packets
#[derive(Default, Debug, Clone)]
pub struct Vp8Payloader {
    pub enable_picture_id: bool,
    picture_id: u16,
}

impl Payloader for Vp8Payloader {
    /// Fragments a VP8 packet across one or more byte arrays.
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() || mtu == 0 {
            return Ok(vec![]);
        }

        /*
         * https://tools.ietf.org/html/rfc7741#section-4.2
         *
         *       0 1 2 3 4 5 6 7
         *      +-+-+-+-+-+-+-+-+
         *      |X|R|N|S|R| PID | (REQUIRED)
         *      +-+-+-+-+-+-+-+-+
         * X:   |I|L|T|K| RSV   | (OPTIONAL)
         *      +-+-+-+-+-+-+-+-+
         * I:   |M| PictureID   | (OPTIONAL)
         *      +-+-+-+-+-+-+-+-+
         *
         * S: Start of VP8 partition.  SHOULD be set to 1 when the first payload
         *    octet of the RTP packet is the beginning of a new VP8 partition,
         *    and MUST NOT be 1 otherwise.
         */
        let using_header_size = if self.enable_picture_id {
            if self.picture_id == 0 {
                VP8_HEADER_SIZE
            } else if self.picture_id < 128 {
                VP8_HEADER_SIZE + 2
            } else {
                VP8_HEADER_SIZE + 3
            }
        } else {
            VP8_HEADER_SIZE
        };

        if mtu <= using_header_size {
            return Err(Error::ErrShortPacket);
        }
        let max_fragment_size = mtu - using_header_size;

        let mut payloads = vec![];
        let mut payload_data_remaining = payload.len();
        let mut payload_data_index = 0;
        let mut first = true;

        while payload_data_remaining > 0 {
            let current_fragment_size = std::cmp::min(max_fragment_size, payload_data_remaining);
            let mut out = BytesMut::with_capacity(using_header_size + current_fragment_size);
            let mut buf = [0u8; 4];
            if first {
                buf[0] = 0x10;
                first = false;
            }

            if self.enable_picture_id {
                if self.picture_id < 128 && self.picture_id > 0 {
                    buf[0] |= 0x80;
                    buf[1] |= 0x80;
                    buf[2] |= self.picture_id as u8 & 0x7F;
                } else if self.picture_id >= 128 {
                    buf[0] |= 0x80;
                    buf[1] |= 0x80;
                    buf[2] |= 0x80 | ((self.picture_id >> 8) as u8 & 0x7F);
                    buf[3] |= self.picture_id as u8;
                }
            }

            out.put(&buf[..using_header_size]);

            out.put(
                &*payload.slice(payload_data_index..payload_data_index + current_fragment_size),
            );
            payloads.push(out.freeze());

            payload_data_remaining -= current_fragment_size;
            payload_data_index += current_fragment_size;
        }

        self.picture_id = self.picture_id.wrapping_add(1) & 0x7FFF;

        Ok(payloads)
    }
}

/// Vp8Depacketizer depacketizes a VP8 RTP payload.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct Vp8Depacketizer {
    /// Required Header
    /// extended control bits present
    pub x: u8,
    /// when set to 1 this frame can be discarded
    pub n: u8,
    /// start of VP8 partition
    pub s: u8,
    /// partition index
    pub pid: u8,

    /// Extended control bits
    /// 1 if PictureID is present
    pub i: u8,
    /// 1 if tl0picidx is present
    pub l: u8,
    /// 1 if tid is present
    pub t: u8,
    /// 1 if keyidx is present
    pub k: u8,

    /// 8 or 16 bits, picture ID
    pub picture_id: u16,
    /// 8 bits temporal level zero index
    pub tl0_pic_idx: u8,
    /// 2 bits temporal layer index
    pub tid: u8,
    /// 1 bit layer sync bit
    pub y: u8,
    /// 5 bits temporal key frame index
    pub key_idx: u8,
}

impl Depacketizer for Vp8Depacketizer {
    /// Parses the passed byte slice and stores the result in the
    /// Vp8Depacketizer, returning the VP8 payload.
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        let payload_len = packet.len();
        if payload_len < 4 {
            return Err(Error::ErrShortPacket);
        }

        let mut payload_index = 0;

        self.x = (packet[payload_index] & 0x80) >> 7;
        self.n = (packet[payload_index] & 0x20) >> 5;
        self.s = (packet[payload_index] & 0x10) >> 4;
        self.pid = packet[payload_index] & 0x07;

        payload_index += 1;

        if self.x == 1 {
            self.i = (packet[payload_index] & 0x80) >> 7;
            self.l = (packet[payload_index] & 0x40) >> 6;
            self.t = (packet[payload_index] & 0x20) >> 5;
            self.k = (packet[payload_index] & 0x10) >> 4;
            payload_index += 1;
        } else {
            self.i = 0;
            self.l = 0;
            self.t = 0;
            self.k = 0;
        }

        if self.i == 1 {
            // PID present?
            if packet[payload_index] & 0x80 > 0 {
                // M == 1, PID is 16bit
                self.picture_id = (((packet[payload_index] & 0x7F) as u16) << 8)
                    | (packet[payload_index + 1] as u16);
                payload_index += 2;
            } else {
                self.picture_id = packet[payload_index] as u16;
                payload_index += 1;
            }
        }

        if payload_index >= payload_len {
            return Err(Error::ErrShortPacket);
        }

        if self.l == 1 {
            self.tl0_pic_idx = packet[payload_index];
            payload_index += 1;
        }

        if payload_index >= payload_len {
            return Err(Error::ErrShortPacket);
        }

        if self.t == 1 || self.k == 1 {
            if self.t == 1 {
                self.tid = packet[payload_index] >> 6;
                self.y = (packet[payload_index] >> 5) & 0x1;
            }
            if self.k == 1 {
                self.key_idx = packet[payload_index] & 0x1F;
            }
            payload_index += 1;
        }

        if payload_index >= packet.len() {
            return Err(Error::ErrShortPacket);
        }

        Ok(packet.slice(payload_index..))
    }

    /// Checks whether if this is a head of the VP8 partition.
    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.is_empty() {
            false
        } else {
            (payload[0] & 0x10) != 0
        }
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

#[cfg(test)]
mod vp8_test {
    use super::*;

    #[test]
    fn test_vp8_unmarshal_errors() {
        let mut pck = Vp8Depacketizer::default();

        // Nil payload
        let result = pck.depacketize(&Bytes::new());
        assert!(result.is_err(), "result should be err in case of nil payload");

        // Payload smaller than header size
        let small = Bytes::from_static(&[0x00, 0x11, 0x22]);
        let result = pck.depacketize(&small);
        assert!(result.is_err(), "result should be err in case of small payload");
    }

    #[test]
    fn test_vp8_unmarshal_normal() {
        let mut pck = Vp8Depacketizer::default();

        // Normal payload, X bit unset
        let raw = Bytes::from_static(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let payload = pck.depacketize(&raw).unwrap();
        assert_eq!(payload, Bytes::from_static(&[0x11, 0x22, 0x33, 0x44, 0x55]));

        // Header size, X and I, PID 16bit
        let raw = Bytes::from_static(&[0x80, 0x80, 0x81, 0x00, 0xAA]);
        let payload = pck.depacketize(&raw).unwrap();
        assert_eq!(payload, Bytes::from_static(&[0xAA]));
        assert_eq!(pck.picture_id, 0x100);

        // Header size, X and L
        let raw = Bytes::from_static(&[0x80, 0x40, 0x02, 0xAA]);
        let payload = pck.depacketize(&raw).unwrap();
        assert_eq!(payload, Bytes::from_static(&[0xAA]));
        assert_eq!(pck.tl0_pic_idx, 0x02);
    }

    #[test]
    fn test_vp8_payload_fragmentation() {
        let mut payloader = Vp8Payloader::default();
        let payload = Bytes::from(vec![0x90u8; 5]);

        // fragment into mtu=3 => 2 bytes of payload per packet
        let payloads = payloader.payload(3, &payload).unwrap();
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0], Bytes::from_static(&[0x10, 0x90, 0x90]));
        assert_eq!(payloads[1], Bytes::from_static(&[0x00, 0x90, 0x90]));
        assert_eq!(payloads[2], Bytes::from_static(&[0x00, 0x90]));
    }

    #[test]
    fn test_vp8_payload_roundtrip_via_depacketizer() {
        let mut payloader = Vp8Payloader::default();
        let mut depacketizer = Vp8Depacketizer::default();

        let frame = Bytes::from((0u8..=200).collect::<Vec<u8>>());
        let payloads = payloader.payload(20, &frame).unwrap();

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
    fn test_vp8_partition_head_checker() {
        let checker = Vp8Depacketizer::default();
        assert!(!checker.is_partition_head(&Bytes::from_static(&[0x00])));
        assert!(checker.is_partition_head(&Bytes::from_static(&[0x10, 0x00, 0x00, 0x00])));
    }
}
