//! VP9 RTP payload format (draft-ietf-payload-vp9), flexible mode.

use bytes::{BufMut, Bytes, BytesMut};

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

pub const VP9HEADER_SIZE: usize = 3;
const MAX_SPATIAL_LAYERS: u8 = 5;
const MAX_VP9REF_PICS: usize = 3;

/// Vp9Payloader payloads VP9 packets in flexible mode with a 15-bit
/// picture id on every packet.
#[derive(Default, Debug, Clone)]
pub struct Vp9Payloader {
    picture_id: u16,
    initialized: bool,
}

impl Payloader for Vp9Payloader {
    /*
     * https://www.ietf.org/id/draft-ietf-payload-vp9-13.txt
     *
     * Flexible mode (F=1)
     *        0 1 2 3 4 5 6 7
     *       +-+-+-+-+-+-+-+-+
     *       |I|P|L|F|B|E|V|Z| (REQUIRED)
     *       +-+-+-+-+-+-+-+-+
     *  I:   |M| PICTURE ID  | (RECOMMENDED)
     *       +-+-+-+-+-+-+-+-+
     *  M:   | EXTENDED PID  | (RECOMMENDED)
     *       +-+-+-+-+-+-+-+-+
     */
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        if payload.is_empty() || mtu == 0 {
            return Ok(vec![]);
        }

        if !self.initialized {
            self.picture_id = rand::random::<u16>() & 0x7FFF;
            self.initialized = true;
        }

        if mtu <= VP9HEADER_SIZE {
            return Err(Error::ErrShortPacket);
        }
        let max_fragment_size = mtu - VP9HEADER_SIZE;

        let mut payloads = vec![];
        let mut payload_data_remaining = payload.len();
        let mut payload_data_index = 0;

        while payload_data_remaining > 0 {
            let current_fragment_size = std::cmp::min(max_fragment_size, payload_data_remaining);
            let mut out = BytesMut::with_capacity(VP9HEADER_SIZE + current_fragment_size);

            let mut b0 = 0x90u8; // I=1, F=1
            if payload_data_index == 0 {
                b0 |= 0x08; // B=1
            }
            if payload_data_remaining == current_fragment_size {
                b0 |= 0x04; // E=1
            }
            out.put_u8(b0);
            out.put_u8(0x80 | (self.picture_id >> 8) as u8);
            out.put_u8(self.picture_id as u8);

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

/// Vp9Depacketizer depacketizes a VP9 RTP payload.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct Vp9Depacketizer {
    /// picture ID is present
    pub i: bool,
    /// inter-picture predicted frame
    pub p: bool,
    /// layer indices present
    pub l: bool,
    /// flexible mode
    pub f: bool,
    /// start of a frame
    pub b: bool,
    /// end of a frame
    pub e: bool,
    /// scalability structure (SS) data present
    pub v: bool,
    /// Not a reference frame for upper spatial layers
    pub z: bool,

    /// 7 or 15 bits, picture ID
    pub picture_id: u16,

    pub tid: u8,
    pub u: bool,
    pub sid: u8,
    pub d: bool,

    pub tl0picidx: u8,

    /// Reference index (F=1)
    pub pdiff: Vec<u8>,

    // Scalability structure headers
    pub ns: u8,
    pub y: bool,
    pub g: bool,
    pub ng: u8,
    pub width: Vec<u16>,
    pub height: Vec<u16>,
}

impl Depacketizer for Vp9Depacketizer {
    /// Parses the passed byte slice and stores the result in the
    /// Vp9Depacketizer, returning the VP9 payload.
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        if packet.is_empty() {
            return Err(Error::ErrShortPacket);
        }

        let b0 = packet[0];
        self.i = b0 & 0x80 != 0;
        self.p = b0 & 0x40 != 0;
        self.l = b0 & 0x20 != 0;
        self.f = b0 & 0x10 != 0;
        self.b = b0 & 0x08 != 0;
        self.e = b0 & 0x04 != 0;
        self.v = b0 & 0x02 != 0;
        self.z = b0 & 0x01 != 0;

        let mut pos = 1;

        if self.i {
            pos = self.parse_picture_id(packet, pos)?;
        }
        if self.l {
            pos = self.parse_layer_info(packet, pos)?;
        }
        if self.f && self.p {
            pos = self.parse_ref_indices(packet, pos)?;
        }
        if self.v {
            pos = self.parse_ssdata(packet, pos)?;
        }

        if pos >= packet.len() {
            return Err(Error::ErrShortPacket);
        }
        Ok(packet.slice(pos..))
    }

    /// Checks whether if this is a head of the VP9 partition.
    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.is_empty() {
            false
        } else {
            (payload[0] & 0x08) != 0
        }
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

impl Vp9Depacketizer {
    fn parse_picture_id(&mut self, packet: &Bytes, mut pos: usize) -> Result<usize> {
        if packet.len() <= pos {
            return Err(Error::ErrShortPacket);
        }

        self.picture_id = (packet[pos] & 0x7F) as u16;
        if packet[pos] & 0x80 != 0 {
            pos += 1;
            if packet.len() <= pos {
                return Err(Error::ErrShortPacket);
            }
            self.picture_id = (self.picture_id << 8) | packet[pos] as u16;
        }
        pos += 1;
        Ok(pos)
    }

    fn parse_layer_info(&mut self, packet: &Bytes, mut pos: usize) -> Result<usize> {
        if packet.len() <= pos {
            return Err(Error::ErrShortPacket);
        }

        let b = packet[pos];
        self.tid = b >> 5;
        self.u = b & 0x10 != 0;
        self.sid = (b >> 1) & 0x7;
        self.d = b & 0x01 != 0;

        if self.sid >= MAX_SPATIAL_LAYERS {
            return Err(Error::ErrTooManySpatialLayers);
        }
        pos += 1;

        // non-flexible mode carries TL0PICIDX
        if !self.f {
            if packet.len() <= pos {
                return Err(Error::ErrShortPacket);
            }
            self.tl0picidx = packet[pos];
            pos += 1;
        }
        Ok(pos)
    }

    fn parse_ref_indices(&mut self, packet: &Bytes, mut pos: usize) -> Result<usize> {
        self.pdiff.clear();
        loop {
            if packet.len() <= pos {
                return Err(Error::ErrShortPacket);
            }
            let b = packet[pos];
            self.pdiff.push(b >> 1);
            pos += 1;
            if b & 0x01 == 0 {
                break;
            }
            if self.pdiff.len() >= MAX_VP9REF_PICS {
                return Err(Error::ErrTooManyPDiff);
            }
        }
        Ok(pos)
    }

    fn parse_ssdata(&mut self, packet: &Bytes, mut pos: usize) -> Result<usize> {
        if packet.len() <= pos {
            return Err(Error::ErrShortPacket);
        }

        let b = packet[pos];
        self.ns = b >> 5;
        self.y = b & 0x10 != 0;
        self.g = b & 0x08 != 0;
        pos += 1;

        let ns = (self.ns + 1) as usize;
        self.ng = 0;

        if self.y {
            if packet.len() <= pos + 4 * ns - 1 {
                return Err(Error::ErrShortPacket);
            }
            self.width = Vec::with_capacity(ns);
            self.height = Vec::with_capacity(ns);
            for _ in 0..ns {
                self.width
                    .push(((packet[pos] as u16) << 8) | packet[pos + 1] as u16);
                pos += 2;
                self.height
                    .push(((packet[pos] as u16) << 8) | packet[pos + 1] as u16);
                pos += 2;
            }
        }

        if self.g {
            if packet.len() <= pos {
                return Err(Error::ErrShortPacket);
            }
            self.ng = packet[pos];
            pos += 1;
        }

        for _ in 0..self.ng {
            if packet.len() <= pos {
                return Err(Error::ErrShortPacket);
            }
            let b = packet[pos];
            let r = (b >> 2) & 0x3;
            pos += 1;

            pos += r as usize;
            if packet.len() < pos {
                return Err(Error::ErrShortPacket);
            }
        }
        Ok(pos)
    }
}

#[cfg(test)]
mod vp9_test {
    use super::*;

    #[test]
    fn test_vp9_depacketize_errors() {
        let mut pck = Vp9Depacketizer::default();

        // Empty packet
        assert_eq!(pck.depacketize(&Bytes::new()), Err(Error::ErrShortPacket));

        // Header only, no payload
        assert_eq!(
            pck.depacketize(&Bytes::from_static(&[0x90, 0x80, 0x01])),
            Err(Error::ErrShortPacket)
        );
    }

    #[test]
    fn test_vp9_payload_roundtrip() {
        let mut payloader = Vp9Payloader::default();
        let mut depacketizer = Vp9Depacketizer::default();

        let frame = Bytes::from((0u8..=99).collect::<Vec<u8>>());
        let payloads = payloader.payload(23, &frame).unwrap();
        assert_eq!(payloads.len(), 5);

        assert!(depacketizer.is_partition_head(&payloads[0]));
        for p in &payloads[1..] {
            assert!(!depacketizer.is_partition_head(p));
        }

        let mut out = BytesMut::new();
        let mut pids = vec![];
        for p in &payloads {
            out.put(depacketizer.depacketize(p).unwrap());
            pids.push(depacketizer.picture_id);
        }
        assert_eq!(out.freeze(), frame);

        // one picture id for the whole frame
        pids.dedup();
        assert_eq!(pids.len(), 1);

        // E bit only on the final fragment
        assert!(depacketizer.e);
    }

    #[test]
    fn test_vp9_picture_id_advances_per_frame() {
        let mut payloader = Vp9Payloader::default();

        let frame = Bytes::from_static(&[0x00, 0x01]);
        let first = payloader.payload(100, &frame).unwrap();
        let second = payloader.payload(100, &frame).unwrap();

        let pid = |p: &Bytes| (((p[1] & 0x7F) as u16) << 8) | p[2] as u16;
        assert_eq!(
            pid(&second[0]),
            pid(&first[0]).wrapping_add(1) & 0x7FFF
        );
    }
}
