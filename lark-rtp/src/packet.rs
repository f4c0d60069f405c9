use std::fmt;

use bytes::{Buf, Bytes};

use crate::header::Header;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// Packet represents an RTP Packet.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    /// Number of trailing padding bytes, including the count byte itself.
    /// Zero unless the header padding bit is set.
    pub padding_size: u8,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "RTP PACKET:\n".to_string();

        out += format!("\tVersion: {}\n", self.header.version).as_str();
        out += format!("\tMarker: {}\n", self.header.marker).as_str();
        out += format!("\tPayload Type: {}\n", self.header.payload_type).as_str();
        out += format!("\tSequence Number: {}\n", self.header.sequence_number).as_str();
        out += format!("\tTimestamp: {}\n", self.header.timestamp).as_str();
        out += format!("\tSSRC: {} ({:x})\n", self.header.ssrc, self.header.ssrc).as_str();
        out += format!("\tPayload Length: {}\n", self.payload.len()).as_str();

        write!(f, "{out}")
    }
}

impl Unmarshal for Packet {
    /// Parses the passed byte slice and stores the result in the Packet.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw_packet)?;
        let mut payload = raw_packet.copy_to_bytes(raw_packet.remaining());

        let padding_size = if header.padding {
            if payload.is_empty() {
                return Err(Error::ErrShortPacket);
            }
            let padding_size = payload[payload.len() - 1];
            if padding_size == 0 || padding_size as usize > payload.len() {
                return Err(Error::ErrShortPacket);
            }
            payload = payload.slice(..payload.len() - padding_size as usize);
            padding_size
        } else {
            0
        };

        Ok(Packet {
            header,
            payload,
            padding_size,
        })
    }
}

impl MarshalSize for Packet {
    /// Returns the size of the packet once marshaled.
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len() + self.padding_size as usize
    }
}

impl Marshal for Packet {
    /// Serializes the packet into the provided buffer.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.marshal_size() {
            return Err(Error::ErrBufferTooSmall);
        }

        let mut n = self.header.marshal_to(buf)?;

        buf[n..n + self.payload.len()].copy_from_slice(&self.payload);
        n += self.payload.len();

        if self.header.padding {
            if self.padding_size == 0 {
                return Err(Error::ErrShortPacket);
            }
            for _ in 0..self.padding_size - 1 {
                buf[n] = 0;
                n += 1;
            }
            buf[n] = self.padding_size;
            n += 1;
        }

        Ok(n)
    }
}

#[cfg(test)]
mod packet_test {
    use super::*;

    #[test]
    fn test_packet_unmarshal_marshal_roundtrip() {
        // profile-specific extension, one word of 0xFF
        let raw = Bytes::from_static(&[
            0x90, 0x60, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0x00, 0x01,
            0x00, 0x01, 0xff, 0xff, 0xff, 0xff, 0x98, 0x36, 0xbe, 0x88, 0x9e,
        ]);

        let mut buf = raw.clone();
        let packet = Packet::unmarshal(&mut buf).unwrap();

        assert_eq!(packet.header.version, 2);
        assert!(packet.header.extension);
        assert_eq!(packet.header.extension_profile, 1);
        assert_eq!(packet.header.sequence_number, 0x698f);
        assert_eq!(packet.header.timestamp, 0xd9c293da);
        assert_eq!(packet.header.ssrc, 0x1c642782);
        assert_eq!(
            packet.header.extensions[0].payload,
            Bytes::from_static(&[0xff, 0xff, 0xff, 0xff])
        );
        assert_eq!(
            packet.payload,
            Bytes::from_static(&[0x98, 0x36, 0xbe, 0x88, 0x9e])
        );

        let marshaled = packet.marshal().unwrap();
        assert_eq!(marshaled.freeze(), raw);
    }

    #[test]
    fn test_packet_with_padding() {
        let raw = Bytes::from_static(&[
            0xa0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0xaa, 0xbb,
            0x00, 0x00, 0x00, 0x04,
        ]);

        let mut buf = raw.clone();
        let packet = Packet::unmarshal(&mut buf).unwrap();
        assert!(packet.header.padding);
        assert_eq!(packet.payload, Bytes::from_static(&[0xaa, 0xbb]));
        assert_eq!(packet.padding_size, 4);

        let marshaled = packet.marshal().unwrap();
        assert_eq!(marshaled.freeze(), raw);
    }

    #[test]
    fn test_packet_padding_overruns() {
        // padding byte larger than payload
        let raw = Bytes::from_static(&[
            0xa0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0xff,
        ]);
        let mut buf = raw;
        assert_eq!(Packet::unmarshal(&mut buf), Err(Error::ErrShortPacket));
    }

    #[test]
    fn test_structural_equality_after_reserialize() {
        let packet = Packet {
            header: Header {
                version: 2,
                marker: true,
                payload_type: 96,
                sequence_number: 500,
                timestamp: 90000,
                ssrc: 0x1234,
                ..Default::default()
            },
            payload: Bytes::from_static(&[1, 2, 3, 4]),
            padding_size: 0,
        };

        let raw = packet.marshal().unwrap();
        let parsed = Packet::unmarshal(&mut raw.freeze()).unwrap();
        assert_eq!(parsed, packet);
    }
}
