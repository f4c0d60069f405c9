use std::any::Any;
use std::fmt;

use bytes::Buf;

use crate::header::*;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// A FIREntry is a (ssrc, seqno) pair inside a FullIntraRequest.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct FirEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
}

/// The FullIntraRequest packet is used to reliably request an Intra frame in
/// a video stream. See RFC 5104 §3.5.1. This is not for resolving losses --
/// use PictureLossIndication (PLI) instead.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl fmt::Display for FullIntraRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("FullIntraRequest {:x} {:x}", self.sender_ssrc, self.media_ssrc);
        for e in &self.fir {
            out += format!(" ({:x} {})", e.ssrc, e.sequence_number).as_str();
        }
        write!(f, "{out}")
    }
}

impl Packet for FullIntraRequest {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_FIR,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.fir.iter().map(|e| e.ssrc).collect()
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + SSRC_LENGTH * 2 + self.fir.len() * 8
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<FullIntraRequest>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for FullIntraRequest {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for FullIntraRequest {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let header = self.header();
        let mut n = header.marshal_to(buf)?;

        buf[n..n + 4].copy_from_slice(&self.sender_ssrc.to_be_bytes());
        n += 4;
        buf[n..n + 4].copy_from_slice(&self.media_ssrc.to_be_bytes());
        n += 4;

        for fir in &self.fir {
            buf[n..n + 4].copy_from_slice(&fir.ssrc.to_be_bytes());
            n += 4;
            buf[n] = fir.sequence_number;
            n += 1;
            buf[n] = 0;
            buf[n + 1] = 0;
            buf[n + 2] = 0;
            n += 3;
        }

        Ok(n)
    }
}

impl Unmarshal for FullIntraRequest {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH + SSRC_LENGTH * 2 {
            return Err(Error::PacketTooShort);
        }

        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::PayloadSpecificFeedback || header.count != FORMAT_FIR
        {
            return Err(Error::WrongType);
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let mut fir = vec![];
        while raw_packet.remaining() >= 8 {
            let ssrc = raw_packet.get_u32();
            let sequence_number = raw_packet.get_u8();
            raw_packet.advance(3);
            fir.push(FirEntry {
                ssrc,
                sequence_number,
            });
        }

        Ok(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}

#[cfg(test)]
mod fir_test {
    use super::*;

    #[test]
    fn test_fir_roundtrip() {
        let fir = FullIntraRequest {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            fir: vec![FirEntry {
                ssrc: 0x12345678,
                sequence_number: 0x42,
            }],
        };

        let data = fir.marshal().unwrap();
        let mut buf = data.freeze();
        let decoded = FullIntraRequest::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, fir);
    }
}
