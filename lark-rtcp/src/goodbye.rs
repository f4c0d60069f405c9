use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};

use crate::header::*;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// The Goodbye packet indicates that one or more sources are no longer active.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Goodbye {
    /// The SSRC/CSRC identifiers that are no longer active
    pub sources: Vec<u32>,
    /// Optional text indicating the reason for leaving, e.g., "camera malfunction" or "RTP loop detected"
    pub reason: Bytes,
}

impl fmt::Display for Goodbye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "Goodbye:\n\tSources:\n".to_string();
        for s in &self.sources {
            out += format!("\t{s}\n").as_str();
        }
        out += format!("\tReason: {:?}\n", self.reason).as_str();
        write!(f, "{out}")
    }
}

impl Packet for Goodbye {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type: PacketType::Goodbye,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// Returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        self.sources.to_vec()
    }

    fn raw_size(&self) -> usize {
        let srcs_length = self.sources.len() * SSRC_LENGTH;
        let reason_length = if self.reason.is_empty() {
            0
        } else {
            self.reason.len() + 1
        };

        HEADER_LENGTH + srcs_length + reason_length
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<Goodbye>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for Goodbye {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + shared::marshal::get_padding_size(l)
    }
}

impl Marshal for Goodbye {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.sources.len() > COUNT_MAX {
            return Err(Error::TooManySources);
        }
        if self.reason.len() > SDES_MAX_OCTET_COUNT {
            return Err(Error::ReasonTooLong);
        }
        if buf.len() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let header = self.header();
        let mut n = header.marshal_to(buf)?;

        for source in &self.sources {
            buf[n..n + 4].copy_from_slice(&source.to_be_bytes());
            n += 4;
        }

        if !self.reason.is_empty() {
            buf[n] = self.reason.len() as u8;
            n += 1;
            buf[n..n + self.reason.len()].copy_from_slice(&self.reason);
            n += self.reason.len();
        }

        for _ in 0..shared::marshal::get_padding_size(self.raw_size()) {
            buf[n] = 0;
            n += 1;
        }

        Ok(n)
    }
}

impl Unmarshal for Goodbye {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::Goodbye {
            return Err(Error::WrongType);
        }

        if raw_packet.remaining() < header.count as usize * SSRC_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let mut sources = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            sources.push(raw_packet.get_u32());
        }

        let reason = if raw_packet.has_remaining() {
            let reason_len = raw_packet.get_u8() as usize;
            if raw_packet.remaining() < reason_len {
                return Err(Error::PacketTooShort);
            }
            raw_packet.copy_to_bytes(reason_len)
        } else {
            Bytes::new()
        };

        Ok(Goodbye { sources, reason })
    }
}

#[cfg(test)]
mod goodbye_test {
    use super::*;

    #[test]
    fn test_goodbye_roundtrip() {
        let bye = Goodbye {
            sources: vec![0x902f9e2e, 0x01020304],
            reason: Bytes::from_static(b"shutdown"),
        };

        let data = bye.marshal().unwrap();
        assert_eq!(data.len() % 4, 0);

        let mut buf = data.freeze();
        let decoded = Goodbye::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, bye);
    }

    #[test]
    fn test_goodbye_no_reason() {
        let bye = Goodbye {
            sources: vec![1],
            reason: Bytes::new(),
        };

        let data = bye.marshal().unwrap();
        let mut buf = data.freeze();
        let decoded = Goodbye::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, bye);
    }
}
