use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};

use crate::header::*;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

pub const SDES_SOURCE_LEN: usize = 4;
pub const SDES_TYPE_LEN: usize = 1;
pub const SDES_OCTET_COUNT_LEN: usize = 1;
pub const SDES_TEXT_OFFSET: usize = 2;

/// SDESType is the item type used in the RTCP SDES control packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SdesType {
    #[default]
    SdesEnd = 0, // end of SDES list
    SdesCname = 1,    // canonical name
    SdesName = 2,     // user name
    SdesEmail = 3,    // user's electronic mail address
    SdesPhone = 4,    // user's phone number
    SdesLocation = 5, // geographic user location
    SdesTool = 6,     // name of application or tool
    SdesNote = 7,     // notice about the source
    SdesPrivate = 8,  // private extensions
}

impl fmt::Display for SdesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdesType::SdesEnd => "END",
            SdesType::SdesCname => "CNAME",
            SdesType::SdesName => "NAME",
            SdesType::SdesEmail => "EMAIL",
            SdesType::SdesPhone => "PHONE",
            SdesType::SdesLocation => "LOC",
            SdesType::SdesTool => "TOOL",
            SdesType::SdesNote => "NOTE",
            SdesType::SdesPrivate => "PRIV",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for SdesType {
    fn from(b: u8) -> Self {
        match b {
            1 => SdesType::SdesCname,
            2 => SdesType::SdesName,
            3 => SdesType::SdesEmail,
            4 => SdesType::SdesPhone,
            5 => SdesType::SdesLocation,
            6 => SdesType::SdesTool,
            7 => SdesType::SdesNote,
            8 => SdesType::SdesPrivate,
            _ => SdesType::SdesEnd,
        }
    }
}

/// A SourceDescriptionItem is a part of a SourceDescription that describes a stream.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionItem {
    pub sdes_type: SdesType,
    pub text: Bytes,
}

impl MarshalSize for SourceDescriptionItem {
    fn marshal_size(&self) -> usize {
        SDES_TYPE_LEN + SDES_OCTET_COUNT_LEN + self.text.len()
    }
}

impl SourceDescriptionItem {
    fn marshal_into(&self, buf: &mut [u8], mut n: usize) -> Result<usize> {
        if self.sdes_type == SdesType::SdesEnd {
            return Err(Error::SdesMissingType);
        }
        if self.text.len() > SDES_MAX_OCTET_COUNT {
            return Err(Error::SdesTextTooLong);
        }

        buf[n] = self.sdes_type as u8;
        n += 1;
        buf[n] = self.text.len() as u8;
        n += 1;
        buf[n..n + self.text.len()].copy_from_slice(&self.text);
        n += self.text.len();
        Ok(n)
    }
}

/// A SourceDescriptionChunk contains items describing a single RTP source.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionChunk {
    /// The source (ssrc) or contributing source (csrc) identifier this packet describes
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl MarshalSize for SourceDescriptionChunk {
    fn marshal_size(&self) -> usize {
        let mut len = SDES_SOURCE_LEN;
        for item in &self.items {
            len += item.marshal_size();
        }
        len += SDES_TYPE_LEN; // for the END marker
        len + shared::marshal::get_padding_size(len)
    }
}

/// A SourceDescription (SDES) packet describes the sources in an RTP stream.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl fmt::Display for SourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "Source Description:\n".to_string();
        for c in &self.chunks {
            out += format!("\t{:x}\n", c.source).as_str();
            for it in &c.items {
                out += format!("\t\t{:?}\n", it).as_str();
            }
        }
        write!(f, "{out}")
    }
}

impl SourceDescription {
    /// Creates an SDES packet carrying a single CNAME item.
    pub fn with_cname(ssrc: u32, cname: Bytes) -> Self {
        SourceDescription {
            chunks: vec![SourceDescriptionChunk {
                source: ssrc,
                items: vec![SourceDescriptionItem {
                    sdes_type: SdesType::SdesCname,
                    text: cname,
                }],
            }],
        }
    }
}

impl Packet for SourceDescription {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.chunks.iter().map(|x| x.source).collect()
    }

    fn raw_size(&self) -> usize {
        let mut chunks_length = 0;
        for c in &self.chunks {
            chunks_length += c.marshal_size();
        }
        HEADER_LENGTH + chunks_length
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<SourceDescription>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for SourceDescription {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.chunks.len() > COUNT_MAX {
            return Err(Error::TooManyChunks);
        }
        if buf.len() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let header = self.header();
        let mut n = header.marshal_to(buf)?;

        for chunk in &self.chunks {
            let chunk_start = n;
            buf[n..n + 4].copy_from_slice(&chunk.source.to_be_bytes());
            n += 4;
            for item in &chunk.items {
                n = item.marshal_into(buf, n)?;
            }
            // END marker plus zero padding to the word boundary
            let used = n - chunk_start + SDES_TYPE_LEN;
            let pad = shared::marshal::get_padding_size(used);
            for _ in 0..SDES_TYPE_LEN + pad {
                buf[n] = SdesType::SdesEnd as u8;
                n += 1;
            }
        }

        Ok(n)
    }
}

impl Unmarshal for SourceDescription {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::SourceDescription {
            return Err(Error::WrongType);
        }

        let mut chunks = vec![];
        for _ in 0..header.count {
            if raw_packet.remaining() < SDES_SOURCE_LEN {
                return Err(Error::PacketTooShort);
            }
            let source = raw_packet.get_u32();
            let mut items = vec![];
            let mut consumed = 0usize;

            loop {
                if raw_packet.remaining() < 1 {
                    return Err(Error::PacketTooShort);
                }
                let sdes_type = SdesType::from(raw_packet.get_u8());
                consumed += 1;
                if sdes_type == SdesType::SdesEnd {
                    // consume the null padding up to the next word boundary
                    let pad = shared::marshal::get_padding_size(SDES_SOURCE_LEN + consumed);
                    if raw_packet.remaining() < pad {
                        return Err(Error::PacketTooShort);
                    }
                    raw_packet.advance(pad);
                    break;
                }

                if raw_packet.remaining() < 1 {
                    return Err(Error::PacketTooShort);
                }
                let octet_count = raw_packet.get_u8() as usize;
                consumed += 1;
                if raw_packet.remaining() < octet_count {
                    return Err(Error::PacketTooShort);
                }
                let text = raw_packet.copy_to_bytes(octet_count);
                consumed += octet_count;
                items.push(SourceDescriptionItem { sdes_type, text });
            }

            chunks.push(SourceDescriptionChunk { source, items });
        }

        Ok(SourceDescription { chunks })
    }
}

#[cfg(test)]
mod source_description_test {
    use super::*;

    #[test]
    fn test_sdes_cname_roundtrip() {
        let sdes = SourceDescription::with_cname(0x902f9e2e, Bytes::from_static(b"{9c00eb92}"));

        let data = sdes.marshal().unwrap();
        assert_eq!(data.len() % 4, 0, "sdes must be word aligned");

        let mut buf = data.freeze();
        let decoded = SourceDescription::unmarshal(&mut buf).unwrap();
        assert_eq!(decoded, sdes);
    }

    #[test]
    fn test_sdes_missing_type() {
        let sdes = SourceDescription {
            chunks: vec![SourceDescriptionChunk {
                source: 1,
                items: vec![SourceDescriptionItem {
                    sdes_type: SdesType::SdesEnd,
                    text: Bytes::new(),
                }],
            }],
        };
        assert_eq!(sdes.marshal(), Err(Error::SdesMissingType));
    }
}
