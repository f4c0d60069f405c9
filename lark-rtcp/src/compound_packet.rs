use std::any::Any;
use std::fmt;

use bytes::Buf;

use crate::header::{Header, PacketType};
use crate::packet::{unmarshal, Packet};
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::{SdesType, SourceDescription};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// A CompoundPacket is a collection of RTCP packets transmitted as a single
/// packet with the underlying protocol (for example UDP).
///
/// To be RFC 3550 compliant, a compound packet must begin with an SR or RR
/// packet, and an SDES packet containing a CNAME item must be included in
/// each compound RTCP packet.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct CompoundPacket(pub Vec<Box<dyn Packet>>);

impl fmt::Display for CompoundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.0 {
            writeln!(f, "{p}")?;
        }
        Ok(())
    }
}

impl CompoundPacket {
    /// Returns an error if this is not an RFC-compliant CompoundPacket.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::EmptyCompound);
        }

        // SenderReport and ReceiverReport are the only types that can start a compound packet
        if self.0[0].as_any().downcast_ref::<SenderReport>().is_none()
            && self.0[0].as_any().downcast_ref::<ReceiverReport>().is_none()
        {
            return Err(Error::BadFirstPacket);
        }

        for pkt in &self.0[1..] {
            // If the number of RecetpionReports exceeds 31 additional ReceiverReports
            // can be included here
            if pkt.as_any().downcast_ref::<ReceiverReport>().is_some() {
                continue;
            // A SourceDescription containing a CNAME must be included in every
            // CompoundPacket
            } else if let Some(sdes) = pkt.as_any().downcast_ref::<SourceDescription>() {
                let mut has_cname = false;
                for c in &sdes.chunks {
                    for it in &c.items {
                        if it.sdes_type == SdesType::SdesCname {
                            has_cname = true;
                        }
                    }
                }
                if !has_cname {
                    return Err(Error::MissingCname);
                }
                return Ok(());
            // Other packets are not permitted before the CNAME
            } else {
                return Err(Error::PacketBeforeCname);
            }
        }

        // CNAME never reached
        Err(Error::MissingCname)
    }

    /// Returns the CNAME contained in the CompoundPacket.
    pub fn cname(&self) -> Result<bytes::Bytes> {
        if self.0.is_empty() {
            return Err(Error::EmptyCompound);
        }

        for pkt in &self.0[1..] {
            if let Some(sdes) = pkt.as_any().downcast_ref::<SourceDescription>() {
                for c in &sdes.chunks {
                    for it in &c.items {
                        if it.sdes_type == SdesType::SdesCname {
                            return Ok(it.text.clone());
                        }
                    }
                }
            } else if pkt.as_any().downcast_ref::<ReceiverReport>().is_none() {
                return Err(Error::PacketBeforeCname);
            }
        }

        Err(Error::MissingCname)
    }
}

impl Packet for CompoundPacket {
    fn header(&self) -> Header {
        if self.0.is_empty() {
            Header::default()
        } else {
            self.0[0].header()
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        if self.0.is_empty() {
            vec![]
        } else {
            self.0[0].destination_ssrc()
        }
    }

    fn raw_size(&self) -> usize {
        self.0.iter().map(|p| p.marshal_size()).sum()
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<CompoundPacket>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for CompoundPacket {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for CompoundPacket {
    /// Validates the CompoundPacket and serializes all the contained packets.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        self.validate()?;

        let mut n = 0;
        for p in &self.0 {
            n += p.marshal_to(&mut buf[n..])?;
        }
        Ok(n)
    }
}

impl Unmarshal for CompoundPacket {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let packets = unmarshal(raw_packet)?;
        let c = CompoundPacket(packets);
        c.validate()?;
        Ok(c)
    }
}
