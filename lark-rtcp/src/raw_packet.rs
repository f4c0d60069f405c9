use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};

use crate::header::Header;
use crate::packet::Packet;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// RawPacket represents an unparsed RTCP packet. It is the fallthrough for
/// packet types this implementation does not model.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct RawPacket(pub Bytes);

impl fmt::Display for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPacket: {:?}", self.0)
    }
}

impl Packet for RawPacket {
    /// Returns the Header associated with this packet.
    fn header(&self) -> Header {
        let mut buf = self.0.clone();
        Header::unmarshal(&mut buf).unwrap_or_default()
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![]
    }

    fn raw_size(&self) -> usize {
        self.0.len()
    }

    fn as_any(&self) -> &(dyn Any) {
        self
    }

    fn equal(&self, other: &(dyn Packet)) -> bool {
        other
            .as_any()
            .downcast_ref::<RawPacket>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for RawPacket {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for RawPacket {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.0.len() {
            return Err(Error::BufferTooShort);
        }
        buf[..self.0.len()].copy_from_slice(&self.0);
        Ok(self.0.len())
    }
}

impl Unmarshal for RawPacket {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let len = raw_packet.remaining();
        if len < 4 {
            return Err(Error::PacketTooShort);
        }
        Ok(RawPacket(raw_packet.copy_to_bytes(len)))
    }
}
