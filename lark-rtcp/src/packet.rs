use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes};

use crate::goodbye::Goodbye;
use crate::header::*;
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::raw_packet::RawPacket;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// Packet represents an RTCP packet, a protocol unit consisting of a fixed
/// header followed by structured data depending on the packet type.
pub trait Packet: Marshal + fmt::Display + fmt::Debug {
    fn header(&self) -> Header;
    fn destination_ssrc(&self) -> Vec<u32>;
    fn raw_size(&self) -> usize;
    fn as_any(&self) -> &(dyn Any);
    fn equal(&self, other: &(dyn Packet)) -> bool;
    fn cloned(&self) -> Box<dyn Packet>;
}

impl PartialEq for dyn Packet {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Clone for Box<dyn Packet> {
    fn clone(&self) -> Self {
        self.cloned()
    }
}

/// Serializes a slice of RTCP packets into a single compound buffer.
pub fn marshal(packets: &[Box<dyn Packet>]) -> Result<Bytes> {
    let mut out = bytes::BytesMut::new();
    for p in packets {
        let data = p.marshal()?;
        out.extend_from_slice(&data);
    }
    Ok(out.freeze())
}

/// unmarshal takes an entire udp datagram (which may consist of multiple
/// RTCP packets) and returns the unmarshaled packets it contains.
///
/// If this is a reduced-size RTCP packet a feedback packet (Goodbye,
/// SliceLossIndication, etc) will be returned. Otherwise, the underlying
/// type of the returned packet will be a CompoundPacket.
pub fn unmarshal<B>(raw_data: &mut B) -> Result<Vec<Box<dyn Packet>>>
where
    B: Buf,
{
    let raw = raw_data.copy_to_bytes(raw_data.remaining());

    let mut packets = vec![];
    let mut offset = 0;
    while offset < raw.len() {
        let section = raw.slice(offset..);
        let header = peek_header(&section)?;
        let packet_len = (header.length as usize + 1) * 4;
        if offset + packet_len > raw.len() {
            return Err(Error::PacketTooShort);
        }

        let packet = unmarshaller(raw.slice(offset..offset + packet_len), &header)?;
        packets.push(packet);
        offset += packet_len;
    }

    if packets.is_empty() {
        return Err(Error::InvalidHeader);
    }

    Ok(packets)
}

/// Dispatches one complete RTCP packet (header included) by type.
fn unmarshaller(raw: Bytes, header: &Header) -> Result<Box<dyn Packet>> {
    let mut buf = raw.clone();
    let packet: Box<dyn Packet> = match header.packet_type {
        PacketType::SenderReport => Box::new(SenderReport::unmarshal(&mut buf)?),
        PacketType::ReceiverReport => Box::new(ReceiverReport::unmarshal(&mut buf)?),
        PacketType::SourceDescription => Box::new(SourceDescription::unmarshal(&mut buf)?),
        PacketType::Goodbye => Box::new(Goodbye::unmarshal(&mut buf)?),
        PacketType::TransportSpecificFeedback => match header.count {
            FORMAT_TLN => Box::new(TransportLayerNack::unmarshal(&mut buf)?),
            FORMAT_TCC => Box::new(TransportLayerCc::unmarshal(&mut buf)?),
            _ => Box::new(RawPacket::unmarshal(&mut buf)?),
        },
        PacketType::PayloadSpecificFeedback => match header.count {
            FORMAT_PLI => Box::new(PictureLossIndication::unmarshal(&mut buf)?),
            FORMAT_FIR => Box::new(FullIntraRequest::unmarshal(&mut buf)?),
            _ => Box::new(RawPacket::unmarshal(&mut buf)?),
        },
        _ => Box::new(RawPacket::unmarshal(&mut buf)?),
    };

    Ok(packet)
}

#[cfg(test)]
mod packet_test {
    use super::*;

    #[test]
    fn test_packet_unmarshal_empty() {
        let mut raw = Bytes::new();
        assert!(unmarshal(&mut raw).is_err());
    }

    #[test]
    fn test_packet_unmarshal_compound() {
        // receiver report followed by a PLI
        let mut raw = Bytes::from_static(&[
            // Receiver Report (offset=0)
            0x81, 0xc9, 0x00, 0x07, // v=2, p=0, count=1, RR, len=7
            0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
            0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
            0x00, 0x00, 0x00, 0x00, // fracLost=0, totalLost=0
            0x00, 0x00, 0x46, 0xe1, // lastSeq=0x46e1
            0x00, 0x00, 0x01, 0x11, // jitter=273
            0x09, 0xf3, 0x64, 0x32, // lsr=0x9f36432
            0x00, 0x02, 0x4a, 0x79, // delay=150137
            // PictureLossIndication
            0x81, 0xce, 0x00, 0x02, // v=2, p=0, FMT=1, PSFB, len=2
            0x90, 0x2f, 0x9e, 0x2e, // sender=0x902f9e2e
            0x90, 0x2f, 0x9e, 0x2e, // media=0x902f9e2e
        ]);

        let packets = unmarshal(&mut raw).unwrap();
        assert_eq!(packets.len(), 2);

        assert!(packets[0]
            .as_any()
            .downcast_ref::<ReceiverReport>()
            .is_some());
        assert!(packets[1]
            .as_any()
            .downcast_ref::<PictureLossIndication>()
            .is_some());
    }

    #[test]
    fn test_packet_unmarshal_truncated() {
        // header promises more than the buffer holds
        let mut raw = Bytes::from_static(&[0x81, 0xc9, 0x00, 0x07, 0x90, 0x2f]);
        assert!(unmarshal(&mut raw).is_err());
    }
}
