use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

pub(crate) const PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK: u8 = 1;
pub(crate) const PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK: u8 = 2;
pub(crate) const PAYLOAD_DATA_UNORDERED_BITMASK: u8 = 4;
pub(crate) const PAYLOAD_DATA_IMMEDIATE_SACK: u8 = 8;
pub(crate) const PAYLOAD_DATA_HEADER_SIZE: usize = 12;

/// PayloadProtocolIdentifier is an enum of the PPIDs relevant to WebRTC
/// (<https://www.iana.org/assignments/sctp-parameters/sctp-parameters.xhtml#sctp-parameters-25>)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PayloadProtocolIdentifier {
    /// Data Channel Establishment Protocol control message
    Dcep = 50,
    /// UTF-8 string message
    String = 51,
    /// Binary message
    Binary = 52,
    /// Empty string message (one zero byte of payload, ignored)
    StringEmpty = 53,
    /// Empty binary message (one zero byte of payload, ignored)
    BinaryEmpty = 54,
    #[default]
    Unknown = 0,
}

impl From<u32> for PayloadProtocolIdentifier {
    fn from(v: u32) -> Self {
        match v {
            50 => PayloadProtocolIdentifier::Dcep,
            51 => PayloadProtocolIdentifier::String,
            52 => PayloadProtocolIdentifier::Binary,
            53 => PayloadProtocolIdentifier::StringEmpty,
            54 => PayloadProtocolIdentifier::BinaryEmpty,
            _ => PayloadProtocolIdentifier::Unknown,
        }
    }
}

/// ChunkPayloadData represents an SCTP DATA chunk.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0    | Reserved|U|B|E|    Length                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              TSN                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Stream Identifier S      |   Stream Sequence Number n    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Payload Protocol Identifier                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 User Data (seq n of Stream S)                 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone)]
pub struct ChunkPayloadData {
    pub(crate) unordered: bool,
    pub(crate) beginning_fragment: bool,
    pub(crate) ending_fragment: bool,
    pub(crate) immediate_sack: bool,

    pub(crate) tsn: u32,
    pub(crate) stream_identifier: u16,
    pub(crate) stream_sequence_number: u16,
    pub(crate) payload_type: PayloadProtocolIdentifier,
    pub(crate) user_data: Bytes,

    /// Bookkeeping for the retransmission machinery; never on the wire.
    pub(crate) nsent: u32,
    pub(crate) since: Option<Instant>,
    pub(crate) acked: bool,
    pub(crate) abandoned: bool,
    pub(crate) miss_indicator: u32,
    pub(crate) retransmit: bool,
}

impl Default for ChunkPayloadData {
    fn default() -> Self {
        ChunkPayloadData {
            unordered: false,
            beginning_fragment: false,
            ending_fragment: false,
            immediate_sack: false,
            tsn: 0,
            stream_identifier: 0,
            stream_sequence_number: 0,
            payload_type: PayloadProtocolIdentifier::Unknown,
            user_data: Bytes::new(),
            nsent: 0,
            since: None,
            acked: false,
            abandoned: false,
            miss_indicator: 0,
            retransmit: false,
        }
    }
}

impl PartialEq for ChunkPayloadData {
    fn eq(&self, other: &Self) -> bool {
        self.unordered == other.unordered
            && self.beginning_fragment == other.beginning_fragment
            && self.ending_fragment == other.ending_fragment
            && self.tsn == other.tsn
            && self.stream_identifier == other.stream_identifier
            && self.stream_sequence_number == other.stream_sequence_number
            && self.payload_type == other.payload_type
            && self.user_data == other.user_data
    }
}

impl ChunkPayloadData {
    pub(crate) fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.ending_fragment {
            flags |= PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK;
        }
        if self.beginning_fragment {
            flags |= PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK;
        }
        if self.unordered {
            flags |= PAYLOAD_DATA_UNORDERED_BITMASK;
        }
        if self.immediate_sack {
            flags |= PAYLOAD_DATA_IMMEDIATE_SACK;
        }
        flags
    }

    pub(crate) fn unmarshal(flags: u8, value: &Bytes) -> Result<Self> {
        if value.len() < PAYLOAD_DATA_HEADER_SIZE {
            return Err(Error::ErrChunkPayloadSmall);
        }

        let tsn = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let stream_identifier = u16::from_be_bytes([value[4], value[5]]);
        let stream_sequence_number = u16::from_be_bytes([value[6], value[7]]);
        let payload_type =
            u32::from_be_bytes([value[8], value[9], value[10], value[11]]).into();
        let user_data = value.slice(PAYLOAD_DATA_HEADER_SIZE..);

        Ok(ChunkPayloadData {
            unordered: flags & PAYLOAD_DATA_UNORDERED_BITMASK != 0,
            beginning_fragment: flags & PAYLOAD_DATA_BEGINNING_FRAGMENT_BITMASK != 0,
            ending_fragment: flags & PAYLOAD_DATA_ENDING_FRAGMENT_BITMASK != 0,
            immediate_sack: flags & PAYLOAD_DATA_IMMEDIATE_SACK != 0,
            tsn,
            stream_identifier,
            stream_sequence_number,
            payload_type,
            user_data,
            ..Default::default()
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        out.put_u32(self.tsn);
        out.put_u16(self.stream_identifier);
        out.put_u16(self.stream_sequence_number);
        out.put_u32(self.payload_type as u32);
        out.extend_from_slice(&self.user_data);
    }

    /// Wire size of this chunk, header included, padding excluded.
    pub(crate) fn chunk_length(&self) -> usize {
        super::CHUNK_HEADER_SIZE + PAYLOAD_DATA_HEADER_SIZE + self.user_data.len()
    }
}
