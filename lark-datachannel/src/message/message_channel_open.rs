use bytes::{Buf, BufMut};

use shared::error::{Error, Result};
use shared::marshal::*;

const CHANNEL_TYPE_LEN: usize = 1;
const CHANNEL_PRIORITY_LEN: usize = 2;
const CHANNEL_RELIABILITY_LEN: usize = 4;
const CHANNEL_LABEL_LEN_LEN: usize = 2;
const CHANNEL_PROTOCOL_LEN_LEN: usize = 2;

pub(crate) const CHANNEL_OPEN_HEADER_LEN: usize = CHANNEL_TYPE_LEN
    + CHANNEL_PRIORITY_LEN
    + CHANNEL_RELIABILITY_LEN
    + CHANNEL_LABEL_LEN_LEN
    + CHANNEL_PROTOCOL_LEN_LEN;

/// ChannelType determines the reliability of the WebRTC DataChannel
/// (RFC 8832 §5.1).
#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
#[repr(u8)]
pub enum ChannelType {
    /// `Reliable` determines the Data Channel provides a reliable in-order
    /// bi-directional communication.
    #[default]
    Reliable = 0x00,
    /// `ReliableUnordered` determines the Data Channel provides a reliable
    /// unordered bi-directional communication.
    ReliableUnordered = 0x80,
    /// `PartialReliableRexmit` determines the Data Channel provides a
    /// partially-reliable in-order bi-directional communication. User messages
    /// will not be retransmitted more times than specified in the Reliability
    /// Parameter.
    PartialReliableRexmit = 0x01,
    /// `PartialReliableRexmitUnordered` determines the Data Channel provides
    /// a partially-reliable unordered bi-directional communication. User
    /// messages will not be retransmitted more times than specified in the
    /// Reliability Parameter.
    PartialReliableRexmitUnordered = 0x81,
    /// `PartialReliableTimed` determines the Data Channel provides a
    /// partial-reliable in-order bi-directional communication. User messages
    /// might not be transmitted or retransmitted after a specified life-time
    /// given in milliseconds in the Reliability Parameter.
    PartialReliableTimed = 0x02,
    /// The Data Channel provides a partial-reliable unordered bi-directional
    /// communication. User messages might not be transmitted or retransmitted
    /// after a specified life-time given in milliseconds in the Reliability
    /// Parameter.
    PartialReliableTimedUnordered = 0x82,
}

impl MarshalSize for ChannelType {
    fn marshal_size(&self) -> usize {
        CHANNEL_TYPE_LEN
    }
}

impl Marshal for ChannelType {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        buf.put_u8(*self as u8);
        Ok(1)
    }
}

impl Unmarshal for ChannelType {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < CHANNEL_TYPE_LEN {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: CHANNEL_TYPE_LEN,
                actual: buf.remaining(),
            });
        }

        let b = buf.get_u8();
        match b {
            0x00 => Ok(Self::Reliable),
            0x80 => Ok(Self::ReliableUnordered),
            0x01 => Ok(Self::PartialReliableRexmit),
            0x81 => Ok(Self::PartialReliableRexmitUnordered),
            0x02 => Ok(Self::PartialReliableTimed),
            0x82 => Ok(Self::PartialReliableTimedUnordered),
            _ => Err(Error::InvalidChannelType(b)),
        }
    }
}

/// The DATA_CHANNEL_OPEN message negotiates a new data channel on the SCTP
/// stream it is sent on (RFC 8832 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Message Type |  Channel Type |            Priority           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Reliability Parameter                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Label Length          |       Protocol Length         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             Label                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Protocol                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct DataChannelOpen {
    pub channel_type: ChannelType,
    pub priority: u16,
    pub reliability_parameter: u32,
    pub label: Vec<u8>,
    pub protocol: Vec<u8>,
}

impl MarshalSize for DataChannelOpen {
    fn marshal_size(&self) -> usize {
        CHANNEL_OPEN_HEADER_LEN + self.label.len() + self.protocol.len()
    }
}

impl Marshal for DataChannelOpen {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        let required_len = self.marshal_size();
        if buf.len() < required_len {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: required_len,
                actual: buf.len(),
            });
        }

        let n = self.channel_type.marshal_to(buf)?;
        buf = &mut buf[n..];
        buf.put_u16(self.priority);
        buf.put_u32(self.reliability_parameter);
        buf.put_u16(self.label.len() as u16);
        buf.put_u16(self.protocol.len() as u16);
        buf.put_slice(self.label.as_slice());
        buf.put_slice(self.protocol.as_slice());
        Ok(required_len)
    }
}

impl Unmarshal for DataChannelOpen {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < CHANNEL_OPEN_HEADER_LEN {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: CHANNEL_OPEN_HEADER_LEN,
                actual: buf.remaining(),
            });
        }

        let channel_type = ChannelType::unmarshal(buf)?;
        let priority = buf.get_u16();
        let reliability_parameter = buf.get_u32();
        let label_len = buf.get_u16() as usize;
        let protocol_len = buf.get_u16() as usize;

        // the declared lengths must account for the remaining buffer exactly
        if buf.remaining() != label_len + protocol_len {
            return Err(Error::ErrDcepLengthMismatch);
        }

        let mut label = vec![0; label_len];
        let mut protocol = vec![0; protocol_len];

        buf.copy_to_slice(&mut label[..]);
        buf.copy_to_slice(&mut protocol[..]);

        Ok(Self {
            channel_type,
            priority,
            reliability_parameter,
            label,
            protocol,
        })
    }
}
