use bytes::{Buf, BufMut};

use shared::error::{Error, Result};
use shared::marshal::*;

pub(crate) const MESSAGE_TYPE_ACK: u8 = 0x02;
pub(crate) const MESSAGE_TYPE_OPEN: u8 = 0x03;

pub const MESSAGE_TYPE_LEN: usize = 1;

/// The first byte in a `Message` that specifies its type.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum MessageType {
    DataChannelAck,
    DataChannelOpen,
}

impl MarshalSize for MessageType {
    fn marshal_size(&self) -> usize {
        MESSAGE_TYPE_LEN
    }
}

impl Marshal for MessageType {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        let b = match self {
            MessageType::DataChannelAck => MESSAGE_TYPE_ACK,
            MessageType::DataChannelOpen => MESSAGE_TYPE_OPEN,
        };

        buf.put_u8(b);

        Ok(1)
    }
}

impl Unmarshal for MessageType {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < MESSAGE_TYPE_LEN {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: MESSAGE_TYPE_LEN,
                actual: buf.remaining(),
            });
        }

        let b = buf.get_u8();

        match b {
            MESSAGE_TYPE_ACK => Ok(Self::DataChannelAck),
            MESSAGE_TYPE_OPEN => Ok(Self::DataChannelOpen),
            _ => Err(Error::InvalidMessageType(b)),
        }
    }
}

#[cfg(test)]
mod message_type_test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_message_type_unmarshal_open_success() {
        let mut bytes = Bytes::from_static(&[0x03]);
        let msg_type = MessageType::unmarshal(&mut bytes).unwrap();
        assert_eq!(msg_type, MessageType::DataChannelOpen);
    }

    #[test]
    fn test_message_type_unmarshal_ack_success() {
        let mut bytes = Bytes::from_static(&[0x02]);
        let msg_type = MessageType::unmarshal(&mut bytes).unwrap();
        assert_eq!(msg_type, MessageType::DataChannelAck);
    }

    #[test]
    fn test_message_type_unmarshal_invalid() {
        let mut bytes = Bytes::from_static(&[0x01]);
        assert_eq!(
            MessageType::unmarshal(&mut bytes),
            Err(Error::InvalidMessageType(0x01))
        );
    }

    #[test]
    fn test_message_type_marshal_size() {
        let ack = MessageType::DataChannelAck;
        let marshal_size = ack.marshal_size();
        assert_eq!(marshal_size, MESSAGE_TYPE_LEN);
    }
}
