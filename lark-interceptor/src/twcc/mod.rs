pub mod receiver;
pub mod sender;

pub use receiver::{TwccReceiverBuilder, TwccReceiverInterceptor};
pub use sender::{TwccSenderBuilder, TwccSenderInterceptor};

use bytes::{BufMut, Bytes, BytesMut};

/// Header extension URI carrying the transport-wide sequence number.
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

/// The two byte transport-wide sequence number header extension payload.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TransportCcExtension {
    pub transport_sequence: u16,
}

impl TransportCcExtension {
    pub fn marshal(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(2);
        out.put_u16(self.transport_sequence);
        out.freeze()
    }

    pub fn unmarshal(raw: &Bytes) -> Option<Self> {
        if raw.len() < 2 {
            return None;
        }
        Some(TransportCcExtension {
            transport_sequence: u16::from_be_bytes([raw[0], raw[1]]),
        })
    }
}

#[cfg(test)]
mod twcc_extension_test {
    use super::*;

    #[test]
    fn test_extension_roundtrip() {
        let ext = TransportCcExtension {
            transport_sequence: 0xBEEF,
        };
        let raw = ext.marshal();
        assert_eq!(raw, Bytes::from_static(&[0xBE, 0xEF]));
        assert_eq!(TransportCcExtension::unmarshal(&raw), Some(ext));
    }
}
