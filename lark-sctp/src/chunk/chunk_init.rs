use bytes::{BufMut, Bytes, BytesMut};

use crate::param::Param;
use ::shared::error::{Error, Result};

pub(crate) const INIT_CHUNK_MIN_LENGTH: usize = 16;

/// Shared body of the INIT and INIT ACK chunks.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Initiate Tag                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Advertised Receiver Window Credit (a_rwnd)          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Number of Outbound Streams   |  Number of Inbound Streams    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Initial TSN                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |              Optional/Variable-Length Parameters              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkInit {
    pub(crate) initiate_tag: u32,
    pub(crate) advertised_receiver_window_credit: u32,
    pub(crate) num_outbound_streams: u16,
    pub(crate) num_inbound_streams: u16,
    pub(crate) initial_tsn: u32,
    pub(crate) params: Vec<Param>,
}

impl ChunkInit {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        if value.len() < INIT_CHUNK_MIN_LENGTH {
            return Err(Error::ErrChunkValueNotLongEnough);
        }

        let initiate_tag = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let advertised_receiver_window_credit =
            u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        let num_outbound_streams = u16::from_be_bytes([value[8], value[9]]);
        let num_inbound_streams = u16::from_be_bytes([value[10], value[11]]);
        let initial_tsn = u32::from_be_bytes([value[12], value[13], value[14], value[15]]);

        let mut params = vec![];
        let mut offset = INIT_CHUNK_MIN_LENGTH;
        while offset < value.len() {
            let (param, consumed) = Param::unmarshal(&value.slice(offset..))?;
            params.push(param);
            offset += consumed;
        }

        Ok(ChunkInit {
            initiate_tag,
            advertised_receiver_window_credit,
            num_outbound_streams,
            num_inbound_streams,
            initial_tsn,
            params,
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        out.put_u32(self.initiate_tag);
        out.put_u32(self.advertised_receiver_window_credit);
        out.put_u16(self.num_outbound_streams);
        out.put_u16(self.num_inbound_streams);
        out.put_u32(self.initial_tsn);
        for param in &self.params {
            param.marshal_to(out);
        }
    }

    pub(crate) fn state_cookie(&self) -> Option<Bytes> {
        self.params.iter().find_map(|p| match p {
            Param::StateCookie(cookie) => Some(cookie.clone()),
            _ => None,
        })
    }

    pub(crate) fn supports_forward_tsn(&self) -> bool {
        self.params
            .iter()
            .any(|p| matches!(p, Param::ForwardTsnSupported))
    }
}

#[cfg(test)]
mod chunk_init_test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_init_roundtrip_with_params() {
        let init = ChunkInit {
            initiate_tag: 0xdeadbeef,
            advertised_receiver_window_credit: 128 * 1024,
            num_outbound_streams: 1024,
            num_inbound_streams: 1024,
            initial_tsn: 42,
            params: vec![
                Param::ForwardTsnSupported,
                Param::StateCookie(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8])),
            ],
        };

        let mut out = BytesMut::new();
        Chunk::Init(init.clone()).marshal_to(&mut out);

        let (decoded, _) = Chunk::unmarshal(&out.freeze()).unwrap();
        match decoded {
            Chunk::Init(d) => {
                assert_eq!(d, init);
                assert!(d.supports_forward_tsn());
                assert_eq!(
                    d.state_cookie(),
                    Some(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]))
                );
            }
            _ => panic!("wrong chunk type"),
        }
    }

    #[test]
    fn test_init_too_short() {
        assert_eq!(
            ChunkInit::unmarshal(&Bytes::from_static(&[0u8; 8])),
            Err(Error::ErrChunkValueNotLongEnough)
        );
    }
}
