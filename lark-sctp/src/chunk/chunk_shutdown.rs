use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

/// ChunkShutdown starts a graceful association close (RFC 4960 §3.3.8).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkShutdown {
    pub(crate) cumulative_tsn_ack: u32,
}

impl ChunkShutdown {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        if value.len() != 4 {
            return Err(Error::ErrInvalidChunkSize);
        }
        Ok(ChunkShutdown {
            cumulative_tsn_ack: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        out.put_u32(self.cumulative_tsn_ack);
    }
}

/// ChunkShutdownAck acknowledges a SHUTDOWN (RFC 4960 §3.3.9).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkShutdownAck {}

/// ChunkShutdownComplete finishes the shutdown exchange (RFC 4960 §3.3.13).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkShutdownComplete {}

#[cfg(test)]
mod chunk_shutdown_test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_shutdown_roundtrip() {
        let shutdown = ChunkShutdown {
            cumulative_tsn_ack: 42,
        };

        let mut out = BytesMut::new();
        Chunk::Shutdown(shutdown.clone()).marshal_to(&mut out);

        let (decoded, _) = Chunk::unmarshal(&out.freeze()).unwrap();
        assert_eq!(decoded, Chunk::Shutdown(shutdown));
    }

    #[test]
    fn test_shutdown_wrong_size() {
        assert_eq!(
            ChunkShutdown::unmarshal(&Bytes::from_static(&[0, 0])),
            Err(Error::ErrInvalidChunkSize)
        );
    }
}
