use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

/// One stream entry in a FORWARD TSN chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct ChunkForwardTsnStream {
    pub(crate) identifier: u16,
    pub(crate) sequence: u16,
}

/// ChunkForwardTsn advances the peer's cumulative TSN past abandoned
/// messages (RFC 3758 §3.2).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkForwardTsn {
    /// This indicates the new cumulative TSN to the data receiver.
    pub(crate) new_cumulative_tsn: u32,
    pub(crate) streams: Vec<ChunkForwardTsnStream>,
}

impl ChunkForwardTsn {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        if value.len() < 4 {
            return Err(Error::ErrChunkTooShort);
        }

        let new_cumulative_tsn = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let mut streams = vec![];
        let mut offset = 4;
        while offset + 4 <= value.len() {
            streams.push(ChunkForwardTsnStream {
                identifier: u16::from_be_bytes([value[offset], value[offset + 1]]),
                sequence: u16::from_be_bytes([value[offset + 2], value[offset + 3]]),
            });
            offset += 4;
        }

        Ok(ChunkForwardTsn {
            new_cumulative_tsn,
            streams,
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        out.put_u32(self.new_cumulative_tsn);
        for stream in &self.streams {
            out.put_u16(stream.identifier);
            out.put_u16(stream.sequence);
        }
    }
}
