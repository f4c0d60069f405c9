use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

/// One error cause inside an ABORT or ERROR chunk. The cause body is kept
/// opaque; only the code is interpreted.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ErrorCause {
    pub(crate) code: u16,
    pub(crate) raw: Bytes,
}

pub(crate) const PROTOCOL_VIOLATION: u16 = 13;
pub(crate) const USER_INITIATED_ABORT: u16 = 12;

/// ChunkAbort closes the association immediately (RFC 4960 §3.3.7).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkAbort {
    pub(crate) error_causes: Vec<ErrorCause>,
}

impl ChunkAbort {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        let mut error_causes = vec![];
        let mut offset = 0;
        while offset + 4 <= value.len() {
            let code = u16::from_be_bytes([value[offset], value[offset + 1]]);
            let length = u16::from_be_bytes([value[offset + 2], value[offset + 3]]) as usize;
            if length < 4 || offset + length > value.len() {
                return Err(Error::ErrErrorCauseTooSmall);
            }
            error_causes.push(ErrorCause {
                code,
                raw: value.slice(offset + 4..offset + length),
            });
            offset += length + crate::param::padding_of(length);
        }
        Ok(ChunkAbort { error_causes })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        for cause in &self.error_causes {
            let length = 4 + cause.raw.len();
            out.put_u16(cause.code);
            out.put_u16(length as u16);
            out.extend_from_slice(&cause.raw);
            for _ in 0..crate::param::padding_of(length) {
                out.put_u8(0);
            }
        }
    }

    pub(crate) fn display_causes(&self) -> String {
        self.error_causes
            .iter()
            .map(|c| format!("cause {}", c.code))
            .collect::<Vec<String>>()
            .join(", ")
    }
}

#[cfg(test)]
mod chunk_abort_test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_abort_roundtrip() {
        let abort = ChunkAbort {
            error_causes: vec![ErrorCause {
                code: PROTOCOL_VIOLATION,
                raw: Bytes::from_static(b"bad"),
            }],
        };

        let mut out = BytesMut::new();
        Chunk::Abort(abort.clone()).marshal_to(&mut out);

        let (decoded, _) = Chunk::unmarshal(&out.freeze()).unwrap();
        assert_eq!(decoded, Chunk::Abort(abort));
    }
}
