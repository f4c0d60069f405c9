pub(crate) mod chunk_abort;
pub(crate) mod chunk_cookie;
pub(crate) mod chunk_forward_tsn;
pub(crate) mod chunk_heartbeat;
pub(crate) mod chunk_init;
pub mod chunk_payload_data;
pub(crate) mod chunk_reconfig;
pub(crate) mod chunk_selective_ack;
pub(crate) mod chunk_shutdown;
pub(crate) mod chunk_type;

use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

use chunk_abort::ChunkAbort;
use chunk_cookie::{ChunkCookieAck, ChunkCookieEcho};
use chunk_forward_tsn::ChunkForwardTsn;
use chunk_heartbeat::ChunkHeartbeat;
use chunk_init::ChunkInit;
use chunk_payload_data::ChunkPayloadData;
use chunk_reconfig::ChunkReconfig;
use chunk_selective_ack::ChunkSelectiveAck;
use chunk_shutdown::{ChunkShutdown, ChunkShutdownAck, ChunkShutdownComplete};
use chunk_type::*;

pub(crate) const CHUNK_HEADER_SIZE: usize = 4;

/// A single parsed SCTP chunk.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Chunk {
    PayloadData(ChunkPayloadData),
    Init(ChunkInit),
    InitAck(ChunkInit),
    Sack(ChunkSelectiveAck),
    Heartbeat(ChunkHeartbeat),
    HeartbeatAck(ChunkHeartbeat),
    Abort(ChunkAbort),
    Shutdown(ChunkShutdown),
    ShutdownAck(ChunkShutdownAck),
    ShutdownComplete(ChunkShutdownComplete),
    CookieEcho(ChunkCookieEcho),
    CookieAck(ChunkCookieAck),
    ForwardTsn(ChunkForwardTsn),
    Reconfig(ChunkReconfig),
    Unknown { typ: u8, flags: u8, value: Bytes },
}

impl Chunk {
    pub(crate) fn chunk_type(&self) -> u8 {
        match self {
            Chunk::PayloadData(_) => CT_PAYLOAD_DATA,
            Chunk::Init(_) => CT_INIT,
            Chunk::InitAck(_) => CT_INIT_ACK,
            Chunk::Sack(_) => CT_SACK,
            Chunk::Heartbeat(_) => CT_HEARTBEAT,
            Chunk::HeartbeatAck(_) => CT_HEARTBEAT_ACK,
            Chunk::Abort(_) => CT_ABORT,
            Chunk::Shutdown(_) => CT_SHUTDOWN,
            Chunk::ShutdownAck(_) => CT_SHUTDOWN_ACK,
            Chunk::ShutdownComplete(_) => CT_SHUTDOWN_COMPLETE,
            Chunk::CookieEcho(_) => CT_COOKIE_ECHO,
            Chunk::CookieAck(_) => CT_COOKIE_ACK,
            Chunk::ForwardTsn(_) => CT_FORWARD_TSN,
            Chunk::Reconfig(_) => CT_RECONFIG,
            Chunk::Unknown { typ, .. } => *typ,
        }
    }

    /// Parses one chunk from the front of `raw`. Returns the chunk and the
    /// number of bytes consumed including padding.
    pub(crate) fn unmarshal(raw: &Bytes) -> Result<(Chunk, usize)> {
        if raw.len() < CHUNK_HEADER_SIZE {
            return Err(Error::ErrChunkHeaderTooSmall);
        }

        let typ = raw[0];
        let flags = raw[1];
        let length = ((raw[2] as usize) << 8) | raw[3] as usize;
        if length < CHUNK_HEADER_SIZE {
            return Err(Error::ErrChunkHeaderInvalidLength);
        }
        if length > raw.len() {
            return Err(Error::ErrChunkHeaderNotEnoughSpace);
        }

        let value = raw.slice(CHUNK_HEADER_SIZE..length);
        let padded = length + crate::param::padding_of(length);
        let consumed = std::cmp::min(padded, raw.len());

        let chunk = match typ {
            CT_PAYLOAD_DATA => Chunk::PayloadData(ChunkPayloadData::unmarshal(flags, &value)?),
            CT_INIT => Chunk::Init(ChunkInit::unmarshal(&value)?),
            CT_INIT_ACK => Chunk::InitAck(ChunkInit::unmarshal(&value)?),
            CT_SACK => Chunk::Sack(ChunkSelectiveAck::unmarshal(&value)?),
            CT_HEARTBEAT => Chunk::Heartbeat(ChunkHeartbeat::unmarshal(&value)?),
            CT_HEARTBEAT_ACK => Chunk::HeartbeatAck(ChunkHeartbeat::unmarshal(&value)?),
            CT_ABORT => Chunk::Abort(ChunkAbort::unmarshal(&value)?),
            CT_SHUTDOWN => Chunk::Shutdown(ChunkShutdown::unmarshal(&value)?),
            CT_SHUTDOWN_ACK => Chunk::ShutdownAck(ChunkShutdownAck {}),
            CT_SHUTDOWN_COMPLETE => Chunk::ShutdownComplete(ChunkShutdownComplete {}),
            CT_COOKIE_ECHO => Chunk::CookieEcho(ChunkCookieEcho {
                cookie: value.clone(),
            }),
            CT_COOKIE_ACK => Chunk::CookieAck(ChunkCookieAck {}),
            CT_FORWARD_TSN => Chunk::ForwardTsn(ChunkForwardTsn::unmarshal(&value)?),
            CT_RECONFIG => Chunk::Reconfig(ChunkReconfig::unmarshal(&value)?),
            _ => Chunk::Unknown {
                typ,
                flags,
                value: value.clone(),
            },
        };

        Ok((chunk, consumed))
    }

    /// Appends the chunk, including header and padding, to `out`.
    pub(crate) fn marshal_to(&self, out: &mut BytesMut) {
        let mut value = BytesMut::new();
        let flags = match self {
            Chunk::PayloadData(c) => {
                c.marshal_value(&mut value);
                c.flags()
            }
            Chunk::Init(c) | Chunk::InitAck(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Sack(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Heartbeat(c) | Chunk::HeartbeatAck(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Abort(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Shutdown(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::ShutdownAck(_) | Chunk::ShutdownComplete(_) | Chunk::CookieAck(_) => 0,
            Chunk::CookieEcho(c) => {
                value.extend_from_slice(&c.cookie);
                0
            }
            Chunk::ForwardTsn(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Reconfig(c) => {
                c.marshal_value(&mut value);
                0
            }
            Chunk::Unknown {
                flags, value: v, ..
            } => {
                value.extend_from_slice(v);
                *flags
            }
        };

        let length = CHUNK_HEADER_SIZE + value.len();
        out.put_u8(self.chunk_type());
        out.put_u8(flags);
        out.put_u16(length as u16);
        out.extend_from_slice(&value);
        for _ in 0..crate::param::padding_of(length) {
            out.put_u8(0);
        }
    }
}

#[cfg(test)]
mod chunk_test {
    use super::*;

    #[test]
    fn test_chunk_header_too_small() {
        let raw = Bytes::from_static(&[0x00, 0x00]);
        assert_eq!(
            Chunk::unmarshal(&raw),
            Err(Error::ErrChunkHeaderTooSmall)
        );
    }

    #[test]
    fn test_chunk_invalid_length() {
        let raw = Bytes::from_static(&[0x00, 0x00, 0x00, 0x02]);
        assert_eq!(
            Chunk::unmarshal(&raw),
            Err(Error::ErrChunkHeaderInvalidLength)
        );
    }

    #[test]
    fn test_chunk_length_overruns_buffer() {
        let raw = Bytes::from_static(&[0x00, 0x00, 0x00, 0x10, 0xaa, 0xbb]);
        assert_eq!(
            Chunk::unmarshal(&raw),
            Err(Error::ErrChunkHeaderNotEnoughSpace)
        );
    }

    #[test]
    fn test_unknown_chunk_roundtrip() {
        let chunk = Chunk::Unknown {
            typ: 99,
            flags: 0x3,
            value: Bytes::from_static(&[1, 2, 3]),
        };

        let mut out = BytesMut::new();
        chunk.marshal_to(&mut out);
        assert_eq!(out.len(), 8, "3-byte value padded to the word boundary");

        let (decoded, consumed) = Chunk::unmarshal(&out.freeze()).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, chunk);
    }
}
