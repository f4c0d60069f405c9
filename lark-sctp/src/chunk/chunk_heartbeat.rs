use bytes::{Bytes, BytesMut};

use crate::param::Param;
use ::shared::error::{Error, Result};

/// ChunkHeartbeat and its ACK carry a single opaque heartbeat info param
/// which the peer must echo unchanged (RFC 4960 §3.3.5, §3.3.6).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkHeartbeat {
    pub(crate) heartbeat_info: Bytes,
}

impl ChunkHeartbeat {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        let (param, _) = Param::unmarshal(value).map_err(|_| Error::ErrHeartbeatNotLongEnoughInfo)?;
        match param {
            Param::HeartbeatInfo(heartbeat_info) => Ok(ChunkHeartbeat { heartbeat_info }),
            _ => Err(Error::ErrHeartbeatParam),
        }
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        Param::HeartbeatInfo(self.heartbeat_info.clone()).marshal_to(out);
    }
}
