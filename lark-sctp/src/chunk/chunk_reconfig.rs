use bytes::{Bytes, BytesMut};

use crate::param::Param;
use ::shared::error::{Error, Result};

/// ChunkReconfig carries stream reconfiguration parameters, used here for
/// the outgoing SSN reset exchange that closes data channels (RFC 6525).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkReconfig {
    pub(crate) param_a: Option<Param>,
    pub(crate) param_b: Option<Param>,
}

impl ChunkReconfig {
    pub(crate) fn unmarshal(value: &Bytes) -> Result<Self> {
        let (param_a, consumed) = Param::unmarshal(value)?;
        match param_a {
            Param::OutgoingSsnResetRequest { .. } | Param::ReconfigResponse { .. } => {}
            _ => return Err(Error::ErrChunkReconfigInvalidParamA),
        }

        let param_b = if consumed < value.len() {
            let (param, _) = Param::unmarshal(&value.slice(consumed..))?;
            Some(param)
        } else {
            None
        };

        Ok(ChunkReconfig {
            param_a: Some(param_a),
            param_b,
        })
    }

    pub(crate) fn marshal_value(&self, out: &mut BytesMut) {
        if let Some(param) = &self.param_a {
            param.marshal_to(out);
        }
        if let Some(param) = &self.param_b {
            param.marshal_to(out);
        }
    }
}
