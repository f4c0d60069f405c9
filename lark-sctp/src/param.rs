use bytes::{BufMut, Bytes, BytesMut};

use ::shared::error::{Error, Result};

pub(crate) const PARAM_HEADER_LENGTH: usize = 4;

pub(crate) const PT_STATE_COOKIE: u16 = 7;
pub(crate) const PT_SUPPORTED_EXTENSIONS: u16 = 0x8008;
pub(crate) const PT_FORWARD_TSN_SUPPORTED: u16 = 0xC000;
pub(crate) const PT_OUTGOING_SSN_RESET_REQUEST: u16 = 13;
pub(crate) const PT_RECONFIG_RESPONSE: u16 = 16;

/// Reconfiguration response results, RFC 6525 §4.4.
pub(crate) const RECONFIG_RESULT_SUCCESS_PERFORMED: u32 = 1;
pub(crate) const RECONFIG_RESULT_DENIED: u32 = 2;

/// Returns the zero padding needed to reach the next 4-byte boundary.
pub(crate) fn padding_of(len: usize) -> usize {
    if len % 4 == 0 {
        0
    } else {
        4 - (len % 4)
    }
}

/// A variable-length parameter carried inside INIT, INIT ACK, HEARTBEAT and
/// RECONFIG chunks.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    /// Opaque cookie echoed back by the association initiator (RFC 4960 §5.1.3)
    StateCookie(Bytes),
    /// Chunk types the sender supports beyond RFC 4960 (RFC 5061 §4.2.7)
    SupportedExtensions(Vec<u8>),
    /// The sender supports the FORWARD TSN chunk (RFC 3758 §3.1)
    ForwardTsnSupported,
    /// Request to reset the sender's outgoing streams (RFC 6525 §4.1)
    OutgoingSsnResetRequest {
        reconfig_request_sequence_number: u32,
        reconfig_response_sequence_number: u32,
        sender_last_tsn: u32,
        stream_identifiers: Vec<u16>,
    },
    /// Response to a reconfiguration request (RFC 6525 §4.4)
    ReconfigResponse {
        reconfig_response_sequence_number: u32,
        result: u32,
    },
    /// Heartbeat info, opaque to the peer (RFC 4960 §3.3.5)
    HeartbeatInfo(Bytes),
    Unknown { typ: u16, value: Bytes },
}

pub(crate) const PT_HEARTBEAT_INFO: u16 = 1;

impl Param {
    pub(crate) fn param_type(&self) -> u16 {
        match self {
            Param::StateCookie(_) => PT_STATE_COOKIE,
            Param::SupportedExtensions(_) => PT_SUPPORTED_EXTENSIONS,
            Param::ForwardTsnSupported => PT_FORWARD_TSN_SUPPORTED,
            Param::OutgoingSsnResetRequest { .. } => PT_OUTGOING_SSN_RESET_REQUEST,
            Param::ReconfigResponse { .. } => PT_RECONFIG_RESPONSE,
            Param::HeartbeatInfo(_) => PT_HEARTBEAT_INFO,
            Param::Unknown { typ, .. } => *typ,
        }
    }

    /// Parses one parameter from the front of `raw`. Returns the parameter
    /// and the number of bytes consumed including padding.
    pub(crate) fn unmarshal(raw: &Bytes) -> Result<(Param, usize)> {
        if raw.len() < PARAM_HEADER_LENGTH {
            return Err(Error::ErrParamHeaderTooShort);
        }

        let typ = u16::from_be_bytes([raw[0], raw[1]]);
        let length = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        if length < PARAM_HEADER_LENGTH {
            return Err(Error::ErrParamHeaderSelfReportedLengthShorter);
        }
        if length > raw.len() {
            return Err(Error::ErrParamHeaderSelfReportedLengthLonger);
        }

        let value = raw.slice(PARAM_HEADER_LENGTH..length);
        let consumed = std::cmp::min(length + padding_of(length), raw.len());

        let param = match typ {
            PT_STATE_COOKIE => Param::StateCookie(value),
            PT_SUPPORTED_EXTENSIONS => Param::SupportedExtensions(value.to_vec()),
            PT_FORWARD_TSN_SUPPORTED => Param::ForwardTsnSupported,
            PT_HEARTBEAT_INFO => Param::HeartbeatInfo(value),
            PT_OUTGOING_SSN_RESET_REQUEST => {
                if value.len() < 12 {
                    return Err(Error::ErrSsnResetRequestParamTooShort);
                }
                let reconfig_request_sequence_number =
                    u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                let reconfig_response_sequence_number =
                    u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
                let sender_last_tsn =
                    u32::from_be_bytes([value[8], value[9], value[10], value[11]]);
                let mut stream_identifiers = vec![];
                let mut off = 12;
                while off + 2 <= value.len() {
                    stream_identifiers.push(u16::from_be_bytes([value[off], value[off + 1]]));
                    off += 2;
                }
                Param::OutgoingSsnResetRequest {
                    reconfig_request_sequence_number,
                    reconfig_response_sequence_number,
                    sender_last_tsn,
                    stream_identifiers,
                }
            }
            PT_RECONFIG_RESPONSE => {
                if value.len() < 8 {
                    return Err(Error::ErrReconfigRespParamTooShort);
                }
                Param::ReconfigResponse {
                    reconfig_response_sequence_number: u32::from_be_bytes([
                        value[0], value[1], value[2], value[3],
                    ]),
                    result: u32::from_be_bytes([value[4], value[5], value[6], value[7]]),
                }
            }
            _ => Param::Unknown { typ, value },
        };

        Ok((param, consumed))
    }

    /// Appends the parameter, including header and padding, to `out`.
    pub(crate) fn marshal_to(&self, out: &mut BytesMut) {
        let mut value = BytesMut::new();
        match self {
            Param::StateCookie(cookie) => value.extend_from_slice(cookie),
            Param::SupportedExtensions(types) => value.extend_from_slice(types),
            Param::ForwardTsnSupported => {}
            Param::HeartbeatInfo(info) => value.extend_from_slice(info),
            Param::OutgoingSsnResetRequest {
                reconfig_request_sequence_number,
                reconfig_response_sequence_number,
                sender_last_tsn,
                stream_identifiers,
            } => {
                value.put_u32(*reconfig_request_sequence_number);
                value.put_u32(*reconfig_response_sequence_number);
                value.put_u32(*sender_last_tsn);
                for si in stream_identifiers {
                    value.put_u16(*si);
                }
            }
            Param::ReconfigResponse {
                reconfig_response_sequence_number,
                result,
            } => {
                value.put_u32(*reconfig_response_sequence_number);
                value.put_u32(*result);
            }
            Param::Unknown { value: v, .. } => value.extend_from_slice(v),
        }

        let length = PARAM_HEADER_LENGTH + value.len();
        out.put_u16(self.param_type());
        out.put_u16(length as u16);
        out.extend_from_slice(&value);
        for _ in 0..padding_of(length) {
            out.put_u8(0);
        }
    }
}

#[cfg(test)]
mod param_test {
    use super::*;

    #[test]
    fn test_param_roundtrip() {
        let tests = vec![
            Param::StateCookie(Bytes::from_static(&[1, 2, 3])),
            Param::ForwardTsnSupported,
            Param::OutgoingSsnResetRequest {
                reconfig_request_sequence_number: 1,
                reconfig_response_sequence_number: 2,
                sender_last_tsn: 3,
                stream_identifiers: vec![4, 5],
            },
            Param::ReconfigResponse {
                reconfig_response_sequence_number: 1,
                result: RECONFIG_RESULT_SUCCESS_PERFORMED,
            },
        ];

        for param in tests {
            let mut out = BytesMut::new();
            param.marshal_to(&mut out);
            assert_eq!(out.len() % 4, 0, "param must be padded");
            let (decoded, consumed) = Param::unmarshal(&out.clone().freeze()).unwrap();
            assert_eq!(consumed, out.len());
            assert_eq!(decoded, param);
        }
    }

    #[test]
    fn test_param_bad_lengths() {
        assert_eq!(
            Param::unmarshal(&Bytes::from_static(&[0, 7])),
            Err(Error::ErrParamHeaderTooShort)
        );
        assert_eq!(
            Param::unmarshal(&Bytes::from_static(&[0, 7, 0, 2])),
            Err(Error::ErrParamHeaderSelfReportedLengthShorter)
        );
        assert_eq!(
            Param::unmarshal(&Bytes::from_static(&[0, 7, 0, 12, 0, 0])),
            Err(Error::ErrParamHeaderSelfReportedLengthLonger)
        );
    }
}
