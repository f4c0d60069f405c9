use std::fmt;

/// State of the external DTLS transport, as reported to the connection.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCDtlsTransportState {
    Unspecified = 0,
    /// DTLS has not started negotiating yet.
    #[default]
    New,
    /// DTLS is in the process of negotiating a secure connection.
    Connecting,
    /// DTLS has completed negotiation and verified the remote fingerprint.
    Connected,
    /// The transport has been closed intentionally.
    Closed,
    /// The transport has failed as the result of an error.
    Failed,
}

const DTLS_TRANSPORT_STATE_NEW_STR: &str = "new";
const DTLS_TRANSPORT_STATE_CONNECTING_STR: &str = "connecting";
const DTLS_TRANSPORT_STATE_CONNECTED_STR: &str = "connected";
const DTLS_TRANSPORT_STATE_CLOSED_STR: &str = "closed";
const DTLS_TRANSPORT_STATE_FAILED_STR: &str = "failed";

impl From<&str> for RTCDtlsTransportState {
    fn from(raw: &str) -> Self {
        match raw {
            DTLS_TRANSPORT_STATE_NEW_STR => RTCDtlsTransportState::New,
            DTLS_TRANSPORT_STATE_CONNECTING_STR => RTCDtlsTransportState::Connecting,
            DTLS_TRANSPORT_STATE_CONNECTED_STR => RTCDtlsTransportState::Connected,
            DTLS_TRANSPORT_STATE_CLOSED_STR => RTCDtlsTransportState::Closed,
            DTLS_TRANSPORT_STATE_FAILED_STR => RTCDtlsTransportState::Failed,
            _ => RTCDtlsTransportState::Unspecified,
        }
    }
}

impl fmt::Display for RTCDtlsTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCDtlsTransportState::New => write!(f, "{DTLS_TRANSPORT_STATE_NEW_STR}"),
            RTCDtlsTransportState::Connecting => {
                write!(f, "{DTLS_TRANSPORT_STATE_CONNECTING_STR}")
            }
            RTCDtlsTransportState::Connected => {
                write!(f, "{DTLS_TRANSPORT_STATE_CONNECTED_STR}")
            }
            RTCDtlsTransportState::Closed => write!(f, "{DTLS_TRANSPORT_STATE_CLOSED_STR}"),
            RTCDtlsTransportState::Failed => write!(f, "{DTLS_TRANSPORT_STATE_FAILED_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}
