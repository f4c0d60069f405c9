use std::fmt;

/// Lifecycle of a data channel. Transitions never skip a state:
///
/// ```text
/// connecting ──(ACK received or first user data)──▶ open
/// connecting ──(association failed / stream abort)──▶ closed
/// open       ──(local close requested)──▶ closing ──(queue drained & stream shut)──▶ closed
/// open       ──(remote reset / association failed)──▶ closed
/// ```
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCDataChannelState {
    Unspecified = 0,
    /// The channel is negotiating; `send` is not yet allowed.
    #[default]
    Connecting,
    /// The opening handshake finished; messages flow.
    Open,
    /// A local close was requested; queued messages still flush.
    Closing,
    /// The channel is shut; terminal.
    Closed,
}

const DATA_CHANNEL_STATE_CONNECTING_STR: &str = "connecting";
const DATA_CHANNEL_STATE_OPEN_STR: &str = "open";
const DATA_CHANNEL_STATE_CLOSING_STR: &str = "closing";
const DATA_CHANNEL_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCDataChannelState {
    fn from(raw: &str) -> Self {
        match raw {
            DATA_CHANNEL_STATE_CONNECTING_STR => RTCDataChannelState::Connecting,
            DATA_CHANNEL_STATE_OPEN_STR => RTCDataChannelState::Open,
            DATA_CHANNEL_STATE_CLOSING_STR => RTCDataChannelState::Closing,
            DATA_CHANNEL_STATE_CLOSED_STR => RTCDataChannelState::Closed,
            _ => RTCDataChannelState::Unspecified,
        }
    }
}

impl fmt::Display for RTCDataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCDataChannelState::Connecting => write!(f, "{DATA_CHANNEL_STATE_CONNECTING_STR}"),
            RTCDataChannelState::Open => write!(f, "{DATA_CHANNEL_STATE_OPEN_STR}"),
            RTCDataChannelState::Closing => write!(f, "{DATA_CHANNEL_STATE_CLOSING_STR}"),
            RTCDataChannelState::Closed => write!(f, "{DATA_CHANNEL_STATE_CLOSED_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}
