use std::fmt;

/// State of the external ICE transport, as reported to the connection.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceConnectionState {
    Unspecified = 0,
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

const ICE_CONNECTION_STATE_NEW_STR: &str = "new";
const ICE_CONNECTION_STATE_CHECKING_STR: &str = "checking";
const ICE_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const ICE_CONNECTION_STATE_COMPLETED_STR: &str = "completed";
const ICE_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const ICE_CONNECTION_STATE_FAILED_STR: &str = "failed";
const ICE_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCIceConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CONNECTION_STATE_NEW_STR => RTCIceConnectionState::New,
            ICE_CONNECTION_STATE_CHECKING_STR => RTCIceConnectionState::Checking,
            ICE_CONNECTION_STATE_CONNECTED_STR => RTCIceConnectionState::Connected,
            ICE_CONNECTION_STATE_COMPLETED_STR => RTCIceConnectionState::Completed,
            ICE_CONNECTION_STATE_DISCONNECTED_STR => RTCIceConnectionState::Disconnected,
            ICE_CONNECTION_STATE_FAILED_STR => RTCIceConnectionState::Failed,
            ICE_CONNECTION_STATE_CLOSED_STR => RTCIceConnectionState::Closed,
            _ => RTCIceConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceConnectionState::New => write!(f, "{ICE_CONNECTION_STATE_NEW_STR}"),
            RTCIceConnectionState::Checking => write!(f, "{ICE_CONNECTION_STATE_CHECKING_STR}"),
            RTCIceConnectionState::Connected => {
                write!(f, "{ICE_CONNECTION_STATE_CONNECTED_STR}")
            }
            RTCIceConnectionState::Completed => {
                write!(f, "{ICE_CONNECTION_STATE_COMPLETED_STR}")
            }
            RTCIceConnectionState::Disconnected => {
                write!(f, "{ICE_CONNECTION_STATE_DISCONNECTED_STR}")
            }
            RTCIceConnectionState::Failed => write!(f, "{ICE_CONNECTION_STATE_FAILED_STR}"),
            RTCIceConnectionState::Closed => write!(f, "{ICE_CONNECTION_STATE_CLOSED_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_connection_state_string_roundtrip() {
        let tests = vec![
            RTCIceConnectionState::New,
            RTCIceConnectionState::Checking,
            RTCIceConnectionState::Connected,
            RTCIceConnectionState::Completed,
            RTCIceConnectionState::Disconnected,
            RTCIceConnectionState::Failed,
            RTCIceConnectionState::Closed,
        ];
        for state in tests {
            assert_eq!(
                RTCIceConnectionState::from(state.to_string().as_str()),
                state
            );
        }
    }
}
