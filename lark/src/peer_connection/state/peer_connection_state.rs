use std::fmt;

use super::dtls_transport_state::RTCDtlsTransportState;
use super::ice_connection_state::RTCIceConnectionState;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum NegotiationNeededState {
    /// No negotiation-needed check is in flight.
    #[default]
    Empty = 0,
    /// A negotiation-needed check is queued to run once operations settle.
    Queue = 1,
    /// The negotiation-needed check is running.
    Run = 2,
}

/// The aggregate state of the connection, combining the ICE and DTLS
/// transport states.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCPeerConnectionState {
    Unspecified = 0,
    /// Both transports are new or closed and nothing has started.
    #[default]
    New,
    /// At least one transport is in the process of establishing.
    Connecting,
    /// Every in-use transport is connected.
    Connected,
    /// At least one transport is disconnected and none has failed.
    Disconnected,
    /// At least one transport has failed terminally.
    Failed,
    /// The connection was closed; this state is sticky.
    Closed,
}

const PEER_CONNECTION_STATE_NEW_STR: &str = "new";
const PEER_CONNECTION_STATE_CONNECTING_STR: &str = "connecting";
const PEER_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const PEER_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const PEER_CONNECTION_STATE_FAILED_STR: &str = "failed";
const PEER_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCPeerConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            PEER_CONNECTION_STATE_NEW_STR => RTCPeerConnectionState::New,
            PEER_CONNECTION_STATE_CONNECTING_STR => RTCPeerConnectionState::Connecting,
            PEER_CONNECTION_STATE_CONNECTED_STR => RTCPeerConnectionState::Connected,
            PEER_CONNECTION_STATE_DISCONNECTED_STR => RTCPeerConnectionState::Disconnected,
            PEER_CONNECTION_STATE_FAILED_STR => RTCPeerConnectionState::Failed,
            PEER_CONNECTION_STATE_CLOSED_STR => RTCPeerConnectionState::Closed,
            _ => RTCPeerConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCPeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCPeerConnectionState::New => write!(f, "{PEER_CONNECTION_STATE_NEW_STR}"),
            RTCPeerConnectionState::Connecting => {
                write!(f, "{PEER_CONNECTION_STATE_CONNECTING_STR}")
            }
            RTCPeerConnectionState::Connected => {
                write!(f, "{PEER_CONNECTION_STATE_CONNECTED_STR}")
            }
            RTCPeerConnectionState::Disconnected => {
                write!(f, "{PEER_CONNECTION_STATE_DISCONNECTED_STR}")
            }
            RTCPeerConnectionState::Failed => write!(f, "{PEER_CONNECTION_STATE_FAILED_STR}"),
            RTCPeerConnectionState::Closed => write!(f, "{PEER_CONNECTION_STATE_CLOSED_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

/// Computes the aggregate connection state from the transport states by the
/// worst-wins rule: failed > disconnected > connected > connecting > new.
/// A closed connection stays closed.
pub(crate) fn aggregate_connection_state(
    is_closed: bool,
    ice: RTCIceConnectionState,
    dtls: RTCDtlsTransportState,
) -> RTCPeerConnectionState {
    if is_closed {
        return RTCPeerConnectionState::Closed;
    }

    if ice == RTCIceConnectionState::Failed || dtls == RTCDtlsTransportState::Failed {
        return RTCPeerConnectionState::Failed;
    }

    if ice == RTCIceConnectionState::Disconnected {
        return RTCPeerConnectionState::Disconnected;
    }

    let ice_connected = matches!(
        ice,
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
    );
    if ice_connected && dtls == RTCDtlsTransportState::Connected {
        return RTCPeerConnectionState::Connected;
    }

    let ice_connecting = matches!(
        ice,
        RTCIceConnectionState::Checking | RTCIceConnectionState::Connected
    ) || ice == RTCIceConnectionState::Completed;
    if ice_connecting || dtls == RTCDtlsTransportState::Connecting {
        return RTCPeerConnectionState::Connecting;
    }

    RTCPeerConnectionState::New
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aggregate_worst_wins() {
        use RTCDtlsTransportState as D;
        use RTCIceConnectionState as I;
        use RTCPeerConnectionState as P;

        let tests = vec![
            (false, I::New, D::New, P::New),
            (false, I::Checking, D::New, P::Connecting),
            (false, I::Connected, D::Connecting, P::Connecting),
            (false, I::Connected, D::Connected, P::Connected),
            (false, I::Completed, D::Connected, P::Connected),
            (false, I::Disconnected, D::Connected, P::Disconnected),
            // any failed transport wins over everything else
            (false, I::Failed, D::Connected, P::Failed),
            (false, I::Connected, D::Failed, P::Failed),
            (false, I::Disconnected, D::Failed, P::Failed),
            // closed is sticky no matter what the transports say
            (true, I::Connected, D::Connected, P::Closed),
            (true, I::Failed, D::Failed, P::Closed),
        ];

        for (is_closed, ice, dtls, want) in tests {
            assert_eq!(
                aggregate_connection_state(is_closed, ice, dtls),
                want,
                "is_closed={is_closed} ice={ice} dtls={dtls}"
            );
        }
    }

    #[test]
    fn test_aggregate_is_total() {
        // every (ice, dtls) pair yields some state without panicking
        let ice_states = [
            RTCIceConnectionState::Unspecified,
            RTCIceConnectionState::New,
            RTCIceConnectionState::Checking,
            RTCIceConnectionState::Connected,
            RTCIceConnectionState::Completed,
            RTCIceConnectionState::Disconnected,
            RTCIceConnectionState::Failed,
            RTCIceConnectionState::Closed,
        ];
        let dtls_states = [
            RTCDtlsTransportState::Unspecified,
            RTCDtlsTransportState::New,
            RTCDtlsTransportState::Connecting,
            RTCDtlsTransportState::Connected,
            RTCDtlsTransportState::Closed,
            RTCDtlsTransportState::Failed,
        ];

        for ice in ice_states {
            for dtls in dtls_states {
                let _ = aggregate_connection_state(false, ice, dtls);
            }
        }
    }
}
