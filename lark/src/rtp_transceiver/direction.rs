use std::fmt;

/// Direction of a transceiver, W3C WebRTC §5.4.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCRtpTransceiverDirection {
    Unspecified = 0,
    /// The transceiver both sends and receives.
    #[default]
    Sendrecv,
    /// The transceiver only sends.
    Sendonly,
    /// The transceiver only receives.
    Recvonly,
    /// The transceiver neither sends nor receives.
    Inactive,
    /// The transceiver is permanently stopped.
    Stopped,
}

const DIRECTION_SENDRECV_STR: &str = "sendrecv";
const DIRECTION_SENDONLY_STR: &str = "sendonly";
const DIRECTION_RECVONLY_STR: &str = "recvonly";
const DIRECTION_INACTIVE_STR: &str = "inactive";
const DIRECTION_STOPPED_STR: &str = "stopped";

impl From<&str> for RTCRtpTransceiverDirection {
    fn from(raw: &str) -> Self {
        match raw {
            DIRECTION_SENDRECV_STR => RTCRtpTransceiverDirection::Sendrecv,
            DIRECTION_SENDONLY_STR => RTCRtpTransceiverDirection::Sendonly,
            DIRECTION_RECVONLY_STR => RTCRtpTransceiverDirection::Recvonly,
            DIRECTION_INACTIVE_STR => RTCRtpTransceiverDirection::Inactive,
            DIRECTION_STOPPED_STR => RTCRtpTransceiverDirection::Stopped,
            _ => RTCRtpTransceiverDirection::Unspecified,
        }
    }
}

impl fmt::Display for RTCRtpTransceiverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCRtpTransceiverDirection::Sendrecv => write!(f, "{DIRECTION_SENDRECV_STR}"),
            RTCRtpTransceiverDirection::Sendonly => write!(f, "{DIRECTION_SENDONLY_STR}"),
            RTCRtpTransceiverDirection::Recvonly => write!(f, "{DIRECTION_RECVONLY_STR}"),
            RTCRtpTransceiverDirection::Inactive => write!(f, "{DIRECTION_INACTIVE_STR}"),
            RTCRtpTransceiverDirection::Stopped => write!(f, "{DIRECTION_STOPPED_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

impl RTCRtpTransceiverDirection {
    /// The direction the peer observes for our direction.
    pub fn reverse(&self) -> RTCRtpTransceiverDirection {
        match *self {
            RTCRtpTransceiverDirection::Sendonly => RTCRtpTransceiverDirection::Recvonly,
            RTCRtpTransceiverDirection::Recvonly => RTCRtpTransceiverDirection::Sendonly,
            other => other,
        }
    }

    pub fn has_send(&self) -> bool {
        matches!(
            self,
            RTCRtpTransceiverDirection::Sendrecv | RTCRtpTransceiverDirection::Sendonly
        )
    }

    pub fn has_recv(&self) -> bool {
        matches!(
            self,
            RTCRtpTransceiverDirection::Sendrecv | RTCRtpTransceiverDirection::Recvonly
        )
    }

    /// Intersects our desired direction with the remote's offered direction:
    /// we may only send what they receive, and receive what they send.
    pub fn intersect(&self, remote: RTCRtpTransceiverDirection) -> RTCRtpTransceiverDirection {
        RTCRtpTransceiverDirection::from_send_recv(
            self.has_send() && remote.has_recv(),
            self.has_recv() && remote.has_send(),
        )
    }

    pub fn from_send_recv(send: bool, recv: bool) -> RTCRtpTransceiverDirection {
        match (send, recv) {
            (true, true) => RTCRtpTransceiverDirection::Sendrecv,
            (true, false) => RTCRtpTransceiverDirection::Sendonly,
            (false, true) => RTCRtpTransceiverDirection::Recvonly,
            (false, false) => RTCRtpTransceiverDirection::Inactive,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_direction_intersection() {
        use RTCRtpTransceiverDirection::*;

        let tests = vec![
            (Sendrecv, Sendrecv, Sendrecv),
            // sendrecv ∩ sendonly = recvonly
            (Sendrecv, Sendonly, Recvonly),
            (Sendrecv, Recvonly, Sendonly),
            (Sendonly, Sendonly, Inactive),
            (Sendonly, Recvonly, Sendonly),
            (Recvonly, Sendonly, Recvonly),
            (Recvonly, Recvonly, Inactive),
            (Inactive, Sendrecv, Inactive),
        ];

        for (ours, theirs, want) in tests {
            assert_eq!(ours.intersect(theirs), want, "{ours} ∩ {theirs}");
        }
    }

    #[test]
    fn test_direction_reverse() {
        use RTCRtpTransceiverDirection::*;
        assert_eq!(Sendonly.reverse(), Recvonly);
        assert_eq!(Recvonly.reverse(), Sendonly);
        assert_eq!(Sendrecv.reverse(), Sendrecv);
        assert_eq!(Inactive.reverse(), Inactive);
    }
}
