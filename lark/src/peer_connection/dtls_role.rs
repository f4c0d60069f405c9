use std::fmt;

/// The DTLS role negotiated via the SDP a=setup attribute (RFC 4145,
/// RFC 8842). The role decides data-channel id parity: the client takes
/// even stream ids, the server odd ones (RFC 8832 §6).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DTLSRole {
    #[default]
    Unspecified = 0,
    /// The endpoint is willing to take either role (a=setup:actpass, only
    /// valid in an offer).
    Auto,
    /// The endpoint initiates the handshake (a=setup:active).
    Client,
    /// The endpoint awaits the handshake (a=setup:passive).
    Server,
}

impl fmt::Display for DTLSRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DTLSRole::Auto => write!(f, "auto"),
            DTLSRole::Client => write!(f, "client"),
            DTLSRole::Server => write!(f, "server"),
            _ => write!(f, "Unspecified"),
        }
    }
}

impl DTLSRole {
    pub(crate) fn to_setup_value(self) -> &'static str {
        match self {
            DTLSRole::Client => "active",
            DTLSRole::Server => "passive",
            _ => "actpass",
        }
    }

    pub(crate) fn from_setup_value(raw: &str) -> DTLSRole {
        match raw {
            "active" => DTLSRole::Client,
            "passive" => DTLSRole::Server,
            "actpass" => DTLSRole::Auto,
            _ => DTLSRole::Unspecified,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_setup_value_roundtrip() {
        for role in [DTLSRole::Client, DTLSRole::Server, DTLSRole::Auto] {
            assert_eq!(DTLSRole::from_setup_value(role.to_setup_value()), role);
        }
    }
}
