use std::time::Duration;

/// SettingEngine allows influencing behavior that the W3C API surface does
/// not expose. Settings must not change after the engine is handed to an
/// [`API`](super::API).
#[derive(Debug, Clone)]
pub struct SettingEngine {
    pub(crate) detach_data_channels: bool,
    /// MTU used when packetizing outbound media.
    pub(crate) send_mtu: usize,
    /// Largest SCTP user message we accept to send.
    pub(crate) sctp_max_message_size: u32,
    /// Interval between keyframe requests for inbound video tracks.
    pub(crate) pli_interval: Duration,
    /// Hard ceiling on a data channel's buffered amount; `send` fails once
    /// exceeding it, instead of buffering without bound.
    pub(crate) buffered_amount_limit: Option<usize>,
    /// How long the external ICE transport may stay disconnected before the
    /// owner should consider the connection failed. Enforced by the driver,
    /// documented here.
    pub(crate) ice_disconnected_timeout: Duration,
    /// Budget for the external DTLS handshake, as above.
    pub(crate) dtls_handshake_timeout: Duration,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            detach_data_channels: false,
            send_mtu: 1200,
            sctp_max_message_size: 262_144,
            pli_interval: Duration::from_secs(3),
            buffered_amount_limit: None,
            ice_disconnected_timeout: Duration::from_secs(5),
            dtls_handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl SettingEngine {
    /// Enables the raw data-channel API: channels can be detached from the
    /// message-event surface after opening.
    pub fn detach_data_channels(&mut self) {
        self.detach_data_channels = true;
    }

    pub fn set_send_mtu(&mut self, mtu: usize) {
        self.send_mtu = mtu;
    }

    pub fn set_sctp_max_message_size(&mut self, size: u32) {
        self.sctp_max_message_size = size;
    }

    pub fn set_pli_interval(&mut self, interval: Duration) {
        self.pli_interval = interval;
    }

    pub fn set_buffered_amount_limit(&mut self, limit: Option<usize>) {
        self.buffered_amount_limit = limit;
    }

    pub fn set_ice_disconnected_timeout(&mut self, timeout: Duration) {
        self.ice_disconnected_timeout = timeout;
    }

    pub fn set_dtls_handshake_timeout(&mut self, timeout: Duration) {
        self.dtls_handshake_timeout = timeout;
    }

    pub fn get_send_mtu(&self) -> usize {
        self.send_mtu
    }

    pub fn get_sctp_max_message_size(&self) -> u32 {
        self.sctp_max_message_size
    }
}
