/// Configuration for [`create_data_channel`](crate::RTCPeerConnection::create_data_channel).
#[derive(Debug, Clone)]
pub struct RTCDataChannelInit {
    /// Whether messages arrive in send order. Defaults to true.
    pub ordered: bool,
    /// Lifetime budget in milliseconds for partial-reliability-timed mode.
    /// Mutually exclusive with `max_retransmits`.
    pub max_packet_life_time: Option<u16>,
    /// Retransmission budget for partial-reliability-rexmit mode.
    /// Mutually exclusive with `max_packet_life_time`.
    pub max_retransmits: Option<u16>,
    /// Sub-protocol name carried in the DCEP OPEN.
    pub protocol: String,
    /// When set, the channel is negotiated out of band under this id and no
    /// DCEP OPEN is sent.
    pub negotiated: Option<u16>,
}

impl Default for RTCDataChannelInit {
    fn default() -> Self {
        RTCDataChannelInit {
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            protocol: String::new(),
            negotiated: None,
        }
    }
}
