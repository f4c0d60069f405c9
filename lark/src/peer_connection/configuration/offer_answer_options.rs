/// Options for [`create_offer`](crate::RTCPeerConnection::create_offer).
#[derive(Default, Debug, Clone, Copy)]
pub struct RTCOfferOptions {
    /// When true, new ICE credentials are generated and the external ICE
    /// agent is expected to restart. Data channels keep their state;
    /// messages sent while disconnected stay buffered in the SCTP send
    /// queue and flush after the restart completes.
    pub ice_restart: bool,

    pub voice_activity_detection: bool,
}

/// Options for [`create_answer`](crate::RTCPeerConnection::create_answer).
#[derive(Default, Debug, Clone, Copy)]
pub struct RTCAnswerOptions {
    pub voice_activity_detection: bool,
}
