pub mod direction;
pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;

pub use direction::RTCRtpTransceiverDirection;
pub use rtp_codec::RTPCodecType;

use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiverInternal;
use crate::rtp_transceiver::rtp_sender::RTCRtpSenderInternal;

/// Index of a transceiver within its connection. Stable for the lifetime of
/// the connection; transceivers are never removed, only stopped.
pub type TransceiverId = usize;

/// Pairs a sender and a receiver sharing one media section. The mid, once
/// assigned by negotiation, never changes for the connection's lifetime.
#[derive(Default)]
pub struct RTCRtpTransceiver {
    pub(crate) mid: Option<String>,
    pub(crate) kind: RTPCodecType,
    /// The direction the application asked for.
    pub(crate) direction: RTCRtpTransceiverDirection,
    /// The direction negotiation last settled on.
    pub(crate) current_direction: RTCRtpTransceiverDirection,
    pub(crate) sender: Option<RTCRtpSenderInternal>,
    pub(crate) receiver: RTCRtpReceiverInternal,
    pub(crate) stopped: bool,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(kind: RTPCodecType, direction: RTCRtpTransceiverDirection) -> Self {
        RTCRtpTransceiver {
            mid: None,
            kind,
            direction,
            current_direction: RTCRtpTransceiverDirection::Unspecified,
            sender: None,
            receiver: RTCRtpReceiverInternal::default(),
            stopped: false,
        }
    }

    /// The media identifier bound to this transceiver by negotiation.
    pub fn mid(&self) -> Option<&str> {
        self.mid.as_deref()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction
    }

    pub fn current_direction(&self) -> RTCRtpTransceiverDirection {
        self.current_direction
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }
}
