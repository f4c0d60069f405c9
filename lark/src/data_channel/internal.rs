use std::collections::VecDeque;

use bytes::Bytes;

use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannelId, RTCDataChannelInit};
use datachannel::DataChannel;

/// The connection-owned state of one data channel.
#[derive(Debug, Default)]
pub(crate) struct RTCDataChannelInternal {
    pub(crate) id: RTCDataChannelId,
    pub(crate) label: String,
    pub(crate) protocol: String,
    pub(crate) ordered: bool,
    pub(crate) max_packet_life_time: Option<u16>,
    pub(crate) max_retransmits: Option<u16>,
    pub(crate) negotiated: Option<u16>,

    pub(crate) ready_state: RTCDataChannelState,
    /// Assigned once the DTLS role fixes the parity, or taken from the
    /// negotiated id.
    pub(crate) stream_id: Option<u16>,
    /// The sans-IO DCEP pipe, created when the channel binds to a stream.
    pub(crate) channel: Option<DataChannel>,

    /// Suppresses the message-event surface after `detach()`.
    pub(crate) detached: bool,
    pub(crate) detached_reads: VecDeque<Bytes>,

    pub(crate) buffered_amount_low_threshold: usize,
    /// Whether the open transition was already announced.
    pub(crate) announced_open: bool,
}

impl RTCDataChannelInternal {
    pub(crate) fn new(id: RTCDataChannelId, label: String, init: &RTCDataChannelInit) -> Self {
        RTCDataChannelInternal {
            id,
            label,
            protocol: init.protocol.clone(),
            ordered: init.ordered,
            max_packet_life_time: init.max_packet_life_time,
            max_retransmits: init.max_retransmits,
            negotiated: init.negotiated,
            ready_state: RTCDataChannelState::Connecting,
            stream_id: init.negotiated,
            channel: None,
            detached: false,
            detached_reads: VecDeque::new(),
            buffered_amount_low_threshold: 0,
            announced_open: false,
        }
    }
}
