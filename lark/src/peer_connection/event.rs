use bytes::Bytes;

use crate::data_channel::RTCDataChannelId;
use crate::peer_connection::state::{
    RTCIceConnectionState, RTCPeerConnectionState, RTCSignalingState,
};
use crate::track::track_remote::TrackRemoteId;

/// One user message received on a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelMessage {
    pub is_string: bool,
    pub data: Bytes,
}

/// Everything observable about a connection, as a single tagged event
/// stream. Poll with [`poll_event`](crate::RTCPeerConnection::poll_event);
/// events for one channel arrive in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RTCPeerConnectionEvent {
    OnSignalingStateChange(RTCSignalingState),
    OnIceConnectionStateChange(RTCIceConnectionState),
    OnConnectionStateChange(RTCPeerConnectionState),
    /// Negotiation is required; create and signal a new offer.
    OnNegotiationNeeded,
    /// A new inbound media track materialized.
    OnTrack(TrackRemoteId),
    /// The remote side opened a data channel.
    OnDataChannel(RTCDataChannelId),
    /// A data channel finished its opening handshake.
    OnDataChannelOpen(RTCDataChannelId),
    /// A user message arrived on an open channel.
    OnDataChannelMessage(RTCDataChannelId, DataChannelMessage),
    /// The channel's buffered amount crossed its low watermark downward.
    OnDataChannelBufferedAmountLow(RTCDataChannelId),
    /// The channel closed; emitted exactly once.
    OnDataChannelClose(RTCDataChannelId),
}
