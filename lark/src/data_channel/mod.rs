//! Peer-to-peer Data API.
//!
//! Channels are owned by their [`RTCPeerConnection`]; the types here are
//! short-lived handles borrowing the connection. Messages and state changes
//! surface on the connection's event stream.

pub(crate) mod internal;

pub mod init;
pub mod state;

use bytes::Bytes;

use crate::peer_connection::RTCPeerConnection;
use interceptor::Interceptor;
use shared::error::Result;

pub use init::RTCDataChannelInit;
pub use state::RTCDataChannelState;

/// Identifier for a data channel within a particular peer connection,
/// assigned at creation in creation order. This is not the SCTP stream id,
/// which only exists once negotiation fixes the DTLS role.
pub type RTCDataChannelId = u16;

/// A handle to one data channel of a connection.
pub struct RTCDataChannel<'a, I: Interceptor> {
    pub(crate) peer_connection: &'a mut RTCPeerConnection<I>,
    pub(crate) id: RTCDataChannelId,
}

impl<'a, I: Interceptor> RTCDataChannel<'a, I> {
    fn internal(&self) -> &internal::RTCDataChannelInternal {
        // channels are never removed from the map while a handle is alive,
        // and handles are only created for existing ids
        self.peer_connection
            .data_channel_internal(self.id)
            .expect("handle outlived its channel")
    }

    /// A label that can be used to distinguish this channel from others.
    /// Labels are not required to be unique.
    pub fn label(&self) -> &str {
        self.internal().label.as_str()
    }

    /// Whether out-of-order delivery is disallowed.
    pub fn ordered(&self) -> bool {
        self.internal().ordered
    }

    /// Length of the window (msec) during which (re)transmissions may occur
    /// in partial-reliability-timed mode.
    pub fn max_packet_life_time(&self) -> Option<u16> {
        self.internal().max_packet_life_time
    }

    /// Maximum number of retransmissions attempted in
    /// partial-reliability-rexmit mode.
    pub fn max_retransmits(&self) -> Option<u16> {
        self.internal().max_retransmits
    }

    /// The name of the sub-protocol used with this channel.
    pub fn protocol(&self) -> &str {
        self.internal().protocol.as_str()
    }

    /// Whether the channel was negotiated out of band.
    pub fn negotiated(&self) -> bool {
        self.internal().negotiated.is_some()
    }

    /// The SCTP stream id, once the DTLS role fixed the parity.
    pub fn stream_id(&self) -> Option<u16> {
        self.internal().stream_id
    }

    pub fn ready_state(&self) -> RTCDataChannelState {
        self.internal().ready_state
    }

    /// Sends one binary message. Fails when the channel is not open, the
    /// message exceeds the negotiated maximum message size, or a configured
    /// buffered-amount ceiling would be exceeded. Empty messages are legal.
    ///
    /// Messages queued while the external ICE transport restarts stay in
    /// the SCTP send queue and are delivered once connectivity returns.
    pub fn send(&mut self, data: &Bytes) -> Result<usize> {
        self.peer_connection
            .data_channel_send(self.id, data.clone(), false)
    }

    /// Sends one UTF-8 string message, with the same rules as [`send`](Self::send).
    pub fn send_text(&mut self, text: impl Into<String>) -> Result<usize> {
        let text = text.into();
        self.peer_connection
            .data_channel_send(self.id, Bytes::from(text.into_bytes()), true)
    }

    /// Bytes queued locally but not yet handed to the SCTP association.
    pub fn buffered_amount(&self) -> usize {
        self.peer_connection.data_channel_buffered_amount(self.id)
    }

    pub fn buffered_amount_low_threshold(&self) -> usize {
        self.internal().buffered_amount_low_threshold
    }

    /// Sets the watermark under which
    /// [`OnDataChannelBufferedAmountLow`](crate::peer_connection::event::RTCPeerConnectionEvent::OnDataChannelBufferedAmountLow)
    /// fires.
    pub fn set_buffered_amount_low_threshold(&mut self, threshold: usize) {
        self.peer_connection
            .data_channel_set_buffered_amount_low_threshold(self.id, threshold);
    }

    /// Starts closing the channel: queued messages flush, then the
    /// underlying stream is reset.
    pub fn close(&mut self) -> Result<()> {
        self.peer_connection.data_channel_close(self.id)
    }

    /// Detaches the channel from the message-event API, returning a raw
    /// handle bound to the underlying stream. Requires
    /// [`detach_data_channels`](crate::api::setting_engine::SettingEngine::detach_data_channels)
    /// and an open channel. After detaching, no message events fire for this
    /// channel; the two APIs cannot be mixed.
    pub fn detach(self) -> Result<DetachedDataChannel<'a, I>> {
        let RTCDataChannel {
            peer_connection,
            id,
        } = self;
        peer_connection.data_channel_detach(id)?;
        Ok(DetachedDataChannel {
            peer_connection,
            id,
        })
    }
}

/// The raw half of a detached data channel: a reader/writer on the
/// underlying stream with no message-event surface.
pub struct DetachedDataChannel<'a, I: Interceptor> {
    pub(crate) peer_connection: &'a mut RTCPeerConnection<I>,
    pub(crate) id: RTCDataChannelId,
}

impl<I: Interceptor> DetachedDataChannel<'_, I> {
    /// Reads one queued inbound message.
    pub fn read(&mut self) -> Option<Bytes> {
        self.peer_connection.data_channel_detached_read(self.id)
    }

    /// Writes one binary message to the stream.
    pub fn write(&mut self, data: &Bytes) -> Result<usize> {
        self.peer_connection
            .data_channel_send(self.id, data.clone(), false)
    }
}
