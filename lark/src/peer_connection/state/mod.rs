pub mod dtls_transport_state;
pub mod ice_connection_state;
pub mod peer_connection_state;
pub mod signaling_state;

pub use dtls_transport_state::RTCDtlsTransportState;
pub use ice_connection_state::RTCIceConnectionState;
pub use peer_connection_state::RTCPeerConnectionState;
pub(crate) use peer_connection_state::NegotiationNeededState;
pub use signaling_state::RTCSignalingState;
