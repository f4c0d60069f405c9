/// Chunk type identifiers, RFC 4960 §3.2 plus the RFC 3758 and RFC 6525
/// extensions.
pub(crate) const CT_PAYLOAD_DATA: u8 = 0;
pub(crate) const CT_INIT: u8 = 1;
pub(crate) const CT_INIT_ACK: u8 = 2;
pub(crate) const CT_SACK: u8 = 3;
pub(crate) const CT_HEARTBEAT: u8 = 4;
pub(crate) const CT_HEARTBEAT_ACK: u8 = 5;
pub(crate) const CT_ABORT: u8 = 6;
pub(crate) const CT_SHUTDOWN: u8 = 7;
pub(crate) const CT_SHUTDOWN_ACK: u8 = 8;
pub(crate) const CT_ERROR: u8 = 9;
pub(crate) const CT_COOKIE_ECHO: u8 = 10;
pub(crate) const CT_COOKIE_ACK: u8 = 11;
pub(crate) const CT_SHUTDOWN_COMPLETE: u8 = 14;
pub(crate) const CT_RECONFIG: u8 = 130;
pub(crate) const CT_FORWARD_TSN: u8 = 192;
