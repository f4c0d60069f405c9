use bytes::Bytes;

/// ChunkCookieEcho echoes the state cookie from an INIT ACK back to the
/// association acceptor (RFC 4960 §3.3.11).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkCookieEcho {
    pub(crate) cookie: Bytes,
}

/// ChunkCookieAck acknowledges a COOKIE ECHO (RFC 4960 §3.3.12).
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ChunkCookieAck {}
