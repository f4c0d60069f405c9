//! Low-level protocol logic for SCTP over a datagram transport.
//!
//! This crate contains a fully deterministic, sans-IO implementation of the
//! SCTP protocol logic used by WebRTC data channels (RFC 4960 tunneled in
//! DTLS per RFC 8261). It performs no networking and never reads the clock.
//!
//! The main entry point is [`Endpoint`], which demultiplexes datagrams for a
//! single transport. Use [`Endpoint::connect`] to initiate an association or
//! provide a [`ServerConfig`] to accept one. [`Association`] holds the state
//! for one association; it produces [`Event`]s and outgoing datagrams via
//! polling methods, and its [`Stream`]s carry the PPID-tagged user messages.

#![warn(rust_2018_idioms)]

use std::{fmt, ops};

pub(crate) mod chunk;
pub(crate) mod param;
pub(crate) mod queue;
pub(crate) mod util;

mod association;
pub use crate::association::{
    stream::{ReliabilityType, Stream, StreamEvent, StreamId},
    Association, Event,
};

pub use crate::chunk::chunk_payload_data::{ChunkPayloadData, PayloadProtocolIdentifier};

mod config;
pub use crate::config::{ClientConfig, EndpointConfig, ServerConfig, TransportConfig};

mod endpoint;
pub use crate::endpoint::{AssociationHandle, ConnectError, DatagramEvent, Endpoint};

pub(crate) mod packet;

mod shared;
pub use crate::shared::{AssociationEvent, AssociationId, EndpointEvent};

use ::shared::TransportMessage;

/// Whether an endpoint was the initiator of an association
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum Side {
    /// The initiator of an association
    #[default]
    Client = 0,
    /// The acceptor of an association
    Server = 1,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Side::Client => "Client",
            Side::Server => "Server",
        };
        write!(f, "{s}")
    }
}

impl Side {
    #[inline]
    /// Shorthand for `self == Side::Client`
    pub fn is_client(self) -> bool {
        self == Side::Client
    }

    #[inline]
    /// Shorthand for `self == Side::Server`
    pub fn is_server(self) -> bool {
        self == Side::Server
    }
}

impl ops::Not for Side {
    type Output = Side;
    fn not(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

use crate::packet::PartialDecode;
use bytes::Bytes;

/// Payload of an incoming or outgoing transmit
#[derive(Debug)]
pub enum Payload {
    PartialDecode(PartialDecode),
    RawEncode(Vec<Bytes>),
}

/// Incoming/outgoing datagram with its transport context
pub type Transmit = TransportMessage<Payload>;
