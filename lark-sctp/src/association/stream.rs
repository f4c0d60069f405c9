use bytes::Bytes;

use crate::association::Association;
use crate::chunk::chunk_payload_data::PayloadProtocolIdentifier;
use crate::queue::reassembly_queue::ReassemblyQueue;
use ::shared::error::Result;

pub type StreamId = u16;

/// Reliability mode of one stream, RFC 3758.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ReliabilityType {
    /// Reliable transmission with TCP-like retransmission
    #[default]
    Reliable = 0,
    /// Partial reliability: the message is abandoned after
    /// `reliability_value` retransmissions
    Rexmit = 1,
    /// Partial reliability: the message is abandoned once it has been in
    /// flight for `reliability_value` milliseconds
    Timed = 2,
}

/// Things that happened on a stream since the last poll.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The peer opened this stream by sending on it
    Opened { id: StreamId },
    /// A complete user message is ready to read
    Readable { id: StreamId },
    /// The peer reset its outgoing half of this stream
    Reset { id: StreamId },
    /// Queued-but-unsent bytes fell below the configured threshold
    BufferedAmountLow { id: StreamId },
}

/// Internal per-stream state owned by the association.
#[derive(Debug)]
pub(crate) struct StreamState {
    pub(crate) stream_identifier: StreamId,
    pub(crate) default_payload_type: PayloadProtocolIdentifier,
    pub(crate) reliability_type: ReliabilityType,
    pub(crate) reliability_value: u32,
    pub(crate) unordered: bool,
    pub(crate) next_ssn: u16,
    pub(crate) reassembly: ReassemblyQueue,
    pub(crate) buffered_amount: usize,
    pub(crate) buffered_amount_low: usize,
    /// Outgoing half closed, a reset request is pending or complete.
    pub(crate) write_shutdown: bool,
}

impl StreamState {
    pub(crate) fn new(id: StreamId, default_payload_type: PayloadProtocolIdentifier) -> Self {
        StreamState {
            stream_identifier: id,
            default_payload_type,
            reliability_type: ReliabilityType::Reliable,
            reliability_value: 0,
            unordered: false,
            next_ssn: 0,
            reassembly: ReassemblyQueue::new(id),
            buffered_amount: 0,
            buffered_amount_low: 0,
            write_shutdown: false,
        }
    }
}

/// A handle to one stream of an association.
pub struct Stream<'a> {
    pub(crate) association: &'a mut Association,
    pub(crate) id: StreamId,
}

impl Stream<'_> {
    pub fn stream_identifier(&self) -> StreamId {
        self.id
    }

    /// Configures delivery semantics for messages written after this call.
    pub fn set_reliability_params(
        &mut self,
        unordered: bool,
        reliability_type: ReliabilityType,
        reliability_value: u32,
    ) -> Result<()> {
        self.association
            .set_reliability_params(self.id, unordered, reliability_type, reliability_value)
    }

    /// Writes one user message with the stream's default PPID.
    pub fn write(&mut self, data: &Bytes) -> Result<usize> {
        let ppi = self.association.default_payload_type(self.id)?;
        self.association.write_sctp(self.id, data.clone(), ppi)
    }

    /// Writes one user message tagged with `ppi`.
    pub fn write_sctp(&mut self, data: &Bytes, ppi: PayloadProtocolIdentifier) -> Result<usize> {
        self.association.write_sctp(self.id, data.clone(), ppi)
    }

    /// Returns the next complete inbound message, if one is ready.
    pub fn read_sctp(&mut self) -> Result<Option<(Bytes, PayloadProtocolIdentifier)>> {
        self.association.read_sctp(self.id)
    }

    /// Bytes queued locally but not yet handed to the wire.
    pub fn buffered_amount(&self) -> usize {
        self.association.buffered_amount(self.id)
    }

    pub fn buffered_amount_low_threshold(&self) -> usize {
        self.association.buffered_amount_low_threshold(self.id)
    }

    pub fn set_buffered_amount_low_threshold(&mut self, threshold: usize) {
        self.association
            .set_buffered_amount_low_threshold(self.id, threshold);
    }

    /// Closes the outgoing half of the stream by requesting an SSN reset.
    pub fn stop(&mut self) -> Result<()> {
        self.association.reset_stream(self.id)
    }
}
