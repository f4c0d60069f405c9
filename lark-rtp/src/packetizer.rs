use bytes::Bytes;

use crate::header::Header;
use crate::packet::Packet;
use crate::sequence::Sequencer;
use shared::error::Result;

/// Payloader fragments an encoded frame into RTP payloads that fit an MTU.
pub trait Payloader {
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>>;
}

/// Depacketizer parses an RTP payload back into codec bytes.
pub trait Depacketizer {
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes>;

    /// Checks whether the payload is at the beginning of a partition.
    ///
    /// Returns false if the result could not be determined.
    fn is_partition_head(&self, payload: &Bytes) -> bool;

    /// Checks whether the packet is at the end of a partition.
    fn is_partition_tail(&self, marker: bool, payload: &Bytes) -> bool;
}

/// Packetizer turns encoded frames into sequenced, timestamped RTP packets.
pub struct Packetizer {
    pub mtu: usize,
    pub payload_type: u8,
    pub ssrc: u32,
    payloader: Box<dyn Payloader>,
    sequencer: Sequencer,
    timestamp: u32,
    pub clock_rate: u32,
}

impl Packetizer {
    /// Creates a packetizer with random sequence number and timestamp bases.
    pub fn new(
        mtu: usize,
        payload_type: u8,
        ssrc: u32,
        payloader: Box<dyn Payloader>,
        clock_rate: u32,
    ) -> Self {
        Packetizer {
            mtu,
            payload_type,
            ssrc,
            payloader,
            sequencer: Sequencer::new_random(),
            timestamp: rand::random::<u32>(),
            clock_rate,
        }
    }

    pub fn with_sequencer(mut self, sequencer: Sequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Packetizes the payload of an RTP packet and returns one or more RTP
    /// packets. The marker bit is set on the last packet of the frame; the
    /// timestamp advances by `samples` afterwards.
    pub fn packetize(&mut self, payload: &Bytes, samples: u32) -> Result<Vec<Packet>> {
        let payloads = self.payloader.payload(self.mtu - 12, payload)?;
        let payloads_len = payloads.len();
        let mut packets = Vec::with_capacity(payloads_len);
        for (i, payload) in payloads.into_iter().enumerate() {
            packets.push(Packet {
                header: Header {
                    version: 2,
                    marker: i == payloads_len - 1,
                    payload_type: self.payload_type,
                    sequence_number: self.sequencer.next_sequence_number(),
                    timestamp: self.timestamp,
                    ssrc: self.ssrc,
                    ..Default::default()
                },
                payload,
                padding_size: 0,
            });
        }

        self.timestamp = self.timestamp.wrapping_add(samples);

        Ok(packets)
    }

    /// Causes a gap in sample count between Packetize requests so the
    /// receiver can detect the gap.
    pub fn skip_samples(&mut self, skipped_samples: u32) {
        self.timestamp = self.timestamp.wrapping_add(skipped_samples);
    }

    pub fn roll_over_count(&self) -> u64 {
        self.sequencer.roll_over_count()
    }
}
