//! Reassembles media frames from reordered RTP packets.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::BytesMut;

use crate::Sample;
use rtp::packetizer::Depacketizer;

/// Default reorder window, in packets.
pub const DEFAULT_MAX_LATE: u16 = 100;

/// SampleBuilder buffers RTP packets of one SSRC and assembles them into
/// frames once a contiguous run from one partition head to the packet before
/// the next head is present.
///
/// The marker bit is treated as a hint only; the depacketizer's partition
/// head is authoritative for frame boundaries. A frame is therefore emitted
/// only when the head of the following frame has arrived, which also yields
/// the sample duration from the timestamp delta. Packets the builder gives
/// up waiting for are reported through
/// [`prev_dropped_packets`](Sample::prev_dropped_packets) on the next
/// emitted sample, once per gap rather than once per packet.
pub struct SampleBuilder<T: Depacketizer> {
    /// Window size: how many packets may be buffered before the oldest are
    /// given up on.
    max_late: u16,
    depacketizer: T,
    /// RTP clock rate of the stream, used to turn timestamp deltas into
    /// durations.
    sample_rate: u32,

    buffer: HashMap<u16, rtp::Packet>,
    prepared: VecDeque<Sample>,

    /// The first sequence number not yet consumed.
    next_seq: u16,
    started: bool,

    dropped_packets: u16,
    padding_packets: u16,
}

impl<T: Depacketizer> SampleBuilder<T> {
    /// Constructs a new SampleBuilder. `max_late` is how many packets to
    /// buffer while waiting on a gap; `sample_rate` is the RTP clock rate.
    pub fn new(max_late: u16, depacketizer: T, sample_rate: u32) -> Self {
        SampleBuilder {
            max_late: std::cmp::max(max_late, 2),
            depacketizer,
            sample_rate,
            buffer: HashMap::new(),
            prepared: VecDeque::new(),
            next_seq: 0,
            started: false,
            dropped_packets: 0,
            padding_packets: 0,
        }
    }

    /// Adds an RTP Packet to the builder.
    pub fn push(&mut self, p: rtp::Packet) {
        let seq = p.header.sequence_number;

        if !self.started {
            self.started = true;
            self.next_seq = seq;
        }

        // discard anything from before the current read position
        if seq.wrapping_sub(self.next_seq) >= 0x8000 {
            return;
        }

        if p.payload.is_empty() {
            // keep the slot occupied so the frame scan can cross it
            self.padding_packets = self.padding_packets.saturating_add(1);
        }

        self.buffer.insert(seq, p);
        self.assemble();

        if self.buffer.len() > self.max_late as usize {
            self.give_up_oldest();
            self.assemble();
        }
    }

    /// Returns the next assembled sample, if any.
    pub fn pop(&mut self) -> Option<Sample> {
        self.prepared.pop_front()
    }

    /// Emits every completed frame reachable from the read position.
    fn assemble(&mut self) {
        loop {
            // skip packets that cannot start a frame; they belong to a frame
            // whose head was consumed or lost
            while let Some(pkt) = self.buffer.get(&self.next_seq) {
                if self.depacketizer.is_partition_head(&pkt.payload) {
                    break;
                }
                self.buffer.remove(&self.next_seq);
                self.next_seq = self.next_seq.wrapping_add(1);
                self.dropped_packets = self.dropped_packets.saturating_add(1);
            }

            let head_seq = self.next_seq;
            let head_ts = match self.buffer.get(&head_seq) {
                Some(pkt) => pkt.header.timestamp,
                None => return,
            };

            // find the head of the following frame
            let mut next_head_seq = head_seq.wrapping_add(1);
            let next_head_ts = loop {
                match self.buffer.get(&next_head_seq) {
                    Some(pkt) => {
                        if self.depacketizer.is_partition_head(&pkt.payload) {
                            break pkt.header.timestamp;
                        }
                        next_head_seq = next_head_seq.wrapping_add(1);
                    }
                    // the run is not contiguous yet, wait for more packets
                    None => return,
                }
            };

            let mut data = BytesMut::new();
            let mut corrupt = false;
            let mut seq = head_seq;
            while seq != next_head_seq {
                let pkt = self
                    .buffer
                    .remove(&seq)
                    .expect("contiguous run verified above");
                match self.depacketizer.depacketize(&pkt.payload) {
                    Ok(p) => data.extend_from_slice(&p),
                    Err(_) => corrupt = true,
                }
                seq = seq.wrapping_add(1);
            }
            self.next_seq = next_head_seq;

            if corrupt {
                self.dropped_packets = self.dropped_packets.saturating_add(1);
                continue;
            }

            let delta = next_head_ts.wrapping_sub(head_ts);
            let duration =
                Duration::from_secs_f64(delta as f64 / self.sample_rate as f64);

            self.prepared.push_back(Sample {
                data: data.freeze(),
                duration,
                packet_timestamp: head_ts,
                prev_dropped_packets: std::mem::take(&mut self.dropped_packets),
                prev_padding_packets: std::mem::take(&mut self.padding_packets),
            });
        }
    }

    /// Drops the oldest buffered packets until the window fits again, moving
    /// the read position past the gap they belonged to.
    fn give_up_oldest(&mut self) {
        while self.buffer.len() > self.max_late as usize {
            let oldest = match self
                .buffer
                .keys()
                .min_by_key(|&&s| s.wrapping_sub(self.next_seq))
            {
                Some(&s) => s,
                None => return,
            };
            self.buffer.remove(&oldest);
            self.dropped_packets = self.dropped_packets.saturating_add(1);
            self.next_seq = oldest.wrapping_add(1);
        }

        // the gap the dropped packets belonged to will never fill; resume at
        // the oldest packet still buffered
        if let Some(&min) = self
            .buffer
            .keys()
            .min_by_key(|&&s| s.wrapping_sub(self.next_seq))
        {
            if min.wrapping_sub(self.next_seq) < 0x8000 && min != self.next_seq {
                self.next_seq = min;
            }
        }
    }
}
