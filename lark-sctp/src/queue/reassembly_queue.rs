use bytes::{Bytes, BytesMut};

use crate::chunk::chunk_payload_data::{ChunkPayloadData, PayloadProtocolIdentifier};
use crate::util::{sna16lt, sna32lt};

/// The fragments of one (possibly partial) user message.
#[derive(Debug, Default)]
pub(crate) struct ChunkSet {
    pub(crate) ssn: u16,
    pub(crate) ppi: PayloadProtocolIdentifier,
    pub(crate) chunks: Vec<ChunkPayloadData>,
}

impl ChunkSet {
    fn new(ssn: u16, ppi: PayloadProtocolIdentifier) -> Self {
        ChunkSet {
            ssn,
            ppi,
            chunks: vec![],
        }
    }

    fn push(&mut self, chunk: ChunkPayloadData) -> bool {
        // check if dup
        for c in &self.chunks {
            if c.tsn == chunk.tsn {
                return false;
            }
        }

        // insert sorted by TSN
        let pos = self
            .chunks
            .iter()
            .position(|c| sna32lt(chunk.tsn, c.tsn))
            .unwrap_or(self.chunks.len());
        self.chunks.insert(pos, chunk);
        true
    }

    fn is_complete(&self) -> bool {
        // Condition for complete set
        //   0. Has at least one chunk.
        //   1. Begins with beginning_fragment set to true
        //   2. Ends with ending_fragment set to true
        //   3. TSN monotinically increase by 1 from beginning to end
        if self.chunks.is_empty() {
            return false;
        }
        if !self.chunks[0].beginning_fragment {
            return false;
        }
        if !self.chunks[self.chunks.len() - 1].ending_fragment {
            return false;
        }

        let mut last_tsn: Option<u32> = None;
        for c in &self.chunks {
            if let Some(last) = last_tsn {
                if c.tsn != last.wrapping_add(1) {
                    return false;
                }
            }
            last_tsn = Some(c.tsn);
        }
        true
    }

    fn assemble(&self) -> Bytes {
        let mut out = BytesMut::new();
        for c in &self.chunks {
            out.extend_from_slice(&c.user_data);
        }
        out.freeze()
    }

    fn n_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.user_data.len()).sum()
    }
}

/// Reassembles DATA chunks of one stream into complete user messages,
/// delivering ordered messages in SSN order and unordered messages as soon
/// as their fragments are contiguous.
#[derive(Debug, Default)]
pub(crate) struct ReassemblyQueue {
    pub(crate) si: u16,
    pub(crate) next_ssn: u16,
    ordered: Vec<ChunkSet>,
    unordered: Vec<ChunkSet>,
    unordered_chunks: Vec<ChunkPayloadData>,
    pub(crate) n_bytes: usize,
}

impl ReassemblyQueue {
    pub(crate) fn new(si: u16) -> Self {
        ReassemblyQueue {
            si,
            ..Default::default()
        }
    }

    pub(crate) fn push(&mut self, chunk: ChunkPayloadData) -> bool {
        if chunk.stream_identifier != self.si {
            return false;
        }

        if chunk.unordered {
            self.n_bytes += chunk.user_data.len();
            // insert into unordered_chunks sorted by TSN
            let pos = self
                .unordered_chunks
                .iter()
                .position(|c| sna32lt(chunk.tsn, c.tsn))
                .unwrap_or(self.unordered_chunks.len());
            self.unordered_chunks.insert(pos, chunk);

            // assemble any complete TSN-contiguous runs
            while let Some(set) = self.find_complete_unordered_chunk_set() {
                self.unordered.push(set);
            }
            true
        } else {
            // discard if sequencing is older than what was already delivered
            if sna16lt(chunk.stream_sequence_number, self.next_ssn) {
                return false;
            }

            let ssn = chunk.stream_sequence_number;
            let ppi = chunk.payload_type;
            let len = chunk.user_data.len();

            if let Some(set) = self.ordered.iter_mut().find(|s| s.ssn == ssn) {
                let pushed = set.push(chunk);
                if pushed {
                    self.n_bytes += len;
                }
                return pushed;
            }

            self.n_bytes += len;
            let mut set = ChunkSet::new(ssn, ppi);
            set.push(chunk);
            let pos = self
                .ordered
                .iter()
                .position(|s| sna16lt(ssn, s.ssn))
                .unwrap_or(self.ordered.len());
            self.ordered.insert(pos, set);
            true
        }
    }

    fn find_complete_unordered_chunk_set(&mut self) -> Option<ChunkSet> {
        let mut start = None;
        let mut count = 0;
        let mut last_tsn = 0u32;

        for (i, c) in self.unordered_chunks.iter().enumerate() {
            // seek a beginning fragment
            if c.beginning_fragment {
                start = Some(i);
                count = 0;
                last_tsn = c.tsn;
            }

            if let Some(s) = start {
                if i > s && c.tsn != last_tsn.wrapping_add(1) {
                    start = None;
                    continue;
                }
                last_tsn = c.tsn;
                count += 1;
                if c.ending_fragment {
                    let chunks: Vec<ChunkPayloadData> =
                        self.unordered_chunks.drain(s..s + count).collect();
                    let mut set = ChunkSet::new(0, chunks[0].payload_type);
                    for chunk in chunks {
                        set.chunks.push(chunk);
                    }
                    return Some(set);
                }
            }
        }
        None
    }

    /// Whether `read` would currently return a message.
    pub(crate) fn read_ready(&self) -> bool {
        if !self.unordered.is_empty() {
            return true;
        }
        self.ordered
            .first()
            .map(|set| set.is_complete() && set.ssn == self.next_ssn)
            .unwrap_or(false)
    }

    /// Returns the next complete message, honoring ordering.
    pub(crate) fn read(&mut self) -> Option<(Bytes, PayloadProtocolIdentifier)> {
        // deliver unordered messages first
        if !self.unordered.is_empty() {
            let set = self.unordered.remove(0);
            self.n_bytes -= set.n_bytes();
            return Some((set.assemble(), set.ppi));
        }

        if let Some(first) = self.ordered.first() {
            if first.is_complete() && first.ssn == self.next_ssn {
                let set = self.ordered.remove(0);
                self.n_bytes -= set.n_bytes();
                self.next_ssn = self.next_ssn.wrapping_add(1);
                return Some((set.assemble(), set.ppi));
            }
        }
        None
    }

    /// Drops buffered messages below `new_ssn` when a FORWARD TSN abandons
    /// them, and advances the expected sequence number.
    pub(crate) fn forward_tsn_for_ordered(&mut self, last_ssn: u16) {
        let si = self.si;
        self.ordered.retain(|set| {
            let keep = !sna16lt(set.ssn, last_ssn.wrapping_add(1)) || set.is_complete();
            if !keep {
                log::trace!("si={si}: dropping abandoned ssn={}", set.ssn);
            }
            keep
        });
        if sna16lt(self.next_ssn, last_ssn.wrapping_add(1)) {
            self.next_ssn = last_ssn.wrapping_add(1);
        }
        self.recount_bytes();
    }

    /// Drops unordered fragments at or below the abandoned TSN.
    pub(crate) fn forward_tsn_for_unordered(&mut self, new_cumulative_tsn: u32) {
        self.unordered_chunks
            .retain(|c| sna32lt(new_cumulative_tsn, c.tsn));
        self.recount_bytes();
    }

    fn recount_bytes(&mut self) {
        let mut n = 0;
        for set in self.ordered.iter().chain(self.unordered.iter()) {
            n += set.n_bytes();
        }
        for c in &self.unordered_chunks {
            n += c.user_data.len();
        }
        self.n_bytes = n;
    }

    /// Resets expected sequencing, per an incoming SSN reset.
    pub(crate) fn reset(&mut self) {
        self.next_ssn = 0;
    }
}

#[cfg(test)]
mod reassembly_queue_test {
    use super::*;

    fn frag(
        tsn: u32,
        ssn: u16,
        b: bool,
        e: bool,
        unordered: bool,
        data: &'static [u8],
    ) -> ChunkPayloadData {
        ChunkPayloadData {
            tsn,
            stream_identifier: 0,
            stream_sequence_number: ssn,
            beginning_fragment: b,
            ending_fragment: e,
            unordered,
            payload_type: PayloadProtocolIdentifier::Binary,
            user_data: Bytes::from_static(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_ordered_single_fragment() {
        let mut q = ReassemblyQueue::new(0);
        assert!(q.push(frag(1, 0, true, true, false, b"ABC")));

        let (data, ppi) = q.read().unwrap();
        assert_eq!(data, Bytes::from_static(b"ABC"));
        assert_eq!(ppi, PayloadProtocolIdentifier::Binary);
    }

    #[test]
    fn test_ordered_fragmented_message() {
        let mut q = ReassemblyQueue::new(0);
        q.push(frag(1, 0, true, false, false, b"ABC"));
        assert!(q.read().is_none(), "incomplete message must not deliver");
        q.push(frag(2, 0, false, true, false, b"DEF"));

        let (data, _) = q.read().unwrap();
        assert_eq!(data, Bytes::from_static(b"ABCDEF"));
    }

    #[test]
    fn test_ordered_delivery_respects_ssn_order() {
        let mut q = ReassemblyQueue::new(0);
        // second message arrives first
        q.push(frag(2, 1, true, true, false, b"TWO"));
        assert!(q.read().is_none(), "ssn 0 still missing");

        q.push(frag(1, 0, true, true, false, b"ONE"));
        assert_eq!(q.read().unwrap().0, Bytes::from_static(b"ONE"));
        assert_eq!(q.read().unwrap().0, Bytes::from_static(b"TWO"));
    }

    #[test]
    fn test_unordered_delivery_by_tsn_contiguity() {
        let mut q = ReassemblyQueue::new(0);
        q.push(frag(11, 0, false, true, true, b"DEF"));
        assert!(q.read().is_none());
        q.push(frag(10, 0, true, false, true, b"ABC"));

        let (data, _) = q.read().unwrap();
        assert_eq!(data, Bytes::from_static(b"ABCDEF"));
    }

    #[test]
    fn test_forward_tsn_drops_abandoned_ordered() {
        let mut q = ReassemblyQueue::new(0);
        // partial message at ssn 0 that will be abandoned
        q.push(frag(1, 0, true, false, false, b"LOST"));
        // complete message at ssn 1
        q.push(frag(3, 1, true, true, false, b"KEPT"));

        q.forward_tsn_for_ordered(0);
        let (data, _) = q.read().unwrap();
        assert_eq!(data, Bytes::from_static(b"KEPT"));
    }
}
