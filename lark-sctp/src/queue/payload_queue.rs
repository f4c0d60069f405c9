use std::collections::HashMap;

use crate::chunk::chunk_payload_data::ChunkPayloadData;
use crate::chunk::chunk_selective_ack::GapAckBlock;
use crate::util::{sna32lt, sna32lte};

/// A TSN-ordered queue of DATA chunks, used both for the in-flight queue on
/// the send side and the pending-reassembly queue on the receive side.
#[derive(Debug, Default)]
pub(crate) struct PayloadQueue {
    chunk_map: HashMap<u32, ChunkPayloadData>,
    sorted: Vec<u32>,
    pub(crate) n_bytes: usize,
}

impl PayloadQueue {
    pub(crate) fn new() -> Self {
        PayloadQueue::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.chunk_map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.chunk_map.is_empty()
    }

    /// Inserts the chunk unless its TSN is at or below the cumulative ack
    /// point or already present.
    pub(crate) fn push(&mut self, c: ChunkPayloadData, cumulative_tsn: u32) {
        if self.chunk_map.contains_key(&c.tsn) || sna32lte(c.tsn, cumulative_tsn) {
            return;
        }

        self.n_bytes += c.user_data.len();

        let pos = self
            .sorted
            .binary_search_by(|&tsn| {
                if tsn == c.tsn {
                    std::cmp::Ordering::Equal
                } else if sna32lt(tsn, c.tsn) {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            })
            .unwrap_or_else(|e| e);
        self.sorted.insert(pos, c.tsn);
        self.chunk_map.insert(c.tsn, c);
    }

    /// Removes and returns the chunk at the head of the queue if its TSN
    /// equals `tsn`.
    pub(crate) fn pop(&mut self, tsn: u32) -> Option<ChunkPayloadData> {
        if self.sorted.first() == Some(&tsn) {
            self.sorted.remove(0);
            let c = self.chunk_map.remove(&tsn)?;
            self.n_bytes -= c.user_data.len();
            Some(c)
        } else {
            None
        }
    }

    pub(crate) fn get(&self, tsn: u32) -> Option<&ChunkPayloadData> {
        self.chunk_map.get(&tsn)
    }

    pub(crate) fn get_mut(&mut self, tsn: u32) -> Option<&mut ChunkPayloadData> {
        self.chunk_map.get_mut(&tsn)
    }

    pub(crate) fn sorted_tsns(&self) -> Vec<u32> {
        self.sorted.clone()
    }

    /// Builds the SACK gap-ack blocks describing everything received above
    /// the cumulative TSN.
    pub(crate) fn get_gap_ack_blocks(&self, cumulative_tsn: u32) -> Vec<GapAckBlock> {
        let mut blocks = vec![];
        let mut current: Option<GapAckBlock> = None;

        for &tsn in &self.sorted {
            let offset = tsn.wrapping_sub(cumulative_tsn) as u16;
            match current.as_mut() {
                Some(block) if block.end + 1 == offset => {
                    block.end = offset;
                }
                Some(block) => {
                    blocks.push(*block);
                    current = Some(GapAckBlock {
                        start: offset,
                        end: offset,
                    });
                }
                None => {
                    current = Some(GapAckBlock {
                        start: offset,
                        end: offset,
                    });
                }
            }
        }
        if let Some(block) = current {
            blocks.push(block);
        }

        blocks
    }

    /// Marks a chunk as acked by a gap-ack block and returns the number of
    /// payload bytes released.
    pub(crate) fn mark_as_acked(&mut self, tsn: u32) -> usize {
        if let Some(c) = self.chunk_map.get_mut(&tsn) {
            if !c.acked {
                c.acked = true;
                c.retransmit = false;
                let n = c.user_data.len();
                self.n_bytes -= n;
                c.user_data = bytes::Bytes::new();
                return n;
            }
        }
        0
    }

    pub(crate) fn mark_all_to_retransmit(&mut self) {
        for tsn in &self.sorted {
            if let Some(c) = self.chunk_map.get_mut(tsn) {
                if !c.acked && !c.abandoned {
                    c.retransmit = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod payload_queue_test {
    use super::*;
    use bytes::Bytes;

    fn chunk(tsn: u32) -> ChunkPayloadData {
        ChunkPayloadData {
            tsn,
            user_data: Bytes::from_static(&[0u8; 10]),
            ..Default::default()
        }
    }

    #[test]
    fn test_push_and_pop_in_order() {
        let mut q = PayloadQueue::new();
        q.push(chunk(1), 0);
        q.push(chunk(2), 0);
        q.push(chunk(3), 0);
        assert_eq!(q.len(), 3);
        assert_eq!(q.n_bytes, 30);

        assert!(q.pop(2).is_none(), "head is 1, popping 2 must fail");
        assert!(q.pop(1).is_some());
        assert!(q.pop(2).is_some());
        assert!(q.pop(3).is_some());
        assert!(q.is_empty());
        assert_eq!(q.n_bytes, 0);
    }

    #[test]
    fn test_old_and_duplicate_tsns_ignored() {
        let mut q = PayloadQueue::new();
        q.push(chunk(5), 4);
        q.push(chunk(5), 4);
        q.push(chunk(3), 4);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_gap_ack_blocks() {
        let mut q = PayloadQueue::new();
        // cumulative TSN 10, received 12,13,15
        q.push(chunk(12), 10);
        q.push(chunk(13), 10);
        q.push(chunk(15), 10);

        let blocks = q.get_gap_ack_blocks(10);
        assert_eq!(blocks.len(), 2);
        assert_eq!((blocks[0].start, blocks[0].end), (2, 3));
        assert_eq!((blocks[1].start, blocks[1].end), (5, 5));
    }
}
