/// A sliding bitmap of received RTP sequence numbers, used to compute which
/// packets to NACK.
#[derive(Debug)]
pub struct ReceiveLog {
    packets: Vec<u64>,
    size: u16,
    end: u16,
    started: bool,
    last_consecutive: u16,
}

impl ReceiveLog {
    /// `size` must be a power of two between 64 and 32768.
    pub fn new(size: u16) -> Option<Self> {
        let allowed = (6..=15).any(|b| size == 1 << b);
        if !allowed {
            return None;
        }

        Some(ReceiveLog {
            packets: vec![0u64; size as usize / 64],
            size,
            end: 0,
            started: false,
            last_consecutive: 0,
        })
    }

    pub fn add(&mut self, seq: u16) {
        if !self.started {
            self.set_received(seq);
            self.end = seq;
            self.started = true;
            self.last_consecutive = seq;
            return;
        }

        let diff = seq.wrapping_sub(self.end);
        if diff == 0 {
            return;
        } else if diff < 0x8000 {
            // newer packet; clear the entries it skips over
            let clear_from = if diff >= self.size {
                seq.wrapping_sub(self.size).wrapping_add(1)
            } else {
                self.end.wrapping_add(1)
            };
            let mut i = clear_from;
            while i != seq {
                self.del_received(i);
                i = i.wrapping_add(1);
            }

            self.set_received(seq);
            self.end = seq;

            if diff >= self.size {
                // everything older fell out of the window
                self.last_consecutive = seq;
                return;
            }
        } else {
            // out-of-order arrival fills a gap
            self.set_received(seq);
        }

        self.fix_last_consecutive();
    }

    pub fn get(&self, seq: u16) -> bool {
        let diff = self.end.wrapping_sub(seq);
        if diff >= self.size {
            return false;
        }
        let pos = (seq % self.size) as usize;
        (self.packets[pos / 64] >> (pos % 64)) & 1 == 1
    }

    /// Sequence numbers between the last consecutive packet and
    /// `end - skip_last_n` that were never received.
    pub fn missing_seq_numbers(&self, skip_last_n: u16) -> Vec<u16> {
        if !self.started {
            return vec![];
        }

        let until = self.end.wrapping_sub(skip_last_n);
        if until.wrapping_sub(self.last_consecutive) >= 0x8000 {
            // the skip window swallows everything outstanding
            return vec![];
        }

        let mut missing = vec![];
        let mut i = self.last_consecutive.wrapping_add(1);
        while i != until.wrapping_add(1) {
            if !self.get(i) {
                missing.push(i);
            }
            i = i.wrapping_add(1);
        }
        missing
    }

    fn set_received(&mut self, seq: u16) {
        let pos = (seq % self.size) as usize;
        self.packets[pos / 64] |= 1 << (pos % 64);
    }

    fn del_received(&mut self, seq: u16) {
        let pos = (seq % self.size) as usize;
        self.packets[pos / 64] &= !(1u64 << (pos % 64));
    }

    fn fix_last_consecutive(&mut self) {
        let mut i = self.last_consecutive.wrapping_add(1);
        while i != self.end.wrapping_add(1) && self.get(i) {
            self.last_consecutive = i;
            i = i.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod receive_log_test {
    use super::*;

    #[test]
    fn test_size_must_be_power_of_two() {
        assert!(ReceiveLog::new(3).is_none());
        assert!(ReceiveLog::new(32).is_none(), "too small");
        assert!(ReceiveLog::new(64).is_some());
        assert!(ReceiveLog::new(512).is_some());
        assert!(ReceiveLog::new(32768).is_some());
    }

    #[test]
    fn test_missing_in_order_none() {
        let mut log = ReceiveLog::new(64).unwrap();
        for seq in 10..20u16 {
            log.add(seq);
        }
        assert!(log.missing_seq_numbers(0).is_empty());
    }

    #[test]
    fn test_missing_with_gaps() {
        let mut log = ReceiveLog::new(64).unwrap();
        for seq in [10u16, 11, 12, 14, 16, 18] {
            log.add(seq);
        }
        assert_eq!(log.missing_seq_numbers(0), vec![13, 15, 17]);
        assert_eq!(log.missing_seq_numbers(2), vec![13, 15]);
    }

    #[test]
    fn test_gap_filled_by_late_arrival() {
        let mut log = ReceiveLog::new(64).unwrap();
        log.add(10);
        log.add(12);
        assert_eq!(log.missing_seq_numbers(0), vec![11]);

        log.add(11);
        assert!(log.missing_seq_numbers(0).is_empty());
    }

    #[test]
    fn test_wraparound() {
        let mut log = ReceiveLog::new(64).unwrap();
        log.add(65534);
        log.add(65535);
        log.add(1);
        assert_eq!(log.missing_seq_numbers(0), vec![0]);
    }
}
