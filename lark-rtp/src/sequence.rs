/// Allocates wrapping RTP sequence numbers and keeps a roll-over count.
#[derive(Debug, Clone)]
pub struct Sequencer {
    sequence_number: u16,
    roll_over_count: u64,
    first: bool,
}

impl Sequencer {
    /// Creates a sequencer whose first returned number is `sequence_number`.
    pub fn new(sequence_number: u16) -> Self {
        Sequencer {
            sequence_number,
            roll_over_count: 0,
            first: true,
        }
    }

    /// Creates a sequencer with a random starting sequence number.
    pub fn new_random() -> Self {
        Sequencer::new(rand::random::<u16>())
    }

    pub fn next_sequence_number(&mut self) -> u16 {
        if self.first {
            self.first = false;
            return self.sequence_number;
        }

        if self.sequence_number == u16::MAX {
            self.roll_over_count += 1;
        }
        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.sequence_number
    }

    /// Number of times the sequence number wrapped past `u16::MAX`.
    pub fn roll_over_count(&self) -> u64 {
        self.roll_over_count
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sequencer_increments() {
        let mut s = Sequencer::new(10);
        assert_eq!(s.next_sequence_number(), 10);
        assert_eq!(s.next_sequence_number(), 11);
        assert_eq!(s.next_sequence_number(), 12);
        assert_eq!(s.roll_over_count(), 0);
    }

    #[test]
    fn test_sequencer_roll_over() {
        let mut s = Sequencer::new(u16::MAX - 1);
        assert_eq!(s.next_sequence_number(), u16::MAX - 1);
        assert_eq!(s.next_sequence_number(), u16::MAX);
        assert_eq!(s.next_sequence_number(), 0);
        assert_eq!(s.roll_over_count(), 1);
    }
}
