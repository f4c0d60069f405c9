/// A ring of recently sent RTP packets, kept for retransmission when the
/// peer NACKs them.
#[derive(Debug)]
pub struct SendBuffer {
    packets: Vec<Option<rtp::Packet>>,
    size: u16,
    last_added: u16,
    started: bool,
}

impl SendBuffer {
    /// `size` must be a power of two between 1 and 32768.
    pub fn new(size: u16) -> Option<Self> {
        let allowed = (0..=15).any(|b| size == 1 << b);
        if !allowed {
            return None;
        }

        Some(SendBuffer {
            packets: vec![None; size as usize],
            size,
            last_added: 0,
            started: false,
        })
    }

    pub fn add(&mut self, packet: rtp::Packet) {
        let seq = packet.header.sequence_number;
        if !self.started {
            self.packets[(seq % self.size) as usize] = Some(packet);
            self.last_added = seq;
            self.started = true;
            return;
        }

        let diff = seq.wrapping_sub(self.last_added);
        if diff == 0 {
            return;
        } else if diff < 0x8000 {
            // clear the entries skipped over by a jump forward
            let mut i = self.last_added.wrapping_add(1);
            while i != seq {
                self.packets[(i % self.size) as usize] = None;
                i = i.wrapping_add(1);
            }
            self.last_added = seq;
        }

        self.packets[(seq % self.size) as usize] = Some(packet);
    }

    pub fn get(&self, seq: u16) -> Option<&rtp::Packet> {
        let diff = self.last_added.wrapping_sub(seq);
        if diff >= self.size {
            return None;
        }

        self.packets[(seq % self.size) as usize]
            .as_ref()
            .filter(|p| p.header.sequence_number == seq)
    }
}

#[cfg(test)]
mod send_buffer_test {
    use super::*;

    fn packet(seq: u16) -> rtp::Packet {
        rtp::Packet {
            header: rtp::header::Header {
                sequence_number: seq,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_send_buffer_stores_and_retrieves() {
        let mut buffer = SendBuffer::new(8).unwrap();
        for seq in 0..8u16 {
            buffer.add(packet(seq));
        }
        for seq in 0..8u16 {
            assert_eq!(
                buffer.get(seq).map(|p| p.header.sequence_number),
                Some(seq)
            );
        }
    }

    #[test]
    fn test_send_buffer_overwrites_old() {
        let mut buffer = SendBuffer::new(8).unwrap();
        for seq in 0..16u16 {
            buffer.add(packet(seq));
        }
        assert!(buffer.get(0).is_none(), "evicted by the ring");
        assert!(buffer.get(15).is_some());
    }

    #[test]
    fn test_send_buffer_wraparound() {
        let mut buffer = SendBuffer::new(8).unwrap();
        buffer.add(packet(65533));
        buffer.add(packet(65534));
        buffer.add(packet(65535));
        buffer.add(packet(0));
        buffer.add(packet(1));
        assert!(buffer.get(65535).is_some());
        assert!(buffer.get(1).is_some());
    }

    #[test]
    fn test_send_buffer_invalid_size() {
        assert!(SendBuffer::new(5).is_none());
        assert!(SendBuffer::new(0).is_none());
    }
}
