//! H.264 RTP payload format (RFC 6184): single NALU, STAP-A and FU-A.

use bytes::{BufMut, Bytes, BytesMut};
use memchr::memchr_iter;

use crate::packetizer::{Depacketizer, Payloader};
use shared::error::{Error, Result};

pub const STAPA_NALU_TYPE: u8 = 24;
pub const FUA_NALU_TYPE: u8 = 28;
pub const FUB_NALU_TYPE: u8 = 29;
pub const SPS_NALU_TYPE: u8 = 7;
pub const PPS_NALU_TYPE: u8 = 8;
pub const AUD_NALU_TYPE: u8 = 9;
pub const FILLER_NALU_TYPE: u8 = 12;

pub const FUA_HEADER_SIZE: usize = 2;
pub const STAPA_HEADER_SIZE: usize = 1;
pub const STAPA_NALU_LENGTH_SIZE: usize = 2;

pub const NALU_TYPE_BITMASK: u8 = 0x1F;
pub const NALU_REF_IDC_BITMASK: u8 = 0x60;
pub const FU_START_BITMASK: u8 = 0x80;
pub const FU_END_BITMASK: u8 = 0x40;

pub const OUTPUT_STAP_AHEADER: u8 = 0x78;

pub static ANNEXB_NALUSTART_CODE: Bytes = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01]);

/// Returns the start index and length of the next Annex-B start code at or
/// after `start`, or (-1, -1) when none remains.
fn next_ind(nalu: &Bytes, start: usize) -> (isize, isize) {
    for pos in memchr_iter(1, &nalu[start..]) {
        let abs = start + pos;
        let mut zero_count = 0usize;
        while abs > start + zero_count && nalu[abs - zero_count - 1] == 0 {
            zero_count += 1;
        }
        if zero_count >= 2 {
            return ((abs - zero_count) as isize, (zero_count + 1) as isize);
        }
    }
    (-1, -1)
}

/// H264Payloader payloads H264 packets
#[derive(Default, Debug, Clone)]
pub struct H264Payloader {
    sps_nalu: Option<Bytes>,
    pps_nalu: Option<Bytes>,
}

impl H264Payloader {
    fn emit(&mut self, nalu: &Bytes, mtu: usize, payloads: &mut Vec<Bytes>) {
        if nalu.is_empty() {
            return;
        }

        let nalu_type = nalu[0] & NALU_TYPE_BITMASK;
        let nalu_ref_idc = nalu[0] & NALU_REF_IDC_BITMASK;

        if nalu_type == AUD_NALU_TYPE || nalu_type == FILLER_NALU_TYPE {
            return;
        } else if nalu_type == SPS_NALU_TYPE {
            self.sps_nalu = Some(nalu.clone());
            return;
        } else if nalu_type == PPS_NALU_TYPE {
            self.pps_nalu = Some(nalu.clone());
            return;
        } else if let (Some(sps_nalu), Some(pps_nalu)) = (&self.sps_nalu, &self.pps_nalu) {
            // Pack current NALU with SPS and PPS as STAP-A
            let sps_len = (sps_nalu.len() as u16).to_be_bytes();
            let pps_len = (pps_nalu.len() as u16).to_be_bytes();

            let mut stap_a_nalu = Vec::with_capacity(1 + 2 + sps_nalu.len() + 2 + pps_nalu.len());
            stap_a_nalu.push(OUTPUT_STAP_AHEADER);
            stap_a_nalu.extend(sps_len);
            stap_a_nalu.extend_from_slice(sps_nalu);
            stap_a_nalu.extend(pps_len);
            stap_a_nalu.extend_from_slice(pps_nalu);
            if stap_a_nalu.len() <= mtu {
                payloads.push(Bytes::from(stap_a_nalu));
            }

            self.sps_nalu = None;
            self.pps_nalu = None;
        }

        // Single NALU
        if nalu.len() <= mtu {
            payloads.push(nalu.clone());
            return;
        }

        // FU-A
        let max_fragment_size = mtu as isize - FUA_HEADER_SIZE as isize;

        // The FU payload consists of fragments of the payload of the fragmented
        // NAL unit so that if the fragmentation unit payloads of consecutive
        // FUs are sequentially concatenated, the payload of the fragmented NAL
        // unit can be reconstructed.  The NAL unit type octet of the fragmented
        // NAL unit is not included as such in the fragmentation unit payload,
        // but rather the information of the NAL unit type octet of the
        // fragmented NAL unit is conveyed in F and NRI fields of the FU
        // indicator octet of the fragmentation unit and in the type field of
        // the FU header.
        let nalu_data = nalu;
        let mut nalu_data_index = 1;
        let nalu_data_length = nalu.len() as isize - nalu_data_index;
        let mut nalu_data_remaining = nalu_data_length;

        if std::cmp::min(max_fragment_size, nalu_data_remaining) <= 0 {
            return;
        }

        while nalu_data_remaining > 0 {
            let current_fragment_size = std::cmp::min(max_fragment_size, nalu_data_remaining);
            let mut out = BytesMut::with_capacity(FUA_HEADER_SIZE + current_fragment_size as usize);

            // +---------------+
            // |0|1|2|3|4|5|6|7|
            // +-+-+-+-+-+-+-+-+
            // |F|NRI|  Type   |
            // +---------------+
            let b0 = FUA_NALU_TYPE | nalu_ref_idc;
            out.put_u8(b0);

            // +---------------+
            // |0|1|2|3|4|5|6|7|
            // +-+-+-+-+-+-+-+-+
            // |S|E|R|  Type   |
            // +---------------+
            let mut b1 = nalu_type;
            if nalu_data_remaining == nalu_data_length {
                // Set start bit
                b1 |= 1 << 7;
            }
            if nalu_data_remaining - current_fragment_size == 0 {
                // Set end bit
                b1 |= 1 << 6;
            }
            out.put_u8(b1);

            out.put(nalu_data.slice(
                nalu_data_index as usize..(nalu_data_index + current_fragment_size) as usize,
            ));
            payloads.push(out.freeze());

            nalu_data_remaining -= current_fragment_size;
            nalu_data_index += current_fragment_size;
        }
    }
}

impl Payloader for H264Payloader {
    /// Fragments an H264 Annex-B stream across one or more byte arrays.
    fn payload(&mut self, mtu: usize, payload: &Bytes) -> Result<Vec<Bytes>> {
        let mut payloads = vec![];
        if payload.is_empty() || mtu == 0 {
            return Ok(payloads);
        }

        let (mut next_ind_start, mut next_ind_len) = next_ind(payload, 0);
        if next_ind_start == -1 {
            self.emit(payload, mtu, &mut payloads);
        } else {
            while next_ind_start != -1 {
                let prev_start = (next_ind_start + next_ind_len) as usize;
                let (next_ind_start2, next_ind_len2) = next_ind(payload, prev_start);
                next_ind_start = next_ind_start2;
                next_ind_len = next_ind_len2;
                if next_ind_start != -1 {
                    self.emit(
                        &payload.slice(prev_start..next_ind_start as usize),
                        mtu,
                        &mut payloads,
                    );
                } else {
                    // Emit until end of stream, no end indicator found
                    self.emit(&payload.slice(prev_start..), mtu, &mut payloads);
                }
            }
        }

        Ok(payloads)
    }
}

/// H264Depacketizer depacketizes an H264 RTP payload into an Annex-B stream.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct H264Depacketizer {
    fua_buffer: Option<BytesMut>,
}

impl Depacketizer for H264Depacketizer {
    fn depacketize(&mut self, packet: &Bytes) -> Result<Bytes> {
        if packet.len() <= 2 {
            return Err(Error::ErrShortPacket);
        }

        let mut payload = BytesMut::new();

        // NALU Types
        // https://tools.ietf.org/html/rfc6184#section-5.4
        let b0 = packet[0];
        let nalu_type = b0 & NALU_TYPE_BITMASK;

        match nalu_type {
            1..=23 => {
                payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                payload.put(&*packet.clone());
                Ok(payload.freeze())
            }
            STAPA_NALU_TYPE => {
                let mut curr_offset = STAPA_HEADER_SIZE;
                while curr_offset < packet.len() {
                    if curr_offset + STAPA_NALU_LENGTH_SIZE > packet.len() {
                        return Err(Error::StapASizeLargerThanBuffer(0, packet.len() - curr_offset));
                    }
                    let nalu_size = ((packet[curr_offset] as usize) << 8)
                        | packet[curr_offset + 1] as usize;
                    curr_offset += STAPA_NALU_LENGTH_SIZE;

                    if packet.len() < curr_offset + nalu_size {
                        return Err(Error::StapASizeLargerThanBuffer(
                            nalu_size,
                            packet.len() - curr_offset,
                        ));
                    }

                    payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                    payload.put(&*packet.slice(curr_offset..curr_offset + nalu_size));
                    curr_offset += nalu_size;
                }

                Ok(payload.freeze())
            }
            FUA_NALU_TYPE => {
                if packet.len() < FUA_HEADER_SIZE {
                    return Err(Error::ErrShortPacket);
                }

                if self.fua_buffer.is_none() {
                    self.fua_buffer = Some(BytesMut::new());
                }

                if let Some(fua_buffer) = &mut self.fua_buffer {
                    fua_buffer.put(&*packet.slice(FUA_HEADER_SIZE..));
                }

                let b1 = packet[1];
                if b1 & FU_END_BITMASK != 0 {
                    let nalu_ref_idc = b0 & NALU_REF_IDC_BITMASK;
                    let fragmented_nalu_type = b1 & NALU_TYPE_BITMASK;

                    if let Some(fua_buffer) = self.fua_buffer.take() {
                        payload.put(&*ANNEXB_NALUSTART_CODE.clone());
                        payload.put_u8(nalu_ref_idc | fragmented_nalu_type);
                        payload.put(fua_buffer);
                    }

                    Ok(payload.freeze())
                } else {
                    Ok(Bytes::new())
                }
            }
            _ => Err(Error::NaluTypeIsNotHandled(nalu_type)),
        }
    }

    /// Checks whether the packet is at the beginning of an H264 partition.
    fn is_partition_head(&self, payload: &Bytes) -> bool {
        if payload.len() < 2 {
            return false;
        }

        if payload[0] & NALU_TYPE_BITMASK == FUA_NALU_TYPE
            || payload[0] & NALU_TYPE_BITMASK == FUB_NALU_TYPE
        {
            payload[1] & FU_START_BITMASK != 0
        } else {
            true
        }
    }

    fn is_partition_tail(&self, marker: bool, _payload: &Bytes) -> bool {
        marker
    }
}

#[cfg(test)]
mod h264_test {
    use super::*;

    #[test]
    fn test_h264_payload_single_nalu() {
        let mut payloader = H264Payloader::default();

        // one small NALU, 4 byte start code
        let raw = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x01, 0x02]);
        let payloads = payloader.payload(100, &raw).unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], Bytes::from_static(&[0x65, 0x01, 0x02]));
    }

    #[test]
    fn test_h264_payload_sps_pps_aggregated() {
        let mut payloader = H264Payloader::default();

        let raw = Bytes::from_static(&[
            0x00, 0x00, 0x01, 0x07, 0xAA, // SPS
            0x00, 0x00, 0x01, 0x08, 0xBB, // PPS
            0x00, 0x00, 0x01, 0x65, 0xCC, // IDR
        ]);
        let payloads = payloader.payload(100, &raw).unwrap();
        assert_eq!(payloads.len(), 2);

        // STAP-A with SPS and PPS first
        assert_eq!(
            payloads[0],
            Bytes::from_static(&[
                OUTPUT_STAP_AHEADER,
                0x00, 0x02, 0x07, 0xAA,
                0x00, 0x02, 0x08, 0xBB,
            ])
        );
        // then the IDR
        assert_eq!(payloads[1], Bytes::from_static(&[0x65, 0xCC]));
    }

    #[test]
    fn test_h264_fua_roundtrip() {
        let mut payloader = H264Payloader::default();
        let mut depacketizer = H264Depacketizer::default();

        let mut nalu = vec![0x65u8];
        nalu.extend((0u8..=199).collect::<Vec<u8>>());
        let mut raw = vec![0x00, 0x00, 0x00, 0x01];
        raw.extend_from_slice(&nalu);

        let payloads = payloader.payload(50, &Bytes::from(raw)).unwrap();
        assert!(payloads.len() > 1);

        assert!(depacketizer.is_partition_head(&payloads[0]));
        for p in &payloads[1..] {
            assert!(!depacketizer.is_partition_head(p));
        }

        let mut out = BytesMut::new();
        for p in &payloads {
            out.put(depacketizer.depacketize(p).unwrap());
        }

        let mut expected = BytesMut::new();
        expected.put(&*ANNEXB_NALUSTART_CODE.clone());
        expected.put(&nalu[..]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_h264_depacketize_stap_a() {
        let mut depacketizer = H264Depacketizer::default();

        let raw = Bytes::from_static(&[
            0x78, 0x00, 0x02, 0x07, 0xAA, 0x00, 0x02, 0x08, 0xBB,
        ]);
        let out = depacketizer.depacketize(&raw).unwrap();
        assert_eq!(
            out,
            Bytes::from_static(&[
                0x00, 0x00, 0x00, 0x01, 0x07, 0xAA, 0x00, 0x00, 0x00, 0x01, 0x08, 0xBB,
            ])
        );
    }

    #[test]
    fn test_h264_depacketize_stap_a_overrun() {
        let mut depacketizer = H264Depacketizer::default();

        // declared size 0xFF overruns the remaining buffer
        let raw = Bytes::from_static(&[0x78, 0x00, 0xFF, 0x07, 0xAA]);
        assert!(matches!(
            depacketizer.depacketize(&raw),
            Err(Error::StapASizeLargerThanBuffer(_, _))
        ));
    }
}
