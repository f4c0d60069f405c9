use bytes::{Buf, Bytes};

use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

pub const HEADER_LENGTH: usize = 4;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;
pub const EXTENSION_ID_RESERVED: u8 = 0xF;
pub const CC_MASK: u8 = 0xF;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const SEQ_NUM_OFFSET: usize = 2;
pub const SEQ_NUM_LENGTH: usize = 2;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const TIMESTAMP_LENGTH: usize = 4;
pub const SSRC_OFFSET: usize = 8;
pub const SSRC_LENGTH: usize = 4;
pub const CSRC_OFFSET: usize = 12;
pub const CSRC_LENGTH: usize = 4;

/// A single negotiated RTP header extension element (RFC 8285).
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// Header represents an RTP packet header (RFC 3550 §5.1).
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
}

impl Unmarshal for Header {
    /// Parses the passed byte slice and stores the result in the Header.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < CSRC_OFFSET {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let b0 = raw_packet.get_u8();
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        let padding = (b0 >> PADDING_SHIFT & PADDING_MASK) > 0;
        let extension = (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0;
        let cc = (b0 & CC_MASK) as usize;

        let b1 = raw_packet.get_u8();
        let marker = (b1 >> MARKER_SHIFT & MARKER_MASK) > 0;
        let payload_type = b1 & PT_MASK;

        let sequence_number = raw_packet.get_u16();
        let timestamp = raw_packet.get_u32();
        let ssrc = raw_packet.get_u32();

        if raw_packet.remaining() < cc * CSRC_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }
        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(raw_packet.get_u32());
        }

        let (extension_profile, extensions) = if extension {
            if raw_packet.remaining() < 4 {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let extension_profile = raw_packet.get_u16();
            let extension_length = raw_packet.get_u16() as usize * 4;

            if raw_packet.remaining() < extension_length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }

            let mut payload = vec![0u8; extension_length];
            raw_packet.copy_to_slice(&mut payload);
            let payload = Bytes::from(payload);

            let mut extensions = vec![];
            match extension_profile {
                // RFC 8285 RTP One Byte Header Extension
                EXTENSION_PROFILE_ONE_BYTE => {
                    let mut curr_offset = 0;
                    while curr_offset < extension_length {
                        // padding
                        if payload[curr_offset] == 0x00 {
                            curr_offset += 1;
                            continue;
                        }

                        let extid = payload[curr_offset] >> 4;
                        let len = ((payload[curr_offset] & (0xFF ^ 0xF0) & 0xF) + 1) as usize;
                        curr_offset += 1;

                        if extid == EXTENSION_ID_RESERVED {
                            break;
                        }

                        if curr_offset + len > extension_length {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }
                        extensions.push(Extension {
                            id: extid,
                            payload: payload.slice(curr_offset..curr_offset + len),
                        });
                        curr_offset += len;
                    }
                }
                // RFC 8285 RTP Two Byte Header Extension
                EXTENSION_PROFILE_TWO_BYTE => {
                    let mut curr_offset = 0;
                    while curr_offset < extension_length {
                        // padding
                        if payload[curr_offset] == 0x00 {
                            curr_offset += 1;
                            continue;
                        }

                        let extid = payload[curr_offset];
                        curr_offset += 1;
                        if curr_offset >= extension_length {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }

                        let len = payload[curr_offset] as usize;
                        curr_offset += 1;

                        if curr_offset + len > extension_length {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }
                        extensions.push(Extension {
                            id: extid,
                            payload: payload.slice(curr_offset..curr_offset + len),
                        });
                        curr_offset += len;
                    }
                }
                // RFC 3550 §5.3.1 profile-specific extension
                _ => {
                    extensions.push(Extension { id: 0, payload });
                }
            };

            (extension_profile, extensions)
        } else {
            (0, vec![])
        };

        Ok(Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extensions,
        })
    }
}

impl MarshalSize for Header {
    /// Returns the size of the header once marshaled.
    fn marshal_size(&self) -> usize {
        let mut head_size = 12 + (self.csrc.len() * CSRC_LENGTH);
        if self.extension {
            let extension_payload_len = self.get_extension_payload_len();
            let extension_payload_size = (extension_payload_len + 3) / 4;
            head_size += 4 + extension_payload_size * 4;
        }
        head_size
    }
}

impl Marshal for Header {
    /// Serializes the header into the provided buffer.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let remaining_before = buf.len();
        if remaining_before < self.marshal_size() {
            return Err(Error::ErrBufferTooSmall);
        }

        // The first byte contains the version, padding bit, extension bit, and csrc size
        let mut b0 = (self.version << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        buf[0] = b0;

        // The second byte contains the marker bit and payload type.
        let mut b1 = self.payload_type;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf[1] = b1;

        buf[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        let mut n = 12;
        for csrc in &self.csrc {
            buf[n..n + 4].copy_from_slice(&csrc.to_be_bytes());
            n += 4;
        }

        if self.extension {
            let ext_header_pos = n;
            buf[n..n + 2].copy_from_slice(&self.extension_profile.to_be_bytes());
            n += 4;
            let start_extensions_pos = n;

            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for extension in &self.extensions {
                        buf[n] = (extension.id << 4) | (extension.payload.len() as u8 - 1);
                        n += 1;
                        buf[n..n + extension.payload.len()].copy_from_slice(&extension.payload);
                        n += extension.payload.len();
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    for extension in &self.extensions {
                        buf[n] = extension.id;
                        n += 1;
                        buf[n] = extension.payload.len() as u8;
                        n += 1;
                        buf[n..n + extension.payload.len()].copy_from_slice(&extension.payload);
                        n += extension.payload.len();
                    }
                }
                _ => {
                    if let Some(extension) = self.extensions.first() {
                        if extension.payload.len() % 4 != 0 {
                            return Err(Error::HeaderExtensionPayloadNot32BitWords);
                        }
                        buf[n..n + extension.payload.len()].copy_from_slice(&extension.payload);
                        n += extension.payload.len();
                    }
                }
            };

            // pad the extension block to a 4-byte boundary
            let extension_payload_len = n - start_extensions_pos;
            let padded = (extension_payload_len + 3) / 4 * 4;
            for _ in extension_payload_len..padded {
                buf[n] = 0;
                n += 1;
            }
            let ext_len_words = (padded / 4) as u16;
            buf[ext_header_pos + 2..ext_header_pos + 4].copy_from_slice(&ext_len_words.to_be_bytes());
        }

        Ok(n)
    }
}

impl Header {
    fn get_extension_payload_len(&self) -> usize {
        let payload_len: usize = self
            .extensions
            .iter()
            .map(|extension| extension.payload.len())
            .sum();

        let profile_len = match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => self.extensions.len(),
            EXTENSION_PROFILE_TWO_BYTE => self.extensions.len() * 2,
            _ => 0,
        };

        payload_len + profile_len
    }

    /// Sets an RTP header extension, enabling the extension block if needed.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<()> {
        if self.extension {
            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    if !(1..=14).contains(&id) {
                        return Err(Error::ErrRfc8285oneByteHeaderIdrange);
                    }
                    if payload.len() > 16 {
                        return Err(Error::ErrRfc8285oneByteHeaderSize);
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    if id < 1 {
                        return Err(Error::ErrRfc8285twoByteHeaderIdrange);
                    }
                    if payload.len() > 255 {
                        return Err(Error::ErrRfc8285twoByteHeaderSize);
                    }
                }
                _ => {
                    if id != 0 {
                        return Err(Error::ErrRfc3550headerIdrange);
                    }
                }
            };

            // Update existing if it exists else add new extension
            for extension in &mut self.extensions {
                if extension.id == id {
                    extension.payload = payload;
                    return Ok(());
                }
            }
            self.extensions.push(Extension { id, payload });
            return Ok(());
        }

        // No existing header extensions
        self.extension = true;
        self.extension_profile = match payload.len() {
            0..=16 => EXTENSION_PROFILE_ONE_BYTE,
            17..=255 => EXTENSION_PROFILE_TWO_BYTE,
            _ => self.extension_profile,
        };
        self.extensions.push(Extension { id, payload });

        Ok(())
    }

    /// Returns an extension id array.
    pub fn get_extension_ids(&self) -> Vec<u8> {
        if self.extension {
            self.extensions.iter().map(|e| e.id).collect()
        } else {
            vec![]
        }
    }

    /// Returns an RTP header extension payload.
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        if !self.extension {
            return None;
        }
        self.extensions
            .iter()
            .find(|extension| extension.id == id)
            .map(|extension| extension.payload.clone())
    }

    /// Deletes an RTP header extension.
    pub fn del_extension(&mut self, id: u8) -> Result<()> {
        if !self.extension {
            return Err(Error::ErrHeaderExtensionsNotEnabled);
        }
        match self.extensions.iter().position(|e| e.id == id) {
            Some(index) => {
                self.extensions.remove(index);
                Ok(())
            }
            None => Err(Error::ErrHeaderExtensionNotFound),
        }
    }
}

#[cfg(test)]
mod header_test {
    use super::*;

    #[test]
    fn test_basic_header_unmarshal() {
        let mut raw_packet = Bytes::from_static(&[
            0x90, 0xe0, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0x00, 0x01,
            0x00, 0x01, 0xff, 0xff, 0xff, 0xff, 0x98, 0x36, 0xbe, 0x88, 0x9e,
        ]);

        let header = Header::unmarshal(&mut raw_packet).unwrap();
        assert_eq!(header.version, 2);
        assert!(!header.padding);
        assert!(header.extension);
        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 27023);
        assert_eq!(header.timestamp, 3653407706);
        assert_eq!(header.ssrc, 476325762);
        assert_eq!(header.extension_profile, 1);
        assert_eq!(header.extensions.len(), 1);
        assert_eq!(
            header.extensions[0].payload,
            Bytes::from_static(&[0xff, 0xff, 0xff, 0xff])
        );
    }

    #[test]
    fn test_header_too_small() {
        let mut raw_packet = Bytes::from_static(&[0x80, 0x60, 0x69, 0x8f]);
        assert_eq!(
            Header::unmarshal(&mut raw_packet),
            Err(Error::ErrHeaderSizeInsufficient)
        );
    }

    #[test]
    fn test_header_extension_overruns_buffer() {
        // extension flag set, declared extension length of 99 words but no data
        let mut raw_packet = Bytes::from_static(&[
            0x90, 0x60, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0x00, 0x00,
            0x00, 0x63,
        ]);
        assert_eq!(
            Header::unmarshal(&mut raw_packet),
            Err(Error::ErrHeaderSizeInsufficientForExtension)
        );
    }

    #[test]
    fn test_header_one_byte_extension() {
        let mut raw_packet = Bytes::from_static(&[
            0x90, 0x60, 0x69, 0x8f, 0xd9, 0xc2, 0x93, 0xda, 0x1c, 0x64, 0x27, 0x82, 0xbe, 0xde,
            0x00, 0x01, 0x50, 0xaa, 0x00, 0x00, 0x98, 0x36, 0xbe, 0x88, 0x9e,
        ]);

        let header = Header::unmarshal(&mut raw_packet).unwrap();
        assert!(header.extension);
        assert_eq!(header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);
        assert_eq!(header.extensions.len(), 1);
        assert_eq!(header.extensions[0].id, 5);
        assert_eq!(header.extensions[0].payload, Bytes::from_static(&[0xaa]));
    }

    #[test]
    fn test_header_set_get_del_extension() {
        let mut header = Header {
            version: 2,
            ..Default::default()
        };

        header
            .set_extension(5, Bytes::from_static(&[0xaa]))
            .unwrap();
        assert!(header.extension);
        assert_eq!(header.extension_profile, EXTENSION_PROFILE_ONE_BYTE);
        assert_eq!(
            header.get_extension(5),
            Some(Bytes::from_static(&[0xaa]))
        );

        header
            .set_extension(5, Bytes::from_static(&[0xbb]))
            .unwrap();
        assert_eq!(
            header.get_extension(5),
            Some(Bytes::from_static(&[0xbb]))
        );

        header.del_extension(5).unwrap();
        assert_eq!(header.get_extension(5), None);
        assert_eq!(header.del_extension(5), Err(Error::ErrHeaderExtensionNotFound));
    }

    #[test]
    fn test_header_roundtrip_with_csrc() {
        let header = Header {
            version: 2,
            marker: true,
            payload_type: 111,
            sequence_number: 1234,
            timestamp: 0xdeadbeef,
            ssrc: 0xcafebabe,
            csrc: vec![0x11111111, 0x22222222],
            ..Default::default()
        };

        let raw = header.marshal().unwrap();
        let mut buf = raw.freeze();
        let parsed = Header::unmarshal(&mut buf).unwrap();
        assert_eq!(parsed, header);
    }
}
