use bytes::Bytes;

use crate::rtp_transceiver::rtp_codec::{mime, RTCRtpCodecCapability, RTPCodecType};
use media::Sample;
use rtp::codec::av1::Av1Payloader;
use rtp::codec::g7xx::G7xxPayloader;
use rtp::codec::h264::H264Payloader;
use rtp::codec::h265::H265Payloader;
use rtp::codec::opus::OpusPayloader;
use rtp::codec::vp8::Vp8Payloader;
use rtp::codec::vp9::Vp9Payloader;
use rtp::packetizer::{Packetizer, Payloader};
use shared::error::{Error, Result};

/// Picks the payloader implementing the codec's RTP payload format.
pub(crate) fn payloader_for_codec(mime_type: &str) -> Result<Box<dyn Payloader>> {
    let payloader: Box<dyn Payloader> = if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_VP8) {
        Box::<Vp8Payloader>::default()
    } else if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_VP9) {
        Box::<Vp9Payloader>::default()
    } else if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_H264) {
        Box::<H264Payloader>::default()
    } else if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_H265) {
        Box::<H265Payloader>::default()
    } else if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_AV1) {
        Box::<Av1Payloader>::default()
    } else if mime_type.eq_ignore_ascii_case(mime::MIME_TYPE_OPUS) {
        Box::<OpusPayloader>::default()
    } else if mime_type.to_ascii_lowercase().starts_with("audio/") {
        Box::<G7xxPayloader>::default()
    } else {
        return Err(Error::ErrCodecNotFound);
    };
    Ok(payloader)
}

/// A local track fed with encoded samples; the track packetizes them
/// according to the codec's RTP payload format.
pub struct TrackLocalStaticSample {
    id: String,
    stream_id: String,
    codec: RTCRtpCodecCapability,
    pub(crate) ssrc: u32,
    pub(crate) packetizer: Option<Packetizer>,
}

impl TrackLocalStaticSample {
    /// Creates a track. The SSRC is chosen at random; the payload type is
    /// fixed when the track binds during negotiation.
    pub fn new(codec: RTCRtpCodecCapability, id: String, stream_id: String) -> Self {
        TrackLocalStaticSample {
            id,
            stream_id,
            codec,
            ssrc: rand::random(),
            packetizer: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn codec(&self) -> &RTCRtpCodecCapability {
        &self.codec
    }

    pub fn kind(&self) -> RTPCodecType {
        self.codec.kind()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Binds the track to its negotiated payload type, creating the
    /// packetizer with a random sequence number and timestamp base.
    pub(crate) fn bind(&mut self, payload_type: u8, mtu: usize) -> Result<()> {
        let payloader = payloader_for_codec(&self.codec.mime_type)?;
        self.packetizer = Some(Packetizer::new(
            mtu,
            payload_type,
            self.ssrc,
            payloader,
            self.codec.clock_rate,
        ));
        Ok(())
    }

    /// Packetizes one sample. The RTP timestamp advances by
    /// `duration * clock_rate` for the following sample; the codec's
    /// payloader decides the marker placement via the packetizer.
    pub(crate) fn packetize(&mut self, sample: &Sample) -> Result<Vec<rtp::Packet>> {
        let clock_rate = self.codec.clock_rate as f64;
        let packetizer = self
            .packetizer
            .as_mut()
            .ok_or(Error::ErrTrackNotExisted)?;

        let samples = (sample.duration.as_secs_f64() * clock_rate) as u32;
        if sample.prev_dropped_packets > 0 {
            packetizer.skip_samples(samples * sample.prev_dropped_packets as u32);
        }
        packetizer.packetize(&sample.data, samples)
    }
}

/// A local track fed with pre-packetized RTP; headers are rewritten to the
/// track's SSRC and negotiated payload type.
pub struct TrackLocalStaticRTP {
    id: String,
    stream_id: String,
    codec: RTCRtpCodecCapability,
    pub(crate) ssrc: u32,
    pub(crate) payload_type: Option<u8>,
}

impl TrackLocalStaticRTP {
    pub fn new(codec: RTCRtpCodecCapability, id: String, stream_id: String) -> Self {
        TrackLocalStaticRTP {
            id,
            stream_id,
            codec,
            ssrc: rand::random(),
            payload_type: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn codec(&self) -> &RTCRtpCodecCapability {
        &self.codec
    }

    pub fn kind(&self) -> RTPCodecType {
        self.codec.kind()
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub(crate) fn bind(&mut self, payload_type: u8) {
        self.payload_type = Some(payload_type);
    }

    /// Rewrites one packet onto this track's stream.
    pub(crate) fn prepare(&self, mut packet: rtp::Packet) -> Result<rtp::Packet> {
        let payload_type = self.payload_type.ok_or(Error::ErrTrackNotExisted)?;
        packet.header.ssrc = self.ssrc;
        packet.header.payload_type = payload_type;
        Ok(packet)
    }
}
