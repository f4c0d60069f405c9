//! Media path: samples packetize on the sending side, demux into remote
//! tracks on the receiving side, and reassemble bit-exactly.

use std::time::{Duration, Instant};

use bytes::Bytes;

use lark::api::{APIBuilder, DefaultInterceptorChain};
use lark::peer_connection::configuration::RTCConfiguration;
use lark::peer_connection::event::RTCPeerConnectionEvent;
use lark::peer_connection::state::{RTCDtlsTransportState, RTCIceConnectionState};
use lark::rtp_transceiver::rtp_codec::{mime, RTCRtpCodecCapability};
use lark::track::track_local::TrackLocalStaticSample;
use lark::RTCPeerConnection;
use media::sample_builder::SampleBuilder;
use media::Sample;
use rtp::codec::vp8::Vp8Depacketizer;
use shared::marshal::{Marshal, Unmarshal};

type Pc = RTCPeerConnection<DefaultInterceptorChain>;

fn connect(a: &mut Pc, b: &mut Pc, now: Instant) {
    let offer = a.create_offer(None).unwrap();
    a.set_local_description(offer.clone()).unwrap();
    b.set_remote_description(offer).unwrap();
    let answer = b.create_answer(None).unwrap();
    b.set_local_description(answer.clone()).unwrap();
    a.set_remote_description(answer).unwrap();

    for pc in [a, b] {
        pc.handle_ice_connection_state_change(RTCIceConnectionState::Connected);
        pc.handle_dtls_state_change(now, RTCDtlsTransportState::Connected);
    }
}

fn vp8_track() -> TrackLocalStaticSample {
    TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: mime::MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_owned(),
        "stream".to_owned(),
    )
}

#[test]
fn test_sample_survives_packetization_end_to_end() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let transceiver = a.add_track(vp8_track()).unwrap();
    connect(&mut a, &mut b, now);

    let frame_one = Bytes::from((0u32..3000).map(|i| (i % 251) as u8).collect::<Vec<u8>>());
    let frame_two = Bytes::from(vec![0x42u8; 100]);

    for (data, at) in [
        (frame_one.clone(), now),
        (frame_two, now + Duration::from_millis(33)),
    ] {
        let sample = Sample {
            data,
            duration: Duration::from_millis(33),
            ..Default::default()
        };
        a.sender(transceiver)
            .unwrap()
            .write_sample(&sample, at)
            .unwrap();
    }

    // shuttle the protected packets over to the receiving side
    let mut marker_count = 0;
    let mut first_frame_packets = 0;
    while let Some(raw) = a.poll_srtp_transmit() {
        if (192..=223).contains(&raw[1]) {
            continue; // RTCP from the chain, not under test here
        }
        let mut buf = raw.clone();
        let packet = rtp::Packet::unmarshal(&mut buf).unwrap();
        if packet.header.marker {
            marker_count += 1;
        }
        if marker_count == 0 {
            first_frame_packets += 1;
        }
        b.handle_srtp_read(now, &raw);
    }
    assert_eq!(marker_count, 2, "exactly one marker per sample");
    assert!(first_frame_packets > 1, "3000 bytes span several packets");

    // the first unseen SSRC materialized exactly one remote track
    let mut track_ids = vec![];
    while let Some(event) = b.poll_event() {
        if let RTCPeerConnectionEvent::OnTrack(id) = event {
            track_ids.push(id);
        }
    }
    assert_eq!(track_ids.len(), 1);

    // feeding the received packets through the sample builder reproduces
    // the original bytes
    let mut builder = SampleBuilder::new(50, Vp8Depacketizer::default(), 90000);
    {
        let track = b.remote_track(track_ids[0]).unwrap();
        assert_eq!(track.kind(), lark::rtp_transceiver::rtp_codec::RTPCodecType::Video);
        while let Some(packet) = track.read() {
            builder.push(packet);
        }
    }

    let rebuilt = builder.pop().expect("first frame completes");
    assert_eq!(rebuilt.data, frame_one, "bit-exact reassembly");
    assert_eq!(rebuilt.duration, Duration::from_millis(33));
}

#[test]
fn test_simulcast_layers_become_distinct_tracks() {
    let api = APIBuilder::new().build();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    // a remote offer announcing one video section with three RID layers
    let offer_sdp = concat!(
        "v=0\r\n",
        "o=- 123 2 IN IP4 127.0.0.1\r\n",
        "s=-\r\n",
        "t=0 0\r\n",
        "a=group:BUNDLE 0\r\n",
        "m=video 9 UDP/TLS/RTP/SAVPF 96\r\n",
        "c=IN IP4 0.0.0.0\r\n",
        "a=mid:0\r\n",
        "a=ice-ufrag:remoteufrag\r\n",
        "a=ice-pwd:remotepwdremotepwdremote\r\n",
        "a=fingerprint:sha-256 AA:BB:CC\r\n",
        "a=setup:actpass\r\n",
        "a=rtpmap:96 VP8/90000\r\n",
        "a=extmap:5 urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id\r\n",
        "a=rid:q send\r\n",
        "a=rid:h send\r\n",
        "a=rid:f send\r\n",
        "a=sendonly\r\n",
    );
    b.set_remote_description(
        lark::peer_connection::sdp::session_description::RTCSessionDescription::offer(
            offer_sdp.to_string(),
        ),
    )
    .unwrap();
    let answer = b.create_answer(None).unwrap();
    assert!(answer.sdp.contains("a=recvonly"), "{}", answer.sdp);
    b.set_local_description(answer).unwrap();

    b.handle_ice_connection_state_change(RTCIceConnectionState::Connected);
    b.handle_dtls_state_change(now, RTCDtlsTransportState::Connected);

    // three inbound streams sharing the mid, told apart by RID
    let layers: [(&str, u32); 3] = [("q", 0x1001), ("h", 0x1002), ("f", 0x1003)];
    for (rid, ssrc) in layers {
        for seq in 0..3u16 {
            let mut header = rtp::header::Header {
                version: 2,
                payload_type: 96,
                sequence_number: seq,
                timestamp: 1000,
                ssrc,
                ..Default::default()
            };
            header
                .set_extension(5, Bytes::copy_from_slice(rid.as_bytes()))
                .unwrap();
            let packet = rtp::Packet {
                header,
                payload: Bytes::from_static(&[0x10, 0x00, 0x01, 0x02]),
                padding_size: 0,
            };

            let raw = packet.marshal().unwrap().freeze();
            b.handle_srtp_read(now, &raw);
        }
    }

    let mut seen = vec![];
    while let Some(event) = b.poll_event() {
        if let RTCPeerConnectionEvent::OnTrack(id) = event {
            let track = b.remote_track(id).unwrap();
            seen.push((track.rid().unwrap().to_string(), track.ssrc()));
        }
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("f".to_string(), 0x1003),
            ("h".to_string(), 0x1002),
            ("q".to_string(), 0x1001),
        ]
    );

    // a periodic keyframe request goes out per track, addressed to that
    // track's SSRC only
    b.handle_timeout(now + Duration::from_millis(3100));
    let mut pli_ssrcs = vec![];
    while let Some(raw) = b.poll_srtp_transmit() {
        let mut buf = raw.clone();
        if let Ok(packets) = rtcp::unmarshal(&mut buf) {
            for p in packets {
                if let Some(pli) = p
                    .as_any()
                    .downcast_ref::<rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication>()
                {
                    pli_ssrcs.push(pli.media_ssrc);
                }
            }
        }
    }
    pli_ssrcs.sort();
    assert_eq!(pli_ssrcs, vec![0x1001, 0x1002, 0x1003]);
}
