use lark::peer_connection::configuration::RTCConfiguration;
use lark::peer_connection::event::RTCPeerConnectionEvent;
use lark::peer_connection::sdp::sdp_type::RTCSdpType;
use lark::peer_connection::sdp::session_description::RTCSessionDescription;
use lark::peer_connection::state::RTCSignalingState;
use lark::APIBuilder;
use shared::error::ErrorKind;

#[test]
fn test_offer_answer_signaling_states() {
    let api = APIBuilder::new().build();
    let mut offerer = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut answerer = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    assert_eq!(offerer.signaling_state(), RTCSignalingState::Stable);

    offerer.create_data_channel("data", None).unwrap();
    let offer = offerer.create_offer(None).unwrap();
    assert_eq!(offer.sdp_type, RTCSdpType::Offer);
    assert!(offer.sdp.contains("m=application"), "{}", offer.sdp);

    offerer.set_local_description(offer.clone()).unwrap();
    assert_eq!(offerer.signaling_state(), RTCSignalingState::HaveLocalOffer);

    answerer.set_remote_description(offer).unwrap();
    assert_eq!(answerer.signaling_state(), RTCSignalingState::HaveRemoteOffer);

    let answer = answerer.create_answer(None).unwrap();
    answerer.set_local_description(answer.clone()).unwrap();
    assert_eq!(answerer.signaling_state(), RTCSignalingState::Stable);

    offerer.set_remote_description(answer).unwrap();
    assert_eq!(offerer.signaling_state(), RTCSignalingState::Stable);
}

#[test]
fn test_set_local_offer_twice_is_invalid_state() {
    let api = APIBuilder::new().build();
    let mut pc = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    pc.create_data_channel("data", None).unwrap();
    let offer = pc.create_offer(None).unwrap();
    pc.set_local_description(offer.clone()).unwrap();

    // a second offer cannot be applied from have-local-offer
    let err = pc.set_local_description(offer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_answer_without_remote_offer_fails() {
    let api = APIBuilder::new().build();
    let mut pc = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    let err = pc.create_answer(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_rollback_returns_to_stable() {
    let api = APIBuilder::new().build();
    let mut pc = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    pc.create_data_channel("data", None).unwrap();
    let offer = pc.create_offer(None).unwrap();
    pc.set_local_description(offer).unwrap();
    assert_eq!(pc.signaling_state(), RTCSignalingState::HaveLocalOffer);

    pc.set_local_description(RTCSessionDescription::rollback())
        .unwrap();
    assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);

    // rollback from stable is rejected
    let err = pc
        .set_local_description(RTCSessionDescription::rollback())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_negotiation_needed_fires_once() {
    let api = APIBuilder::new().build();
    let mut pc = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    pc.create_data_channel("a", None).unwrap();
    pc.create_data_channel("b", None).unwrap();

    let mut negotiation_needed = 0;
    while let Some(event) = pc.poll_event() {
        if event == RTCPeerConnectionEvent::OnNegotiationNeeded {
            negotiation_needed += 1;
        }
    }
    assert_eq!(negotiation_needed, 1, "coalesced until handled");
}

#[test]
fn test_mids_are_deterministic() {
    let api = APIBuilder::new().build();
    let mut pc = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    use lark::rtp_transceiver::direction::RTCRtpTransceiverDirection;
    use lark::rtp_transceiver::rtp_codec::RTPCodecType;

    pc.add_transceiver_from_kind(RTPCodecType::Audio, RTCRtpTransceiverDirection::Sendrecv)
        .unwrap();
    pc.add_transceiver_from_kind(RTPCodecType::Video, RTCRtpTransceiverDirection::Sendrecv)
        .unwrap();
    pc.create_data_channel("data", None).unwrap();

    let offer = pc.create_offer(None).unwrap();

    // media sections in insertion order, application last
    let audio = offer.sdp.find("m=audio").expect("audio section");
    let video = offer.sdp.find("m=video").expect("video section");
    let application = offer.sdp.find("m=application").expect("data section");
    assert!(audio < video && video < application);

    assert_eq!(pc.transceivers()[0].mid(), Some("0"));
    assert_eq!(pc.transceivers()[1].mid(), Some("1"));
}
