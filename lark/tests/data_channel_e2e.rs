//! Drives two connections against each other through their sans-IO
//! surfaces: signaling, then the simulated secure transport, then data
//! channel traffic.

use std::time::{Duration, Instant};

use bytes::Bytes;

use lark::api::{APIBuilder, DefaultInterceptorChain};
use lark::data_channel::state::RTCDataChannelState;
use lark::data_channel::RTCDataChannelId;
use lark::peer_connection::configuration::RTCConfiguration;
use lark::peer_connection::dtls_role::DTLSRole;
use lark::peer_connection::event::RTCPeerConnectionEvent;
use lark::peer_connection::state::{RTCDtlsTransportState, RTCIceConnectionState};
use lark::RTCPeerConnection;

type Pc = RTCPeerConnection<DefaultInterceptorChain>;

fn drive(a: &mut Pc, b: &mut Pc, now: Instant) {
    loop {
        let mut progressed = false;
        while let Some(datagram) = a.poll_dtls_transmit(now) {
            b.handle_dtls_read(now, &datagram);
            progressed = true;
        }
        while let Some(datagram) = b.poll_dtls_transmit(now) {
            a.handle_dtls_read(now, &datagram);
            progressed = true;
        }
        if !progressed {
            return;
        }
    }
}

fn events(pc: &mut Pc) -> Vec<RTCPeerConnectionEvent> {
    let mut out = vec![];
    while let Some(event) = pc.poll_event() {
        out.push(event);
    }
    out
}

/// Full signaling plus transport bring-up. `a` offers, `b` answers; the
/// answerer takes the DTLS client role.
fn connect(a: &mut Pc, b: &mut Pc, now: Instant) {
    let offer = a.create_offer(None).unwrap();
    a.set_local_description(offer.clone()).unwrap();
    b.set_remote_description(offer).unwrap();
    let answer = b.create_answer(None).unwrap();
    b.set_local_description(answer.clone()).unwrap();
    a.set_remote_description(answer).unwrap();

    for pc in [&mut *a, &mut *b] {
        pc.handle_ice_connection_state_change(RTCIceConnectionState::Checking);
        pc.handle_ice_connection_state_change(RTCIceConnectionState::Connected);
        pc.handle_dtls_state_change(now, RTCDtlsTransportState::Connecting);
        pc.handle_dtls_state_change(now, RTCDtlsTransportState::Connected);
    }

    drive(a, b, now);
}

#[test]
fn test_data_channel_open_handshake() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("data", None).unwrap();
    connect(&mut a, &mut b, now);

    // the offerer ended up in the DTLS server role, so its channel lives on
    // an odd stream id
    assert_eq!(a.dtls_role(), DTLSRole::Server);
    assert_eq!(b.dtls_role(), DTLSRole::Client);
    assert_eq!(a.data_channel(channel_a).unwrap().stream_id(), Some(1));

    let a_events = events(&mut a);
    assert!(
        a_events.contains(&RTCPeerConnectionEvent::OnDataChannelOpen(channel_a)),
        "{a_events:?}"
    );
    assert_eq!(
        a.data_channel(channel_a).unwrap().ready_state(),
        RTCDataChannelState::Open
    );

    let b_events = events(&mut b);
    let opened: Vec<&RTCPeerConnectionEvent> = b_events
        .iter()
        .filter(|e| matches!(e, RTCPeerConnectionEvent::OnDataChannel(_)))
        .collect();
    assert_eq!(opened.len(), 1, "{b_events:?}");
    let RTCPeerConnectionEvent::OnDataChannel(channel_b) = opened[0] else {
        unreachable!();
    };
    let handle = b.data_channel(*channel_b).unwrap();
    assert_eq!(handle.label(), "data");
    assert_eq!(handle.ready_state(), RTCDataChannelState::Open);
}

fn remote_channel_id(b_events: &[RTCPeerConnectionEvent]) -> RTCDataChannelId {
    b_events
        .iter()
        .find_map(|e| match e {
            RTCPeerConnectionEvent::OnDataChannel(id) => Some(*id),
            _ => None,
        })
        .expect("remote channel announced")
}

#[test]
fn test_data_channel_messages_arrive_in_order() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("data", None).unwrap();
    connect(&mut a, &mut b, now);
    events(&mut a);
    let channel_b = remote_channel_id(&events(&mut b));

    // several sends, each one message, bytes preserved, order preserved
    let payloads: Vec<Bytes> = (0u8..5)
        .map(|i| Bytes::from((0..15).map(|j| i * 16 + j).collect::<Vec<u8>>()))
        .collect();

    for payload in &payloads {
        let sent = a.data_channel(channel_a).unwrap().send(payload).unwrap();
        assert_eq!(sent, payload.len());
    }
    drive(&mut a, &mut b, now);

    let received: Vec<Bytes> = events(&mut b)
        .into_iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnDataChannelMessage(id, msg) => {
                assert_eq!(id, channel_b);
                assert!(!msg.is_string);
                Some(msg.data)
            }
            _ => None,
        })
        .collect();

    assert_eq!(received, payloads, "one callback per send, bytes intact");
}

#[test]
fn test_data_channel_string_and_empty_messages() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("data", None).unwrap();
    connect(&mut a, &mut b, now);
    events(&mut a);
    let channel_b = remote_channel_id(&events(&mut b));

    a.data_channel(channel_a).unwrap().send_text("hello").unwrap();
    a.data_channel(channel_a)
        .unwrap()
        .send(&Bytes::new())
        .unwrap();
    drive(&mut a, &mut b, now);

    let messages: Vec<(bool, Bytes)> = events(&mut b)
        .into_iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnDataChannelMessage(id, msg) => {
                assert_eq!(id, channel_b);
                Some((msg.is_string, msg.data))
            }
            _ => None,
        })
        .collect();

    assert_eq!(
        messages,
        vec![
            (true, Bytes::from_static(b"hello")),
            // the empty message survives as an empty message, not a zero byte
            (false, Bytes::new()),
        ]
    );
}

#[test]
fn test_data_channel_send_before_open_fails() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();

    let channel = a.create_data_channel("data", None).unwrap();
    let err = a
        .data_channel(channel)
        .unwrap()
        .send(&Bytes::from_static(b"x"))
        .unwrap_err();
    assert_eq!(err, shared::error::Error::ErrDataChannelClosed);
}

#[test]
fn test_data_channel_close_propagates() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("data", None).unwrap();
    connect(&mut a, &mut b, now);
    events(&mut a);
    let channel_b = remote_channel_id(&events(&mut b));

    a.data_channel(channel_a).unwrap().close().unwrap();
    drive(&mut a, &mut b, now);

    assert_eq!(
        a.data_channel(channel_a).unwrap().ready_state(),
        RTCDataChannelState::Closed
    );
    let a_events = events(&mut a);
    assert!(
        a_events.contains(&RTCPeerConnectionEvent::OnDataChannelClose(channel_a)),
        "{a_events:?}"
    );

    let b_events = events(&mut b);
    assert!(
        b_events.contains(&RTCPeerConnectionEvent::OnDataChannelClose(channel_b)),
        "{b_events:?}"
    );
    assert_eq!(
        b.data_channel(channel_b).unwrap().ready_state(),
        RTCDataChannelState::Closed
    );
}

#[test]
fn test_ice_restart_keeps_channel_and_buffers_messages() {
    let api = APIBuilder::new().build();
    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("data", None).unwrap();
    connect(&mut a, &mut b, now);
    events(&mut a);
    let channel_b = remote_channel_id(&events(&mut b));

    let (old_ufrag, _) = {
        let creds = a.ice_credentials();
        (creds.0.to_string(), creds.1.to_string())
    };

    // the ICE layer drops and reconnects; the channel never leaves `open`
    a.restart_ice().unwrap();
    assert_ne!(a.ice_credentials().0, old_ufrag, "fresh ufrag after restart");

    a.handle_ice_connection_state_change(RTCIceConnectionState::Checking);
    b.handle_ice_connection_state_change(RTCIceConnectionState::Checking);

    // messages sent while disconnected stay queued in the SCTP sender
    a.data_channel(channel_a)
        .unwrap()
        .send(&Bytes::from_static(b"during restart"))
        .unwrap();
    assert_eq!(
        a.data_channel(channel_a).unwrap().ready_state(),
        RTCDataChannelState::Open
    );

    a.handle_ice_connection_state_change(RTCIceConnectionState::Connected);
    b.handle_ice_connection_state_change(RTCIceConnectionState::Connected);
    drive(&mut a, &mut b, now + Duration::from_millis(100));

    let received: Vec<Bytes> = events(&mut b)
        .into_iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnDataChannelMessage(id, msg) => {
                assert_eq!(id, channel_b);
                Some(msg.data)
            }
            _ => None,
        })
        .collect();
    assert_eq!(received, vec![Bytes::from_static(b"during restart")]);
    assert_eq!(
        b.data_channel(channel_b).unwrap().ready_state(),
        RTCDataChannelState::Open
    );
}

#[test]
fn test_detached_channel_bypasses_message_events() {
    let mut setting_engine = lark::api::setting_engine::SettingEngine::default();
    setting_engine.detach_data_channels();
    let api = APIBuilder::new()
        .with_setting_engine(std::sync::Arc::new(setting_engine))
        .build();

    let mut a = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let mut b = api.new_peer_connection(RTCConfiguration::default()).unwrap();
    let now = Instant::now();

    let channel_a = a.create_data_channel("raw", None).unwrap();
    connect(&mut a, &mut b, now);
    events(&mut a);
    let channel_b = remote_channel_id(&events(&mut b));

    // detach consumes the event-facing handle
    let _detached_b = b.data_channel(channel_b).unwrap().detach().unwrap();

    a.data_channel(channel_a)
        .unwrap()
        .send(&Bytes::from_static(b"raw bytes"))
        .unwrap();
    drive(&mut a, &mut b, now);

    // no message event fires for the detached channel
    let b_events = events(&mut b);
    assert!(
        !b_events
            .iter()
            .any(|e| matches!(e, RTCPeerConnectionEvent::OnDataChannelMessage(_, _))),
        "{b_events:?}"
    );

    let mut detached = b.detached_data_channel(channel_b).unwrap();
    assert_eq!(detached.read(), Some(Bytes::from_static(b"raw bytes")));
    assert_eq!(detached.read(), None);
}
