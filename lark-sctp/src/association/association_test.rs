use std::sync::Arc;
use std::time::Instant;

use assert_matches::assert_matches;
use bytes::Bytes;

use super::*;
use crate::config::{ServerConfig, TransportConfig};
use crate::packet::PartialDecode;

fn new_pair() -> (Association, Association) {
    let transport_config = Arc::new(TransportConfig::default());
    let now = Instant::now();

    let client = Association::new(
        None,
        transport_config.clone(),
        1200,
        rand::random::<u32>(),
        TransportContext::default(),
        now,
    );
    let server = Association::new(
        Some(Arc::new(ServerConfig::default())),
        transport_config,
        1200,
        rand::random::<u32>(),
        TransportContext::default(),
        now,
    );
    (client, server)
}

fn pipe(from: &mut Association, to: &mut Association, now: Instant) -> usize {
    let mut n = 0;
    while let Some(transmit) = from.poll_transmit(now) {
        if let Payload::RawEncode(datagrams) = transmit.message {
            for raw in datagrams {
                let partial = PartialDecode::unmarshal(&raw).expect("well-formed datagram");
                to.handle_event(AssociationEvent(AssociationEventInner::Datagram(Transmit {
                    now,
                    transport: TransportContext::default(),
                    message: Payload::PartialDecode(partial),
                })));
                n += 1;
            }
        }
    }
    n
}

fn drive(a: &mut Association, b: &mut Association, now: Instant) {
    loop {
        let n1 = pipe(a, b, now);
        let n2 = pipe(b, a, now);
        if n1 == 0 && n2 == 0 {
            break;
        }
    }
}

fn events(a: &mut Association) -> Vec<Event> {
    let mut out = vec![];
    while let Some(e) = a.poll() {
        out.push(e);
    }
    out
}

fn establish(client: &mut Association, server: &mut Association, now: Instant) {
    drive(client, server, now);
    let client_events = events(client);
    let server_events = events(server);
    assert!(client_events.contains(&Event::Connected), "{client_events:?}");
    assert!(server_events.contains(&Event::Connected), "{server_events:?}");
    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn test_handshake() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);
}

#[test]
fn test_ordered_message_delivery() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    {
        let mut stream = client
            .open_stream(1, PayloadProtocolIdentifier::Binary)
            .unwrap();
        stream
            .write_sctp(
                &Bytes::from_static(b"hello"),
                PayloadProtocolIdentifier::Binary,
            )
            .unwrap();
    }
    drive(&mut client, &mut server, now);

    let server_events = events(&mut server);
    assert!(server_events.contains(&Event::Stream(StreamEvent::Opened { id: 1 })));
    assert!(server_events.contains(&Event::Stream(StreamEvent::Readable { id: 1 })));

    let mut stream = server.stream(1).unwrap();
    let (data, ppi) = stream.read_sctp().unwrap().expect("message ready");
    assert_eq!(data, Bytes::from_static(b"hello"));
    assert_eq!(ppi, PayloadProtocolIdentifier::Binary);
    assert!(stream.read_sctp().unwrap().is_none());
}

#[test]
fn test_send_order_is_receive_order() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    client
        .open_stream(1, PayloadProtocolIdentifier::String)
        .unwrap();
    for msg in [&b"one"[..], b"two", b"three", b"four"] {
        client
            .stream(1)
            .unwrap()
            .write_sctp(
                &Bytes::copy_from_slice(msg),
                PayloadProtocolIdentifier::String,
            )
            .unwrap();
    }
    drive(&mut client, &mut server, now);
    events(&mut server);

    let mut received = vec![];
    let mut stream = server.stream(1).unwrap();
    while let Some((data, _)) = stream.read_sctp().unwrap() {
        received.push(data);
    }
    assert_eq!(received, vec![
        Bytes::from_static(b"one"),
        Bytes::from_static(b"two"),
        Bytes::from_static(b"three"),
        Bytes::from_static(b"four"),
    ]);
}

#[test]
fn test_large_message_is_fragmented_and_reassembled() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    let payload: Vec<u8> = (0u32..20_000).map(|i| (i % 251) as u8).collect();
    let message = Bytes::from(payload);

    client
        .open_stream(1, PayloadProtocolIdentifier::Binary)
        .unwrap();
    client
        .stream(1)
        .unwrap()
        .write_sctp(&message, PayloadProtocolIdentifier::Binary)
        .unwrap();
    drive(&mut client, &mut server, now);
    events(&mut server);

    let (data, _) = server
        .stream(1)
        .unwrap()
        .read_sctp()
        .unwrap()
        .expect("reassembled message");
    assert_eq!(data, message, "fragmentation must preserve the bytes");
}

#[test]
fn test_unordered_message_delivery() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    {
        let mut stream = client
            .open_stream(1, PayloadProtocolIdentifier::Binary)
            .unwrap();
        stream
            .set_reliability_params(true, ReliabilityType::Reliable, 0)
            .unwrap();
        stream
            .write_sctp(
                &Bytes::from_static(b"unordered"),
                PayloadProtocolIdentifier::Binary,
            )
            .unwrap();
    }
    drive(&mut client, &mut server, now);
    events(&mut server);

    let (data, _) = server
        .stream(1)
        .unwrap()
        .read_sctp()
        .unwrap()
        .expect("message ready");
    assert_eq!(data, Bytes::from_static(b"unordered"));
}

#[test]
fn test_message_too_large_rejected() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    let max = client.max_message_size() as usize;
    client
        .open_stream(1, PayloadProtocolIdentifier::Binary)
        .unwrap();
    let err = client
        .stream(1)
        .unwrap()
        .write_sctp(
            &Bytes::from(vec![0u8; max + 1]),
            PayloadProtocolIdentifier::Binary,
        )
        .unwrap_err();
    assert_eq!(err, Error::ErrOutboundPacketTooLarge);
}

#[test]
fn test_stream_reset_signals_peer() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    client
        .open_stream(1, PayloadProtocolIdentifier::Binary)
        .unwrap();
    client
        .stream(1)
        .unwrap()
        .write_sctp(&Bytes::from_static(b"x"), PayloadProtocolIdentifier::Binary)
        .unwrap();
    drive(&mut client, &mut server, now);
    events(&mut server);

    client.stream(1).unwrap().stop().unwrap();
    drive(&mut client, &mut server, now);

    let server_events = events(&mut server);
    assert!(
        server_events.contains(&Event::Stream(StreamEvent::Reset { id: 1 })),
        "{server_events:?}"
    );

    // writing on the closed half fails locally
    let err = client
        .stream(1)
        .unwrap()
        .write_sctp(&Bytes::from_static(b"y"), PayloadProtocolIdentifier::Binary)
        .unwrap_err();
    assert_eq!(err, Error::ErrStreamClosed);
}

#[test]
fn test_graceful_shutdown() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    client.shutdown(now).unwrap();
    drive(&mut client, &mut server, now);

    assert_matches!(client.state(), AssociationState::Closed);
    assert_matches!(server.state(), AssociationState::Closed);
    assert!(events(&mut client).contains(&Event::Closed));
    assert!(events(&mut server).contains(&Event::Closed));
}

#[test]
fn test_write_before_established_fails_after_close() {
    let (mut client, mut server) = new_pair();
    let now = Instant::now();
    establish(&mut client, &mut server, now);

    client.shutdown(now).unwrap();
    drive(&mut client, &mut server, now);

    client
        .open_stream(9, PayloadProtocolIdentifier::Binary)
        .unwrap();
    let err = client
        .stream(9)
        .unwrap()
        .write_sctp(&Bytes::from_static(b"z"), PayloadProtocolIdentifier::Binary)
        .unwrap_err();
    assert_eq!(err, Error::ErrPayloadDataStateNotExist);
}
