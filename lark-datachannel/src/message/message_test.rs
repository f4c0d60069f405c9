use super::*;
use bytes::{Bytes, BytesMut};

#[test]
fn test_channel_open_parse_literal() {
    let mut raw = Bytes::from_static(&[
        0x03, // OPEN
        0x00, // RELIABLE
        0x00, 0x00, // priority 0
        0x00, 0x00, 0x00, 0x00, // reliability parameter 0
        0x00, 0x03, // label length 3
        0x00, 0x03, // protocol length 3
        0x66, 0x6f, 0x6f, // "foo"
        0x62, 0x61, 0x72, // "bar"
    ]);

    let msg = Message::unmarshal(&mut raw).unwrap();
    let Message::DataChannelOpen(open) = &msg else {
        panic!("expected DataChannelOpen, got {msg:?}");
    };

    assert_eq!(open.channel_type, ChannelType::Reliable);
    assert_eq!(open.priority, 0);
    assert_eq!(open.reliability_parameter, 0);
    assert_eq!(open.label, b"foo".to_vec());
    assert_eq!(open.protocol, b"bar".to_vec());

    // and it must serialize back to the same bytes
    let marshaled = msg.marshal().unwrap();
    assert_eq!(
        marshaled.freeze(),
        Bytes::from_static(&[
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x03, 0x66, 0x6f,
            0x6f, 0x62, 0x61, 0x72,
        ])
    );
}

#[test]
fn test_channel_open_roundtrip_all_types() {
    let types = [
        ChannelType::Reliable,
        ChannelType::ReliableUnordered,
        ChannelType::PartialReliableRexmit,
        ChannelType::PartialReliableRexmitUnordered,
        ChannelType::PartialReliableTimed,
        ChannelType::PartialReliableTimedUnordered,
    ];

    for channel_type in types {
        let msg = Message::DataChannelOpen(DataChannelOpen {
            channel_type,
            priority: 512,
            reliability_parameter: 1500,
            label: b"data".to_vec(),
            protocol: b"chat".to_vec(),
        });

        let raw = msg.marshal().unwrap();
        let decoded = Message::unmarshal(&mut raw.freeze()).unwrap();
        assert_eq!(decoded, msg);
    }
}

#[test]
fn test_channel_ack_roundtrip() {
    let msg = Message::DataChannelAck(DataChannelAck {});
    let raw = msg.marshal().unwrap();
    assert_eq!(raw.len(), 1);

    let decoded = Message::unmarshal(&mut raw.freeze()).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_channel_open_length_mismatch_rejected() {
    // label length claims 5 but only 3 bytes follow
    let mut raw = Bytes::from_static(&[
        0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x66, 0x6f, 0x6f,
    ]);
    assert_eq!(
        Message::unmarshal(&mut raw),
        Err(Error::ErrDcepLengthMismatch)
    );

    // trailing garbage after label+protocol is also a mismatch
    let mut raw = Bytes::from_static(&[
        0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x66, 0x6f, 0xff,
    ]);
    assert_eq!(
        Message::unmarshal(&mut raw),
        Err(Error::ErrDcepLengthMismatch)
    );
}

#[test]
fn test_message_unmarshal_empty() {
    let mut raw = BytesMut::new();
    assert!(Message::unmarshal(&mut raw).is_err());
}

#[test]
fn test_message_unknown_type() {
    let mut raw = Bytes::from_static(&[0x07]);
    assert_eq!(
        Message::unmarshal(&mut raw),
        Err(Error::InvalidMessageType(0x07))
    );
}
