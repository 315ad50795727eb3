use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_transport_layer_nack_unmarshal() {
    let raw = Bytes::from_static(&[
        0x81, 0xcd, 0x00, 0x03, // v=2, fmt=1, TSFB, len=3
        0x90, 0x2f, 0x9e, 0x2e, // sender ssrc
        0x90, 0x2f, 0x9e, 0x2e, // media ssrc
        0x00, 0x69, 0x00, 0x03, // nack pid=105, blp=0x0003
    ]);

    let nack = TransportLayerNack::unmarshal(&mut raw.clone()).expect("unmarshal failed");
    assert_eq!(nack.sender_ssrc, 0x902f9e2e);
    assert_eq!(nack.media_ssrc, 0x902f9e2e);
    assert_eq!(
        nack.nacks,
        vec![NackPair {
            packet_id: 105,
            lost_packets: 0x0003,
        }]
    );

    let data = nack.marshal().expect("marshal failed");
    assert_eq!(data, raw);
}

#[test]
fn test_nack_pair_packet_list() {
    let tests: Vec<(NackPair, Vec<u16>)> = vec![
        (
            NackPair {
                packet_id: 42,
                lost_packets: 0,
            },
            vec![42],
        ),
        (
            NackPair {
                packet_id: 42,
                lost_packets: 1,
            },
            vec![42, 43],
        ),
        (
            NackPair {
                packet_id: 42,
                lost_packets: 0x8000,
            },
            vec![42, 58],
        ),
        (
            NackPair {
                packet_id: 42,
                lost_packets: 0x0002,
            },
            vec![42, 44],
        ),
        (
            NackPair {
                packet_id: 65534,
                lost_packets: 0x0003,
            },
            vec![65534, 65535, 0],
        ),
    ];

    for (pair, want) in tests {
        assert_eq!(pair.packet_list(), want, "packet_list({pair:?})");
    }
}

#[test]
fn test_nack_pairs_from_sequence_numbers() {
    let pairs = nack_pairs_from_sequence_numbers(&[42, 43, 44, 45, 59, 60]);
    assert_eq!(
        pairs,
        vec![
            NackPair {
                packet_id: 42,
                lost_packets: 0b0000_0000_0000_0111,
            },
            NackPair {
                packet_id: 59,
                lost_packets: 0b0000_0000_0000_0001,
            },
        ]
    );
}

#[test]
fn test_transport_layer_nack_too_short() {
    let raw = Bytes::from_static(&[0x81, 0xcd, 0x00, 0x03, 0x90, 0x2f, 0x9e, 0x2e]);
    let result = TransportLayerNack::unmarshal(&mut raw.clone());
    assert_eq!(result, Err(Error::PacketTooShort.into()));
}
