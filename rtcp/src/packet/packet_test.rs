use bytes::{Bytes, BytesMut};

use super::*;
use crate::payload_feedbacks::full_intra_request::FirEntry;
use crate::reception_report::ReceptionReport;
use crate::source_description::{
    SdesType, SourceDescriptionChunk, SourceDescriptionItem,
};
use crate::transport_feedbacks::transport_layer_nack::NackPair;

fn sample_packets() -> Vec<Box<dyn Packet + Send + Sync>> {
    vec![
        Box::new(SenderReport {
            ssrc: 0x902f9e2e,
            ntp_time: 1,
            rtp_time: 2,
            packet_count: 3,
            octet_count: 4,
            ..Default::default()
        }),
        Box::new(ReceiverReport {
            ssrc: 0x902f9e2e,
            reports: vec![ReceptionReport {
                ssrc: 0x1c64cee0,
                total_lost: 5,
                last_sequence_number: 0xf00d,
                ..Default::default()
            }],
            ..Default::default()
        }),
        Box::new(SourceDescription {
            chunks: vec![SourceDescriptionChunk {
                source: 0x902f9e2e,
                items: vec![SourceDescriptionItem {
                    sdes_type: SdesType::SdesCname,
                    text: Bytes::from_static(b"{9c00eb92-1afb-9d49-a47d-91f64eee69f5}"),
                }],
            }],
        }),
        Box::new(Goodbye {
            sources: vec![0x902f9e2e],
            ..Default::default()
        }),
        Box::new(PictureLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
        }),
        Box::new(FullIntraRequest {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            fir: vec![FirEntry {
                ssrc: 0x902f9e2e,
                sequence_number: 1,
            }],
        }),
        Box::new(SliceLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            sli_entries: vec![crate::payload_feedbacks::slice_loss_indication::SliEntry {
                first: 5,
                number: 8,
                picture: 3,
            }],
        }),
        Box::new(ReferencePictureSelectionIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            payload_type: 96,
            bit_string: Bytes::from_static(&[0x01, 0x02]),
        }),
        Box::new(ApplicationLayerFeedback {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        }),
        Box::new(TransportLayerNack {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            nacks: vec![NackPair {
                packet_id: 105,
                lost_packets: 0x0003,
            }],
        }),
        Box::new(TmmbRequest {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0,
            entries: vec![],
        }),
        Box::new(TmmbNotification {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0,
            entries: vec![],
        }),
    ]
}

#[test]
fn test_packet_unmarshal_compound() {
    let packets = sample_packets();
    let data = marshal(&packets).expect("marshal failed");
    assert_eq!(data.len() % 4, 0);

    let parsed = unmarshal(&mut data.clone()).expect("unmarshal failed");
    assert_eq!(parsed.len(), packets.len());
    for (got, want) in parsed.iter().zip(packets.iter()) {
        assert!(
            got.equal(&**want),
            "round-tripped packet differs: got {got}, want {want}"
        );
    }
}

#[test]
fn test_packet_round_trip_byte_exact() {
    for packet in sample_packets() {
        let first = packet.marshal().expect("marshal failed");
        let parsed = unmarshal(&mut first.clone()).expect("unmarshal failed");
        assert_eq!(parsed.len(), 1);
        let second = parsed[0].marshal().expect("re-marshal failed");
        assert_eq!(first, second, "byte-exact round trip for {packet}");
    }
}

#[test]
fn test_packet_unmarshal_empty() {
    let result = unmarshal(&mut Bytes::new());
    assert_eq!(result, Err(Error::InvalidHeader.into()));
}

#[test]
fn test_packet_unmarshal_unknown_type() {
    // An APP packet (type 204) is not parsed into a typed packet but must not
    // abort the compound parse.
    let mut compound = BytesMut::new();
    compound.extend_from_slice(&[
        0x80, 0xcc, 0x00, 0x01, // v=2, APP, len=1
        0x90, 0x2f, 0x9e, 0x2e, // ssrc
    ]);
    let pli = PictureLossIndication {
        sender_ssrc: 1,
        media_ssrc: 2,
    };
    compound.extend_from_slice(&pli.marshal().expect("marshal failed"));

    let mut buf = compound.freeze();
    let parsed = unmarshal(&mut buf).expect("unmarshal failed");
    assert_eq!(parsed.len(), 2);
    assert!(parsed[0].as_any().downcast_ref::<RawPacket>().is_some());
    assert!(parsed[1]
        .as_any()
        .downcast_ref::<PictureLossIndication>()
        .is_some());
}

#[test]
fn test_packet_unmarshal_truncated_sub_packet() {
    // The declared length exceeds the remaining buffer.
    let raw = Bytes::from_static(&[
        0x81, 0xce, 0x00, 0x05, // v=2, PSFB PLI, len=5 (but only 8 bytes follow)
        0x00, 0x00, 0x00, 0x00, //
        0x90, 0x2f, 0x9e, 0x2e, //
    ]);

    let result = unmarshal(&mut raw.clone());
    assert_eq!(result, Err(Error::PacketTooShort.into()));
}
