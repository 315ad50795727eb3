use util::marshal::{Marshal, Unmarshal};

use super::*;

#[test]
fn test_sender_report_round_trip() {
    let sr = SenderReport {
        ssrc: 0x902f9e2e,
        ntp_time: 0xda8bd1fcdddda05a,
        rtp_time: 0xaaf4edd5,
        packet_count: 1,
        octet_count: 2,
        reports: vec![ReceptionReport {
            ssrc: 0xbc5e9a40,
            fraction_lost: 0,
            total_lost: 0,
            last_sequence_number: 0x46e1,
            jitter: 273,
            last_sender_report: 0x9f36432,
            delay: 150137,
        }],
        ..Default::default()
    };

    let data = sr.marshal().expect("marshal failed");
    assert_eq!(data.len() % 4, 0);

    let parsed = SenderReport::unmarshal(&mut data.clone()).expect("unmarshal failed");
    assert_eq!(parsed, sr);
    assert_eq!(parsed.destination_ssrc(), vec![0xbc5e9a40, 0x902f9e2e]);
}

#[test]
fn test_sender_report_truncated() {
    let sr = SenderReport {
        ssrc: 1,
        ..Default::default()
    };
    let data = sr.marshal().expect("marshal failed");

    let mut truncated = data.slice(..data.len() - 4);
    let result = SenderReport::unmarshal(&mut truncated);
    assert_eq!(result, Err(Error::PacketTooShort.into()));
}

#[test]
fn test_sender_report_wrong_type() {
    // A receiver report handed to the sender report decoder.
    let rr = crate::receiver_report::ReceiverReport {
        ssrc: 1,
        ..Default::default()
    };
    let data = rr.marshal().expect("marshal failed");

    // Pad to the minimum SR size so the type check is what fails.
    let mut padded = bytes::BytesMut::from(&data[..]);
    padded.resize(HEADER_LENGTH + SR_HEADER_LENGTH, 0);
    let mut buf = padded.freeze();

    let result = SenderReport::unmarshal(&mut buf);
    assert_eq!(result, Err(Error::WrongType.into()));
}
