use std::time::Duration;

use bytes::Bytes;

use super::*;

fn make_packet(seq: u16) -> rtp::Packet {
    rtp::Packet {
        header: rtp::Header {
            version: 2,
            payload_type: 96,
            sequence_number: seq,
            ..Default::default()
        },
        payload: Bytes::copy_from_slice(&seq.to_be_bytes()),
        padding_size: 0,
    }
}

fn buffer(capacity: u16) -> RetransmissionBuffer {
    RetransmissionBuffer::new(RetransmissionBufferOptions {
        capacity,
        max_age: None,
    })
}

#[test]
#[should_panic(expected = "power of two")]
fn test_invalid_capacity() {
    buffer(100);
}

#[test]
fn test_basic() {
    let mut buf = buffer(8);

    buf.insert(&make_packet(0));
    assert_eq!(buf.get(0).unwrap().header.sequence_number, 0);
    assert!(buf.get(1).is_none());
}

#[test]
fn test_overwrite() {
    let mut buf = buffer(8);

    for i in 0..8 {
        buf.insert(&make_packet(i));
    }
    for i in 0..8 {
        assert!(buf.get(i).is_some(), "seq {i} should be present");
    }

    // seq 8 claims seq 0's slot.
    buf.insert(&make_packet(8));
    assert!(buf.get(8).is_some());
    assert!(buf.get(0).is_none());
}

#[test]
fn test_gap_clears_skipped_slots() {
    let mut buf = buffer(8);

    buf.insert(&make_packet(0));
    buf.insert(&make_packet(1));
    buf.insert(&make_packet(2));
    buf.insert(&make_packet(5));

    assert!(buf.get(0).is_some());
    assert!(buf.get(1).is_some());
    assert!(buf.get(2).is_some());
    assert!(buf.get(3).is_none());
    assert!(buf.get(4).is_none());
    assert!(buf.get(5).is_some());
}

#[test]
fn test_out_of_order_insert() {
    let mut buf = buffer(8);

    buf.insert(&make_packet(0));
    buf.insert(&make_packet(2));
    buf.insert(&make_packet(1));

    assert!(buf.get(0).is_some());
    assert!(buf.get(1).is_some());
    assert!(buf.get(2).is_some());
}

#[test]
fn test_too_old_and_ahead() {
    let mut buf = buffer(8);

    for i in 0..16 {
        buf.insert(&make_packet(i));
    }

    for i in 0..8 {
        assert!(buf.get(i).is_none(), "seq {i} is out of the window");
    }
    for i in 8..16 {
        assert!(buf.get(i).is_some(), "seq {i} should be present");
    }
    assert!(buf.get(16).is_none(), "seq 16 was never received");
}

#[test]
fn test_sequence_number_wraparound() {
    let mut buf = buffer(8);

    buf.insert(&make_packet(65534));
    buf.insert(&make_packet(65535));
    buf.insert(&make_packet(0));
    buf.insert(&make_packet(1));

    assert!(buf.get(65534).is_some());
    assert!(buf.get(65535).is_some());
    assert!(buf.get(0).is_some());
    assert!(buf.get(1).is_some());
}

#[test]
fn test_max_age() {
    let mut buf = RetransmissionBuffer::new(RetransmissionBufferOptions {
        capacity: 8,
        max_age: Some(Duration::from_millis(10)),
    });

    buf.insert(&make_packet(7));
    assert!(buf.get(7).is_some());

    std::thread::sleep(Duration::from_millis(20));
    assert!(buf.get(7).is_none(), "aged-out entry must be a miss");
}
