use bytes::BytesMut;
use serde_json::json;

use super::codec::{decode_frame, encode_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
use super::*;

#[test]
fn test_request_from_json() {
    let raw = br#"{
        "id": 7,
        "method": "createRtpReceiver",
        "internal": { "roomId": 1, "peerId": 2, "rtpReceiverId": 3 },
        "data": { "kind": "video" }
    }"#;

    let request = Request::from_json(raw).expect("parse failed");
    assert_eq!(request.id, 7);
    assert_eq!(request.method, Method::CreateRtpReceiver);
    assert_eq!(request.room_id().unwrap(), 1);
    assert_eq!(request.peer_id().unwrap(), 2);
    assert_eq!(request.rtp_receiver_id().unwrap(), 3);
    assert_eq!(request.data["kind"], "video");
}

#[test]
fn test_request_missing_internal_ids() {
    let raw = br#"{ "id": 1, "method": "dumpRoom" }"#;
    let request = Request::from_json(raw).expect("parse failed");
    assert!(request.room_id().is_err());
    assert!(request.peer_id().is_err());
}

#[test]
fn test_request_unknown_method() {
    let raw = br#"{ "id": 1, "method": "fooBar" }"#;
    assert!(Request::from_json(raw).is_err());
}

#[test]
fn test_response_serialization() {
    let accepted = Response::accepted(3, json!({ "x": 1 }));
    let value: serde_json::Value =
        serde_json::from_slice(&accepted.to_json()).expect("round trip failed");
    assert_eq!(value, json!({ "id": 3, "accepted": true, "data": { "x": 1 } }));

    let accepted_empty = Response::accepted(4, serde_json::Value::Null);
    let value: serde_json::Value =
        serde_json::from_slice(&accepted_empty.to_json()).expect("round trip failed");
    assert_eq!(value, json!({ "id": 4, "accepted": true }));

    let rejected = Response::rejected(5, "unknown entity: peer 9");
    let value: serde_json::Value =
        serde_json::from_slice(&rejected.to_json()).expect("round trip failed");
    assert_eq!(
        value,
        json!({ "id": 5, "rejected": true, "reason": "unknown entity: peer 9" })
    );
}

#[test]
fn test_notification_serialization() {
    let notification = Notification::new("peer.closed", json!({ "roomId": 1, "peerId": 2 }));
    let value: serde_json::Value =
        serde_json::from_slice(&notification.to_json()).expect("round trip failed");
    assert_eq!(
        value,
        json!({ "event": "peer.closed", "data": { "roomId": 1, "peerId": 2 } })
    );
}

#[test]
fn test_frame_round_trip() {
    let mut wire = BytesMut::new();
    encode_frame(b"hello", &mut wire).expect("encode failed");
    encode_frame(b"", &mut wire).expect("encode failed");
    encode_frame(b"world!", &mut wire).expect("encode failed");

    assert_eq!(
        decode_frame(&mut wire).expect("decode failed").as_deref(),
        Some(&b"hello"[..])
    );
    assert_eq!(
        decode_frame(&mut wire).expect("decode failed").as_deref(),
        Some(&b""[..])
    );
    assert_eq!(
        decode_frame(&mut wire).expect("decode failed").as_deref(),
        Some(&b"world!"[..])
    );
    assert_eq!(decode_frame(&mut wire).expect("decode failed"), None);
}

#[test]
fn test_frame_incomplete() {
    let mut wire = BytesMut::new();
    encode_frame(b"hello", &mut wire).expect("encode failed");

    let mut partial = wire.split_to(FRAME_HEADER_LEN + 2);
    assert_eq!(decode_frame(&mut partial).expect("decode failed"), None);

    // The partial frame stays buffered until the rest arrives.
    partial.extend_from_slice(&wire);
    assert_eq!(
        decode_frame(&mut partial).expect("decode failed").as_deref(),
        Some(&b"hello"[..])
    );
}

#[test]
fn test_frame_oversized_length_prefix() {
    let mut wire = BytesMut::new();
    wire.extend_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes());
    wire.extend_from_slice(b"junk");

    assert!(decode_frame(&mut wire).is_err());
}
