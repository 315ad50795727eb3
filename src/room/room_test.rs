use std::collections::BTreeMap;

use bytes::Bytes;
use util::marshal::{Marshal, Unmarshal};

use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::{NackPair, TransportLayerNack};

use super::*;
use crate::rtp_parameters::{MediaKind, RtpCodecParameters, RtpEncodingParameters};

#[derive(Default)]
struct TestTransport {
    rtp: Vec<(PeerId, Bytes)>,
    rtcp: Vec<(PeerId, Bytes)>,
}

impl TransportSink for TestTransport {
    fn send_rtp(&mut self, peer_id: PeerId, data: Bytes) {
        self.rtp.push((peer_id, data));
    }

    fn send_rtcp(&mut self, peer_id: PeerId, data: Bytes) {
        self.rtcp.push((peer_id, data));
    }
}

#[derive(Default)]
struct TestNotifier {
    notifications: Vec<Notification>,
}

impl NotificationSink for TestNotifier {
    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_owned(),
            preferred_payload_type: Some(100),
            clock_rate: 48000,
            channels: Some(2),
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_owned(),
            preferred_payload_type: Some(101),
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
    ]
}

fn opus_vp8_offer() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![
            RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/opus".to_owned(),
                preferred_payload_type: Some(111),
                clock_rate: 48000,
                channels: Some(2),
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/vp8".to_owned(),
                preferred_payload_type: Some(120),
                clock_rate: 90000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
        ],
        header_extensions: vec![],
    }
}

fn vp8_only_offer() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_owned(),
            preferred_payload_type: None,
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![],
    }
}

fn vp8_parameters(ssrc: u32, payload_type: u8) -> RtpParameters {
    RtpParameters {
        mux_id: None,
        codecs: vec![RtpCodecParameters {
            mime_type: "video/VP8".to_owned(),
            payload_type,
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(ssrc),
            rtx: None,
        }],
        rtcp: None,
    }
}

fn rtp_packet_bytes(ssrc: u32, payload_type: u8, sequence_number: u16) -> Vec<u8> {
    let packet = rtp::Packet {
        header: rtp::Header {
            version: 2,
            payload_type,
            sequence_number,
            timestamp: 1000,
            ssrc,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0xaa, 0xbb]),
        padding_size: 0,
    };
    packet.marshal().unwrap().to_vec()
}

/// Builds a room with a VP8 publisher (peer 1, receiver 10, ssrc 0xAAAA) and
/// a VP8-only subscriber (peer 2) with one sender. Returns the room, the
/// notifier and the subscriber-side sender SSRC.
fn two_peer_room() -> (Room, TestNotifier, u32) {
    let mut room = Room::new(1, &media_codecs()).unwrap();
    let mut notifier = TestNotifier::default();

    room.create_peer(1).unwrap();
    room.set_peer_capabilities(1, &opus_vp8_offer(), &mut notifier)
        .unwrap();
    room.create_rtp_receiver(1, 10, MediaKind::Video).unwrap();
    room.set_rtp_receiver_parameters(1, 10, vp8_parameters(0xaaaa, 101), &mut notifier)
        .unwrap();

    room.create_peer(2).unwrap();
    room.set_peer_capabilities(2, &vp8_only_offer(), &mut notifier)
        .unwrap();

    let sender_ssrc = {
        let peer = room.peer(2).unwrap();
        assert_eq!(peer.senders.len(), 1, "exactly one sender expected");
        let sender = peer.senders.values().next().unwrap();
        assert!(sender.is_active());
        sender.ssrc()
    };

    (room, notifier, sender_ssrc)
}

#[test]
fn test_payload_type_assignment() {
    let codecs = vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_owned(),
            preferred_payload_type: None,
            clock_rate: 48000,
            channels: Some(2),
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/PCMU".to_owned(),
            preferred_payload_type: Some(0),
            clock_rate: 8000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_owned(),
            preferred_payload_type: Some(96),
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP9".to_owned(),
            preferred_payload_type: None,
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
    ];

    let room = Room::new(1, &codecs).unwrap();
    let pts: Vec<u8> = room
        .capabilities()
        .codecs
        .iter()
        .map(|c| c.preferred_payload_type.unwrap())
        .collect();

    // opus takes the first free dynamic value, PCMU keeps its static type,
    // VP8 keeps its declared 96... which opus already claimed, so VP8 is
    // reassigned, and VP9 draws the next free value.
    assert_eq!(pts, vec![96, 0, 97, 98]);

    // Payload types are unique.
    let mut sorted = pts.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), pts.len());

    // Assignment is deterministic.
    let again = Room::new(1, &codecs).unwrap();
    assert_eq!(room.capabilities(), again.capabilities());
}

#[test]
fn test_rtx_apt_remap() {
    let codecs = vec![
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_owned(),
            preferred_payload_type: Some(101),
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/rtx".to_owned(),
            preferred_payload_type: None,
            clock_rate: 90000,
            channels: None,
            parameters: [("apt".to_owned(), "101".to_owned())].into_iter().collect(),
            rtcp_feedback: vec![],
        },
    ];

    let room = Room::new(1, &codecs).unwrap();
    let caps = room.capabilities();
    assert_eq!(caps.codecs[0].preferred_payload_type, Some(101));
    assert_eq!(caps.codecs[1].preferred_payload_type, Some(96));
    assert_eq!(caps.codecs[1].apt(), Some(101));
}

#[test]
fn test_unsupported_media_codec() {
    let codecs = vec![RtpCodecCapability {
        kind: MediaKind::Video,
        mime_type: "video/FancyCodec".to_owned(),
        preferred_payload_type: None,
        clock_rate: 90000,
        channels: None,
        parameters: BTreeMap::new(),
        rtcp_feedback: vec![],
    }];

    assert!(matches!(
        Room::new(1, &codecs),
        Err(Error::InvalidParameters(_))
    ));
}

#[test]
fn test_peer_capability_negotiation() {
    let mut room = Room::new(1, &media_codecs()).unwrap();
    let mut notifier = TestNotifier::default();

    room.create_peer(1).unwrap();
    let negotiated = room
        .set_peer_capabilities(1, &opus_vp8_offer(), &mut notifier)
        .unwrap();

    // Room order and room payload types win; the peer's preferences are
    // discarded.
    assert_eq!(negotiated.codecs.len(), 2);
    assert_eq!(negotiated.codecs[0].mime_type, "audio/opus");
    assert_eq!(negotiated.codecs[0].preferred_payload_type, Some(100));
    assert_eq!(negotiated.codecs[1].mime_type, "video/VP8");
    assert_eq!(negotiated.codecs[1].preferred_payload_type, Some(101));

    // Intersection is deterministic.
    assert_eq!(
        room.capabilities().intersect(&opus_vp8_offer()),
        room.capabilities().intersect(&opus_vp8_offer())
    );
}

#[test]
fn test_capability_conflict() {
    let mut room = Room::new(1, &media_codecs()).unwrap();
    let mut notifier = TestNotifier::default();

    room.create_peer(1).unwrap();
    let offered = RtpCapabilities {
        codecs: vec![RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/H265".to_owned(),
            preferred_payload_type: None,
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![],
    };

    assert!(matches!(
        room.set_peer_capabilities(1, &offered, &mut notifier),
        Err(Error::CapabilityConflict(_))
    ));
}

#[test]
fn test_receiver_parameter_rejection() {
    let mut room = Room::new(1, &media_codecs()).unwrap();
    let mut notifier = TestNotifier::default();

    room.create_peer(1).unwrap();
    room.set_peer_capabilities(1, &opus_vp8_offer(), &mut notifier)
        .unwrap();
    room.create_rtp_receiver(1, 10, MediaKind::Video).unwrap();

    // Payload type 107 was never negotiated.
    let result =
        room.set_rtp_receiver_parameters(1, 10, vp8_parameters(0xaaaa, 107), &mut notifier);
    assert!(matches!(result, Err(Error::InvalidParameters(_))));

    // The receiver stays inactive and a valid application still succeeds.
    assert!(!room.peer(1).unwrap().receivers[&10].is_active());
    room.set_rtp_receiver_parameters(1, 10, vp8_parameters(0xaaaa, 101), &mut notifier)
        .unwrap();
    assert!(room.peer(1).unwrap().receivers[&10].is_active());
}

#[test]
fn test_two_peer_fanout() {
    let (mut room, notifier, sender_ssrc) = two_peer_room();

    assert_ne!(sender_ssrc, 0xaaaa, "sender SSRC must be fresh");
    assert!(room.check_fanout_consistency());
    assert!(notifier
        .notifications
        .iter()
        .any(|n| n.event == "rtpSender.new"));

    let mut transport = TestTransport::default();
    room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, 1), &mut transport);

    assert_eq!(transport.rtp.len(), 1, "one packet fans out to peer 2");
    let (to_peer, data) = &transport.rtp[0];
    assert_eq!(*to_peer, 2);

    let forwarded = rtp::Packet::unmarshal(&mut data.clone()).unwrap();
    assert_eq!(forwarded.header.ssrc, sender_ssrc);
    assert_eq!(forwarded.header.payload_type, 101);
    assert_eq!(forwarded.header.sequence_number, 1);
    assert_eq!(forwarded.payload, Bytes::from_static(&[0xaa, 0xbb]));
}

#[test]
fn test_fanout_runs_for_receiver_created_after_join() {
    // Same topology as two_peer_room, but the subscriber joins first.
    let mut room = Room::new(1, &media_codecs()).unwrap();
    let mut notifier = TestNotifier::default();

    room.create_peer(2).unwrap();
    room.set_peer_capabilities(2, &vp8_only_offer(), &mut notifier)
        .unwrap();

    room.create_peer(1).unwrap();
    room.set_peer_capabilities(1, &opus_vp8_offer(), &mut notifier)
        .unwrap();
    room.create_rtp_receiver(1, 10, MediaKind::Video).unwrap();
    room.set_rtp_receiver_parameters(1, 10, vp8_parameters(0xaaaa, 101), &mut notifier)
        .unwrap();

    assert_eq!(room.peer(2).unwrap().senders.len(), 1);
    assert!(room.check_fanout_consistency());
}

#[test]
fn test_malformed_rtp_is_dropped() {
    let (mut room, _notifier, _sender_ssrc) = two_peer_room();
    let mut transport = TestTransport::default();

    // Version 1 packet.
    room.handle_rtp(1, &[0x40, 0x60, 0x00, 0x01], &mut transport);
    // Unknown SSRC.
    room.handle_rtp(1, &rtp_packet_bytes(0xbbbb, 101, 1), &mut transport);
    // Unknown payload type.
    room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 99, 1), &mut transport);

    assert!(transport.rtp.is_empty());
}

#[test]
fn test_packets_fan_out_in_arrival_order() {
    let (mut room, _notifier, _sender_ssrc) = two_peer_room();
    let mut transport = TestTransport::default();

    for seq in [5u16, 6, 7, 8] {
        room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, seq), &mut transport);
    }

    let seqs: Vec<u16> = transport
        .rtp
        .iter()
        .map(|(_, data)| {
            rtp::Packet::unmarshal(&mut data.clone())
                .unwrap()
                .header
                .sequence_number
        })
        .collect();
    assert_eq!(seqs, vec![5, 6, 7, 8]);
}

#[test]
fn test_nack_resolution() {
    let (mut room, _notifier, sender_ssrc) = two_peer_room();
    let mut transport = TestTransport::default();

    for seq in 100u16..=110 {
        room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, seq), &mut transport);
    }
    transport.rtp.clear();

    let nack = TransportLayerNack {
        sender_ssrc: 0,
        media_ssrc: sender_ssrc,
        nacks: vec![NackPair {
            packet_id: 105,
            lost_packets: 0x0003,
        }],
    };
    let data = nack.marshal().unwrap();
    room.handle_rtcp(2, &data, &mut transport);

    let seqs: Vec<u16> = transport
        .rtp
        .iter()
        .map(|(peer_id, data)| {
            assert_eq!(*peer_id, 2);
            let packet = rtp::Packet::unmarshal(&mut data.clone()).unwrap();
            assert_eq!(packet.header.ssrc, sender_ssrc);
            packet.header.sequence_number
        })
        .collect();

    assert_eq!(seqs, vec![105, 106], "seq 105 and 106, nothing for 107");
}

#[test]
fn test_pli_is_forwarded_to_publisher() {
    let (mut room, _notifier, sender_ssrc) = two_peer_room();
    let mut transport = TestTransport::default();

    let pli = PictureLossIndication {
        sender_ssrc: 7,
        media_ssrc: sender_ssrc,
    };
    let data = pli.marshal().unwrap();
    room.handle_rtcp(2, &data, &mut transport);

    assert_eq!(transport.rtcp.len(), 1);
    let (to_peer, data) = &transport.rtcp[0];
    assert_eq!(*to_peer, 1, "keyframe request reaches the publisher");

    let packets = rtcp::packet::unmarshal(&mut data.clone()).unwrap();
    let forwarded = packets[0]
        .as_any()
        .downcast_ref::<PictureLossIndication>()
        .unwrap();
    assert_eq!(forwarded.media_ssrc, 0xaaaa);
}

#[test]
fn test_sender_report_is_forwarded_to_subscriber() {
    let (mut room, _notifier, sender_ssrc) = two_peer_room();
    let mut transport = TestTransport::default();

    let sr = SenderReport {
        ssrc: 0xaaaa,
        ntp_time: 42,
        rtp_time: 43,
        packet_count: 44,
        octet_count: 45,
        ..Default::default()
    };
    let data = sr.marshal().unwrap();
    room.handle_rtcp(1, &data, &mut transport);

    assert_eq!(transport.rtcp.len(), 1);
    let (to_peer, data) = &transport.rtcp[0];
    assert_eq!(*to_peer, 2);

    let packets = rtcp::packet::unmarshal(&mut data.clone()).unwrap();
    let forwarded = packets[0].as_any().downcast_ref::<SenderReport>().unwrap();
    assert_eq!(forwarded.ssrc, sender_ssrc);
    assert_eq!(forwarded.ntp_time, 42);
}

#[test]
fn test_receiver_reapplication_updates_senders_in_place() {
    let (mut room, mut notifier, sender_ssrc) = two_peer_room();

    // Re-apply the receiver parameters with a new publisher SSRC.
    room.set_rtp_receiver_parameters(1, 10, vp8_parameters(0xcccc, 101), &mut notifier)
        .unwrap();

    // No duplicate sender was created and the existing one keeps its SSRC.
    let peer = room.peer(2).unwrap();
    assert_eq!(peer.senders.len(), 1);
    assert_eq!(peer.senders.values().next().unwrap().ssrc(), sender_ssrc);
    assert!(room.check_fanout_consistency());

    // The new publisher SSRC routes; the old one no longer does.
    let mut transport = TestTransport::default();
    room.handle_rtp(1, &rtp_packet_bytes(0xcccc, 101, 2), &mut transport);
    assert_eq!(transport.rtp.len(), 1);
    room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, 3), &mut transport);
    assert_eq!(transport.rtp.len(), 1);
}

#[test]
fn test_ownership_closure_on_peer_close() {
    let (mut room, _setup_notifier, _sender_ssrc) = two_peer_room();
    let mut notifier = TestNotifier::default();

    room.close_peer(1, &mut notifier).unwrap();

    assert!(room.peer(1).is_none());
    assert!(room.peer(2).unwrap().senders.is_empty());
    assert!(room.check_fanout_consistency());

    // Senders close before receivers, receivers before the peer.
    let events: Vec<&str> = notifier
        .notifications
        .iter()
        .map(|n| n.event.as_str())
        .collect();
    assert_eq!(
        events,
        vec!["rtpSender.closed", "rtpReceiver.closed", "peer.closed"]
    );

    // No packet reaches anything after the close.
    let mut transport = TestTransport::default();
    room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, 1), &mut transport);
    assert!(transport.rtp.is_empty());
}

#[test]
fn test_room_close_is_terminal() {
    let (mut room, _setup_notifier, _sender_ssrc) = two_peer_room();
    let mut notifier = TestNotifier::default();

    room.close(&mut notifier);
    assert_eq!(room.state(), RoomState::Closed);
    assert!(notifier.notifications.iter().any(|n| n.event == "room.closed"));

    // Terminal: no admission, no routing.
    assert!(matches!(
        room.create_peer(9),
        Err(Error::InvalidState(_))
    ));
    let mut transport = TestTransport::default();
    room.handle_rtp(1, &rtp_packet_bytes(0xaaaa, 101, 1), &mut transport);
    assert!(transport.rtp.is_empty());

    // Idempotent.
    room.close(&mut notifier);
}
