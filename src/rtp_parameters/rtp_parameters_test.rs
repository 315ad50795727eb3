use super::*;

fn codec(
    kind: MediaKind,
    mime_type: &str,
    preferred_payload_type: Option<u8>,
    clock_rate: u32,
    channels: Option<u16>,
) -> RtpCodecCapability {
    RtpCodecCapability {
        kind,
        mime_type: mime_type.to_owned(),
        preferred_payload_type,
        clock_rate,
        channels,
        parameters: BTreeMap::new(),
        rtcp_feedback: vec![],
    }
}

fn room_capabilities() -> RtpCapabilities {
    let mut opus = codec(MediaKind::Audio, "audio/opus", Some(100), 48000, Some(2));
    opus.rtcp_feedback = vec![RtcpFeedback::new("nack", "")];

    let mut vp8 = codec(MediaKind::Video, "video/VP8", Some(101), 90000, None);
    vp8.rtcp_feedback = vec![
        RtcpFeedback::new("nack", ""),
        RtcpFeedback::new("nack", "pli"),
        RtcpFeedback::new("ccm", "fir"),
    ];

    let mut rtx = codec(MediaKind::Video, "video/rtx", Some(102), 90000, None);
    rtx.parameters.insert("apt".into(), "101".into());

    RtpCapabilities {
        codecs: vec![opus, vp8, rtx],
        header_extensions: vec![
            RtpHeaderExtension {
                kind: MediaKind::Audio,
                uri: "urn:ietf:params:rtp-hdrext:ssrc-audio-level".to_owned(),
                preferred_id: 1,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: "urn:3gpp:video-orientation".to_owned(),
                preferred_id: 4,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
        ],
    }
}

#[test]
fn test_intersect_preserves_room_order_and_payload_types() {
    let room = room_capabilities();

    // The peer offers the codecs in reverse order with its own payload types.
    let mut vp8 = codec(MediaKind::Video, "video/vp8", Some(120), 90000, None);
    vp8.rtcp_feedback = vec![
        RtcpFeedback::new("nack", "pli"),
        RtcpFeedback::new("goog-remb", ""),
    ];
    let offered = RtpCapabilities {
        codecs: vec![
            vp8,
            codec(MediaKind::Audio, "audio/OPUS", Some(121), 48000, Some(2)),
        ],
        header_extensions: vec![],
    };

    let negotiated = room.intersect(&offered);

    assert_eq!(negotiated.codecs.len(), 2);
    assert_eq!(negotiated.codecs[0].mime_type, "audio/opus");
    assert_eq!(negotiated.codecs[0].preferred_payload_type, Some(100));
    assert_eq!(negotiated.codecs[1].mime_type, "video/VP8");
    assert_eq!(negotiated.codecs[1].preferred_payload_type, Some(101));

    // Feedback is the intersection, in room order.
    assert_eq!(
        negotiated.codecs[1].rtcp_feedback,
        vec![RtcpFeedback::new("nack", "pli")]
    );
    // Opus feedback: the peer offered none, so nothing survives.
    assert!(negotiated.codecs[0].rtcp_feedback.is_empty());
}

#[test]
fn test_intersect_requires_matching_clock_rate_and_channels() {
    let room = room_capabilities();

    let offered = RtpCapabilities {
        codecs: vec![
            // Wrong clock rate.
            codec(MediaKind::Video, "video/VP8", None, 30000, None),
            // Wrong channel count.
            codec(MediaKind::Audio, "audio/opus", None, 48000, Some(1)),
        ],
        header_extensions: vec![],
    };

    let negotiated = room.intersect(&offered);
    assert!(negotiated.codecs.is_empty());
}

#[test]
fn test_intersect_rtx_requires_matched_apt() {
    let room = room_capabilities();

    // RTX offered alongside its media codec: both survive.
    let mut peer_rtx = codec(MediaKind::Video, "video/rtx", Some(97), 90000, None);
    peer_rtx.parameters.insert("apt".into(), "96".into());
    let offered = RtpCapabilities {
        codecs: vec![
            codec(MediaKind::Video, "video/VP8", Some(96), 90000, None),
            peer_rtx,
        ],
        header_extensions: vec![],
    };
    let negotiated = room.intersect(&offered);
    assert_eq!(negotiated.codecs.len(), 2);
    assert_eq!(negotiated.codecs[1].mime_type, "video/rtx");
    assert_eq!(negotiated.codecs[1].preferred_payload_type, Some(102));

    // RTX whose apt points at a codec that did not match is dropped.
    let mut dangling_rtx = codec(MediaKind::Video, "video/rtx", Some(97), 90000, None);
    dangling_rtx.parameters.insert("apt".into(), "95".into());
    let offered = RtpCapabilities {
        codecs: vec![
            codec(MediaKind::Video, "video/VP8", Some(96), 90000, None),
            dangling_rtx,
        ],
        header_extensions: vec![],
    };
    let negotiated = room.intersect(&offered);
    assert_eq!(negotiated.codecs.len(), 1);
    assert_eq!(negotiated.codecs[0].mime_type, "video/VP8");
}

#[test]
fn test_intersect_header_extensions_by_uri() {
    let room = room_capabilities();

    let offered = RtpCapabilities {
        codecs: vec![codec(MediaKind::Video, "video/VP8", None, 90000, None)],
        header_extensions: vec![
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: "urn:3gpp:video-orientation".to_owned(),
                preferred_id: 9,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: "http://example.com/unknown-extension".to_owned(),
                preferred_id: 10,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
        ],
    };

    let negotiated = room.intersect(&offered);
    assert_eq!(negotiated.header_extensions.len(), 1);
    assert_eq!(negotiated.header_extensions[0].uri, "urn:3gpp:video-orientation");
    // The room's id wins over the peer's.
    assert_eq!(negotiated.header_extensions[0].preferred_id, 4);
}

#[test]
fn test_validate_parameters() {
    let capabilities = room_capabilities();

    let valid = RtpParameters {
        mux_id: None,
        codecs: vec![RtpCodecParameters {
            mime_type: "video/VP8".to_owned(),
            payload_type: 101,
            clock_rate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_feedback: vec![],
        }],
        header_extensions: vec![RtpHeaderExtensionParameters {
            uri: "urn:3gpp:video-orientation".to_owned(),
            id: 4,
            encrypt: false,
        }],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(0xaaaa),
            rtx: None,
        }],
        rtcp: None,
    };
    assert!(valid.validate(&capabilities).is_ok());

    // Unknown payload type.
    let mut wrong_pt = valid.clone();
    wrong_pt.codecs[0].payload_type = 96;
    assert!(wrong_pt.validate(&capabilities).is_err());

    // Unknown header extension id.
    let mut wrong_ext = valid.clone();
    wrong_ext.header_extensions[0].id = 9;
    assert!(wrong_ext.validate(&capabilities).is_err());

    // Missing encoding SSRC.
    let mut no_ssrc = valid.clone();
    no_ssrc.encodings[0].ssrc = None;
    assert!(no_ssrc.validate(&capabilities).is_err());

    // No codecs at all.
    let mut empty = valid;
    empty.codecs.clear();
    assert!(empty.validate(&capabilities).is_err());
}

#[test]
fn test_parameters_ssrcs_include_rtx() {
    let parameters = RtpParameters {
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(1),
            rtx: Some(RtxParameters { ssrc: 2 }),
        }],
        ..Default::default()
    };

    assert_eq!(parameters.media_ssrc(), Some(1));
    assert_eq!(parameters.ssrcs(), vec![1, 2]);
}
