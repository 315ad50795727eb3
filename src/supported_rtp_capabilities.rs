use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::rtp_parameters::{
    MediaKind, RtcpFeedback, RtpCapabilities, RtpCodecCapability, RtpHeaderExtension,
    RtpHeaderExtensionDirection,
};

lazy_static! {
    /// Process-wide table of the codecs and header extensions this SFU can
    /// route. Built once at initialization and never mutated; room
    /// capabilities are carved out of it (see `Room::set_capabilities`).
    pub static ref SUPPORTED_RTP_CAPABILITIES: RtpCapabilities = supported_rtp_capabilities();
}

fn video_rtcp_feedback() -> Vec<RtcpFeedback> {
    vec![
        RtcpFeedback::new("nack", ""),
        RtcpFeedback::new("nack", "pli"),
        RtcpFeedback::new("nack", "sli"),
        RtcpFeedback::new("nack", "rpsi"),
        RtcpFeedback::new("ccm", "fir"),
        RtcpFeedback::new("ccm", "tmmbr"),
        RtcpFeedback::new("goog-remb", ""),
    ]
}

fn supported_rtp_capabilities() -> RtpCapabilities {
    RtpCapabilities {
        codecs: vec![
            RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/opus".to_owned(),
                preferred_payload_type: None,
                clock_rate: 48000,
                channels: Some(2),
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![RtcpFeedback::new("nack", "")],
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
                kind: MediaKind::Audio,
                mime_type: "audio/PCMA".to_owned(),
                preferred_payload_type: Some(8),
                clock_rate: 8000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
            RtpCodecCapability {
                kind: MediaKind::Audio,
                mime_type: "audio/G722".to_owned(),
                preferred_payload_type: Some(9),
                clock_rate: 8000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/VP8".to_owned(),
                preferred_payload_type: None,
                clock_rate: 90000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: video_rtcp_feedback(),
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/VP9".to_owned(),
                preferred_payload_type: None,
                clock_rate: 90000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: video_rtcp_feedback(),
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/H264".to_owned(),
                preferred_payload_type: None,
                clock_rate: 90000,
                channels: None,
                parameters: [
                    ("packetization-mode".to_owned(), "1".to_owned()),
                    ("profile-level-id".to_owned(), "42e01f".to_owned()),
                ]
                .into_iter()
                .collect(),
                rtcp_feedback: video_rtcp_feedback(),
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/rtx".to_owned(),
                preferred_payload_type: None,
                clock_rate: 90000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
            RtpCodecCapability {
                kind: MediaKind::Video,
                mime_type: "video/ulpfec".to_owned(),
                preferred_payload_type: None,
                clock_rate: 90000,
                channels: None,
                parameters: BTreeMap::new(),
                rtcp_feedback: vec![],
            },
        ],
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
                uri: "urn:ietf:params:rtp-hdrext:toffset".to_owned(),
                preferred_id: 2,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Audio,
                uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time".to_owned(),
                preferred_id: 3,
                preferred_encrypt: false,
                direction: RtpHeaderExtensionDirection::SendRecv,
            },
            RtpHeaderExtension {
                kind: MediaKind::Video,
                uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time".to_owned(),
                preferred_id: 3,
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
