#[cfg(test)]
mod rtp_parameters_test;

pub(crate) mod fmtp;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Media kind of a codec, stream or header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// A single RTCP feedback capability at codec scope, e.g. `nack` or
/// `ccm fir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpFeedback {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameter: String,
}

impl RtcpFeedback {
    pub fn new(typ: &str, parameter: &str) -> Self {
        RtcpFeedback {
            typ: typ.to_owned(),
            parameter: parameter.to_owned(),
        }
    }
}

/// A codec a room or peer is able to receive, together with its codec-specific
/// parameters and RTCP feedback set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    /// MIME type, e.g. `audio/opus`. Matching is case-insensitive.
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    /// Whether this is a retransmission codec (`*/rtx`).
    pub fn is_rtx(&self) -> bool {
        self.mime_type
            .rsplit('/')
            .next()
            .map_or(false, |name| name.eq_ignore_ascii_case("rtx"))
    }

    /// The associated payload type of an RTX codec, from its `apt` parameter.
    pub fn apt(&self) -> Option<u8> {
        self.parameters.get("apt").and_then(|v| v.parse().ok())
    }

    /// Whether `other` describes the same codec: MIME type (case-insensitive),
    /// clock rate, channel count for audio, and codec-specific parameters
    /// under the codec's matching rule.
    pub fn matches(&self, other: &RtpCodecCapability) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if !self.mime_type.eq_ignore_ascii_case(&other.mime_type) {
            return false;
        }
        if self.clock_rate != other.clock_rate {
            return false;
        }
        if self.kind == MediaKind::Audio
            && self.channels.unwrap_or(1) != other.channels.unwrap_or(1)
        {
            return false;
        }
        fmtp::params_match(&self.mime_type, &self.parameters, &other.parameters)
    }
}

/// Direction in which a header extension may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpHeaderExtensionDirection {
    #[default]
    #[serde(rename = "sendrecv")]
    SendRecv,
    #[serde(rename = "sendonly")]
    SendOnly,
    #[serde(rename = "recvonly")]
    RecvOnly,
    Inactive,
}

/// A header extension a room or peer supports for a given media kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    pub kind: MediaKind,
    pub uri: String,
    pub preferred_id: u8,
    #[serde(default)]
    pub preferred_encrypt: bool,
    #[serde(default)]
    pub direction: RtpHeaderExtensionDirection,
}

/// The ordered codec and header-extension lists a room or peer can handle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

impl RtpCapabilities {
    /// Computes a peer's negotiated capabilities as the intersection of these
    /// (room) capabilities with the peer's offer.
    ///
    /// The result preserves the room's codec order and, for each codec, the
    /// room's payload-type assignment; the peer's preferred payload types are
    /// discarded. Feedback types are the intersection of both sets. Header
    /// extensions are intersected by URI and the room's id wins. An RTX codec
    /// survives only when its `apt` target survived and the peer offered a
    /// matching RTX codec of its own.
    ///
    /// This is a pure function of its inputs.
    pub fn intersect(&self, offered: &RtpCapabilities) -> RtpCapabilities {
        let mut codecs: Vec<RtpCodecCapability> = vec![];

        for room_codec in &self.codecs {
            if room_codec.is_rtx() {
                let apt = match room_codec.apt() {
                    Some(apt) => apt,
                    None => continue,
                };
                let target = match codecs
                    .iter()
                    .find(|c| c.preferred_payload_type == Some(apt))
                {
                    Some(target) => target.clone(),
                    None => continue,
                };

                let peer_has_rtx = offered.codecs.iter().any(|pc| {
                    pc.is_rtx()
                        && pc.clock_rate == room_codec.clock_rate
                        && pc.apt().map_or(false, |peer_apt| {
                            offered.codecs.iter().any(|pt| {
                                pt.preferred_payload_type == Some(peer_apt) && target.matches(pt)
                            })
                        })
                });
                if peer_has_rtx {
                    codecs.push(room_codec.clone());
                }
            } else if let Some(peer_codec) = offered
                .codecs
                .iter()
                .find(|pc| !pc.is_rtx() && room_codec.matches(pc))
            {
                let mut negotiated = room_codec.clone();
                negotiated.rtcp_feedback = room_codec
                    .rtcp_feedback
                    .iter()
                    .filter(|fb| peer_codec.rtcp_feedback.contains(fb))
                    .cloned()
                    .collect();
                codecs.push(negotiated);
            }
        }

        let header_extensions = self
            .header_extensions
            .iter()
            .filter(|room_ext| {
                offered
                    .header_extensions
                    .iter()
                    .any(|peer_ext| peer_ext.uri == room_ext.uri && peer_ext.kind == room_ext.kind)
            })
            .cloned()
            .collect();

        RtpCapabilities {
            codecs,
            header_extensions,
        }
    }
}

/// A codec entry inside [`RtpParameters`], carrying the effective payload
/// type of a concrete stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecParameters {
    /// Whether this is a retransmission codec (`*/rtx`).
    pub fn is_rtx(&self) -> bool {
        self.mime_type
            .rsplit('/')
            .next()
            .map_or(false, |name| name.eq_ignore_ascii_case("rtx"))
    }
}

/// A negotiated header extension of a concrete stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtensionParameters {
    pub uri: String,
    pub id: u8,
    #[serde(default)]
    pub encrypt: bool,
}

/// RTX stream description inside an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtxParameters {
    pub ssrc: u32,
}

/// One encoding (SSRC) of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtx: Option<RtxParameters>,
}

/// RTCP session parameters of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(default)]
    pub reduced_size: bool,
}

/// Per-stream parameters of an RTP receiver or sender.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_id: Option<String>,
    #[serde(default)]
    pub codecs: Vec<RtpCodecParameters>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtcp: Option<RtcpParameters>,
}

impl RtpParameters {
    /// Validates these parameters against a peer's negotiated capabilities:
    /// every codec payload type and every header-extension id must appear
    /// there, and every encoding must carry an SSRC.
    pub fn validate(&self, capabilities: &RtpCapabilities) -> Result<()> {
        if self.codecs.is_empty() {
            return Err(Error::InvalidParameters("no codecs given".into()));
        }

        for codec in &self.codecs {
            let known = capabilities.codecs.iter().any(|cap| {
                cap.preferred_payload_type == Some(codec.payload_type)
                    && cap.mime_type.eq_ignore_ascii_case(&codec.mime_type)
            });
            if !known {
                return Err(Error::InvalidParameters(format!(
                    "codec {} with payload type {} not negotiated",
                    codec.mime_type, codec.payload_type
                )));
            }
        }

        for ext in &self.header_extensions {
            let known = capabilities
                .header_extensions
                .iter()
                .any(|cap| cap.preferred_id == ext.id && cap.uri == ext.uri);
            if !known {
                return Err(Error::InvalidParameters(format!(
                    "header extension {} with id {} not negotiated",
                    ext.uri, ext.id
                )));
            }
        }

        if self.encodings.is_empty() {
            return Err(Error::InvalidParameters("no encodings given".into()));
        }
        for encoding in &self.encodings {
            if encoding.ssrc.is_none() {
                return Err(Error::InvalidParameters(
                    "encoding is missing its ssrc".into(),
                ));
            }
        }

        Ok(())
    }

    /// The media SSRC of the first encoding.
    pub fn media_ssrc(&self) -> Option<u32> {
        self.encodings.first().and_then(|e| e.ssrc)
    }

    /// All SSRCs carried by the encodings, including RTX SSRCs.
    pub fn ssrcs(&self) -> Vec<u32> {
        let mut out = vec![];
        for encoding in &self.encodings {
            if let Some(ssrc) = encoding.ssrc {
                out.push(ssrc);
            }
            if let Some(rtx) = &encoding.rtx {
                out.push(rtx.ssrc);
            }
        }
        out
    }

    /// The payload types of all codecs in these parameters.
    pub fn payload_types(&self) -> Vec<u8> {
        self.codecs.iter().map(|c| c.payload_type).collect()
    }
}
