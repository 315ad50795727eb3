use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use util::marshal::Marshal;

use crate::rtp_parameters::{MediaKind, RtpParameters};
use crate::transport::TransportSink;
use crate::{PeerId, RtpReceiverId, RtpSenderId};

/// Lifecycle of an RTP sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RtpSenderState {
    Inactive,
    Active,
    Closed,
}

/// One outbound RTP stream toward a subscriber peer, fed by a receiver of
/// another peer.
///
/// A sender rewrites the SSRC to its own allocation and maps the payload
/// type through its receiver-to-sender table; marker bit, sequence number,
/// timestamp and header-extension bytes pass through unchanged. The room
/// creates senders automatically during fan-out construction.
pub struct RtpSender {
    id: RtpSenderId,
    peer_id: PeerId,
    source_peer_id: PeerId,
    source_receiver_id: RtpReceiverId,
    kind: MediaKind,
    state: RtpSenderState,
    parameters: RtpParameters,
    /// Receiver payload type to sender payload type. The identity map under
    /// room-wide assignment, kept explicit for asymmetric negotiation.
    payload_type_map: BTreeMap<u8, u8>,
    ssrc: u32,
}

impl RtpSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RtpSenderId,
        peer_id: PeerId,
        source_peer_id: PeerId,
        source_receiver_id: RtpReceiverId,
        kind: MediaKind,
        parameters: RtpParameters,
        payload_type_map: BTreeMap<u8, u8>,
        ssrc: u32,
    ) -> Self {
        RtpSender {
            id,
            peer_id,
            source_peer_id,
            source_receiver_id,
            kind,
            state: RtpSenderState::Inactive,
            parameters,
            payload_type_map,
            ssrc,
        }
    }

    pub fn id(&self) -> RtpSenderId {
        self.id
    }

    /// The subscriber peer this sender delivers to.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn source_peer_id(&self) -> PeerId {
        self.source_peer_id
    }

    pub fn source_receiver_id(&self) -> RtpReceiverId {
        self.source_receiver_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> RtpSenderState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RtpSenderState::Active
    }

    pub fn parameters(&self) -> &RtpParameters {
        &self.parameters
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Whether this sender owns the given outbound SSRC.
    pub fn handles_ssrc(&self, ssrc: u32) -> bool {
        self.ssrc == ssrc
    }

    /// Activated by the room once the sender is wired into the fan-out maps
    /// and announced to the subscriber's transport.
    pub fn activate(&mut self) {
        if self.state == RtpSenderState::Inactive {
            self.state = RtpSenderState::Active;
        }
    }

    /// Replaces the receiver-side payload-type mapping after the source
    /// receiver re-applied its parameters.
    pub fn update_payload_type_map(&mut self, payload_type_map: BTreeMap<u8, u8>) {
        if self.state == RtpSenderState::Closed {
            return;
        }
        self.payload_type_map = payload_type_map;
    }

    /// Rewrites a packet from the source receiver and hands it to the
    /// subscriber's transport.
    pub fn route(&self, packet: &rtp::Packet, transport: &mut dyn TransportSink) {
        if self.state != RtpSenderState::Active {
            return;
        }

        let payload_type = match self.payload_type_map.get(&packet.header.payload_type) {
            Some(payload_type) => *payload_type,
            None => {
                log::warn!(
                    "sender {}: no payload type mapping for {}",
                    self.id,
                    packet.header.payload_type
                );
                return;
            }
        };

        let mut out = packet.clone();
        out.header.ssrc = self.ssrc;
        out.header.payload_type = payload_type;

        match out.marshal() {
            Ok(data) => transport.send_rtp(self.peer_id, data),
            Err(err) => {
                log::warn!("sender {}: failed to serialize packet: {err}", self.id);
            }
        }
    }

    /// Transitions to closed; every subsequent input is a no-op.
    pub fn close(&mut self) {
        self.state = RtpSenderState::Closed;
    }

    pub fn dump(&self) -> serde_json::Value {
        json!({
            "rtpSenderId": self.id,
            "kind": self.kind,
            "state": self.state,
            "ssrc": self.ssrc,
            "rtpParameters": self.parameters,
            "sourcePeerId": self.source_peer_id,
            "sourceRtpReceiverId": self.source_receiver_id,
        })
    }
}
