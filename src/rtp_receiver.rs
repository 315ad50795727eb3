use serde::Serialize;
use serde_json::json;

use rtcp::sender_report::SenderReport;
use rtcp::source_description::{SdesType, SourceDescriptionChunk};
use rtcp::transport_feedbacks::transport_layer_nack::NackPair;

use crate::error::{Error, Result};
use crate::retransmission_buffer::{RetransmissionBuffer, RetransmissionBufferOptions};
use crate::rtp_parameters::{MediaKind, RtpCapabilities, RtpParameters};
use crate::{PeerId, RtpReceiverId};

/// Lifecycle of an RTP receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RtpReceiverState {
    AwaitingParameters,
    Active,
    Closed,
}

/// The transmission statistics announced by the publisher's most recent
/// RTCP sender report.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderReportInfo {
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

/// One inbound RTP stream published by a peer.
///
/// A receiver starts without parameters; once the control plane applies
/// parameters that validate against the owning peer's negotiated
/// capabilities it becomes active and the room fans its packets out to the
/// dependent senders. Every accepted data packet is copied into a bounded
/// retransmission history that answers NACK requests.
pub struct RtpReceiver {
    id: RtpReceiverId,
    peer_id: PeerId,
    kind: MediaKind,
    state: RtpReceiverState,
    parameters: Option<RtpParameters>,
    history: RetransmissionBuffer,
    cname: Option<String>,
    last_sender_report: Option<SenderReportInfo>,
}

impl RtpReceiver {
    pub fn new(id: RtpReceiverId, peer_id: PeerId, kind: MediaKind) -> Self {
        RtpReceiver {
            id,
            peer_id,
            kind,
            state: RtpReceiverState::AwaitingParameters,
            parameters: None,
            history: RetransmissionBuffer::new(RetransmissionBufferOptions::default()),
            cname: None,
            last_sender_report: None,
        }
    }

    pub fn id(&self) -> RtpReceiverId {
        self.id
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn state(&self) -> RtpReceiverState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RtpReceiverState::Active
    }

    pub fn parameters(&self) -> Option<&RtpParameters> {
        self.parameters.as_ref()
    }

    /// The media SSRC of the first encoding, once parameters are applied.
    pub fn media_ssrc(&self) -> Option<u32> {
        self.parameters.as_ref().and_then(|p| p.media_ssrc())
    }

    /// Whether this receiver owns the given SSRC (media or RTX).
    pub fn handles_ssrc(&self, ssrc: u32) -> bool {
        self.parameters
            .as_ref()
            .map_or(false, |p| p.ssrcs().contains(&ssrc))
    }

    /// Applies stream parameters, validating them against the owning peer's
    /// negotiated capabilities. A first application activates the receiver;
    /// re-application while active replaces the parameters atomically (a
    /// validation failure leaves the previous parameters in place).
    pub fn set_parameters(
        &mut self,
        parameters: RtpParameters,
        capabilities: &RtpCapabilities,
    ) -> Result<()> {
        if self.state == RtpReceiverState::Closed {
            return Err(Error::InvalidState("receiver is closed".into()));
        }

        parameters.validate(capabilities)?;

        self.parameters = Some(parameters);
        self.state = RtpReceiverState::Active;
        Ok(())
    }

    /// Accepts an incoming data packet, appending it to the retransmission
    /// history. Returns false when the packet must not be fanned out (the
    /// receiver is not active, or the payload type was never negotiated).
    pub fn receive_packet(&mut self, packet: &rtp::Packet) -> bool {
        if self.state != RtpReceiverState::Active {
            return false;
        }
        let parameters = match &self.parameters {
            Some(parameters) => parameters,
            None => return false,
        };

        if !parameters
            .payload_types()
            .contains(&packet.header.payload_type)
        {
            log::warn!(
                "receiver {}: discarding packet with unknown payload type {}",
                self.id,
                packet.header.payload_type
            );
            return false;
        }

        self.history.insert(packet);
        true
    }

    /// Resolves NACK pairs against the retransmission history, pushing owned
    /// copies of the recoverable packets into `out`. Bit `i` of the mask
    /// selects sequence number `pid + i` (serial-number arithmetic); numbers
    /// missing from the history are skipped.
    pub fn resolve_nack(&self, nacks: &[NackPair], out: &mut Vec<rtp::Packet>) {
        if self.state != RtpReceiverState::Active {
            return;
        }

        for pair in nacks {
            for i in 0..16u16 {
                if pair.lost_packets & (1 << i) == 0 {
                    continue;
                }
                let seq = pair.packet_id.wrapping_add(i);
                match self.history.get(seq) {
                    Some(packet) => out.push(packet.clone()),
                    None => {
                        log::debug!(
                            "receiver {}: cannot resolve NACK for sequence number {seq}",
                            self.id
                        );
                    }
                }
            }
        }
    }

    pub fn on_sender_report(&mut self, report: &SenderReport) {
        if self.state != RtpReceiverState::Active {
            return;
        }
        self.last_sender_report = Some(SenderReportInfo {
            ntp_time: report.ntp_time,
            rtp_time: report.rtp_time,
            packet_count: report.packet_count,
            octet_count: report.octet_count,
        });
    }

    pub fn on_sdes_chunk(&mut self, chunk: &SourceDescriptionChunk) {
        if self.state != RtpReceiverState::Active {
            return;
        }
        for item in &chunk.items {
            if item.sdes_type == SdesType::SdesCname {
                self.cname = String::from_utf8(item.text.to_vec()).ok();
            }
        }
    }

    /// Transitions to closed; every subsequent input is a no-op.
    pub fn close(&mut self) {
        self.state = RtpReceiverState::Closed;
    }

    pub fn dump(&self) -> serde_json::Value {
        json!({
            "rtpReceiverId": self.id,
            "kind": self.kind,
            "state": self.state,
            "rtpParameters": self.parameters,
            "cname": self.cname,
            "lastSenderReport": self.last_sender_report,
        })
    }
}
