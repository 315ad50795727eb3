use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::rtp_parameters::RtpCapabilities;
use crate::rtp_receiver::RtpReceiver;
use crate::rtp_sender::RtpSender;
use crate::{PeerId, RtpReceiverId, RtpSenderId};

/// Lifecycle of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerState {
    Joining,
    Active,
    Closed,
}

/// A conference participant: its negotiated capabilities plus the RTP
/// receivers it publishes with and the RTP senders it subscribes with.
///
/// The peer owns its children exclusively; the room references them through
/// (peerId, receiverId/senderId) identities. RTCP arriving on the peer's
/// transport is dispatched by SSRC: SR/BYE/SDES to the matching receiver,
/// RR and feedback to the matching sender.
pub struct Peer {
    id: PeerId,
    state: PeerState,
    capabilities: Option<RtpCapabilities>,
    pub(crate) receivers: BTreeMap<RtpReceiverId, RtpReceiver>,
    pub(crate) senders: BTreeMap<RtpSenderId, RtpSender>,
}

impl Peer {
    pub fn new(id: PeerId) -> Self {
        Peer {
            id,
            state: PeerState::Joining,
            capabilities: None,
            receivers: BTreeMap::new(),
            senders: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeerState::Closed
    }

    pub fn capabilities(&self) -> Option<&RtpCapabilities> {
        self.capabilities.as_ref()
    }

    /// Records the peer's negotiated capabilities. They are immutable once
    /// set.
    pub fn set_capabilities(&mut self, capabilities: RtpCapabilities) -> Result<()> {
        if self.state == PeerState::Closed {
            return Err(Error::InvalidState("peer is closed".into()));
        }
        if self.capabilities.is_some() {
            return Err(Error::InvalidState("peer capabilities already set".into()));
        }

        self.capabilities = Some(capabilities);
        self.state = PeerState::Active;
        Ok(())
    }

    /// The receiver owning the given inbound SSRC (media or RTX).
    pub fn receiver_id_by_ssrc(&self, ssrc: u32) -> Option<RtpReceiverId> {
        self.receivers
            .values()
            .find(|r| r.handles_ssrc(ssrc))
            .map(|r| r.id())
    }

    /// The sender owning the given outbound SSRC.
    pub fn sender_id_by_ssrc(&self, ssrc: u32) -> Option<RtpSenderId> {
        self.senders
            .values()
            .find(|s| s.handles_ssrc(ssrc))
            .map(|s| s.id())
    }

    /// Marks the peer and every remaining child closed. Removal from the
    /// fan-out maps and the close notifications are driven by the room, which
    /// closes senders first, then receivers, then the peer itself.
    pub fn close(&mut self) {
        for sender in self.senders.values_mut() {
            sender.close();
        }
        for receiver in self.receivers.values_mut() {
            receiver.close();
        }
        self.state = PeerState::Closed;
    }

    pub fn dump(&self) -> serde_json::Value {
        json!({
            "peerId": self.id,
            "state": self.state,
            "capabilities": self.capabilities,
            "rtpReceivers": self.receivers.values().map(|r| r.dump()).collect::<Vec<_>>(),
            "rtpSenders": self.senders.values().map(|s| s.dump()).collect::<Vec<_>>(),
        })
    }
}
