#[cfg(test)]
mod room_test;

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use util::marshal::{Marshal, Unmarshal};

use rtcp::goodbye::Goodbye;
use rtcp::packet::Packet as RtcpPacket;
use rtcp::payload_feedbacks::application_layer_feedback::ApplicationLayerFeedback;
use rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::reference_picture_selection_indication::ReferencePictureSelectionIndication;
use rtcp::payload_feedbacks::slice_loss_indication::SliceLossIndication;
use rtcp::raw_packet::RawPacket;
use rtcp::receiver_report::ReceiverReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::SourceDescription;
use rtcp::transport_feedbacks::tmmb::{TmmbEntry, TmmbNotification, TmmbRequest};
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;

use crate::channel::{Notification, NotificationSink};
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::rtp_parameters::{
    MediaKind, RtcpParameters, RtpCapabilities, RtpCodecCapability, RtpCodecParameters,
    RtpEncodingParameters, RtpHeaderExtensionParameters, RtpParameters,
};
use crate::rtp_receiver::RtpReceiver;
use crate::rtp_sender::RtpSender;
use crate::supported_rtp_capabilities::SUPPORTED_RTP_CAPABILITIES;
use crate::transport::TransportSink;
use crate::{PeerId, RoomId, RtpReceiverId, RtpSenderId};

/// The RTP dynamic payload-type range, in allocation order.
const DYNAMIC_PAYLOAD_TYPES: [u8; 32] = [
    96, 97, 98, 99, 100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114,
    115, 116, 117, 118, 119, 120, 121, 122, 123, 124, 125, 126, 127,
];

/// Attempts to draw an SSRC that does not collide with the room's active set.
const SSRC_ALLOCATION_RETRIES: usize = 100;

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomState {
    Open,
    Closed,
}

/// A set of peers exchanging media through this SFU.
///
/// The room negotiates capabilities, owns the peers, and maintains the
/// bipartite receiver-to-senders fan-out map together with its inverse. Both
/// maps store identities, never references; iteration resolves them through
/// the owning peers and tolerates stale entries. Only the room calls across
/// peers.
pub struct Room {
    id: RoomId,
    state: RoomState,
    capabilities: RtpCapabilities,
    peers: BTreeMap<PeerId, Peer>,
    /// Receiver to its dependent senders, in creation order.
    fanout: BTreeMap<(PeerId, RtpReceiverId), Vec<(PeerId, RtpSenderId)>>,
    /// Sender back to its source receiver.
    reverse: BTreeMap<(PeerId, RtpSenderId), (PeerId, RtpReceiverId)>,
    /// Every SSRC currently known in the room (published or allocated).
    active_ssrcs: BTreeSet<u32>,
    next_sender_id: RtpSenderId,
    /// Scratch storage for NACK resolution, reused across calls.
    retransmission_container: Vec<rtp::Packet>,
}

impl Room {
    /// Creates a room whose capabilities are the supported table restricted
    /// to `media_codecs`, with payload types assigned deterministically.
    pub fn new(id: RoomId, media_codecs: &[RtpCodecCapability]) -> Result<Self> {
        let capabilities = Room::set_capabilities(media_codecs)?;

        Ok(Room {
            id,
            state: RoomState::Open,
            capabilities,
            peers: BTreeMap::new(),
            fanout: BTreeMap::new(),
            reverse: BTreeMap::new(),
            active_ssrcs: BTreeSet::new(),
            next_sender_id: 1,
            retransmission_container: vec![],
        })
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn capabilities(&self) -> &RtpCapabilities {
        &self.capabilities
    }

    pub fn peer(&self, peer_id: PeerId) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    /// Builds the room capabilities: the supported-capabilities table
    /// restricted to the caller's media codecs (matched by name, clock rate,
    /// channels and codec-specific parameters), with caller-provided
    /// parameters and feedback copied in and dynamic payload types assigned.
    fn set_capabilities(media_codecs: &[RtpCodecCapability]) -> Result<RtpCapabilities> {
        let supported = &*SUPPORTED_RTP_CAPABILITIES;

        let mut codecs = vec![];
        for media_codec in media_codecs {
            let supported_codec = supported
                .codecs
                .iter()
                .find(|c| c.matches(media_codec))
                .ok_or_else(|| {
                    Error::InvalidParameters(format!(
                        "unsupported media codec {}",
                        media_codec.mime_type
                    ))
                })?;

            let mut codec = supported_codec.clone();
            for (key, value) in &media_codec.parameters {
                codec.parameters.insert(key.clone(), value.clone());
            }
            if !media_codec.rtcp_feedback.is_empty() {
                codec.rtcp_feedback = media_codec.rtcp_feedback.clone();
            }
            codec.preferred_payload_type = media_codec
                .preferred_payload_type
                .or(supported_codec.preferred_payload_type);

            codecs.push(codec);
        }

        Room::assign_payload_types(&mut codecs)?;

        Ok(RtpCapabilities {
            codecs,
            header_extensions: supported.header_extensions.clone(),
        })
    }

    /// Assigns a payload type to every codec: a declared, unconflicting
    /// preference is preserved (static types included); otherwise the first
    /// unused value of the dynamic pool is taken, in iteration order. RTX
    /// `apt` references are remapped to the assigned values. Deterministic
    /// given the codec list.
    fn assign_payload_types(codecs: &mut [RtpCodecCapability]) -> Result<()> {
        let declared: Vec<Option<u8>> = codecs.iter().map(|c| c.preferred_payload_type).collect();

        let mut used = BTreeSet::new();
        for codec in codecs.iter_mut() {
            let payload_type = match codec.preferred_payload_type {
                Some(pt) if !used.contains(&pt) => pt,
                _ => DYNAMIC_PAYLOAD_TYPES
                    .iter()
                    .copied()
                    .find(|pt| !used.contains(pt))
                    .ok_or_else(|| {
                        Error::ResourceExhaustion("dynamic payload-type pool is empty".into())
                    })?,
            };
            used.insert(payload_type);
            codec.preferred_payload_type = Some(payload_type);
        }

        for i in 0..codecs.len() {
            if !codecs[i].is_rtx() {
                continue;
            }
            let apt = codecs[i].apt().ok_or_else(|| {
                Error::InvalidParameters(format!(
                    "rtx codec {} is missing its apt parameter",
                    codecs[i].mime_type
                ))
            })?;
            let target = (0..codecs.len())
                .find(|&j| !codecs[j].is_rtx() && declared[j] == Some(apt))
                .ok_or_else(|| {
                    Error::InvalidParameters(format!(
                        "rtx codec apt {apt} does not reference a media codec"
                    ))
                })?;
            if let Some(new_pt) = codecs[target].preferred_payload_type {
                codecs[i].parameters.insert("apt".into(), new_pt.to_string());
            }
        }

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state != RoomState::Open {
            return Err(Error::InvalidState("room is closed".into()));
        }
        Ok(())
    }

    /// Admits a new peer. Its capabilities arrive with a later
    /// `setPeerCapabilities` request.
    pub fn create_peer(&mut self, peer_id: PeerId) -> Result<()> {
        self.ensure_open()?;
        if self.peers.contains_key(&peer_id) {
            return Err(Error::InvalidParameters(format!(
                "peer {peer_id} already exists"
            )));
        }

        self.peers.insert(peer_id, Peer::new(peer_id));
        Ok(())
    }

    /// Intersects a peer's offered capabilities with the room's and stores
    /// the result; then builds senders toward this peer for every receiver
    /// already active in the room. Returns the negotiated view.
    pub fn set_peer_capabilities(
        &mut self,
        peer_id: PeerId,
        offered: &RtpCapabilities,
        notifier: &mut dyn NotificationSink,
    ) -> Result<RtpCapabilities> {
        self.ensure_open()?;

        let negotiated = self.capabilities.intersect(offered);
        if negotiated.codecs.is_empty() {
            return Err(Error::CapabilityConflict(format!(
                "peer {peer_id} shares no codec with the room"
            )));
        }

        let peer = self
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| Error::UnknownEntity(format!("peer {peer_id} does not exist")))?;
        peer.set_capabilities(negotiated.clone())?;

        let sources: Vec<(PeerId, RtpReceiverId)> = self
            .peers
            .iter()
            .filter(|(id, _)| **id != peer_id)
            .flat_map(|(id, peer)| {
                peer.receivers
                    .values()
                    .filter(|r| r.is_active())
                    .map(move |r| (*id, r.id()))
            })
            .collect();

        for (source_peer_id, source_receiver_id) in sources {
            if let Err(err) =
                self.create_rtp_sender(peer_id, source_peer_id, source_receiver_id, notifier)
            {
                if matches!(err, Error::ResourceExhaustion(_)) {
                    let _ = self.close_peer(peer_id, notifier);
                }
                return Err(err);
            }
        }

        Ok(negotiated)
    }

    /// Declares a new inbound stream of a peer. The receiver stays inactive
    /// until its parameters are applied.
    pub fn create_rtp_receiver(
        &mut self,
        peer_id: PeerId,
        rtp_receiver_id: RtpReceiverId,
        kind: MediaKind,
    ) -> Result<()> {
        self.ensure_open()?;

        let peer = self
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| Error::UnknownEntity(format!("peer {peer_id} does not exist")))?;
        if peer.capabilities().is_none() {
            return Err(Error::InvalidState(format!(
                "peer {peer_id} has no capabilities yet"
            )));
        }
        if peer.receivers.contains_key(&rtp_receiver_id) {
            return Err(Error::InvalidParameters(format!(
                "receiver {rtp_receiver_id} already exists"
            )));
        }

        peer.receivers.insert(
            rtp_receiver_id,
            RtpReceiver::new(rtp_receiver_id, peer_id, kind),
        );
        Ok(())
    }

    /// Applies (or re-applies) the parameters of a receiver. On first
    /// activation, senders toward every other capable peer are built; on
    /// re-application the existing senders are updated in place.
    pub fn set_rtp_receiver_parameters(
        &mut self,
        peer_id: PeerId,
        rtp_receiver_id: RtpReceiverId,
        parameters: RtpParameters,
        notifier: &mut dyn NotificationSink,
    ) -> Result<()> {
        self.ensure_open()?;

        let (was_active, old_ssrcs) = {
            let peer = self
                .peers
                .get_mut(&peer_id)
                .ok_or_else(|| Error::UnknownEntity(format!("peer {peer_id} does not exist")))?;
            let capabilities = peer.capabilities().cloned().ok_or_else(|| {
                Error::InvalidState(format!("peer {peer_id} has no capabilities yet"))
            })?;
            let receiver = peer.receivers.get_mut(&rtp_receiver_id).ok_or_else(|| {
                Error::UnknownEntity(format!("receiver {rtp_receiver_id} does not exist"))
            })?;

            let was_active = receiver.is_active();
            let old_ssrcs = receiver
                .parameters()
                .map(|p| p.ssrcs())
                .unwrap_or_default();

            receiver.set_parameters(parameters.clone(), &capabilities)?;
            (was_active, old_ssrcs)
        };

        for ssrc in old_ssrcs {
            self.active_ssrcs.remove(&ssrc);
        }
        for ssrc in parameters.ssrcs() {
            self.active_ssrcs.insert(ssrc);
        }

        if was_active {
            self.update_dependent_senders(peer_id, rtp_receiver_id, &parameters);
            return Ok(());
        }

        let subscribers: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(id, peer)| {
                **id != peer_id && !peer.is_closed() && peer.capabilities().is_some()
            })
            .map(|(id, _)| *id)
            .collect();

        for subscriber_peer_id in subscribers {
            if let Err(err) =
                self.create_rtp_sender(subscriber_peer_id, peer_id, rtp_receiver_id, notifier)
            {
                if matches!(err, Error::ResourceExhaustion(_)) {
                    let _ = self.close_rtp_receiver(peer_id, rtp_receiver_id, notifier);
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// Refreshes the payload-type mapping of every sender fed by a receiver
    /// whose parameters were replaced.
    fn update_dependent_senders(
        &mut self,
        peer_id: PeerId,
        rtp_receiver_id: RtpReceiverId,
        parameters: &RtpParameters,
    ) {
        let dependents = self
            .fanout
            .get(&(peer_id, rtp_receiver_id))
            .cloned()
            .unwrap_or_default();

        for (subscriber_peer_id, sender_id) in dependents {
            let Some(subscriber) = self.peers.get_mut(&subscriber_peer_id) else {
                continue;
            };
            let Some(sender) = subscriber.senders.get_mut(&sender_id) else {
                continue;
            };

            let map = payload_type_map(parameters, sender.parameters());
            sender.update_payload_type_map(map);
        }
    }

    /// Builds one sender delivering a receiver's stream to a subscriber peer,
    /// if the subscriber negotiated a compatible codec. Both fan-out maps are
    /// updated together; the subscriber's transport is notified of the new
    /// outbound stream.
    fn create_rtp_sender(
        &mut self,
        subscriber_peer_id: PeerId,
        source_peer_id: PeerId,
        source_receiver_id: RtpReceiverId,
        notifier: &mut dyn NotificationSink,
    ) -> Result<()> {
        let (kind, source_parameters) = {
            let source_peer = self.peers.get(&source_peer_id).ok_or_else(|| {
                Error::UnknownEntity(format!("peer {source_peer_id} does not exist"))
            })?;
            let receiver = source_peer
                .receivers
                .get(&source_receiver_id)
                .ok_or_else(|| {
                    Error::UnknownEntity(format!("receiver {source_receiver_id} does not exist"))
                })?;
            let parameters = receiver.parameters().cloned().ok_or_else(|| {
                Error::InvalidState(format!("receiver {source_receiver_id} has no parameters"))
            })?;
            (receiver.kind(), parameters)
        };

        let subscriber_capabilities = {
            let subscriber = self.peers.get(&subscriber_peer_id).ok_or_else(|| {
                Error::UnknownEntity(format!("peer {subscriber_peer_id} does not exist"))
            })?;
            subscriber.capabilities().cloned().ok_or_else(|| {
                Error::InvalidState(format!("peer {subscriber_peer_id} has no capabilities yet"))
            })?
        };

        let receiver_codec = match source_parameters.codecs.iter().find(|c| !c.is_rtx()) {
            Some(codec) => codec,
            None => return Ok(()),
        };
        let subscriber_codec = match subscriber_capabilities.codecs.iter().find(|c| {
            !c.is_rtx()
                && c.mime_type.eq_ignore_ascii_case(&receiver_codec.mime_type)
                && c.clock_rate == receiver_codec.clock_rate
        }) {
            Some(codec) => codec,
            None => {
                log::debug!(
                    "room {}: peer {} has no codec compatible with receiver {} ({}), skipping",
                    self.id,
                    subscriber_peer_id,
                    source_receiver_id,
                    receiver_codec.mime_type
                );
                return Ok(());
            }
        };

        let ssrc = self.allocate_ssrc()?;
        let sender_id = self.next_sender_id;
        self.next_sender_id += 1;

        let sender_payload_type = subscriber_codec
            .preferred_payload_type
            .unwrap_or(receiver_codec.payload_type);

        let codecs = vec![RtpCodecParameters {
            mime_type: subscriber_codec.mime_type.clone(),
            payload_type: sender_payload_type,
            clock_rate: subscriber_codec.clock_rate,
            channels: subscriber_codec.channels,
            parameters: subscriber_codec.parameters.clone(),
            rtcp_feedback: subscriber_codec.rtcp_feedback.clone(),
        }];

        let header_extensions: Vec<RtpHeaderExtensionParameters> = source_parameters
            .header_extensions
            .iter()
            .filter_map(|ext| {
                subscriber_capabilities
                    .header_extensions
                    .iter()
                    .find(|cap| cap.uri == ext.uri && cap.kind == kind)
                    .map(|cap| RtpHeaderExtensionParameters {
                        uri: cap.uri.clone(),
                        id: cap.preferred_id,
                        encrypt: false,
                    })
            })
            .collect();

        let parameters = RtpParameters {
            mux_id: None,
            codecs,
            header_extensions,
            encodings: vec![RtpEncodingParameters {
                ssrc: Some(ssrc),
                rtx: None,
            }],
            rtcp: Some(RtcpParameters {
                cname: None,
                reduced_size: true,
            }),
        };

        let map = payload_type_map(&source_parameters, &parameters);

        let mut sender = RtpSender::new(
            sender_id,
            subscriber_peer_id,
            source_peer_id,
            source_receiver_id,
            kind,
            parameters.clone(),
            map,
            ssrc,
        );
        sender.activate();

        let subscriber = self.peers.get_mut(&subscriber_peer_id).ok_or_else(|| {
            Error::UnknownEntity(format!("peer {subscriber_peer_id} does not exist"))
        })?;
        subscriber.senders.insert(sender_id, sender);
        self.fanout
            .entry((source_peer_id, source_receiver_id))
            .or_default()
            .push((subscriber_peer_id, sender_id));
        self.reverse.insert(
            (subscriber_peer_id, sender_id),
            (source_peer_id, source_receiver_id),
        );
        self.active_ssrcs.insert(ssrc);

        notifier.notify(Notification::new(
            "rtpSender.new",
            json!({
                "roomId": self.id,
                "peerId": subscriber_peer_id,
                "rtpSenderId": sender_id,
                "kind": kind,
                "rtpParameters": parameters,
                "sourcePeerId": source_peer_id,
                "sourceRtpReceiverId": source_receiver_id,
            }),
        ));

        Ok(())
    }

    /// Draws a fresh outbound SSRC, redrawing on collision with the room's
    /// active set.
    fn allocate_ssrc(&self) -> Result<u32> {
        let mut rng = rand::thread_rng();
        for _ in 0..SSRC_ALLOCATION_RETRIES {
            let ssrc: u32 = rng.gen();
            if ssrc != 0 && !self.active_ssrcs.contains(&ssrc) {
                return Ok(ssrc);
            }
        }
        Err(Error::ResourceExhaustion(
            "could not allocate an unused SSRC".into(),
        ))
    }

    /// Closes a sender and removes it from both fan-out maps.
    pub fn close_rtp_sender(
        &mut self,
        peer_id: PeerId,
        rtp_sender_id: RtpSenderId,
        notifier: &mut dyn NotificationSink,
    ) -> Result<()> {
        let peer = self
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| Error::UnknownEntity(format!("peer {peer_id} does not exist")))?;
        let mut sender = peer.senders.remove(&rtp_sender_id).ok_or_else(|| {
            Error::UnknownEntity(format!("sender {rtp_sender_id} does not exist"))
        })?;
        sender.close();

        if let Some(source) = self.reverse.remove(&(peer_id, rtp_sender_id)) {
            if let Some(dependents) = self.fanout.get_mut(&source) {
                dependents.retain(|entry| *entry != (peer_id, rtp_sender_id));
            }
        }
        self.active_ssrcs.remove(&sender.ssrc());

        notifier.notify(Notification::new(
            "rtpSender.closed",
            json!({
                "roomId": self.id,
                "peerId": peer_id,
                "rtpSenderId": rtp_sender_id,
            }),
        ));
        Ok(())
    }

    /// Closes a receiver: every dependent sender is closed first, then the
    /// receiver itself is removed.
    pub fn close_rtp_receiver(
        &mut self,
        peer_id: PeerId,
        rtp_receiver_id: RtpReceiverId,
        notifier: &mut dyn NotificationSink,
    ) -> Result<()> {
        if !self
            .peers
            .get(&peer_id)
            .map_or(false, |p| p.receivers.contains_key(&rtp_receiver_id))
        {
            return Err(Error::UnknownEntity(format!(
                "receiver {rtp_receiver_id} does not exist"
            )));
        }

        if let Some(dependents) = self.fanout.remove(&(peer_id, rtp_receiver_id)) {
            for (subscriber_peer_id, sender_id) in dependents {
                if let Err(err) = self.close_rtp_sender(subscriber_peer_id, sender_id, notifier) {
                    log::debug!(
                        "room {}: stale fan-out entry while closing receiver {}: {}",
                        self.id,
                        rtp_receiver_id,
                        err
                    );
                }
            }
        }

        if let Some(peer) = self.peers.get_mut(&peer_id) {
            if let Some(mut receiver) = peer.receivers.remove(&rtp_receiver_id) {
                for ssrc in receiver.parameters().map(|p| p.ssrcs()).unwrap_or_default() {
                    self.active_ssrcs.remove(&ssrc);
                }
                receiver.close();
            }
        }

        notifier.notify(Notification::new(
            "rtpReceiver.closed",
            json!({
                "roomId": self.id,
                "peerId": peer_id,
                "rtpReceiverId": rtp_receiver_id,
            }),
        ));
        Ok(())
    }

    /// Closes a peer and everything it owns: its senders first, then its
    /// receivers (closing their dependent senders on other peers), then the
    /// peer itself. Notifications follow the same order.
    pub fn close_peer(
        &mut self,
        peer_id: PeerId,
        notifier: &mut dyn NotificationSink,
    ) -> Result<()> {
        if !self.peers.contains_key(&peer_id) {
            return Err(Error::UnknownEntity(format!(
                "peer {peer_id} does not exist"
            )));
        }

        let sender_ids: Vec<RtpSenderId> = self
            .peers
            .get(&peer_id)
            .map(|p| p.senders.keys().copied().collect())
            .unwrap_or_default();
        for sender_id in sender_ids {
            if let Err(err) = self.close_rtp_sender(peer_id, sender_id, notifier) {
                log::debug!("room {}: closing peer {peer_id}: {err}", self.id);
            }
        }

        let receiver_ids: Vec<RtpReceiverId> = self
            .peers
            .get(&peer_id)
            .map(|p| p.receivers.keys().copied().collect())
            .unwrap_or_default();
        for receiver_id in receiver_ids {
            if let Err(err) = self.close_rtp_receiver(peer_id, receiver_id, notifier) {
                log::debug!("room {}: closing peer {peer_id}: {err}", self.id);
            }
        }

        if let Some(mut peer) = self.peers.remove(&peer_id) {
            peer.close();
        }

        notifier.notify(Notification::new(
            "peer.closed",
            json!({ "roomId": self.id, "peerId": peer_id }),
        ));
        Ok(())
    }

    /// Closes the room: every peer is closed and the room reaches its
    /// terminal state. Idempotent.
    pub fn close(&mut self, notifier: &mut dyn NotificationSink) {
        if self.state == RoomState::Closed {
            return;
        }

        let peer_ids: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer_id in peer_ids {
            if let Err(err) = self.close_peer(peer_id, notifier) {
                log::debug!("room {}: closing: {err}", self.id);
            }
        }

        self.state = RoomState::Closed;
        notifier.notify(Notification::new(
            "room.closed",
            json!({ "roomId": self.id }),
        ));
    }

    /// Accepts an RTP packet from a peer's transport: parses it, locates the
    /// publishing receiver by SSRC, appends it to the retransmission history
    /// and fans it out to the dependent senders in creation order. Bytes are
    /// copied before parsing; the input is not retained.
    pub fn handle_rtp(&mut self, peer_id: PeerId, data: &[u8], transport: &mut dyn TransportSink) {
        if self.state != RoomState::Open {
            return;
        }

        let buf = Bytes::copy_from_slice(data);
        let packet = match rtp::Packet::unmarshal(&mut buf.clone()) {
            Ok(packet) => packet,
            Err(err) => {
                log::warn!(
                    "room {}: peer {peer_id}: discarding invalid RTP packet: {err}",
                    self.id
                );
                return;
            }
        };

        let rtp_receiver_id = {
            let Some(peer) = self.peers.get_mut(&peer_id) else {
                log::warn!("room {}: RTP from unknown peer {peer_id}", self.id);
                return;
            };
            let Some(rtp_receiver_id) = peer.receiver_id_by_ssrc(packet.header.ssrc) else {
                log::warn!(
                    "room {}: peer {peer_id}: no receiver for ssrc {}",
                    self.id,
                    packet.header.ssrc
                );
                return;
            };
            let Some(receiver) = peer.receivers.get_mut(&rtp_receiver_id) else {
                return;
            };
            if !receiver.receive_packet(&packet) {
                return;
            }
            rtp_receiver_id
        };

        let Some(dependents) = self.fanout.get(&(peer_id, rtp_receiver_id)) else {
            return;
        };
        for (subscriber_peer_id, sender_id) in dependents {
            let Some(sender) = self
                .peers
                .get(subscriber_peer_id)
                .and_then(|p| p.senders.get(sender_id))
            else {
                continue;
            };
            sender.route(&packet, transport);
        }
    }

    /// Accepts a compound RTCP packet from a peer's transport and dispatches
    /// each sub-packet to the receiver or sender matching its SSRC, crossing
    /// over to the other side of the fan-out map where the packet demands it.
    pub fn handle_rtcp(&mut self, peer_id: PeerId, data: &[u8], transport: &mut dyn TransportSink) {
        if self.state != RoomState::Open {
            return;
        }

        let buf = Bytes::copy_from_slice(data);
        let packets = match rtcp::packet::unmarshal(&mut buf.clone()) {
            Ok(packets) => packets,
            Err(err) => {
                log::warn!(
                    "room {}: peer {peer_id}: discarding invalid RTCP packet: {err}",
                    self.id
                );
                return;
            }
        };

        for packet in packets {
            let any = packet.as_any();

            if let Some(sr) = any.downcast_ref::<SenderReport>() {
                self.on_sender_report(peer_id, sr, transport);
            } else if let Some(rr) = any.downcast_ref::<ReceiverReport>() {
                self.on_receiver_report(peer_id, rr, transport);
            } else if let Some(sdes) = any.downcast_ref::<SourceDescription>() {
                self.on_source_description(peer_id, sdes);
            } else if let Some(bye) = any.downcast_ref::<Goodbye>() {
                self.on_goodbye(peer_id, bye);
            } else if let Some(nack) = any.downcast_ref::<TransportLayerNack>() {
                self.on_nack(peer_id, nack, transport);
            } else if let Some(pli) = any.downcast_ref::<PictureLossIndication>() {
                if let Some((source_peer_id, media_ssrc)) =
                    self.feedback_source(peer_id, pli.media_ssrc)
                {
                    let forwarded = PictureLossIndication {
                        sender_ssrc: pli.sender_ssrc,
                        media_ssrc,
                    };
                    self.send_rtcp(source_peer_id, &forwarded, transport);
                }
            } else if let Some(fir) = any.downcast_ref::<FullIntraRequest>() {
                let target_ssrc = fir.fir.first().map(|e| e.ssrc).unwrap_or(fir.media_ssrc);
                if let Some((source_peer_id, media_ssrc)) =
                    self.feedback_source(peer_id, target_ssrc)
                {
                    let forwarded = FullIntraRequest {
                        sender_ssrc: fir.sender_ssrc,
                        media_ssrc,
                        fir: fir
                            .fir
                            .iter()
                            .map(|e| FirEntry {
                                ssrc: media_ssrc,
                                sequence_number: e.sequence_number,
                            })
                            .collect(),
                    };
                    self.send_rtcp(source_peer_id, &forwarded, transport);
                }
            } else if let Some(sli) = any.downcast_ref::<SliceLossIndication>() {
                if let Some((source_peer_id, media_ssrc)) =
                    self.feedback_source(peer_id, sli.media_ssrc)
                {
                    let forwarded = SliceLossIndication {
                        sender_ssrc: sli.sender_ssrc,
                        media_ssrc,
                        sli_entries: sli.sli_entries.clone(),
                    };
                    self.send_rtcp(source_peer_id, &forwarded, transport);
                }
            } else if let Some(rpsi) = any.downcast_ref::<ReferencePictureSelectionIndication>() {
                if let Some((source_peer_id, media_ssrc)) =
                    self.feedback_source(peer_id, rpsi.media_ssrc)
                {
                    let forwarded = ReferencePictureSelectionIndication {
                        sender_ssrc: rpsi.sender_ssrc,
                        media_ssrc,
                        payload_type: rpsi.payload_type,
                        bit_string: rpsi.bit_string.clone(),
                    };
                    self.send_rtcp(source_peer_id, &forwarded, transport);
                }
            } else if let Some(afb) = any.downcast_ref::<ApplicationLayerFeedback>() {
                if let Some((source_peer_id, media_ssrc)) =
                    self.feedback_source(peer_id, afb.media_ssrc)
                {
                    let forwarded = ApplicationLayerFeedback {
                        sender_ssrc: afb.sender_ssrc,
                        media_ssrc,
                        data: afb.data.clone(),
                    };
                    self.send_rtcp(source_peer_id, &forwarded, transport);
                }
            } else if let Some(tmmbr) = any.downcast_ref::<TmmbRequest>() {
                for entry in &tmmbr.entries {
                    if let Some((source_peer_id, media_ssrc)) =
                        self.feedback_source(peer_id, entry.ssrc)
                    {
                        let forwarded = TmmbRequest {
                            sender_ssrc: tmmbr.sender_ssrc,
                            media_ssrc: tmmbr.media_ssrc,
                            entries: vec![TmmbEntry {
                                ssrc: media_ssrc,
                                bitrate: entry.bitrate,
                                overhead: entry.overhead,
                            }],
                        };
                        self.send_rtcp(source_peer_id, &forwarded, transport);
                    }
                }
            } else if let Some(tmmbn) = any.downcast_ref::<TmmbNotification>() {
                for entry in &tmmbn.entries {
                    if let Some((source_peer_id, media_ssrc)) =
                        self.feedback_source(peer_id, entry.ssrc)
                    {
                        let forwarded = TmmbNotification {
                            sender_ssrc: tmmbn.sender_ssrc,
                            media_ssrc: tmmbn.media_ssrc,
                            entries: vec![TmmbEntry {
                                ssrc: media_ssrc,
                                bitrate: entry.bitrate,
                                overhead: entry.overhead,
                            }],
                        };
                        self.send_rtcp(source_peer_id, &forwarded, transport);
                    }
                }
            } else if any.downcast_ref::<RawPacket>().is_some() {
                log::warn!(
                    "room {}: peer {peer_id}: dropping RTCP packet of unknown type",
                    self.id
                );
            } else {
                log::debug!(
                    "room {}: peer {peer_id}: unhandled RTCP packet {packet}",
                    self.id
                );
            }
        }
    }

    /// Publisher SRs are stored on the receiver and re-originated toward each
    /// subscriber, rewritten to the corresponding sender's SSRC.
    fn on_sender_report(
        &mut self,
        peer_id: PeerId,
        sr: &SenderReport,
        transport: &mut dyn TransportSink,
    ) {
        let rtp_receiver_id = {
            let Some(peer) = self.peers.get_mut(&peer_id) else {
                return;
            };
            let Some(rtp_receiver_id) = peer.receiver_id_by_ssrc(sr.ssrc) else {
                log::debug!(
                    "room {}: peer {peer_id}: SR for unknown ssrc {}",
                    self.id,
                    sr.ssrc
                );
                return;
            };
            if let Some(receiver) = peer.receivers.get_mut(&rtp_receiver_id) {
                receiver.on_sender_report(sr);
            }
            rtp_receiver_id
        };

        let dependents = self
            .fanout
            .get(&(peer_id, rtp_receiver_id))
            .cloned()
            .unwrap_or_default();
        for (subscriber_peer_id, sender_id) in dependents {
            let Some(sender) = self
                .peers
                .get(&subscriber_peer_id)
                .and_then(|p| p.senders.get(&sender_id))
            else {
                continue;
            };
            let forwarded = SenderReport {
                ssrc: sender.ssrc(),
                ntp_time: sr.ntp_time,
                rtp_time: sr.rtp_time,
                packet_count: sr.packet_count,
                octet_count: sr.octet_count,
                reports: vec![],
                profile_extensions: Bytes::new(),
            };
            self.send_rtcp(subscriber_peer_id, &forwarded, transport);
        }
    }

    /// Subscriber RRs are re-originated toward the publishers of the streams
    /// they report on, each block rewritten to the source receiver's SSRC.
    fn on_receiver_report(
        &mut self,
        peer_id: PeerId,
        rr: &ReceiverReport,
        transport: &mut dyn TransportSink,
    ) {
        let mut per_source: BTreeMap<PeerId, Vec<rtcp::reception_report::ReceptionReport>> =
            BTreeMap::new();

        for report in &rr.reports {
            let Some((source_peer_id, media_ssrc)) = self.feedback_source(peer_id, report.ssrc)
            else {
                log::debug!(
                    "room {}: peer {peer_id}: RR block for unknown ssrc {}",
                    self.id,
                    report.ssrc
                );
                continue;
            };
            let mut rewritten = report.clone();
            rewritten.ssrc = media_ssrc;
            per_source.entry(source_peer_id).or_default().push(rewritten);
        }

        for (source_peer_id, reports) in per_source {
            let forwarded = ReceiverReport {
                ssrc: rr.ssrc,
                reports,
                profile_extensions: Bytes::new(),
            };
            self.send_rtcp(source_peer_id, &forwarded, transport);
        }
    }

    fn on_source_description(&mut self, peer_id: PeerId, sdes: &SourceDescription) {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return;
        };
        for chunk in &sdes.chunks {
            let Some(rtp_receiver_id) = peer.receiver_id_by_ssrc(chunk.source) else {
                continue;
            };
            if let Some(receiver) = peer.receivers.get_mut(&rtp_receiver_id) {
                receiver.on_sdes_chunk(chunk);
            }
        }
    }

    fn on_goodbye(&mut self, peer_id: PeerId, bye: &Goodbye) {
        let Some(peer) = self.peers.get(&peer_id) else {
            return;
        };
        for source in &bye.sources {
            if let Some(rtp_receiver_id) = peer.receiver_id_by_ssrc(*source) {
                log::debug!(
                    "room {}: peer {peer_id}: BYE from receiver {rtp_receiver_id} (ssrc {source})",
                    self.id
                );
            }
        }
    }

    /// A subscriber's NACK is resolved against the source receiver's
    /// retransmission history and the recovered packets are retransmitted
    /// through the requesting sender. The scratch container is reused across
    /// calls and cleared before use.
    fn on_nack(
        &mut self,
        peer_id: PeerId,
        nack: &TransportLayerNack,
        transport: &mut dyn TransportSink,
    ) {
        let Some(sender_id) = self
            .peers
            .get(&peer_id)
            .and_then(|p| p.sender_id_by_ssrc(nack.media_ssrc))
        else {
            log::debug!(
                "room {}: peer {peer_id}: NACK for unknown ssrc {}",
                self.id,
                nack.media_ssrc
            );
            return;
        };
        let Some(&(source_peer_id, source_receiver_id)) =
            self.reverse.get(&(peer_id, sender_id))
        else {
            return;
        };

        let mut container = std::mem::take(&mut self.retransmission_container);
        container.clear();

        if let Some(receiver) = self
            .peers
            .get(&source_peer_id)
            .and_then(|p| p.receivers.get(&source_receiver_id))
        {
            receiver.resolve_nack(&nack.nacks, &mut container);
        }

        if let Some(sender) = self
            .peers
            .get(&peer_id)
            .and_then(|p| p.senders.get(&sender_id))
        {
            for packet in &container {
                sender.route(packet, transport);
            }
        }

        self.retransmission_container = container;
    }

    /// Resolves subscriber-side feedback to its publisher: the sender owning
    /// `ssrc` on `peer_id` leads through the inverse fan-out map to the
    /// source receiver, whose peer and media SSRC are returned.
    fn feedback_source(&self, peer_id: PeerId, ssrc: u32) -> Option<(PeerId, u32)> {
        let sender_id = self.peers.get(&peer_id)?.sender_id_by_ssrc(ssrc)?;
        let (source_peer_id, source_receiver_id) = self.reverse.get(&(peer_id, sender_id))?;
        let media_ssrc = self
            .peers
            .get(source_peer_id)?
            .receivers
            .get(source_receiver_id)?
            .media_ssrc()?;
        Some((*source_peer_id, media_ssrc))
    }

    fn send_rtcp<P>(&self, peer_id: PeerId, packet: &P, transport: &mut dyn TransportSink)
    where
        P: Marshal,
    {
        match packet.marshal() {
            Ok(data) => transport.send_rtcp(peer_id, data),
            Err(err) => {
                log::warn!(
                    "room {}: failed to serialize outbound RTCP: {err}",
                    self.id
                );
            }
        }
    }

    pub fn dump_peer(&self, peer_id: PeerId) -> Result<serde_json::Value> {
        let peer = self
            .peers
            .get(&peer_id)
            .ok_or_else(|| Error::UnknownEntity(format!("peer {peer_id} does not exist")))?;
        Ok(peer.dump())
    }

    pub fn dump(&self) -> serde_json::Value {
        let fanout: Vec<serde_json::Value> = self
            .fanout
            .iter()
            .map(|((peer_id, receiver_id), dependents)| {
                json!({
                    "peerId": peer_id,
                    "rtpReceiverId": receiver_id,
                    "rtpSenders": dependents
                        .iter()
                        .map(|(sub_peer_id, sender_id)| {
                            json!({ "peerId": sub_peer_id, "rtpSenderId": sender_id })
                        })
                        .collect::<Vec<_>>(),
                })
            })
            .collect();

        json!({
            "roomId": self.id,
            "state": self.state,
            "capabilities": self.capabilities,
            "peers": self.peers.values().map(|p| p.dump()).collect::<Vec<_>>(),
            "mapRtpReceiverRtpSenders": fanout,
        })
    }

    /// Fan-out consistency: every (receiver, sender) edge appears in both
    /// maps or in neither.
    #[cfg(test)]
    pub(crate) fn check_fanout_consistency(&self) -> bool {
        for (source, dependents) in &self.fanout {
            for entry in dependents {
                if self.reverse.get(entry) != Some(source) {
                    return false;
                }
            }
        }
        for (entry, source) in &self.reverse {
            match self.fanout.get(source) {
                Some(dependents) if dependents.contains(entry) => {}
                _ => return false,
            }
        }
        true
    }
}

/// The receiver-payload-type to sender-payload-type table for a
/// (source parameters, sender parameters) pairing: codecs are paired by MIME
/// type, which yields the identity map under room-wide assignment.
fn payload_type_map(source: &RtpParameters, sender: &RtpParameters) -> BTreeMap<u8, u8> {
    let mut map = BTreeMap::new();
    for source_codec in &source.codecs {
        if let Some(sender_codec) = sender
            .codecs
            .iter()
            .find(|c| c.mime_type.eq_ignore_ascii_case(&source_codec.mime_type))
        {
            map.insert(source_codec.payload_type, sender_codec.payload_type);
        }
    }
    map
}
