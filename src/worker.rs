
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::channel::{Method, NotificationSink, Request, Response};
use crate::error::{Error, Result};
use crate::room::Room;
use crate::rtp_parameters::{MediaKind, RtpCapabilities, RtpCodecCapability, RtpParameters};
use crate::transport::TransportSink;
use crate::{PeerId, RoomId};

/// The top-level entity behind the control channel: owns the rooms and maps
/// requests onto them. Each room is independent; the worker performs no
/// cross-room coordination.
pub struct Worker {
    rooms: BTreeMap<RoomId, Room>,
}

impl Worker {
    pub fn new() -> Self {
        Worker {
            rooms: BTreeMap::new(),
        }
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Handles one control-plane request, turning every error into a
    /// rejection with a human-readable reason.
    pub fn handle_request(
        &mut self,
        request: &Request,
        notifier: &mut dyn NotificationSink,
    ) -> Response {
        match self.process_request(request, notifier) {
            Ok(data) => Response::accepted(request.id, data),
            Err(err) => {
                log::debug!(
                    "request {} ({:?}) rejected: {err}",
                    request.id,
                    request.method
                );
                Response::rejected(request.id, &err.to_string())
            }
        }
    }

    fn process_request(
        &mut self,
        request: &Request,
        notifier: &mut dyn NotificationSink,
    ) -> Result<serde_json::Value> {
        match request.method {
            Method::CreateRoom => {
                let room_id = request.room_id()?;
                if self.rooms.contains_key(&room_id) {
                    return Err(Error::InvalidParameters(format!(
                        "room {room_id} already exists"
                    )));
                }

                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct CreateRoomData {
                    #[serde(default)]
                    media_codecs: Vec<RtpCodecCapability>,
                }
                let data: CreateRoomData = parse_data(&request.data)?;

                let room = Room::new(room_id, &data.media_codecs)?;
                let capabilities = room.capabilities().clone();
                self.rooms.insert(room_id, room);

                Ok(json!({ "capabilities": capabilities }))
            }

            Method::CloseRoom => {
                let room_id = request.room_id()?;
                let mut room = self
                    .rooms
                    .remove(&room_id)
                    .ok_or_else(|| Error::UnknownEntity(format!("room {room_id} does not exist")))?;
                room.close(notifier);
                Ok(serde_json::Value::Null)
            }

            Method::DumpRoom => Ok(self.room_ref(request.room_id()?)?.dump()),

            Method::CreatePeer => {
                let peer_id = request.peer_id()?;
                self.room_mut(request.room_id()?)?.create_peer(peer_id)?;
                Ok(serde_json::Value::Null)
            }

            Method::ClosePeer => {
                let peer_id = request.peer_id()?;
                self.room_mut(request.room_id()?)?
                    .close_peer(peer_id, notifier)?;
                Ok(serde_json::Value::Null)
            }

            Method::DumpPeer => {
                let peer_id = request.peer_id()?;
                self.room_ref(request.room_id()?)?.dump_peer(peer_id)
            }

            Method::SetPeerCapabilities => {
                let peer_id = request.peer_id()?;
                let offered: RtpCapabilities = parse_data(&request.data)?;
                let negotiated = self.room_mut(request.room_id()?)?.set_peer_capabilities(
                    peer_id,
                    &offered,
                    notifier,
                )?;
                Ok(json!({ "capabilities": negotiated }))
            }

            Method::CreateRtpReceiver => {
                let peer_id = request.peer_id()?;
                let rtp_receiver_id = request.rtp_receiver_id()?;

                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct CreateRtpReceiverData {
                    kind: MediaKind,
                }
                let data: CreateRtpReceiverData = parse_data(&request.data)?;

                self.room_mut(request.room_id()?)?.create_rtp_receiver(
                    peer_id,
                    rtp_receiver_id,
                    data.kind,
                )?;
                Ok(serde_json::Value::Null)
            }

            Method::CloseRtpReceiver => {
                let peer_id = request.peer_id()?;
                let rtp_receiver_id = request.rtp_receiver_id()?;
                self.room_mut(request.room_id()?)?.close_rtp_receiver(
                    peer_id,
                    rtp_receiver_id,
                    notifier,
                )?;
                Ok(serde_json::Value::Null)
            }

            Method::SetRtpReceiverParameters => {
                let peer_id = request.peer_id()?;
                let rtp_receiver_id = request.rtp_receiver_id()?;
                let parameters: RtpParameters = parse_data(&request.data)?;
                self.room_mut(request.room_id()?)?.set_rtp_receiver_parameters(
                    peer_id,
                    rtp_receiver_id,
                    parameters,
                    notifier,
                )?;
                Ok(serde_json::Value::Null)
            }

            Method::CloseRtpSender => {
                let peer_id = request.peer_id()?;
                let rtp_sender_id = request.rtp_sender_id()?;
                self.room_mut(request.room_id()?)?.close_rtp_sender(
                    peer_id,
                    rtp_sender_id,
                    notifier,
                )?;
                Ok(serde_json::Value::Null)
            }
        }
    }

    /// Delivers an inbound RTP packet from the transport plane. The bytes are
    /// not retained after the call.
    pub fn handle_rtp(
        &mut self,
        room_id: RoomId,
        peer_id: PeerId,
        data: &[u8],
        transport: &mut dyn TransportSink,
    ) {
        match self.rooms.get_mut(&room_id) {
            Some(room) => room.handle_rtp(peer_id, data, transport),
            None => log::warn!("RTP for unknown room {room_id}"),
        }
    }

    /// Delivers an inbound compound RTCP packet from the transport plane.
    pub fn handle_rtcp(
        &mut self,
        room_id: RoomId,
        peer_id: PeerId,
        data: &[u8],
        transport: &mut dyn TransportSink,
    ) {
        match self.rooms.get_mut(&room_id) {
            Some(room) => room.handle_rtcp(peer_id, data, transport),
            None => log::warn!("RTCP for unknown room {room_id}"),
        }
    }

    fn room_ref(&self, room_id: RoomId) -> Result<&Room> {
        self.rooms
            .get(&room_id)
            .ok_or_else(|| Error::UnknownEntity(format!("room {room_id} does not exist")))
    }

    fn room_mut(&mut self, room_id: RoomId) -> Result<&mut Room> {
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::UnknownEntity(format!("room {room_id} does not exist")))
    }
}

impl Default for Worker {
    fn default() -> Self {
        Worker::new()
    }
}

fn parse_data<T: DeserializeOwned>(data: &serde_json::Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|err| Error::InvalidParameters(format!("invalid request data: {err}")))
}
