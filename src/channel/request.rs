use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{PeerId, RoomId, RtpReceiverId, RtpSenderId};

/// Request methods recognized by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Method {
    #[serde(rename = "createRoom")]
    CreateRoom,
    #[serde(rename = "closeRoom")]
    CloseRoom,
    #[serde(rename = "dumpRoom")]
    DumpRoom,
    #[serde(rename = "createPeer")]
    CreatePeer,
    #[serde(rename = "closePeer")]
    ClosePeer,
    #[serde(rename = "dumpPeer")]
    DumpPeer,
    #[serde(rename = "setPeerCapabilities")]
    SetPeerCapabilities,
    #[serde(rename = "createRtpReceiver")]
    CreateRtpReceiver,
    #[serde(rename = "closeRtpReceiver")]
    CloseRtpReceiver,
    #[serde(rename = "setRtpReceiverParameters")]
    SetRtpReceiverParameters,
    #[serde(rename = "closeRtpSender")]
    CloseRtpSender,
}

/// Target identifiers of a request.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInternal {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub peer_id: Option<PeerId>,
    #[serde(default)]
    pub rtp_receiver_id: Option<RtpReceiverId>,
    #[serde(default)]
    pub rtp_sender_id: Option<RtpSenderId>,
}

/// A control-plane request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: u32,
    pub method: Method,
    #[serde(default)]
    pub internal: RequestInternal,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Request {
    /// Parses a request from one JSON channel frame.
    pub fn from_json(data: &[u8]) -> Result<Request> {
        serde_json::from_slice(data)
            .map_err(|err| Error::InvalidParameters(format!("invalid request: {err}")))
    }

    pub fn room_id(&self) -> Result<RoomId> {
        self.internal
            .room_id
            .ok_or_else(|| Error::InvalidParameters("request is missing internal.roomId".into()))
    }

    pub fn peer_id(&self) -> Result<PeerId> {
        self.internal
            .peer_id
            .ok_or_else(|| Error::InvalidParameters("request is missing internal.peerId".into()))
    }

    pub fn rtp_receiver_id(&self) -> Result<RtpReceiverId> {
        self.internal.rtp_receiver_id.ok_or_else(|| {
            Error::InvalidParameters("request is missing internal.rtpReceiverId".into())
        })
    }

    pub fn rtp_sender_id(&self) -> Result<RtpSenderId> {
        self.internal.rtp_sender_id.ok_or_else(|| {
            Error::InvalidParameters("request is missing internal.rtpSenderId".into())
        })
    }
}

/// The worker's answer to a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Accepted {
        id: u32,
        accepted: bool,
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        data: serde_json::Value,
    },
    Rejected {
        id: u32,
        rejected: bool,
        reason: String,
    },
}

impl Response {
    pub fn accepted(id: u32, data: serde_json::Value) -> Self {
        Response::Accepted {
            id,
            accepted: true,
            data,
        }
    }

    pub fn rejected(id: u32, reason: &str) -> Self {
        Response::Rejected {
            id,
            rejected: true,
            reason: reason.to_owned(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Response::Accepted { .. })
    }

    /// Serializes the response for the channel.
    pub fn to_json(&self) -> Vec<u8> {
        // Serialization of these shapes cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
