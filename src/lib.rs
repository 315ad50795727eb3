#![warn(rust_2018_idioms)]

//! Media-routing core of a selective forwarding unit (SFU) for real-time
//! conferencing over RTP/RTCP.
//!
//! A [`worker::Worker`] owns a set of [`room::Room`]s. Within a room, peers
//! publish media through RTP receivers and subscribe to the media of other
//! peers through RTP senders that the room creates automatically. The core
//! parses incoming RTP/RTCP, decides which senders must receive each packet,
//! rewrites payload type and SSRC per sender, and emits outbound packets
//! through an embedder-provided [`transport::TransportSink`], without ever
//! decoding media.
//!
//! The core is single-threaded and synchronous: every operation runs from
//! call to return on the embedder's event-loop thread. Control-plane
//! requests and notifications are JSON bodies exchanged over a
//! length-prefixed channel whose I/O is owned by the embedder (see
//! [`channel`]).

pub mod channel;
pub mod error;
pub mod peer;
pub mod retransmission_buffer;
pub mod room;
pub mod rtp_parameters;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod supported_rtp_capabilities;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};

/// Identifier of a room, assigned by the control plane.
pub type RoomId = u32;
/// Identifier of a peer within a room, assigned by the control plane.
pub type PeerId = u32;
/// Identifier of an RTP receiver within a peer, assigned by the control plane.
pub type RtpReceiverId = u32;
/// Identifier of an RTP sender within a peer, assigned by the room.
pub type RtpSenderId = u32;
