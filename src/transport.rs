use bytes::Bytes;

use crate::PeerId;

/// Outbound half of the transport plane.
///
/// The embedder implements this on top of its per-peer sockets (ICE/DTLS/SRTP
/// termination lives outside the core). Writes are non-blocking: an
/// implementation that would block simply drops the packet, which is
/// acceptable for RTP and tolerated for RTCP.
pub trait TransportSink {
    fn send_rtp(&mut self, peer_id: PeerId, data: Bytes);
    fn send_rtcp(&mut self, peer_id: PeerId, data: Bytes);
}
