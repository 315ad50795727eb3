use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the control plane as request rejections.
///
/// Malformed RTP/RTCP never appears here: parse failures are logged at
/// warning level and the packet is dropped. Internal invariant violations
/// are asserted and abort the process.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Receiver or room parameters that violate the negotiated capabilities,
    /// or a malformed request body.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// A request targets a room/peer/receiver/sender id that does not exist.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    /// A peer's offered capabilities have no overlap with the room's.
    #[error("capability conflict: {0}")]
    CapabilityConflict(String),
    /// The dynamic payload-type pool is empty, or SSRC collision retries are
    /// exhausted.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
    /// An operation was attempted in a lifecycle state that forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),
}
