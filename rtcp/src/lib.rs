#![warn(rust_2018_idioms)]

//! Encoding and decoding of RTCP packets according to RFC 3550 (SR, RR, SDES,
//! BYE), RFC 4585 (payload-specific and transport-layer feedback) and
//! RFC 5104 (FIR, TMMBR/TMMBN).
//!
//! A compound datagram decodes into a vector of boxed [`packet::Packet`]
//! trait objects; unknown packet types decode into [`raw_packet::RawPacket`]
//! so that a single unrecognized sub-packet does not abort the compound
//! parse.
//!
//! Decoding:
//!
//! ```nobuild
//! let packets = rtcp::packet::unmarshal(&mut rtcp_data)?;
//! for p in &packets {
//!     if let Some(pli) = p.as_any().downcast_ref::<PictureLossIndication>() {
//!         // ...
//!     }
//! }
//! ```
//!
//! Encoding:
//!
//! ```nobuild
//! let pkt = PictureLossIndication { sender_ssrc, media_ssrc };
//! let data = pkt.marshal()?;
//! ```

pub mod error;
pub mod goodbye;
pub mod header;
pub mod packet;
pub mod payload_feedbacks;
pub mod raw_packet;
pub mod receiver_report;
pub mod reception_report;
pub mod sender_report;
pub mod source_description;
pub mod transport_feedbacks;
mod util;

pub use error::Error;
