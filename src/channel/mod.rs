//! Control-plane message types and framing.
//!
//! The embedder owns the channel socket; the core only defines the message
//! shapes and the length-prefixed byte framing. Requests target entities
//! through their numeric ids in `internal`; method-specific payloads ride in
//! `data`.

#[cfg(test)]
mod channel_test;

pub mod codec;
pub mod notification;
pub mod request;

pub use notification::{Notification, NotificationSink};
pub use request::{Method, Request, RequestInternal, Response};
