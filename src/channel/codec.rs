//! Length-prefixed framing for channel messages: a 4-byte big-endian payload
//! length followed by the JSON payload. Pure byte-level encode/decode; the
//! socket I/O is owned by the embedder.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on a single control message, guarding against a corrupt
/// length prefix.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Appends one framed message to `dst`.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::InvalidParameters(format!(
            "frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
            payload.len()
        )));
    }

    dst.reserve(FRAME_HEADER_LEN + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Extracts the next complete message from `src`, leaving any trailing
/// partial frame in place. Returns `Ok(None)` when more bytes are needed.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::InvalidParameters(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    if src.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }

    src.advance(FRAME_HEADER_LEN);
    Ok(Some(src.split_to(len).freeze()))
}
