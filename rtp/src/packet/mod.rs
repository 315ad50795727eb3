
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::Header;

type Result<T> = std::result::Result<T, util::Error>;

/// Packet represents an RTP packet.
///
/// The trailing padding count is kept verbatim so that a parsed packet
/// serializes back to the exact input bytes.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    pub padding_size: u8,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "RTP PACKET:\n".to_string();

        out += format!("\tVersion: {}\n", self.header.version).as_str();
        out += format!("\tMarker: {}\n", self.header.marker).as_str();
        out += format!("\tPayload Type: {}\n", self.header.payload_type).as_str();
        out += format!("\tSequence Number: {}\n", self.header.sequence_number).as_str();
        out += format!("\tTimestamp: {}\n", self.header.timestamp).as_str();
        out += format!("\tSSRC: {} ({:x})\n", self.header.ssrc, self.header.ssrc).as_str();
        out += format!("\tPayload Length: {}\n", self.payload.len()).as_str();

        write!(f, "{out}")
    }
}

impl Unmarshal for Packet {
    /// Unmarshal parses the passed byte slice and returns a packet whose
    /// payload borrows from it.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let total = raw_packet.remaining();

        let header = Header::unmarshal(raw_packet)?;
        let payload = raw_packet.copy_to_bytes(raw_packet.remaining());

        let (payload, padding_size) = if header.padding {
            if payload.is_empty() {
                return Err(Error::ErrZeroPadding.into());
            }
            let padding_size = payload[payload.len() - 1];
            if padding_size == 0 {
                return Err(Error::ErrZeroPadding.into());
            }
            if padding_size as usize > payload.len() {
                return Err(Error::ErrPaddingSizeExceedsPayload.into());
            }
            (
                payload.slice(..payload.len() - padding_size as usize),
                padding_size,
            )
        } else {
            (payload, 0)
        };

        let packet = Packet {
            header,
            payload,
            padding_size,
        };

        // A mismatch here is an implementation bug, not a parse error.
        debug_assert_eq!(
            packet.marshal_size(),
            total,
            "computed packet length does not match received length"
        );

        Ok(packet)
    }
}

impl MarshalSize for Packet {
    /// MarshalSize returns the size of the packet once marshaled.
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len() + self.padding_size as usize
    }
}

impl Marshal for Packet {
    /// Marshal serializes the header, payload and trailing padding into the
    /// buffer. The final padding byte carries the padding count.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.header.marshal_to(buf)?;
        let mut buf = &mut buf[n..];

        if buf.remaining_mut() < self.payload.len() + self.padding_size as usize {
            return Err(Error::ErrShortBuffer.into());
        }

        buf.put_slice(&self.payload);

        if self.padding_size > 0 {
            for _ in 0..self.padding_size - 1 {
                buf.put_u8(0);
            }
            buf.put_u8(self.padding_size);
        }

        Ok(self.marshal_size())
    }
}
