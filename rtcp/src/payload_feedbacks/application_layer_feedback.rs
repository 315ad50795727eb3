use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;
use crate::util::get_padding_size;

type Result<T> = std::result::Result<T, util::Error>;

const AFB_OFFSET: usize = 8;

/// ApplicationLayerFeedback carries application-defined feedback (RFC 4585
/// section 6.4). The FCI payload is opaque to this crate and forwarded as-is.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ApplicationLayerFeedback {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    /// Application-defined payload.
    pub data: Bytes,
}

impl fmt::Display for ApplicationLayerFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApplicationLayerFeedback {:x} {:x} ({} octets)",
            self.sender_ssrc,
            self.media_ssrc,
            self.data.len()
        )
    }
}

impl Packet for ApplicationLayerFeedback {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: FORMAT_AFB,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + AFB_OFFSET + self.data.len()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<ApplicationLayerFeedback>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ApplicationLayerFeedback {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        // align to 32-bit boundary
        l + get_padding_size(l)
    }
}

impl Marshal for ApplicationLayerFeedback {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_slice(&self.data);

        let padding = get_padding_size(self.raw_size());
        for _ in 0..padding {
            buf.put_u8(0);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ApplicationLayerFeedback {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < HEADER_LENGTH + AFB_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT_AFB {
            return Err(Error::WrongType.into());
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();
        let data = raw_packet.copy_to_bytes(raw_packet.remaining());

        Ok(ApplicationLayerFeedback {
            sender_ssrc,
            media_ssrc,
            data,
        })
    }
}
