use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

type Result<T> = std::result::Result<T, util::Error>;

const RPSI_OFFSET: usize = 8;
const RPSI_FCI_HEADER_LEN: usize = 2;

/// The ReferencePictureSelectionIndication packet carries the native RPSI
/// message of the codec identified by its payload type (RFC 4585 section
/// 6.3.3).
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ReferencePictureSelectionIndication {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    /// RTP payload type of the codec the native RPSI message belongs to.
    pub payload_type: u8,
    /// Native RPSI bit string as defined by the codec.
    pub bit_string: Bytes,
}

impl fmt::Display for ReferencePictureSelectionIndication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReferencePictureSelectionIndication {:x} {:x} pt={} ({} bit string octets)",
            self.sender_ssrc,
            self.media_ssrc,
            self.payload_type,
            self.bit_string.len()
        )
    }
}

impl ReferencePictureSelectionIndication {
    /// The number of zero bytes appended to the bit string to reach the next
    /// 32-bit boundary.
    fn padding_bytes(&self) -> usize {
        let fci = RPSI_FCI_HEADER_LEN + self.bit_string.len();
        if fci % 4 == 0 {
            0
        } else {
            4 - (fci % 4)
        }
    }
}

impl Packet for ReferencePictureSelectionIndication {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_RPSI,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + RPSI_OFFSET + RPSI_FCI_HEADER_LEN + self.bit_string.len()
            + self.padding_bytes()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<ReferencePictureSelectionIndication>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ReferencePictureSelectionIndication {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for ReferencePictureSelectionIndication {
    /// Marshal encodes the ReferencePictureSelectionIndication in binary.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |      PB       |0| Payload Type|    Native RPSI bit string     |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |   defined per codec          ...                | Padding (0) |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);

        let padding_bytes = self.padding_bytes();
        buf.put_u8((padding_bytes * 8) as u8);
        buf.put_u8(self.payload_type & 0x7f);
        buf.put_slice(&self.bit_string);
        for _ in 0..padding_bytes {
            buf.put_u8(0);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ReferencePictureSelectionIndication {
    /// Unmarshal decodes the ReferencePictureSelectionIndication from binary.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < HEADER_LENGTH + RPSI_OFFSET + RPSI_FCI_HEADER_LEN {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT_RPSI {
            return Err(Error::WrongType.into());
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let padding_bits = raw_packet.get_u8() as usize;
        let payload_type = raw_packet.get_u8() & 0x7f;

        let padding_bytes = padding_bits / 8;
        let remaining = raw_packet.remaining();
        if padding_bits % 8 != 0 || padding_bytes > remaining {
            return Err(Error::RpsiBitStringTooLong.into());
        }

        let bit_string = raw_packet.copy_to_bytes(remaining - padding_bytes);
        raw_packet.advance(padding_bytes);

        Ok(ReferencePictureSelectionIndication {
            sender_ssrc,
            media_ssrc,
            payload_type,
            bit_string,
        })
    }
}
