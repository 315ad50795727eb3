
use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;
use crate::util::get_padding_size;

type Result<T> = std::result::Result<T, util::Error>;

const SDES_SOURCE_LEN: usize = 4;
const SDES_TYPE_LEN: usize = 1;
const SDES_OCTET_COUNT_LEN: usize = 1;

/// SdesType is the item type used in the RTCP SDES control packet.
/// RTP SDES item types registered with IANA, see:
/// <https://www.iana.org/assignments/rtp-parameters/rtp-parameters.xhtml#rtp-parameters-5>
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum SdesType {
    #[default]
    SdesEnd = 0, // end of SDES list                RFC 3550, 6.5
    SdesCname = 1,    // canonical name                  RFC 3550, 6.5.1
    SdesName = 2,     // user name                       RFC 3550, 6.5.2
    SdesEmail = 3,    // user's electronic mail address  RFC 3550, 6.5.3
    SdesPhone = 4,    // user's phone number             RFC 3550, 6.5.4
    SdesLocation = 5, // geographic user location        RFC 3550, 6.5.5
    SdesTool = 6,     // name of application or tool     RFC 3550, 6.5.6
    SdesNote = 7,     // notice about the source         RFC 3550, 6.5.7
    SdesPrivate = 8,  // private extensions              RFC 3550, 6.5.8
}

impl fmt::Display for SdesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdesType::SdesEnd => "END",
            SdesType::SdesCname => "CNAME",
            SdesType::SdesName => "NAME",
            SdesType::SdesEmail => "EMAIL",
            SdesType::SdesPhone => "PHONE",
            SdesType::SdesLocation => "LOC",
            SdesType::SdesTool => "TOOL",
            SdesType::SdesNote => "NOTE",
            SdesType::SdesPrivate => "PRIV",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for SdesType {
    fn from(b: u8) -> Self {
        match b {
            1 => SdesType::SdesCname,
            2 => SdesType::SdesName,
            3 => SdesType::SdesEmail,
            4 => SdesType::SdesPhone,
            5 => SdesType::SdesLocation,
            6 => SdesType::SdesTool,
            7 => SdesType::SdesNote,
            8 => SdesType::SdesPrivate,
            _ => SdesType::SdesEnd,
        }
    }
}

/// A SourceDescriptionItem is a part of a SourceDescription that describes a
/// stream.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionItem {
    /// The type identifier for this item, e.g. CNAME for canonical name
    /// description.
    pub sdes_type: SdesType,
    /// Txt is a unicode text blob associated with the item. Its meaning varies
    /// based on the item's Type.
    pub text: Bytes,
}

impl SourceDescriptionItem {
    fn marshal_size(&self) -> usize {
        SDES_TYPE_LEN + SDES_OCTET_COUNT_LEN + self.text.len()
    }
}

/// A SourceDescriptionChunk contains items describing a single RTP source.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionChunk {
    /// The source (ssrc) or contributing source (csrc) identifier this packet
    /// describes.
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    /// The size of the chunk once marshaled, including the terminating END
    /// octet and the alignment padding.
    fn marshal_size(&self) -> usize {
        let mut len = SDES_SOURCE_LEN;
        for item in &self.items {
            len += item.marshal_size();
        }
        len += SDES_TYPE_LEN; // for the END terminator

        len + get_padding_size(len)
    }
}

/// A SourceDescription (SDES) packet describes the sources in an RTP stream.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl fmt::Display for SourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "Source Description:\n".to_string();
        for c in &self.chunks {
            out += format!("\t{:x}\n", c.source).as_str();
            for it in &c.items {
                out += format!("\t\t{:?}\n", it).as_str();
            }
        }
        write!(f, "{out}")
    }
}

impl Packet for SourceDescription {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        self.chunks.iter().map(|x| x.source).collect()
    }

    fn raw_size(&self) -> usize {
        let mut chunks_length = 0;
        for c in &self.chunks {
            chunks_length += c.marshal_size();
        }
        HEADER_LENGTH + chunks_length
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<SourceDescription>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        // Chunks are individually padded to the 32-bit boundary, so the raw
        // size is already aligned.
        self.raw_size()
    }
}

impl Marshal for SourceDescription {
    /// Marshal encodes the packet in binary.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if self.chunks.len() > COUNT_MAX {
            return Err(Error::TooManyChunks.into());
        }
        for c in &self.chunks {
            for it in &c.items {
                if it.sdes_type == SdesType::SdesEnd {
                    return Err(Error::SdesMissingType.into());
                }
                if it.text.len() > SDES_MAX_OCTET_COUNT {
                    return Err(Error::SdesTextTooLong.into());
                }
            }
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|    SC   |  PT=SDES=202  |             length            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |                          SSRC/CSRC_1                          |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           SDES items                          |
         * |                              ...                              |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         */
        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        for c in &self.chunks {
            let mut chunk_written = SDES_SOURCE_LEN;
            buf.put_u32(c.source);

            for it in &c.items {
                buf.put_u8(it.sdes_type as u8);
                buf.put_u8(it.text.len() as u8);
                buf.put_slice(&it.text);
                chunk_written += it.marshal_size();
            }

            // The list of items in each chunk is terminated by one or more
            // null octets, up to the next 32-bit boundary.
            buf.put_u8(SdesType::SdesEnd as u8);
            chunk_written += SDES_TYPE_LEN;
            for _ in 0..get_padding_size(chunk_written) {
                buf.put_u8(SdesType::SdesEnd as u8);
            }
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for SourceDescription {
    /// Unmarshal decodes the packet from binary.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::SourceDescription {
            return Err(Error::WrongType.into());
        }

        let mut chunks = Vec::with_capacity(h.count as usize);
        for _ in 0..h.count {
            if raw_packet.remaining() < SDES_SOURCE_LEN {
                return Err(Error::PacketTooShort.into());
            }
            let source = raw_packet.get_u32();
            let mut chunk_read = SDES_SOURCE_LEN;

            let mut items = vec![];
            loop {
                if !raw_packet.has_remaining() {
                    return Err(Error::PacketTooShort.into());
                }
                let sdes_type = SdesType::from(raw_packet.get_u8());
                chunk_read += SDES_TYPE_LEN;
                if sdes_type == SdesType::SdesEnd {
                    break;
                }

                if !raw_packet.has_remaining() {
                    return Err(Error::PacketTooShort.into());
                }
                let octet_count = raw_packet.get_u8() as usize;
                if raw_packet.remaining() < octet_count {
                    return Err(Error::PacketTooShort.into());
                }
                let text = raw_packet.copy_to_bytes(octet_count);
                chunk_read += SDES_OCTET_COUNT_LEN + octet_count;

                items.push(SourceDescriptionItem { sdes_type, text });
            }

            // Consume the null octets padding the chunk to the next 32-bit
            // boundary.
            let padding = get_padding_size(chunk_read);
            if raw_packet.remaining() < padding {
                return Err(Error::PacketTooShort.into());
            }
            raw_packet.advance(padding);

            chunks.push(SourceDescriptionChunk { source, items });
        }

        Ok(SourceDescription { chunks })
    }
}
