use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

type Result<T> = std::result::Result<T, util::Error>;

pub const RTP_VERSION: u8 = 2;

pub(crate) const VERSION_SHIFT: u8 = 6;
pub(crate) const VERSION_MASK: u8 = 0x3;
pub(crate) const PADDING_SHIFT: u8 = 5;
pub(crate) const PADDING_MASK: u8 = 0x1;
pub(crate) const EXTENSION_SHIFT: u8 = 4;
pub(crate) const EXTENSION_MASK: u8 = 0x1;
pub(crate) const CC_MASK: u8 = 0xF;
pub(crate) const MARKER_SHIFT: u8 = 7;
pub(crate) const MARKER_MASK: u8 = 0x1;
pub(crate) const PT_MASK: u8 = 0x7F;

pub(crate) const FIXED_HEADER_SIZE: usize = 12;
pub(crate) const EXTENSION_HEADER_SIZE: usize = 4;
pub(crate) const CSRC_LENGTH: usize = 4;

/// Header represents an RTP packet header.
///
/// The header extension is kept as the raw 16-bit profile identifier plus its
/// value bytes so that rewriting a packet preserves the extension
/// byte-for-byte.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extension_payload: Bytes,
}

impl Unmarshal for Header {
    /// Unmarshal parses the passed byte slice and stores the result in the Header.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if raw_packet.remaining() < FIXED_HEADER_SIZE {
            return Err(Error::ErrHeaderSizeInsufficient.into());
        }

        let b0 = raw_packet.get_u8();
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::ErrBadVersion.into());
        }

        let padding = (b0 >> PADDING_SHIFT & PADDING_MASK) > 0;
        let extension = (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0;
        let cc = (b0 & CC_MASK) as usize;

        let b1 = raw_packet.get_u8();
        let marker = (b1 >> MARKER_SHIFT & MARKER_MASK) > 0;
        let payload_type = b1 & PT_MASK;

        let sequence_number = raw_packet.get_u16();
        let timestamp = raw_packet.get_u32();
        let ssrc = raw_packet.get_u32();

        if raw_packet.remaining() < cc * CSRC_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient.into());
        }
        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(raw_packet.get_u32());
        }

        let (extension_profile, extension_payload) = if extension {
            if raw_packet.remaining() < EXTENSION_HEADER_SIZE {
                return Err(Error::ErrHeaderSizeInsufficientForExtension.into());
            }
            let extension_profile = raw_packet.get_u16();
            let extension_length = raw_packet.get_u16() as usize * 4;
            if raw_packet.remaining() < extension_length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension.into());
            }
            (
                extension_profile,
                raw_packet.copy_to_bytes(extension_length),
            )
        } else {
            (0, Bytes::new())
        };

        Ok(Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extension_payload,
        })
    }
}

impl MarshalSize for Header {
    /// MarshalSize returns the size of the header once marshaled.
    fn marshal_size(&self) -> usize {
        let mut size = FIXED_HEADER_SIZE + self.csrc.len() * CSRC_LENGTH;
        if self.extension {
            size += EXTENSION_HEADER_SIZE + self.extension_payload.len();
        }
        size
    }
}

impl Marshal for Header {
    /// Marshal serializes the header and writes it to the buffer.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::ErrShortBuffer.into());
        }

        // The first byte contains the version, padding bit, extension bit
        // and csrc size.
        let mut b0 = (self.version << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        buf.put_u8(b0);

        // The second byte contains the marker bit and payload type.
        let mut b1 = self.payload_type;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            if self.extension_payload.len() % 4 != 0 {
                return Err(Error::ErrHeaderExtensionPayloadNotAligned.into());
            }
            buf.put_u16(self.extension_profile);
            buf.put_u16((self.extension_payload.len() / 4) as u16);
            buf.put_slice(&self.extension_payload);
        }

        Ok(self.marshal_size())
    }
}
