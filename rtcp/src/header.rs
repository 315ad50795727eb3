use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

type Result<T> = std::result::Result<T, util::Error>;

pub(crate) const RTP_VERSION: u8 = 2;
pub(crate) const VERSION_SHIFT: u8 = 6;
pub(crate) const VERSION_MASK: u8 = 0x3;
pub(crate) const PADDING_SHIFT: u8 = 5;
pub(crate) const PADDING_MASK: u8 = 0x1;
pub(crate) const COUNT_SHIFT: u8 = 0;
pub(crate) const COUNT_MASK: u8 = 0x1f;

pub const HEADER_LENGTH: usize = 4;
pub const COUNT_MAX: usize = (1 << 5) - 1;
pub const SSRC_LENGTH: usize = 4;
pub const SDES_MAX_OCTET_COUNT: usize = (1 << 8) - 1;

/// Payload-specific feedback messages overload the count field to act as a
/// message type (RFC 4585 section 6.3, RFC 5104 section 4.3).
pub const FORMAT_PLI: u8 = 1;
pub const FORMAT_SLI: u8 = 2;
pub const FORMAT_RPSI: u8 = 3;
pub const FORMAT_FIR: u8 = 4;
pub const FORMAT_AFB: u8 = 15;

/// Transport-layer feedback messages do the same (RFC 4585 section 6.2,
/// RFC 5104 section 4.2).
pub const FORMAT_TLN: u8 = 1;
pub const FORMAT_TMMBR: u8 = 3;
pub const FORMAT_TMMBN: u8 = 4;

/// PacketType specifies the type of an RTCP packet.
/// RTCP packet types registered with IANA, see:
/// <https://www.iana.org/assignments/rtp-parameters/rtp-parameters.xhtml#rtp-parameters-4>
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    #[default]
    Unsupported = 0,
    SenderReport = 200,              // RFC 3550, 6.4.1
    ReceiverReport = 201,            // RFC 3550, 6.4.2
    SourceDescription = 202,         // RFC 3550, 6.5
    Goodbye = 203,                   // RFC 3550, 6.6
    ApplicationDefined = 204,        // RFC 3550, 6.7
    TransportSpecificFeedback = 205, // RFC 4585, 6.2
    PayloadSpecificFeedback = 206,   // RFC 4585, 6.3
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Unsupported => "Unsupported",
            PacketType::SenderReport => "SR",
            PacketType::ReceiverReport => "RR",
            PacketType::SourceDescription => "SDES",
            PacketType::Goodbye => "BYE",
            PacketType::ApplicationDefined => "APP",
            PacketType::TransportSpecificFeedback => "TSFB",
            PacketType::PayloadSpecificFeedback => "PSFB",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for PacketType {
    fn from(b: u8) -> Self {
        match b {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            205 => PacketType::TransportSpecificFeedback,
            206 => PacketType::PayloadSpecificFeedback,
            _ => PacketType::Unsupported,
        }
    }
}

/// A Header is the common header shared by all RTCP packets.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Header {
    /// If the padding bit is set, this individual RTCP packet contains
    /// some additional padding octets at the end which are not part of
    /// the control information but are included in the length field.
    pub padding: bool,
    /// The number of reception reports, sources contained or FMT in this
    /// packet (depending on the Type).
    pub count: u8,
    /// The RTCP packet type for this packet.
    pub packet_type: PacketType,
    /// The length of this RTCP packet in 32-bit words minus one,
    /// including the header and any padding.
    pub length: u16,
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    /// Marshal encodes the Header in binary.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < HEADER_LENGTH {
            return Err(Error::BufferTooShort.into());
        }
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|    RC   |   PT=SR=200   |             length            |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if self.count > 31 {
            return Err(Error::InvalidHeader.into());
        }

        let mut b0 = RTP_VERSION << VERSION_SHIFT;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        b0 |= self.count << COUNT_SHIFT;

        buf.put_u8(b0);
        buf.put_u8(self.packet_type as u8);
        buf.put_u16(self.length);

        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    /// Unmarshal decodes the Header from binary.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let b0 = raw_packet.get_u8();
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::BadVersion.into());
        }

        let padding = (b0 >> PADDING_SHIFT & PADDING_MASK) > 0;
        let count = b0 >> COUNT_SHIFT & COUNT_MASK;
        let packet_type = PacketType::from(raw_packet.get_u8());
        let length = raw_packet.get_u16();

        Ok(Header {
            padding,
            count,
            packet_type,
            length,
        })
    }
}
