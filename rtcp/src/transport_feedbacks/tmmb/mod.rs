
use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::Packet;

type Result<T> = std::result::Result<T, util::Error>;

const TMMB_OFFSET: usize = 8;
const TMMB_ENTRY_LENGTH: usize = 8;

/// One item of a TMMBR/TMMBN FCI: a tuple limit for a media sender
/// (RFC 5104 section 4.2.1.1).
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TmmbEntry {
    /// SSRC of the media sender the limit applies to.
    pub ssrc: u32,
    /// Maximum total media bitrate in bits per second.
    pub bitrate: u64,
    /// Measured per-packet overhead in bytes, 9 bits.
    pub overhead: u16,
}

impl TmmbEntry {
    /// Encodes the bitrate into the 6-bit exponent plus 17-bit mantissa wire
    /// form. Values too large for the mantissa lose precision, as the RFC
    /// prescribes.
    fn encode_bitrate(&self) -> (u8, u32) {
        let mut exp = 0u8;
        let mut mantissa = self.bitrate;
        while mantissa >= (1 << 17) {
            mantissa >>= 1;
            exp += 1;
        }
        (exp, mantissa as u32)
    }
}

fn unmarshal_entry<B: Buf>(raw_packet: &mut B) -> TmmbEntry {
    /*
     *  0                   1                   2                   3
     *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
     * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     * |                              SSRC                             |
     * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     * | MxTBR Exp |  MxTBR Mantissa                 |Measured Overhead|
     * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     */
    let ssrc = raw_packet.get_u32();
    let fields = raw_packet.get_u32();

    let exp = (fields >> 26) as u8;
    let mantissa = (fields >> 9) & 0x1ffff;
    let overhead = (fields & 0x1ff) as u16;

    TmmbEntry {
        ssrc,
        bitrate: (mantissa as u64) << exp,
        overhead,
    }
}

fn marshal_entry(entry: &TmmbEntry, buf: &mut &mut [u8]) {
    let (exp, mantissa) = entry.encode_bitrate();
    let fields = (exp as u32) << 26 | mantissa << 9 | (entry.overhead & 0x1ff) as u32;

    buf.put_u32(entry.ssrc);
    buf.put_u32(fields);
}

macro_rules! tmmb_packet {
    ($name:ident, $format:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, PartialEq, Eq, Default, Clone)]
        pub struct $name {
            /// SSRC of sender
            pub sender_ssrc: u32,
            /// SSRC of the media source; always zero, the targets are listed
            /// in the FCI entries.
            pub media_ssrc: u32,

            pub entries: Vec<TmmbEntry>,
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{} {:x} {:?}",
                    stringify!($name),
                    self.sender_ssrc,
                    self.entries
                )
            }
        }

        impl Packet for $name {
            fn header(&self) -> Header {
                Header {
                    padding: false,
                    count: $format,
                    packet_type: PacketType::TransportSpecificFeedback,
                    length: ((self.marshal_size() / 4) - 1) as u16,
                }
            }

            /// destination_ssrc returns an array of SSRC values that this packet refers to.
            fn destination_ssrc(&self) -> Vec<u32> {
                self.entries.iter().map(|e| e.ssrc).collect()
            }

            fn raw_size(&self) -> usize {
                HEADER_LENGTH + TMMB_OFFSET + self.entries.len() * TMMB_ENTRY_LENGTH
            }

            fn as_any(&self) -> &(dyn Any + Send + Sync) {
                self
            }

            fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
                other
                    .as_any()
                    .downcast_ref::<$name>()
                    .map_or(false, |a| self == a)
            }

            fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
                Box::new(self.clone())
            }
        }

        impl MarshalSize for $name {
            fn marshal_size(&self) -> usize {
                self.raw_size()
            }
        }

        impl Marshal for $name {
            fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
                if buf.remaining_mut() < self.marshal_size() {
                    return Err(Error::BufferTooShort.into());
                }

                let h = self.header();
                let n = h.marshal_to(buf)?;
                buf = &mut buf[n..];

                buf.put_u32(self.sender_ssrc);
                buf.put_u32(self.media_ssrc);

                for entry in &self.entries {
                    marshal_entry(entry, &mut buf);
                }

                Ok(self.marshal_size())
            }
        }

        impl Unmarshal for $name {
            fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
            where
                Self: Sized,
                B: Buf,
            {
                let raw_packet_len = raw_packet.remaining();
                if raw_packet_len < HEADER_LENGTH + TMMB_OFFSET {
                    return Err(Error::PacketTooShort.into());
                }

                let h = Header::unmarshal(raw_packet)?;
                if h.packet_type != PacketType::TransportSpecificFeedback || h.count != $format {
                    return Err(Error::WrongType.into());
                }

                let sender_ssrc = raw_packet.get_u32();
                let media_ssrc = raw_packet.get_u32();

                let mut entries = vec![];
                while raw_packet.remaining() >= TMMB_ENTRY_LENGTH {
                    entries.push(unmarshal_entry(raw_packet));
                }

                Ok($name {
                    sender_ssrc,
                    media_ssrc,
                    entries,
                })
            }
        }
    };
}

tmmb_packet!(
    TmmbRequest,
    FORMAT_TMMBR,
    "The TemporaryMaximumMediaStreamBitRateRequest asks a media sender to cap its total bitrate (RFC 5104 section 4.2.1)."
);
tmmb_packet!(
    TmmbNotification,
    FORMAT_TMMBN,
    "The TemporaryMaximumMediaStreamBitRateNotification echoes the current bounding set of bitrate limits (RFC 5104 section 4.2.2)."
);
