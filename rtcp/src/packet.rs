#[cfg(test)]
mod packet_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use util::marshal::{Marshal, Unmarshal};

use crate::error::Error;
use crate::goodbye::Goodbye;
use crate::header::*;
use crate::payload_feedbacks::application_layer_feedback::ApplicationLayerFeedback;
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::payload_feedbacks::reference_picture_selection_indication::ReferencePictureSelectionIndication;
use crate::payload_feedbacks::slice_loss_indication::SliceLossIndication;
use crate::raw_packet::RawPacket;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::tmmb::{TmmbNotification, TmmbRequest};
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;

type Result<T> = std::result::Result<T, util::Error>;

/// Packet represents an RTCP packet, a protocol used for out-of-band
/// statistics and control information for an RTP session.
pub trait Packet: Marshal + fmt::Display + fmt::Debug {
    /// Returns the common header associated with this packet.
    fn header(&self) -> Header;
    /// Returns the SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32>;
    /// Returns the encoded size before 32-bit alignment padding.
    fn raw_size(&self) -> usize;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool;
    fn cloned(&self) -> Box<dyn Packet + Send + Sync>;
}

impl PartialEq for dyn Packet + Send + Sync {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

/// Unmarshal takes an entire UDP datagram (which may consist of multiple RTCP
/// packets) and returns the unmarshaled packets it contains.
pub fn unmarshal<B>(raw_data: &mut B) -> Result<Vec<Box<dyn Packet + Send + Sync>>>
where
    B: Buf,
{
    let mut packets = vec![];

    while raw_data.has_remaining() {
        let p = unmarshaller(raw_data)?;
        packets.push(p);
    }

    match packets.len() {
        // Empty packet
        0 => Err(Error::InvalidHeader.into()),
        // One or more packets
        _ => Ok(packets),
    }
}

/// Marshal takes an array of Packets and serializes them to a single buffer.
pub fn marshal(packets: &[Box<dyn Packet + Send + Sync>]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    for p in packets {
        let data = p.marshal()?;
        out.extend_from_slice(&data);
    }
    Ok(out.freeze())
}

/// unmarshaller is a factory which pulls the first RTCP packet from a
/// bytestream and returns its parsed representation.
fn unmarshaller<B>(raw_data: &mut B) -> Result<Box<dyn Packet + Send + Sync>>
where
    B: Buf,
{
    if raw_data.remaining() < HEADER_LENGTH {
        return Err(Error::PacketTooShort.into());
    }

    let mut peek = raw_data.chunk();
    let h = Header::unmarshal(&mut peek)?;

    // The length of this sub-packet in bytes, including the common header.
    let length = (h.length as usize + 1) * 4;
    if length > raw_data.remaining() {
        return Err(Error::PacketTooShort.into());
    }

    let mut in_packet = raw_data.copy_to_bytes(length);

    let p: Box<dyn Packet + Send + Sync> = match h.packet_type {
        PacketType::SenderReport => Box::new(SenderReport::unmarshal(&mut in_packet)?),
        PacketType::ReceiverReport => Box::new(ReceiverReport::unmarshal(&mut in_packet)?),
        PacketType::SourceDescription => Box::new(SourceDescription::unmarshal(&mut in_packet)?),
        PacketType::Goodbye => Box::new(Goodbye::unmarshal(&mut in_packet)?),

        PacketType::TransportSpecificFeedback => match h.count {
            FORMAT_TLN => Box::new(TransportLayerNack::unmarshal(&mut in_packet)?),
            FORMAT_TMMBR => Box::new(TmmbRequest::unmarshal(&mut in_packet)?),
            FORMAT_TMMBN => Box::new(TmmbNotification::unmarshal(&mut in_packet)?),
            _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
        },

        PacketType::PayloadSpecificFeedback => match h.count {
            FORMAT_PLI => Box::new(PictureLossIndication::unmarshal(&mut in_packet)?),
            FORMAT_SLI => Box::new(SliceLossIndication::unmarshal(&mut in_packet)?),
            FORMAT_RPSI => {
                Box::new(ReferencePictureSelectionIndication::unmarshal(&mut in_packet)?)
            }
            FORMAT_FIR => Box::new(FullIntraRequest::unmarshal(&mut in_packet)?),
            FORMAT_AFB => Box::new(ApplicationLayerFeedback::unmarshal(&mut in_packet)?),
            _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
        },

        _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
    };

    Ok(p)
}
