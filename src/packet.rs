//! The 188-byte MPEG-TS packet view: header, adaptation field, payload.

use modular_bitfield_msb::prelude::*;

/// Size in bytes of one TS packet.
pub const PACKET_SIZE: usize = 188;

/// Sync byte that must start every TS packet.
pub const SYNC_BYTE: u8 = 0x47;

/// Null PID; packets on this PID carry no meaningful payload.
pub const PID_NULL: u16 = 0x1FFF;

/// Link-layer header found at the start of every TS packet.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub sync_byte: B8,
    pub transport_error: bool,
    pub pusi: bool,
    pub priority: bool,
    pub pid: B13,
    pub scrambling_control: B2,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: B4,
}

/// Adaptation field header (the flags byte following the length byte).
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct AdaptationFieldHeader {
    pub length: B8,
    pub discontinuity: bool,
    pub random_access: bool,
    pub priority: bool,
    pub has_pcr: bool,
    pub has_opcr: bool,
    pub has_splice_countdown: bool,
    pub has_transport_private_data: bool,
    pub has_adaptation_field_extension: bool,
}

/// Error returned by [`TsPacket::parse`].
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The packet is not 188 bytes.
    #[error("packet is {0} bytes, expected {PACKET_SIZE}")]
    WrongSize(usize),
    /// `sync_byte` was not 0x47.
    #[error("lost sync: first byte was 0x{0:02x}")]
    LostSync(u8),
    /// `adaptation_field_control == 0` (reserved) was encountered.
    #[error("packet has adaptation_field_control == 0 (reserved)")]
    ReservedAdaptationControl,
    /// The adaptation field's own length byte put it out of bounds.
    #[error("adaptation field length {0} overruns the packet")]
    BadAdaptationLength(usize),
}

/// A borrowed view over one 188-byte TS packet.
///
/// Does not copy the underlying bytes; accessors decode bitfields on demand.
pub struct TsPacket<'a> {
    bytes: &'a [u8; PACKET_SIZE],
    header: PacketHeader,
    payload_offset: usize,
}

impl<'a> TsPacket<'a> {
    /// Parses a 188-byte packet, validating the sync byte and the
    /// adaptation-field/payload-control invariant.
    pub fn parse(bytes: &'a [u8; PACKET_SIZE]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if header.sync_byte() != SYNC_BYTE {
            return Err(PacketError::LostSync(bytes[0]));
        }
        if !header.has_adaptation_field() && !header.has_payload() {
            return Err(PacketError::ReservedAdaptationControl);
        }

        let mut offset = 4;
        if header.has_adaptation_field() {
            if offset >= PACKET_SIZE {
                return Err(PacketError::BadAdaptationLength(0));
            }
            let af_len = bytes[offset] as usize;
            offset += 1;
            if offset + af_len > PACKET_SIZE {
                return Err(PacketError::BadAdaptationLength(af_len));
            }
            offset += af_len;
        }

        Ok(Self {
            bytes,
            header,
            payload_offset: offset,
        })
    }

    /// 13-bit packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid()
    }

    /// Payload Unit Start Indicator.
    pub fn pusi(&self) -> bool {
        self.header.pusi()
    }

    /// 4-bit continuity counter.
    pub fn continuity_counter(&self) -> u8 {
        self.header.continuity_counter()
    }

    /// Whether this packet carries a payload at all.
    pub fn has_payload(&self) -> bool {
        self.header.has_payload()
    }

    /// Payload bytes, empty if `has_payload()` is false.
    pub fn payload(&self) -> &'a [u8] {
        if self.header.has_payload() {
            &self.bytes[self.payload_offset..]
        } else {
            &[]
        }
    }

    /// True for packets with random_access_indicator set in the adaptation field.
    pub fn random_access(&self) -> bool {
        if !self.header.has_adaptation_field() || self.bytes.len() < 6 {
            return false;
        }
        // Adaptation field: byte[4] = length, byte[5] bit 0x40 = random_access_indicator.
        self.bytes[4] > 0 && (self.bytes[5] & 0x40) != 0
    }
}

/// Builds a 188-byte TS packet buffer for output.
///
/// Used by the cycling packetizer (section payloads) and by the EIT
/// processor (nullified packets).
pub fn build_packet(pid: u16, pusi: bool, continuity_counter: u8, payload: &[u8]) -> [u8; PACKET_SIZE] {
    assert!(payload.len() <= PACKET_SIZE - 4, "payload too large");
    let mut header = PacketHeader::new();
    header.set_sync_byte(SYNC_BYTE);
    header.set_transport_error(false);
    header.set_pusi(pusi);
    header.set_priority(false);
    header.set_pid(pid);
    header.set_scrambling_control(0);
    header.set_has_adaptation_field(false);
    header.set_has_payload(true);
    header.set_continuity_counter(continuity_counter & 0x0F);

    let mut out = [0xFFu8; PACKET_SIZE];
    out[0..4].copy_from_slice(&header.into_bytes());
    let stuff = PACKET_SIZE - 4 - payload.len();
    out[4..4 + payload.len()].copy_from_slice(payload);
    if stuff > 0 {
        out[4 + payload.len()..].fill(0xFF);
    }
    out
}

/// Builds a null packet (PID 0x1FFF, zeroed payload) occupying the slot of
/// a dropped or filtered packet. Does not touch the continuity counter
/// field, matching spec.md's "CC left untouched" requirement for the
/// original packet it replaces.
pub fn nullify_packet(original: &[u8; PACKET_SIZE]) -> [u8; PACKET_SIZE] {
    let header = PacketHeader::from_bytes([original[0], original[1], original[2], original[3]]);
    let mut new_header = PacketHeader::new();
    new_header.set_sync_byte(SYNC_BYTE);
    new_header.set_transport_error(false);
    new_header.set_pusi(false);
    new_header.set_priority(false);
    new_header.set_pid(PID_NULL);
    new_header.set_scrambling_control(0);
    new_header.set_has_adaptation_field(false);
    new_header.set_has_payload(true);
    new_header.set_continuity_counter(header.continuity_counter());

    let mut out = [0u8; PACKET_SIZE];
    out[0..4].copy_from_slice(&new_header.into_bytes());
    out
}
