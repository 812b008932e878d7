//! PSI section codec: parse/build long and short sections, CRC32 verified.

use crate::crc32::{crc32, Crc32};
use modular_bitfield_msb::prelude::*;

/// Maximum payload for a long section per spec.md §3 (private tables may
/// use up to 4093; PSI/SI tables such as PMT are limited to 1021).
pub const MAX_PRIVATE_SECTION_LENGTH: usize = 4093;
/// Maximum section length for a PMT (also used as the generic long-table
/// limit unless a table overrides it).
pub const MAX_PMT_SECTION_LENGTH: usize = 1021;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct SectionHeaderBits {
    table_id: B8,
    section_syntax_indicator: bool,
    private_bit: bool,
    reserved_bits: B2,
    section_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct TableSyntaxBits {
    table_id_extension: B16,
    reserved_bits: B2,
    version: B5,
    current_next_indicator: bool,
    section_number: B8,
    last_section_number: B8,
}

/// A fully parsed or to-be-built PSI section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// `table_id`.
    pub table_id: u8,
    /// Long-form fields; `None` for short sections (no CRC, no syntax header).
    pub long: Option<LongSectionFields>,
    /// Section payload, excluding any header bytes and the trailing CRC32.
    pub payload: Vec<u8>,
}

/// Fields present only in long-form sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongSectionFields {
    /// `table_id_extension` (e.g. transport_stream_id for the PAT).
    pub table_id_extension: u16,
    /// 5-bit version number, increments modulo 32.
    pub version: u8,
    /// `current_next_indicator`.
    pub current_next: bool,
    /// `section_number`.
    pub section_number: u8,
    /// `last_section_number`.
    pub last_section_number: u8,
}

/// Errors from [`Section::parse`] / [`Section::build`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not enough bytes to read a fixed-size header.
    #[error("short read: need {need} bytes, have {have}")]
    ShortRead { need: usize, have: usize },
    /// `section_length` exceeds the bound for its table class.
    #[error("section_length {0} exceeds the allowed bound")]
    SectionLengthOutOfBounds(usize),
    /// CRC32 at the end of a long section did not match the computed value.
    #[error("CRC32 mismatch: expected 0x{expected:08x}, computed 0x{computed:08x}")]
    CrcMismatch { expected: u32, computed: u32 },
    /// `section_number > last_section_number`.
    #[error("section_number {section_number} exceeds last_section_number {last_section_number}")]
    SectionNumberOutOfRange {
        section_number: u8,
        last_section_number: u8,
    },
}

/// Whether to verify CRC32 while parsing a long section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcPolicy {
    /// Reject sections whose CRC32 does not match (the default).
    Verify,
    /// Accept the section regardless of its CRC32 (spec.md §4.2's `IGNORE`).
    Ignore,
}

impl Section {
    /// Parses one section starting at `bytes[0]`. Returns the section and
    /// the total number of bytes it consumed (header + payload + CRC).
    pub fn parse(bytes: &[u8], crc_policy: CrcPolicy) -> Result<(Self, usize), Error> {
        if bytes.len() < 3 {
            return Err(Error::ShortRead {
                need: 3,
                have: bytes.len(),
            });
        }
        let header = SectionHeaderBits::from_bytes([bytes[0], bytes[1], bytes[2]]);
        let section_length = header.section_length() as usize;
        // The tighter 1021-byte bound for non-private long tables (e.g. PMT)
        // is enforced by the table serializer in `psi`, per spec.md §4.4;
        // the codec itself only rejects what the 12-bit field cannot carry
        // for any class of section.
        if section_length > MAX_PRIVATE_SECTION_LENGTH {
            return Err(Error::SectionLengthOutOfBounds(section_length));
        }
        let total_len = 3 + section_length;
        if bytes.len() < total_len {
            return Err(Error::ShortRead {
                need: total_len,
                have: bytes.len(),
            });
        }

        if !header.section_syntax_indicator() {
            // Short section: no table syntax, no CRC.
            return Ok((
                Section {
                    table_id: header.table_id(),
                    long: None,
                    payload: bytes[3..total_len].to_vec(),
                },
                total_len,
            ));
        }

        if section_length < 5 + 4 {
            return Err(Error::ShortRead {
                need: 5 + 4,
                have: section_length,
            });
        }
        let syntax_bytes = &bytes[3..8];
        let syntax = TableSyntaxBits::from_bytes([
            syntax_bytes[0],
            syntax_bytes[1],
            syntax_bytes[2],
            syntax_bytes[3],
            syntax_bytes[4],
        ]);
        let section_number = syntax.section_number();
        let last_section_number = syntax.last_section_number();
        if section_number > last_section_number {
            return Err(Error::SectionNumberOutOfRange {
                section_number,
                last_section_number,
            });
        }

        let payload_start = 8;
        let payload_end = total_len - 4;
        let payload = bytes[payload_start..payload_end].to_vec();

        let expected_crc = u32::from_be_bytes([
            bytes[payload_end],
            bytes[payload_end + 1],
            bytes[payload_end + 2],
            bytes[payload_end + 3],
        ]);
        if crc_policy == CrcPolicy::Verify {
            let computed = crc32(&bytes[0..payload_end]);
            if computed != expected_crc {
                return Err(Error::CrcMismatch {
                    expected: expected_crc,
                    computed,
                });
            }
        }

        Ok((
            Section {
                table_id: header.table_id(),
                long: Some(LongSectionFields {
                    table_id_extension: syntax.table_id_extension(),
                    version: syntax.version(),
                    current_next: syntax.current_next_indicator(),
                    section_number,
                    last_section_number,
                }),
                payload,
            },
            total_len,
        ))
    }

    /// Serializes this section into wire bytes (header, payload, CRC32).
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.payload.len() + 9);

        let mut header = SectionHeaderBits::new();
        header.set_table_id(self.table_id);
        header.set_section_syntax_indicator(self.long.is_some());
        header.set_private_bit(false);
        header.set_reserved_bits(0b11);

        let body_len = match &self.long {
            Some(_) => 5 + self.payload.len() + 4,
            None => self.payload.len(),
        };
        header.set_section_length(body_len as u16);
        out.extend_from_slice(&header.into_bytes());

        if let Some(long) = &self.long {
            let mut syntax = TableSyntaxBits::new();
            syntax.set_table_id_extension(long.table_id_extension);
            syntax.set_reserved_bits(0b11);
            syntax.set_version(long.version);
            syntax.set_current_next_indicator(long.current_next);
            syntax.set_section_number(long.section_number);
            syntax.set_last_section_number(long.last_section_number);
            out.extend_from_slice(&syntax.into_bytes());
            out.extend_from_slice(&self.payload);
            let crc = crc32(&out);
            out.extend_from_slice(&crc.to_be_bytes());
        } else {
            out.extend_from_slice(&self.payload);
        }

        out
    }
}

/// Streaming CRC check usable by the demux when it assembles a section
/// across multiple packets without buffering every header separately; kept
/// here so callers never re-implement the MPEG-2 CRC parameters.
pub fn verify_crc(full_section_bytes: &[u8]) -> Result<(), Error> {
    if full_section_bytes.len() < 4 {
        return Err(Error::ShortRead {
            need: 4,
            have: full_section_bytes.len(),
        });
    }
    let split = full_section_bytes.len() - 4;
    let mut h = Crc32::new();
    h.add(&full_section_bytes[..split]);
    let computed = h.value();
    let expected = u32::from_be_bytes([
        full_section_bytes[split],
        full_section_bytes[split + 1],
        full_section_bytes[split + 2],
        full_section_bytes[split + 3],
    ]);
    if computed != expected {
        return Err(Error::CrcMismatch { expected, computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_long_section_roundtrips() {
        let section = Section {
            table_id: 0x00,
            long: Some(LongSectionFields {
                table_id_extension: 0x1234,
                version: 3,
                current_next: true,
                section_number: 0,
                last_section_number: 0,
            }),
            payload: vec![0xAA, 0xBB, 0xCC, 0xDD],
        };
        let bytes = section.build();
        let (parsed, consumed) = Section::parse(&bytes, CrcPolicy::Verify).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, section);
    }

    #[test]
    fn rejects_bad_crc() {
        let section = Section {
            table_id: 0x00,
            long: Some(LongSectionFields {
                table_id_extension: 0,
                version: 0,
                current_next: true,
                section_number: 0,
                last_section_number: 0,
            }),
            payload: vec![1, 2, 3],
        };
        let mut bytes = section.build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Section::parse(&bytes, CrcPolicy::Verify),
            Err(Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn ignore_policy_accepts_bad_crc() {
        let section = Section {
            table_id: 0x00,
            long: Some(LongSectionFields {
                table_id_extension: 0,
                version: 0,
                current_next: true,
                section_number: 0,
                last_section_number: 0,
            }),
            payload: vec![1, 2, 3],
        };
        let mut bytes = section.build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(Section::parse(&bytes, CrcPolicy::Ignore).is_ok());
    }

    #[test]
    fn rejects_section_number_out_of_range() {
        let section = Section {
            table_id: 0x02,
            long: Some(LongSectionFields {
                table_id_extension: 0,
                version: 0,
                current_next: true,
                section_number: 1,
                last_section_number: 0,
            }),
            payload: vec![],
        };
        let bytes = section.build();
        assert!(matches!(
            Section::parse(&bytes, CrcPolicy::Verify),
            Err(Error::SectionNumberOutOfRange { .. })
        ));
    }

    #[test]
    fn short_section_has_no_crc() {
        let section = Section {
            table_id: 0x70,
            long: None,
            payload: vec![1, 2, 3],
        };
        let bytes = section.build();
        // header (3) + payload (3), no CRC appended.
        assert_eq!(bytes.len(), 6);
        let (parsed, consumed) = Section::parse(&bytes, CrcPolicy::Verify).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(parsed, section);
    }
}
