//! Typed PSI tables (PAT, CAT, SDT, PMT, EIT) built on top of [`crate::section`].
//!
//! Each table type provides `from_sections`/`to_sections` for the wire
//! representation and a `merge` operation used by the file cleaner driver
//! (C9) to fold successive table generations into one authoritative view,
//! per spec.md §4.6, grounded directly on
//! `examples/original_source/src/tstools/tsfclean.cpp`'s
//! `handlePAT`/`handleCAT`/`handleSDT`/`handlePMT`.

use crate::packet::PID_NULL;
use crate::section::{LongSectionFields, Section};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// `table_id` constants used throughout the demux, merger and EIT filter.
pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const SDT_OTHER: u8 = 0x46;
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
    pub const EIT_PF_OTHER: u8 = 0x4F;
    pub const EIT_SCHEDULE_ACTUAL_FIRST: u8 = 0x50;
    pub const EIT_SCHEDULE_ACTUAL_LAST: u8 = 0x5F;
    pub const EIT_SCHEDULE_OTHER_FIRST: u8 = 0x60;
    pub const EIT_SCHEDULE_OTHER_LAST: u8 = 0x6F;
}

/// Reserved PIDs per spec.md §3.
pub mod pid {
    pub const PAT: u16 = 0x0000;
    pub const CAT: u16 = 0x0001;
    pub const SDT: u16 = 0x0011;
    pub const EIT: u16 = 0x0012;
}

/// A single PSI descriptor: a tag byte and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// `descriptor_tag`.
    pub tag: u8,
    /// Raw descriptor payload (excludes tag and length bytes).
    pub data: SmallVec<[u8; 16]>,
}

/// Conditional-access descriptor tag (CAT/PMT scope).
pub const CA_DESCRIPTOR_TAG: u8 = 0x09;

impl Descriptor {
    /// Parses one `{tag, length, data}` descriptor from `bytes`, returning
    /// it and the number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> Option<(Self, usize)> {
        if bytes.len() < 2 {
            return None;
        }
        let tag = bytes[0];
        let len = bytes[1] as usize;
        if bytes.len() < 2 + len {
            return None;
        }
        Some((
            Descriptor {
                tag,
                data: SmallVec::from_slice(&bytes[2..2 + len]),
            },
            2 + len,
        ))
    }

    /// Serializes this descriptor back to `{tag, length, data}`.
    pub fn build(&self, out: &mut Vec<u8>) {
        out.push(self.tag);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
    }

    /// If this is a CA_descriptor, the CA PID it carries (bottom 13 bits of
    /// bytes 2..4 following the 2-byte CA_system_id).
    pub fn ca_pid(&self) -> Option<u16> {
        if self.tag != CA_DESCRIPTOR_TAG || self.data.len() < 4 {
            return None;
        }
        Some((((self.data[2] as u16) << 8) | self.data[3] as u16) & 0x1FFF)
    }
}

/// Parses a run of descriptors filling exactly `bytes`.
pub fn parse_descriptor_list(bytes: &[u8]) -> Vec<Descriptor> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match Descriptor::parse(&bytes[pos..]) {
            Some((d, used)) => {
                out.push(d);
                pos += used;
            }
            None => break,
        }
    }
    out
}

/// Serializes a descriptor list.
pub fn build_descriptor_list(descriptors: &[Descriptor]) -> Vec<u8> {
    let mut out = Vec::new();
    for d in descriptors {
        d.build(&mut out);
    }
    out
}

/// Packs `entries` (each a complete, non-splittable byte blob) into section
/// payloads no longer than `max_len`, repeating `prefix` at the start of
/// every payload. Mirrors `Pmt::to_sections`'s chunking so a table with more
/// content than fits in one section emits as many as it needs instead of
/// silently overflowing the 12-bit `section_length` bound.
fn pack_into_sections(prefix: &[u8], entries: &[Vec<u8>], max_len: usize) -> Vec<Vec<u8>> {
    let mut sections: Vec<Vec<u8>> = Vec::new();
    let mut current = prefix.to_vec();
    for entry in entries {
        if current.len() + entry.len() > max_len && current.len() > prefix.len() {
            sections.push(std::mem::replace(&mut current, prefix.to_vec()));
        }
        current.extend_from_slice(entry);
    }
    sections.push(current);
    sections
}

/// Merges `incoming` into `existing` by value: descriptors already present
/// (exact tag+data match) are skipped, new ones are appended in
/// first-seen order. Idempotent: `merge_descriptors(x, &x.clone())` is a
/// no-op, per spec.md §4.6.
pub fn merge_descriptors(existing: &mut Vec<Descriptor>, incoming: &[Descriptor]) {
    for d in incoming {
        if !existing.contains(d) {
            existing.push(d.clone());
        }
    }
}

/// Error raised when a table generation cannot be merged into the current
/// authoritative view.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A service's PMT PID changed across PAT versions (spec.md §3 invariant).
    #[error("service 0x{service_id:04x} changed PMT PID from 0x{old_pid:04x} to 0x{new_pid:04x}")]
    PmtPidChanged {
        service_id: u16,
        old_pid: u16,
        new_pid: u16,
    },
}

// ---------------------------------------------------------------------
// PAT
// ---------------------------------------------------------------------

/// Program Association Table.
#[derive(Debug, Clone, Default)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    /// service_id → PMT PID.
    pub pmts: BTreeMap<u16, u16>,
    /// NIT PID, if a service_id == 0 entry was present.
    pub nit_pid: Option<u16>,
    pub valid: bool,
}

impl Pat {
    /// Builds an invalid (not-yet-seen) PAT, matching the original's
    /// `_pat.invalidate()` prior to the first sighting.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Deserializes a complete PAT generation (all sections, 0..=last,
    /// sharing the same `table_id_extension`/`version`).
    pub fn from_sections(sections: &[Section]) -> Option<Self> {
        let first = sections.first()?;
        let long = first.long.as_ref()?;
        let mut pat = Pat {
            transport_stream_id: long.table_id_extension,
            version: long.version,
            current_next: long.current_next,
            pmts: BTreeMap::new(),
            nit_pid: None,
            valid: true,
        };
        for section in sections {
            let mut payload = section.payload.as_slice();
            while payload.len() >= 4 {
                let program_num = u16::from_be_bytes([payload[0], payload[1]]);
                let pmt_pid = (((payload[2] as u16) << 8) | payload[3] as u16) & 0x1FFF;
                if program_num == 0 {
                    pat.nit_pid = Some(pmt_pid);
                } else {
                    pat.pmts.insert(program_num, pmt_pid);
                }
                payload = &payload[4..];
            }
        }
        Some(pat)
    }

    /// Serializes into one or more sections, 4 bytes per entry, packed up
    /// to the generic long-table limit.
    pub fn to_sections(&self) -> Vec<Section> {
        let mut entries: Vec<(u16, u16)> = Vec::new();
        if let Some(nit_pid) = self.nit_pid {
            entries.push((0, nit_pid));
        }
        entries.extend(self.pmts.iter().map(|(&sid, &pid)| (sid, pid)));

        const MAX_ENTRIES_PER_SECTION: usize = crate::section::MAX_PMT_SECTION_LENGTH / 4;
        let chunks: Vec<&[(u16, u16)]> = if entries.is_empty() {
            vec![&[]]
        } else {
            entries.chunks(MAX_ENTRIES_PER_SECTION).collect()
        };
        let last_section_number = (chunks.len() - 1) as u8;

        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut payload = Vec::with_capacity(chunk.len() * 4);
                for &(program_num, pid) in chunk.iter() {
                    payload.extend_from_slice(&program_num.to_be_bytes());
                    payload.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
                    payload.push((pid & 0xFF) as u8);
                }
                Section {
                    table_id: table_id::PAT,
                    long: Some(LongSectionFields {
                        table_id_extension: self.transport_stream_id,
                        version: self.version,
                        current_next: self.current_next,
                        section_number: i as u8,
                        last_section_number,
                    }),
                    payload,
                }
            })
            .collect()
    }

    /// Folds `incoming` into `self`, per spec.md §4.6: on first sighting,
    /// adopt wholesale and force `nit_pid` to null; otherwise add new
    /// services and reject conflicting PMT PID reassignment.
    pub fn merge(&mut self, incoming: Pat) -> Result<(), MergeError> {
        if !self.valid {
            *self = incoming;
            self.nit_pid = Some(PID_NULL);
            return Ok(());
        }
        for (service_id, pmt_pid) in incoming.pmts {
            match self.pmts.get(&service_id) {
                None => {
                    log::info!("added service 0x{service_id:04x} from PAT update");
                    self.pmts.insert(service_id, pmt_pid);
                }
                Some(&existing_pid) if existing_pid != pmt_pid => {
                    return Err(MergeError::PmtPidChanged {
                        service_id,
                        old_pid: existing_pid,
                        new_pid: pmt_pid,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// CAT
// ---------------------------------------------------------------------

/// Conditional Access Table.
#[derive(Debug, Clone, Default)]
pub struct Cat {
    pub version: u8,
    pub current_next: bool,
    pub descriptors: Vec<Descriptor>,
    pub valid: bool,
}

impl Cat {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: &[Section]) -> Option<Self> {
        let first = sections.first()?;
        let long = first.long.as_ref()?;
        let mut descriptors = Vec::new();
        for section in sections {
            descriptors.extend(parse_descriptor_list(&section.payload));
        }
        Some(Cat {
            version: long.version,
            current_next: long.current_next,
            descriptors,
            valid: true,
        })
    }

    pub fn to_sections(&self) -> Vec<Section> {
        let entries: Vec<Vec<u8>> = self
            .descriptors
            .iter()
            .map(|d| {
                let mut bytes = Vec::new();
                d.build(&mut bytes);
                bytes
            })
            .collect();
        let payloads = pack_into_sections(&[], &entries, crate::section::MAX_PMT_SECTION_LENGTH);
        let last_section_number = (payloads.len() - 1) as u8;
        payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| Section {
                table_id: table_id::CAT,
                long: Some(LongSectionFields {
                    table_id_extension: 0xFFFF,
                    version: self.version,
                    current_next: self.current_next,
                    section_number: i as u8,
                    last_section_number,
                }),
                payload,
            })
            .collect()
    }

    /// Adopts the first CAT seen, otherwise merges descriptor lists by value.
    pub fn merge(&mut self, incoming: Cat) {
        if !self.valid {
            *self = incoming;
        } else {
            merge_descriptors(&mut self.descriptors, &incoming.descriptors);
        }
    }
}

// ---------------------------------------------------------------------
// SDT
// ---------------------------------------------------------------------

/// One service entry in the SDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub running_status: u8,
    pub free_ca_mode: bool,
    pub descriptors: Vec<Descriptor>,
}

/// Service Description Table (actual transport stream).
#[derive(Debug, Clone, Default)]
pub struct Sdt {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub services: BTreeMap<u16, ServiceInfo>,
    pub valid: bool,
}

impl Sdt {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: &[Section]) -> Option<Self> {
        let first = sections.first()?;
        let long = first.long.as_ref()?;
        if first.payload.len() < 2 {
            return None;
        }
        let original_network_id = u16::from_be_bytes([first.payload[0], first.payload[1]]);
        let mut sdt = Sdt {
            transport_stream_id: long.table_id_extension,
            original_network_id,
            version: long.version,
            current_next: long.current_next,
            services: BTreeMap::new(),
            valid: true,
        };
        for section in sections {
            // skip original_network_id(2) + reserved(1)
            let mut payload = &section.payload[3.min(section.payload.len())..];
            while payload.len() >= 5 {
                let service_id = u16::from_be_bytes([payload[0], payload[1]]);
                let running_status = (payload[3] >> 5) & 0x07;
                let free_ca_mode = (payload[3] & 0x10) != 0;
                let loop_len = (((payload[3] as usize) & 0x0F) << 8) | payload[4] as usize;
                if payload.len() < 5 + loop_len {
                    break;
                }
                let descriptors = parse_descriptor_list(&payload[5..5 + loop_len]);
                sdt.services.insert(
                    service_id,
                    ServiceInfo {
                        running_status,
                        free_ca_mode,
                        descriptors,
                    },
                );
                payload = &payload[5 + loop_len..];
            }
        }
        Some(sdt)
    }

    pub fn to_sections(&self) -> Vec<Section> {
        let prefix = {
            let mut p = Vec::with_capacity(3);
            p.extend_from_slice(&self.original_network_id.to_be_bytes());
            p.push(0xFF); // reserved_future_use
            p
        };

        let entries: Vec<Vec<u8>> = self
            .services
            .iter()
            .map(|(&service_id, info)| {
                let desc_bytes = build_descriptor_list(&info.descriptors);
                let mut entry = Vec::with_capacity(5 + desc_bytes.len());
                entry.extend_from_slice(&service_id.to_be_bytes());
                entry.push(0xFC); // reserved_future_use(3) + EIT_schedule/present_following_flag(2), unset
                let byte4 = ((info.running_status & 0x07) << 5)
                    | ((info.free_ca_mode as u8) << 4)
                    | (((desc_bytes.len() as u16 >> 8) & 0x0F) as u8);
                entry.push(byte4);
                entry.push((desc_bytes.len() & 0xFF) as u8);
                entry.extend_from_slice(&desc_bytes);
                entry
            })
            .collect();

        let payloads = pack_into_sections(&prefix, &entries, crate::section::MAX_PMT_SECTION_LENGTH);
        let last_section_number = (payloads.len() - 1) as u8;

        payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| Section {
                table_id: table_id::SDT_ACTUAL,
                long: Some(LongSectionFields {
                    table_id_extension: self.transport_stream_id,
                    version: self.version,
                    current_next: self.current_next,
                    section_number: i as u8,
                    last_section_number,
                }),
                payload,
            })
            .collect()
    }

    /// Adopts the first SDT, otherwise adds new services and merges
    /// descriptor lists of existing ones by value.
    pub fn merge(&mut self, incoming: Sdt) {
        if !self.valid {
            *self = incoming;
            return;
        }
        for (service_id, info) in incoming.services {
            match self.services.get_mut(&service_id) {
                None => {
                    log::info!("added service 0x{service_id:04x} from SDT update");
                    self.services.insert(service_id, info);
                }
                Some(existing) => {
                    merge_descriptors(&mut existing.descriptors, &info.descriptors);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// PMT
// ---------------------------------------------------------------------

/// One elementary stream entry in a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_type: u8,
    pub descriptors: Vec<Descriptor>,
}

/// Program Map Table for one service.
#[derive(Debug, Clone, Default)]
pub struct Pmt {
    pub service_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    /// elementary PID → stream info.
    pub streams: BTreeMap<u16, StreamInfo>,
    pub valid: bool,
}

impl Pmt {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: &[Section]) -> Option<Self> {
        let first = sections.first()?;
        let long = first.long.as_ref()?;
        if first.payload.len() < 4 {
            return None;
        }
        let pcr_pid = (((first.payload[0] as u16) << 8) | first.payload[1] as u16) & 0x1FFF;
        let program_info_length =
            (((first.payload[2] as usize) & 0x0F) << 8) | first.payload[3] as usize;
        let mut pmt = Pmt {
            service_id: long.table_id_extension,
            version: long.version,
            current_next: long.current_next,
            pcr_pid,
            program_descriptors: parse_descriptor_list(
                &first.payload[4..(4 + program_info_length).min(first.payload.len())],
            ),
            streams: BTreeMap::new(),
            valid: true,
        };

        for (i, section) in sections.iter().enumerate() {
            let payload: &[u8] = if i == 0 {
                &section.payload[(4 + program_info_length).min(section.payload.len())..]
            } else {
                &section.payload
            };
            let mut payload = payload;
            while payload.len() >= 5 {
                let stream_type = payload[0];
                let elementary_pid = (((payload[1] as u16) << 8) | payload[2] as u16) & 0x1FFF;
                let es_info_length = (((payload[3] as usize) & 0x0F) << 8) | payload[4] as usize;
                if payload.len() < 5 + es_info_length {
                    break;
                }
                let descriptors = parse_descriptor_list(&payload[5..5 + es_info_length]);
                pmt.streams.insert(
                    elementary_pid,
                    StreamInfo {
                        stream_type,
                        descriptors,
                    },
                );
                payload = &payload[5 + es_info_length..];
            }
        }
        Some(pmt)
    }

    pub fn to_sections(&self) -> Vec<Section> {
        let program_desc_bytes = build_descriptor_list(&self.program_descriptors);
        let mut header = Vec::with_capacity(4 + program_desc_bytes.len());
        header.push(0xE0 | ((self.pcr_pid >> 8) as u8 & 0x1F));
        header.push((self.pcr_pid & 0xFF) as u8);
        header.push(0xF0 | ((program_desc_bytes.len() as u16 >> 8) & 0x0F) as u8);
        header.push((program_desc_bytes.len() & 0xFF) as u8);
        header.extend_from_slice(&program_desc_bytes);

        let mut streams_bytes = Vec::new();
        for (&pid, info) in &self.streams {
            let desc_bytes = build_descriptor_list(&info.descriptors);
            streams_bytes.push(info.stream_type);
            streams_bytes.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            streams_bytes.push((pid & 0xFF) as u8);
            streams_bytes.push(0xF0 | ((desc_bytes.len() as u16 >> 8) & 0x0F) as u8);
            streams_bytes.push((desc_bytes.len() & 0xFF) as u8);
            streams_bytes.extend_from_slice(&desc_bytes);
        }

        // Pack header + stream entries across sections, never splitting one
        // stream entry across two sections, up to the PMT section limit.
        let mut sections_payloads: Vec<Vec<u8>> = Vec::new();
        let mut current = header.clone();
        let mut pos = 0;
        while pos < streams_bytes.len() {
            let es_info_length =
                (((streams_bytes[pos + 3] as usize) & 0x0F) << 8) | streams_bytes[pos + 4] as usize;
            let entry_len = 5 + es_info_length;
            if current.len() + entry_len > crate::section::MAX_PMT_SECTION_LENGTH && !current.is_empty()
            {
                sections_payloads.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(&streams_bytes[pos..pos + entry_len]);
            pos += entry_len;
        }
        sections_payloads.push(current);
        let last_section_number = (sections_payloads.len() - 1) as u8;

        sections_payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| Section {
                table_id: table_id::PMT,
                long: Some(LongSectionFields {
                    table_id_extension: self.service_id,
                    version: self.version,
                    current_next: self.current_next,
                    section_number: i as u8,
                    last_section_number,
                }),
                payload,
            })
            .collect()
    }

    /// Adopts the first PMT on this PID, otherwise adds new elementary
    /// streams and merges descriptor lists of existing ones by value.
    pub fn merge(&mut self, incoming: Pmt) {
        if !self.valid {
            *self = incoming;
            return;
        }
        for (pid, info) in incoming.streams {
            match self.streams.get_mut(&pid) {
                None => {
                    log::info!("added component PID 0x{pid:04x} from PMT update");
                    self.streams.insert(pid, info);
                }
                Some(existing) => {
                    merge_descriptors(&mut existing.descriptors, &info.descriptors);
                }
            }
        }
    }
}

/// Classifies an EIT `table_id` per spec.md §3/§4.8.
pub fn is_eit_other(tid: u8) -> bool {
    tid == table_id::EIT_PF_OTHER
        || (table_id::EIT_SCHEDULE_OTHER_FIRST..=table_id::EIT_SCHEDULE_OTHER_LAST).contains(&tid)
}

/// True for any EIT-schedule table_id, actual or other.
pub fn is_eit_schedule(tid: u8) -> bool {
    (table_id::EIT_SCHEDULE_ACTUAL_FIRST..=table_id::EIT_SCHEDULE_ACTUAL_LAST).contains(&tid)
        || (table_id::EIT_SCHEDULE_OTHER_FIRST..=table_id::EIT_SCHEDULE_OTHER_LAST).contains(&tid)
}

/// The `service_id` an EIT section belongs to (its `table_id_extension`).
pub fn eit_service_id(section: &Section) -> Option<u16> {
    section.long.as_ref().map(|l| l.table_id_extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pat_roundtrips_through_sections() {
        let mut pat = Pat::invalid();
        let mut incoming = Pat {
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            pmts: [(1u16, 0x0100u16)].into_iter().collect(),
            nit_pid: Some(0x0010),
            valid: true,
        };
        pat.merge(incoming.clone()).unwrap();
        assert_eq!(pat.nit_pid, Some(PID_NULL), "nit_pid forced to null on adoption");

        incoming.nit_pid = None;
        incoming.pmts.insert(2, 0x0200);
        pat.merge(incoming).unwrap();
        assert_eq!(pat.pmts.get(&2), Some(&0x0200));

        let sections = pat.to_sections();
        let reparsed = Pat::from_sections(&sections).unwrap();
        assert_eq!(reparsed.pmts, pat.pmts);
    }

    #[test]
    fn pat_merge_rejects_pmt_pid_conflict() {
        let mut pat = Pat::invalid();
        pat.merge(Pat {
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            pmts: [(1u16, 0x0100u16)].into_iter().collect(),
            nit_pid: None,
            valid: true,
        })
        .unwrap();
        let err = pat
            .merge(Pat {
                transport_stream_id: 1,
                version: 1,
                current_next: true,
                pmts: [(1u16, 0x0200u16)].into_iter().collect(),
                nit_pid: None,
                valid: true,
            })
            .unwrap_err();
        assert!(matches!(err, MergeError::PmtPidChanged { .. }));
    }

    #[test]
    fn pat_merge_is_idempotent() {
        let mut pat = Pat::invalid();
        let incoming = Pat {
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            pmts: [(1u16, 0x0100u16)].into_iter().collect(),
            nit_pid: Some(0x0010),
            valid: true,
        };
        pat.merge(incoming.clone()).unwrap();
        let once = pat.pmts.clone();
        pat.merge(incoming).unwrap();
        assert_eq!(pat.pmts, once);
    }

    #[test]
    fn descriptor_merge_dedups_by_value() {
        let common = Descriptor {
            tag: CA_DESCRIPTOR_TAG,
            data: SmallVec::from_slice(&[0, 1, 0x1F, 0xFF]),
        };
        let a = Descriptor {
            tag: 0x48,
            data: SmallVec::from_slice(b"service-a"),
        };
        let b = Descriptor {
            tag: 0x48,
            data: SmallVec::from_slice(b"service-b"),
        };
        let mut existing = vec![a.clone(), common.clone()];
        merge_descriptors(&mut existing, &[common.clone(), b.clone()]);
        assert_eq!(existing, vec![a, common, b]);
    }

    #[test]
    fn pmt_roundtrips_and_merges() {
        let mut pmt = Pmt::invalid();
        pmt.merge(Pmt {
            service_id: 1,
            version: 0,
            current_next: true,
            pcr_pid: 0x0101,
            program_descriptors: vec![],
            streams: [(
                0x0101u16,
                StreamInfo {
                    stream_type: 0x1B,
                    descriptors: vec![],
                },
            )]
            .into_iter()
            .collect(),
            valid: true,
        });
        pmt.merge(Pmt {
            service_id: 1,
            version: 1,
            current_next: true,
            pcr_pid: 0x0101,
            program_descriptors: vec![],
            streams: [(
                0x0102u16,
                StreamInfo {
                    stream_type: 0x0F,
                    descriptors: vec![],
                },
            )]
            .into_iter()
            .collect(),
            valid: true,
        });
        assert_eq!(pmt.streams.len(), 2);
        let sections = pmt.to_sections();
        let reparsed = Pmt::from_sections(&sections).unwrap();
        assert_eq!(reparsed.streams, pmt.streams);
        assert_eq!(reparsed.pcr_pid, pmt.pcr_pid);
    }

    #[test]
    fn sdt_merges_new_services_and_descriptors() {
        let mut sdt = Sdt::invalid();
        let common = Descriptor {
            tag: 0x09,
            data: SmallVec::from_slice(&[0, 1, 0, 2]),
        };
        sdt.merge(Sdt {
            transport_stream_id: 1,
            original_network_id: 1,
            version: 0,
            current_next: true,
            services: [(
                1u16,
                ServiceInfo {
                    running_status: 4,
                    free_ca_mode: false,
                    descriptors: vec![common.clone()],
                },
            )]
            .into_iter()
            .collect(),
            valid: true,
        });
        sdt.merge(Sdt {
            transport_stream_id: 1,
            original_network_id: 1,
            version: 1,
            current_next: true,
            services: [(
                1u16,
                ServiceInfo {
                    running_status: 4,
                    free_ca_mode: false,
                    descriptors: vec![common.clone()],
                },
            )]
            .into_iter()
            .collect(),
            valid: true,
        });
        assert_eq!(sdt.services[&1].descriptors.len(), 1, "duplicate descriptor not re-added");

        let sections = sdt.to_sections();
        let reparsed = Sdt::from_sections(&sections).unwrap();
        assert_eq!(reparsed.services.len(), 1);
        assert_eq!(reparsed.services[&1].running_status, 4);
    }

    #[test]
    fn eit_table_id_classification() {
        assert!(is_eit_other(table_id::EIT_PF_OTHER));
        assert!(is_eit_other(0x60));
        assert!(!is_eit_other(table_id::EIT_PF_ACTUAL));
        assert!(is_eit_schedule(0x50));
        assert!(is_eit_schedule(0x6F));
        assert!(!is_eit_schedule(table_id::EIT_PF_ACTUAL));
    }
}
