//! Signalization demux (C5): reassembles PSI sections per PID from a packet
//! stream, classifies PIDs, and tracks the per-PID boundary indices the
//! cleaner driver needs for pass 2, per spec.md §4.5.

use crate::packet::TsPacket;
use crate::pes::{pes_frame_kind, FrameKind, VideoCodec};
use crate::psi::{self, Cat, Descriptor, Pat, Pmt, Sdt};
use crate::section::{CrcPolicy, Section};
use std::collections::{HashMap, HashSet};

/// PID classification, matching spec.md §3's `class` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidClass {
    Psi,
    Pat,
    Pmt,
    Ecm,
    Emm,
    Audio,
    Video,
    Subtitles,
    Data,
    Null,
    Unknown,
}

/// DVB AC-3 descriptor tag, used to disambiguate `stream_type == 0x06`.
const AC3_DESCRIPTOR_TAG: u8 = 0x6A;
/// DVB subtitling descriptor tag, used to disambiguate `stream_type == 0x06`.
const SUBTITLING_DESCRIPTOR_TAG: u8 = 0x59;

/// Classifies an elementary stream from its `stream_type` and descriptors,
/// per SPEC_FULL.md §3.
pub fn classify_stream_type(stream_type: u8, descriptors: &[Descriptor]) -> PidClass {
    match stream_type {
        0x01 | 0x02 | 0x10 | 0x1B | 0x24 => PidClass::Video,
        0x03 | 0x04 | 0x0F | 0x11 | 0x81 => PidClass::Audio,
        0x06 => {
            if descriptors.iter().any(|d| d.tag == AC3_DESCRIPTOR_TAG) {
                PidClass::Audio
            } else if descriptors.iter().any(|d| d.tag == SUBTITLING_DESCRIPTOR_TAG) {
                PidClass::Subtitles
            } else {
                PidClass::Data
            }
        }
        _ => PidClass::Data,
    }
}

/// Per-PID metadata the driver consults in pass 2.
#[derive(Debug, Clone, Default)]
pub struct PidMeta {
    pub class: Option<PidClass>,
    /// The PMT `stream_type` byte for this PID, if it was learned from a
    /// PMT; needed to pick the right NAL type space when scanning for
    /// `first_intra_frame_index`.
    pub stream_type: Option<u8>,
    pub packet_count: u64,
    pub first_pusi_index: Option<u64>,
    pub first_intra_frame_index: Option<u64>,
}

/// Capability set a caller implements to receive complete table generations.
/// Default no-op methods let callers implement only the tables they need,
/// the way the teacher favors static dispatch over boxed trait objects.
pub trait SignalizationHandler {
    fn on_pat(&mut self, _pat: Pat) {}
    fn on_cat(&mut self, _cat: Cat) {}
    fn on_sdt(&mut self, _sdt: Sdt) {}
    fn on_pmt(&mut self, _pmt_pid: u16, _pmt: Pmt) {}
}

#[derive(Default)]
struct PendingPid {
    buffer: Vec<u8>,
    last_cc: Option<u8>,
    generation: Option<(u16, u8)>,
    sections: Vec<Section>,
}

/// Streaming PSI demultiplexer over PAT/CAT/SDT/PMT, with PID classification
/// and boundary tracking for every PID observed, filtered or not.
pub struct SignalizationDemux<H: SignalizationHandler> {
    handler: H,
    pending: HashMap<u16, PendingPid>,
    known_pmt_pids: HashSet<u16>,
    meta: HashMap<u16, PidMeta>,
}

impl<H: SignalizationHandler> SignalizationDemux<H> {
    /// Builds a demux that watches PAT, CAT and SDT from the start; PMT PIDs
    /// are added once they are learned from a completed PAT.
    pub fn new(handler: H) -> Self {
        let mut meta = HashMap::new();
        meta.insert(
            psi::pid::PAT,
            PidMeta {
                class: Some(PidClass::Pat),
                ..Default::default()
            },
        );
        meta.insert(
            psi::pid::CAT,
            PidMeta {
                class: Some(PidClass::Psi),
                ..Default::default()
            },
        );
        meta.insert(
            psi::pid::SDT,
            PidMeta {
                class: Some(PidClass::Psi),
                ..Default::default()
            },
        );
        meta.insert(
            psi::pid::EIT,
            PidMeta {
                class: Some(PidClass::Psi),
                ..Default::default()
            },
        );
        Self {
            handler,
            pending: HashMap::new(),
            known_pmt_pids: HashSet::new(),
            meta,
        }
    }

    /// Returns the handler, consuming the demux.
    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Metadata recorded for `pid`, if it has been seen.
    pub fn pid_meta(&self, pid: u16) -> Option<&PidMeta> {
        self.meta.get(&pid)
    }

    /// All PIDs seen so far.
    pub fn known_pids(&self) -> impl Iterator<Item = &u16> {
        self.meta.keys()
    }

    fn watched(&self, pid: u16) -> bool {
        pid == psi::pid::PAT
            || pid == psi::pid::CAT
            || pid == psi::pid::SDT
            || self.known_pmt_pids.contains(&pid)
    }

    /// Feeds one packet at its per-file packet index `global_index` (used
    /// only for logging context; per-PID indices are tracked internally).
    pub fn process_packet(&mut self, pkt: &TsPacket, _global_index: u64) {
        let pid = pkt.pid();
        self.note_packet(pid, pkt);

        if crate::packet::PID_NULL == pid {
            return;
        }
        if !self.watched(pid) || !pkt.has_payload() {
            return;
        }

        let payload = pkt.payload();
        let cc = pkt.continuity_counter();
        let pusi = pkt.pusi();

        let entry = self.pending.entry(pid).or_default();

        if let Some(prev_cc) = entry.last_cc {
            if !pusi && cc != ((prev_cc + 1) & 0x0F) && cc != prev_cc {
                log::warn!("malformed continuity on PID 0x{pid:04x}, resyncing at next PUSI");
                entry.buffer.clear();
                entry.generation = None;
                entry.last_cc = Some(cc);
                return;
            }
        }
        entry.last_cc = Some(cc);

        if pusi {
            if payload.is_empty() {
                return;
            }
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                log::warn!("pointer field overruns payload on PID 0x{pid:04x}");
                entry.buffer.clear();
                return;
            }
            if !entry.buffer.is_empty() {
                entry.buffer.extend_from_slice(&payload[1..1 + pointer]);
                self.drain_sections(pid);
                // whatever is left unparsed at a new PUSI is abandoned.
                if let Some(e) = self.pending.get_mut(&pid) {
                    e.buffer.clear();
                }
            }
            let entry = self.pending.entry(pid).or_default();
            entry.buffer.extend_from_slice(&payload[1 + pointer..]);
        } else {
            if entry.buffer.is_empty() && entry.generation.is_none() && entry.sections.is_empty() {
                // continuation with nothing pending and no PUSI ever seen.
                if entry.last_cc.is_some() && payload.is_empty() {
                    return;
                }
            }
            entry.buffer.extend_from_slice(payload);
        }

        self.drain_sections(pid);
    }

    fn drain_sections(&mut self, pid: u16) {
        loop {
            let buffer = match self.pending.get(&pid) {
                Some(e) => e.buffer.clone(),
                None => return,
            };
            match Section::parse(&buffer, CrcPolicy::Verify) {
                Ok((section, consumed)) => {
                    if let Some(e) = self.pending.get_mut(&pid) {
                        e.buffer.drain(0..consumed);
                    }
                    self.accept_section(pid, section);
                }
                Err(crate::section::Error::ShortRead { .. }) => return,
                Err(err) => {
                    log::warn!("dropping malformed section on PID 0x{pid:04x}: {err}");
                    if let Some(e) = self.pending.get_mut(&pid) {
                        e.buffer.clear();
                    }
                    return;
                }
            }
        }
    }

    fn accept_section(&mut self, pid: u16, section: Section) {
        let long = match &section.long {
            Some(l) => l.clone(),
            None => return,
        };
        let key = (long.table_id_extension, long.version);
        let entry = self.pending.entry(pid).or_default();

        if entry.generation != Some(key) {
            if entry.generation.is_some() && !entry.sections.is_empty() {
                log::warn!("discarding incomplete section generation on PID 0x{pid:04x}");
            }
            entry.generation = Some(key);
            entry.sections.clear();
        }
        entry.sections.push(section);

        let last_section_number = long.last_section_number as usize;
        let complete = entry.sections.len() == last_section_number + 1;
        if !complete {
            return;
        }

        let mut sections = std::mem::take(&mut self.pending.get_mut(&pid).unwrap().sections);
        sections.sort_by_key(|s| s.long.as_ref().map(|l| l.section_number).unwrap_or(0));
        self.pending.get_mut(&pid).unwrap().generation = None;

        self.dispatch_table(pid, sections);
    }

    fn dispatch_table(&mut self, pid: u16, sections: Vec<Section>) {
        let table_id = sections[0].table_id;
        match table_id {
            psi::table_id::PAT => {
                if let Some(pat) = Pat::from_sections(&sections) {
                    for (&service_id, &pmt_pid) in &pat.pmts {
                        self.known_pmt_pids.insert(pmt_pid);
                        self.meta.entry(pmt_pid).or_default().class = Some(PidClass::Pmt);
                        log::debug!("service 0x{service_id:04x} -> PMT PID 0x{pmt_pid:04x}");
                    }
                    self.handler.on_pat(pat);
                }
            }
            psi::table_id::CAT => {
                if let Some(cat) = Cat::from_sections(&sections) {
                    for d in &cat.descriptors {
                        if let Some(emm_pid) = d.ca_pid() {
                            self.meta.entry(emm_pid).or_default().class = Some(PidClass::Emm);
                        }
                    }
                    self.handler.on_cat(cat);
                }
            }
            psi::table_id::SDT_ACTUAL => {
                if let Some(sdt) = Sdt::from_sections(&sections) {
                    self.handler.on_sdt(sdt);
                }
            }
            psi::table_id::PMT => {
                if let Some(pmt) = Pmt::from_sections(&sections) {
                    for d in &pmt.program_descriptors {
                        if let Some(ecm_pid) = d.ca_pid() {
                            self.meta.entry(ecm_pid).or_default().class = Some(PidClass::Ecm);
                        }
                    }
                    for (&es_pid, info) in &pmt.streams {
                        let has_ca = info.descriptors.iter().any(|d| d.ca_pid().is_some());
                        let class = if has_ca {
                            PidClass::Ecm
                        } else {
                            classify_stream_type(info.stream_type, &info.descriptors)
                        };
                        let es_meta = self.meta.entry(es_pid).or_default();
                        es_meta.class = Some(class);
                        es_meta.stream_type = Some(info.stream_type);
                    }
                    self.handler.on_pmt(pid, pmt);
                }
            }
            _ => {}
        }
    }

    fn note_packet(&mut self, pid: u16, pkt: &TsPacket) {
        let meta = self.meta.entry(pid).or_default();
        let index = meta.packet_count;
        meta.packet_count += 1;

        if pkt.pusi() && meta.first_pusi_index.is_none() {
            meta.first_pusi_index = Some(index);
        }

        if meta.class == Some(PidClass::Video) && meta.first_intra_frame_index.is_none() && pkt.pusi() {
            let codec = meta
                .stream_type
                .map(VideoCodec::from_stream_type)
                .unwrap_or(VideoCodec::Unknown);
            if matches!(pes_frame_kind(pkt.payload(), codec), FrameKind::Intra) {
                meta.first_intra_frame_index = Some(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::build_packet;
    use crate::psi::{pid as psi_pid, Pat as PsiPat};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingHandler {
        pats: Vec<PsiPat>,
    }
    impl SignalizationHandler for RecordingHandler {
        fn on_pat(&mut self, pat: PsiPat) {
            self.pats.push(pat);
        }
    }

    fn pat_section_bytes(transport_stream_id: u16, pmts: &[(u16, u16)]) -> Vec<u8> {
        let mut pmt_map = BTreeMap::new();
        for &(sid, pid) in pmts {
            pmt_map.insert(sid, pid);
        }
        let pat = PsiPat {
            transport_stream_id,
            version: 0,
            current_next: true,
            pmts: pmt_map,
            nit_pid: None,
            valid: true,
        };
        pat.to_sections()[0].build()
    }

    #[test]
    fn reassembles_single_packet_pat() {
        let mut demux = SignalizationDemux::new(RecordingHandler::default());
        let section_bytes = pat_section_bytes(1, &[(1, 0x0100)]);
        let mut payload = vec![0u8]; // pointer field = 0
        payload.extend_from_slice(&section_bytes);
        let packet = build_packet(psi_pid::PAT, true, 0, &payload);
        let pkt = TsPacket::parse(&packet).unwrap();
        demux.process_packet(&pkt, 0);

        let handler = demux.into_handler();
        assert_eq!(handler.pats.len(), 1);
        assert_eq!(handler.pats[0].pmts.get(&1), Some(&0x0100));
    }

    #[test]
    fn classifies_pmt_pid_after_pat() {
        let mut demux = SignalizationDemux::new(RecordingHandler::default());
        let section_bytes = pat_section_bytes(1, &[(1, 0x0100)]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&section_bytes);
        let packet = build_packet(psi_pid::PAT, true, 0, &payload);
        let pkt = TsPacket::parse(&packet).unwrap();
        demux.process_packet(&pkt, 0);

        assert_eq!(demux.pid_meta(0x0100).unwrap().class, Some(PidClass::Pmt));
    }

    #[test]
    fn tracks_first_pusi_index_per_pid() {
        let mut demux = SignalizationDemux::new(RecordingHandler::default());
        let packet = build_packet(0x0101, false, 0, &[1, 2, 3]);
        let pkt = TsPacket::parse(&packet).unwrap();
        demux.process_packet(&pkt, 0);
        let packet2 = build_packet(0x0101, true, 1, &[1, 2, 3]);
        let pkt2 = TsPacket::parse(&packet2).unwrap();
        demux.process_packet(&pkt2, 1);

        assert_eq!(demux.pid_meta(0x0101).unwrap().first_pusi_index, Some(1));
    }

    #[test]
    fn classifies_known_stream_types() {
        assert_eq!(classify_stream_type(0x1B, &[]), PidClass::Video);
        assert_eq!(classify_stream_type(0x0F, &[]), PidClass::Audio);
        assert_eq!(classify_stream_type(0x00, &[]), PidClass::Data);
    }

    #[test]
    fn section_split_across_two_packets_reassembles() {
        let mut demux = SignalizationDemux::new(RecordingHandler::default());
        let section_bytes = pat_section_bytes(7, &[(1, 0x0100), (2, 0x0200)]);
        let mut first_payload = vec![0u8];
        let split = section_bytes.len() - 2;
        first_payload.extend_from_slice(&section_bytes[..split]);
        let packet1 = build_packet(psi_pid::PAT, true, 0, &first_payload);
        let pkt1 = TsPacket::parse(&packet1).unwrap();
        demux.process_packet(&pkt1, 0);

        let packet2 = build_packet(psi_pid::PAT, false, 1, &section_bytes[split..]);
        let pkt2 = TsPacket::parse(&packet2).unwrap();
        demux.process_packet(&pkt2, 1);

        let handler = demux.into_handler();
        assert_eq!(handler.pats.len(), 1);
        assert_eq!(handler.pats[0].transport_stream_id, 7);
    }
}
