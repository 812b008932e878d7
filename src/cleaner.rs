//! File cleaner driver (C9): two-pass per-file orchestration, per spec.md
//! §4.9. Pass 1 demuxes and merges PSI; pass 2 rewinds and rewrites the
//! file using the merged tables and an EIT filter configured from them.

use crate::demux::{PidClass, PidMeta, SignalizationDemux, SignalizationHandler};
use crate::eit_processor::EitProcessor;
use crate::error::CleanError;
use crate::packet::{TsPacket, PACKET_SIZE, PID_NULL};
use crate::packetizer::{CyclingPacketizer, StuffingPolicy};
use crate::psi::{self, Cat, Pat, Pmt, Sdt};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default stuffing policy for every packetizer the driver primes. Not
/// exposed on the CLI — spec.md §4.7 leaves the choice to the implementer;
/// `AT_END` packs sections tightly while still guaranteeing one aligned
/// stuffing run per cycle, which is the least surprising default.
const DEFAULT_STUFFING: StuffingPolicy = StuffingPolicy::AtEnd;

struct PmtContext {
    pmt: Pmt,
}

#[derive(Default)]
struct MergeHandler {
    pat: Pat,
    cat: Cat,
    sdt: Sdt,
    pmts: BTreeMap<u16, PmtContext>,
    failed: Option<String>,
}

impl SignalizationHandler for MergeHandler {
    fn on_pat(&mut self, pat: Pat) {
        if let Err(e) = self.pat.merge(pat) {
            self.failed.get_or_insert_with(|| e.to_string());
        }
    }

    fn on_cat(&mut self, cat: Cat) {
        self.cat.merge(cat);
    }

    fn on_sdt(&mut self, sdt: Sdt) {
        self.sdt.merge(sdt);
    }

    fn on_pmt(&mut self, pmt_pid: u16, pmt: Pmt) {
        let ctx = self
            .pmts
            .entry(pmt_pid)
            .or_insert_with(|| PmtContext { pmt: Pmt::invalid() });
        ctx.pmt.merge(pmt);
    }
}

/// Orchestrates the demux -> merge -> packetize -> write pipeline for one
/// input file.
pub struct FileCleaner;

impl FileCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Cleans `input` into `output`. Returns `Ok(false)` for a recoverable
    /// per-file failure (structural conflict) after deleting the partial
    /// output; propagates `Err` for I/O failures that prevented opening or
    /// creating the files at all.
    pub fn clean_file(&self, input: &Path, output: &Path) -> Result<bool, CleanError> {
        let in_file = File::open(input)?;
        let mut reader = BufReader::new(in_file);

        let out_file = match File::create(output) {
            Ok(f) => f,
            Err(e) => return Err(CleanError::OutputSetup(e.to_string())),
        };
        let mut writer = BufWriter::new(out_file);

        match self.run(&mut reader, &mut writer) {
            Ok(true) => {
                writer.flush()?;
                Ok(true)
            }
            Ok(false) => {
                drop(writer);
                let _ = std::fs::remove_file(output);
                Ok(false)
            }
            Err(e) => {
                drop(writer);
                let _ = std::fs::remove_file(output);
                Err(e)
            }
        }
    }

    fn run<R: Read + Seek, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<bool, CleanError> {
        let mut demux = SignalizationDemux::new(MergeHandler::default());
        let mut index: u64 = 0;
        loop {
            let bytes = match read_packet(reader)? {
                Some(b) => b,
                None => break,
            };
            if let Ok(pkt) = TsPacket::parse(&bytes) {
                demux.process_packet(&pkt, index);
            }
            index += 1;
        }

        if let Some(reason) = &demux.handler().failed {
            log::error!("{reason}");
            return Ok(false);
        }

        let handler = demux.handler();
        let pat = handler.pat.clone();
        let cat = handler.cat.clone();
        let sdt = handler.sdt.clone();
        let pmt_map: BTreeMap<u16, Pmt> = handler
            .pmts
            .iter()
            .map(|(&pid, ctx)| (pid, ctx.pmt.clone()))
            .collect();
        let meta: HashMap<u16, PidMeta> = demux
            .known_pids()
            .map(|&pid| (pid, demux.pid_meta(pid).unwrap().clone()))
            .collect();

        reader.seek(SeekFrom::Start(0))?;

        let mut primed_pat = pat.clone();
        primed_pat.version = 0;
        primed_pat.current_next = true;
        let mut pat_packetizer =
            CyclingPacketizer::new(psi::pid::PAT, DEFAULT_STUFFING, &primed_pat.to_sections());

        let mut primed_cat = cat.clone();
        primed_cat.version = 0;
        primed_cat.current_next = true;
        let mut cat_packetizer =
            CyclingPacketizer::new(psi::pid::CAT, DEFAULT_STUFFING, &primed_cat.to_sections());

        let mut primed_sdt = sdt.clone();
        primed_sdt.version = 0;
        primed_sdt.current_next = true;
        let mut sdt_packetizer =
            CyclingPacketizer::new(psi::pid::SDT, DEFAULT_STUFFING, &primed_sdt.to_sections());

        let mut pmt_packetizers: BTreeMap<u16, CyclingPacketizer> = BTreeMap::new();
        for (&pmt_pid, pmt) in &pmt_map {
            let mut primed = pmt.clone();
            primed.version = 0;
            primed.current_next = true;
            pmt_packetizers.insert(
                pmt_pid,
                CyclingPacketizer::new(pmt_pid, DEFAULT_STUFFING, &primed.to_sections()),
            );
        }

        write_one_cycle(&mut pat_packetizer, writer)?;
        if cat.valid {
            write_one_cycle(&mut cat_packetizer, writer)?;
        }
        if sdt.valid {
            write_one_cycle(&mut sdt_packetizer, writer)?;
        }
        for packetizer in pmt_packetizers.values_mut() {
            write_one_cycle(packetizer, writer)?;
        }

        let mut eit = EitProcessor::new();
        eit.remove_other();
        eit.remove_schedule();
        for pmt in pmt_map.values() {
            eit.keep_service(pmt.service_id);
        }

        let mut pid_counters: HashMap<u16, u64> = HashMap::new();
        loop {
            let bytes = match read_packet(reader)? {
                Some(b) => b,
                None => break,
            };
            let pkt = match TsPacket::parse(&bytes) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let pid = pkt.pid();
            let pid_index = {
                let counter = pid_counters.entry(pid).or_insert(0);
                let i = *counter;
                *counter += 1;
                i
            };

            if pid == PID_NULL {
                continue;
            } else if pid == psi::pid::PAT {
                writer.write_all(&pat_packetizer.next_packet())?;
            } else if pid == psi::pid::CAT {
                if cat.valid {
                    writer.write_all(&cat_packetizer.next_packet())?;
                } else {
                    writer.write_all(&bytes)?;
                }
            } else if pid == psi::pid::SDT {
                if sdt.valid {
                    writer.write_all(&sdt_packetizer.next_packet())?;
                } else {
                    writer.write_all(&bytes)?;
                }
            } else if pid == psi::pid::EIT {
                writer.write_all(&eit.process(&bytes))?;
            } else if let Some(packetizer) = pmt_packetizers.get_mut(&pid) {
                writer.write_all(&packetizer.next_packet())?;
            } else {
                let class = meta.get(&pid).and_then(|m| m.class);
                match class {
                    Some(PidClass::Ecm) | Some(PidClass::Emm) => {
                        writer.write_all(&bytes)?;
                    }
                    Some(PidClass::Audio) | Some(PidClass::Subtitles) | Some(PidClass::Data) => {
                        let cutoff = meta.get(&pid).and_then(|m| m.first_pusi_index);
                        if cutoff.map_or(true, |c| pid_index >= c) {
                            writer.write_all(&bytes)?;
                        }
                    }
                    Some(PidClass::Video) => {
                        let m = meta.get(&pid);
                        let cutoff = m
                            .and_then(|m| m.first_intra_frame_index)
                            .or_else(|| m.and_then(|m| m.first_pusi_index));
                        if cutoff.map_or(true, |c| pid_index >= c) {
                            writer.write_all(&bytes)?;
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(true)
    }
}

impl Default for FileCleaner {
    fn default() -> Self {
        Self::new()
    }
}

fn read_packet<R: Read>(reader: &mut R) -> Result<Option<[u8; PACKET_SIZE]>, CleanError> {
    let mut buf = [0u8; PACKET_SIZE];
    let mut read = 0;
    while read < PACKET_SIZE {
        let n = reader.read(&mut buf[read..])?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(CleanError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated packet at end of file",
            )));
        }
        read += n;
    }
    Ok(Some(buf))
}

fn write_one_cycle<W: Write>(
    packetizer: &mut CyclingPacketizer,
    writer: &mut W,
) -> Result<(), CleanError> {
    if packetizer.cycle_byte_len() == 0 {
        return Ok(());
    }
    loop {
        let pkt = packetizer.next_packet();
        writer.write_all(&pkt)?;
        if packetizer.at_cycle_boundary() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::build_packet;
    use std::io::Cursor;

    fn pat_packet(pmts: &[(u16, u16)], version: u8, cc: u8) -> [u8; PACKET_SIZE] {
        let mut map = BTreeMap::new();
        for &(s, p) in pmts {
            map.insert(s, p);
        }
        let pat = Pat {
            transport_stream_id: 1,
            version,
            current_next: true,
            pmts: map,
            nit_pid: Some(0x0010),
            valid: true,
        };
        let section = pat.to_sections().remove(0).build();
        let mut payload = vec![0u8];
        payload.extend_from_slice(&section);
        build_packet(psi::pid::PAT, true, cc, &payload)
    }

    #[test]
    fn single_pat_cleans_successfully() {
        let input_packets = vec![pat_packet(&[(1, 0x0100)], 0, 0)];
        let mut input_bytes = Vec::new();
        for p in &input_packets {
            input_bytes.extend_from_slice(p);
        }

        let cleaner = FileCleaner::new();
        let mut reader = Cursor::new(input_bytes);
        let mut output = Vec::new();
        let success = cleaner.run(&mut reader, &mut output).unwrap();
        assert!(success);
        assert!(output.len() % PACKET_SIZE == 0);
        assert!(!output.is_empty());
    }

    #[test]
    fn conflicting_pmt_pid_fails_the_file() {
        let mut input_bytes = Vec::new();
        input_bytes.extend_from_slice(&pat_packet(&[(1, 0x0100)], 0, 0));
        input_bytes.extend_from_slice(&pat_packet(&[(1, 0x0200)], 1, 1));

        let cleaner = FileCleaner::new();
        let mut reader = Cursor::new(input_bytes);
        let mut output = Vec::new();
        let success = cleaner.run(&mut reader, &mut output).unwrap();
        assert!(!success);
    }
}
