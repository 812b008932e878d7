//! EIT processor (C8): a streaming filter over EIT PID packets, per
//! spec.md §4.8. Decides the fate of each EIT section from its header as
//! soon as it is visible (at the packet carrying its PUSI) and applies that
//! fate to every packet belonging to that section, nullifying the dropped
//! ones in place.

use crate::packet::{nullify_packet, TsPacket, PACKET_SIZE};
use crate::psi;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Keep,
    Drop,
}

/// Streaming EIT filter. Configured once after pass 1, then fed every
/// EIT-PID packet of pass 2 in order via [`EitProcessor::process`].
pub struct EitProcessor {
    remove_other: bool,
    remove_schedule: bool,
    keep_services: Option<HashSet<u16>>,
    current_fate: Fate,
}

impl EitProcessor {
    /// A processor that keeps everything until a removal policy or a
    /// keep-list is configured.
    pub fn new() -> Self {
        Self {
            remove_other: false,
            remove_schedule: false,
            keep_services: None,
            current_fate: Fate::Keep,
        }
    }

    /// Drop any section in the EIT-other range (0x4F, 0x60..=0x6F).
    pub fn remove_other(&mut self) {
        self.remove_other = true;
    }

    /// Drop any EIT-schedule section (0x50..=0x5F, 0x60..=0x6F).
    pub fn remove_schedule(&mut self) {
        self.remove_schedule = true;
    }

    /// Restrict surviving sections to this `service_id`. May be called more
    /// than once to build an allow-list.
    pub fn keep_service(&mut self, service_id: u16) {
        self.keep_services
            .get_or_insert_with(HashSet::new)
            .insert(service_id);
    }

    fn decide(&self, table_id: u8, service_id: u16) -> Fate {
        if self.remove_other && psi::is_eit_other(table_id) {
            return Fate::Drop;
        }
        if self.remove_schedule && psi::is_eit_schedule(table_id) {
            return Fate::Drop;
        }
        if let Some(keep) = &self.keep_services {
            if !keep.contains(&service_id) {
                return Fate::Drop;
            }
        }
        Fate::Keep
    }

    /// Processes one packet already known to be on the EIT PID, returning
    /// either the original bytes (kept) or a nullified copy (dropped).
    pub fn process(&mut self, original: &[u8; PACKET_SIZE]) -> [u8; PACKET_SIZE] {
        let pkt = match TsPacket::parse(original) {
            Ok(p) => p,
            Err(_) => return *original,
        };

        if pkt.pusi() {
            let payload = pkt.payload();
            if !payload.is_empty() {
                let pointer = payload[0] as usize;
                if 1 + pointer < payload.len() {
                    let section = &payload[1 + pointer..];
                    // table_id(1) + syntax header through table_id_extension(2)
                    if section.len() >= 5 {
                        let table_id = section[0];
                        let service_id = u16::from_be_bytes([section[3], section[4]]);
                        self.current_fate = self.decide(table_id, service_id);
                    }
                }
            }
        }

        match self.current_fate {
            Fate::Keep => *original,
            Fate::Drop => nullify_packet(original),
        }
    }
}

impl Default for EitProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::build_packet;
    use crate::psi::table_id;
    use crate::section::{LongSectionFields, Section};

    fn eit_packet(table_id: u8, service_id: u16, cc: u8) -> [u8; PACKET_SIZE] {
        let section = Section {
            table_id,
            long: Some(LongSectionFields {
                table_id_extension: service_id,
                version: 0,
                current_next: true,
                section_number: 0,
                last_section_number: 0,
            }),
            payload: vec![0u8; 8],
        };
        let mut payload = vec![0u8];
        payload.extend_from_slice(&section.build());
        build_packet(psi::pid::EIT, true, cc, &payload)
    }

    #[test]
    fn keeps_service_in_allow_list() {
        let mut eit = EitProcessor::new();
        eit.keep_service(1);
        let pkt = eit_packet(table_id::EIT_PF_ACTUAL, 1, 0);
        let out = eit.process(&pkt);
        assert_eq!(out, pkt);
    }

    #[test]
    fn drops_service_not_in_allow_list() {
        let mut eit = EitProcessor::new();
        eit.keep_service(1);
        let pkt = eit_packet(table_id::EIT_PF_ACTUAL, 2, 0);
        let out = eit.process(&pkt);
        let parsed = TsPacket::parse(&out).unwrap();
        assert_eq!(parsed.pid(), crate::packet::PID_NULL);
    }

    #[test]
    fn remove_other_drops_eit_other_range() {
        let mut eit = EitProcessor::new();
        eit.remove_other();
        let pkt = eit_packet(table_id::EIT_PF_OTHER, 5, 0);
        let out = eit.process(&pkt);
        let parsed = TsPacket::parse(&out).unwrap();
        assert_eq!(parsed.pid(), crate::packet::PID_NULL);
    }

    #[test]
    fn remove_schedule_drops_schedule_range_but_keeps_pf_actual() {
        let mut eit = EitProcessor::new();
        eit.remove_schedule();
        let scheduled = eit_packet(0x50, 5, 0);
        let dropped = eit.process(&scheduled);
        assert_eq!(TsPacket::parse(&dropped).unwrap().pid(), crate::packet::PID_NULL);

        let pf_actual = eit_packet(table_id::EIT_PF_ACTUAL, 5, 1);
        let kept = eit.process(&pf_actual);
        assert_eq!(kept, pf_actual);
    }

    #[test]
    fn continuation_packets_inherit_the_starting_section_fate() {
        let mut eit = EitProcessor::new();
        eit.keep_service(1);
        let start = eit_packet(table_id::EIT_PF_ACTUAL, 2, 0);
        eit.process(&start);
        let continuation = build_packet(psi::pid::EIT, false, 1, &[0xAA; 100]);
        let out = eit.process(&continuation);
        assert_eq!(TsPacket::parse(&out).unwrap().pid(), crate::packet::PID_NULL);
    }
}
