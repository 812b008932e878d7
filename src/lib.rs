//! Cleans up the PSI structure and elementary stream boundaries of MPEG
//! transport stream files: normalizes PAT/CAT/SDT/PMT across table versions,
//! filters EIT to the services that remain, and cuts audio/video/data PIDs
//! at their first usable unit.

#![deny(unsafe_code)]

pub mod cleaner;
pub mod cli;
pub mod crc32;
pub mod demux;
pub mod eit_processor;
pub mod error;
pub mod packet;
pub mod packetizer;
pub mod pes;
pub mod psi;
pub mod section;
pub mod tsp_control;
pub mod watchdog;
