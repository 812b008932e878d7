//! MPEG-2 CRC32, as used to validate and build PSI sections.
//!
//! Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no input/output
//! reflection, no final XOR, MSB-first byte processing.

use crc::{Crc, Digest, CRC_32_MPEG_2};

static ALGORITHM: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Incremental MPEG-2 CRC32 accumulator.
///
/// `add` may be called any number of times before `value`; splitting a
/// buffer into arbitrary contiguous chunks never changes the final value.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Crc32 {
    /// Starts a fresh accumulator.
    pub fn new() -> Self {
        Self {
            digest: ALGORITHM.digest(),
        }
    }

    /// Discards any accumulated state and starts over.
    pub fn reset(&mut self) {
        self.digest = ALGORITHM.digest();
    }

    /// Folds `bytes` into the running CRC.
    pub fn add(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Returns the CRC32 of everything added so far.
    ///
    /// Does not consume `self`; more bytes may still be added afterwards,
    /// though the value already returned will not reflect them.
    pub fn value(&self) -> u32 {
        self.digest.clone().finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot CRC32 over a single buffer.
pub fn crc32(bytes: &[u8]) -> u32 {
    ALGORITHM.checksum(bytes)
}
