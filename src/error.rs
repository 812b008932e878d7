//! Driver/CLI-level error taxonomy, per spec.md §7.
//!
//! Byte-level codec errors ([`crate::section::Error`], [`crate::packet::PacketError`])
//! stay as their own small `thiserror` enums; this type is the boundary
//! the binary and [`crate::cleaner::FileCleaner`] report through.

/// Errors that can abort cleanup of one file, or the whole process for
/// `Usage`.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// Open/read/write/rewind/close failure from the file layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A PSI section was structurally invalid beyond what the demux can
    /// silently drop and continue past. In practice the demux logs and
    /// drops these itself (spec.md §7); this variant exists for callers
    /// that want section errors to surface as a `CleanError` instead.
    #[error("parse error: {0}")]
    Parse(#[from] crate::section::Error),
    /// A service's PMT PID changed across PAT versions within one input.
    #[error("structural conflict: {0}")]
    StructuralConflict(String),
    /// The output file or directory entry could not be created.
    #[error("output setup failed: {0}")]
    OutputSetup(String),
    /// An invalid CLI combination, surfaced before any file is processed.
    #[error("usage error: {0}")]
    Usage(String),
}
