//! IGC flight log generation and signing.
//!
//! An IGC file is a sequence of CRLF-terminated ASCII records, each
//! identified by its first letter. This module renders records
//! ([`format`]), writes them ([`writer`]), names log files ([`filename`])
//! and computes the tamper-evident G record ([`grecord`]).

pub mod filename;
pub mod format;
pub mod grecord;
mod md5;
pub mod writer;

pub use filename::{FileNameCodec, LogFileName};
pub use grecord::{GRecord, SignatureStatus};
pub use writer::IgcWriter;

/// Manufacturer code written by this crate; `X` marks a non-approved
/// recorder.
pub const VENDOR_CODE: &str = "XIR";

/// Characters the IGC format reserves for its own use.
pub const RESERVED_CHARS: &[char] = &['$', '*', '!', '\\', '^', '~'];

/// Check if `c` may appear in an IGC record.
#[must_use]
pub fn is_valid_char(c: char) -> bool {
    (' '..='~').contains(&c) && !RESERVED_CHARS.contains(&c)
}

/// Record category, taken from the first character of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Logger identification.
    A,
    /// Position fix.
    B,
    /// Task declaration.
    C,
    /// Event.
    E,
    /// Satellite constellation.
    F,
    /// Security signature.
    G,
    /// Header.
    H,
    /// B record extensions.
    I,
    /// K record extensions.
    J,
    /// Extended data.
    K,
    /// Comment.
    L,
    /// Anything else.
    Other(char),
}

impl RecordType {
    /// Classify a record line.
    #[must_use]
    pub fn of(line: &str) -> Option<Self> {
        let first = line.chars().next()?;
        Some(match first {
            'A' => Self::A,
            'B' => Self::B,
            'C' => Self::C,
            'E' => Self::E,
            'F' => Self::F,
            'G' => Self::G,
            'H' => Self::H,
            'I' => Self::I,
            'J' => Self::J,
            'K' => Self::K,
            'L' => Self::L,
            other => Self::Other(other),
        })
    }
}
