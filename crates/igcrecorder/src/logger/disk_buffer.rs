//! Records waiting to be written to the open flight log.

use std::io::Write;

use crate::error::Result;
use crate::igc::IgcWriter;

/// Bounded list of pending record lines.
#[derive(Debug)]
pub struct DiskBuffer {
    lines: Vec<String>,
    capacity: usize,
}

impl DiskBuffer {
    /// Create a buffer that fills up after `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue a line. Returns `true` once the buffer is full.
    pub fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.is_full()
    }

    /// Check if the buffer has reached its capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.capacity
    }

    /// Number of pending lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Write all pending lines and flush the writer.
    ///
    /// Lines stay queued if writing fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn flush_to<W: Write>(&mut self, writer: &mut IgcWriter<W>) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        writer.write_lines(&self.lines)?;
        writer.flush()?;
        self.lines.clear();
        Ok(())
    }
}
