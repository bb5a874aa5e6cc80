//! Line-oriented IGC output.

use std::io::Write;

use super::grecord::GRecord;
use crate::error::Result;

/// Writes CRLF-terminated records, optionally feeding a [`GRecord`] with
/// every line written.
#[derive(Debug)]
pub struct IgcWriter<W: Write> {
    inner: W,
    grecord: Option<GRecord>,
    lines: usize,
}

impl<W: Write> IgcWriter<W> {
    /// Create a writer that does not sign its output.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            grecord: None,
            lines: 0,
        }
    }

    /// Create a writer that accumulates a signature while writing.
    pub fn signed(inner: W, grecord: GRecord) -> Self {
        Self {
            inner,
            grecord: Some(grecord),
            lines: 0,
        }
    }

    /// Write one record followed by CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\r\n")?;
        if let Some(grecord) = self.grecord.as_mut() {
            grecord.append_line(line);
        }
        self.lines += 1;
        Ok(())
    }

    /// Write several records in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_lines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.write_line(line.as_ref())?;
        }
        Ok(())
    }

    /// Append the G record accumulated so far, if this writer signs.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_signature(&mut self) -> Result<()> {
        let Some(lines) = self.grecord.as_ref().map(GRecord::signature_lines) else {
            return Ok(());
        };
        for line in lines {
            self.inner.write_all(line.as_bytes())?;
            self.inner.write_all(b"\r\n")?;
            self.lines += 1;
        }
        Ok(())
    }

    /// Number of lines written.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Running signature, if any.
    #[must_use]
    pub fn grecord(&self) -> Option<&GRecord> {
        self.grecord.as_ref()
    }

    /// Flush the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
