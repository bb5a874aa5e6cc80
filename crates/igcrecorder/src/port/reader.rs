//! Checksummed NMEA line reader on top of a [`Port`].

use std::time::Instant;

use tracing::{debug, trace};

use super::{read_until_deadline, Port};
use crate::checksum::nmea_checksum;
use crate::error::{Error, Result};

/// Upper bound for a buffered, still incomplete sentence.
const BUFFER_SIZE: usize = 256;

/// Pulls `$...*HH` sentences out of a byte stream.
///
/// Bytes before a `$` are skipped and sentences whose checksum does not
/// match are dropped, so the reader resynchronises on the next valid line.
#[derive(Debug)]
pub struct NmeaReader<'a> {
    port: &'a mut dyn Port,
    buffer: Vec<u8>,
}

impl<'a> NmeaReader<'a> {
    /// Create a reader on `port`.
    pub fn new(port: &'a mut dyn Port) -> Self {
        Self {
            port,
            buffer: Vec::with_capacity(BUFFER_SIZE),
        }
    }

    /// The underlying port, e.g. for writing requests.
    pub fn port(&mut self) -> &mut dyn Port {
        self.port
    }

    /// Drop buffered data on both sides.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails to discard its input.
    pub fn flush(&mut self) -> Result<()> {
        self.port.flush_input()?;
        self.buffer.clear();
        Ok(())
    }

    fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let mut chunk = [0u8; 64];
        let n = read_until_deadline(self.port, &mut chunk, deadline)?;
        if n == 0 {
            return Ok(false);
        }
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    /// Extract the next complete sentence body, if any.
    fn take_line(&mut self) -> Option<String> {
        loop {
            let Some(dollar) = self.buffer.iter().position(|&b| b == b'$') else {
                self.buffer.clear();
                return None;
            };
            self.buffer.drain(..dollar);

            let Some(asterisk) = self.buffer.iter().position(|&b| b == b'*') else {
                if self.buffer.len() >= BUFFER_SIZE {
                    // no terminator in sight; throw the fragment away
                    self.buffer.clear();
                }
                return None;
            };
            if asterisk + 3 > self.buffer.len() {
                return None;
            }

            let body = &self.buffer[1..asterisk];
            let expected = std::str::from_utf8(&self.buffer[asterisk + 1..asterisk + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            let valid = expected == Some(nmea_checksum(body));
            let line = String::from_utf8_lossy(body).into_owned();
            self.buffer.drain(..asterisk + 3);

            if valid {
                trace!(line = %line, "NMEA line received");
                return Some(line);
            }
            debug!(line = %line, "Dropping NMEA line with bad checksum");
        }
    }

    /// Read the next valid sentence body (without `$` and checksum).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no valid sentence arrives before
    /// `deadline`.
    pub fn read_line(&mut self, deadline: Instant) -> Result<String> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }
            if !self.fill(deadline)? {
                return Err(Error::timeout("waiting for NMEA sentence"));
            }
        }
    }

    /// Skip sentences until one starts with `prefix`; return the remainder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no matching sentence arrives before
    /// `deadline`.
    pub fn expect_line(&mut self, prefix: &str, deadline: Instant) -> Result<String> {
        loop {
            let line = self
                .read_line(deadline)
                .map_err(|_| Error::timeout(format!("waiting for {prefix}")))?;
            if let Some(rest) = line.strip_prefix(prefix) {
                return Ok(rest.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::format_nmea;
    use super::super::mock::ScriptedPort;
    use super::*;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(100)
    }

    #[test]
    fn test_read_line_skips_leading_noise() {
        let mut port = ScriptedPort::silent();
        port.push_rx(b"noise");
        port.push_rx(format_nmea("PLXVC,DECL,C,1").as_bytes());

        let mut reader = NmeaReader::new(&mut port);
        assert_eq!(reader.read_line(deadline()).unwrap(), "PLXVC,DECL,C,1");
    }

    #[test]
    fn test_bad_checksum_is_dropped() {
        let mut port = ScriptedPort::silent();
        port.push_rx(b"$PLXVC,DECL,C,1*00\r\n");
        port.push_rx(format_nmea("PLXVC,DECL,C,2").as_bytes());

        let mut reader = NmeaReader::new(&mut port);
        assert_eq!(reader.read_line(deadline()).unwrap(), "PLXVC,DECL,C,2");
    }

    #[test]
    fn test_expect_line_returns_rest() {
        let mut port = ScriptedPort::silent();
        port.push_rx(format_nmea("GPGGA,1,2,3").as_bytes());
        port.push_rx(format_nmea("PLXVC,LOGBOOKSIZE,A,4,").as_bytes());

        let mut reader = NmeaReader::new(&mut port);
        let rest = reader.expect_line("PLXVC,LOGBOOKSIZE,A,", deadline()).unwrap();
        assert_eq!(rest, "4,");
    }

    #[test]
    fn test_split_sentence_across_reads() {
        let sentence = format_nmea("PLXVC,FLIGHT,A,x,1,2,HFDTE010203");
        let (head, tail) = sentence.as_bytes().split_at(10);
        let tail = tail.to_vec();

        let mut port = ScriptedPort::new(move |_| tail.clone());
        port.push_rx(head);

        let mut reader = NmeaReader::new(&mut port);
        // first read only sees the head
        assert!(reader.take_line().is_none());
        reader.port().write(b"poke").unwrap();
        let line = reader.read_line(deadline()).unwrap();
        assert_eq!(line, "PLXVC,FLIGHT,A,x,1,2,HFDTE010203");
    }

    #[test]
    fn test_read_line_timeout() {
        let mut port = ScriptedPort::silent();
        let mut reader = NmeaReader::new(&mut port);
        let err = reader
            .read_line(Instant::now() + Duration::from_millis(5))
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
