//! Byte-stream transport used by the device drivers.
//!
//! The concrete serial or Bluetooth link lives outside this crate; drivers
//! only see the [`Port`] trait. Every driver exchange that changes the baud
//! rate or receive timeout does so through a [`PortGuard`], which puts the
//! original settings back when it goes out of scope, on success and failure
//! alike.

mod reader;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::checksum::nmea_checksum;
use crate::error::{Error, Result};

pub use reader::NmeaReader;

/// A bidirectional byte stream with adjustable line settings.
pub trait Port: fmt::Debug + Send {
    /// Write all of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`, waiting at most the receive
    /// timeout. Returns `Ok(0)` if nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Current baud rate.
    fn baud_rate(&self) -> u32;

    /// Change the baud rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Current receive timeout.
    fn rx_timeout(&self) -> Duration;

    /// Change the receive timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the timeout.
    fn set_rx_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard any received but unread bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    fn flush_input(&mut self) -> io::Result<()>;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        (**self).set_baud_rate(baud_rate)
    }

    fn rx_timeout(&self) -> Duration {
        (**self).rx_timeout()
    }

    fn set_rx_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_rx_timeout(timeout)
    }

    fn flush_input(&mut self) -> io::Result<()> {
        (**self).flush_input()
    }
}

/// Restores a port's baud rate and receive timeout when dropped.
pub struct PortGuard<'a> {
    port: &'a mut dyn Port,
    baud_rate: u32,
    rx_timeout: Duration,
}

impl<'a> PortGuard<'a> {
    /// Remember the current settings of `port`.
    pub fn new(port: &'a mut dyn Port) -> Self {
        let baud_rate = port.baud_rate();
        let rx_timeout = port.rx_timeout();
        Self {
            port,
            baud_rate,
            rx_timeout,
        }
    }

    /// The baud rate that will be restored.
    #[must_use]
    pub fn saved_baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl fmt::Debug for PortGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortGuard")
            .field("baud_rate", &self.baud_rate)
            .field("rx_timeout", &self.rx_timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> Deref for PortGuard<'a> {
    type Target = dyn Port + 'a;

    fn deref(&self) -> &Self::Target {
        self.port
    }
}

impl DerefMut for PortGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.port
    }
}

impl Drop for PortGuard<'_> {
    fn drop(&mut self) {
        if self.port.baud_rate() != self.baud_rate {
            if let Err(e) = self.port.set_baud_rate(self.baud_rate) {
                warn!(baud_rate = self.baud_rate, error = %e, "Failed to restore baud rate");
            }
        }
        if let Err(e) = self.port.set_rx_timeout(self.rx_timeout) {
            warn!(timeout = ?self.rx_timeout, error = %e, "Failed to restore RX timeout");
        }
    }
}

/// Read once, giving up at `deadline`. Returns `Ok(0)` on timeout.
///
/// # Errors
///
/// Returns an error if the transport fails.
pub fn read_until_deadline(port: &mut dyn Port, buf: &mut [u8], deadline: Instant) -> Result<usize> {
    while Instant::now() < deadline {
        let n = port.read(buf)?;
        if n > 0 {
            return Ok(n);
        }
    }
    Ok(0)
}

/// Read single bytes until `token` has been received.
///
/// Everything before the token is discarded.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the token does not arrive within `timeout`.
pub fn expect_string(port: &mut dyn Port, token: &[u8], timeout: Duration) -> Result<()> {
    read_through(port, token, timeout, usize::MAX).map(|_| ())
}

/// Collect bytes until `token` has been received, returning everything read
/// before it.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the token does not arrive within `timeout`,
/// or [`Error::Protocol`] if more than `limit` bytes arrive first.
pub fn read_through(
    port: &mut dyn Port,
    token: &[u8],
    timeout: Duration,
    limit: usize,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if received.ends_with(token) {
            received.truncate(received.len() - token.len());
            trace!(token = %String::from_utf8_lossy(token), "Token received");
            return Ok(received);
        }
        if received.len() > limit.saturating_add(token.len()) {
            return Err(Error::protocol(format!(
                "no '{}' within {limit} bytes",
                String::from_utf8_lossy(token)
            )));
        }
        if read_until_deadline(port, &mut byte, deadline)? == 0 {
            return Err(Error::timeout(format!(
                "waiting for '{}'",
                String::from_utf8_lossy(token).escape_default()
            )));
        }
        received.push(byte[0]);
    }
}

/// Write `$<body>*HH\r\n`.
///
/// # Errors
///
/// Returns an error if the transport fails.
pub fn write_nmea(port: &mut dyn Port, body: &str) -> Result<()> {
    let sentence = format_nmea(body);
    trace!(sentence = %sentence.trim_end(), "Sending NMEA");
    port.write(sentence.as_bytes())?;
    Ok(())
}

/// Wrap a sentence body in `$`, `*HH` and CRLF.
#[must_use]
pub fn format_nmea(body: &str) -> String {
    format!("${body}*{:02X}\r\n", nmea_checksum(body.as_bytes()))
}
