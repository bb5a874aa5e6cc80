//! Flight recorder drivers.
//!
//! Every supported recorder family implements [`Device`]. Drivers own their
//! transport, validate a declaration against their [`DeclarationLimits`]
//! before touching it, and restore the transport's baud rate and receive
//! timeout on every exit path.

pub(crate) mod bits;
pub mod ew;
pub mod ew_micro;
pub mod imi;
pub mod nano;

use std::fmt;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};

use crate::config::DeviceConfig;
use crate::declaration::{Declaration, DeclarationLimits};
use crate::error::{Error, Result};
use crate::fix::GpsFix;
use crate::nmea;
use crate::operation::OperationHandle;
use crate::port::Port;

pub use ew::EwDevice;
pub use ew_micro::EwMicroDevice;
pub use imi::ImiDevice;
pub use nano::NanoDevice;

/// Recorder families with a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// IMI ERIXX and compatible binary protocol recorders.
    Imi,
    /// EW model A/B recorders.
    Ew,
    /// EW microRecorder.
    EwMicro,
    /// LX Nano.
    Nano,
}

impl DeviceKind {
    /// All supported families.
    pub const ALL: [Self; 4] = [Self::Imi, Self::Ew, Self::EwMicro, Self::Nano];
}

/// Create the driver for `kind` on `port`, with the timeouts and retry
/// counts from `config`.
pub fn open_device<P: Port + 'static>(
    kind: DeviceKind,
    port: P,
    config: &DeviceConfig,
) -> Box<dyn Device> {
    match kind {
        DeviceKind::Imi => Box::new(ImiDevice::with_retries(port, config.imi_retries)),
        DeviceKind::Ew => {
            Box::new(EwDevice::new(port).with_connect_attempts(config.ew_connect_attempts))
        }
        DeviceKind::EwMicro => Box::new(
            EwMicroDevice::new(port)
                .with_connect_attempts(config.ew_connect_attempts)
                .with_connect_window(config.micro_connect_window()),
        ),
        DeviceKind::Nano => Box::new(NanoDevice::new(port).with_timeout(config.nano_timeout())),
    }
}

/// Where a recorded flight lives on the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightHandle {
    /// IMI flash storage.
    Imi {
        /// Flash address of the stored declaration.
        address: u32,
        /// Number of 16-byte fix records after it.
        fixes: u32,
    },
    /// LX Nano logbook entry.
    Nano {
        /// File name on the recorder.
        filename: String,
    },
}

/// One entry of a recorder's flight list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFlight {
    /// Day of the flight.
    pub date: NaiveDate,
    /// Recording start, UTC.
    pub start_time: NaiveTime,
    /// Recording end, UTC.
    pub end_time: NaiveTime,
    /// Driver-specific location of the flight.
    pub handle: FlightHandle,
}

impl fmt::Display for RecordedFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date,
            self.start_time.format("%H:%M:%S"),
            self.end_time.format("%H:%M:%S")
        )
    }
}

/// A flight recorder on the other end of a [`Port`](crate::port::Port).
///
/// Operations block the calling thread. Long transfers report progress
/// through the [`OperationHandle`] and stop at the next chunk boundary
/// once it is cancelled.
pub trait Device: Send + fmt::Debug {
    /// Short driver name for logs and errors.
    fn name(&self) -> &'static str;

    /// Constraints a declaration must meet for this recorder.
    fn limits(&self) -> DeclarationLimits;

    /// Update `fix` from one line received while the recorder streams
    /// position data. Returns `true` if the line was understood.
    fn parse_fix(&mut self, line: &str, fix: &mut GpsFix) -> bool {
        nmea::parse_sentence(line, fix)
    }

    /// Upload a task declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] without any I/O if the task does
    /// not fit [`limits`](Self::limits), otherwise the transport or protocol
    /// error that ended the exchange.
    fn declare(&mut self, declaration: &Declaration, operation: &OperationHandle) -> Result<()>;

    /// List the flights stored on the recorder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the recorder cannot list flights.
    fn read_flight_list(&mut self, operation: &OperationHandle) -> Result<Vec<RecordedFlight>> {
        let _ = operation;
        Err(Error::unsupported(self.name(), "flight list"))
    }

    /// Download one flight into an IGC file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the recorder cannot download
    /// flights, [`Error::Cancelled`] if the operation was cancelled.
    fn download_flight(
        &mut self,
        flight: &RecordedFlight,
        path: &Path,
        operation: &OperationHandle,
    ) -> Result<()> {
        let _ = (flight, path, operation);
        Err(Error::unsupported(self.name(), "flight download"))
    }
}
