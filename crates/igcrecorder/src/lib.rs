//! `igcrecorder` - Glide computer flight recorder protocols and IGC logging
//!
//! This library talks to external flight recorders over a serial-style
//! [`Port`] to declare tasks and download flights, and writes its own IGC
//! flight logs with a tamper-evident G record.
//!
//! - [`declaration`]: the task a pilot declares before a flight;
//! - [`device`]: one driver per recorder family behind the [`Device`] trait;
//! - [`igc`]: record formatting, log file names and the G record;
//! - [`logger`]: turns a stream of [`GpsFix`]es into signed flight logs.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod checksum;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod device;
pub mod error;
pub mod fix;
pub mod geo;
pub mod igc;
pub mod logger;
pub mod logging;
pub mod nmea;
pub mod operation;
pub mod port;
pub mod retry;

pub use config::Config;
pub use declaration::{Declaration, DeclarationLimits, TurnPoint, Waypoint, ZoneShape};
pub use device::{open_device, Device, DeviceKind, FlightHandle, RecordedFlight};
pub use error::{Error, Result};
pub use fix::GpsFix;
pub use geo::GeoPoint;
pub use logger::{Logger, LoggerState};
pub use logging::init_logging;
pub use operation::OperationHandle;
pub use port::Port;
