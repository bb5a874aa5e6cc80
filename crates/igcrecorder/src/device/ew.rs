//! Driver for EW recorders speaking the "IO mode" command set.
//!
//! The recorder is switched into IO mode with `##`, answers every command
//! line with `OK` and is put back into NMEA output with `NMEA` when the
//! exchange ends. Commands are ASCII lines followed by a two-digit hex XOR
//! checksum.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checksum::nmea_checksum;
use crate::declaration::{Declaration, DeclarationLimits, TurnPoint};
use crate::error::{Error, Result};
use crate::igc::format::split_angle;
use crate::operation::OperationHandle;
use crate::port::{expect_string, read_through, Port, PortGuard};
use crate::retry::retry;

use super::Device;

/// Driver name used in logs and errors.
pub const DEVICE_NAME: &str = "EW";

/// Baud rate of the IO mode.
pub const IO_BAUD_RATE: u32 = 9600;

/// Default number of IO mode handshake attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Turn points the recorder stores, start and finish included.
pub const MAX_TURN_POINTS: usize = 7;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const ACK_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_DELAY: Duration = Duration::from_millis(50);
const REPLY_LIMIT: usize = 64;

/// Waypoint identifier width on the recorder.
const ID_LENGTH: usize = 6;

/// Append the checksum and line terminator to a command.
#[must_use]
pub fn checksummed(command: &str) -> String {
    format!("{command}{:02X}\r\n", nmea_checksum(command.as_bytes()))
}

/// Left-align `text` in a field of `width` ASCII characters.
fn fixed_field(text: &str, width: usize) -> String {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { ' ' })
        .take(width)
        .collect();
    format!("{ascii:<width$}")
}

/// The pilot info line sent after `#SPI`.
///
/// Pilot (12), glider type (8) and glider id (8) are followed by the GPS
/// model, GPS serial and flight date fields, which are left blank.
#[must_use]
pub fn pilot_info(declaration: &Declaration) -> String {
    format!(
        "{}{}{}{:12}{:12}{:6}\r",
        fixed_field(&declaration.pilot_name, 12),
        fixed_field(&declaration.aircraft_type, 8),
        fixed_field(&declaration.aircraft_registration, 8),
        "",
        "",
        ""
    )
}

/// The `#STP` command storing `turn_point` in slot `index`, without its
/// checksum.
#[must_use]
pub fn turn_point_command(index: usize, turn_point: &TurnPoint) -> String {
    let location = turn_point.location();
    let mut command = format!("#STP{index:02X}");
    for byte in fixed_field(turn_point.name(), ID_LENGTH).bytes() {
        command.push_str(&format!("{byte:02X}"));
    }

    let mut flags = 0u8;
    flags |= if location.latitude < 0.0 { 0x02 } else { 0x01 };
    flags |= if location.longitude < 0.0 { 0x08 } else { 0x04 };

    let (lat_degrees, lat_milli) = split_angle(location.latitude);
    let (lon_degrees, lon_milli) = split_angle(location.longitude);
    command.push_str(&format!(
        "{flags:02X}{lat_degrees:02X}{:04X}{lon_degrees:02X}{:04X}",
        lat_milli / 10,
        lon_milli / 10
    ));
    command
}

/// An EW recorder in IO mode.
#[derive(Debug)]
pub struct EwDevice<P: Port> {
    port: P,
    connect_attempts: u32,
}

impl<P: Port> EwDevice<P> {
    /// Wrap `port`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }

    /// Use a different number of handshake attempts.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// The underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Give back the port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

/// Switch the recorder into IO mode.
///
/// Every attempt first ends any IO session the recorder is still in, so a
/// recorder left behind by an aborted exchange answers the handshake again.
fn connect(port: &mut dyn Port, attempts: u32) -> Result<()> {
    retry(attempts, |attempt| {
        debug!(attempt, "Requesting EW IO mode");
        port.write(b"NMEA\r\n")?;
        thread::sleep(COMMAND_DELAY);
        port.flush_input()?;
        port.write(b"##\r\n")?;
        expect_string(port, b"IO Mode.\r", CONNECT_TIMEOUT)
    })
}

/// Write one line and require an `OK` reply.
fn command(port: &mut dyn Port, line: &str) -> Result<()> {
    port.flush_input()?;
    port.write(line.as_bytes())?;
    let reply = read_through(port, b"\r", ACK_TIMEOUT, REPLY_LIMIT)?;
    let reply = String::from_utf8_lossy(&reply);
    let reply = reply.trim();
    if reply == "OK" {
        Ok(())
    } else {
        Err(Error::rejected(
            DEVICE_NAME,
            format!("'{}' answered with '{reply}'", line.trim_end()),
        ))
    }
}

fn upload(
    port: &mut dyn Port,
    declaration: &Declaration,
    attempts: u32,
    operation: &OperationHandle,
) -> Result<()> {
    connect(port, attempts)?;
    operation.checkpoint()?;

    port.write(checksummed("#SPI").as_bytes())?;
    thread::sleep(COMMAND_DELAY);
    command(port, &pilot_info(declaration))?;

    command(port, &checksummed("#CTP"))?;
    for (index, turn_point) in declaration.turn_points.iter().enumerate() {
        operation.checkpoint()?;
        command(port, &checksummed(&turn_point_command(index, turn_point)))?;
    }
    Ok(())
}

impl<P: Port> Device for EwDevice<P> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn limits(&self) -> DeclarationLimits {
        DeclarationLimits::new(MAX_TURN_POINTS)
    }

    fn declare(&mut self, declaration: &Declaration, operation: &OperationHandle) -> Result<()> {
        declaration.validate(&self.limits())?;

        let mut guard = PortGuard::new(&mut self.port);
        if guard.baud_rate() != IO_BAUD_RATE {
            guard.set_baud_rate(IO_BAUD_RATE)?;
        }

        let result = upload(&mut *guard, declaration, self.connect_attempts, operation);

        if let Err(e) = guard.write(b"NMEA\r\n") {
            warn!(error = %e, "Failed to return EW recorder to NMEA mode");
        }

        if result.is_ok() {
            info!(turn_points = declaration.len(), "EW declaration uploaded");
        }
        result
    }
}
