//! Driver for the EW microRecorder.
//!
//! The microRecorder keeps its declaration in a plain text "user file". To
//! change it the host opens an upload window with a control byte handshake,
//! reads back the existing file, and replaces everything from the
//! `USER DETAILS` section onwards.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::declaration::{Declaration, DeclarationLimits, TurnPoint};
use crate::error::{Error, Result};
use crate::geo::GeoPoint;
use crate::igc::format::split_angle;
use crate::operation::OperationHandle;
use crate::port::{expect_string, read_until_deadline, Port, PortGuard};
use crate::retry::retry;

use super::Device;

/// Driver name used in logs and errors.
pub const DEVICE_NAME: &str = "EW microRecorder";

/// Turn points the recorder stores, start and finish included.
pub const MAX_TURN_POINTS: usize = 12;

/// Default number of handshake attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default time to wait for the user file during the handshake.
pub const DEFAULT_CONNECT_WINDOW: Duration = Duration::from_secs(8);

const START_IO: u8 = 0x02;
const END_OF_FILE: u8 = 0x03;
const END_OF_USER_DATA: u8 = 0x13;
const ACKNOWLEDGE: u8 = 0x16;
const START_UPLOAD: u8 = 0x18;

const USER_DATA_MARKER: &[u8] = b"USER DETAILS";
const MAX_USER_DATA: usize = 2500;
const UPLOAD_CONFIRMATION: &[u8] = b"uploaded successfully";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);
const RX_TIMEOUT: Duration = Duration::from_millis(2500);
const TEARDOWN: &[u8] = b"!!\r\n";
const TEARDOWN_DELAY: Duration = Duration::from_millis(50);

/// Intermediate turn point lines in the user file.
const TURN_POINT_SLOTS: usize = 10;
const EMPTY_TURN_POINT: &str = "TP LatLon: 0000000N00000000E TURN POINT\r\n";

/// Replace everything except letters, digits, space and hyphen with a space.
///
/// The recorder refuses user files containing punctuation.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// `DDMMmmmNDDDMMmmmE`.
fn lat_lon(location: GeoPoint) -> String {
    let (lat_degrees, lat_milli) = split_angle(location.latitude);
    let (lon_degrees, lon_milli) = split_angle(location.longitude);
    format!(
        "{lat_degrees:02}{lat_milli:05}{}{lon_degrees:03}{lon_milli:05}{}",
        if location.latitude < 0.0 { 'S' } else { 'N' },
        if location.longitude < 0.0 { 'W' } else { 'E' }
    )
}

fn pair(label: &str, value: &str) -> String {
    format!("{label}: {}\r\n", clean_text(value))
}

fn waypoint_line(label: &str, turn_point: &TurnPoint) -> String {
    format!(
        "{label}: {} {}\r\n",
        lat_lon(turn_point.location()),
        clean_text(turn_point.name())
    )
}

/// Build the user file: the recorder's own data up to `USER DETAILS`,
/// followed by the pilot and task sections for `declaration`.
#[must_use]
pub fn user_file(user_data: &[u8], declaration: &Declaration) -> Vec<u8> {
    let kept = user_data
        .windows(USER_DATA_MARKER.len())
        .position(|w| w == USER_DATA_MARKER)
        .map_or(user_data, |end| &user_data[..end]);

    let mut text = String::from("USER DETAILS\r\n--------------\r\n\r\n");
    text.push_str(&pair("Pilot Name", &declaration.pilot_name));
    text.push_str(&pair("Competition ID", &declaration.competition_id));
    text.push_str(&pair("Aircraft Type", &declaration.aircraft_type));
    text.push_str(&pair("Aircraft ID", &declaration.aircraft_registration));
    text.push_str("\r\nFLIGHT DECLARATION\r\n-------------------\r\n\r\n");
    text.push_str(&pair("Description", "Task declaration"));

    let points = &declaration.turn_points;
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        text.push_str(&waypoint_line("Take Off LatLong", first));
        text.push_str(&waypoint_line("Start LatLon", first));
        let intermediate = &points[1..points.len() - 1];
        for turn_point in intermediate.iter().take(TURN_POINT_SLOTS) {
            text.push_str(&waypoint_line("TP LatLon", turn_point));
        }
        for _ in intermediate.len()..TURN_POINT_SLOTS {
            text.push_str(EMPTY_TURN_POINT);
        }
        text.push_str(&waypoint_line("Finish LatLon", last));
        text.push_str(&waypoint_line("Land LatLon", last));
    }

    let mut file = kept.to_vec();
    file.extend_from_slice(text.as_bytes());
    file
}

/// An EW microRecorder.
#[derive(Debug)]
pub struct EwMicroDevice<P: Port> {
    port: P,
    connect_attempts: u32,
    connect_window: Duration,
}

impl<P: Port> EwMicroDevice<P> {
    /// Wrap `port`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_window: DEFAULT_CONNECT_WINDOW,
        }
    }

    /// Use a different number of handshake attempts.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Wait `window` for the user file on each handshake attempt.
    #[must_use]
    pub fn with_connect_window(mut self, window: Duration) -> Self {
        self.connect_window = window;
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

/// Open the upload window and return the user data the recorder sent.
///
/// Bytes before the first `-` are noise; the user data runs from there to
/// the end-of-data byte, which is acknowledged. A session still open from an
/// earlier exchange is closed first.
fn connect(port: &mut dyn Port, window: Duration) -> Result<Vec<u8>> {
    port.write(TEARDOWN)?;
    thread::sleep(TEARDOWN_DELAY);
    port.flush_input()?;
    port.write(&[START_IO])?;

    let deadline = Instant::now() + window;
    let mut user_data = Vec::new();
    let mut started = false;
    let mut byte = [0u8; 1];

    while read_until_deadline(port, &mut byte, deadline)? > 0 {
        let ch = byte[0];
        if !started && ch == b'-' {
            started = true;
        }
        if !started {
            continue;
        }
        if ch == END_OF_USER_DATA {
            port.write(&[ACKNOWLEDGE])?;
            return Ok(user_data);
        }
        if user_data.len() < MAX_USER_DATA {
            user_data.push(ch);
        }
    }
    Err(Error::timeout("microRecorder user data"))
}

fn upload(
    port: &mut dyn Port,
    declaration: &Declaration,
    attempts: u32,
    window: Duration,
    operation: &OperationHandle,
) -> Result<()> {
    let user_data = retry(attempts, |attempt| {
        debug!(attempt, "Opening microRecorder upload window");
        operation.checkpoint()?;
        connect(port, window)
    })?;
    operation.checkpoint()?;

    port.write(&[START_UPLOAD])?;
    port.write(&user_file(&user_data, declaration))?;
    port.write(&[END_OF_FILE])?;
    expect_string(port, UPLOAD_CONFIRMATION, UPLOAD_TIMEOUT)
}

impl<P: Port> Device for EwMicroDevice<P> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn limits(&self) -> DeclarationLimits {
        DeclarationLimits::new(MAX_TURN_POINTS)
    }

    fn declare(&mut self, declaration: &Declaration, operation: &OperationHandle) -> Result<()> {
        declaration.validate(&self.limits())?;

        let mut guard = PortGuard::new(&mut self.port);
        // The recorder takes up to a second to answer the upload byte.
        guard.set_rx_timeout(RX_TIMEOUT)?;

        let result = upload(
            &mut *guard,
            declaration,
            self.connect_attempts,
            self.connect_window,
            operation,
        );

        if let Err(e) = guard.write(TEARDOWN) {
            warn!(error = %e, "Failed to return microRecorder to NMEA mode");
        }

        if result.is_ok() {
            info!(turn_points = declaration.len(), "microRecorder declaration uploaded");
        }
        result
    }
}
