//! Driver for LX Nano recorders.
//!
//! Everything is exchanged as `$PLXVC,...` sentences. A declaration is sent
//! as numbered rows, each of which the recorder confirms before the next
//! one may follow. Stored flights are listed through the logbook commands
//! and downloaded as numbered IGC lines.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::{debug, info};

use crate::declaration::{Declaration, DeclarationLimits, TurnPointRole, ZoneShape};
use crate::error::{Error, Result};
use crate::igc::format::{c_declaration_header, c_point, h_record, C_LANDING, C_TAKEOFF};
use crate::operation::OperationHandle;
use crate::port::{write_nmea, NmeaReader, Port, PortGuard};

use super::{Device, FlightHandle, RecordedFlight};

/// Driver name used in logs and errors.
pub const DEVICE_NAME: &str = "LX Nano";

/// Turn points the recorder stores, start and finish included.
pub const MAX_TURN_POINTS: usize = 15;

/// Default time to wait for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Logbook entries requested at once.
const LOGBOOK_PAGE: u32 = 8;

/// Flight rows requested at once.
const FLIGHT_PAGE: u32 = 32;

/// Inner cylinder of a DAeC keyhole, metres.
const KEYHOLE_INNER_RADIUS: u32 = 500;

/// Observation zone row for turn point `index`.
fn zone_row(declaration: &Declaration, index: usize) -> String {
    let turn_point = &declaration.turn_points[index];
    let style = match declaration.role(index) {
        TurnPointRole::Start => 2,
        TurnPointRole::Intermediate => 1,
        TurnPointRole::Finish => 3,
    };
    let half_angle = match turn_point.shape {
        ZoneShape::Cylinder => 180,
        ZoneShape::Sector | ZoneShape::DaecKeyhole => 45,
        ZoneShape::Line => 90,
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let radius = turn_point.radius.round() as u32;
    let bearing = declaration.zone_bearing(index).unwrap_or(0.0);

    let mut row = format!(
        "LLXVOZ={index},Style={style},R1={radius}m,A1={half_angle},A12={bearing:.1}"
    );
    match turn_point.shape {
        ZoneShape::Line => row.push_str(",Line=1"),
        ZoneShape::DaecKeyhole => {
            row.push_str(&format!(",R2={KEYHOLE_INNER_RADIUS}m,A2=180"));
        }
        ZoneShape::Cylinder | ZoneShape::Sector => {}
    }
    row
}

/// The rows of a declaration, in upload order.
///
/// Five pilot and glider rows, the C record header stamped with `now`, the
/// take-off row, one C row per turn point carrying its elevation after
/// `::`, the landing row, one observation zone row per turn point and the
/// task options row: `9 + 2n` rows in total.
#[must_use]
pub fn declaration_rows(declaration: &Declaration, now: NaiveDateTime) -> Vec<String> {
    let count = declaration.len();
    let mut rows = Vec::with_capacity(9 + 2 * count);

    rows.push(h_record("PLT", "PILOT", &declaration.pilot_name));
    rows.push(h_record("CM2", "CREW2", &declaration.copilot_name));
    rows.push(h_record("GTY", "GLIDERTYPE", &declaration.aircraft_type));
    rows.push(h_record("GID", "GLIDERID", &declaration.aircraft_registration));
    rows.push(h_record("CID", "COMPETITIONID", &declaration.competition_id));

    rows.push(c_declaration_header(now, None, 0, count, ""));
    rows.push(C_TAKEOFF.to_string());
    for turn_point in &declaration.turn_points {
        rows.push(format!(
            "{}::{:.1}",
            c_point(turn_point.location(), turn_point.name()),
            turn_point.waypoint.elevation.unwrap_or(0.0)
        ));
    }
    rows.push(C_LANDING.to_string());

    rows.extend((0..count).map(|index| zone_row(declaration, index)));
    rows.push(format!("LLXVTSK=Type=Task,Turnpoints={count}"));
    rows
}

/// Parse one `PLXVC,LOGBOOK,A,` entry:
/// `<index>,<count>,<file>,<dd.mm.yyyy>,<hh:mm:ss>,<hh:mm:ss>`.
fn parse_logbook_entry(fields: &str) -> Option<RecordedFlight> {
    let mut fields = fields.split(',');
    fields.next()?;
    fields.next()?.trim().parse::<u32>().ok()?;
    let filename = fields.next()?.trim();
    if filename.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(fields.next()?.trim(), "%d.%m.%Y").ok()?;
    let start_time = NaiveTime::parse_from_str(fields.next()?.trim(), "%H:%M:%S").ok()?;
    let end_time = NaiveTime::parse_from_str(fields.next()?.trim(), "%H:%M:%S").ok()?;

    Some(RecordedFlight {
        date,
        start_time,
        end_time,
        handle: FlightHandle::Nano {
            filename: filename.to_string(),
        },
    })
}

/// Parse the logbook size from the remainder of a `PLXVC,LOGBOOK` line.
///
/// Newer firmware answers `LOGBOOKSIZE,A,<n>`, older firmware `LOGBOOK,A,<n>`.
/// Returns `None` for other `LOGBOOK` sentences, including logbook entries
/// that share the older prefix.
fn parse_logbook_size(rest: &str) -> Option<Result<u32>> {
    if let Some(value) = rest.strip_prefix("SIZE,A,") {
        let value = value.trim_end_matches(',');
        return Some(
            value
                .parse()
                .map_err(|_| Error::protocol(format!("bad logbook size '{value}'"))),
        );
    }

    let value = rest.strip_prefix(",A,")?.trim_end_matches(',');
    match value.parse() {
        Ok(size) => Some(Ok(size)),
        Err(_) => {
            debug!(line = rest, "Skipping LOGBOOK sentence without a size");
            None
        }
    }
}

/// Check one `PLXVC,FLIGHT,A,` row against the expected sequence and return
/// its IGC content.
///
/// `row_count` is learned from the first row and must not change.
fn parse_flight_row<'a>(fields: &'a str, expected: u32, row_count: &mut u32) -> Result<&'a str> {
    let mut parts = fields.splitn(4, ',');
    // file name column, left empty by some firmware
    parts.next();
    let row: u32 = parts
        .next()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::protocol(format!("bad flight row '{fields}'")))?;
    let count: u32 = parts
        .next()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::protocol(format!("bad flight row '{fields}'")))?;
    let content = parts.next().unwrap_or("");

    if row == 0 || row > count {
        return Err(Error::protocol(format!("row {row} outside 1..={count}")));
    }
    if row != expected {
        return Err(Error::protocol(format!("expected row {expected}, got {row}")));
    }
    if *row_count == 0 {
        *row_count = count;
    } else if count != *row_count {
        return Err(Error::protocol(format!(
            "row count changed from {row_count} to {count}"
        )));
    }
    Ok(content)
}

/// An LX Nano recorder.
#[derive(Debug)]
pub struct NanoDevice<P: Port> {
    port: P,
    timeout: Duration,
}

impl<P: Port> NanoDevice<P> {
    /// Wrap `port`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Wait `timeout` for each reply.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
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

/// Send declaration row `row` of `total` and wait for its confirmation.
fn write_declaration_row(
    reader: &mut NmeaReader<'_>,
    row: usize,
    total: usize,
    content: &str,
    timeout: Duration,
) -> Result<()> {
    write_nmea(reader.port(), &format!("PLXVC,DECL,W,{row},{total},{content}"))?;

    let expected = format!("PLXVC,DECL,C,{row}");
    let deadline = Instant::now() + timeout;
    loop {
        let line = reader
            .read_line(deadline)
            .map_err(|_| Error::timeout(format!("confirmation of declaration row {row}")))?;
        if line == expected || line.starts_with(&format!("{expected},")) {
            return Ok(());
        }
        debug!(line = %line, row, "Ignoring sentence while waiting for confirmation");
    }
}

fn logbook_size(reader: &mut NmeaReader<'_>, timeout: Duration) -> Result<u32> {
    reader.flush()?;
    write_nmea(reader.port(), "PLXVC,LOGBOOKSIZE,R,")?;
    let deadline = Instant::now() + timeout;
    loop {
        let rest = reader.expect_line("PLXVC,LOGBOOK", deadline)?;
        if let Some(size) = parse_logbook_size(&rest) {
            return size;
        }
    }
}

impl<P: Port> Device for NanoDevice<P> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn limits(&self) -> DeclarationLimits {
        DeclarationLimits::new(MAX_TURN_POINTS)
    }

    fn declare(&mut self, declaration: &Declaration, operation: &OperationHandle) -> Result<()> {
        declaration.validate(&self.limits())?;

        let rows = declaration_rows(declaration, Utc::now().naive_utc());
        let mut guard = PortGuard::new(&mut self.port);
        let mut reader = NmeaReader::new(&mut *guard);
        reader.flush()?;

        for (index, content) in rows.iter().enumerate() {
            operation.checkpoint()?;
            write_declaration_row(&mut reader, index + 1, rows.len(), content, self.timeout)?;
        }

        info!(rows = rows.len(), "Nano declaration uploaded");
        Ok(())
    }

    fn read_flight_list(&mut self, operation: &OperationHandle) -> Result<Vec<RecordedFlight>> {
        let mut guard = PortGuard::new(&mut self.port);
        let mut reader = NmeaReader::new(&mut *guard);

        let count = logbook_size(&mut reader, self.timeout)?;
        operation.set_progress_range(u64::from(count));

        let mut flights = Vec::new();
        let mut next = 1;
        while next <= count {
            operation.checkpoint()?;
            let request = LOGBOOK_PAGE.min(count - next + 1);

            reader.flush()?;
            write_nmea(
                reader.port(),
                &format!("PLXVC,LOGBOOK,R,{next},{},", next + request),
            )?;

            let deadline = Instant::now() + self.timeout;
            let mut received = 0;
            while received < request {
                let line = reader.expect_line("PLXVC,LOGBOOK,A,", deadline)?;
                if let Some(flight) = parse_logbook_entry(&line) {
                    flights.push(flight);
                    received += 1;
                }
            }

            next += request;
            operation.set_progress_position(u64::from(next - 1));
        }

        info!(flights = flights.len(), "Read Nano logbook");
        Ok(flights)
    }

    fn download_flight(
        &mut self,
        flight: &RecordedFlight,
        path: &Path,
        operation: &OperationHandle,
    ) -> Result<()> {
        let FlightHandle::Nano { filename } = &flight.handle else {
            return Err(Error::unsupported(DEVICE_NAME, "download of a foreign flight"));
        };
        operation.checkpoint()?;

        let file = File::create(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let mut guard = PortGuard::new(&mut self.port);
        let mut reader = NmeaReader::new(&mut *guard);

        // The first request fetches one row to learn the file length.
        let mut row_count = 0;
        let mut next = 1;
        loop {
            operation.checkpoint()?;
            let request = if row_count == 0 {
                1
            } else {
                FLIGHT_PAGE.min(row_count - next + 1)
            };
            let end = next + request;

            reader.flush()?;
            write_nmea(
                reader.port(),
                &format!("PLXVC,FLIGHT,R,{filename},{next},{end},"),
            )?;

            let deadline = Instant::now() + self.timeout;
            while next != end {
                let line = reader.expect_line("PLXVC,FLIGHT,A,", deadline)?;
                let content = parse_flight_row(&line, next, &mut row_count)?;
                writer.write_all(content.as_bytes())?;
                writer.write_all(b"\r\n")?;
                next += 1;
            }

            operation.set_progress_range(u64::from(row_count));
            operation.set_progress_position(u64::from(next - 1));
            if next > row_count {
                break;
            }
        }

        writer.flush()?;
        info!(file = %filename, rows = row_count, path = %path.display(), "Nano flight downloaded");
        Ok(())
    }
}
