//! Fixed-width IGC record rendering.
//!
//! Everything here is pure string formatting. Returned records carry no line
//! terminator; [`IgcWriter`](super::IgcWriter) appends CRLF.
//!
//! Reference: <https://xp-soaring.github.io/igc_file_format/igc_format_2008.html>

use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::is_valid_char;
use crate::geo::GeoPoint;

/// C record of the take-off sentinel.
pub const C_TAKEOFF: &str = "C0000000N00000000ETAKEOFF";

/// C record of the landing sentinel.
pub const C_LANDING: &str = "C0000000N00000000ELANDING";

/// Byte offset (1-based) at which B record extensions start.
const B_EXTENSION_START: usize = 36;

/// Lowest altitude a 5-character field can hold.
const MIN_ALTITUDE: i64 = -9999;

/// Highest altitude a 5-character field can hold.
const MAX_ALTITUDE: i64 = 99999;

/// Remove characters that must not appear in IGC free text.
///
/// Drops the reserved set `$ * ! \ ^ ~` as well as control and non-ASCII
/// characters.
#[must_use]
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|&c| is_valid_char(c)).collect()
}

/// Split an angle into whole degrees and milli-minutes, rounding to the
/// nearest milli-minute without producing `60.000` minutes.
#[must_use]
pub fn split_angle(value: f64) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = (value.abs() * 60_000.0).round() as u64;
    let degrees = u32::try_from(total / 60_000).unwrap_or(u32::MAX);
    let milli_minutes = u32::try_from(total % 60_000).unwrap_or(0);
    (degrees, milli_minutes)
}

/// `DDMMmmmN` from degrees, milli-minutes and hemisphere.
#[must_use]
pub fn format_latitude_parts(degrees: u32, milli_minutes: u32, south: bool) -> String {
    format!(
        "{degrees:02}{milli_minutes:05}{}",
        if south { 'S' } else { 'N' }
    )
}

/// `DDDMMmmmE` from degrees, milli-minutes and hemisphere.
#[must_use]
pub fn format_longitude_parts(degrees: u32, milli_minutes: u32, west: bool) -> String {
    format!(
        "{degrees:03}{milli_minutes:05}{}",
        if west { 'W' } else { 'E' }
    )
}

/// Format a latitude as `DDMMmmmN`.
///
/// Example: 54.11868 -> `5407121N`
#[must_use]
pub fn format_latitude(latitude: f64) -> String {
    let (degrees, milli_minutes) = split_angle(latitude);
    format_latitude_parts(degrees, milli_minutes, latitude < 0.0)
}

/// Format a longitude as `DDDMMmmmE`.
///
/// Example: -2.82237 -> `00249342W`
#[must_use]
pub fn format_longitude(longitude: f64) -> String {
    let (degrees, milli_minutes) = split_angle(longitude);
    format_longitude_parts(degrees, milli_minutes, longitude < 0.0)
}

/// Latitude followed by longitude.
#[must_use]
pub fn format_location(location: GeoPoint) -> String {
    format!(
        "{}{}",
        format_latitude(location.latitude),
        format_longitude(location.longitude)
    )
}

/// Five character altitude field, clamped to `-9999..=99999` metres.
#[must_use]
pub fn format_altitude(metres: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let value = if metres.is_finite() {
        (metres.round() as i64).clamp(MIN_ALTITUDE, MAX_ALTITUDE)
    } else {
        0
    };

    if value < 0 {
        format!("-{:04}", -value)
    } else {
        format!("{value:05}")
    }
}

/// `DDMMYY`
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    format!("{:02}{:02}{:02}", date.day(), date.month(), date.year() % 100)
}

/// `HHMMSS`
#[must_use]
pub fn format_time(time: NaiveTime) -> String {
    format!("{:02}{:02}{:02}", time.hour(), time.minute(), time.second())
}

/// `A` record: manufacturer code and logger id.
#[must_use]
pub fn a_record(vendor: &str, logger_id: &str) -> String {
    format!("A{vendor}{}", sanitize(logger_id))
}

/// `HFDTE` record.
#[must_use]
pub fn h_date(date: NaiveDate) -> String {
    format!("HFDTE{}", format_date(date))
}

/// `HF` record with a three letter code, long name and free-text value.
#[must_use]
pub fn h_record(code: &str, long_name: &str, value: &str) -> String {
    format!("HF{code}{long_name}:{}", sanitize(value))
}

/// `I` record declaring B record extensions as `(code, width)` pairs.
#[must_use]
pub fn i_record(extensions: &[(&str, usize)]) -> String {
    let mut out = format!("I{:02}", extensions.len());
    let mut start = B_EXTENSION_START;
    for (code, width) in extensions {
        let end = start + width - 1;
        let _ = write!(out, "{start:02}{end:02}{code}");
        start = end + 1;
    }
    out
}

/// `C` record opening the task declaration.
///
/// `turn_points` counts start and finish; the record carries the number of
/// turn points in between.
#[must_use]
pub fn c_declaration_header(
    declared: NaiveDateTime,
    flight_date: Option<NaiveDate>,
    task_number: u16,
    turn_points: usize,
    description: &str,
) -> String {
    format!(
        "C{}{}{}{task_number:04}{:02}{}",
        format_date(declared.date()),
        format_time(declared.time()),
        flight_date.map_or_else(|| "000000".to_string(), format_date),
        turn_points.saturating_sub(2),
        sanitize(description)
    )
}

/// `C` record of one declared point, with the name upper-cased.
#[must_use]
pub fn c_point(location: GeoPoint, name: &str) -> String {
    format!("C{}{}", format_location(location), sanitize(&name.to_uppercase()))
}

/// `B` record without extensions appended.
#[must_use]
pub fn b_record(
    time: NaiveTime,
    location: GeoPoint,
    valid: bool,
    pressure_altitude: f64,
    gps_altitude: f64,
) -> String {
    format!(
        "B{}{}{}{}{}",
        format_time(time),
        format_location(location),
        if valid { 'A' } else { 'V' },
        format_altitude(pressure_altitude),
        format_altitude(gps_altitude)
    )
}

/// `E` event record with a three letter code.
#[must_use]
pub fn e_record(time: NaiveTime, code: &str, text: &str) -> String {
    format!("E{}{code}{}", format_time(time), sanitize(text))
}

/// `F` record listing the satellites in use.
#[must_use]
pub fn f_record(time: NaiveTime, satellites: &[u8]) -> String {
    let mut out = format!("F{}", format_time(time));
    for prn in satellites {
        let _ = write!(out, "{prn:02}");
    }
    out
}

/// `K` record with pre-formatted extension data.
#[must_use]
pub fn k_record(time: NaiveTime, data: &str) -> String {
    format!("K{}{}", format_time(time), sanitize(data))
}

/// `L` comment record carrying a manufacturer code.
#[must_use]
pub fn l_record(vendor: &str, text: &str) -> String {
    format!("L{vendor}{}", sanitize(text))
}
