//! Parsing of standard NMEA 0183 position sentences into a [`GpsFix`].
//!
//! Only the sentences the logger needs are understood: `RMC` (time, date,
//! position, validity), `GGA` (time, position, altitude) and `GSA` (fix
//! mode, satellites in use). The talker id is ignored, so `GP`, `GN`, `GL`
//! and friends are treated alike.

use chrono::{NaiveDate, NaiveTime};

use crate::checksum::nmea_checksum;
use crate::fix::GpsFix;
use crate::geo::GeoPoint;

/// Update `fix` from one NMEA sentence.
///
/// `line` may include the leading `$` and the `*HH` checksum; when a
/// checksum is present it must match. Returns `true` if the sentence was
/// recognised and applied.
pub fn parse_sentence(line: &str, fix: &mut GpsFix) -> bool {
    let Some(body) = strip_envelope(line.trim()) else {
        return false;
    };

    let fields: Vec<&str> = body.split(',').collect();
    let Some(kind) = fields.first().and_then(|tag| tag.get(2..)) else {
        return false;
    };

    match kind {
        "RMC" => parse_rmc(&fields, fix),
        "GGA" => parse_gga(&fields, fix),
        "GSA" => parse_gsa(&fields, fix),
        _ => false,
    }
}

/// Remove `$` and a verified `*HH` suffix.
fn strip_envelope(line: &str) -> Option<&str> {
    let line = line.strip_prefix('$').unwrap_or(line);
    match line.rsplit_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum, 16).ok()?;
            (nmea_checksum(body.as_bytes()) == expected).then_some(body)
        }
        None => Some(line),
    }
}

fn parse_rmc(fields: &[&str], fix: &mut GpsFix) -> bool {
    if fields.len() < 10 {
        return false;
    }

    fix.nav_warning = fields[2] != "A";

    let Some(time) = parse_time(fields[1]) else {
        return false;
    };
    let date = parse_date(fields[9]).unwrap_or_else(|| fix.time.date_naive());
    fix.time = date.and_time(time).and_utc();

    if let Some(location) = parse_location(fields[3], fields[4], fields[5], fields[6]) {
        fix.location = location;
    }
    true
}

fn parse_gga(fields: &[&str], fix: &mut GpsFix) -> bool {
    if fields.len() < 10 {
        return false;
    }

    if let Some(time) = parse_time(fields[1]) {
        fix.time = fix.time.date_naive().and_time(time).and_utc();
    }

    let quality: u8 = fields[6].parse().unwrap_or(0);
    if quality == 0 {
        fix.nav_warning = true;
        return true;
    }

    if let Some(location) = parse_location(fields[2], fields[3], fields[4], fields[5]) {
        fix.location = location;
    }
    if let Ok(altitude) = fields[9].parse::<f64>() {
        fix.gps_altitude = altitude;
    }
    true
}

fn parse_gsa(fields: &[&str], fix: &mut GpsFix) -> bool {
    if fields.len() < 15 {
        return false;
    }

    if fields[2] == "1" {
        fix.nav_warning = true;
    }
    fix.satellites = fields[3..15]
        .iter()
        .filter_map(|f| f.parse::<u8>().ok())
        .filter(|&prn| prn > 0)
        .collect();
    if let Ok(pdop) = fields.get(15).unwrap_or(&"").parse::<f64>() {
        // rough position error estimate from PDOP and a 4 m UERE
        fix.position_error = Some(pdop * 4.0);
    }
    true
}

/// Parse `ddmm.mmmm` / `dddmm.mmmm` pairs with hemisphere letters.
fn parse_location(lat: &str, ns: &str, lon: &str, ew: &str) -> Option<GeoPoint> {
    let latitude = parse_coordinate(lat, ns)?;
    let longitude = parse_coordinate(lon, ew)?;
    Some(GeoPoint::new(latitude, longitude))
}

fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }

    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Parse `hhmmss[.sss]`.
fn parse_time(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 {
        return None;
    }
    let hour = value.get(0..2)?.parse().ok()?;
    let minute = value.get(2..4)?.parse().ok()?;
    let seconds: f64 = value.get(4..)?.parse().ok()?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let second = seconds.floor() as u32;
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Parse `ddmmyy`.
fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let day = value.get(0..2)?.parse().ok()?;
    let month = value.get(2..4)?.parse().ok()?;
    let year: i32 = value.get(4..6)?.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}
