//! Conversion of downloaded IMI flights to IGC records.
//!
//! A stored flight is its declaration block, the fix records and the
//! recorder's RSA signature. The recorder signs the exact text produced
//! here, so header order and field widths are fixed.

use std::fmt::Write as _;

use chrono::NaiveTime;

use super::records::{checksum_ok, split_b2, EventKind, FixB, FixE, FixRecord};
use super::types::{to_datetime, Angle, ImiDeclaration, Signature, NO_ENL_MASK};
use crate::igc::format::{
    c_declaration_header, e_record, f_record, format_altitude, format_latitude_parts,
    format_longitude_parts, format_time, h_date, h_record, k_record, l_record, sanitize,
};

/// Manufacturer code the recorder signs with.
const VENDOR: &str = "IMI";

const SERIAL_DIGITS: &[u8; 32] = b"0123456789ABCDEFHJKLMNPRSTUVWXYZ";

const DEVICE_NAMES: &[&str] = &["Erixx", "SaiLog"];

const GPS_NAMES: &[&str] = &[
    "u-blox,LEA-4A,16,max15000m",
    "u-blox,LEA-4H,16,max15000m",
    "u-blox,LEA-5H,50,max15000m",
];

const SENSOR_NAMES: &[&str] = &[
    "Intersema,MS5534A,max10000m",
    "Intersema,MS5534B,max15000m",
    "No pressure sensor",
];

/// Bytes of signature rendered per `G` line.
const SIGNATURE_BYTES_PER_LINE: usize = 32;

fn lookup(names: &[&'static str], index: u8) -> &'static str {
    names.get(usize::from(index)).copied().unwrap_or("Unknown")
}

/// Three base-32 digits of a serial number; out-of-range serials read as 0.
#[must_use]
pub fn serial_code(serial: u16) -> String {
    let serial = if serial >= 32 * 32 * 32 { 0 } else { serial };
    [serial >> 10, (serial >> 5) & 0x1F, serial & 0x1F]
        .iter()
        .map(|&digit| char::from(SERIAL_DIGITS[usize::from(digit)]))
        .collect()
}

fn time_of_day(seconds: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(seconds % 86_400, 0).unwrap_or_default()
}

/// Text up to the first NUL, with characters IGC cannot carry removed.
fn event_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    sanitize(&String::from_utf8_lossy(&bytes[..end]))
}

fn angle_parts(latitude: Angle, longitude: Angle) -> String {
    format!(
        "{}{}",
        format_latitude_parts(latitude.degrees, latitude.milli_minutes, latitude.negative),
        format_longitude_parts(longitude.degrees, longitude.milli_minutes, longitude.negative)
    )
}

/// Stateful converter for one flight.
///
/// `B2` records are deltas against the last full fix, and `B` records
/// carry the satellite count of the last `F` record, so records must be
/// fed in stored order.
#[derive(Debug)]
pub struct IgcConverter {
    has_enl: bool,
    last_full: Option<FixB>,
    satellites_in_use: usize,
}

impl IgcConverter {
    /// Converter for a flight recorded with the given declaration.
    #[must_use]
    pub fn new(declaration: &ImiDeclaration) -> Self {
        Self {
            has_enl: declaration.header.has_enl(),
            last_full: None,
            satellites_in_use: 0,
        }
    }

    /// Header, extension definitions, task and flight-of-day records.
    ///
    /// Also resets the fix state: the next fix must be a full one.
    pub fn header_lines(&mut self, declaration: &ImiDeclaration, tampered: bool) -> Vec<String> {
        self.last_full = None;
        let header = &declaration.header;
        let mut lines = vec![format!("A{VENDOR}{}", serial_code(header.serial))];

        if let Some(start) = to_datetime(header.recording_start) {
            lines.push(h_date(start.date()));
        }
        lines.push("HFFXA010".to_string());
        lines.push(h_record("PLT", "PILOT", &header.pilot));
        if let Some(birth) = header.pilot_birth.format() {
            lines.push(h_record("DB1", "PILOTBIRTHDATE", &birth));
        }
        lines.push(h_record("GTY", "GLIDERTYPE", &header.glider_type));
        lines.push(h_record("GID", "GLIDERID", &header.glider_id));
        lines.push(h_record("DTM", "100DATUM", "WGS-1984"));
        lines.push(h_record(
            "RFW",
            "FIRMWAREVERSION",
            &format!("{}.{}", header.sw_version >> 4, header.sw_version & 0x0F),
        ));
        lines.push(h_record(
            "RHW",
            "HARDWAREVERSION",
            &format!("{}.{}", header.hw_version >> 4, header.hw_version & 0x0F),
        ));
        lines.push(h_record(
            "FTY",
            "FRTYPE",
            &format!("IMI Gliding, {}", lookup(DEVICE_NAMES, header.device)),
        ));
        lines.push(h_record("GPS", "GPS", lookup(GPS_NAMES, header.gps)));
        lines.push(h_record(
            "PRS",
            "PRESSALTSENSOR",
            lookup(SENSOR_NAMES, header.sensor & !NO_ENL_MASK),
        ));
        if tampered {
            lines.push(h_record(
                "FRS",
                "SECURITYSUSPECTUSEVALIPROGRAM",
                "Tamper detected, FR needs to be reset",
            ));
        }

        // The recorder signs the class line whenever a competition id is set.
        if !header.competition_id.is_empty() {
            lines.push(h_record("CID", "COMPETITIONID", &header.competition_id));
            lines.push(h_record("CCL", "COMPETITIONCLASS", &header.competition_class));
        }
        if !header.copilot.is_empty() {
            lines.push(h_record("CM2", "SECONDCREW", &header.copilot));
            if let Some(birth) = header.copilot_birth.format() {
                lines.push(h_record("DB1", "SECONDCREWBIRTHDATE", &birth));
            }
        }
        if !header.club.is_empty() {
            lines.push(h_record("CLB", "CLUB", &header.club));
        }
        if !header.site.is_empty() {
            lines.push(h_record("CLB", "SITE", &header.site));
        }

        lines.push(if self.has_enl {
            "I033638FXA3940SIU4143ENL".to_string()
        } else {
            "I023638FXA3940SIU".to_string()
        });
        lines.push("J020810HDT1113GSP".to_string());

        let count = declaration.turn_point_count();
        if count >= 2 {
            lines.push(c_declaration_header(
                to_datetime(header.date).unwrap_or_default(),
                header.task_date.to_date(),
                header.task_number,
                count,
                &header.task_name,
            ));
            for waypoint in declaration.waypoints.iter().take(count + 2) {
                lines.push(format!(
                    "C{}{}",
                    angle_parts(waypoint.latitude, waypoint.longitude),
                    sanitize(&waypoint.name)
                ));
            }
        }

        lines.push(l_record(
            VENDOR,
            &format!("FLIGHTOFDAY:{:03}", header.flight_of_day),
        ));
        lines
    }

    /// Records for one stored 16-byte fix.
    ///
    /// A record with a bad checksum produces nothing and forgets the last
    /// full fix, so following `B2` records are dropped until the next `B`.
    pub fn fix_lines(&mut self, record: &[u8]) -> Vec<String> {
        if !checksum_ok(record) {
            self.last_full = None;
            return Vec::new();
        }
        match FixRecord::decode(record) {
            Some(FixRecord::B(fix)) => {
                self.last_full = Some(fix);
                vec![self.b_line(&fix)]
            }
            Some(FixRecord::B2(deltas)) => match self.last_full {
                Some(full) => {
                    let (first, second) = split_b2(&full, &deltas);
                    vec![self.b_line(&first), self.b_line(&second)]
                }
                None => Vec::new(),
            },
            Some(FixRecord::K(fix)) => vec![k_record(
                time_of_day(fix.time),
                &format!("{:03}{:03}", fix.heading, fix.ground_speed),
            )],
            Some(FixRecord::E(event)) => self.event_line(&event).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn b_line(&self, fix: &FixB) -> String {
        let validity = match fix.validity {
            0 => 'V',
            1 => 'A',
            _ => '?',
        };
        let mut line = format!(
            "B{}{}{validity}{}{}{:03}{:02}",
            format_time(time_of_day(fix.time)),
            angle_parts(fix.latitude, fix.longitude),
            format_altitude(f64::from(fix.pressure_altitude)),
            format_altitude(f64::from(fix.gps_altitude)),
            fix.accuracy.clamp(0, 999),
            self.satellites_in_use.min(99)
        );
        if self.has_enl {
            let _ = write!(line, "{:03}", fix.enl.min(999));
        }
        line
    }

    fn event_line(&mut self, event: &FixE) -> Option<String> {
        let time = time_of_day(event.time);
        match event.kind {
            EventKind::Satellites => {
                let prns: Vec<u8> = event.text.iter().copied().filter(|&prn| prn > 0).collect();
                self.satellites_in_use = prns.len();
                Some(f_record(time, &prns))
            }
            EventKind::Comment => Some(l_record(
                VENDOR,
                &format!("{}{}", format_time(time), event_text(&event.text)),
            )),
            EventKind::PilotEvent => Some(e_record(time, "", &event_text(&event.text))),
            EventKind::Task => {
                let kind = event.text.first().copied().unwrap_or(0);
                let rest = event_text(event.text.get(2..).unwrap_or_default());
                if kind == 1 {
                    return Some(e_record(time, "STA", &rest));
                }
                let code = match kind {
                    2 => "ONT",
                    3 => "FIN",
                    _ => "TPC",
                };
                let index = event.text.get(1).copied().unwrap_or(0);
                Some(e_record(time, code, &format!("{index:02}{rest}")))
            }
            EventKind::Other(_) => None,
        }
    }
}

/// `G` records for a downloaded signature.
///
/// Signatures the recorder marks as unusable become a single
/// `GINVALID` line explaining why.
#[must_use]
pub fn signature_lines(signature: &Signature, serial: u16) -> Vec<String> {
    let reason = if serial == 0 {
        Some("Invalid serial number")
    } else if !matches!(signature.rsa_bits, 512 | 768 | 1024) {
        Some("Invalid RSA key size")
    } else if signature.tampered {
        Some("Tamper detected")
    } else {
        None
    };
    if let Some(reason) = reason {
        return vec![format!("GINVALID:{reason}")];
    }

    let length = usize::from(signature.rsa_bits / 8).min(signature.data.len());
    signature.data[..length]
        .chunks(SIGNATURE_BYTES_PER_LINE)
        .map(|chunk| {
            let mut line = String::with_capacity(1 + chunk.len() * 2);
            line.push('G');
            for byte in chunk {
                let _ = write!(line, "{byte:02X}");
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::super::records::tests::full_fix;
    use super::super::records::FixDelta;
    use super::super::types::from_datetime;
    use super::*;
    use crate::declaration::tests::alpha_bravo_task;

    fn stored_declaration() -> ImiDeclaration {
        let mut decl = ImiDeclaration::from_declaration(&alpha_bravo_task()).unwrap();
        decl.header.serial = 0x0123;
        decl.header.device = 1;
        decl.header.sw_version = 0x21;
        decl.header.hw_version = 0x03;
        decl.header.gps = 2;
        decl.header.sensor = 1;
        decl.header.flight_of_day = 3;
        decl.header.recording_start = from_datetime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        )
        .unwrap();
        decl
    }

    fn event(kind: EventKind, text: &[u8]) -> [u8; 16] {
        let mut text = text.to_vec();
        text.resize(FixE::TEXT_SIZE, 0);
        FixRecord::E(FixE {
            time: 12 * 3600 + 30,
            kind,
            text,
        })
        .encode()
    }

    #[test]
    fn test_serial_code() {
        assert_eq!(serial_code(0x0123), "093");
        assert_eq!(serial_code(0), "000");
        assert_eq!(serial_code(32 * 32 * 32 - 1), "ZZZ");
        assert_eq!(serial_code(32 * 32 * 32), "000");
    }

    #[test]
    fn test_header_lines() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        let lines = converter.header_lines(&decl, false);

        assert_eq!(lines[0], "AIMI093");
        assert_eq!(lines[1], "HFDTE010524");
        assert_eq!(lines[2], "HFFXA010");
        assert_eq!(lines[3], "HFPLTPILOT:Jane Doe");
        assert_eq!(lines[4], "HFGTYGLIDERTYPE:ASW 27");
        assert_eq!(lines[5], "HFGIDGLIDERID:D-1234");
        assert_eq!(lines[6], "HFDTM100DATUM:WGS-1984");
        assert_eq!(lines[7], "HFRFWFIRMWAREVERSION:2.1");
        assert_eq!(lines[8], "HFRHWHARDWAREVERSION:0.3");
        assert_eq!(lines[9], "HFFTYFRTYPE:IMI Gliding, SaiLog");
        assert_eq!(lines[10], "HFGPSGPS:u-blox,LEA-5H,50,max15000m");
        assert_eq!(lines[11], "HFPRSPRESSALTSENSOR:Intersema,MS5534B,max15000m");
        assert_eq!(lines[12], "HFCIDCOMPETITIONID:XY");
        assert_eq!(lines[13], "HFCCLCOMPETITIONCLASS:");
        assert_eq!(lines[14], "I033638FXA3940SIU4143ENL");
        assert_eq!(lines[15], "J020810HDT1113GSP");
        assert_eq!(lines[16], "C010100000000000000000001IGCRECORDERTASK");
        assert_eq!(lines[17], "C5000000N00800000EAlpha");
        assert_eq!(lines[19], "C5030000N00830000EBravo");
        assert_eq!(lines[21], "C5000000N00800000EAlpha");
        assert_eq!(lines[22], "LIMIFLIGHTOFDAY:003");
        assert_eq!(lines.len(), 23);
    }

    #[test]
    fn test_header_optional_lines() {
        let mut decl = stored_declaration();
        decl.header.sensor |= NO_ENL_MASK;
        decl.header.competition_id.clear();
        decl.header.copilot = "John Roe".to_string();
        decl.header.site = "Wasserkuppe".to_string();
        decl.waypoints.truncate(2);
        let mut converter = IgcConverter::new(&decl);
        let lines = converter.header_lines(&decl, true);

        assert!(lines.contains(&"HFPRSPRESSALTSENSOR:Intersema,MS5534B,max15000m".to_string()));
        assert!(lines.contains(
            &"HFFRSSECURITYSUSPECTUSEVALIPROGRAM:Tamper detected, FR needs to be reset".to_string()
        ));
        assert!(lines.contains(&"HFCM2SECONDCREW:John Roe".to_string()));
        assert!(lines.contains(&"HFCLBSITE:Wasserkuppe".to_string()));
        assert!(lines.contains(&"I023638FXA3940SIU".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("HFCID")));
        assert!(!lines.iter().any(|l| l.starts_with('C')));
    }

    #[test]
    fn test_full_fix_line() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        let lines = converter.fix_lines(&FixRecord::B(full_fix()).encode());
        assert_eq!(lines, vec!["B1200005000000N00800000EA004500048001200020".to_string()]);
    }

    #[test]
    fn test_satellites_set_count() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        let lines = converter.fix_lines(&event(EventKind::Satellites, &[3, 7, 0, 12]));
        assert_eq!(lines, vec!["F120030030712".to_string()]);

        let lines = converter.fix_lines(&FixRecord::B(full_fix()).encode());
        assert!(lines[0].ends_with("01203020"));
    }

    #[test]
    fn test_b2_needs_full_fix() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        let deltas = [FixDelta::default(); 2];
        let b2 = FixRecord::B2(deltas).encode();
        assert!(converter.fix_lines(&b2).is_empty());

        converter.fix_lines(&FixRecord::B(full_fix()).encode());
        let lines = converter.fix_lines(&b2);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("B120001"));
        assert!(lines[1].starts_with("B120002"));

        let mut corrupt = FixRecord::B(full_fix()).encode();
        corrupt[3] ^= 0x40;
        assert!(converter.fix_lines(&corrupt).is_empty());
        assert!(converter.fix_lines(&b2).is_empty());
    }

    #[test]
    fn test_b2_does_not_replace_full_fix() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        converter.fix_lines(&FixRecord::B(full_fix()).encode());
        let b2 = FixRecord::B2([FixDelta::default(); 2]).encode();
        converter.fix_lines(&b2);
        let lines = converter.fix_lines(&b2);
        assert!(lines[0].starts_with("B120001"));
    }

    #[test]
    fn test_k_and_event_lines() {
        let decl = stored_declaration();
        let mut converter = IgcConverter::new(&decl);
        let k = FixRecord::K(super::super::records::FixK {
            time: 3600,
            heading: 90,
            ground_speed: 112,
        });
        assert_eq!(converter.fix_lines(&k.encode()), vec!["K010000090112".to_string()]);

        assert_eq!(
            converter.fix_lines(&event(EventKind::Comment, b"hello")),
            vec!["LIMI120030hello".to_string()]
        );
        assert_eq!(
            converter.fix_lines(&event(EventKind::PilotEvent, b"PEV")),
            vec!["E120030PEV".to_string()]
        );
        assert_eq!(
            converter.fix_lines(&event(EventKind::Task, b"\x01\x00GO")),
            vec!["E120030STAGO".to_string()]
        );
        assert_eq!(
            converter.fix_lines(&event(EventKind::Task, b"\x04\x02TP")),
            vec!["E120030TPC02TP".to_string()]
        );
        assert_eq!(
            converter.fix_lines(&event(EventKind::Task, b"\x03\x05")),
            vec!["E120030FIN05".to_string()]
        );
        assert!(converter
            .fix_lines(&event(EventKind::Other(6), b"x"))
            .is_empty());
    }

    #[test]
    fn test_no_enl_column() {
        let mut decl = stored_declaration();
        decl.header.sensor |= NO_ENL_MASK;
        let mut converter = IgcConverter::new(&decl);
        let lines = converter.fix_lines(&FixRecord::B(full_fix()).encode());
        assert!(lines[0].ends_with("01200"));
        assert_eq!(lines[0].len(), 35 + 5);
    }

    #[test]
    fn test_signature_lines() {
        let signature = Signature {
            rsa_bits: 512,
            tampered: false,
            data: (0..128).collect(),
        };
        let lines = signature_lines(&signature, 0x0123);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 65);
        assert!(lines[0].starts_with("G000102"));
        assert!(lines[1].starts_with("G202122"));
        assert!(lines[1].ends_with("3F"));

        let lines = signature_lines(&Signature { rsa_bits: 1024, ..signature.clone() }, 1);
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_invalid_signatures() {
        let signature = Signature {
            rsa_bits: 512,
            tampered: false,
            data: vec![0; 128],
        };
        assert_eq!(
            signature_lines(&signature, 0),
            vec!["GINVALID:Invalid serial number".to_string()]
        );
        assert_eq!(
            signature_lines(&Signature { rsa_bits: 256, ..signature.clone() }, 1),
            vec!["GINVALID:Invalid RSA key size".to_string()]
        );
        assert_eq!(
            signature_lines(&Signature { tampered: true, ..signature }, 1),
            vec!["GINVALID:Tamper detected".to_string()]
        );
    }
}
