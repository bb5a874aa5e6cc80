//! Stored fix records.
//!
//! Flights are kept in flash as a sequence of 16-byte records. The first
//! 15 bytes are a bit-packed body starting with a 3-bit record tag; the
//! last byte is a checksum over the body. A `B2` record carries two fixes
//! as deltas against the most recent full `B` record.

use super::types::Angle;
use crate::checksum::fix_checksum;
use crate::device::bits::{BitReader, BitWriter};

/// Size of one stored record.
pub const RECORD_SIZE: usize = 16;

const BODY_SIZE: usize = RECORD_SIZE - 1;

/// Offset added to stored altitudes so that they stay positive.
const ALTITUDE_OFFSET: i32 = 1000;

/// ENL values are stored in steps of this size in `B2` records.
const B2_ENL_STEP: u16 = 8;

/// Record tags.
mod tag {
    pub const B: u32 = 1;
    pub const B2: u32 = 2;
    pub const K: u32 = 3;
    pub const E: u32 = 4;
}

/// Event kinds carried by `E` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Satellites in use; the text holds PRNs.
    Satellites,
    /// Free-text comment.
    Comment,
    /// Pilot event.
    PilotEvent,
    /// Task progress; the text holds the kind, the point index and a label.
    Task,
    /// Anything this crate does not know.
    Other(u8),
}

impl EventKind {
    fn from_raw(value: u8) -> Self {
        match value {
            0 => Self::Satellites,
            1 => Self::Comment,
            2 => Self::PilotEvent,
            3 => Self::Task,
            other => Self::Other(other),
        }
    }

    fn raw(self) -> u8 {
        match self {
            Self::Satellites => 0,
            Self::Comment => 1,
            Self::PilotEvent => 2,
            Self::Task => 3,
            Self::Other(other) => other,
        }
    }
}

/// A full position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixB {
    /// Seconds since midnight UTC.
    pub time: u32,
    /// Validity: 1 for a 3D fix, 0 for a 2D fix.
    pub validity: u8,
    /// Fix accuracy in metres.
    pub accuracy: i32,
    /// Latitude.
    pub latitude: Angle,
    /// Longitude.
    pub longitude: Angle,
    /// Pressure altitude in metres.
    pub pressure_altitude: i32,
    /// GPS altitude in metres.
    pub gps_altitude: i32,
    /// Engine noise level.
    pub enl: u16,
}

/// One delta-coded fix inside a `B2` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixDelta {
    /// Seconds after the previous fix, minus one.
    pub time: u32,
    /// Latitude change in milli-minutes.
    pub latitude: i32,
    /// Longitude change in milli-minutes.
    pub longitude: i32,
    /// Pressure altitude change in metres.
    pub pressure_altitude: i32,
    /// GPS altitude change in metres.
    pub gps_altitude: i32,
    /// Fix accuracy change in metres.
    pub accuracy: i32,
    /// Engine noise level.
    pub enl: u16,
}

/// Extended data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixK {
    /// Seconds since midnight UTC.
    pub time: u32,
    /// True heading in degrees.
    pub heading: u16,
    /// Ground speed in km/h.
    pub ground_speed: u16,
}

/// An event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixE {
    /// Seconds since midnight UTC.
    pub time: u32,
    /// What the text means.
    pub kind: EventKind,
    /// Raw event data.
    pub text: Vec<u8>,
}

impl FixE {
    /// Width of the text field.
    pub const TEXT_SIZE: usize = 11;
    const TEXT_OFFSET: usize = 4;
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixRecord {
    /// Full fix.
    B(FixB),
    /// Two delta-coded fixes.
    B2([FixDelta; 2]),
    /// Extended data.
    K(FixK),
    /// Event.
    E(FixE),
}

/// Check the trailing checksum byte of a stored record.
#[must_use]
pub fn checksum_ok(record: &[u8]) -> bool {
    record.len() == RECORD_SIZE && fix_checksum(&record[..BODY_SIZE]) == record[BODY_SIZE]
}

fn seal(mut body: Vec<u8>) -> [u8; RECORD_SIZE] {
    body.resize(BODY_SIZE, 0);
    let mut out = [0u8; RECORD_SIZE];
    out[..BODY_SIZE].copy_from_slice(&body);
    out[BODY_SIZE] = fix_checksum(&body);
    out
}

impl FixRecord {
    /// Decode a record whose checksum has been verified.
    ///
    /// Returns `None` for unknown tags.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn decode(record: &[u8]) -> Option<Self> {
        let mut bits = BitReader::new(record.get(..BODY_SIZE)?);
        match bits.take(3) {
            tag::B => Some(Self::B(FixB {
                time: bits.take(20),
                validity: bits.take(2) as u8,
                accuracy: bits.take(9) as i32,
                latitude: Angle::unpack(bits.take(25)),
                longitude: Angle::unpack(bits.take(25)),
                pressure_altitude: bits.take(14) as i32 - ALTITUDE_OFFSET,
                gps_altitude: bits.take(14) as i32 - ALTITUDE_OFFSET,
                enl: bits.take(8) as u16,
            })),
            tag::B2 => {
                let mut delta = || FixDelta {
                    time: bits.take(4),
                    latitude: bits.take_signed(14),
                    longitude: bits.take_signed(14),
                    pressure_altitude: bits.take_signed(8),
                    gps_altitude: bits.take_signed(8),
                    accuracy: bits.take_signed(5),
                    enl: bits.take(5) as u16 * B2_ENL_STEP,
                };
                let first = delta();
                let second = delta();
                Some(Self::B2([first, second]))
            }
            tag::K => Some(Self::K(FixK {
                time: bits.take(20),
                heading: bits.take(9) as u16,
                ground_speed: bits.take(10) as u16,
            })),
            tag::E => {
                let time = bits.take(20);
                let kind = EventKind::from_raw(bits.take(3) as u8);
                Some(Self::E(FixE {
                    time,
                    kind,
                    text: record[FixE::TEXT_OFFSET..BODY_SIZE].to_vec(),
                }))
            }
            _ => None,
        }
    }

    /// Encode with a valid checksum.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bits = BitWriter::new(BODY_SIZE);
        match self {
            Self::B(fix) => {
                bits.put(tag::B, 3);
                bits.put(fix.time, 20);
                bits.put(u32::from(fix.validity), 2);
                bits.put(fix.accuracy as u32, 9);
                bits.put(fix.latitude.pack(), 25);
                bits.put(fix.longitude.pack(), 25);
                bits.put((fix.pressure_altitude + ALTITUDE_OFFSET) as u32, 14);
                bits.put((fix.gps_altitude + ALTITUDE_OFFSET) as u32, 14);
                bits.put(u32::from(fix.enl), 8);
            }
            Self::B2(deltas) => {
                bits.put(tag::B2, 3);
                for delta in deltas {
                    bits.put(delta.time, 4);
                    bits.put_signed(delta.latitude, 14);
                    bits.put_signed(delta.longitude, 14);
                    bits.put_signed(delta.pressure_altitude, 8);
                    bits.put_signed(delta.gps_altitude, 8);
                    bits.put_signed(delta.accuracy, 5);
                    bits.put(u32::from(delta.enl / B2_ENL_STEP), 5);
                }
            }
            Self::K(fix) => {
                bits.put(tag::K, 3);
                bits.put(fix.time, 20);
                bits.put(u32::from(fix.heading), 9);
                bits.put(u32::from(fix.ground_speed), 10);
            }
            Self::E(event) => {
                bits.put(tag::E, 3);
                bits.put(event.time, 20);
                bits.put(u32::from(event.kind.raw()), 3);
                let mut body = bits.into_bytes();
                body.truncate(FixE::TEXT_OFFSET);
                body.extend(event.text.iter().take(FixE::TEXT_SIZE));
                return seal(body);
            }
        }
        seal(bits.into_bytes())
    }
}

/// Expand a `B2` record into two full fixes.
///
/// The first fix is relative to `full`, the second to the first.
#[must_use]
pub fn split_b2(full: &FixB, deltas: &[FixDelta; 2]) -> (FixB, FixB) {
    let apply = |base: &FixB, delta: &FixDelta| FixB {
        time: base.time + delta.time + 1,
        validity: full.validity,
        accuracy: base.accuracy + delta.accuracy,
        latitude: base.latitude.add_milli_minutes(i64::from(delta.latitude)),
        longitude: base.longitude.add_milli_minutes(i64::from(delta.longitude)),
        pressure_altitude: base.pressure_altitude + delta.pressure_altitude,
        gps_altitude: base.gps_altitude + delta.gps_altitude,
        enl: delta.enl,
    };
    let first = apply(full, &deltas[0]);
    let second = apply(&first, &deltas[1]);
    (first, second)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn full_fix() -> FixB {
        FixB {
            time: 12 * 3600,
            validity: 1,
            accuracy: 12,
            latitude: Angle::from_degrees(50.0),
            longitude: Angle::from_degrees(8.0),
            pressure_altitude: 450,
            gps_altitude: 480,
            enl: 20,
        }
    }

    #[test]
    fn test_b_record_fields() {
        let record = FixRecord::B(full_fix()).encode();
        assert!(checksum_ok(&record));
        // tag in the three low bits of the first byte
        assert_eq!(record[0] & 0x07, 1);
        assert_eq!(FixRecord::decode(&record), Some(FixRecord::B(full_fix())));
    }

    #[test]
    fn test_negative_altitude_survives() {
        let fix = FixB {
            pressure_altitude: -120,
            gps_altitude: -5,
            ..full_fix()
        };
        let record = FixRecord::B(fix).encode();
        assert_eq!(FixRecord::decode(&record), Some(FixRecord::B(fix)));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut record = FixRecord::B(full_fix()).encode();
        record[5] ^= 0x10;
        assert!(!checksum_ok(&record));
        assert!(!checksum_ok(&record[..8]));
    }

    #[test]
    fn test_unknown_tag() {
        let mut body = vec![0u8; BODY_SIZE];
        body[0] = 0x07;
        let record = seal(body);
        assert!(checksum_ok(&record));
        assert_eq!(FixRecord::decode(&record), None);
    }

    #[test]
    fn test_b2_deltas_signed() {
        let deltas = [
            FixDelta {
                time: 0,
                latitude: -250,
                longitude: 8000,
                pressure_altitude: -3,
                gps_altitude: 4,
                accuracy: -2,
                enl: 16,
            },
            FixDelta {
                time: 3,
                latitude: 100,
                longitude: -8191,
                pressure_altitude: 127,
                gps_altitude: -128,
                accuracy: 15,
                enl: 248,
            },
        ];
        let record = FixRecord::B2(deltas).encode();
        assert_eq!(FixRecord::decode(&record), Some(FixRecord::B2(deltas)));
    }

    #[test]
    fn test_split_b2_chains_fixes() {
        let full = full_fix();
        let deltas = [
            FixDelta {
                time: 0,
                latitude: 10,
                longitude: -20,
                pressure_altitude: 2,
                gps_altitude: 3,
                accuracy: 1,
                enl: 8,
            },
            FixDelta {
                time: 1,
                latitude: 10,
                longitude: -20,
                pressure_altitude: -1,
                gps_altitude: -1,
                accuracy: -2,
                enl: 16,
            },
        ];
        let (first, second) = split_b2(&full, &deltas);

        assert_eq!(first.time, full.time + 1);
        assert_eq!(first.latitude.milli_minutes, 10);
        assert_eq!(first.longitude.total_milli_minutes(), 8 * 60_000 - 20);
        assert_eq!(first.pressure_altitude, 452);
        assert_eq!(first.accuracy, 13);
        assert_eq!(first.enl, 8);

        assert_eq!(second.time, full.time + 3);
        assert_eq!(second.latitude.milli_minutes, 20);
        assert_eq!(second.gps_altitude, 482);
        assert_eq!(second.accuracy, 11);
        assert_eq!(second.validity, full.validity);
    }

    #[test]
    fn test_k_and_e_records() {
        let k = FixRecord::K(FixK {
            time: 3600,
            heading: 359,
            ground_speed: 180,
        });
        assert_eq!(FixRecord::decode(&k.encode()), Some(k));

        let mut text = b"PEV".to_vec();
        text.resize(FixE::TEXT_SIZE, 0);
        let e = FixRecord::E(FixE {
            time: 7200,
            kind: EventKind::PilotEvent,
            text,
        });
        let encoded = e.encode();
        assert_eq!(&encoded[4..7], b"PEV");
        assert_eq!(FixRecord::decode(&encoded), Some(e));
    }
}
