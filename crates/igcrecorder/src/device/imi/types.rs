//! Fixed binary layouts exchanged with IMI recorders.
//!
//! All structures are packed little-endian. Positions use a 25-bit angle
//! format (16 bits of milli-minutes, 8 bits of degrees, a sign bit), and
//! timestamps count seconds since 2000-01-01 00:00:00 UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::declaration::{Declaration, TurnPoint, TurnPointRole, ZoneShape};
use crate::device::bits::{BitReader, BitWriter, ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::geo::GeoPoint;

/// Unix timestamp of the recorder's time base.
const EPOCH_UNIX: i64 = 946_684_800;

/// Convert recorder seconds to a UTC date-time.
#[must_use]
pub fn to_datetime(seconds: u32) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(EPOCH_UNIX + i64::from(seconds), 0).map(|t| t.naive_utc())
}

/// Convert a UTC date-time to recorder seconds, if representable.
#[must_use]
pub fn from_datetime(time: NaiveDateTime) -> Option<u32> {
    u32::try_from(time.and_utc().timestamp() - EPOCH_UNIX).ok()
}

/// Sensor bit set when the recorder has no engine noise level sensor.
pub const NO_ENL_MASK: u8 = 0x80;

/// A 25-bit packed angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Angle {
    /// Whole degrees.
    pub degrees: u32,
    /// Milli-minutes, `0..60000`.
    pub milli_minutes: u32,
    /// South or west.
    pub negative: bool,
}

impl Angle {
    const MILLI_MINUTES_PER_DEGREE: i64 = 60_000;

    /// Pack an angle given in decimal degrees, truncating to milli-minutes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_degrees(value: f64) -> Self {
        let magnitude = value.abs();
        let degrees = magnitude.trunc();
        Self {
            degrees: degrees as u32,
            milli_minutes: ((magnitude - degrees) * 60_000.0) as u32,
            negative: value < 0.0,
        }
    }

    /// Signed total in milli-minutes.
    #[must_use]
    pub fn total_milli_minutes(self) -> i64 {
        let total = i64::from(self.degrees) * Self::MILLI_MINUTES_PER_DEGREE
            + i64::from(self.milli_minutes);
        if self.negative {
            -total
        } else {
            total
        }
    }

    /// Build from a signed milli-minute total.
    #[must_use]
    pub fn from_milli_minutes(total: i64) -> Self {
        let magnitude = total.unsigned_abs();
        let per_degree = Self::MILLI_MINUTES_PER_DEGREE.unsigned_abs();
        Self {
            degrees: u32::try_from(magnitude / per_degree).unwrap_or(u32::MAX),
            milli_minutes: u32::try_from(magnitude % per_degree).unwrap_or(0),
            negative: total < 0,
        }
    }

    /// Shift by a signed number of milli-minutes.
    #[must_use]
    pub fn add_milli_minutes(self, delta: i64) -> Self {
        Self::from_milli_minutes(self.total_milli_minutes() + delta)
    }

    /// The angle in decimal degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_degrees(self) -> f64 {
        self.total_milli_minutes() as f64 / 60_000.0
    }

    /// Raw 25-bit field value.
    #[must_use]
    pub fn pack(self) -> u32 {
        (self.milli_minutes & 0xFFFF)
            | ((self.degrees & 0xFF) << 16)
            | (u32::from(self.negative) << 24)
    }

    /// Decode a raw field value; bits above 25 are ignored.
    #[must_use]
    pub fn unpack(value: u32) -> Self {
        Self {
            milli_minutes: value & 0xFFFF,
            degrees: (value >> 16) & 0xFF,
            negative: (value >> 24) & 1 != 0,
        }
    }
}

/// Observation zone of one declared waypoint, 12 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObservationZone {
    /// Orientation: 2 symmetric, 3 towards next, 4 towards previous.
    pub style: u8,
    /// First angle in tenths of a degree, `0..=1800`.
    pub a1: u16,
    /// First radius in metres.
    pub r1: u32,
    /// Reduce the leg distance by the radius.
    pub reduce: bool,
    /// Unused by current firmware.
    pub moved: bool,
    /// Line instead of sector or cylinder.
    pub line_only: bool,
    /// Second angle in tenths of a degree.
    pub a2: u16,
    /// Second radius in metres.
    pub r2: u32,
    /// Fixed orientation in tenths of a degree, used with style 1.
    pub a12: u16,
    /// Maximum altitude in metres, 0 to ignore.
    pub max_altitude: u16,
}

impl ObservationZone {
    /// Encoded size.
    pub const SIZE: usize = 12;

    /// Largest radius the recorder accepts.
    pub const MAX_RADIUS: u32 = 250_000;

    /// Start zone style.
    pub const STYLE_START: u8 = 3;
    /// Turn point zone style.
    pub const STYLE_TURN_POINT: u8 = 2;
    /// Finish zone style.
    pub const STYLE_FINISH: u8 = 4;

    /// Zone for a declared turn point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] for a line at an intermediate
    /// turn point.
    pub fn for_turn_point(turn_point: &TurnPoint, role: TurnPointRole) -> Result<Self> {
        let style = match role {
            TurnPointRole::Start => Self::STYLE_START,
            TurnPointRole::Intermediate => Self::STYLE_TURN_POINT,
            TurnPointRole::Finish => Self::STYLE_FINISH,
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let radius = (turn_point.radius.round() as u32).min(Self::MAX_RADIUS);

        let mut zone = Self {
            style,
            r1: radius,
            ..Self::default()
        };
        match turn_point.shape {
            ZoneShape::Cylinder => zone.a1 = 1800,
            ZoneShape::Sector => zone.a1 = 450,
            ZoneShape::DaecKeyhole => {
                zone.a1 = 450;
                zone.a2 = 1800;
                zone.r2 = 500;
            }
            ZoneShape::Line if role == TurnPointRole::Intermediate => {
                return Err(Error::invalid_declaration(format!(
                    "turn point '{}' cannot use a line zone",
                    turn_point.name()
                )));
            }
            ZoneShape::Line => zone.line_only = true,
        }
        Ok(zone)
    }

    /// Pack into three 32-bit words.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut bits = BitWriter::new(Self::SIZE);
        bits.put(u32::from(self.style), 3);
        bits.put(u32::from(self.a1), 11);
        bits.put(self.r1, 18);
        bits.put_flag(self.reduce);
        bits.put_flag(self.moved);
        bits.put_flag(self.line_only);
        bits.put(u32::from(self.a2), 11);
        bits.put(self.r2, 18);
        bits.put(u32::from(self.a12), 12);
        bits.put(u32::from(self.max_altitude), 14);

        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&bits.into_bytes());
        out
    }

    /// Unpack from three 32-bit words.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(data: &[u8]) -> Self {
        let mut bits = BitReader::new(data);
        Self {
            style: bits.take(3) as u8,
            a1: bits.take(11) as u16,
            r1: bits.take(18),
            reduce: bits.take_flag(),
            moved: bits.take_flag(),
            line_only: bits.take_flag(),
            a2: bits.take(11) as u16,
            r2: bits.take(18),
            a12: bits.take(12) as u16,
            max_altitude: bits.take(14) as u16,
        }
    }
}

/// One of the fifteen waypoint slots, 32 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImiWaypoint {
    /// Longitude.
    pub longitude: Angle,
    /// Latitude.
    pub latitude: Angle,
    /// Name, at most [`ImiWaypoint::NAME_LENGTH`] bytes.
    pub name: String,
    /// Observation zone; all zero for take-off and landing.
    pub zone: ObservationZone,
}

impl ImiWaypoint {
    /// Encoded size.
    pub const SIZE: usize = 32;

    /// Width of the name field.
    pub const NAME_LENGTH: usize = 12;

    /// Slot for a point without observation zone.
    #[must_use]
    pub fn at(name: &str, location: GeoPoint) -> Self {
        Self {
            longitude: Angle::from_degrees(location.longitude),
            latitude: Angle::from_degrees(location.latitude),
            name: name.to_string(),
            zone: ObservationZone::default(),
        }
    }

    /// Check if the slot is unused.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.latitude.pack() == 0 && self.longitude.pack() == 0
    }

    /// Latitude and longitude in decimal degrees.
    #[must_use]
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude.to_degrees(), self.longitude.to_degrees())
    }

    fn write(&self, out: &mut ByteWriter) {
        out.u32(self.longitude.pack())
            .u32(self.latitude.pack())
            .text(&self.name, Self::NAME_LENGTH)
            .bytes(&self.zone.encode());
    }

    fn read(data: &[u8]) -> Self {
        let mut reader = ByteReader::new(data);
        let longitude = Angle::unpack(reader.u32());
        let latitude = Angle::unpack(reader.u32());
        let name = reader.text(Self::NAME_LENGTH);
        let zone = ObservationZone::decode(reader.bytes(ObservationZone::SIZE));
        Self {
            longitude,
            latitude,
            name,
            zone,
        }
    }
}

/// A calendar date as the recorder stores it: zero-based day and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImiDate {
    /// Day of month minus one.
    pub day: u8,
    /// Month minus one.
    pub month: u8,
    /// Full year, 0 when unset.
    pub year: u16,
}

impl ImiDate {
    /// Encode a calendar date.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            day: (date.day0()) as u8,
            month: (date.month0()) as u8,
            year: u16::try_from(date.year()).unwrap_or(0),
        }
    }

    /// `DDMMYY`, or `None` if unset.
    #[must_use]
    pub fn format(&self) -> Option<String> {
        if self.year == 0 {
            return None;
        }
        Some(format!(
            "{:02}{:02}{:02}",
            u32::from(self.day) + 1,
            u32::from(self.month) + 1,
            self.year % 100
        ))
    }

    /// Calendar date, or `None` if unset or out of range.
    #[must_use]
    pub fn to_date(&self) -> Option<NaiveDate> {
        if self.year == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month) + 1,
            u32::from(self.day) + 1,
        )
    }

    fn write(&self, out: &mut ByteWriter) {
        out.u8(self.day).u8(self.month).u16(self.year);
    }

    fn read(reader: &mut ByteReader<'_>) -> Self {
        Self {
            day: reader.u8(),
            month: reader.u8(),
            year: reader.u16(),
        }
    }
}

/// Flight metadata heading every stored flight and every declaration,
/// 256 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct DeclarationHeader {
    pub id: u8,
    pub device: u8,
    pub serial: u16,
    pub flight_number: u32,
    pub hw_version: u8,
    pub sw_version: u8,
    pub gps: u8,
    pub sensor: u8,
    /// Declaration time, recorder seconds.
    pub date: u32,
    pub pilot: String,
    pub pilot_birth: ImiDate,
    pub copilot: String,
    pub copilot_birth: ImiDate,
    pub glider_type: String,
    pub glider_id: String,
    pub competition_id: String,
    pub competition_class: String,
    pub club: String,
    pub site: String,
    pub task_name: String,
    pub task_number: u16,
    pub task_date: ImiDate,
    /// Recording start, recorder seconds.
    pub recording_start: u32,
    pub flight_of_day: u16,
    /// Take-off time, recorder seconds.
    pub flight_start: u32,
}

impl DeclarationHeader {
    /// Encoded size.
    pub const SIZE: usize = 256;

    const PILOT_LENGTH: usize = 30;
    const COPILOT_LENGTH: usize = 30;
    const GLIDER_TYPE_LENGTH: usize = 20;
    const GLIDER_ID_LENGTH: usize = 12;
    const COMPETITION_ID_LENGTH: usize = 4;
    const CLASS_LENGTH: usize = 20;
    const CLUB_LENGTH: usize = 20;
    const SITE_LENGTH: usize = 20;
    const TASK_NAME_LENGTH: usize = 30;

    /// Check if the recorder lacks an ENL sensor.
    #[must_use]
    pub fn has_enl(&self) -> bool {
        self.sensor & NO_ENL_MASK == 0
    }

    fn write(&self, out: &mut ByteWriter) {
        out.u8(self.id)
            .u8(self.device)
            .u16(self.serial)
            .u32(self.flight_number)
            .u8(self.hw_version)
            .u8(self.sw_version)
            .u8(self.gps)
            .u8(self.sensor)
            .u32(self.date)
            .text(&self.pilot, Self::PILOT_LENGTH);
        self.pilot_birth.write(out);
        out.text(&self.copilot, Self::COPILOT_LENGTH);
        self.copilot_birth.write(out);
        out.text(&self.glider_type, Self::GLIDER_TYPE_LENGTH)
            .text(&self.glider_id, Self::GLIDER_ID_LENGTH)
            .text(&self.competition_id, Self::COMPETITION_ID_LENGTH)
            .text(&self.competition_class, Self::CLASS_LENGTH)
            .text(&self.club, Self::CLUB_LENGTH)
            .text(&self.site, Self::SITE_LENGTH)
            .text(&self.task_name, Self::TASK_NAME_LENGTH)
            .u16(self.task_number);
        self.task_date.write(out);
        out.u32(self.recording_start)
            .u16(self.flight_of_day)
            .zeros(2)
            .u32(self.flight_start)
            .zeros(28);
    }

    fn read(data: &[u8]) -> Self {
        let mut r = ByteReader::new(data);
        let id = r.u8();
        let device = r.u8();
        let serial = r.u16();
        let flight_number = r.u32();
        let hw_version = r.u8();
        let sw_version = r.u8();
        let gps = r.u8();
        let sensor = r.u8();
        let date = r.u32();
        let pilot = r.text(Self::PILOT_LENGTH);
        let pilot_birth = ImiDate::read(&mut r);
        let copilot = r.text(Self::COPILOT_LENGTH);
        let copilot_birth = ImiDate::read(&mut r);
        let glider_type = r.text(Self::GLIDER_TYPE_LENGTH);
        let glider_id = r.text(Self::GLIDER_ID_LENGTH);
        let competition_id = r.text(Self::COMPETITION_ID_LENGTH);
        let competition_class = r.text(Self::CLASS_LENGTH);
        let club = r.text(Self::CLUB_LENGTH);
        let site = r.text(Self::SITE_LENGTH);
        let task_name = r.text(Self::TASK_NAME_LENGTH);
        let task_number = r.u16();
        let task_date = ImiDate::read(&mut r);
        let recording_start = r.u32();
        let flight_of_day = r.u16();
        r.skip(2);
        let flight_start = r.u32();

        Self {
            id,
            device,
            serial,
            flight_number,
            hw_version,
            sw_version,
            gps,
            sensor,
            date,
            pilot,
            pilot_birth,
            copilot,
            copilot_birth,
            glider_type,
            glider_id,
            competition_id,
            competition_class,
            club,
            site,
            task_name,
            task_number,
            task_date,
            recording_start,
            flight_of_day,
            flight_start,
        }
    }
}

/// A complete declaration block, 768 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImiDeclaration {
    /// Flight metadata.
    pub header: DeclarationHeader,
    /// Take-off, task points, landing, then empty slots.
    pub waypoints: Vec<ImiWaypoint>,
}

impl ImiDeclaration {
    /// Encoded size.
    pub const SIZE: usize = 768;

    /// Number of waypoint slots.
    pub const MAX_WAYPOINTS: usize = 15;

    /// Turn points that fit between the take-off and landing slots.
    pub const MAX_TURN_POINTS: usize = Self::MAX_WAYPOINTS - 2;

    /// Task name stored with uploaded declarations.
    pub const TASK_NAME: &'static str = "IGCRECORDERTASK";

    const CRC_OFFSET: usize = Self::SIZE - 2;

    /// Build the block for a task declaration.
    ///
    /// The take-off slot repeats the first turn point and the landing slot
    /// the last one, neither with an observation zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] if the task does not fit or uses
    /// a zone the recorder cannot represent.
    pub fn from_declaration(declaration: &Declaration) -> Result<Self> {
        let (Some(first), Some(last)) = (
            declaration.turn_points.first(),
            declaration.turn_points.last(),
        ) else {
            return Err(Error::invalid_declaration("empty task"));
        };
        if declaration.len() > Self::MAX_TURN_POINTS {
            return Err(Error::invalid_declaration(format!(
                "at most {} turn points supported, got {}",
                Self::MAX_TURN_POINTS,
                declaration.len()
            )));
        }

        let header = DeclarationHeader {
            pilot: declaration.pilot_name.clone(),
            copilot: declaration.copilot_name.clone(),
            glider_type: declaration.aircraft_type.clone(),
            glider_id: declaration.aircraft_registration.clone(),
            competition_id: declaration.competition_id.clone(),
            task_name: Self::TASK_NAME.to_string(),
            ..DeclarationHeader::default()
        };

        let mut waypoints = Vec::with_capacity(Self::MAX_WAYPOINTS);
        waypoints.push(ImiWaypoint::at(first.name(), first.location()));
        for (index, tp) in declaration.turn_points.iter().enumerate() {
            let mut slot = ImiWaypoint::at(tp.name(), tp.location());
            slot.zone = ObservationZone::for_turn_point(tp, declaration.role(index))?;
            waypoints.push(slot);
        }
        waypoints.push(ImiWaypoint::at(last.name(), last.location()));

        Ok(Self { header, waypoints })
    }

    /// Number of task points, excluding the take-off and landing slots.
    #[must_use]
    pub fn turn_point_count(&self) -> usize {
        let used = self
            .waypoints
            .iter()
            .skip(1)
            .take_while(|wp| !wp.is_empty())
            .count();
        used.saturating_sub(1)
    }

    /// Serialise, appending the CRC16 of everything before it.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(Self::SIZE);
        self.header.write(&mut out);
        for index in 0..Self::MAX_WAYPOINTS {
            match self.waypoints.get(index) {
                Some(wp) => wp.write(&mut out),
                None => {
                    out.zeros(ImiWaypoint::SIZE);
                }
            }
        }
        out.zeros(Self::CRC_OFFSET - out.len());

        let mut data = out.into_bytes();
        let crc = crate::checksum::crc16(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        data
    }

    /// Parse a stored declaration. Empty trailing slots are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `data` is shorter than a declaration.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::protocol(format!(
                "declaration of {} bytes, expected {}",
                data.len(),
                Self::SIZE
            )));
        }
        let header = DeclarationHeader::read(&data[..DeclarationHeader::SIZE]);
        let mut waypoints: Vec<ImiWaypoint> = (0..Self::MAX_WAYPOINTS)
            .map(|i| {
                let start = DeclarationHeader::SIZE + i * ImiWaypoint::SIZE;
                ImiWaypoint::read(&data[start..start + ImiWaypoint::SIZE])
            })
            .collect();
        while waypoints.last().is_some_and(ImiWaypoint::is_empty) {
            waypoints.pop();
        }
        Ok(Self { header, waypoints })
    }
}

/// Device information block, 64 bytes on the wire (16 on old firmware).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct DeviceInfo {
    pub device: u8,
    pub tampered: u8,
    pub hw_version: u8,
    pub sw_version: u8,
    pub gps: u8,
    pub sensor: u8,
    pub flash: u8,
    pub eeprom: u8,
    pub flash_size: u32,
    pub eeprom_size: u32,
    pub sensor0_offset: i16,
    pub sensor8k_offset: i16,
    pub build_number: u16,
}

impl DeviceInfo {
    /// Encoded size.
    pub const SIZE: usize = 64;

    /// Serialise.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(Self::SIZE);
        out.u8(self.device)
            .u8(self.tampered)
            .u8(self.hw_version)
            .u8(self.sw_version)
            .u8(self.gps)
            .u8(self.sensor)
            .u8(self.flash)
            .u8(self.eeprom)
            .u32(self.flash_size)
            .u32(self.eeprom_size)
            .i16(self.sensor0_offset)
            .i16(self.sensor8k_offset)
            .u16(self.build_number);
        out.zeros(Self::SIZE - out.len());
        out.into_bytes()
    }

    /// Parse; missing trailing fields read as zero.
    #[must_use]
    pub fn decode(data: &[u8]) -> Self {
        let mut r = ByteReader::new(data);
        Self {
            device: r.u8(),
            tampered: r.u8(),
            hw_version: r.u8(),
            sw_version: r.u8(),
            gps: r.u8(),
            sensor: r.u8(),
            flash: r.u8(),
            eeprom: r.u8(),
            flash_size: r.u32(),
            eeprom_size: r.u32(),
            sensor0_offset: r.i16(),
            sensor8k_offset: r.i16(),
            build_number: r.u16(),
        }
    }
}

/// One entry of the recorder's flight list, 32 bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlightInfo {
    /// Flash address of the stored flight.
    pub address: u32,
    /// Number of 16-byte fix records.
    pub fixes: u32,
    /// Recording start, recorder seconds.
    pub start: u32,
    /// Recording end, recorder seconds.
    pub finish: u32,
    /// Flight of the day.
    pub flight_of_day: u16,
    /// Pilot name.
    pub pilot: String,
}

impl FlightInfo {
    /// Encoded size.
    pub const SIZE: usize = 32;

    const PILOT_LENGTH: usize = 12;

    /// Serialise.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(Self::SIZE);
        out.u32(self.address)
            .u32(self.fixes)
            .u32(self.start)
            .u32(self.finish)
            .u16(self.flight_of_day)
            .zeros(2)
            .text(&self.pilot, Self::PILOT_LENGTH);
        out.into_bytes()
    }

    /// Parse one entry.
    #[must_use]
    pub fn decode(data: &[u8]) -> Self {
        let mut r = ByteReader::new(data);
        let address = r.u32();
        let fixes = r.u32();
        let start = r.u32();
        let finish = r.u32();
        let flight_of_day = r.u16();
        r.skip(2);
        Self {
            address,
            fixes,
            start,
            finish,
            flight_of_day,
            pilot: r.text(Self::PILOT_LENGTH),
        }
    }

    /// Parse a page of entries; a trailing partial entry is ignored.
    #[must_use]
    pub fn decode_page(data: &[u8]) -> Vec<Self> {
        data.chunks_exact(Self::SIZE).map(Self::decode).collect()
    }
}

/// RSA signature stored after the fixes of a flight, 132 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Key size in bits: 512, 768 or 1024 when valid.
    pub rsa_bits: u16,
    /// The recorder detected tampering.
    pub tampered: bool,
    /// Signature bytes; only the first `rsa_bits / 8` are meaningful.
    pub data: Vec<u8>,
}

impl Signature {
    /// Encoded size.
    pub const SIZE: usize = 132;

    const DATA_SIZE: usize = 128;

    /// Serialise.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(Self::SIZE);
        out.u16(self.rsa_bits).u8(u8::from(self.tampered)).u8(0);
        let mut data = self.data.clone();
        data.resize(Self::DATA_SIZE, 0);
        out.bytes(&data);
        out.into_bytes()
    }

    /// Parse.
    #[must_use]
    pub fn decode(data: &[u8]) -> Self {
        let mut r = ByteReader::new(data);
        let rsa_bits = r.u16();
        let tampered = r.u8() != 0;
        r.skip(1);
        let mut bytes = r.bytes(Self::DATA_SIZE).to_vec();
        bytes.resize(Self::DATA_SIZE, 0);
        Self {
            rsa_bits,
            tampered,
            data: bytes,
        }
    }
}
