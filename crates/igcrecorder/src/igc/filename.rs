//! Flight log file names.
//!
//! Two layouts are written and recognised:
//!
//! - long: `YYYY-MM-DD-VVV-AAA-NN.IGC`, where `VVV` is the manufacturer
//!   code, `AAA` the logger id and `NN` the flight of the day (01-99);
//! - short: `YMDVAAAF.IGC`, where year, month, day and flight number are
//!   single IGC digits (`1`-`9`, then `A`-`Z`), the year cycling every ten
//!   years and `V` being the first letter of the manufacturer code.
//!
//! Parsing a name back yields a [`LogFileName`], whose ordering tells which
//! of two logs is older when space has to be reclaimed.

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};

use super::VENDOR_CODE;

/// Highest flight-of-day number in a long file name.
pub const MAX_LONG_SEQUENCE: u32 = 99;

/// Highest flight-of-day number a single IGC digit can hold.
pub const MAX_SHORT_SEQUENCE: u32 = 35;

/// Date and flight-of-day parsed from a log file name.
///
/// Orders by date first, then by sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogFileName {
    /// Day the flight was recorded.
    pub date: NaiveDate,
    /// Flight of the day, starting at 1.
    pub sequence: u32,
}

/// Convert 1..=35 to an IGC digit (`1`-`9`, then `A`-`Z`); zero maps to `0`.
#[must_use]
pub fn num_to_igc_char(num: u32) -> Option<char> {
    match num {
        0..=9 => char::from_digit(num, 10),
        10..=35 => char::from_u32(u32::from(b'A') + num - 10),
        _ => None,
    }
}

/// Inverse of [`num_to_igc_char`], case-insensitive.
#[must_use]
pub fn igc_char_to_num(c: char) -> Option<u32> {
    match c.to_ascii_uppercase() {
        d @ '0'..='9' => d.to_digit(10),
        l @ 'A'..='Z' => Some(u32::from(l) - u32::from('A') + 10),
        _ => None,
    }
}

/// Force a logger id into exactly three upper-case alphanumeric characters.
///
/// Other characters are replaced by `A`, as is any missing position.
#[must_use]
pub fn normalize_logger_id(id: &str) -> String {
    let mut chars = id.chars();
    (0..3)
        .map(|_| match chars.next() {
            Some(c) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
            _ => 'A',
        })
        .collect()
}

/// Builds and parses log file names.
#[derive(Debug)]
pub struct FileNameCodec {
    long: Regex,
    short: Regex,
}

impl Default for FileNameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FileNameCodec {
    /// Create a codec.
    ///
    /// # Panics
    ///
    /// Panics if the built-in patterns fail to compile.
    #[must_use]
    pub fn new() -> Self {
        Self {
            long: Regex::new(
                r"(?i)^(\d{4})-(\d{2})-(\d{2})-[A-Z0-9]{3}-[A-Z0-9]{3}-(\d{2})\.igc$",
            )
            .expect("Invalid long file name pattern"),
            short: Regex::new(r"(?i)^([0-9])([1-9A-C])([1-9A-V])[A-Z0-9]{4}([1-9A-Z])\.igc$")
                .expect("Invalid short file name pattern"),
        }
    }

    /// Long name for the given flight, or `None` if `sequence` is out of
    /// range.
    #[must_use]
    pub fn long_name(&self, date: NaiveDate, logger_id: &str, sequence: u32) -> Option<String> {
        if !(1..=MAX_LONG_SEQUENCE).contains(&sequence) {
            return None;
        }
        Some(format!(
            "{:04}-{:02}-{:02}-{VENDOR_CODE}-{}-{sequence:02}.IGC",
            date.year(),
            date.month(),
            date.day(),
            normalize_logger_id(logger_id)
        ))
    }

    /// Short name for the given flight, or `None` if `sequence` is out of
    /// range.
    #[must_use]
    pub fn short_name(&self, date: NaiveDate, logger_id: &str, sequence: u32) -> Option<String> {
        if !(1..=MAX_SHORT_SEQUENCE).contains(&sequence) {
            return None;
        }
        let year = u32::try_from(date.year().rem_euclid(10)).ok()?;
        Some(format!(
            "{}{}{}{}{}{}.IGC",
            num_to_igc_char(year)?,
            num_to_igc_char(date.month())?,
            num_to_igc_char(date.day())?,
            &VENDOR_CODE[..1],
            normalize_logger_id(logger_id),
            num_to_igc_char(sequence)?
        ))
    }

    /// Name in the requested layout.
    #[must_use]
    pub fn name(
        &self,
        date: NaiveDate,
        logger_id: &str,
        sequence: u32,
        short: bool,
    ) -> Option<String> {
        if short {
            self.short_name(date, logger_id, sequence)
        } else {
            self.long_name(date, logger_id, sequence)
        }
    }

    /// Highest sequence number the layout supports.
    #[must_use]
    pub fn max_sequence(short: bool) -> u32 {
        if short {
            MAX_SHORT_SEQUENCE
        } else {
            MAX_LONG_SEQUENCE
        }
    }

    /// Parse a file name (without directory).
    ///
    /// Short names only carry the last digit of the year; it is resolved to
    /// the latest year not after `reference_year`.
    #[must_use]
    pub fn parse(&self, name: &str, reference_year: i32) -> Option<LogFileName> {
        if let Some(caps) = self.long.captures(name) {
            return Self::parse_long(&caps);
        }
        let caps = self.short.captures(name)?;
        Self::parse_short(&caps, reference_year)
    }

    fn parse_long(caps: &Captures<'_>) -> Option<LogFileName> {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        let sequence = caps[4].parse().ok()?;
        Some(LogFileName {
            date: NaiveDate::from_ymd_opt(year, month, day)?,
            sequence,
        })
    }

    fn parse_short(caps: &Captures<'_>, reference_year: i32) -> Option<LogFileName> {
        let digit = |i: usize| caps[i].chars().next().and_then(igc_char_to_num);

        let last_digit = i32::try_from(digit(1)?).ok()?;
        let decade = reference_year - reference_year.rem_euclid(10);
        let mut year = decade + last_digit;
        if year > reference_year {
            year -= 10;
        }

        Some(LogFileName {
            date: NaiveDate::from_ymd_opt(year, digit(2)?, digit(3)?)?,
            sequence: digit(4)?,
        })
    }
}
