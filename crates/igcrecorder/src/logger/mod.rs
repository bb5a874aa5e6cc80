//! Flight logging.
//!
//! A [`Logger`] receives every GPS fix. Until logging starts it only keeps
//! the most recent ones in a [`RingBuffer`]; [`Logger::start`] opens a new
//! IGC file, writes the header and the armed declaration, and replays the
//! buffered fixes as `B` records. While active, records pass through a
//! [`DiskBuffer`]. [`Logger::stop`] flushes, closes and signs the file.
//!
//! All state sits behind one `RwLock`, so fixes may arrive on one thread
//! while another starts or stops logging.

pub mod disk_buffer;
pub mod ring;
pub mod space;

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::{Config, LoggerConfig, SigningConfig};
use crate::declaration::Declaration;
use crate::error::{Error, Result};
use crate::fix::GpsFix;
use crate::igc::filename::normalize_logger_id;
use crate::igc::format::{
    a_record, b_record, c_declaration_header, c_point, e_record, f_record, h_date, h_record,
    i_record, l_record, C_LANDING, C_TAKEOFF,
};
use crate::igc::grecord::append_signature;
use crate::igc::{FileNameCodec, GRecord, IgcWriter, VENDOR_CODE};

pub use disk_buffer::DiskBuffer;
pub use ring::RingBuffer;
pub use space::{FsSpaceProbe, SpaceProbe};

/// `B` record extensions written after the altitudes.
const B_EXTENSIONS: [(&str, usize); 2] = [("FXA", 3), ("SIU", 2)];

/// Where the logger is in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    /// Buffering fixes, no declaration.
    Idle,
    /// Buffering fixes with a declaration ready for the log.
    Armed,
    /// Writing a flight log.
    Active,
}

impl std::fmt::Display for LoggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// The open flight log.
#[derive(Debug)]
struct Session {
    path: PathBuf,
    writer: IgcWriter<File>,
    buffer: DiskBuffer,
    satellites: Vec<u8>,
    constellation_checked: Option<DateTime<Utc>>,
    simulated: bool,
}

impl Session {
    /// Queue a record, writing the buffer out once it is full.
    fn record(&mut self, line: String) -> Result<()> {
        if self.buffer.push(line) {
            self.buffer.flush_to(&mut self.writer)?;
        }
        Ok(())
    }

    /// `F` record for `fix` if its constellation changed and the last
    /// check is at least `interval_secs` old.
    fn constellation_update(&mut self, fix: &GpsFix, interval_secs: i64) -> Option<String> {
        let due = self
            .constellation_checked
            .map_or(true, |last| (fix.time - last).num_seconds() >= interval_secs);
        if !due {
            return None;
        }
        self.constellation_checked = Some(fix.time);
        if fix.satellites == self.satellites {
            return None;
        }
        self.satellites.clone_from(&fix.satellites);
        Some(f_record(fix.time.time(), &fix.satellites))
    }
}

#[derive(Debug)]
struct Inner {
    state: LoggerState,
    declaration: Option<Declaration>,
    ring: RingBuffer<GpsFix>,
    session: Option<Session>,
}

/// Writes GPS fixes to signed IGC flight logs.
#[derive(Debug)]
pub struct Logger {
    config: LoggerConfig,
    signing: SigningConfig,
    codec: FileNameCodec,
    probe: Box<dyn SpaceProbe>,
    inner: RwLock<Inner>,
}

impl Logger {
    /// Create an idle logger that checks free space on the file system.
    #[must_use]
    pub fn new(config: LoggerConfig, signing: SigningConfig) -> Self {
        let ring = RingBuffer::new(config.pre_takeoff_capacity);
        Self {
            config,
            signing,
            codec: FileNameCodec::new(),
            probe: Box::new(FsSpaceProbe),
            inner: RwLock::new(Inner {
                state: LoggerState::Idle,
                declaration: None,
                ring,
                session: None,
            }),
        }
    }

    /// Create an idle logger from the application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.logger.clone(), config.signing.clone())
    }

    /// Use `probe` for free space checks.
    #[must_use]
    pub fn with_space_probe(mut self, probe: impl SpaceProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    fn lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoggerState {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Number of fixes waiting in the pre-takeoff buffer.
    #[must_use]
    pub fn buffered_fixes(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ring
            .len()
    }

    /// Path of the log being written, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<PathBuf> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .as_ref()
            .map(|s| s.path.clone())
    }

    /// Keep `declaration` for the next flight log.
    ///
    /// # Errors
    ///
    /// Returns an error if a flight log is being written.
    pub fn arm(&self, declaration: Declaration) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == LoggerState::Active {
            return Err(Error::internal("cannot arm while a flight log is open"));
        }
        info!(turn_points = declaration.len(), "Logger armed");
        inner.declaration = Some(declaration);
        inner.state = LoggerState::Armed;
        Ok(())
    }

    /// Drop the armed declaration. Does nothing while active.
    pub fn disarm(&self) {
        let mut inner = self.lock();
        if inner.state == LoggerState::Armed {
            inner.declaration = None;
            inner.state = LoggerState::Idle;
            debug!("Logger disarmed");
        }
    }

    /// Feed one fix.
    ///
    /// Before logging starts the fix is buffered. While active it becomes a
    /// `B` record, preceded by an `F` record when the constellation changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn push_fix(&self, fix: &GpsFix) -> Result<()> {
        let interval = self.constellation_interval();
        let mut guard = self.lock();
        let Inner { ring, session, .. } = &mut *guard;
        let Some(session) = session.as_mut() else {
            ring.push(fix.clone());
            return Ok(());
        };

        session.simulated |= fix.simulated;
        if let Some(line) = session.constellation_update(fix, interval) {
            session.record(line)?;
        }
        session.record(fix_record(fix))
    }

    /// Add a comment record to the open log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn note(&self, text: &str) -> Result<()> {
        let mut inner = self.lock();
        match inner.session.as_mut() {
            Some(session) => session.record(l_record(VENDOR_CODE, text)),
            None => {
                debug!("No open flight log, note dropped");
                Ok(())
            }
        }
    }

    /// Add an event record with a three letter `code` to the open log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn event(&self, time: DateTime<Utc>, code: &str, text: &str) -> Result<()> {
        let mut inner = self.lock();
        match inner.session.as_mut() {
            Some(session) => session.record(e_record(time.time(), code, text)),
            None => {
                debug!(code, "No open flight log, event dropped");
                Ok(())
            }
        }
    }

    /// Open a new flight log.
    ///
    /// The log is dated by the oldest buffered fix, or by `now` if nothing
    /// is buffered. Starting while a log is open returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientStorage`] if not enough space can be
    /// freed, in which case nothing changes, or an error if the directory or
    /// file cannot be created or written.
    pub fn start(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let mut inner = self.lock();
        if let Some(session) = &inner.session {
            debug!(path = %session.path.display(), "Flight log already open");
            return Ok(session.path.clone());
        }

        let directory = self.config.log_directory();
        fs::create_dir_all(&directory).map_err(|source| Error::DirectoryCreate {
            path: directory.clone(),
            source,
        })?;

        let first_time = inner.ring.oldest().map_or(now, |fix| fix.time);
        let date = first_time.date_naive();
        let free_kb = space::reclaim_space(
            &directory,
            self.probe.as_ref(),
            self.config.min_free_kb,
            &self.codec,
            date.year(),
        )?;

        let path = self.fresh_path(&directory, date)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| Error::FileOpen {
                path: path.clone(),
                source,
            })?;
        let mut writer = if self.signing.enabled {
            IgcWriter::signed(file, GRecord::new(self.signing.ignore_comma))
        } else {
            IgcWriter::new(file)
        };

        writer.write_lines(self.header(date, inner.declaration.as_ref()))?;
        if let Some(declaration) = inner.declaration.as_ref().filter(|d| d.len() >= 2) {
            writer.write_lines(declaration_block(declaration, first_time))?;
        }

        let buffered = inner.ring.drain();
        let mut session = Session {
            path: path.clone(),
            writer,
            buffer: DiskBuffer::new(self.config.disk_buffer_lines),
            satellites: Vec::new(),
            constellation_checked: None,
            simulated: self.config.simulator || buffered.iter().any(|fix| fix.simulated),
        };
        if let Some(first) = buffered.first() {
            session.satellites.clone_from(&first.satellites);
            session.constellation_checked = Some(first.time);
            session
                .writer
                .write_line(&f_record(first.time.time(), &first.satellites))?;
        }
        session.writer.write_lines(buffered.iter().map(fix_record))?;
        session.writer.flush()?;

        info!(
            path = %path.display(),
            buffered = buffered.len(),
            free_kb,
            "Flight log started"
        );
        inner.session = Some(session);
        inner.state = LoggerState::Active;
        Ok(path)
    }

    /// Close the open flight log and sign it.
    ///
    /// Logs are not signed when signing is disabled or any fix came from a
    /// simulator. Returns the path of the closed log, or `None` if no log
    /// was open.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written or signed. The logger
    /// is idle afterwards either way.
    pub fn stop(&self) -> Result<Option<PathBuf>> {
        let mut inner = self.lock();
        let Some(mut session) = inner.session.take() else {
            return Ok(None);
        };
        inner.state = LoggerState::Idle;
        inner.declaration = None;
        drop(inner);

        if let Some(directory) = session.path.parent() {
            match self.probe.free_kb(directory) {
                Ok(free_kb) if free_kb < self.config.min_free_kb => warn!(
                    free_kb,
                    required_kb = self.config.min_free_kb,
                    "Low free space while closing flight log"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to check free space"),
            }
        }

        session.buffer.flush_to(&mut session.writer)?;
        let grecord = session.writer.grecord().cloned();
        let lines = session.writer.line_count();
        session.writer.into_inner()?.sync_all()?;

        match grecord {
            Some(grecord) if !session.simulated => {
                append_signature(&session.path, &grecord, false)?;
                info!(path = %session.path.display(), lines, "Flight log closed and signed");
            }
            _ => info!(
                path = %session.path.display(),
                lines,
                simulated = session.simulated,
                "Flight log closed without signature"
            ),
        }
        Ok(Some(session.path))
    }

    fn constellation_interval(&self) -> i64 {
        i64::try_from(self.config.f_record_interval_secs).unwrap_or(i64::MAX)
    }

    /// First unused file name for `date`.
    fn fresh_path(&self, directory: &Path, date: NaiveDate) -> Result<PathBuf> {
        let short = self.config.short_file_names;
        for sequence in 1..=FileNameCodec::max_sequence(short) {
            let Some(name) = self
                .codec
                .name(date, &self.config.logger_id, sequence, short)
            else {
                break;
            };
            let path = directory.join(name);
            if !path.exists() {
                return Ok(path);
            }
        }
        Err(Error::internal(format!(
            "no unused flight log name left for {date}"
        )))
    }

    fn header(&self, date: NaiveDate, declaration: Option<&Declaration>) -> Vec<String> {
        let text = |f: fn(&Declaration) -> &str| declaration.map_or("", f);
        vec![
            a_record(VENDOR_CODE, &normalize_logger_id(&self.config.logger_id)),
            h_date(date),
            h_record("PLT", "PILOT", text(|d| d.pilot_name.as_str())),
            h_record("CM2", "CREW2", text(|d| d.copilot_name.as_str())),
            h_record("GTY", "GLIDERTYPE", text(|d| d.aircraft_type.as_str())),
            h_record("GID", "GLIDERID", text(|d| d.aircraft_registration.as_str())),
            h_record("CID", "COMPETITIONID", text(|d| d.competition_id.as_str())),
            h_record("DTM", "GPSDATUM", "WGS84"),
            h_record("FTY", "FRTYPE", "IGCRECORDER"),
            h_record("RFW", "FIRMWAREVERSION", env!("CARGO_PKG_VERSION")),
            h_record("GPS", "RECEIVER", &self.config.gps_receiver),
            i_record(&B_EXTENSIONS),
        ]
    }
}

/// `C` records for a declaration made at `declared`.
fn declaration_block(declaration: &Declaration, declared: DateTime<Utc>) -> Vec<String> {
    let mut lines = Vec::with_capacity(declaration.len() + 3);
    lines.push(c_declaration_header(
        declared.naive_utc(),
        None,
        0,
        declaration.len(),
        "",
    ));
    lines.push(C_TAKEOFF.to_string());
    for turn_point in &declaration.turn_points {
        lines.push(c_point(turn_point.location(), turn_point.name()));
    }
    lines.push(C_LANDING.to_string());
    lines
}

/// `B` record with fix accuracy and satellite count.
fn fix_record(fix: &GpsFix) -> String {
    let mut line = b_record(
        fix.time.time(),
        fix.location,
        !fix.nav_warning,
        fix.baro_or_gps_altitude(),
        fix.gps_altitude,
    );
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let accuracy = fix
        .position_error
        .map_or(0, |e| e.round().clamp(0.0, 999.0) as u32);
    let _ = write!(line, "{accuracy:03}{:02}", fix.satellites.len().min(99));
    line
}
