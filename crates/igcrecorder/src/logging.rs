//! Logging configuration for igcrecorder.
//!
//! Drivers and the logger emit `tracing` events with structured fields; the
//! binary installs a `tracing-subscriber` formatter once at startup.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Targets covered by the default filter: the library and the binary.
const TARGETS: [&str; 2] = ["igcrecorder", "igcrec"];

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above), including protocol exchanges.
    Verbose,
    /// Very verbose output (trace level), including raw frames.
    Trace,
}

impl Verbosity {
    /// Map `-q` and the number of `-v` flags to a verbosity. Quiet wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Trace,
        }
    }

    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    #[must_use]
    pub fn directive(&self) -> String {
        let level = self.to_level_filter();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// # Examples
///
/// ```no_run
/// use igcrecorder::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // A subscriber may already be installed, e.g. by a test harness
    let _ = subscriber.try_init();
}
