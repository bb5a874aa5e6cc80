//! Configuration management for igcrecorder.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "igcrecorder";

/// Default flight log directory, below the data directory.
const LOG_DIR_NAME: &str = "logs";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `IGCRECORDER_`)
/// 2. TOML config file at `~/.config/igcrecorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Flight logging configuration.
    pub logger: LoggerConfig,
    /// G record configuration.
    pub signing: SigningConfig,
    /// Recorder driver configuration.
    pub device: DeviceConfig,
}

/// Flight logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory flight logs are written to.
    /// Defaults to `~/.local/share/igcrecorder/logs`
    pub directory: Option<PathBuf>,
    /// Three character logger id used in the `A` record and file names.
    pub logger_id: String,
    /// Use the `YMDVAAAF.IGC` short file name layout.
    pub short_file_names: bool,
    /// Number of fixes kept before logging starts.
    pub pre_takeoff_capacity: usize,
    /// Number of records buffered before they are written to disk.
    pub disk_buffer_lines: usize,
    /// Minimum free space in kB required to start a flight log.
    pub min_free_kb: u64,
    /// Minimum interval between satellite constellation checks in seconds.
    pub f_record_interval_secs: u64,
    /// Fixes come from a simulator; logs are not signed.
    pub simulator: bool,
    /// Description of the GPS receiver for the header.
    pub gps_receiver: String,
}

/// G record configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Sign flight logs when they are closed.
    pub enabled: bool,
    /// Leave commas out of the digest, for logs of the one historical
    /// release that did so.
    pub ignore_comma: bool,
}

/// Recorder driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Attempts per IMI message exchange.
    pub imi_retries: u32,
    /// Handshake attempts for the EW recorder.
    pub ew_connect_attempts: u32,
    /// Time in milliseconds the EW microRecorder gets to send its user data.
    pub micro_connect_window_ms: u64,
    /// Time in milliseconds the LX Nano gets to answer one row.
    pub nano_timeout_ms: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            directory: None, // Will be resolved to default at runtime
            logger_id: "AAA".to_string(),
            short_file_names: false,
            pre_takeoff_capacity: 60,
            disk_buffer_lines: 10,
            min_free_kb: 750,
            f_record_interval_secs: 270,
            simulator: false,
            gps_receiver: "Unknown".to_string(),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore_comma: false,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            imi_retries: 4,
            ew_connect_attempts: 10,
            micro_connect_window_ms: 8_000,
            nano_timeout_ms: 2_000,
        }
    }
}

impl LoggerConfig {
    /// Get the log directory, resolving defaults if not set.
    #[must_use]
    pub fn log_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| Config::default_data_dir().join(LOG_DIR_NAME))
    }

    /// Get the constellation check interval as a Duration.
    #[must_use]
    pub fn f_record_interval(&self) -> Duration {
        Duration::from_secs(self.f_record_interval_secs)
    }
}

impl DeviceConfig {
    /// Get the microRecorder connect window as a Duration.
    #[must_use]
    pub fn micro_connect_window(&self) -> Duration {
        Duration::from_millis(self.micro_connect_window_ms)
    }

    /// Get the Nano row timeout as a Duration.
    #[must_use]
    pub fn nano_timeout(&self) -> Duration {
        Duration::from_millis(self.nano_timeout_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `IGCRECORDER_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("IGCRECORDER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let id = &self.logger.logger_id;
        if id.len() != 3 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::ConfigValidation {
                message: format!("logger_id must be 3 alphanumeric characters, got {id:?}"),
            });
        }

        let positive = [
            ("pre_takeoff_capacity", self.logger.pre_takeoff_capacity as u64),
            ("disk_buffer_lines", self.logger.disk_buffer_lines as u64),
            ("f_record_interval_secs", self.logger.f_record_interval_secs),
            ("imi_retries", u64::from(self.device.imi_retries)),
            ("ew_connect_attempts", u64::from(self.device.ew_connect_attempts)),
            ("micro_connect_window_ms", self.device.micro_connect_window_ms),
            ("nano_timeout_ms", self.device.nano_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.logger.logger_id, "AAA");
        assert!(!config.logger.short_file_names);
        assert!(!config.logger.simulator);
        assert!(config.signing.enabled);
        assert!(!config.signing.ignore_comma);
    }

    #[test]
    fn test_default_logger_config() {
        let logger = LoggerConfig::default();

        assert!(logger.directory.is_none());
        assert_eq!(logger.pre_takeoff_capacity, 60);
        assert_eq!(logger.disk_buffer_lines, 10);
        assert_eq!(logger.min_free_kb, 750);
        assert_eq!(logger.f_record_interval(), Duration::from_secs(270));
    }

    #[test]
    fn test_default_device_config() {
        let device = DeviceConfig::default();

        assert_eq!(device.imi_retries, 4);
        assert_eq!(device.ew_connect_attempts, 10);
        assert_eq!(device.micro_connect_window(), Duration::from_secs(8));
        assert_eq!(device.nano_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_log_directory_default_and_override() {
        let mut logger = LoggerConfig::default();
        assert!(logger.log_directory().ends_with("igcrecorder/logs"));

        logger.directory = Some(PathBuf::from("/tmp/flights"));
        assert_eq!(logger.log_directory(), PathBuf::from("/tmp/flights"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_logger_id() {
        for id in ["AB", "ABCD", "A-C"] {
            let mut config = Config::default();
            config.logger.logger_id = id.to_string();

            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("logger_id"), "{id}: {err}");
        }
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.logger.disk_buffer_lines = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("disk_buffer_lines"));

        let mut config = Config::default();
        config.device.nano_timeout_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("nano_timeout_ms"));
    }

    #[test]
    fn test_zero_min_free_is_allowed() {
        let mut config = Config::default();
        config.logger.min_free_kb = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let path = std::env::temp_dir().join(format!(
            "igcrecorder-config-missing-{}.toml",
            std::process::id()
        ));
        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.logger.logger_id, "AAA");
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "igcrecorder-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[logger]\nlogger_id = \"XYZ\"\nshort_file_names = true\n\n[signing]\nignore_comma = true\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.logger.logger_id, "XYZ");
        assert!(config.logger.short_file_names);
        assert!(config.signing.ignore_comma);
        assert_eq!(config.logger.min_free_kb, 750);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "igcrecorder-config-invalid-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[logger]\nlogger_id = \"TOO LONG\"\n").unwrap();

        let result = Config::load_from(Some(path.clone()));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
