//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use crate::igc::RecordType;

/// Signature check arguments.
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// IGC file to check
    pub file: PathBuf,

    /// Leave commas out of the digest (overrides the configuration)
    #[arg(long)]
    pub ignore_comma: bool,
}

/// Signing arguments.
#[derive(Debug, Args)]
pub struct SignCommand {
    /// Unsigned IGC file to sign in place
    pub file: PathBuf,

    /// Leave commas out of the digest (overrides the configuration)
    #[arg(long)]
    pub ignore_comma: bool,
}

/// Record summary arguments.
#[derive(Debug, Args)]
pub struct RecordsCommand {
    /// IGC file to summarise
    pub file: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Number of records of each type in an IGC file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    /// Total number of non-empty lines.
    pub lines: usize,
    /// Count per record letter.
    pub records: BTreeMap<char, usize>,
    /// Time of the first `B` record, `HHMMSS`.
    pub first_fix: Option<String>,
    /// Time of the last `B` record, `HHMMSS`.
    pub last_fix: Option<String>,
}

impl RecordSummary {
    /// Summarise the records in `text`.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut summary = Self::default();
        for line in text.lines().map(|l| l.trim_end_matches('\r')) {
            let Some(kind) = RecordType::of(line) else {
                continue;
            };
            summary.lines += 1;

            let letter = line.chars().next().unwrap_or('?');
            *summary.records.entry(letter).or_insert(0) += 1;

            if kind == RecordType::B {
                if let Some(time) = line.get(1..7) {
                    if summary.first_fix.is_none() {
                        summary.first_fix = Some(time.to_string());
                    }
                    summary.last_fix = Some(time.to_string());
                }
            }
        }
        summary
    }

    /// Number of records starting with `letter`.
    #[must_use]
    pub fn count(&self, letter: char) -> usize {
        self.records.get(&letter).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "AXIRAAA\r\n\
        HFDTE010524\r\n\
        HFPLTPILOT:Jane Doe\r\n\
        I023638FXA3940SIU\r\n\
        F10000003071219\r\n\
        B1000005000000N00800000EA003800040001204\r\n\
        B1000015000060N00800060EA003800040001204\r\n\
        LXIRnote\r\n\
        B1000025000120N00800120EA003800040001204\r\n\
        \r\n\
        G0123456789abcdef\r\n";

    #[test]
    fn test_summary_counts_records() {
        let summary = RecordSummary::from_text(LOG);
        assert_eq!(summary.lines, 10);
        assert_eq!(summary.count('B'), 3);
        assert_eq!(summary.count('H'), 2);
        assert_eq!(summary.count('G'), 1);
        assert_eq!(summary.count('C'), 0);
        assert_eq!(summary.first_fix.as_deref(), Some("100000"));
        assert_eq!(summary.last_fix.as_deref(), Some("100002"));
    }

    #[test]
    fn test_summary_of_empty_text() {
        let summary = RecordSummary::from_text("");
        assert_eq!(summary, RecordSummary::default());
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_string(&RecordSummary::from_text(LOG)).unwrap();
        assert!(json.contains("\"B\":3"));
        assert!(json.contains("\"first_fix\":\"100000\""));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
