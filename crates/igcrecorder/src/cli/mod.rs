//! Command-line interface for igcrecorder.
//!
//! This module provides the CLI structure and command handlers for the
//! `igcrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{ConfigCommand, RecordSummary, RecordsCommand, SignCommand, VerifyCommand};

/// igcrec - Check, sign and inspect IGC flight logs
///
/// Works with the tamper-evident G record written by igcrecorder and with
/// its configuration.
#[derive(Debug, Parser)]
#[command(name = "igcrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the G record of a flight log
    Verify(VerifyCommand),

    /// Append a G record to an unsigned flight log
    Sign(SignCommand),

    /// Count the records of a flight log by type
    Records(RecordsCommand),

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
