//! `igcrec` - CLI for igcrecorder
//!
//! Verifies and signs IGC flight logs, summarises their records and shows
//! the configuration the library would use.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;

use igcrecorder::cli::{Cli, Command, ConfigCommand, RecordSummary};
use igcrecorder::igc::grecord::{sign_file, verify_file};
use igcrecorder::igc::SignatureStatus;
use igcrecorder::{init_logging, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Command::Verify(cmd) => {
            let ignore_comma = cmd.ignore_comma || config.signing.ignore_comma;
            let status = verify_file(&cmd.file, ignore_comma)
                .with_context(|| format!("cannot verify {}", cmd.file.display()))?;
            println!("{}: {status}", cmd.file.display());
            if status != SignatureStatus::Valid {
                bail!("signature check failed for {}", cmd.file.display());
            }
        }
        Command::Sign(cmd) => {
            let ignore_comma = cmd.ignore_comma || config.signing.ignore_comma;
            sign_file(&cmd.file, ignore_comma)
                .with_context(|| format!("cannot sign {}", cmd.file.display()))?;
            println!("Signed {}", cmd.file.display());
        }
        Command::Records(cmd) => {
            let text = fs::read_to_string(&cmd.file)
                .with_context(|| format!("cannot read {}", cmd.file.display()))?;
            print_summary(&RecordSummary::from_text(&text), cmd.json)?;
        }
        Command::Config(cmd) => handle_config(&config, cmd)?,
    }
    Ok(())
}

fn print_summary(summary: &RecordSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Lines:      {}", summary.lines);
    for (letter, count) in &summary.records {
        println!("  {letter}        {count:>6}");
    }
    if let (Some(first), Some(last)) = (&summary.first_fix, &summary.last_fix) {
        println!("Fixes:      {first} - {last}");
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Logger]");
                println!("  Directory:          {}", config.logger.log_directory().display());
                println!("  Logger id:          {}", config.logger.logger_id);
                println!("  Short file names:   {}", config.logger.short_file_names);
                println!("  Pre-takeoff fixes:  {}", config.logger.pre_takeoff_capacity);
                println!("  Disk buffer lines:  {}", config.logger.disk_buffer_lines);
                println!("  Min free (kB):      {}", config.logger.min_free_kb);
                println!("  F record interval:  {}s", config.logger.f_record_interval_secs);
                println!("  Simulator:          {}", config.logger.simulator);
                println!();
                println!("[Signing]");
                println!("  Enabled:            {}", config.signing.enabled);
                println!("  Ignore commas:      {}", config.signing.ignore_comma);
                println!();
                println!("[Device]");
                println!("  IMI retries:        {}", config.device.imi_retries);
                println!("  EW connect tries:   {}", config.device.ew_connect_attempts);
                println!(
                    "  Micro window:       {}ms",
                    config.device.micro_connect_window_ms
                );
                println!("  Nano timeout:       {}ms", config.device.nano_timeout_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
