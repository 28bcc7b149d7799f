//! Command line entry point for the dailypaper arXiv digest.
//!
//! This binary wires the `dailypaper` library to the outside world: it reads the configuration
//! file, resolves the analysis credential from the environment, installs logging, and maps the
//! outcome of a run to the process exit status.
//!
//! # Usage
//!
//! ```bash
//! # Write a starter configuration
//! dailypaper init
//!
//! # Digest yesterday's papers
//! dailypaper run
//!
//! # Backfill a range, logging to a rolling file
//! dailypaper run --range 2024-01-15:2024-01-19 --log-dir /var/log/dailypaper
//! ```
//!
//! # Exit status
//!
//! - `0`: every date completed, even with per-paper failures
//! - `1`: a run aborted, or the configuration is unusable
//! - `3`: the analysis service refused to go on (credential rejected, quota exhausted)

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use dailypaper::{
  config::Config,
  error::DailyPaperError,
  pipeline::{Pipeline, RunStage, RunSummary},
};
use tracing::{debug, error, info};
use tracing_appender::{
  non_blocking::WorkerGuard,
  rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Daily arXiv digest: list, fetch, analyze and report new papers")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the configuration file. Defaults to the platform configuration directory.
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// Also write logs to a daily rolling file in this directory.
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  /// Skip all prompts and accept defaults (mostly for testing)
  #[arg(long, hide = true, global = true)]
  accept_defaults: bool,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

impl Cli {
  /// Configuration file in effect.
  fn config_path(&self) -> PathBuf { self.config.clone().unwrap_or_else(Config::default_path) }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// `RUST_LOG` takes precedence when set. With `log_dir`, logs go to a daily rolling file instead
/// of stderr; the returned guard flushes it and must live until the process exits. Fails when the
/// log directory cannot be created.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  match log_dir {
    Some(dir) => {
      let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dailypaper")
        .filename_suffix("log")
        .build(dir)
        .map_err(|source| DailyPaperdError::LogDir { path: dir.to_path_buf(), source })?;
      let (writer, guard) = tracing_appender::non_blocking(appender);
      builder.with_writer(writer).with_ansi(false).init();
      Ok(Some(guard))
    },
    None => {
      builder.with_writer(std::io::stderr).init();
      Ok(None)
    },
  }
}

/// Prints `e` and turns it into the exit status.
fn fail(e: DailyPaperdError) -> ExitCode {
  eprintln!("{} {}", style(ERROR_PREFIX).red(), style(&e).red());
  ExitCode::from(e.exit_code())
}

/// Entry point for the dailypaper CLI application
///
/// Parses the arguments, sets up logging and runs the requested command. Errors are printed once
/// here and turned into the exit status.
#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  let _guard = match setup_logging(cli.verbose, cli.log_dir.as_deref()) {
    Ok(guard) => guard,
    Err(e) => return fail(e),
  };
  debug!("Configuration file: {}", cli.config_path().display());

  let result = match &cli.command {
    Commands::Init => init(&cli).await,
    Commands::Run(options) => run(&cli, options.clone()).await,
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{e}");
      fail(e)
    },
  }
}
