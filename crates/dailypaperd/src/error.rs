//! Error types for the dailypaper binary.

use thiserror::Error;

use super::*;

/// Result alias of the binary.
pub type Result<T> = core::result::Result<T, DailyPaperdError>;

/// Errors that end the process.
#[derive(Error, Debug)]
pub enum DailyPaperdError {
  /// Errors from the core library
  #[error(transparent)]
  DailyPaper(#[from] DailyPaperError),

  /// The environment variable holding the analysis credential is unset or empty.
  #[error("environment variable {0} is not set; export the analysis API key there")]
  MissingApiKey(String),

  /// The analysis service refused to go on.
  #[error("analysis stopped for {date}: {reason}")]
  AnalysisFatal {
    /// Date whose run was halted
    date:   chrono::NaiveDate,
    /// What the service said
    reason: String,
  },

  /// The `--log-dir` directory cannot hold the log files.
  #[error("cannot write logs to {}: {source}", path.display())]
  LogDir {
    /// Requested log directory
    path:   std::path::PathBuf,
    /// Why the appender could not start
    source: tracing_appender::rolling::InitError,
  },

  /// Prompting the user failed.
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl DailyPaperdError {
  /// Process exit status for this error.
  pub fn exit_code(&self) -> u8 {
    match self {
      DailyPaperdError::AnalysisFatal { .. } => 3,
      _ => 1,
    }
  }
}
