//! Error types for the dailypaper library.
//!
//! Errors come in two flavors:
//!
//! - [`DailyPaperError`]: run-wide failures. They abort the run for a date and are returned through
//!   [`Result`], wrapped in [`DailyPaperError::Run`] with the stage and date they happened at.
//! - Per-item failures ([`FetchError`], [`AnalysisError`], [`ItemError`]): captured as values on the
//!   outcome of a single paper, counted in the run summary, never propagated.
//!
//! # Examples
//!
//! ```
//! use dailypaper::{catalog::ListingQuery, error::DailyPaperError};
//!
//! match ListingQuery::new("2024-13-45", ["cs.AI"]) {
//!   Err(DailyPaperError::InvalidQuery(reason)) => println!("bad input: {reason}"),
//!   Err(e) => println!("other error: {e}"),
//!   Ok(_) => unreachable!(),
//! }
//! ```

use thiserror::Error;

use super::*;
use crate::pipeline::RunStage;

/// Error type alias used for the [`dailypaper`](crate) crate.
pub type Result<T, E = DailyPaperError> = core::result::Result<T, E>;

/// Run-wide errors of the dailypaper library.
#[derive(Error, Debug)]
pub enum DailyPaperError {
  /// The run input is unusable: malformed date, empty or malformed category set, or a query the
  /// catalog itself rejected. Never retried.
  #[error("invalid query: {0}")]
  InvalidQuery(String),

  /// The catalog could not be reached, even after the retry policy was exhausted.
  #[error("catalog unavailable after {attempts} attempt(s): {reason}")]
  CatalogUnavailable {
    /// Number of requests sent before giving up
    attempts: u32,
    /// Last failure observed
    reason:   String,
  },

  /// Writing the report or the state store failed.
  ///
  /// Surfaced loudly: the papers analyzed during this run will be analyzed again on the next one.
  #[error("failed to persist {what}: {source}")]
  PersistenceFailed {
    /// What was being written
    what:   &'static str,
    /// Underlying failure
    #[source]
    source: Box<DailyPaperError>,
  },

  /// A run-wide error, annotated with where it happened.
  #[error("run for {date} aborted during {stage}: {source}")]
  Run {
    /// Stage the run was in
    stage:  RunStage,
    /// Target date of the run
    date:   NaiveDate,
    /// Underlying failure
    #[source]
    source: Box<DailyPaperError>,
  },

  /// The run state machine was asked for a transition it does not allow.
  #[error("invalid run transition from {from} to {to}")]
  InvalidTransition {
    /// Current stage
    from: RunStage,
    /// Requested stage
    to:   RunStage,
  },

  /// A network request failed at the transport level.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// A configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// A configuration could not be serialized.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// Stored verdicts could not be (de)serialized.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// An endpoint URL could not be parsed.
  #[error(transparent)]
  Url(#[from] url::ParseError),

  /// The configuration is inconsistent or incomplete.
  #[error("{0}")]
  Config(String),

  /// A chat request was sent without choosing a model.
  #[error("No model was chosen for the LLM.")]
  LLMMissingModel,

  /// A chat request was sent without any message.
  #[error("No messages were supplied to send to the LLM.")]
  LLMMissingMessage,
}

impl DailyPaperError {
  /// Wraps this error with the stage and date of the run it aborted.
  pub fn at(self, stage: RunStage, date: NaiveDate) -> Self {
    match self {
      run @ DailyPaperError::Run { .. } => run,
      other => DailyPaperError::Run { stage, date, source: Box::new(other) },
    }
  }

  /// Wraps this error as a [`DailyPaperError::PersistenceFailed`].
  pub fn persisting(self, what: &'static str) -> Self {
    DailyPaperError::PersistenceFailed { what, source: Box::new(self) }
  }

  /// The error a [`DailyPaperError::Run`] wraps, or `self` for any other variant.
  pub fn root(&self) -> &DailyPaperError {
    match self {
      DailyPaperError::Run { source, .. } => source.root(),
      other => other,
    }
  }
}

/// Why a paper's document could not be turned into text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
  /// The download failed: network error, timeout, or a non-success status.
  #[error("fetch failed: {0}")]
  FetchFailed(String),

  /// The document was downloaded but is not a readable PDF.
  #[error("extract failed: {0}")]
  ExtractFailed(String),
}

/// Why the analysis of a paper did not produce a verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
  /// This paper could not be analyzed: malformed response, rejected request, or retries
  /// exhausted. Other papers are unaffected.
  #[error("analysis failed: {0}")]
  Failed(String),

  /// The credential was rejected or the quota is exhausted. No further paper can be analyzed in
  /// this run.
  #[error("analysis fatal: {0}")]
  Fatal(String),
}

impl AnalysisError {
  /// Whether this error must stop the admission of new work.
  pub fn is_fatal(&self) -> bool { matches!(self, AnalysisError::Fatal(_)) }
}

/// Failure of a single paper, as recorded on its outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
  /// The document was unusable and there was no abstract to fall back on.
  #[error("no usable content: {0}")]
  Content(FetchError),

  /// The analysis service did not produce a verdict.
  #[error(transparent)]
  Analysis(AnalysisError),

  /// The worker task processing this paper panicked or was cancelled.
  #[error("worker task failed: {0}")]
  Worker(String),
}
