//! Daily arXiv digest pipeline.
//!
//! `dailypaper` turns "what appeared on arXiv yesterday in the categories I follow" into a
//! markdown report, providing:
//!
//! - Paper discovery from the arXiv listing API, by date and category
//! - Deduplication against the papers already recorded for a date
//! - PDF download and first-page text extraction
//! - Relevance tagging and summarization through an OpenAI-compatible chat endpoint
//! - Deterministic, idempotent markdown reports backed by a SQLite state store
//!
//! # Getting Started
//!
//! ```no_run
//! use dailypaper::{config::Config, pipeline::Pipeline, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::default();
//!   let api_key = std::env::var(&config.analysis.api_key_env)?;
//!
//!   let pipeline = Pipeline::from_config(&config, api_key).await?;
//!   let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//!   let summary = pipeline.run_date(date).await?;
//!
//!   println!("{}", summary.counts);
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`catalog`]: Listing client for the arXiv Atom API
//! - [`dedup`]: Filtering of already processed candidates
//! - [`pdf`]: Document download and text extraction
//! - [`llm`]: Chat completions request builder
//! - [`analysis`]: Prompting and verdict parsing on top of [`llm`]
//! - [`coordinator`]: Bounded worker pool running fetch and analysis per paper
//! - [`report`]: Report assembly and markdown rendering
//! - [`state`]: SQLite store of the verdicts recorded per date
//! - [`pipeline`]: The run state machine tying everything together
//! - [`config`]: TOML configuration
//! - [`retry`]: Retry policy shared by every network client

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::{BTreeMap, HashSet},
  fmt::Display,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
use url::Url;
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod llm;
pub mod paper;
pub mod pdf;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod state;

use crate::{error::*, paper::*, retry::*};

/// Common traits and types for ergonomic imports.
///
/// The component traits live here so that custom catalogs, document sources and
/// analyzers can be plugged into a [`pipeline::Pipeline`] with a single glob import.
///
/// ```no_run
/// use dailypaper::{paper::PaperRecord, prelude::*};
///
/// struct Offline;
///
/// #[async_trait::async_trait]
/// impl DocumentSource for Offline {
///   async fn fetch(&self, _record: &PaperRecord) -> dailypaper::paper::FetchedContent {
///     dailypaper::paper::FetchedContent::Empty
///   }
/// }
/// ```
pub mod prelude {
  pub use crate::{
    analysis::Analyzer, catalog::Catalog, error::DailyPaperError, pdf::DocumentSource,
  };
}
