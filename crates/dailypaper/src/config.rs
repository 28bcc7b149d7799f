//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at all) is a valid
//! configuration. The entry point reads the file, applies command line overrides, and hands the
//! resulting sections to the components at construction; nothing in the library reads the
//! environment.
//!
//! ```toml
//! [catalog]
//! categories = ["cs.DC", "cs.AI"]
//!
//! [catalog.keyword_filters]
//! "cs.AI" = ["accelerate", "accelerating", "acceleration"]
//!
//! [analysis]
//! base_url = "https://api.deepseek.com"
//! model = "deepseek-chat"
//!
//! [report]
//! output_dir = "docs/daily"
//! layout = "weekly"
//!
//! [pipeline]
//! concurrency = 4
//! ```

use super::*;
use crate::report::{Include, Layout};

/// Complete configuration of a dailypaper run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Listing client settings
  pub catalog:  CatalogConfig,
  /// Document fetcher settings
  pub fetch:    FetchConfig,
  /// Analysis client settings
  pub analysis: AnalysisConfig,
  /// Report settings
  pub report:   ReportConfig,
  /// Retry policy shared by every network client
  pub retry:    RetryPolicy,
  /// Run settings
  pub pipeline: PipelineConfig,
}

/// Settings of the arXiv listing client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// Query endpoint of the arXiv API
  pub base_url:          String,
  /// Category codes queried when none are given on the command line
  pub categories:        Vec<String>,
  /// `max_results` sent with every category query
  pub page_size:         usize,
  /// Request timeout, in seconds
  pub timeout_secs:      u64,
  /// Pause between two category queries, in milliseconds. arXiv asks for three seconds.
  pub query_interval_ms: u64,
  /// Per category, keywords of which at least one must appear in the abstract (case-insensitive)
  /// for an entry listed under that category to be kept
  pub keyword_filters:   BTreeMap<String, Vec<String>>,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      base_url:          "http://export.arxiv.org/api/query".into(),
      categories:        vec!["cs.DC".into(), "cs.AI".into(), "cs.LG".into()],
      page_size:         2000,
      timeout_secs:      30,
      query_interval_ms: 3000,
      keyword_filters:   BTreeMap::new(),
    }
  }
}

/// Settings of the PDF fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  /// Download timeout, in seconds
  pub timeout_secs: u64,
  /// Number of leading pages to extract text from
  pub max_pages:    u32,
  /// Maximum number of characters of extracted text kept
  pub max_chars:    usize,
}

impl Default for FetchConfig {
  fn default() -> Self { Self { timeout_secs: 30, max_pages: 1, max_chars: 4096 } }
}

/// Settings of the analysis client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  /// Base URL of the OpenAI-compatible API; `chat/completions` is appended
  pub base_url:      String,
  /// Model name
  pub model:         String,
  /// Name of the environment variable holding the bearer token
  pub api_key_env:   String,
  /// Request timeout, in seconds
  pub timeout_secs:  u64,
  /// Sampling temperature; the service default when unset
  pub temperature:   Option<f32>,
  /// Prompt template file replacing the built-in one
  pub template_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      base_url:      "https://api.deepseek.com".into(),
      model:         "deepseek-chat".into(),
      api_key_env:   "DEEPSEEK_API_KEY".into(),
      timeout_secs:  120,
      temperature:   None,
      template_path: None,
    }
  }
}

/// Settings of the report assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
  /// Directory receiving the markdown files
  pub output_dir: PathBuf,
  /// One file per date, or one file per week with a section per date
  pub layout:     Layout,
  /// Whether irrelevant papers are listed too
  pub include:    Include,
}

impl Default for ReportConfig {
  fn default() -> Self {
    Self { output_dir: PathBuf::from("docs/daily"), layout: Layout::Daily, include: Include::Relevant }
  }
}

/// Settings of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Maximum number of papers processed at the same time
  pub concurrency: usize,
  /// Cap on the number of candidates taken from the catalog per date
  pub max_papers:  Option<usize>,
  /// SQLite state database; [`Config::default_state_path`] when unset
  pub state_path:  Option<PathBuf>,
}

impl Default for PipelineConfig {
  fn default() -> Self { Self { concurrency: 2, max_papers: None, state_path: None } }
}

impl Config {
  /// Parses a configuration from a TOML string.
  pub fn from_toml(toml_str: &str) -> Result<Self> { Ok(toml::from_str(toml_str)?) }

  /// Reads a configuration file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
      DailyPaperError::Config(format!("cannot read configuration {}: {e}", path.display()))
    })?;
    Self::from_toml(&content)
  }

  /// Reads `path` if it exists, otherwise returns the defaults.
  pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if path.exists() {
      Self::from_path(path)
    } else {
      debug!("No configuration at {}, using defaults", path.display());
      Ok(Self::default())
    }
  }

  /// The configuration written by `dailypaper init`: the defaults plus the acceleration keyword
  /// filter on `cs.AI` and `cs.LG`.
  pub fn starter() -> Self {
    let keywords: Vec<String> =
      ["accelerate", "accelerating", "acceleration"].into_iter().map(String::from).collect();
    let mut config = Self::default();
    config.catalog.keyword_filters.insert("cs.AI".into(), keywords.clone());
    config.catalog.keyword_filters.insert("cs.LG".into(), keywords);
    config
  }

  /// Serializes this configuration to TOML.
  pub fn to_toml_string(&self) -> Result<String> { Ok(toml::to_string_pretty(self)?) }

  /// Checks the values no component can work with.
  pub fn validate(&self) -> Result<()> {
    if self.pipeline.concurrency == 0 {
      return Err(DailyPaperError::Config("pipeline.concurrency must be at least 1".into()));
    }
    if self.fetch.max_pages == 0 {
      return Err(DailyPaperError::Config("fetch.max_pages must be at least 1".into()));
    }
    if !(0.0..=1.0).contains(&self.retry.jitter) {
      return Err(DailyPaperError::Config("retry.jitter must be within [0, 1]".into()));
    }
    Ok(())
  }

  /// Default location of the configuration file.
  ///
  /// - On Unix: `~/.config/dailypaper/config.toml`
  /// - On macOS: `~/Library/Application Support/dailypaper/config.toml`
  /// - Fallback: `./dailypaper/config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("dailypaper").join("config.toml")
  }

  /// Default location of the state database.
  pub fn default_state_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("dailypaper").join("state.db")
  }

  /// State database path in effect.
  pub fn state_path(&self) -> PathBuf {
    self.pipeline.state_path.clone().unwrap_or_else(Self::default_state_path)
  }
}
