//! Paper metadata and the values that flow through a single paper's processing.
//!
//! - [`PaperRecord`]: immutable metadata of a catalog entry
//! - [`FetchedContent`]: what the document fetcher produced for one attempt
//! - [`AnalysisInput`]: what is actually sent to the analysis service, with the abstract-only
//!   fallback applied
//!
//! # Examples
//!
//! ```
//! use dailypaper::paper::{split_arxiv_id, normalize_whitespace};
//!
//! assert_eq!(split_arxiv_id("http://arxiv.org/abs/2401.00001v2"), Some(("2401.00001".into(), "v2".into())));
//! assert_eq!(normalize_whitespace("Fast\n   Inference "), "Fast Inference");
//! ```

use super::*;

lazy_static! {
  /// Runs of whitespace, including the line breaks arXiv puts in titles and abstracts.
  static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
  /// An arXiv abstract URL, new-style (`2401.00001v1`) or old-style (`math.AG/0601001v1`).
  static ref ARXIV_ID: Regex = Regex::new(r"abs/(?P<id>.+?)(?P<version>v\d+)?$").unwrap();
}

/// Metadata of one catalog entry.
///
/// Records are created by a [`Catalog`](crate::catalog::Catalog) and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
  /// arXiv identifier without version suffix, e.g. `2401.00001`
  pub identifier:    String,
  /// Version suffix of the listed entry, e.g. `v2`. Empty when unknown.
  pub version:       String,
  /// Title with whitespace normalized
  pub title:         String,
  /// Author names, in listing order
  pub authors:       Vec<String>,
  /// Abstract with whitespace normalized
  pub abstract_text: String,
  /// Category codes, primary category first
  pub categories:    Vec<String>,
  /// Submission timestamp of the first version
  pub published:     DateTime<Utc>,
  /// Timestamp of the listed version
  pub updated:       DateTime<Utc>,
  /// Direct link to the PDF, when the catalog provided one
  pub pdf_url:       Option<String>,
}

impl PaperRecord {
  /// Date the paper was first submitted.
  pub fn submission_date(&self) -> NaiveDate { self.published.date_naive() }

  /// Link to the PDF, falling back to the canonical arXiv location.
  pub fn pdf_link(&self) -> String {
    self
      .pdf_url
      .clone()
      .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}{}", self.identifier, self.version))
  }

  /// Link to the abstract page.
  pub fn abs_link(&self) -> String { format!("https://arxiv.org/abs/{}", self.identifier) }
}

/// Result of downloading and extracting one paper's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedContent {
  /// Extracted text, trimmed and non-empty.
  Text(String),
  /// The document was readable but contained no extractable text.
  Empty,
  /// The document could not be downloaded or parsed.
  Unavailable(FetchError),
}

/// What the analysis was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
  /// Title, abstract and extracted document text.
  FullText,
  /// Title and abstract only; the document was unusable.
  AbstractOnly,
}

impl Display for InputKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      InputKind::FullText => write!(f, "full text"),
      InputKind::AbstractOnly => write!(f, "abstract only"),
    }
  }
}

/// Input handed to an [`Analyzer`](crate::analysis::Analyzer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInput {
  /// Paper title
  pub title:         String,
  /// Author names joined with commas
  pub authors:       String,
  /// Paper abstract
  pub abstract_text: String,
  /// Extracted document text; `None` for abstract-only analysis
  pub content:       Option<String>,
}

impl AnalysisInput {
  /// Builds the analysis input for `record` from what the fetcher produced.
  ///
  /// Unusable content falls back to the abstract. Only when the abstract is empty too does this
  /// fail, with the fetch error (or an [`FetchError::ExtractFailed`] for empty text).
  pub fn from_content(record: &PaperRecord, content: FetchedContent) -> Result<Self, FetchError> {
    let content = match content {
      FetchedContent::Text(text) => Some(text),
      FetchedContent::Empty if !record.abstract_text.trim().is_empty() => None,
      FetchedContent::Empty =>
        return Err(FetchError::ExtractFailed("document text and abstract are both empty".into())),
      FetchedContent::Unavailable(_) if !record.abstract_text.trim().is_empty() => None,
      FetchedContent::Unavailable(e) => return Err(e),
    };
    Ok(Self {
      title: record.title.clone(),
      authors: record.authors.join(", "),
      abstract_text: record.abstract_text.clone(),
      content,
    })
  }

  /// Whether the document text is part of this input.
  pub fn kind(&self) -> InputKind {
    if self.content.is_some() {
      InputKind::FullText
    } else {
      InputKind::AbstractOnly
    }
  }
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
  WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Splits an arXiv abstract URL into identifier and version suffix.
pub fn split_arxiv_id(url: &str) -> Option<(String, String)> {
  let captures = ARXIV_ID.captures(url.trim())?;
  let id = captures.name("id")?.as_str().to_string();
  let version = captures.name("version").map(|m| m.as_str().to_string()).unwrap_or_default();
  Some((id, version))
}
