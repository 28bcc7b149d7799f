//! Atom feed returned by the arXiv query API.
//!
//! Only the parts of an entry the pipeline needs are captured. Timestamps are kept as strings and
//! parsed during conversion so that one malformed entry is skipped instead of failing the whole
//! page.

use quick_xml::de::from_str;

use super::*;

/// A page of query results.
#[derive(Debug, Deserialize)]
pub(crate) struct Feed {
  /// Listed entries, in response order
  #[serde(rename = "entry", default)]
  pub entries: Vec<Entry>,
}

/// One listed paper.
#[derive(Debug, Deserialize)]
pub(crate) struct Entry {
  /// Abstract URL, e.g. `http://arxiv.org/abs/2401.00001v1`
  #[serde(default)]
  pub id:         String,
  /// Timestamp of this version
  #[serde(default)]
  pub updated:    Option<String>,
  /// Timestamp of the first version
  #[serde(default)]
  pub published:  Option<String>,
  /// Title (may span several lines)
  #[serde(default)]
  pub title:      String,
  /// Abstract (may span several lines)
  #[serde(default)]
  pub summary:    String,
  /// Authors, in order
  #[serde(rename = "author", default)]
  pub authors:    Vec<AtomAuthor>,
  /// Alternate and related links
  #[serde(rename = "link", default)]
  pub links:      Vec<Link>,
  /// Category terms, primary first
  #[serde(rename = "category", default)]
  pub categories: Vec<Category>,
}

/// Author element.
#[derive(Debug, Deserialize)]
pub(crate) struct AtomAuthor {
  /// Full name
  #[serde(default)]
  pub name: String,
}

/// Link element.
#[derive(Debug, Deserialize)]
pub(crate) struct Link {
  /// Target URL
  #[serde(rename = "@href", default)]
  pub href:  String,
  /// `pdf` for the document link
  #[serde(rename = "@title", default)]
  pub title: Option<String>,
}

/// Category element.
#[derive(Debug, Deserialize)]
pub(crate) struct Category {
  /// Category code, e.g. `cs.AI`
  #[serde(rename = "@term", default)]
  pub term: String,
}

impl Feed {
  /// Parses a response body.
  pub(crate) fn parse(xml: &str) -> core::result::Result<Self, quick_xml::DeError> { from_str(xml) }

  /// The message of the error entry arXiv answers malformed queries with, if this is one.
  pub(crate) fn error_message(&self) -> Option<String> {
    self
      .entries
      .iter()
      .find(|entry| entry.id.contains("/api/errors"))
      .map(|entry| normalize_whitespace(&entry.summary))
  }
}

impl Entry {
  /// Converts this entry into a record, or explains why it cannot be.
  pub(crate) fn into_record(self) -> core::result::Result<PaperRecord, String> {
    let (identifier, version) =
      split_arxiv_id(&self.id).ok_or_else(|| format!("unrecognized entry id {:?}", self.id))?;
    let published = parse_timestamp(self.published.as_deref(), "published")?;
    let updated = match self.updated.as_deref() {
      Some(_) => parse_timestamp(self.updated.as_deref(), "updated")?,
      None => published,
    };
    let pdf_url = self
      .links
      .iter()
      .find(|link| link.title.as_deref() == Some("pdf"))
      .map(|link| link.href.clone())
      .filter(|href| !href.is_empty());

    let mut categories: Vec<String> = Vec::with_capacity(self.categories.len());
    for category in self.categories {
      if !category.term.is_empty() && !categories.contains(&category.term) {
        categories.push(category.term);
      }
    }

    Ok(PaperRecord {
      identifier,
      version,
      title: normalize_whitespace(&self.title),
      authors: self
        .authors
        .into_iter()
        .map(|author| normalize_whitespace(&author.name))
        .filter(|name| !name.is_empty())
        .collect(),
      abstract_text: normalize_whitespace(&self.summary),
      categories,
      published,
      updated,
      pdf_url,
    })
  }
}

/// Parses an RFC 3339 timestamp field.
fn parse_timestamp(value: Option<&str>, field: &str) -> core::result::Result<DateTime<Utc>, String> {
  let value = value.ok_or_else(|| format!("missing {field} timestamp"))?;
  DateTime::parse_from_rfc3339(value.trim())
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("invalid {field} timestamp {value:?}: {e}"))
}
