//! Listing client: discovers the papers of a date in a set of categories.
//!
//! [`ArxivCatalog`] sends one query per category to the arXiv API, restricted to the entries last
//! updated on the target date, and merges the answers in category order. The merged list is
//! deduplicated by identifier, optionally narrowed by per-category abstract keywords, and capped.
//!
//! # Examples
//!
//! ```no_run
//! use dailypaper::{
//!   catalog::{ArxivCatalog, Catalog, ListingQuery},
//!   config::CatalogConfig,
//!   retry::RetryPolicy,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = ArxivCatalog::new(CatalogConfig::default(), RetryPolicy::default())?;
//! let query = ListingQuery::new("2024-01-15", ["cs.DC", "cs.AI"])?.with_max_results(Some(10));
//!
//! for paper in catalog.list(&query).await? {
//!   println!("{} {}", paper.identifier, paper.title);
//! }
//! # Ok(())
//! # }
//! ```

use reqwest::StatusCode;

use super::*;
use crate::config::CatalogConfig;

mod atom;

use self::atom::Feed;

lazy_static! {
  /// A run date as accepted on input.
  static ref DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
  /// An arXiv category code: `cs.AI`, `math.AG`, `hep-th`, `quant-ph`, ...
  static ref CATEGORY: Regex = Regex::new(r"^[a-z][a-z-]*(\.[A-Za-z][A-Za-z-]*)?$").unwrap();
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
  /// Target date; entries last updated on this day are listed
  pub date:        NaiveDate,
  /// Category codes, queried in this order
  pub categories:  Vec<String>,
  /// Cap on the number of records returned
  pub max_results: Option<usize>,
}

impl ListingQuery {
  /// Validates a `YYYY-MM-DD` date string and a category set.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::InvalidQuery`] for a malformed date or an empty or malformed
  /// category set.
  pub fn new<I, S>(date: &str, categories: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    Self::for_date(parse_date(date)?, categories)
  }

  /// Validates a category set for an already parsed date.
  pub fn for_date<I, S>(date: NaiveDate, categories: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    let mut codes: Vec<String> = Vec::new();
    for category in categories {
      let category = category.into().trim().to_string();
      if !CATEGORY.is_match(&category) {
        return Err(DailyPaperError::InvalidQuery(format!("malformed category {category:?}")));
      }
      if !codes.contains(&category) {
        codes.push(category);
      }
    }
    if codes.is_empty() {
      return Err(DailyPaperError::InvalidQuery("no category given".into()));
    }
    Ok(Self { date, categories: codes, max_results: None })
  }

  /// Caps the number of records returned.
  pub fn with_max_results(mut self, max_results: Option<usize>) -> Self {
    self.max_results = max_results;
    self
  }

  /// The arXiv `search_query` for one category of this query.
  pub fn search_query(&self, category: &str) -> String {
    let day = self.date.format("%Y%m%d");
    format!("cat:{category} AND lastUpdatedDate:[{day}0000 TO {day}2359]")
  }
}

/// Parses a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`DailyPaperError::InvalidQuery`] when the string is not a valid calendar date.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
  let date = date.trim();
  if !DATE.is_match(date) {
    return Err(DailyPaperError::InvalidQuery(format!("date {date:?} is not YYYY-MM-DD")));
  }
  NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|e| DailyPaperError::InvalidQuery(format!("date {date:?} is invalid: {e}")))
}

/// Source of candidate papers.
#[async_trait]
pub trait Catalog: Send + Sync {
  /// Lists the papers matching `query`, in a deterministic order, without duplicate identifiers.
  ///
  /// # Errors
  ///
  /// - [`DailyPaperError::InvalidQuery`] when the source rejects the query
  /// - [`DailyPaperError::CatalogUnavailable`] when the source cannot be reached
  async fn list(&self, query: &ListingQuery) -> Result<Vec<PaperRecord>>;
}

/// [`Catalog`] backed by the arXiv query API.
#[derive(Debug, Clone)]
pub struct ArxivCatalog {
  /// HTTP client carrying the request timeout
  client: reqwest::Client,
  /// Endpoint, paging and filtering settings
  config: CatalogConfig,
  /// Retry policy applied to each category query
  retry:  RetryPolicy,
}

impl ArxivCatalog {
  /// Creates a catalog client from its configuration.
  pub fn new(config: CatalogConfig, retry: RetryPolicy) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("dailypaper/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, config, retry })
  }

  /// Fetches and parses the entries of one category.
  async fn fetch_category(&self, query: &ListingQuery, category: &str) -> Result<Vec<PaperRecord>> {
    let search_query = query.search_query(category);
    let label = format!("arXiv listing {category}");
    let page_size = self.config.page_size.to_string();

    let feed = self
      .retry
      .run(&label, |attempt| {
        let request = self.client.get(&self.config.base_url).query(&[
          ("search_query", search_query.as_str()),
          ("sortBy", "submittedDate"),
          ("sortOrder", "descending"),
          ("start", "0"),
          ("max_results", page_size.as_str()),
        ]);
        async move {
          debug!("Querying arXiv for {category} (attempt {attempt})");
          let unavailable =
            |reason: String| DailyPaperError::CatalogUnavailable { attempts: attempt, reason };
          let response =
            request.send().await.map_err(|e| Attempt::Transient(unavailable(e.to_string()), None))?;
          let status = response.status();
          if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            let reason = Feed::parse(&body).ok().and_then(|f| f.error_message()).unwrap_or(body);
            return Err(Attempt::Permanent(DailyPaperError::InvalidQuery(format!(
              "arXiv rejected {category}: {reason}"
            ))));
          }
          if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Transient(unavailable(format!("HTTP {status}")), None));
          }
          if !status.is_success() {
            return Err(Attempt::Permanent(unavailable(format!("HTTP {status}"))));
          }
          let body = response
            .text()
            .await
            .map_err(|e| Attempt::Transient(unavailable(e.to_string()), None))?;
          trace!("arXiv response for {category}: {body}");
          Feed::parse(&body)
            .map_err(|e| Attempt::Transient(unavailable(format!("malformed feed: {e}")), None))
        }
      })
      .await
      .map_err(Failure::into_inner)?;

    if let Some(message) = feed.error_message() {
      return Err(DailyPaperError::InvalidQuery(format!("arXiv rejected {category}: {message}")));
    }

    let mut records = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
      match entry.into_record() {
        Ok(record) => records.push(record),
        Err(reason) => warn!("Skipping malformed {category} entry: {reason}"),
      }
    }
    Ok(records)
  }

  /// Whether `record`, listed under `category`, passes that category's keyword filter.
  fn passes_filter(&self, category: &str, record: &PaperRecord) -> bool {
    match self.config.keyword_filters.get(category) {
      Some(keywords) if !keywords.is_empty() => {
        let abstract_text = record.abstract_text.to_lowercase();
        keywords.iter().any(|keyword| abstract_text.contains(&keyword.to_lowercase()))
      },
      _ => true,
    }
  }
}

#[async_trait]
impl Catalog for ArxivCatalog {
  async fn list(&self, query: &ListingQuery) -> Result<Vec<PaperRecord>> {
    let mut seen = HashSet::new();
    let mut papers = Vec::new();

    for (index, category) in query.categories.iter().enumerate() {
      if index > 0 && self.config.query_interval_ms > 0 {
        tokio::time::sleep(Duration::from_millis(self.config.query_interval_ms)).await;
      }

      let records = self.fetch_category(query, category).await?;
      let listed = records.len();
      let mut kept = 0;
      for record in records {
        if record.updated.date_naive() != query.date {
          trace!("Dropping {} updated on {}", record.identifier, record.updated.date_naive());
          continue;
        }
        if !self.passes_filter(category, &record) {
          continue;
        }
        if seen.insert(record.identifier.clone()) {
          kept += 1;
          papers.push(record);
        }
      }
      info!("{category}: {listed} listed, {kept} new candidate(s) for {}", query.date);
    }

    if let Some(cap) = query.max_results {
      if papers.len() > cap {
        info!("Capping {} candidates to {cap}", papers.len());
        papers.truncate(cap);
      }
    }
    Ok(papers)
  }
}
