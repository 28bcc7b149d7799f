//! Document download and text extraction.
//!
//! A [`DocumentSource`] never fails: whatever goes wrong is reported as
//! [`FetchedContent::Unavailable`], and the caller decides whether the abstract is enough to go on.
//! [`PdfFetcher`] downloads the PDF linked from the record and extracts the text of its leading
//! pages with [`lopdf`].

use lopdf::Document;
use reqwest::StatusCode;

use super::*;
use crate::config::FetchConfig;

/// Source of the full text of a paper.
#[async_trait]
pub trait DocumentSource: Send + Sync {
  /// Downloads and extracts the document of `record`.
  async fn fetch(&self, record: &PaperRecord) -> FetchedContent;
}

/// [`DocumentSource`] downloading PDFs over HTTP.
#[derive(Debug, Clone)]
pub struct PdfFetcher {
  /// HTTP client carrying the download timeout
  client: reqwest::Client,
  /// Page and character limits
  config: FetchConfig,
  /// Retry policy applied to the download
  retry:  RetryPolicy,
}

impl PdfFetcher {
  /// Creates a fetcher from its configuration.
  pub fn new(config: FetchConfig, retry: RetryPolicy) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("dailypaper/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, config, retry })
  }

  /// Downloads the bytes at `url`.
  async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let label = format!("download {url}");
    self
      .retry
      .run(&label, |_| async move {
        let response = self
          .client
          .get(url)
          .send()
          .await
          .map_err(|e| Attempt::Transient(FetchError::FetchFailed(e.to_string()), None))?;
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
          return Err(Attempt::Transient(FetchError::FetchFailed(format!("HTTP {status}")), None));
        }
        if !status.is_success() {
          return Err(Attempt::Permanent(FetchError::FetchFailed(format!("HTTP {status}"))));
        }
        let bytes = response
          .bytes()
          .await
          .map_err(|e| Attempt::Transient(FetchError::FetchFailed(e.to_string()), None))?;
        Ok(bytes.to_vec())
      })
      .await
      .map_err(Failure::into_inner)
  }
}

#[async_trait]
impl DocumentSource for PdfFetcher {
  async fn fetch(&self, record: &PaperRecord) -> FetchedContent {
    let url = record.pdf_link();
    let bytes = match self.download(&url).await {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!("Could not download {}: {e}", record.identifier);
        return FetchedContent::Unavailable(e);
      },
    };
    debug!("Downloaded {} bytes for {}", bytes.len(), record.identifier);

    let (max_pages, max_chars) = (self.config.max_pages, self.config.max_chars);
    let extracted = tokio::task::spawn_blocking(move || extract_text(&bytes, max_pages, max_chars))
      .await
      .unwrap_or_else(|e| Err(FetchError::ExtractFailed(format!("extraction task failed: {e}"))));

    match extracted {
      Ok(text) if text.is_empty() => {
        debug!("No text in the document of {}", record.identifier);
        FetchedContent::Empty
      },
      Ok(text) => FetchedContent::Text(text),
      Err(e) => {
        warn!("Could not read the document of {}: {e}", record.identifier);
        FetchedContent::Unavailable(e)
      },
    }
  }
}

/// Extracts the text of the first `max_pages` pages of a PDF, trimmed and cut to `max_chars`
/// characters.
///
/// A readable document without text yields an empty string.
pub fn extract_text(bytes: &[u8], max_pages: u32, max_chars: usize) -> Result<String, FetchError> {
  let document = Document::load_mem(bytes)
    .map_err(|e| FetchError::ExtractFailed(format!("not a readable PDF: {e}")))?;
  let page_numbers: Vec<u32> =
    document.get_pages().keys().copied().take(max_pages as usize).collect();
  if page_numbers.is_empty() {
    return Ok(String::new());
  }
  let text = document
    .extract_text(&page_numbers)
    .map_err(|e| FetchError::ExtractFailed(format!("text extraction failed: {e}")))?;
  Ok(text.trim().chars().take(max_chars).collect::<String>().trim_end().to_string())
}
