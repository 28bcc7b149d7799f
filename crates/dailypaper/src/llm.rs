//! Client for OpenAI-compatible chat completion endpoints.
//!
//! The request is built fluently and sent with a caller-provided [`reqwest::Client`], so that
//! timeouts and connection pooling stay with the component owning the client. Failures keep the
//! HTTP status, the response body and any `Retry-After` hint, which is what the caller needs to
//! decide between retrying, skipping the paper and stopping the run.
//!
//! # Examples
//!
//! ```no_run
//! use dailypaper::llm::{endpoint_url, ChatRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let response = ChatRequest::new()
//!   .with_url(endpoint_url("https://api.deepseek.com")?)
//!   .with_api_key("sk-...")
//!   .with_model("deepseek-chat")
//!   .with_system("You are a helpful assistant.")
//!   .with_message("What is speculative decoding?")
//!   .send(&reqwest::Client::new())
//!   .await?;
//!
//! println!("{}", response.content().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use reqwest::header::RETRY_AFTER;
use thiserror::Error;

use super::*;

/// Failure of a chat request.
#[derive(Error, Debug)]
pub enum ChatError {
  /// The request was incomplete and never sent.
  #[error(transparent)]
  Request(#[from] DailyPaperError),

  /// The request could not be sent or the response not received.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The service answered with a non-success status.
  #[error("HTTP {status}: {body}")]
  Status {
    /// HTTP status code
    status:      u16,
    /// Response body, as text
    body:        String,
    /// Wait requested through `Retry-After`, in whole seconds
    retry_after: Option<Duration>,
  },

  /// The response body is not a chat completion.
  #[error("malformed response: {0}")]
  Decode(String),
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  /// `system`, `user` or `assistant`
  pub role:    String,
  /// Message text
  #[serde(default)]
  pub content: String,
}

/// Request builder for chat completions.
///
/// There is deliberately no `Debug` implementation: the builder carries the API key.
#[derive(Serialize, Default)]
pub struct ChatRequest {
  /// Model name. Sending without one fails with [`DailyPaperError::LLMMissingModel`].
  pub model:       Option<String>,
  /// Conversation, in order. Must not be empty when sending.
  pub messages:    Vec<Message>,
  /// Always `false`; streaming is not supported.
  pub stream:      bool,
  /// Sampling temperature; left to the service when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  /// Full URL of the completions endpoint.
  #[serde(skip)]
  pub url:         Option<Url>,
  /// Bearer token.
  #[serde(skip)]
  api_key:         Option<String>,
}

/// A chat completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
  /// Model that produced the completion
  #[serde(default)]
  pub model:   String,
  /// Generated alternatives; the first one is used
  #[serde(default)]
  pub choices: Vec<Choice>,
  /// Token accounting, when reported
  #[serde(default)]
  pub usage:   Option<Usage>,
}

/// One generated alternative.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
  /// Generated message
  pub message:       Message,
  /// Why generation stopped
  #[serde(default)]
  pub finish_reason: Option<String>,
}

/// Token accounting of a completion.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
  /// Tokens in the prompt
  #[serde(default)]
  pub prompt_tokens:     u64,
  /// Tokens generated
  #[serde(default)]
  pub completion_tokens: u64,
}

impl ChatResponse {
  /// Text of the first choice, if any.
  pub fn content(&self) -> Option<&str> {
    self.choices.first().map(|choice| choice.message.content.as_str())
  }
}

/// Completions URL for an API base URL: `https://api.deepseek.com` becomes
/// `https://api.deepseek.com/chat/completions`, and `http://host/v1/` becomes
/// `http://host/v1/chat/completions`.
pub fn endpoint_url(base: &str) -> Result<Url> {
  let base = base.trim();
  let mut url = Url::parse(base)?;
  if !url.path().ends_with('/') {
    url.set_path(&format!("{}/", url.path()));
  }
  Ok(url.join("chat/completions")?)
}

impl ChatRequest {
  /// Creates an empty request.
  pub fn new() -> Self { Self::default() }

  /// Sets the completions endpoint.
  pub fn with_url(mut self, url: Url) -> Self {
    self.url = Some(url);
    self
  }

  /// Sets the bearer token.
  pub fn with_api_key(mut self, api_key: &str) -> Self {
    self.api_key = Some(api_key.to_string());
    self
  }

  /// Sets the model.
  pub fn with_model(mut self, model: &str) -> Self {
    self.model.replace(model.to_string());
    self
  }

  /// Sets the sampling temperature.
  pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
    self.temperature = temperature;
    self
  }

  /// Appends a system message.
  pub fn with_system(mut self, content: &str) -> Self {
    self.messages.push(Message { role: "system".to_string(), content: content.to_string() });
    self
  }

  /// Appends a user message.
  pub fn with_message(mut self, content: &str) -> Self {
    self.messages.push(Message { role: "user".to_string(), content: content.to_string() });
    self
  }

  /// Sends the request.
  ///
  /// # Errors
  ///
  /// - [`ChatError::Request`] when the endpoint, the model or every message is missing
  /// - [`ChatError::Transport`] for connection failures and timeouts
  /// - [`ChatError::Status`] for any non-success status
  /// - [`ChatError::Decode`] when the body is not a completion
  pub async fn send(&self, client: &reqwest::Client) -> Result<ChatResponse, ChatError> {
    let url = self
      .url
      .clone()
      .ok_or_else(|| DailyPaperError::Config("no chat completions endpoint was set".into()))?;
    if self.model.is_none() {
      return Err(DailyPaperError::LLMMissingModel.into());
    }
    if self.messages.is_empty() {
      return Err(DailyPaperError::LLMMissingMessage.into());
    }

    let mut request = client.post(url).json(self);
    if let Some(api_key) = &self.api_key {
      request = request.bearer_auth(api_key);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
      let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
      let body = response.text().await.unwrap_or_default();
      return Err(ChatError::Status { status: status.as_u16(), body, retry_after });
    }

    let body = response.text().await?;
    trace!("Chat completion: {body}");
    serde_json::from_str(&body).map_err(|e| ChatError::Decode(e.to_string()))
  }
}
