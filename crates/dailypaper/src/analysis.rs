//! Relevance tagging and summarization of a single paper.
//!
//! The [`Analyzer`] trait is the seam between the worker pool and the analysis service.
//! [`ChatAnalyzer`] implements it on top of [`crate::llm`]: it renders a [`PromptTemplate`], sends
//! it to the configured chat completions endpoint, and parses the line-oriented answer into an
//! [`AnalysisVerdict`]:
//!
//! ```text
//! tag1: mlsys
//! tag2: LLM inference
//! tag3: speculative decoding, KV cache
//! institution: Example University
//! is_interested: yes
//! llm_summary: The paper proposes ...
//! ```
//!
//! Failures are classified for the caller: a rejected credential or an exhausted quota is
//! [`AnalysisError::Fatal`] and stops the run, anything else is [`AnalysisError::Failed`] and
//! only affects the paper at hand.

use crate::{
  config::AnalysisConfig,
  llm::{endpoint_url, ChatError, ChatRequest},
};

use super::*;

/// System message sent before every prompt.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. You are good at summarizing papers \
                                 and extracting keywords and institutions.";

/// Built-in prompt: three-level tagging, institution inference and the interest criteria.
pub const DEFAULT_TEMPLATE: &str = r#"Title: {title}
Authors: {authors}
Abstract: {abstract}
First Page Content: {content}

Classify the paper above with three levels of tags: tag1, tag2 and tag3.
tag1 is either "mlsys" or "sys": a systems paper is "mlsys" as soon as it relates to LLMs, diffusion models, machine learning, deep learning or AI, and "sys" otherwise.
tag2 is finer grained. For mlsys pick one of: LLM inference, LLM training, Other models inference, Other models training, edge computing, post-training, checkpointing, finetuning, trace analysis, cluster infrastructure, scheduling, kernels, security, federated learning, others. For sys pick one of: hardware, compiler, quantum computing, operating system, cluster management, memory, network, filesystem, computation, fault-tolerance, security, programming languages, serverless, others.
tag3 is a comma-separated list of keywords summarizing the content.

Infer the main research institutions from the authors and the first page; there may be several. If no institution is named, infer it from the e-mail domains of the authors.

Finally, decide whether I would be interested in this paper:
- anything related to reinforcement learning is interesting, whatever the direction;
- any mlsys paper (tag1 is mlsys) whose tag2 is not security, edge computing or federated learning is interesting;
- meeting either criterion is enough.

Answer in exactly the format below, followed by a 2-3 sentence English summary of the main method and conclusion, without any extra explanation or code block:

tag1: <tag1>
tag2: <tag2>
tag3: <tag3, tag3, ...>
institution: <institution>
is_interested: <yes/no>
llm_summary: <2-3 sentences simple summary (method+conclusion)>
"#;

/// Placeholder text used for `{content}` when only the abstract is available.
const NO_CONTENT: &str = "(not available, judge from the title and abstract)";

/// Category tags assigned to a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
  /// `mlsys` or `sys`
  pub primary:   String,
  /// Fine-grained area, e.g. `LLM inference`
  pub secondary: String,
  /// Free keywords
  pub keywords:  Vec<String>,
}

impl Tags {
  /// Whether no tag was assigned at all.
  pub fn is_empty(&self) -> bool {
    self.primary.is_empty() && self.secondary.is_empty() && self.keywords.is_empty()
  }
}

/// What the analysis service concluded about one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
  /// Identifier of the analyzed paper
  pub identifier:  String,
  /// Whether the paper matches the reader's interests
  pub relevant:    bool,
  /// Category tags
  pub tags:        Tags,
  /// Inferred institutions, as written by the service
  pub institution: String,
  /// Short summary of method and conclusion
  pub summary:     String,
  /// Whether the document text was part of the input
  pub input:       InputKind,
}

/// Produces a verdict for one paper.
#[async_trait]
pub trait Analyzer: Send + Sync {
  /// Analyzes `record` from `input`.
  ///
  /// # Errors
  ///
  /// - [`AnalysisError::Fatal`] when no further paper can be analyzed in this run
  /// - [`AnalysisError::Failed`] when only this paper could not be analyzed
  async fn analyze(
    &self,
    record: &PaperRecord,
    input: &AnalysisInput,
  ) -> Result<AnalysisVerdict, AnalysisError>;
}

/// Prompt with `{title}`, `{authors}`, `{abstract}` and `{content}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl Default for PromptTemplate {
  fn default() -> Self { Self(DEFAULT_TEMPLATE.to_string()) }
}

impl PromptTemplate {
  /// Uses `template` as is.
  pub fn new(template: impl Into<String>) -> Self { Self(template.into()) }

  /// Reads a template file.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::Config`] when the file cannot be read or does not mention the
  /// `{title}` placeholder.
  pub fn from_file(path: &Path) -> Result<Self> {
    let template = std::fs::read_to_string(path).map_err(|e| {
      DailyPaperError::Config(format!("cannot read prompt template {}: {e}", path.display()))
    })?;
    if !template.contains("{title}") {
      return Err(DailyPaperError::Config(format!(
        "prompt template {} does not use the {{title}} placeholder",
        path.display()
      )));
    }
    Ok(Self(template))
  }

  /// Fills the placeholders in.
  pub fn render(&self, input: &AnalysisInput) -> String {
    let content = input.content.as_deref().unwrap_or(NO_CONTENT);
    self
      .0
      .replace("{title}", &input.title)
      .replace("{authors}", &input.authors)
      .replace("{abstract}", &input.abstract_text)
      .replace("{content}", content)
  }
}

/// [`Analyzer`] backed by an OpenAI-compatible chat completions endpoint.
pub struct ChatAnalyzer {
  /// HTTP client carrying the request timeout
  client:      reqwest::Client,
  /// Completions endpoint
  url:         Url,
  /// Model name
  model:       String,
  /// Bearer token
  api_key:     String,
  /// Sampling temperature
  temperature: Option<f32>,
  /// Prompt template
  template:    PromptTemplate,
  /// Retry policy applied to each request
  retry:       RetryPolicy,
}

impl ChatAnalyzer {
  /// Creates an analyzer from its configuration and credential.
  ///
  /// # Errors
  ///
  /// Fails on an unparseable base URL, an empty credential, or an unreadable template file.
  pub fn new(config: &AnalysisConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
    if api_key.trim().is_empty() {
      return Err(DailyPaperError::Config(format!(
        "the analysis credential ({}) is empty",
        config.api_key_env
      )));
    }
    let template = match &config.template_path {
      Some(path) => PromptTemplate::from_file(path)?,
      None => PromptTemplate::default(),
    };
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("dailypaper/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self {
      client,
      url: endpoint_url(&config.base_url)?,
      model: config.model.clone(),
      api_key,
      temperature: config.temperature,
      template,
      retry,
    })
  }

  /// Replaces the prompt template.
  pub fn with_template(mut self, template: PromptTemplate) -> Self {
    self.template = template;
    self
  }
}

#[async_trait]
impl Analyzer for ChatAnalyzer {
  async fn analyze(
    &self,
    record: &PaperRecord,
    input: &AnalysisInput,
  ) -> Result<AnalysisVerdict, AnalysisError> {
    let prompt = self.template.render(input);
    let request = ChatRequest::new()
      .with_url(self.url.clone())
      .with_api_key(&self.api_key)
      .with_model(&self.model)
      .with_temperature(self.temperature)
      .with_system(SYSTEM_PROMPT)
      .with_message(&prompt);
    let label = format!("analysis of {}", record.identifier);

    let response = self
      .retry
      .run(&label, |_| {
        let (request, client) = (&request, &self.client);
        async move { request.send(client).await.map_err(classify) }
      })
      .await
      .map_err(|failure| match failure {
        Failure::Exhausted { attempts, last } => AnalysisError::Failed(format!(
          "giving up after {attempts} attempt(s): {}",
          match last {
            AnalysisError::Failed(reason) | AnalysisError::Fatal(reason) => reason,
          }
        )),
        Failure::Permanent(e) => e,
      })?;

    let text = response
      .content()
      .ok_or_else(|| AnalysisError::Failed("the response has no choices".into()))?;
    let verdict = parse_verdict(&record.identifier, text, input.kind())?;
    debug!(
      "Analyzed {} from {}: relevant={} tags={:?}",
      record.identifier, verdict.input, verdict.relevant, verdict.tags
    );
    Ok(verdict)
  }
}

/// Sorts a chat failure into retry, skip-the-paper, or stop-the-run.
fn classify(error: ChatError) -> Attempt<AnalysisError> {
  match error {
    ChatError::Request(e) => Attempt::Permanent(AnalysisError::Fatal(e.to_string())),
    ChatError::Transport(e) if e.is_builder() =>
      Attempt::Permanent(AnalysisError::Fatal(e.to_string())),
    ChatError::Transport(e) => Attempt::Transient(AnalysisError::Failed(e.to_string()), None),
    ChatError::Status { status, body, retry_after } => {
      let reason = format!("HTTP {status}: {}", excerpt(&body));
      match status {
        401 | 402 | 403 => Attempt::Permanent(AnalysisError::Fatal(reason)),
        429 if body.to_lowercase().contains("quota") =>
          Attempt::Permanent(AnalysisError::Fatal(reason)),
        408 | 429 | 500..=599 => Attempt::Transient(AnalysisError::Failed(reason), retry_after),
        _ => Attempt::Permanent(AnalysisError::Failed(reason)),
      }
    },
    ChatError::Decode(e) =>
      Attempt::Permanent(AnalysisError::Failed(format!("malformed response: {e}"))),
  }
}

/// First characters of a response body, for error messages.
fn excerpt(body: &str) -> String {
  let body = normalize_whitespace(body);
  match body.char_indices().nth(200) {
    Some((end, _)) => format!("{}...", &body[..end]),
    None => body,
  }
}

/// Parses the service's answer for paper `identifier`.
///
/// Keys are matched case-insensitively at the start of a line; the summary may continue on the
/// following lines. Unknown lines before the summary are ignored.
///
/// # Errors
///
/// Returns [`AnalysisError::Failed`] when `is_interested` is missing or neither `yes` nor `no`.
pub fn parse_verdict(
  identifier: &str,
  text: &str,
  input: InputKind,
) -> Result<AnalysisVerdict, AnalysisError> {
  let mut tags = Tags::default();
  let mut institution = String::new();
  let mut interested: Option<String> = None;
  let mut summary: Vec<&str> = Vec::new();
  let mut in_summary = false;

  for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
    let (key, value) = match line.split_once(':') {
      Some((key, value)) => (key.trim().to_lowercase(), value.trim()),
      None => (String::new(), line),
    };
    match key.as_str() {
      "tag1" => tags.primary = value.to_string(),
      "tag2" => tags.secondary = value.to_string(),
      "tag3" =>
        tags.keywords = value
          .split(',')
          .map(str::trim)
          .filter(|keyword| !keyword.is_empty())
          .map(String::from)
          .collect(),
      "institution" => institution = value.to_string(),
      "is_interested" => interested = Some(value.to_lowercase()),
      "llm_summary" => {
        in_summary = true;
        if !value.is_empty() {
          summary.push(value);
        }
      },
      _ if in_summary => summary.push(line),
      _ => trace!("Ignoring line of the analysis of {identifier}: {line}"),
    }
  }

  let relevant = match interested.as_deref().map(|v| v.trim_end_matches(['.', '!'])) {
    Some("yes") => true,
    Some("no") => false,
    Some(other) =>
      return Err(AnalysisError::Failed(format!("invalid is_interested value {other:?}"))),
    None => return Err(AnalysisError::Failed("the response has no is_interested line".into())),
  };

  Ok(AnalysisVerdict {
    identifier: identifier.to_string(),
    relevant,
    tags,
    institution,
    summary: summary.join(" "),
    input,
  })
}
