use dailypaper::{analysis::ChatAnalyzer, config::AnalysisConfig};
use serde_json::json;

use super::*;

const ANSWER: &str = "tag1: mlsys
tag2: LLM inference
tag3: speculative decoding, KV cache
institution: Example University
is_interested: yes
llm_summary: Faster decoding for large models.";

fn completion(content: &str) -> ResponseTemplate {
  ResponseTemplate::new(200).set_body_json(json!({
    "model": "test-model",
    "choices": [{
      "index": 0,
      "message": { "role": "assistant", "content": content },
      "finish_reason": "stop"
    }],
    "usage": { "prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160 }
  }))
}

fn analyzer(server: &MockServer) -> ChatAnalyzer {
  let config = AnalysisConfig {
    base_url: server.uri(),
    model: "test-model".into(),
    ..AnalysisConfig::default()
  };
  ChatAnalyzer::new(&config, "sk-test".into(), RetryPolicy::immediate(3)).unwrap()
}

async fn analyze(server: &MockServer) -> std::result::Result<AnalysisVerdict, AnalysisError> {
  let record = paper("2401.00001");
  let input =
    AnalysisInput::from_content(&record, FetchedContent::Text("page one".into())).unwrap();
  analyzer(server).analyze(&record, &input).await
}

#[tokio::test]
async fn test_verdict_from_completion() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/chat/completions"))
    .and(header("authorization", "Bearer sk-test"))
    .respond_with(completion(ANSWER))
    .expect(1)
    .mount(&server)
    .await;

  let verdict = analyze(&server).await.unwrap();

  assert_eq!(verdict.identifier, "2401.00001");
  assert!(verdict.relevant);
  assert_eq!(verdict.tags.secondary, "LLM inference");
  assert_eq!(verdict.institution, "Example University");
  assert_eq!(verdict.summary, "Faster decoding for large models.");
  assert_eq!(verdict.input, InputKind::FullText);
}

#[tokio::test]
async fn test_rejected_credential_is_fatal() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
    .expect(1)
    .mount(&server)
    .await;

  let error = analyze(&server).await.unwrap_err();

  assert!(error.is_fatal());
  assert!(error.to_string().contains("401"), "{error}");
}

#[tokio::test]
async fn test_exhausted_quota_is_fatal() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(
      ResponseTemplate::new(429).set_body_string(r#"{"error":"You exceeded your current quota"}"#),
    )
    .expect(1)
    .mount(&server)
    .await;

  assert!(analyze(&server).await.unwrap_err().is_fatal());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
    .up_to_n_times(1)
    .with_priority(1)
    .expect(1)
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .respond_with(completion(ANSWER))
    .with_priority(2)
    .expect(1)
    .mount(&server)
    .await;

  assert!(analyze(&server).await.unwrap().relevant);
}

#[tokio::test]
async fn test_server_errors_fail_the_paper_only() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(500))
    .expect(3)
    .mount(&server)
    .await;

  let error = analyze(&server).await.unwrap_err();

  assert!(!error.is_fatal());
  assert!(error.to_string().contains("giving up after 3 attempt(s)"), "{error}");
}

#[tokio::test]
async fn test_malformed_answers_fail_the_paper() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(completion("tag1: sys\nllm_summary: no verdict here"))
    .expect(1)
    .mount(&server)
    .await;

  assert!(matches!(analyze(&server).await, Err(AnalysisError::Failed(_))));
}

#[tokio::test]
async fn test_empty_choices_fail_the_paper() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
    .expect(1)
    .mount(&server)
    .await;

  assert!(matches!(
    analyze(&server).await,
    Err(AnalysisError::Failed(reason)) if reason.contains("no choices")
  ));
}
