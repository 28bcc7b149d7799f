use dailypaper::{
  config::FetchConfig,
  pdf::{extract_text, PdfFetcher},
};

use super::*;

async fn fetch(server: &MockServer) -> FetchedContent {
  let mut record = paper("2401.00001");
  record.pdf_url = Some(format!("{}/pdf/2401.00001v1", server.uri()));
  let fetcher = PdfFetcher::new(FetchConfig::default(), RetryPolicy::immediate(3)).unwrap();
  fetcher.fetch(&record).await
}

#[tokio::test]
async fn test_fetch_extracts_text() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/pdf/2401.00001v1"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(sample_pdf("Hello World!")))
    .expect(1)
    .mount(&server)
    .await;

  match fetch(&server).await {
    FetchedContent::Text(text) => assert!(text.contains("Hello World!"), "{text}"),
    other => panic!("expected text, got {other:?}"),
  }
}

#[tokio::test]
async fn test_missing_document_is_not_retried() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(404))
    .expect(1)
    .mount(&server)
    .await;

  assert!(matches!(
    fetch(&server).await,
    FetchedContent::Unavailable(FetchError::FetchFailed(reason)) if reason.contains("404")
  ));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(502))
    .expect(3)
    .mount(&server)
    .await;

  assert!(matches!(
    fetch(&server).await,
    FetchedContent::Unavailable(FetchError::FetchFailed(_))
  ));
}

#[tokio::test]
async fn test_unreadable_document() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>not a pdf</html>".to_vec()))
    .expect(1)
    .mount(&server)
    .await;

  let content = fetch(&server).await;

  assert!(matches!(content, FetchedContent::Unavailable(FetchError::ExtractFailed(_))));
  // The pipeline falls back to the abstract.
  let input = AnalysisInput::from_content(&paper("2401.00001"), content).unwrap();
  assert_eq!(input.kind(), InputKind::AbstractOnly);
}

#[test]
fn test_extract_first_page() {
  let text = extract_text(&sample_pdf("Hello World!"), 1, 4096).unwrap();
  assert!(text.contains("Hello World!"));
}

#[test]
fn test_extract_truncates() {
  let text = extract_text(&sample_pdf("Hello World!"), 1, 5).unwrap();
  assert_eq!(text, "Hello");
}

#[test]
fn test_corrupt_document() {
  let result = extract_text(b"%PDF-1.5 definitely not a pdf", 1, 4096);
  assert!(matches!(result, Err(FetchError::ExtractFailed(_))));
}
