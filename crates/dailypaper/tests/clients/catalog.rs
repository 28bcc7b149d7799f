use dailypaper::{catalog::ArxivCatalog, config::CatalogConfig};

use super::*;

fn entry(id: &str, updated: &str, category: &str, summary: &str) -> String {
  format!(
    r#"<entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <updated>{updated}</updated>
    <published>2024-01-14T09:00:00Z</published>
    <title>Paper
      {id}</title>
    <summary>{summary}</summary>
    <author><name>Alice Researcher</name></author>
    <link href="http://arxiv.org/abs/{id}v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{id}v1" rel="related" type="application/pdf"/>
    <category term="{category}" scheme="http://arxiv.org/schemas/atom"/>
  </entry>"#
  )
}

fn feed(entries: &[String]) -> String {
  format!(
    r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  {}
</feed>"#,
    entries.concat()
  )
}

fn catalog(server: &MockServer, configure: impl FnOnce(&mut CatalogConfig)) -> ArxivCatalog {
  let mut config = CatalogConfig {
    base_url: format!("{}/api/query", server.uri()),
    query_interval_ms: 0,
    ..CatalogConfig::default()
  };
  configure(&mut config);
  ArxivCatalog::new(config, RetryPolicy::immediate(2)).unwrap()
}

async fn serve(server: &MockServer, query: &ListingQuery, category: &str, body: String) {
  Mock::given(method("GET"))
    .and(path("/api/query"))
    .and(query_param("search_query", query.search_query(category)))
    .respond_with(ResponseTemplate::new(200).set_body_string(body))
    .expect(1)
    .mount(server)
    .await;
}

#[tokio::test]
async fn test_listing_filters_dates_and_repeats() {
  let server = MockServer::start().await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI", "cs.DC"]).unwrap();
  serve(&server, &query, "cs.AI", feed(&[
    entry("2401.00001", "2024-01-15T10:00:00Z", "cs.AI", "First."),
    entry("2401.00002", "2024-01-16T00:30:00Z", "cs.AI", "Too late."),
    entry("2401.00003", "2024-01-15T11:00:00Z", "cs.AI", "Cross-listed."),
  ]))
  .await;
  serve(&server, &query, "cs.DC", feed(&[
    entry("2401.00003", "2024-01-15T11:00:00Z", "cs.DC", "Cross-listed."),
    entry("2401.00004", "2024-01-15T12:00:00Z", "cs.DC", "Distributed."),
  ]))
  .await;

  let papers = catalog(&server, |_| {}).list(&query).await.unwrap();

  let ids: Vec<&str> = papers.iter().map(|p| p.identifier.as_str()).collect();
  assert_eq!(ids, ["2401.00001", "2401.00003", "2401.00004"]);
  assert_eq!(papers[0].title, "Paper 2401.00001");
  assert_eq!(papers[0].version, "v1");
  assert_eq!(papers[0].pdf_url.as_deref(), Some("http://arxiv.org/pdf/2401.00001v1"));
}

#[tokio::test]
async fn test_keyword_filter_and_cap() {
  let server = MockServer::start().await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI"]).unwrap().with_max_results(Some(1));
  serve(&server, &query, "cs.AI", feed(&[
    entry("2401.00001", "2024-01-15T10:00:00Z", "cs.AI", "A dense model."),
    entry("2401.00002", "2024-01-15T10:00:00Z", "cs.AI", "Sparse attention kernels."),
    entry("2401.00003", "2024-01-15T10:00:00Z", "cs.AI", "Sparse training."),
  ]))
  .await;

  let catalog = catalog(&server, |config| {
    config.keyword_filters.insert("cs.AI".into(), vec!["sparse".into()]);
  });
  let papers = catalog.list(&query).await.unwrap();

  assert_eq!(papers.len(), 1);
  assert_eq!(papers[0].identifier, "2401.00002");
}

#[tokio::test]
async fn test_unavailable_after_retries() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(503))
    .expect(2)
    .mount(&server)
    .await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI"]).unwrap();

  let result = catalog(&server, |_| {}).list(&query).await;

  match result {
    Err(DailyPaperError::CatalogUnavailable { attempts, reason }) => {
      assert_eq!(attempts, 2);
      assert!(reason.contains("503"), "{reason}");
    },
    other => panic!("expected an unavailable catalog, got {other:?}"),
  }
}

#[tokio::test]
async fn test_rejected_query_is_not_retried() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(400).set_body_string("bad search_query"))
    .expect(1)
    .mount(&server)
    .await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI"]).unwrap();

  let result = catalog(&server, |_| {}).list(&query).await;

  assert!(matches!(result, Err(DailyPaperError::InvalidQuery(reason)) if reason.contains("bad")));
}

#[tokio::test]
async fn test_error_feed_is_invalid_query() {
  let server = MockServer::start().await;
  let body = feed(&[r#"<entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format</id>
    <title>Error</title>
    <summary>malformed search query</summary>
  </entry>"#
    .to_string()]);
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_string(body))
    .expect(1)
    .mount(&server)
    .await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI"]).unwrap();

  let result = catalog(&server, |_| {}).list(&query).await;

  assert!(matches!(
    result,
    Err(DailyPaperError::InvalidQuery(reason)) if reason.contains("malformed search query")
  ));
}

#[tokio::test]
async fn test_empty_listing() {
  let server = MockServer::start().await;
  let query = ListingQuery::new("2024-01-15", ["cs.AI"]).unwrap();
  serve(&server, &query, "cs.AI", feed(&[])).await;

  assert!(catalog(&server, |_| {}).list(&query).await.unwrap().is_empty());
}
