use dailypaper::{
  pipeline::{AbortReason, RunStage},
  report::markdown::NO_PAPERS,
};

use super::*;

#[traced_test]
#[tokio::test]
async fn test_daily_run_with_one_broken_document() {
  let workspace = Workspace::new().await;
  let catalog = FakeCatalog::with(vec![paper("P1"), paper("P2"), paper("P3")]);
  let analyzer = FakeAnalyzer::new();
  let pipeline = workspace.pipeline(catalog, FakeSource::broken(&["P3"]), analyzer.clone(), 2);

  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert_eq!(summary.stage, RunStage::Done);
  assert_eq!(summary.counts.attempted, 3);
  assert_eq!(summary.counts.succeeded, 3);
  assert_eq!(summary.counts.failed, 0);
  assert_eq!(summary.entries, 3);
  assert!(summary.fatal.is_none());

  let report = workspace.read_report(15);
  let order = positions(&report, &["Paper P1", "Paper P2", "Paper P3"]);
  assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
  assert_eq!(report.matches("analyzed from the abstract only").count(), 1);
  assert!(report.contains("[arXiv2401]"));

  let state = workspace.store.load(date(15)).await.unwrap();
  let recorded: HashSet<String> = ["P1", "P2", "P3"].iter().map(|s| s.to_string()).collect();
  assert_eq!(state.identifiers(), recorded);
  let p3 = state.papers.iter().find(|p| p.record.identifier == "P3").unwrap();
  assert_eq!(p3.verdict.input, InputKind::AbstractOnly);
  assert!(logs_contain("Analyzing P3 from its abstract only"));
}

#[tokio::test]
async fn test_rerun_processes_nothing() {
  let workspace = Workspace::new().await;
  let catalog = FakeCatalog::with(vec![paper("P1"), paper("P2"), paper("P3")]);
  let analyzer = FakeAnalyzer::new();
  let pipeline = workspace.pipeline(catalog, Arc::new(FakeSource::default()), analyzer.clone(), 2);

  pipeline.run_date(date(15)).await.unwrap();
  let first = workspace.read_report(15);
  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert_eq!(summary.counts.attempted, 0);
  assert_eq!(summary.recorded, 3);
  assert_eq!(analyzer.call_count(), 3);
  assert_eq!(workspace.read_report(15), first);
}

#[tokio::test]
async fn test_rerun_merges_new_and_vanished_papers() {
  let workspace = Workspace::new().await;
  let catalog = FakeCatalog::with(vec![paper("P1"), paper("P2"), paper("P3")]);
  let analyzer = FakeAnalyzer::new();
  let pipeline =
    workspace.pipeline(catalog.clone(), Arc::new(FakeSource::default()), analyzer.clone(), 2);
  pipeline.run_date(date(15)).await.unwrap();

  // P4 shows up first, P1 is no longer listed.
  catalog.set(vec![paper("P4"), paper("P2"), paper("P3")]);
  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert_eq!(summary.counts.attempted, 1);
  assert_eq!(summary.recorded, 4);
  assert_eq!(analyzer.call_count(), 4);

  let report = workspace.read_report(15);
  for id in ["P1", "P2", "P3", "P4"] {
    assert_eq!(report.matches(&format!("Paper {id}**")).count(), 1, "{id} not listed once");
  }
  let order = positions(&report, &["Paper P4", "Paper P2", "Paper P3", "Paper P1"]);
  assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_empty_catalog() {
  let workspace = Workspace::new().await;
  let pipeline = workspace.pipeline(
    Arc::new(FakeCatalog::default()),
    Arc::new(FakeSource::default()),
    FakeAnalyzer::new(),
    2,
  );

  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert_eq!(summary.stage, RunStage::Done);
  assert_eq!(summary.counts.attempted, 0);
  assert_eq!(summary.entries, 0);
  assert_eq!(workspace.read_report(15), format!("# 2024-01-15\n\n{NO_PAPERS}\n"));
}

#[traced_test]
#[tokio::test]
async fn test_fatal_on_third_of_ten() {
  let workspace = Workspace::new().await;
  let papers: Vec<PaperRecord> = (1..=10).map(|n| paper(&format!("P{n:02}"))).collect();
  let analyzer = FakeAnalyzer::fatal_on(3);
  let pipeline = workspace.pipeline(
    FakeCatalog::with(papers),
    Arc::new(FakeSource::default()),
    analyzer.clone(),
    1,
  );

  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert!(matches!(summary.fatal, Some(AnalysisError::Fatal(_))));
  assert_eq!(summary.stage, RunStage::Aborted(AbortReason::AnalysisFatal));
  assert_eq!(summary.counts.succeeded, 2);
  assert_eq!(summary.counts.failed, 1);
  assert_eq!(summary.counts.skipped, 7);
  assert_eq!(analyzer.call_count(), 3);

  let state = workspace.store.load(date(15)).await.unwrap();
  let recorded: Vec<&str> = state.papers.iter().map(|p| p.record.identifier.as_str()).collect();
  assert_eq!(recorded, ["P01", "P02"]);
  assert!(workspace.read_report(15).contains("Paper P02"));
  assert!(logs_contain("7 paper(s) skipped"));
}

#[traced_test]
#[tokio::test]
async fn test_fatal_lets_papers_in_flight_finish() {
  let workspace = Workspace::new().await;
  let papers: Vec<PaperRecord> = (1..=10).map(|n| paper(&format!("P{n:02}"))).collect();
  let slow = Duration::from_millis(200);
  let analyzer = Arc::new(FakeAnalyzer {
    fatal_on_call: Some(3),
    delays: HashMap::from([("P01".to_string(), slow), ("P02".to_string(), slow)]),
    ..FakeAnalyzer::default()
  });
  let pipeline = workspace.pipeline(
    FakeCatalog::with(papers),
    Arc::new(FakeSource::default()),
    analyzer.clone(),
    3,
  );

  let summary = pipeline.run_date(date(15)).await.unwrap();

  // P03 fails at once while P01 and P02 are still being analyzed.
  assert_eq!(summary.stage, RunStage::Aborted(AbortReason::AnalysisFatal));
  assert_eq!(summary.counts.attempted, 10);
  assert_eq!(summary.counts.succeeded, 2);
  assert_eq!(summary.counts.failed, 1);
  assert_eq!(summary.counts.skipped, 7);
  assert_eq!(analyzer.call_count(), 3);

  let state = workspace.store.load(date(15)).await.unwrap();
  let recorded: Vec<&str> = state.papers.iter().map(|p| p.record.identifier.as_str()).collect();
  assert_eq!(recorded, ["P01", "P02"]);
  let report = workspace.read_report(15);
  assert!(report.contains("Paper P01") && report.contains("Paper P02"), "{report}");
  assert!(!report.contains("Paper P04"));
}

#[tokio::test]
async fn test_backfill_stops_after_fatal() {
  let workspace = Workspace::new().await;
  let mut later = paper("Q1");
  later.updated = "2024-01-16T09:00:00Z".parse().unwrap();
  let pipeline = workspace.pipeline(
    FakeCatalog::with(vec![paper("P1"), later]),
    Arc::new(FakeSource::default()),
    FakeAnalyzer::fatal_on(1),
    1,
  );

  let backfill = pipeline.run_dates(&[date(15), date(16)]).await;

  assert!(backfill.aborted.is_none());
  assert_eq!(backfill.summaries.len(), 1);
  assert_eq!(backfill.fatal().map(|summary| summary.date), Some(date(15)));
  assert!(!workspace.output_dir().join("2024-01-16.md").exists());
}

#[tokio::test]
async fn test_backfill_keeps_dates_committed_before_an_abort() {
  let workspace = Workspace::new().await;
  let catalog = FakeCatalog::with(vec![paper("P1")]);
  *catalog.fail_on.lock().unwrap() = Some(date(16));
  let pipeline =
    workspace.pipeline(catalog, Arc::new(FakeSource::default()), FakeAnalyzer::new(), 1);

  let backfill = pipeline.run_dates(&[date(15), date(16), date(17)]).await;

  assert_eq!(backfill.summaries.len(), 1);
  assert_eq!(backfill.summaries[0].date, date(15));
  assert_eq!(backfill.summaries[0].stage, RunStage::Done);
  assert!(matches!(
    backfill.aborted,
    Some(DailyPaperError::Run { stage: RunStage::Collecting, date: aborted, .. }) if aborted == date(16)
  ));
  assert!(workspace.read_report(15).contains("Paper P1"));
  assert!(!workspace.output_dir().join("2024-01-17.md").exists());
}

#[tokio::test]
async fn test_report_order_ignores_completion_order() {
  let workspace = Workspace::new().await;
  let ids = ["A", "B", "C", "D", "E"];
  // Earlier papers take longer, so they complete last.
  let delays = ids
    .iter()
    .enumerate()
    .map(|(i, id)| (id.to_string(), Duration::from_millis(10 * (ids.len() - i) as u64)))
    .collect();
  let analyzer = Arc::new(FakeAnalyzer { delays, ..FakeAnalyzer::default() });
  let pipeline = workspace.pipeline(
    FakeCatalog::with(ids.iter().map(|id| paper(id)).collect()),
    Arc::new(FakeSource::default()),
    analyzer.clone(),
    5,
  );

  pipeline.run_date(date(15)).await.unwrap();

  let completion: Vec<String> =
    analyzer.analyzed.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
  assert_eq!(completion.first().map(String::as_str), Some("E"));
  let report = workspace.read_report(15);
  let order = positions(&report, &["Paper A", "Paper B", "Paper C", "Paper D", "Paper E"]);
  assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_relevant_only_report_records_everything() {
  let workspace = Workspace::new().await;
  let analyzer = Arc::new(FakeAnalyzer {
    irrelevant: ["P2".to_string()].into_iter().collect(),
    ..FakeAnalyzer::default()
  });
  let pipeline = Pipeline::builder()
    .with_catalog(FakeCatalog::with(vec![paper("P1"), paper("P2")]))
    .with_fetcher(Arc::new(FakeSource::default()))
    .with_analyzer(analyzer)
    .with_store(workspace.store.clone())
    .with_report_config(ReportConfig {
      output_dir: workspace.output_dir(),
      layout:     Layout::Weekly,
      include:    Include::Relevant,
    })
    .with_categories(["cs.AI"])
    .build()
    .unwrap();

  let summary = pipeline.run_date(date(15)).await.unwrap();

  assert_eq!(summary.report_path, workspace.output_dir().join("20240115-20240121.md"));
  let report = read(&summary.report_path);
  assert!(report.starts_with("# 20240115-20240121\n\n## 2024-01-15\n"));
  assert!(report.contains("Paper P1"));
  assert!(!report.contains("Paper P2"));
  assert_eq!(workspace.store.load(date(15)).await.unwrap().papers.len(), 2);
}

#[tokio::test]
async fn test_catalog_failure_aborts_run() {
  let workspace = Workspace::new().await;
  let catalog = FakeCatalog::with(vec![paper("P1")]);
  *catalog.fail.lock().unwrap() = Some("HTTP 503".into());
  let analyzer = FakeAnalyzer::new();
  let pipeline = workspace.pipeline(catalog, Arc::new(FakeSource::default()), analyzer.clone(), 2);

  let error = pipeline.run_date(date(15)).await.unwrap_err();

  match &error {
    DailyPaperError::Run { stage, date: run_date, .. } => {
      assert_eq!(*stage, RunStage::Collecting);
      assert_eq!(*run_date, date(15));
    },
    other => panic!("expected a run error, got {other:?}"),
  }
  assert!(matches!(error.root(), DailyPaperError::CatalogUnavailable { .. }));
  assert_eq!(analyzer.call_count(), 0);
  assert!(!workspace.output_dir().join("2024-01-15.md").exists());
}

#[tokio::test]
async fn test_other_dates_are_independent() {
  let workspace = Workspace::new().await;
  let mut later = paper("P1");
  later.updated = "2024-01-16T09:00:00Z".parse().unwrap();
  let catalog = FakeCatalog::with(vec![paper("P1")]);
  let analyzer = FakeAnalyzer::new();
  let pipeline =
    workspace.pipeline(catalog.clone(), Arc::new(FakeSource::default()), analyzer.clone(), 2);

  pipeline.run_date(date(15)).await.unwrap();
  catalog.set(vec![later]);
  let summary = pipeline.run_date(date(16)).await.unwrap();

  // Recorded for the 15th only, so processed again for the 16th.
  assert_eq!(summary.counts.succeeded, 1);
  assert_eq!(analyzer.call_count(), 2);
}
