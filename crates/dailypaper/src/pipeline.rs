//! The run of one date, end to end.
//!
//! A run moves through a fixed sequence of stages:
//!
//! ```text
//! Collecting -> Deduplicating -> Processing -> Assembling -> Done
//!      \              \               \              \
//!       +--------------+---------------+--------------+--> Aborted(reason)
//! ```
//!
//! Run-wide failures abort the run and come back as [`DailyPaperError::Run`], carrying the stage
//! and date. A fatal analysis condition does not discard the work done so far: the report is still
//! assembled and committed with the verdicts obtained, and the run ends as
//! [`RunStage::Aborted`]`(`[`AbortReason::AnalysisFatal`]`)` with [`RunSummary::fatal`] set.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dailypaper::{
//!   analysis::ChatAnalyzer, catalog::ArxivCatalog, config::Config, pdf::PdfFetcher,
//!   pipeline::Pipeline, state::StateStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let pipeline = Pipeline::builder()
//!   .with_catalog(Arc::new(ArxivCatalog::new(config.catalog.clone(), config.retry.clone())?))
//!   .with_fetcher(Arc::new(PdfFetcher::new(config.fetch.clone(), config.retry.clone())?))
//!   .with_analyzer(Arc::new(ChatAnalyzer::new(&config.analysis, "sk-...".into(), config.retry)?))
//!   .with_store(StateStore::open("state.db").await?)
//!   .with_categories(["cs.DC"])
//!   .with_concurrency(4)
//!   .build()?;
//!
//! for summary in pipeline.run_dates(&Pipeline::parse_dates("2024-01-15:2024-01-17")?).await.summaries {
//!   println!("{}: {}", summary.date, summary.counts);
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
  analysis::{Analyzer, ChatAnalyzer},
  catalog::{parse_date, ArxivCatalog, Catalog, ListingQuery},
  config::{Config, ReportConfig},
  coordinator::Coordinator,
  dedup::filter_processed,
  pdf::{DocumentSource, PdfFetcher},
  report::{DailyReport, ReportAssembler, RunCounts},
  state::StateStore,
};

use super::*;

/// Why a run ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
  /// The date or the categories were rejected.
  InvalidQuery,
  /// The catalog could not be reached.
  CatalogUnavailable,
  /// The report or the state could not be written.
  PersistenceFailed,
  /// The analysis service refused to go on.
  AnalysisFatal,
  /// Any other run-wide failure.
  Internal,
}

impl AbortReason {
  /// Reason matching a run-wide error.
  pub fn of(error: &DailyPaperError) -> Self {
    match error.root() {
      DailyPaperError::InvalidQuery(_) => AbortReason::InvalidQuery,
      DailyPaperError::CatalogUnavailable { .. } => AbortReason::CatalogUnavailable,
      DailyPaperError::PersistenceFailed { .. } => AbortReason::PersistenceFailed,
      _ => AbortReason::Internal,
    }
  }
}

impl Display for AbortReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let reason = match self {
      AbortReason::InvalidQuery => "invalid query",
      AbortReason::CatalogUnavailable => "catalog unavailable",
      AbortReason::PersistenceFailed => "persistence failed",
      AbortReason::AnalysisFatal => "analysis fatal",
      AbortReason::Internal => "internal error",
    };
    write!(f, "{reason}")
  }
}

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
  /// Listing the candidates from the catalog
  Collecting,
  /// Removing candidates already recorded for the date
  Deduplicating,
  /// Fetching and analyzing candidates
  Processing,
  /// Building, writing and recording the report
  Assembling,
  /// Finished normally
  Done,
  /// Finished early
  Aborted(AbortReason),
}

impl RunStage {
  /// Whether the run may move from `self` to `next`.
  pub fn can_advance_to(self, next: RunStage) -> bool {
    use RunStage::*;
    matches!(
      (self, next),
      (Collecting, Deduplicating)
        | (Deduplicating, Processing)
        | (Processing, Assembling)
        | (Assembling, Done)
        | (Collecting | Deduplicating | Processing | Assembling, Aborted(_))
    )
  }

  /// Whether the run is over.
  pub fn is_terminal(self) -> bool { matches!(self, RunStage::Done | RunStage::Aborted(_)) }
}

impl Display for RunStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RunStage::Collecting => write!(f, "collecting"),
      RunStage::Deduplicating => write!(f, "deduplicating"),
      RunStage::Processing => write!(f, "processing"),
      RunStage::Assembling => write!(f, "assembling"),
      RunStage::Done => write!(f, "done"),
      RunStage::Aborted(reason) => write!(f, "aborted ({reason})"),
    }
  }
}

/// Stage tracker of one run.
#[derive(Debug)]
struct Run {
  /// Target date
  date:  NaiveDate,
  /// Current stage
  stage: RunStage,
}

impl Run {
  /// Starts a run in [`RunStage::Collecting`].
  fn start(date: NaiveDate) -> Self {
    info!("Run for {date}: {}", RunStage::Collecting);
    Self { date, stage: RunStage::Collecting }
  }

  /// Moves to `next`, refusing transitions the stage graph does not have.
  fn advance(&mut self, next: RunStage) -> Result<()> {
    if !self.stage.can_advance_to(next) {
      return Err(DailyPaperError::InvalidTransition { from: self.stage, to: next });
    }
    debug!("Run for {}: {} -> {next}", self.date, self.stage);
    if let RunStage::Aborted(_) = next {
      warn!("Run for {}: {next} during {}", self.date, self.stage);
    } else {
      info!("Run for {}: {next}", self.date);
    }
    self.stage = next;
    Ok(())
  }
}

/// What a run for one date did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
  /// Target date
  pub date:        NaiveDate,
  /// Counters of this run
  pub counts:      RunCounts,
  /// Entries in the written report
  pub entries:     usize,
  /// Papers recorded for the date in total
  pub recorded:    usize,
  /// Report file written
  pub report_path: PathBuf,
  /// Final stage: [`RunStage::Done`], or aborted on a fatal analysis condition
  pub stage:       RunStage,
  /// The fatal analysis error that halted processing, if any
  pub fatal:       Option<AnalysisError>,
}

/// What [`Pipeline::run_dates`] did over its dates.
#[derive(Debug)]
pub struct Backfill {
  /// Summaries of the dates that ran to a committed report, in date order
  pub summaries: Vec<RunSummary>,
  /// The error that aborted the last date started, if any
  pub aborted:   Option<DailyPaperError>,
}

impl Backfill {
  /// The first summary halted by a fatal analysis condition.
  pub fn fatal(&self) -> Option<&RunSummary> {
    self.summaries.iter().find(|summary| summary.fatal.is_some())
  }
}

/// The assembled pipeline.
pub struct Pipeline {
  /// Listing source
  catalog:     Arc<dyn Catalog>,
  /// Worker pool
  coordinator: Coordinator,
  /// Dedup index
  store:       StateStore,
  /// Report writer
  assembler:   ReportAssembler,
  /// Categories listed on every run
  categories:  Vec<String>,
  /// Cap on candidates per date
  max_papers:  Option<usize>,
}

/// Builder for [`Pipeline`]. Catalog, fetcher, analyzer and store are required.
pub struct PipelineBuilder {
  /// Listing source
  catalog:     Option<Arc<dyn Catalog>>,
  /// Document source
  fetcher:     Option<Arc<dyn DocumentSource>>,
  /// Analyzer
  analyzer:    Option<Arc<dyn Analyzer>>,
  /// State store
  store:       Option<StateStore>,
  /// Report settings
  report:      ReportConfig,
  /// Categories listed on every run
  categories:  Vec<String>,
  /// Maximum number of papers in flight
  concurrency: usize,
  /// Cap on candidates per date
  max_papers:  Option<usize>,
}

impl Default for PipelineBuilder {
  fn default() -> Self {
    let config = Config::default();
    Self {
      catalog:     None,
      fetcher:     None,
      analyzer:    None,
      store:       None,
      report:      config.report,
      categories:  config.catalog.categories,
      concurrency: config.pipeline.concurrency,
      max_papers:  config.pipeline.max_papers,
    }
  }
}

impl PipelineBuilder {
  /// Sets the listing source.
  pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
    self.catalog = Some(catalog);
    self
  }

  /// Sets the document source.
  pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentSource>) -> Self {
    self.fetcher = Some(fetcher);
    self
  }

  /// Sets the analyzer.
  pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
    self.analyzer = Some(analyzer);
    self
  }

  /// Sets the state store.
  pub fn with_store(mut self, store: StateStore) -> Self {
    self.store = Some(store);
    self
  }

  /// Sets the report settings.
  pub fn with_report_config(mut self, report: ReportConfig) -> Self {
    self.report = report;
    self
  }

  /// Sets the categories listed on every run.
  pub fn with_categories<I, S>(mut self, categories: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    self.categories = categories.into_iter().map(Into::into).collect();
    self
  }

  /// Sets the maximum number of papers in flight.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// Caps the number of candidates per date.
  pub fn with_max_papers(mut self, max_papers: Option<usize>) -> Self {
    self.max_papers = max_papers;
    self
  }

  /// Assembles the pipeline.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::Config`] when a component is missing or the concurrency is zero.
  pub fn build(self) -> Result<Pipeline> {
    let missing = |what: &str| DailyPaperError::Config(format!("pipeline has no {what}"));
    if self.concurrency == 0 {
      return Err(DailyPaperError::Config("concurrency must be at least 1".into()));
    }
    let store = self.store.ok_or_else(|| missing("state store"))?;
    let coordinator = Coordinator::new(
      self.fetcher.ok_or_else(|| missing("document source"))?,
      self.analyzer.ok_or_else(|| missing("analyzer"))?,
      self.concurrency,
    );
    Ok(Pipeline {
      catalog: self.catalog.ok_or_else(|| missing("catalog"))?,
      coordinator,
      assembler: ReportAssembler::new(&self.report, store.clone()),
      store,
      categories: self.categories,
      max_papers: self.max_papers,
    })
  }
}

impl Pipeline {
  /// Starts building a pipeline from the default settings.
  pub fn builder() -> PipelineBuilder { PipelineBuilder::default() }

  /// Builds the production pipeline described by `config`, authenticating with `api_key`.
  pub async fn from_config(config: &Config, api_key: String) -> Result<Self> {
    config.validate()?;
    let catalog = ArxivCatalog::new(config.catalog.clone(), config.retry.clone())?;
    let fetcher = PdfFetcher::new(config.fetch.clone(), config.retry.clone())?;
    let analyzer = ChatAnalyzer::new(&config.analysis, api_key, config.retry.clone())?;
    let store = StateStore::open(config.state_path()).await?;
    Self::builder()
      .with_catalog(Arc::new(catalog))
      .with_fetcher(Arc::new(fetcher))
      .with_analyzer(Arc::new(analyzer))
      .with_store(store)
      .with_report_config(config.report.clone())
      .with_categories(config.catalog.categories.clone())
      .with_concurrency(config.pipeline.concurrency)
      .with_max_papers(config.pipeline.max_papers)
      .build()
  }

  /// Parses `YYYY-MM-DD` or an inclusive `START:END` range into ascending dates.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::InvalidQuery`] for malformed dates or a range ending before it
  /// starts.
  pub fn parse_dates(input: &str) -> Result<Vec<NaiveDate>> {
    let Some((start, end)) = input.split_once(':') else {
      return Ok(vec![parse_date(input)?]);
    };
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    if end < start {
      return Err(DailyPaperError::InvalidQuery(format!("range {input:?} ends before it starts")));
    }
    Ok(start.iter_days().take_while(|day| *day <= end).collect())
  }

  /// Runs the pipeline for `date`.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::Run`] when the run aborts. A fatal analysis condition is not an
  /// error: it is reported through [`RunSummary::fatal`].
  pub async fn run_date(&self, date: NaiveDate) -> Result<RunSummary> {
    let mut run = Run::start(date);
    match self.run_stages(&mut run).await {
      Ok(summary) => Ok(summary),
      Err(e) => {
        let stage = run.stage;
        if !stage.is_terminal() {
          // Aborting is allowed from every non-terminal stage.
          let _ = run.advance(RunStage::Aborted(AbortReason::of(&e)));
        }
        error!("Run for {date} aborted during {stage}: {e}");
        Err(e.at(stage, date))
      },
    }
  }

  /// Runs the pipeline for each of `dates`, in order.
  ///
  /// Stops at the first aborted run, and after the first run halted by a fatal analysis
  /// condition; the remaining dates are not started. The summaries of the dates committed before
  /// an abort are kept in the returned [`Backfill`].
  pub async fn run_dates(&self, dates: &[NaiveDate]) -> Backfill {
    let mut summaries = Vec::with_capacity(dates.len());
    for (index, date) in dates.iter().enumerate() {
      let summary = match self.run_date(*date).await {
        Ok(summary) => summary,
        Err(e) => {
          let remaining = dates.len() - index - 1;
          if remaining > 0 {
            warn!("Not starting the remaining {remaining} date(s) after the abort");
          }
          return Backfill { summaries, aborted: Some(e) };
        },
      };
      let halted = summary.fatal.is_some();
      summaries.push(summary);
      if halted {
        let remaining = dates.len() - index - 1;
        if remaining > 0 {
          warn!("Analysis cannot continue, not starting the remaining {remaining} date(s)");
        }
        break;
      }
    }
    Backfill { summaries, aborted: None }
  }

  /// The stages of a run, leaving `run` at the stage reached.
  async fn run_stages(&self, run: &mut Run) -> Result<RunSummary> {
    let date = run.date;
    let query = ListingQuery::for_date(date, self.categories.iter().cloned())?
      .with_max_results(self.max_papers);
    let listed = self.catalog.list(&query).await?;
    let listing: Vec<String> = listed.iter().map(|paper| paper.identifier.clone()).collect();
    info!("{} candidate(s) listed for {date}", listing.len());

    run.advance(RunStage::Deduplicating)?;
    let prior = self.store.load(date).await?;
    let candidates = filter_processed(listed, &prior.identifiers());
    info!(
      "{} candidate(s) to process, {} already recorded for {date}",
      candidates.len(),
      prior.papers.len()
    );

    run.advance(RunStage::Processing)?;
    let processed = self.coordinator.process(candidates).await;

    run.advance(RunStage::Assembling)?;
    let (report, fresh) = DailyReport::assemble(
      date,
      &listing,
      prior,
      &processed.outcomes,
      self.assembler.include(),
    );
    let report_path = self.assembler.commit(&report, &fresh).await?;

    match &processed.fatal {
      Some(_) => run.advance(RunStage::Aborted(AbortReason::AnalysisFatal))?,
      None => run.advance(RunStage::Done)?,
    }
    info!("Run for {date}: {}", report.counts);

    Ok(RunSummary {
      date,
      counts: report.counts,
      entries: report.entries.len(),
      recorded: report.recorded,
      report_path,
      stage: run.stage,
      fatal: processed.fatal,
    })
  }
}
