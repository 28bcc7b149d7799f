//! Report assembly and persistence.
//!
//! A [`DailyReport`] is rebuilt from scratch on every run: the verdicts recorded by earlier runs
//! for the date are merged with the verdicts of this run, ordered after the current listing, and
//! filtered according to [`Include`]. [`ReportAssembler::commit`] then writes the markdown file
//! atomically and only afterwards records the new verdicts in the state store, so a crash in
//! between leads to papers being analyzed again rather than lost.

use super::*;
use crate::{
  analysis::AnalysisVerdict,
  config::ReportConfig,
  coordinator::{PaperOutcome, PaperStatus},
  state::{DateState, RecordedPaper, StateStore},
};

pub mod markdown;

/// How report files are organized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
  /// One `YYYY-MM-DD.md` file per date.
  #[default]
  Daily,
  /// One `YYYYMMDD-YYYYMMDD.md` file per Monday-to-Sunday week, with a section per date.
  Weekly,
}

/// Which analyzed papers appear in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
  /// Only papers judged relevant.
  #[default]
  Relevant,
  /// Every analyzed paper.
  All,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
  /// Candidates handed to the worker pool
  pub attempted: usize,
  /// Candidates analyzed
  pub succeeded: usize,
  /// Candidates that could not be analyzed
  pub failed:    usize,
  /// Candidates never started because the run was halted
  pub skipped:   usize,
}

impl RunCounts {
  /// Counts the statuses of `outcomes`.
  pub fn from_outcomes(outcomes: &[PaperOutcome]) -> Self {
    let mut counts = Self { attempted: outcomes.len(), ..Self::default() };
    for outcome in outcomes {
      match outcome.status {
        PaperStatus::Analyzed(_) => counts.succeeded += 1,
        PaperStatus::Failed(_) => counts.failed += 1,
        PaperStatus::Skipped => counts.skipped += 1,
      }
    }
    counts
  }
}

impl Display for RunCounts {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} attempted, {} succeeded, {} failed, {} skipped",
      self.attempted, self.succeeded, self.failed, self.skipped
    )
  }
}

/// The report of one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReport {
  /// Target date
  pub date:     NaiveDate,
  /// Entries to render, in report order
  pub entries:  Vec<RecordedPaper>,
  /// Counters of this run
  pub counts:   RunCounts,
  /// Papers recorded for the date once this run is committed, relevant or not
  pub recorded: usize,
}

impl DailyReport {
  /// Builds the report of `date`.
  ///
  /// - `listing`: identifiers of the full catalog listing of this run, before deduplication
  /// - `prior`: what earlier runs recorded for the date
  /// - `outcomes`: this run's outcomes
  ///
  /// Entries are ordered by position in `listing`, then by recording order for papers no longer
  /// listed. Returns the report together with the papers this run adds to the state.
  pub fn assemble(
    date: NaiveDate,
    listing: &[String],
    prior: DateState,
    outcomes: &[PaperOutcome],
    include: Include,
  ) -> (Self, Vec<RecordedPaper>) {
    let fresh: Vec<RecordedPaper> = outcomes
      .iter()
      .filter_map(|outcome| {
        outcome
          .verdict()
          .map(|verdict| RecordedPaper { record: outcome.record.clone(), verdict: verdict.clone() })
      })
      .collect();

    // Recording order: earlier runs first, then this run in candidate order.
    let mut by_id: BTreeMap<String, RecordedPaper> = BTreeMap::new();
    let mut recorded_order: Vec<String> = Vec::new();
    for paper in prior.papers.into_iter().chain(fresh.iter().cloned()) {
      let identifier = paper.record.identifier.clone();
      if by_id.insert(identifier.clone(), paper).is_none() {
        recorded_order.push(identifier);
      }
    }
    let recorded = by_id.len();

    let mut placed = HashSet::new();
    let mut entries = Vec::with_capacity(recorded);
    for identifier in listing.iter().chain(recorded_order.iter()) {
      if !placed.insert(identifier.as_str()) {
        continue;
      }
      if let Some(paper) = by_id.get(identifier) {
        if include == Include::All || paper.verdict.relevant {
          entries.push(paper.clone());
        }
      }
    }

    let report = Self { date, entries, counts: RunCounts::from_outcomes(outcomes), recorded };
    (report, fresh)
  }

  /// Verdicts of the rendered entries.
  pub fn verdicts(&self) -> impl Iterator<Item = &AnalysisVerdict> {
    self.entries.iter().map(|entry| &entry.verdict)
  }
}

/// Writes report files and records the verdicts they contain.
#[derive(Clone)]
pub struct ReportAssembler {
  /// Directory receiving the markdown files
  output_dir: PathBuf,
  /// File organization
  layout:     Layout,
  /// Which papers are listed
  include:    Include,
  /// State store receiving the new verdicts
  store:      StateStore,
}

impl ReportAssembler {
  /// Creates an assembler writing under `config.output_dir`.
  pub fn new(config: &ReportConfig, store: StateStore) -> Self {
    Self {
      output_dir: config.output_dir.clone(),
      layout: config.layout,
      include: config.include,
      store,
    }
  }

  /// Entry filter in effect.
  pub fn include(&self) -> Include { self.include }

  /// The file the report of `date` goes to.
  pub fn path_for(&self, date: NaiveDate) -> PathBuf {
    match self.layout {
      Layout::Daily => self.output_dir.join(format!("{date}.md")),
      Layout::Weekly => self.output_dir.join(format!("{}.md", markdown::week_range(date))),
    }
  }

  /// Writes the report file, then records `fresh` in the state store.
  ///
  /// # Errors
  ///
  /// Returns [`DailyPaperError::PersistenceFailed`] when either write fails. When the report was
  /// written but the state was not, the papers of `fresh` will be analyzed again on the next run.
  pub async fn commit(&self, report: &DailyReport, fresh: &[RecordedPaper]) -> Result<PathBuf> {
    let path = self.path_for(report.date);
    self.write_report(&path, report).await.map_err(|e| e.persisting("report"))?;
    info!("Wrote {} entr(y/ies) to {}", report.entries.len(), path.display());

    self.store.record(report.date, fresh).await.map_err(|e| {
      error!(
        "Report {} written but {} verdict(s) could not be recorded: {e}",
        path.display(),
        fresh.len()
      );
      e.persisting("state")
    })?;
    Ok(path)
  }

  /// Renders `report` for the configured layout and atomically replaces `path` with it.
  async fn write_report(&self, path: &Path, report: &DailyReport) -> Result<()> {
    tokio::fs::create_dir_all(&self.output_dir).await?;
    let content = match self.layout {
      Layout::Daily => markdown::render_daily(report),
      Layout::Weekly => {
        let existing = match tokio::fs::read_to_string(path).await {
          Ok(existing) => existing,
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
          Err(e) => return Err(e.into()),
        };
        markdown::merge_section(&existing, report)
      },
    };

    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .ok_or_else(|| DailyPaperError::Config(format!("invalid report path {}", path.display())))?;
    let temporary = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&temporary, content).await?;
    if let Err(e) = tokio::fs::rename(&temporary, path).await {
      let _ = tokio::fs::remove_file(&temporary).await;
      return Err(e.into());
    }
    Ok(())
  }
}
