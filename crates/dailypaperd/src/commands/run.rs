//! Module for running the digest over one or more dates.

use chrono::{Days, Local, NaiveDate};

use super::*;

/// Options of [`Commands::Run`]. Every option overrides the configuration file.
#[derive(Args, Clone, Debug, Default)]
pub struct RunOptions {
  /// Date to digest (YYYY-MM-DD); repeatable. Defaults to yesterday.
  #[arg(long = "date", value_name = "YYYY-MM-DD")]
  pub dates:       Vec<String>,
  /// Inclusive range of dates to digest, START:END
  #[arg(long, value_name = "START:END")]
  pub range:       Option<String>,
  /// Category to list (e.g. cs.DC); repeatable. Replaces the configured categories.
  #[arg(long = "category", value_name = "CODE")]
  pub categories:  Vec<String>,
  /// Maximum number of papers in flight
  #[arg(long)]
  pub concurrency: Option<usize>,
  /// Cap on the candidates of each date
  #[arg(long)]
  pub max_papers:  Option<usize>,
  /// Directory the reports are written to
  #[arg(long)]
  pub output:      Option<PathBuf>,
  /// State database path
  #[arg(long)]
  pub state:       Option<PathBuf>,
}

impl RunOptions {
  /// Applies the command line overrides to `config`.
  fn apply(&self, config: &mut Config) {
    if !self.categories.is_empty() {
      config.catalog.categories = self.categories.clone();
    }
    if let Some(concurrency) = self.concurrency {
      config.pipeline.concurrency = concurrency;
    }
    if self.max_papers.is_some() {
      config.pipeline.max_papers = self.max_papers;
    }
    if let Some(output) = &self.output {
      config.report.output_dir = output.clone();
    }
    if let Some(state) = &self.state {
      config.pipeline.state_path = Some(state.clone());
    }
  }

  /// Dates to run, ascending and without repeats. Yesterday (local time) when none is given.
  fn dates(&self) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::new();
    for date in &self.dates {
      dates.extend(Pipeline::parse_dates(date)?);
    }
    if let Some(range) = &self.range {
      dates.extend(Pipeline::parse_dates(range)?);
    }
    if dates.is_empty() {
      let today = Local::now().date_naive();
      let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
      dates.push(yesterday);
    }
    dates.sort_unstable();
    dates.dedup();
    Ok(dates)
  }
}

/// Function for the [`Commands::Run`] in the CLI.
pub async fn run(cli: &Cli, options: RunOptions) -> Result<()> {
  let mut config = Config::load_or_default(cli.config_path())?;
  options.apply(&mut config);
  config.validate()?;
  let dates = options.dates()?;

  let key_env = config.analysis.api_key_env.clone();
  let api_key = std::env::var(&key_env)
    .ok()
    .filter(|key| !key.trim().is_empty())
    .ok_or_else(|| DailyPaperdError::MissingApiKey(key_env.clone()))?;

  let pipeline = Pipeline::from_config(&config, api_key).await?;
  println!(
    "{} Digesting {} date(s) over {}",
    style(INFO_PREFIX).cyan(),
    dates.len(),
    style(config.catalog.categories.join(", ")).yellow()
  );

  let backfill = pipeline.run_dates(&dates).await;
  for summary in &backfill.summaries {
    print_summary(summary);
  }

  if let Some(aborted) = backfill.aborted {
    return Err(aborted.into());
  }
  match backfill.fatal() {
    Some(RunSummary { date, fatal: Some(fatal), .. }) =>
      Err(DailyPaperdError::AnalysisFatal { date: *date, reason: fatal.to_string() }),
    _ => Ok(()),
  }
}

/// Prints the outcome of one date.
fn print_summary(summary: &RunSummary) {
  let prefix = match summary.stage {
    RunStage::Done if summary.counts.failed == 0 => style(SUCCESS_PREFIX).green(),
    RunStage::Done => style(WARNING_PREFIX).yellow(),
    _ => style(ERROR_PREFIX).red(),
  };
  println!(
    "{prefix} {}: {} ({} in the report, {} recorded) -> {}",
    style(summary.date).bold(),
    summary.counts,
    summary.entries,
    summary.recorded,
    style(summary.report_path.display()).yellow()
  );
}
