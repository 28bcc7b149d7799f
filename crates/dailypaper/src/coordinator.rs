//! Bounded worker pool running document fetch and analysis for each candidate.
//!
//! At most `concurrency` papers are in flight at any time. Admission happens in candidate order:
//! the coordinator acquires a permit, checks the halt flag, then spawns the paper's task, which
//! releases the permit when done. Results are gathered as tasks complete and put back into
//! candidate order, so every candidate yields exactly one [`PaperOutcome`].
//!
//! A fatal analysis error raises the halt flag before the failing task releases its permit. No
//! paper is admitted afterwards; papers already in flight run to completion, and papers never
//! admitted are reported as [`PaperStatus::Skipped`].

use std::{
  panic::AssertUnwindSafe,
  sync::atomic::{AtomicBool, Ordering},
};

use futures::FutureExt;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::Instrument;

use super::*;
use crate::{
  analysis::{AnalysisVerdict, Analyzer},
  pdf::DocumentSource,
};

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperStatus {
  /// The paper was analyzed.
  Analyzed(AnalysisVerdict),
  /// The paper could not be analyzed.
  Failed(ItemError),
  /// The paper was never started because the run was halted.
  Skipped,
}

/// A candidate together with its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperOutcome {
  /// The candidate
  pub record: PaperRecord,
  /// What happened to it
  pub status: PaperStatus,
}

impl PaperOutcome {
  /// The verdict, for analyzed papers.
  pub fn verdict(&self) -> Option<&AnalysisVerdict> {
    match &self.status {
      PaperStatus::Analyzed(verdict) => Some(verdict),
      _ => None,
    }
  }
}

/// Outcomes of a batch, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
  /// One outcome per candidate
  pub outcomes: Vec<PaperOutcome>,
  /// The first fatal analysis error, when the batch was halted
  pub fatal:    Option<AnalysisError>,
}

/// Worker pool over a [`DocumentSource`] and an [`Analyzer`].
#[derive(Clone)]
pub struct Coordinator {
  /// Document source shared by the workers
  fetcher:     Arc<dyn DocumentSource>,
  /// Analyzer shared by the workers
  analyzer:    Arc<dyn Analyzer>,
  /// Maximum number of papers in flight
  concurrency: usize,
}

impl Coordinator {
  /// Creates a pool running at most `concurrency` papers at once (at least one).
  pub fn new(
    fetcher: Arc<dyn DocumentSource>,
    analyzer: Arc<dyn Analyzer>,
    concurrency: usize,
  ) -> Self {
    Self { fetcher, analyzer, concurrency: concurrency.max(1) }
  }

  /// Processes `candidates` and returns their outcomes in the same order.
  pub async fn process(&self, candidates: Vec<PaperRecord>) -> Processed {
    let total = candidates.len();
    let semaphore = Arc::new(Semaphore::new(self.concurrency));
    let halted = Arc::new(AtomicBool::new(false));
    let mut admitted = vec![false; total];
    let mut tasks = JoinSet::new();

    info!("Processing {total} paper(s) with up to {} in flight", self.concurrency);
    for (index, record) in candidates.iter().enumerate() {
      let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
        break;
      };
      if halted.load(Ordering::SeqCst) {
        debug!("Halted, not admitting {} or any later paper", record.identifier);
        break;
      }
      admitted[index] = true;

      let fetcher = Arc::clone(&self.fetcher);
      let analyzer = Arc::clone(&self.analyzer);
      let halted = Arc::clone(&halted);
      let record = record.clone();
      tasks.spawn(
        async move {
          let status = AssertUnwindSafe(process_one(fetcher.as_ref(), analyzer.as_ref(), &record))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
              error!("Worker for {} panicked", record.identifier);
              PaperStatus::Failed(ItemError::Worker(panic_message(panic.as_ref())))
            });
          if let PaperStatus::Failed(ItemError::Analysis(e)) = &status {
            if e.is_fatal() {
              halted.store(true, Ordering::SeqCst);
            }
          }
          drop(permit);
          (index, status)
        }
        .in_current_span(),
      );
    }

    let mut slots: Vec<Option<PaperStatus>> = vec![None; total];
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((index, status)) => slots[index] = Some(status),
        Err(e) => error!("Worker task lost: {e}"),
      }
    }

    let mut fatal = None;
    let outcomes: Vec<PaperOutcome> = candidates
      .into_iter()
      .zip(slots)
      .zip(admitted)
      .map(|((record, slot), admitted)| {
        let status = match slot {
          Some(status) => status,
          None if admitted => PaperStatus::Failed(ItemError::Worker("task did not complete".into())),
          None => PaperStatus::Skipped,
        };
        if let PaperStatus::Failed(ItemError::Analysis(e)) = &status {
          if e.is_fatal() && fatal.is_none() {
            fatal = Some(e.clone());
          }
        }
        PaperOutcome { record, status }
      })
      .collect();

    if let Some(e) = &fatal {
      let skipped = outcomes.iter().filter(|o| o.status == PaperStatus::Skipped).count();
      warn!("Processing halted ({e}), {skipped} paper(s) skipped");
    }
    Processed { outcomes, fatal }
  }
}

/// Fetches, falls back to the abstract when needed, and analyzes one paper.
async fn process_one(
  fetcher: &dyn DocumentSource,
  analyzer: &dyn Analyzer,
  record: &PaperRecord,
) -> PaperStatus {
  let content = fetcher.fetch(record).await;
  let input = match AnalysisInput::from_content(record, content) {
    Ok(input) => input,
    Err(e) => {
      warn!("No usable content for {}: {e}", record.identifier);
      return PaperStatus::Failed(ItemError::Content(e));
    },
  };
  if input.kind() == InputKind::AbstractOnly {
    info!("Analyzing {} from its abstract only", record.identifier);
  }

  match analyzer.analyze(record, &input).await {
    Ok(verdict) => {
      info!("Analyzed {} (relevant: {})", record.identifier, verdict.relevant);
      PaperStatus::Analyzed(verdict)
    },
    Err(e) => {
      if e.is_fatal() {
        error!("Analysis of {} failed fatally: {e}", record.identifier);
      } else {
        warn!("Analysis of {} failed: {e}", record.identifier);
      }
      PaperStatus::Failed(ItemError::Analysis(e))
    },
  }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "worker panicked".to_string()
  }
}
