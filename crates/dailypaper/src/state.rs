//! SQLite store of the papers analyzed per run date.
//!
//! The store is the deduplication index of the pipeline: a paper recorded for a date is never
//! analyzed again for that date. It also keeps the record and verdict of every such paper so that
//! a rerun can regenerate the complete report for the date.
//!
//! # Examples
//!
//! ```no_run
//! # use dailypaper::state::StateStore;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StateStore::open(dailypaper::config::Config::default_state_path()).await?;
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let state = store.load(date).await?;
//! println!("{} paper(s) already recorded for {date}", state.papers.len());
//! # Ok(())
//! # }
//! ```

use rusqlite::params;
use tokio_rusqlite::Connection;

use super::*;
use crate::analysis::AnalysisVerdict;

/// A paper recorded for a date, with its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPaper {
  /// Catalog metadata
  pub record:  PaperRecord,
  /// Analysis verdict
  pub verdict: AnalysisVerdict,
}

/// Everything recorded for one date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateState {
  /// Recorded papers, in the order they were recorded
  pub papers: Vec<RecordedPaper>,
}

impl DateState {
  /// Identifiers of the recorded papers.
  pub fn identifiers(&self) -> HashSet<String> {
    self.papers.iter().map(|paper| paper.record.identifier.clone()).collect()
  }
}

/// Handle on the state database.
#[derive(Clone)]
pub struct StateStore {
  /// Async SQLite connection handle
  conn: Connection,
}

impl StateStore {
  /// Opens the database at `path`, creating the file, its directory and the schema if needed.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }
    debug!("Opening state database {}", path.display());
    Self::initialize(Connection::open(path).await?).await
  }

  /// Opens a throwaway in-memory database.
  pub async fn open_in_memory() -> Result<Self> {
    Self::initialize(Connection::open_in_memory().await?).await
  }

  /// Applies the schema.
  async fn initialize(conn: Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;
    Ok(Self { conn })
  }

  /// Loads the papers recorded for `date`, in recording order.
  pub async fn load(&self, date: NaiveDate) -> Result<DateState> {
    let run_date = date.to_string();
    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT record, verdict FROM processed_papers WHERE run_date = ?1 ORDER BY rank",
        )?;
        let rows = stmt
          .query_map(params![run_date], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut papers = Vec::with_capacity(rows.len());
    for (record, verdict) in rows {
      papers.push(RecordedPaper {
        record:  serde_json::from_str(&record)?,
        verdict: serde_json::from_str(&verdict)?,
      });
    }
    debug!("{} paper(s) recorded for {date}", papers.len());
    Ok(DateState { papers })
  }

  /// Records `papers` for `date` in a single transaction, after those already recorded.
  ///
  /// Recording a paper again replaces its record and verdict but keeps its position.
  pub async fn record(&self, date: NaiveDate, papers: &[RecordedPaper]) -> Result<()> {
    if papers.is_empty() {
      return Ok(());
    }
    let run_date = date.to_string();
    let recorded_at = Utc::now().to_rfc3339();
    let mut rows = Vec::with_capacity(papers.len());
    for paper in papers {
      rows.push((
        paper.record.identifier.clone(),
        serde_json::to_string(&paper.record)?,
        serde_json::to_string(&paper.verdict)?,
      ));
    }
    let count = rows.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut rank: i64 = tx.query_row(
          "SELECT COALESCE(MAX(rank), -1) FROM processed_papers WHERE run_date = ?1",
          params![run_date],
          |row| row.get(0),
        )?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO processed_papers (run_date, identifier, rank, record, verdict, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (run_date, identifier) DO UPDATE SET
               record = excluded.record,
               verdict = excluded.verdict,
               recorded_at = excluded.recorded_at",
          )?;
          for (identifier, record, verdict) in &rows {
            rank += 1;
            stmt.execute(params![run_date, identifier, rank, record, verdict, recorded_at])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    info!("Recorded {count} paper(s) for {date}");
    Ok(())
  }
}
