//! Removal of candidates already recorded for the run date.

use super::*;

/// Keeps the candidates whose identifier is not in `processed`, in their original order.
///
/// Identifiers repeated within `candidates` are kept once, at their first position.
///
/// ```
/// # use std::collections::HashSet;
/// # use dailypaper::{dedup::filter_processed, paper::PaperRecord};
/// # fn paper(id: &str) -> PaperRecord {
/// #   PaperRecord {
/// #     identifier: id.into(), version: String::new(), title: id.into(), authors: vec![],
/// #     abstract_text: String::new(), categories: vec![], published: Default::default(),
/// #     updated: Default::default(), pdf_url: None,
/// #   }
/// # }
/// let processed: HashSet<String> = ["b".to_string()].into();
/// let fresh = filter_processed(vec![paper("a"), paper("b"), paper("c")], &processed);
/// let ids: Vec<_> = fresh.iter().map(|p| p.identifier.as_str()).collect();
/// assert_eq!(ids, ["a", "c"]);
/// ```
pub fn filter_processed(
  candidates: Vec<PaperRecord>,
  processed: &HashSet<String>,
) -> Vec<PaperRecord> {
  let total = candidates.len();
  let mut seen = HashSet::with_capacity(total);
  let fresh: Vec<PaperRecord> = candidates
    .into_iter()
    .filter(|paper| !processed.contains(&paper.identifier))
    .filter(|paper| seen.insert(paper.identifier.clone()))
    .collect();
  debug!("{} of {total} candidate(s) not processed yet", fresh.len());
  fresh
}

#[cfg(test)]
mod tests {
  use super::*;

  fn paper(identifier: &str) -> PaperRecord {
    PaperRecord {
      identifier:    identifier.into(),
      version:       "v1".into(),
      title:         format!("Paper {identifier}"),
      authors:       vec![],
      abstract_text: "abstract".into(),
      categories:    vec!["cs.DC".into()],
      published:     Utc::now(),
      updated:       Utc::now(),
      pdf_url:       None,
    }
  }

  fn ids(papers: &[PaperRecord]) -> Vec<&str> {
    papers.iter().map(|p| p.identifier.as_str()).collect()
  }

  #[test]
  fn test_nothing_processed() {
    let fresh = filter_processed(vec![paper("3"), paper("1"), paper("2")], &HashSet::new());
    assert_eq!(ids(&fresh), ["3", "1", "2"]);
  }

  #[test]
  fn test_everything_processed() {
    let processed: HashSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
    assert!(filter_processed(vec![paper("1"), paper("2")], &processed).is_empty());
  }

  #[test]
  fn test_repeated_candidates_kept_once() {
    let processed: HashSet<String> = ["2".to_string()].into();
    let fresh = filter_processed(vec![paper("1"), paper("2"), paper("1"), paper("3")], &processed);
    assert_eq!(ids(&fresh), ["1", "3"]);
  }
}
