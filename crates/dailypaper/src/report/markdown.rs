//! Markdown rendering of reports.

use super::*;

lazy_static! {
  /// Heading opening a date section of a weekly file.
  static ref DATE_HEADING: Regex = Regex::new(r"^##\s*(\d{4}-\d{2}-\d{2})").unwrap();
}

/// Line rendered for a date without any entry.
pub const NO_PAPERS: &str = "_No papers matched for this date._";

/// `[arXivYYMM]` marker of the month of `date`.
pub fn arxiv_prefix(date: NaiveDate) -> String { format!("[arXiv{}]", date.format("%y%m")) }

/// Monday and Sunday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
  let monday = date - chrono::Days::new(u64::from(date.weekday().num_days_from_monday()));
  (monday, monday + chrono::Days::new(6))
}

/// `YYYYMMDD-YYYYMMDD` range of the week containing `date`.
pub fn week_range(date: NaiveDate) -> String {
  let (monday, sunday) = week_bounds(date);
  format!("{}-{}", monday.format("%Y%m%d"), sunday.format("%Y%m%d"))
}

/// Escapes the characters markdown-with-JSX renderers choke on.
fn escape(text: &str) -> String { text.replace('<', "&lt;").replace('>', "&gt;") }

/// Tag line of an entry, `TBD` when nothing was tagged.
fn render_tags(verdict: &AnalysisVerdict) -> String {
  let tags = &verdict.tags;
  let mut parts = Vec::with_capacity(3);
  if !tags.primary.is_empty() {
    parts.push(format!("[{}]", tags.primary));
  }
  if !tags.secondary.is_empty() {
    parts.push(format!("[{}]", tags.secondary));
  }
  if !tags.keywords.is_empty() {
    parts.push(format!("[{}]", tags.keywords.join(", ")));
  }
  if parts.is_empty() {
    "TBD".to_string()
  } else {
    parts.join(", ")
  }
}

/// One report entry, as a bullet with its details nested below.
pub fn render_entry(date: NaiveDate, entry: &RecordedPaper) -> String {
  let (record, verdict) = (&entry.record, &entry.verdict);
  let institution =
    if verdict.institution.trim().is_empty() { "TBD" } else { verdict.institution.trim() };

  let mut out = format!("- **{} {}**\n", arxiv_prefix(date), record.title);
  out.push_str(&format!("  - **tags:** {}\n", render_tags(verdict)));
  out.push_str(&format!("  - **authors:** {}\n", record.authors.join(", ")));
  out.push_str(&format!("  - **institution:** {institution}\n"));
  if !record.categories.is_empty() {
    out.push_str(&format!("  - **categories:** {}\n", record.categories.join(", ")));
  }
  out.push_str(&format!("  - **link:** {}\n", record.pdf_link()));
  if verdict.input == InputKind::AbstractOnly {
    out.push_str("  - **note:** analyzed from the abstract only\n");
  }
  let summary = verdict.summary.trim();
  if !summary.is_empty() {
    out.push_str(&format!("  - **Simple LLM Summary:** {}\n", escape(summary)));
  }
  out
}

/// The entries of `report`, separated by blank lines, or [`NO_PAPERS`].
fn render_entries(report: &DailyReport) -> String {
  if report.entries.is_empty() {
    return format!("{NO_PAPERS}\n");
  }
  report
    .entries
    .iter()
    .map(|entry| render_entry(report.date, entry))
    .collect::<Vec<_>>()
    .join("\n")
}

/// A complete one-date file.
pub fn render_daily(report: &DailyReport) -> String {
  format!("# {}\n\n{}", report.date, render_entries(report))
}

/// The `## YYYY-MM-DD` section of `report` in a weekly file.
pub fn render_section(report: &DailyReport) -> String {
  format!("## {}\n\n{}", report.date, render_entries(report))
}

/// Puts the section of `report` into the weekly file `existing` (empty for a new file).
///
/// A section for the same date is replaced; otherwise the section is inserted before the first
/// later date, keeping sections in chronological order. Text before the first section is kept,
/// and a `# <week range>` heading is created when there is none.
pub fn merge_section(existing: &str, report: &DailyReport) -> String {
  let mut header = String::new();
  let mut sections: Vec<(String, String)> = Vec::new();
  for line in existing.lines() {
    if let Some(captures) = DATE_HEADING.captures(line) {
      sections.push((captures[1].to_string(), String::new()));
    }
    match sections.last_mut() {
      Some((_, body)) => {
        body.push_str(line);
        body.push('\n');
      },
      None => {
        header.push_str(line);
        header.push('\n');
      },
    }
  }

  let date = report.date.to_string();
  let section = render_section(report);
  match sections.iter().position(|(existing_date, _)| *existing_date >= date) {
    Some(index) if sections[index].0 == date => sections[index].1 = section,
    Some(index) => sections.insert(index, (date, section)),
    None => sections.push((date, section)),
  }

  let header = header.trim();
  let header =
    if header.is_empty() { format!("# {}", week_range(report.date)) } else { header.to_string() };
  let mut out = header;
  for (_, body) in &sections {
    out.push_str("\n\n");
    out.push_str(body.trim());
  }
  out.push('\n');
  out
}
