//! Amendment sequencing.
//!
//! Amendments are ordered by the signature date found near the end of their
//! content, falling back to the `YYYYMM` token of their file name. Undated
//! amendments go last. The sort is stable, so ties keep listing order.

use std::sync::LazyLock;

use chrono::NaiveDate;
use loyer_core::{
  document::{DateSource, Document},
  ledger::Issue,
};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::SequencerConfig;

static FILENAME_MONTH: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(0[1-9]|1[0-2])(?:[^0-9]|$)")
    .expect("invalid filename date pattern")
});

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\b([0-9]{4})-([0-9]{2})-([0-9]{2})\b").expect("invalid ISO date pattern")
});

static NUMERIC_DMY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\b([0-9]{1,2})[/.\-]([0-9]{1,2})[/.\-]([0-9]{4})\b")
    .expect("invalid numeric date pattern")
});

const MONTH_NAMES: &str = "janvier|f[ée]vrier|mars|avril|mai|juin|juillet|ao[uû]t|septembre|\
                           octobre|novembre|d[ée]cembre|january|february|march|april|may|june|\
                           july|august|september|october|november|december";

static DAY_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(?i)\b([0-9]{{1,2}})(?:er|st|nd|rd|th)?\s+({MONTH_NAMES})\s+([0-9]{{4}})\b"
  ))
  .expect("invalid day-month-name date pattern")
});

static MONTH_NAME_DAY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(?i)\b({MONTH_NAMES})\s+([0-9]{{1,2}})(?:st|nd|rd|th)?,?\s+([0-9]{{4}})\b"
  ))
  .expect("invalid month-name-day date pattern")
});

fn month_number(name: &str) -> Option<u32> {
  let n = name.to_lowercase();
  let month = match n.as_str() {
    "janvier" | "january" => 1,
    "février" | "fevrier" | "february" => 2,
    "mars" | "march" => 3,
    "avril" | "april" => 4,
    "mai" | "may" => 5,
    "juin" | "june" => 6,
    "juillet" | "july" => 7,
    "août" | "aout" | "august" => 8,
    "septembre" | "september" => 9,
    "octobre" | "october" => 10,
    "novembre" | "november" => 11,
    "décembre" | "decembre" | "december" => 12,
    _ => return None,
  };
  Some(month)
}

/// First day of the month named by the first standalone `YYYYMM` token.
pub fn filename_date(name: &str) -> Option<NaiveDate> {
  let caps = FILENAME_MONTH.captures(name)?;
  let year = caps[1].parse().ok()?;
  let month = caps[2].parse().ok()?;
  NaiveDate::from_ymd_opt(year, month, 1)
}

/// The date written closest to the end of the last `window` characters of
/// `content`, or `None`.
pub fn content_date(content: &str, window: usize) -> Option<NaiveDate> {
  let start = content
    .char_indices()
    .rev()
    .nth(window.saturating_sub(1))
    .map_or(0, |(i, _)| i);
  let tail = &content[start..];

  let mut best: Option<(usize, NaiveDate)> = None;
  let mut consider = |end: usize, date: Option<NaiveDate>| {
    if let Some(date) = date {
      if best.is_none_or(|(best_end, _)| end > best_end) {
        best = Some((end, date));
      }
    }
  };

  for caps in ISO_DATE.captures_iter(tail) {
    let date = ymd(&caps[1], &caps[2], &caps[3]);
    consider(caps.get(0).map_or(0, |m| m.end()), date);
  }
  for caps in NUMERIC_DMY.captures_iter(tail) {
    let date = ymd(&caps[3], &caps[2], &caps[1]);
    consider(caps.get(0).map_or(0, |m| m.end()), date);
  }
  for caps in DAY_MONTH_NAME.captures_iter(tail) {
    let date = month_number(&caps[2]).and_then(|m| {
      NaiveDate::from_ymd_opt(caps[3].parse().ok()?, m, caps[1].parse().ok()?)
    });
    consider(caps.get(0).map_or(0, |m| m.end()), date);
  }
  for caps in MONTH_NAME_DAY.captures_iter(tail) {
    let date = month_number(&caps[1]).and_then(|m| {
      NaiveDate::from_ymd_opt(caps[3].parse().ok()?, m, caps[2].parse().ok()?)
    });
    consider(caps.get(0).map_or(0, |m| m.end()), date);
  }

  best.map(|(_, date)| date)
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Orders amendments chronologically.
#[derive(Debug, Clone)]
pub struct Sequencer {
  tail_window: usize,
}

impl Sequencer {
  pub fn new(config: &SequencerConfig) -> Self {
    Self { tail_window: config.tail_window_chars }
  }

  /// Date and its source for one amendment.
  pub fn date_of(&self, doc: &Document) -> (Option<NaiveDate>, DateSource) {
    if let Some(date) = content_date(&doc.source.content, self.tail_window) {
      return (Some(date), DateSource::Content);
    }
    match filename_date(&doc.source.name_tag()) {
      Some(date) => (Some(date), DateSource::FileName),
      None => (None, DateSource::None),
    }
  }

  /// Sort `amendments` (given in listing order) and number them from 1.
  pub fn sequence(&self, amendments: Vec<Document>) -> (Vec<Document>, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut dated: Vec<(Option<NaiveDate>, Document)> = amendments
      .into_iter()
      .map(|mut doc| {
        let (date, source) = self.date_of(&doc);
        match source {
          DateSource::Content => {
            debug!(document = %doc.id(), ?date, "amendment dated from content")
          }
          DateSource::FileName | DateSource::None => {
            warn!(document = %doc.id(), ?date, ?source, "no signature date in content");
            issues.push(Issue::DateParseAmbiguity {
              document_id: doc.id().to_string(),
              fallback:    source,
            });
          }
        }
        doc.signature_date = date;
        doc.date_source = Some(source);
        (date, doc)
      })
      .collect();

    dated.sort_by_key(|(date, _)| (date.is_none(), *date));

    let ordered = dated
      .into_iter()
      .zip(1u32..)
      .map(|((_, mut doc), number)| {
        doc.amendment_number = Some(number);
        doc
      })
      .collect();
    (ordered, issues)
  }
}
