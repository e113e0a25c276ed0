//! The assembled ledger of one affair.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Amount, Field,
  document::{AffairKey, DateSource, DocumentKind},
  product::ProductRow,
  schema::Record,
};

// ─── Periods ─────────────────────────────────────────────────────────────────

/// Monthly aggregate of a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Aggregate {
  /// Stated by a document ("total abonnement mensuel").
  Explicit { amount: Amount },
  /// Sum of the monthly equivalents of the active recurring rows.
  Computed { amount: Amount },
  NonComputable { reason: String },
}

impl Aggregate {
  pub fn amount(&self) -> Field<Amount> {
    match self {
      Self::Explicit { amount } | Self::Computed { amount } => Field::Known(*amount),
      Self::NonComputable { .. } => Field::Unknown,
    }
  }

  pub fn source(&self) -> &'static str {
    match self {
      Self::Explicit { .. } => "explicit",
      Self::Computed { .. } => "computed",
      Self::NonComputable { .. } => "non_computable",
    }
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      Self::NonComputable { reason } => Some(reason),
      _ => None,
    }
  }
}

/// A span of the contract during which the set of active recurring terms is
/// constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
  /// Inclusive; `None` for a period that starts before any dated event.
  pub start:   Option<NaiveDate>,
  /// Exclusive; `None` when open.
  pub end:     Option<NaiveDate>,
  pub total:   Aggregate,
  /// Rows whose monthly amounts compose the aggregate.
  pub members: Vec<Uuid>,
}

impl Period {
  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start.is_none_or(|s| s <= date) && self.end.is_none_or(|e| date < e)
  }
}

// ─── Issues ──────────────────────────────────────────────────────────────────

/// A recoverable problem met while reconciling an affair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
  /// The document matched no classifier marker and was left out.
  Unclassified { document_id: String },
  /// More than one master document matched; the first one was kept.
  DuplicateMaster { document_id: String },
  /// The oracle failed or timed out; the document contributes no rows.
  OracleCall { document_id: String, message: String },
  /// No content date was found for an amendment.
  DateParseAmbiguity { document_id: String, fallback: DateSource },
  AggregationNonComputable { period_start: Option<NaiveDate>, reason: String },
  /// Product rows extracted from a master document are not ledger rows.
  MasterRowsDropped { document_id: String, count: usize },
}

impl fmt::Display for Issue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Unclassified { document_id } => write!(f, "{document_id}: unclassified"),
      Self::DuplicateMaster { document_id } => {
        write!(f, "{document_id}: second master document ignored")
      }
      Self::OracleCall { document_id, message } => {
        write!(f, "{document_id}: oracle call failed: {message}")
      }
      Self::DateParseAmbiguity { document_id, fallback } => match fallback {
        DateSource::FileName => write!(f, "{document_id}: dated from file name"),
        _ => write!(f, "{document_id}: no signature date, sequenced last"),
      },
      Self::AggregationNonComputable { period_start, reason } => match period_start {
        Some(start) => write!(f, "period from {start}: aggregate not computable: {reason}"),
        None => write!(f, "initial period: aggregate not computable: {reason}"),
      },
      Self::MasterRowsDropped { document_id, count } => {
        write!(f, "{document_id}: {count} master product rows dropped")
      }
    }
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// A product row placed in its period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub row:    ProductRow,
  /// Index into [`Ledger::periods`].
  pub period: usize,
}

impl LedgerEntry {
  /// Full ledger record: the row's columns plus its period's.
  pub fn to_record(&self, periods: &[Period]) -> crate::Result<Record> {
    let mut record = self.row.to_record()?;
    let period = periods.get(self.period);
    let date = |d: Option<NaiveDate>| match d {
      Some(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
      None => serde_json::Value::Null,
    };

    record.insert("period_start".into(), date(period.and_then(|p| p.start)));
    record.insert("period_end".into(), date(period.and_then(|p| p.end)));
    let (total, source, note) = match period {
      Some(p) => (p.total.amount(), p.total.source(), p.total.reason()),
      None => (Field::Unknown, "non_computable", Some("row has no period")),
    };
    record.insert("period_total_monthly".into(), serde_json::to_value(total)?);
    record.insert("period_total_source".into(), source.into());
    record.insert(
      "period_total_note".into(),
      note.map_or(serde_json::Value::Null, |n| n.into()),
    );
    Ok(record)
  }
}

/// The immutable reconciliation output for one affair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
  pub affair:         AffairKey,
  pub schema_version: u32,
  /// Subscription rows, then amendment rows in sequence order.
  pub entries:        Vec<LedgerEntry>,
  pub periods:        Vec<Period>,
  pub issues:         Vec<Issue>,
  /// Hex SHA-256 over the ledger records.
  pub digest:         String,
}

impl Ledger {
  pub fn records(&self) -> crate::Result<Vec<Record>> {
    self.entries.iter().map(|e| e.to_record(&self.periods)).collect()
  }

  pub fn rows(&self) -> impl Iterator<Item = &ProductRow> {
    self.entries.iter().map(|e| &e.row)
  }

  pub fn subscription_row_count(&self) -> usize {
    self
      .rows()
      .filter(|r| r.provenance.kind == DocumentKind::Subscription)
      .count()
  }
}

/// Acknowledgement of a [`crate::store::LedgerStore::upsert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertAck {
  pub affair:    AffairKey,
  pub digest:    String,
  pub row_count: usize,
  /// Whether an earlier snapshot was replaced.
  pub replaced:  bool,
  pub stored_at: DateTime<Utc>,
}

/// A ledger snapshot as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLedger {
  pub ledger:    Ledger,
  pub stored_at: DateTime<Utc>,
}
