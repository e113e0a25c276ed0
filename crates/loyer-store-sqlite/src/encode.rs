//! Conversions between domain types and the plain-text representations
//! stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Ledgers and oracle responses are stored
//! as compact JSON.

use chrono::{DateTime, Utc};
use loyer_core::{
  document::{AffairKey, SourceDocument},
  ledger::{Ledger, StoredLedger},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id: String,
  pub affair:      String,
  pub title:       String,
  pub content:     String,
  pub page_count:  i64,
  pub language:    Option<String>,
}

impl RawDocument {
  pub fn into_document(self) -> Result<SourceDocument> {
    let page_count = u32::try_from(self.page_count).map_err(|_| Error::Corrupt {
      table:  "documents",
      detail: format!("{}: page count {}", self.document_id, self.page_count),
    })?;
    Ok(SourceDocument {
      document_id: self.document_id,
      affair: AffairKey::new(self.affair),
      title: self.title,
      content: self.content,
      page_count,
      language: self.language,
    })
  }
}

/// Raw values read directly from a `ledger_snapshots` row.
pub struct RawSnapshot {
  pub ledger_json: String,
  pub stored_at:   String,
}

impl RawSnapshot {
  pub fn into_stored(self) -> Result<StoredLedger> {
    let ledger: Ledger = serde_json::from_str(&self.ledger_json)?;
    Ok(StoredLedger { ledger, stored_at: decode_dt(&self.stored_at)? })
  }
}
