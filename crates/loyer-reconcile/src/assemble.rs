//! Ledger assembly: entries, schema check and content digest.

use loyer_core::{
  document::AffairKey,
  ledger::{Issue, Ledger, LedgerEntry},
  product::ProductRow,
  schema::{LedgerSchema, Record},
};
use sha2::{Digest, Sha256};

use crate::{Result, period::Segmentation};

/// Hex SHA-256 over the records, each field taken in column order.
pub fn digest(schema: &LedgerSchema, records: &[Record]) -> String {
  let mut hasher = Sha256::new();
  for record in records {
    for name in schema.column_names() {
      let value = record.get(name).cloned().unwrap_or_default();
      hasher.update(name.as_bytes());
      hasher.update(b"=");
      hasher.update(value.to_string().as_bytes());
      hasher.update(b"\x1f");
    }
    hasher.update(b"\n");
  }
  hex::encode(hasher.finalize())
}

/// Place `rows` in their periods and check every resulting record against
/// the schema. `rows` must already be in ledger order.
pub fn assemble(
  schema: &LedgerSchema,
  affair: AffairKey,
  rows: Vec<ProductRow>,
  segmentation: Segmentation,
  mut issues: Vec<Issue>,
) -> Result<Ledger> {
  let Segmentation { periods, assignment, issues: period_issues } = segmentation;
  issues.extend(period_issues);

  let entries: Vec<LedgerEntry> = rows
    .into_iter()
    .zip(assignment)
    .map(|(row, period)| LedgerEntry { row, period })
    .collect();

  let records = entries
    .iter()
    .map(|entry| -> Result<Record> {
      let record = entry.to_record(&periods)?;
      let provenance = &entry.row.provenance;
      let context = format!("{}#{}", provenance.document_id, provenance.position);
      schema.validate_record(&context, &record)?;
      Ok(record)
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(Ledger {
    affair,
    schema_version: schema.version,
    digest: digest(schema, &records),
    entries,
    periods,
    issues,
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use loyer_core::product::PricingMode;

  use super::*;
  use crate::{
    period::segment,
    tests::{ledger_row, money},
  };

  fn rows(price: i64) -> Vec<ProductRow> {
    let signed = NaiveDate::from_ymd_opt(2015, 10, 1);
    vec![ledger_row("cp", 0, "Abonnement", PricingMode::RecurringFlat, money(price), signed)]
  }

  fn ledger(rows: Vec<ProductRow>) -> Ledger {
    let schema = LedgerSchema::current();
    let seg = segment(&rows, &[]);
    assemble(&schema, AffairKey::new("acme"), rows, seg, vec![]).unwrap()
  }

  #[test]
  fn records_satisfy_the_schema() {
    let ledger = ledger(rows(500));
    assert_eq!(ledger.entries.len(), 1);
    assert_eq!(ledger.schema_version, LedgerSchema::current().version);
    let records = ledger.records().unwrap();
    let total: loyer_core::Amount =
      serde_json::from_value(records[0]["period_total_monthly"].clone()).unwrap();
    assert_eq!(total, loyer_core::Amount::from(500));
    assert!(records[0]["period_total_monthly"].is_number());
    assert_eq!(records[0]["period_total_source"], "computed");
  }

  #[test]
  fn digest_tracks_content() {
    assert_eq!(ledger(rows(500)).digest, ledger(rows(500)).digest);
    assert_ne!(ledger(rows(500)).digest, ledger(rows(501)).digest);
    assert_eq!(ledger(rows(500)).digest.len(), 64);
  }
}
