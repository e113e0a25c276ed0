//! Ledger export as a markdown table or JSON lines.

use std::fmt::Write as _;

use clap::ValueEnum;
use loyer_core::{ledger::Ledger, schema::LedgerSchema};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
  Markdown,
  Jsonl,
}

pub fn render(format: Format, schema: &LedgerSchema, ledger: &Ledger) -> anyhow::Result<String> {
  match format {
    Format::Markdown => markdown(schema, ledger),
    Format::Jsonl => jsonl(ledger),
  }
}

/// One JSON record per line, in ledger order.
pub fn jsonl(ledger: &Ledger) -> anyhow::Result<String> {
  let mut out = String::new();
  for record in ledger.records()? {
    out.push_str(&serde_json::to_string(&record)?);
    out.push('\n');
  }
  Ok(out)
}

fn cell(value: Option<&Value>) -> String {
  let text = match value {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(Value::Array(items)) => items
      .iter()
      .map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      })
      .collect::<Vec<_>>()
      .join("; "),
    Some(other) => other.to_string(),
  };
  text.replace('|', "\\|").replace('\n', " ")
}

/// A table with one column per ledger column, followed by the issues.
pub fn markdown(schema: &LedgerSchema, ledger: &Ledger) -> anyhow::Result<String> {
  let columns: Vec<&str> = schema.column_names().collect();
  let mut out = String::new();

  writeln!(out, "# {} (schema v{})", ledger.affair, ledger.schema_version)?;
  writeln!(out)?;
  writeln!(out, "digest: `{}`", ledger.digest)?;
  writeln!(out)?;
  writeln!(out, "| {} |", columns.join(" | "))?;
  writeln!(out, "|{}", "---|".repeat(columns.len()))?;
  for record in ledger.records()? {
    let cells: Vec<String> = columns.iter().map(|c| cell(record.get(*c))).collect();
    writeln!(out, "| {} |", cells.join(" | "))?;
  }

  if !ledger.issues.is_empty() {
    writeln!(out)?;
    writeln!(out, "## Issues")?;
    writeln!(out)?;
    for issue in &ledger.issues {
      writeln!(out, "- {issue}")?;
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use loyer_core::{
    Field,
    document::{AffairKey, DocumentKind},
    ledger::{Aggregate, Issue, LedgerEntry, Period},
    product::{Annotation, DerivedAmounts, PricingMode, ProductIdentity, ProductRow, Provenance},
  };

  use super::*;

  fn ledger() -> Ledger {
    let row = ProductRow {
      row_id:       ProductRow::row_id_for("cp-1", 0),
      provenance:   Provenance {
        document_id:      "cp-1".into(),
        kind:             DocumentKind::Subscription,
        amendment_number: None,
        position:         0,
        effective_date:   NaiveDate::from_ymd_opt(2015, 10, 1),
      },
      terms:        Default::default(),
      product:      ProductIdentity { name: "Hébergement | Run".into(), ..Default::default() },
      pricing:      Default::default(),
      usage:        Default::default(),
      evidence:     Default::default(),
      confidence:   Default::default(),
      pricing_mode: PricingMode::RecurringFlat,
      change:       None,
      derived:      DerivedAmounts {
        monthly_recurring_price: Field::Unknown,
        ..Default::default()
      },
      annotations:  vec![Annotation::data_quality("recurring_cadence missing")],
    };
    Ledger {
      affair:         AffairKey::new("acme"),
      schema_version: 1,
      periods:        vec![Period {
        start:   None,
        end:     None,
        total:   Aggregate::NonComputable { reason: "monthly amount is unknown".into() },
        members: vec![row.row_id],
      }],
      entries:        vec![LedgerEntry { row, period: 0 }],
      issues:         vec![Issue::AggregationNonComputable {
        period_start: None,
        reason:       "monthly amount is unknown".into(),
      }],
      digest:         "abc".into(),
    }
  }

  #[test]
  fn jsonl_keeps_unknown_markers() {
    let out = jsonl(&ledger()).unwrap();
    assert_eq!(out.lines().count(), 1);
    let record: Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(record["period_total_monthly"], "unknown");
    assert_eq!(record["period_total_source"], "non_computable");
    assert_eq!(record["monthly_recurring_price"], "unknown");
    assert_eq!(record["product_code"], Value::Null);
  }

  #[test]
  fn markdown_has_every_column_and_the_issues() {
    let schema = LedgerSchema::current();
    let out = markdown(&schema, &ledger()).unwrap();
    let header = out.lines().find(|l| l.starts_with("| row_id")).unwrap();
    assert_eq!(header.matches(" | ").count() + 1, schema.columns.len());
    assert!(out.contains("Hébergement \\| Run"));
    assert!(out.contains("## Issues"));
    assert!(out.contains("initial period: aggregate not computable"));
  }
}
