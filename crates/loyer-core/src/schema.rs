//! The versioned ledger schema.
//!
//! One column list drives three things: the contract handed to the
//! extraction oracle, the validation of oracle rows at the adapter boundary,
//! and the exact-match check on every assembled ledger record.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

use crate::value::UNKNOWN_MARKER;

/// A flattened ledger row or raw oracle row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Current schema version. Bumped whenever a column is added or renamed.
pub const SCHEMA_VERSION: u32 = 2;

/// Wire type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnType {
  Text,
  Integer,
  Number,
  Boolean,
  /// ISO `YYYY-MM-DD`.
  Date,
  TextList,
}

/// Who produces a column's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnOrigin {
  /// Returned by the extraction oracle for every product row.
  Oracle,
  /// Attached by the adapter and assembler.
  Provenance,
  /// Computed by the derived-field calculator.
  Derived,
  /// Copied from the row's period.
  Period,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
  pub name:        String,
  #[serde(rename = "type")]
  pub ty:          ColumnType,
  /// Whether `null` and `"unknown"` are accepted.
  pub nullable:    bool,
  pub origin:      ColumnOrigin,
  pub description: String,
}

/// A column set mismatch. Fatal for the affair being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error(
  "schema mismatch in {context}: missing {missing:?}, unexpected {unexpected:?}, invalid \
   {invalid:?}"
)]
pub struct SchemaMismatch {
  pub context:    String,
  pub missing:    Vec<String>,
  pub unexpected: Vec<String>,
  pub invalid:    Vec<String>,
}

impl SchemaMismatch {
  pub fn is_empty(&self) -> bool {
    self.missing.is_empty() && self.unexpected.is_empty() && self.invalid.is_empty()
  }
}

/// The column sets of a given schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSchema {
  pub version: u32,
  /// Ledger record columns, in output order.
  pub columns: Vec<ColumnSpec>,
  /// Document-level fields the oracle returns next to the rows.
  pub terms:   Vec<ColumnSpec>,
}

use ColumnOrigin::{Derived, Oracle, Period, Provenance};
use ColumnType::{Boolean, Date, Integer, Number, Text, TextList};

type ColumnDef = (&'static str, ColumnType, bool, ColumnOrigin, &'static str);

const LEDGER_COLUMNS: &[ColumnDef] = &[
  ("row_id", Text, false, Provenance, "Deterministic row identifier"),
  ("document_id", Text, false, Provenance, "Source document"),
  ("document_kind", Text, false, Provenance, "subscription or amendment"),
  ("amendment_number", Integer, true, Provenance, "1-based amendment sequence number"),
  ("row_position", Integer, false, Provenance, "Position of the row within its document"),
  ("effective_date", Date, true, Provenance, "Date the source document takes effect"),
  // contract
  ("company_name", Text, true, Oracle, "Client company name"),
  ("contract_number", Text, true, Oracle, "Contract reference"),
  ("signature_date_master", Date, true, Oracle, "Signature date of the general terms"),
  ("signature_date_subscription", Date, true, Oracle, "Signature date of the subscription"),
  ("signature_date_amendment", Date, true, Oracle, "Signature date of the amendment"),
  ("service_start_date", Date, true, Oracle, "Date the service starts"),
  ("service_duration_months", Integer, true, Oracle, "Initial duration in months"),
  ("service_duration_notes", Text, true, Oracle, "Non-numeric part of the duration clause"),
  ("tacit_renewal", Boolean, true, Oracle, "Renewed by tacit agreement"),
  ("term_mode", Text, true, Oracle, "Billing in advance or in arrears"),
  ("billing_cadence", Text, true, Oracle, "Invoicing cadence"),
  ("purchase_order", Boolean, true, Oracle, "A purchase order is required"),
  ("purchase_order_code", Text, true, Oracle, "Purchase order reference"),
  ("payment_methods", TextList, true, Oracle, "Accepted payment methods"),
  ("payment_terms", Text, true, Oracle, "Payment delay"),
  ("billing_start_event", Text, true, Oracle, "Event that starts billing"),
  ("currency", Text, true, Oracle, "ISO currency code"),
  ("tax_basis", Text, true, Oracle, "HT or TTC, only when stated next to prices"),
  // product
  ("product_code", Text, true, Oracle, "Product reference"),
  ("product_name", Text, false, Oracle, "Product designation"),
  ("is_included", Boolean, false, Oracle, "Product is included at no charge"),
  ("one_shot_service", Boolean, false, Oracle, "Product is billed once"),
  ("is_volume_product", Boolean, false, Oracle, "Product is priced on usage volume"),
  ("product_removed", Boolean, false, Oracle, "Product is withdrawn by this amendment"),
  ("unit_price", Number, true, Oracle, "Unit or one-time price"),
  ("quantity", Number, true, Oracle, "Committed quantity"),
  ("quantity_cadence", Text, true, Oracle, "Cadence the quantity is stated per"),
  ("recurring_price", Number, true, Oracle, "Recurring price as stated"),
  ("recurring_cadence", Text, true, Oracle, "Cadence of the recurring price"),
  ("commitment_start", Date, true, Oracle, "Start of a volume commitment range"),
  ("commitment_end", Date, true, Oracle, "Last day of a volume commitment range"),
  // usage
  ("overconsumption_price", Number, true, Oracle, "Price per unit above the commitment"),
  ("overconsumption_cadence", Text, true, Oracle, "Cadence overconsumption is measured on"),
  ("usage_term_mode", Text, true, Oracle, "Billing mode of the committed volume"),
  ("overconsumption_term_mode", Text, true, Oracle, "Billing mode of overconsumption"),
  ("usage_notes", Text, true, Oracle, "Other usage terms"),
  ("billing_modality_notes", Text, true, Oracle, "Other billing terms"),
  // revalorization
  ("reval_method", Text, true, Oracle, "fixed_rate, index_formula or textual"),
  ("reval_rate", Number, true, Oracle, "Fixed revalorization rate"),
  ("reval_formula", Text, true, Oracle, "Index formula or clause text"),
  ("reval_compute_when", Text, true, Oracle, "When the revalorization is computed"),
  ("reval_apply_when", Text, true, Oracle, "When the revalorization is applied"),
  ("reval_apply_from", Text, true, Oracle, "First date the revalorization applies"),
  ("reval_source", Text, true, Oracle, "Document stating the rule"),
  // evidence
  ("evidence_product", Text, true, Oracle, "Quote supporting the product"),
  ("evidence_price", Text, true, Oracle, "Quote supporting the price"),
  ("evidence_payment_methods", Text, true, Oracle, "Quote supporting payment methods"),
  ("evidence_end_date", Text, true, Oracle, "Quote supporting the duration"),
  ("evidence_amendment", Text, true, Oracle, "Quote stating what the amendment changes"),
  ("evidence_usage", Text, true, Oracle, "Quote supporting usage terms"),
  ("evidence_revalorization", Text, true, Oracle, "Quote supporting the revalorization"),
  ("evidence_billing", Text, true, Oracle, "Quote supporting billing terms"),
  ("evidence_dates", Text, true, Oracle, "Quote supporting the dates"),
  ("evidence_contract_errors", Text, true, Oracle, "Inconsistencies spotted in the contract"),
  // confidence
  ("confidence_price", Number, true, Oracle, "Confidence in the price, 0 to 1"),
  ("confidence_usage", Number, true, Oracle, "Confidence in usage terms, 0 to 1"),
  ("confidence_revalorization", Number, true, Oracle, "Confidence in the revalorization, 0 to 1"),
  ("confidence_billing", Number, true, Oracle, "Confidence in billing terms, 0 to 1"),
  ("confidence_dates", Number, true, Oracle, "Confidence in the dates, 0 to 1"),
  ("confidence_company", Number, true, Oracle, "Confidence in the company, 0 to 1"),
  ("confidence_amendment", Number, true, Oracle, "Confidence in the amendment delta, 0 to 1"),
  // derived
  ("pricing_mode", Text, false, Derived, "Pricing mode of the row"),
  ("change_kind", Text, true, Derived, "added, modified, relisted or removed; amendments only"),
  ("monthly_recurring_price", Number, true, Derived, "Recurring price normalised to a month"),
  ("monthly_quantity", Number, true, Derived, "Quantity normalised to a month"),
  ("billing_cycle_amount", Number, true, Derived, "Amount invoiced per billing cycle"),
  ("annual_amount", Number, true, Derived, "Monthly recurring price times twelve"),
  ("end_of_contract", Text, true, Derived, "End date, or open under tacit renewal"),
  ("annotations", TextList, false, Derived, "Data-quality notes"),
  // period
  ("period_start", Date, true, Period, "Start of the row's period"),
  ("period_end", Date, true, Period, "Exclusive end of the row's period; null when open"),
  ("period_total_monthly", Number, true, Period, "Monthly aggregate of the period"),
  ("period_total_source", Text, false, Period, "explicit, computed or non_computable"),
  ("period_total_note", Text, true, Period, "Why the aggregate is not computable"),
];

const TERMS_COLUMNS: &[ColumnDef] = &[
  ("signature_date", Date, true, Oracle, "Signature date of this document"),
  ("period_total_monthly", Number, true, Oracle, "Explicit monthly total, never computed"),
  ("period_total_evidence", Text, true, Oracle, "Quote stating the monthly total"),
  ("company_name", Text, true, Oracle, "Client company name"),
  ("contract_number", Text, true, Oracle, "Contract reference"),
  ("currency", Text, true, Oracle, "ISO currency code"),
  ("tax_basis", Text, true, Oracle, "HT or TTC"),
  ("tacit_renewal", Boolean, true, Oracle, "Renewed by tacit agreement"),
  ("service_duration_months", Integer, true, Oracle, "Initial duration in months"),
  ("service_duration_notes", Text, true, Oracle, "Non-numeric part of the duration clause"),
  ("term_mode", Text, true, Oracle, "Billing in advance or in arrears"),
  ("billing_cadence", Text, true, Oracle, "Invoicing cadence"),
  ("billing_start_event", Text, true, Oracle, "Event that starts billing"),
  ("payment_methods", TextList, true, Oracle, "Accepted payment methods"),
  ("payment_terms", Text, true, Oracle, "Payment delay"),
  ("reval_method", Text, true, Oracle, "fixed_rate, index_formula or textual"),
  ("reval_rate", Number, true, Oracle, "Fixed revalorization rate"),
  ("reval_formula", Text, true, Oracle, "Index formula or clause text"),
  ("reval_compute_when", Text, true, Oracle, "When the revalorization is computed"),
  ("reval_apply_when", Text, true, Oracle, "When the revalorization is applied"),
  ("reval_apply_from", Text, true, Oracle, "First date the revalorization applies"),
  ("reval_source", Text, true, Oracle, "Document stating the rule"),
];

fn build(defs: &[ColumnDef]) -> Vec<ColumnSpec> {
  defs
    .iter()
    .map(|&(name, ty, nullable, origin, description)| ColumnSpec {
      name: name.to_string(),
      ty,
      nullable,
      origin,
      description: description.to_string(),
    })
    .collect()
}

impl LedgerSchema {
  /// The schema of [`SCHEMA_VERSION`].
  pub fn current() -> Self {
    Self {
      version: SCHEMA_VERSION,
      columns: build(LEDGER_COLUMNS),
      terms:   build(TERMS_COLUMNS),
    }
  }

  pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
    self.columns.iter().find(|c| c.name == name)
  }

  pub fn column_names(&self) -> impl Iterator<Item = &str> {
    self.columns.iter().map(|c| c.name.as_str())
  }

  /// Columns the oracle must return on every row.
  pub fn oracle_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
    self.columns.iter().filter(|c| c.origin == ColumnOrigin::Oracle)
  }

  /// Compare an oracle row against the oracle columns. Returns the missing
  /// and unexpected column names; values are not inspected.
  pub fn diff_oracle_row(&self, row: &Record) -> (Vec<String>, Vec<String>) {
    let expected: BTreeSet<&str> = self.oracle_columns().map(|c| c.name.as_str()).collect();
    let missing = expected
      .iter()
      .filter(|name| !row.contains_key(**name))
      .map(|name| name.to_string())
      .collect();
    let unexpected = row
      .keys()
      .filter(|k| !expected.contains(k.as_str()))
      .cloned()
      .collect();
    (missing, unexpected)
  }

  /// Check that `record` carries exactly the ledger columns, each with a
  /// value of the declared type.
  pub fn validate_record(&self, context: &str, record: &Record) -> Result<(), SchemaMismatch> {
    let mut mismatch = SchemaMismatch { context: context.to_string(), ..Default::default() };

    for column in &self.columns {
      match record.get(&column.name) {
        None => mismatch.missing.push(column.name.clone()),
        Some(value) if !value_matches(column, value) => {
          mismatch.invalid.push(column.name.clone())
        }
        Some(_) => {}
      }
    }
    for key in record.keys() {
      if self.column(key).is_none() {
        mismatch.unexpected.push(key.clone());
      }
    }

    if mismatch.is_empty() { Ok(()) } else { Err(mismatch) }
  }
}

fn value_matches(column: &ColumnSpec, value: &serde_json::Value) -> bool {
  use serde_json::Value;

  match value {
    Value::Null => return column.nullable,
    Value::String(s) if s == UNKNOWN_MARKER => return column.nullable,
    _ => {}
  }
  match column.ty {
    ColumnType::Text => value.is_string(),
    ColumnType::Integer => value.is_i64() || value.is_u64(),
    ColumnType::Number => value.is_number(),
    ColumnType::Boolean => value.is_boolean(),
    ColumnType::Date => value
      .as_str()
      .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
    ColumnType::TextList => value
      .as_array()
      .is_some_and(|items| items.iter().all(|v| v.is_string())),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn full_record(schema: &LedgerSchema) -> Record {
    schema
      .columns
      .iter()
      .map(|c| {
        let value = match (c.nullable, c.ty) {
          (true, _) => json!(null),
          (false, ColumnType::Text) => json!("x"),
          (false, ColumnType::Integer) => json!(1),
          (false, ColumnType::Boolean) => json!(false),
          (false, ColumnType::TextList) => json!([]),
          (false, _) => json!(0),
        };
        (c.name.clone(), value)
      })
      .collect()
  }

  #[test]
  fn column_names_are_unique() {
    let schema = LedgerSchema::current();
    let names: BTreeSet<_> = schema.column_names().collect();
    assert_eq!(names.len(), schema.columns.len());
  }

  #[test]
  fn exact_record_validates() {
    let schema = LedgerSchema::current();
    assert!(schema.validate_record("row", &full_record(&schema)).is_ok());
  }

  #[test]
  fn missing_and_extra_columns_are_reported() {
    let schema = LedgerSchema::current();
    let mut record = full_record(&schema);
    record.remove("unit_price");
    record.insert("colour".into(), json!("red"));

    let err = schema.validate_record("row 3", &record).unwrap_err();
    assert_eq!(err.missing, vec!["unit_price".to_string()]);
    assert_eq!(err.unexpected, vec!["colour".to_string()]);
  }

  #[test]
  fn unknown_marker_only_on_nullable_columns() {
    let schema = LedgerSchema::current();
    let mut record = full_record(&schema);
    record.insert("monthly_recurring_price".into(), json!("unknown"));
    assert!(schema.validate_record("row", &record).is_ok());

    record.insert("product_name".into(), json!(null));
    let err = schema.validate_record("row", &record).unwrap_err();
    assert_eq!(err.invalid, vec!["product_name".to_string()]);
  }

  #[test]
  fn oracle_row_diff() {
    let schema = LedgerSchema::current();
    let mut row: Record = schema.oracle_columns().map(|c| (c.name.clone(), json!(null))).collect();
    row.remove("currency");
    row.insert("notes_libres".into(), json!("?"));

    let (missing, unexpected) = schema.diff_oracle_row(&row);
    assert_eq!(missing, vec!["currency".to_string()]);
    assert_eq!(unexpected, vec!["notes_libres".to_string()]);
  }
}
