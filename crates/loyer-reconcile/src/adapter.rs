//! The oracle boundary: turns a raw [`OracleResponse`] into typed rows.
//!
//! A response missing any oracle column, or carrying a value that does not
//! fit its column, is rejected as a whole. Columns outside the schema are
//! stripped and noted on the row.

use loyer_core::{
  oracle::{OracleResponse, OracleRow},
  product::Annotation,
  schema::{LedgerSchema, Record, SchemaMismatch},
  terms::DocumentTerms,
};
use tracing::warn;

/// An oracle row that passed the schema contract.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedRow {
  /// 0-based position in the oracle response.
  pub position:    u32,
  pub row:         OracleRow,
  pub annotations: Vec<Annotation>,
}

/// The typed output of one oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
  pub document_id: String,
  pub terms:       DocumentTerms,
  pub rows:        Vec<AdaptedRow>,
}

/// Validate and type one oracle response.
pub fn adapt(
  schema: &LedgerSchema,
  document_id: &str,
  response: OracleResponse,
) -> Result<Extraction, SchemaMismatch> {
  let terms: DocumentTerms =
    serde_json::from_value(serde_json::Value::Object(response.terms)).map_err(|e| {
      SchemaMismatch {
        context: format!("{document_id} terms"),
        invalid: vec![e.to_string()],
        ..Default::default()
      }
    })?;

  let rows = response
    .rows
    .into_iter()
    .zip(0u32..)
    .map(|(raw, position)| adapt_row(schema, document_id, position, raw))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(Extraction { document_id: document_id.to_string(), terms, rows })
}

fn adapt_row(
  schema: &LedgerSchema,
  document_id: &str,
  position: u32,
  mut raw: Record,
) -> Result<AdaptedRow, SchemaMismatch> {
  let context = format!("{document_id} row {position}");
  let (missing, unexpected) = schema.diff_oracle_row(&raw);

  let invalid: Vec<String> = schema
    .oracle_columns()
    .filter(|c| !c.nullable && raw.get(&c.name).is_some_and(|v| v.is_null()))
    .map(|c| c.name.clone())
    .collect();
  if !missing.is_empty() || !invalid.is_empty() {
    return Err(SchemaMismatch { context, missing, invalid, ..Default::default() });
  }

  let mut annotations = Vec::with_capacity(unexpected.len());
  for column in unexpected {
    warn!(document = %document_id, position, column = %column, "stripping unexpected column");
    raw.remove(&column);
    annotations.push(Annotation::unexpected_column(&column));
  }

  let row: OracleRow = serde_json::from_value(serde_json::Value::Object(raw))
    .map_err(|e| SchemaMismatch { context, invalid: vec![e.to_string()], ..Default::default() })?;

  Ok(AdaptedRow { position, row, annotations })
}
