//! The extraction oracle boundary.
//!
//! The oracle reads one document and returns its document-level terms and
//! product rows as JSON. Its output is treated as ground truth for that
//! document, but only after the schema contract has been checked.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  document::DocumentKind,
  product::{ConfidenceScores, Evidence, Overconsumption, Pricing, ProductIdentity, RowTerms},
  schema::{LedgerSchema, Record},
};

/// Everything the oracle needs to read one document.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest<'a> {
  pub document_id: &'a str,
  pub kind:        DocumentKind,
  pub content:     &'a str,
  pub schema:      &'a LedgerSchema,
}

/// Raw oracle output for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
  /// Document-level fields; see [`crate::terms::DocumentTerms`].
  #[serde(default)]
  pub terms: Record,
  /// One object per product row, keyed by oracle column names.
  #[serde(default)]
  pub rows:  Vec<Record>,
}

/// An oracle row after validation, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleRow {
  #[serde(flatten)]
  pub terms:      RowTerms,
  #[serde(flatten)]
  pub product:    ProductIdentity,
  #[serde(flatten)]
  pub pricing:    Pricing,
  #[serde(flatten)]
  pub usage:      Overconsumption,
  #[serde(flatten)]
  pub evidence:   Evidence,
  #[serde(flatten)]
  pub confidence: ConfidenceScores,
}

/// A natural-language field extractor.
///
/// Implementations must be safe to call concurrently; the pipeline bounds the
/// number of calls in flight and applies its own timeout.
pub trait ExtractionOracle: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Extract the terms and product rows of one document.
  fn extract<'a>(
    &'a self,
    request: OracleRequest<'a>,
  ) -> impl Future<Output = Result<OracleResponse, Self::Error>> + Send + 'a;
}
