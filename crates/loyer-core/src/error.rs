//! Error types for `loyer-core`.

use thiserror::Error;

use crate::{document::AffairKey, schema::SchemaMismatch};

/// Errors that abort the reconciliation of one affair.
///
/// Recoverable conditions (a failed oracle call, an ambiguous date, a
/// non-computable aggregate) are not errors; they are recorded as
/// [`crate::ledger::Issue`]s on the ledger.
#[derive(Debug, Error)]
pub enum Error {
  #[error("affair {affair}: {reason}")]
  Classification { affair: AffairKey, reason: String },

  #[error(transparent)]
  SchemaMismatch(#[from] SchemaMismatch),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
