//! Error types for the reconciliation engine and pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] loyer_core::Error),

  #[error("document store error: {0}")]
  DocumentStore(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("ledger store error: {0}")]
  LedgerStore(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("affair {affair} has no documents")]
  EmptyAffair { affair: String },

  #[error("affair {affair}: ledger carries no subscription rows")]
  NoSubscriptionRows { affair: String },
}

impl From<loyer_core::schema::SchemaMismatch> for Error {
  fn from(mismatch: loyer_core::schema::SchemaMismatch) -> Self {
    Self::Core(mismatch.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
