//! Error type for `loyer-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("document not found: {0}")]
  DocumentNotFound(String),

  /// A stored value does not fit its column, e.g. a negative page count.
  #[error("corrupt row in {table}: {detail}")]
  Corrupt { table: &'static str, detail: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
