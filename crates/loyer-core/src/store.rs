//! Storage traits.
//!
//! Implemented by storage backends (e.g. `loyer-store-sqlite`). The pipeline
//! and the CLI depend on these abstractions, not on any concrete backend.

use std::future::Future;

use crate::{
  document::{AffairFilter, AffairKey, DocumentRef, SourceDocument},
  ledger::{Ledger, StoredLedger, UpsertAck},
  oracle::OracleResponse,
};

/// Read access to digitised documents, plus the write used at import.
///
/// All methods return `Send` futures so the traits can be used from tasks
/// spawned on a multi-threaded tokio runtime.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Documents of one affair, in listing order.
  fn list(
    &self,
    filter: AffairFilter,
  ) -> impl Future<Output = Result<Vec<DocumentRef>, Self::Error>> + Send + '_;

  /// Load a document's content. Errors if the document does not exist.
  fn fetch(
    &self,
    doc: DocumentRef,
  ) -> impl Future<Output = Result<SourceDocument, Self::Error>> + Send + '_;

  /// Insert or replace a document. Listing order is insertion order.
  fn put(
    &self,
    doc: SourceDocument,
  ) -> impl Future<Output = Result<DocumentRef, Self::Error>> + Send + '_;

  /// Every affair with at least one document.
  fn affairs(&self) -> impl Future<Output = Result<Vec<AffairKey>, Self::Error>> + Send + '_;
}

/// Persistence of ledger snapshots. One snapshot per affair; an upsert
/// replaces the whole snapshot, never individual rows.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn upsert(
    &self,
    ledger: Ledger,
  ) -> impl Future<Output = Result<UpsertAck, Self::Error>> + Send + '_;

  /// The latest snapshot, or `None` if the affair was never reconciled.
  fn get(
    &self,
    affair: AffairKey,
  ) -> impl Future<Output = Result<Option<StoredLedger>, Self::Error>> + Send + '_;
}

/// Identity of a cached extraction. A response is only reused for the
/// same document text under the same schema version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractionKey {
  pub document_id:    String,
  pub schema_version: u32,
  /// Hex SHA-256 of the document content the response was read from.
  pub content_digest: String,
}

/// Cached oracle responses. Only responses that passed the schema contract
/// are stored.
pub trait ExtractionCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The cached response for `key`, or `None` when the document was never
  /// extracted under that schema version or its content changed since.
  fn load(
    &self,
    key: ExtractionKey,
  ) -> impl Future<Output = Result<Option<OracleResponse>, Self::Error>> + Send + '_;

  /// Record `response`, replacing any earlier response for the same
  /// document and schema version.
  fn store(
    &self,
    key: ExtractionKey,
    response: OracleResponse,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
