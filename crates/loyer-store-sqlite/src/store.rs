//! [`SqliteStore`]: the SQLite implementation of the Loyer store traits.

use std::path::Path;

use chrono::Utc;
use loyer_core::{
  document::{AffairFilter, AffairKey, DocumentRef, SourceDocument},
  ledger::{Ledger, StoredLedger, UpsertAck},
  oracle::OracleResponse,
  store::{DocumentStore, ExtractionCache, ExtractionKey, LedgerStore},
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{RawDocument, RawSnapshot, encode_dt},
  schema::{MIGRATE_FROM_1, SCHEMA, USER_VERSION},
};

/// Snapshots kept per affair unless configured otherwise.
pub const DEFAULT_SNAPSHOT_RETENTION: usize = 20;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Documents, ledger snapshots and cached extractions in one SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:      tokio_rusqlite::Connection,
  retention: usize,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, retention: DEFAULT_SNAPSHOT_RETENTION };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests and dry runs.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, retention: DEFAULT_SNAPSHOT_RETENTION };
    store.init_schema().await?;
    Ok(store)
  }

  /// Keep at most `keep` snapshots per affair, the current one included.
  /// Zero is treated as one.
  pub fn with_snapshot_retention(mut self, keep: usize) -> Self {
    self.retention = keep.max(1);
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > 0 && version < USER_VERSION {
          conn.execute_batch(MIGRATE_FROM_1)?;
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of snapshots retained for `affair`, current one included.
  pub async fn snapshot_count(&self, affair: &AffairKey) -> Result<usize> {
    let affair = affair.as_str().to_owned();
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM ledger_snapshots WHERE affair = ?1",
          rusqlite::params![affair],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(count).unwrap_or_default())
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn list(&self, filter: AffairFilter) -> Result<Vec<DocumentRef>> {
    let affair = filter.affair;
    let key = affair.as_str().to_owned();

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT document_id FROM documents WHERE affair = ?1 ORDER BY rowid")?;
        let ids = stmt
          .query_map(rusqlite::params![key], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
      })
      .await?;

    Ok(
      ids
        .into_iter()
        .map(|document_id| DocumentRef { document_id, affair: affair.clone() })
        .collect(),
    )
  }

  async fn fetch(&self, doc: DocumentRef) -> Result<SourceDocument> {
    let id = doc.document_id.clone();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT document_id, affair, title, content, page_count, language
               FROM documents WHERE document_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(RawDocument {
                  document_id: row.get(0)?,
                  affair:      row.get(1)?,
                  title:       row.get(2)?,
                  content:     row.get(3)?,
                  page_count:  row.get(4)?,
                  language:    row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    match raw {
      Some(raw) => raw.into_document(),
      None => Err(Error::DocumentNotFound(doc.document_id)),
    }
  }

  async fn put(&self, doc: SourceDocument) -> Result<DocumentRef> {
    let reference =
      DocumentRef { document_id: doc.document_id.clone(), affair: doc.affair.clone() };
    let at_str = encode_dt(Utc::now());
    let affair = doc.affair.as_str().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (
             document_id, affair, title, content, page_count, language, imported_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (document_id) DO UPDATE SET
             affair = excluded.affair,
             title = excluded.title,
             content = excluded.content,
             page_count = excluded.page_count,
             language = excluded.language,
             imported_at = excluded.imported_at",
          rusqlite::params![
            doc.document_id,
            affair,
            doc.title,
            doc.content,
            doc.page_count,
            doc.language,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(reference)
  }

  async fn affairs(&self) -> Result<Vec<AffairKey>> {
    let keys: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT affair FROM documents ORDER BY affair")?;
        let keys = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
      })
      .await?;

    Ok(keys.into_iter().map(AffairKey::new).collect())
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  async fn upsert(&self, ledger: Ledger) -> Result<UpsertAck> {
    let stored_at = Utc::now();
    let affair = ledger.affair.clone();
    let digest = ledger.digest.clone();
    let row_count = ledger.entries.len();

    let key = affair.as_str().to_owned();
    let version = ledger.schema_version;
    let digest_str = digest.clone();
    let rows = i64::try_from(row_count).unwrap_or(i64::MAX);
    let ledger_json = serde_json::to_string(&ledger)?;
    let at_str = encode_dt(stored_at);
    let keep = i64::try_from(self.retention).unwrap_or(i64::MAX);

    let replaced = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let previous: i64 = tx.query_row(
          "SELECT COUNT(*) FROM ledger_snapshots WHERE affair = ?1",
          rusqlite::params![key],
          |row| row.get(0),
        )?;
        tx.execute(
          "INSERT INTO ledger_snapshots (
             affair, schema_version, digest, row_count, ledger_json, stored_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![key, version, digest_str, rows, ledger_json, at_str],
        )?;
        tx.execute(
          "DELETE FROM ledger_snapshots
           WHERE affair = ?1 AND snapshot_id NOT IN (
             SELECT snapshot_id FROM ledger_snapshots
             WHERE affair = ?1 ORDER BY snapshot_id DESC LIMIT ?2
           )",
          rusqlite::params![key, keep],
        )?;
        tx.commit()?;
        Ok(previous > 0)
      })
      .await?;

    Ok(UpsertAck { affair, digest, row_count, replaced, stored_at })
  }

  async fn get(&self, affair: AffairKey) -> Result<Option<StoredLedger>> {
    let key = affair.as_str().to_owned();

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT ledger_json, stored_at FROM ledger_snapshots
               WHERE affair = ?1 ORDER BY snapshot_id DESC LIMIT 1",
              rusqlite::params![key],
              |row| Ok(RawSnapshot { ledger_json: row.get(0)?, stored_at: row.get(1)? }),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSnapshot::into_stored).transpose()
  }
}

// ─── ExtractionCache impl ────────────────────────────────────────────────────

impl ExtractionCache for SqliteStore {
  type Error = Error;

  async fn load(&self, key: ExtractionKey) -> Result<Option<OracleResponse>> {
    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT response_json FROM extractions
               WHERE document_id = ?1 AND schema_version = ?2 AND content_digest = ?3",
              rusqlite::params![key.document_id, key.schema_version, key.content_digest],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
  }

  async fn store(&self, key: ExtractionKey, response: OracleResponse) -> Result<()> {
    let json = serde_json::to_string(&response)?;
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO extractions (
             document_id, schema_version, content_digest, response_json, stored_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (document_id, schema_version) DO UPDATE SET
             content_digest = excluded.content_digest,
             response_json = excluded.response_json,
             stored_at = excluded.stored_at",
          rusqlite::params![
            key.document_id,
            key.schema_version,
            key.content_digest,
            json,
            at_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
