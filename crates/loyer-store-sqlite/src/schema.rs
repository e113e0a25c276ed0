//! SQL schema for the Loyer SQLite store.
//!
//! Executed once at connection startup. Migrations are gated on
//! `PRAGMA user_version`.

/// Value of `PRAGMA user_version` once [`SCHEMA`] has run.
pub const USER_VERSION: i64 = 2;

/// Run before [`SCHEMA`] on a version 1 database. Cached extractions carried
/// no content digest and cannot be trusted.
pub const MIGRATE_FROM_1: &str = "DROP TABLE IF EXISTS extractions;";

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Listing order is rowid order; re-importing a document keeps its rowid.
CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    affair      TEXT NOT NULL,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    page_count  INTEGER NOT NULL,
    language    TEXT,
    imported_at TEXT NOT NULL    -- ISO 8601 UTC
);

-- The latest snapshot per affair is current; older ones are pruned past the
-- store's retention.
CREATE TABLE IF NOT EXISTS ledger_snapshots (
    snapshot_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    affair         TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    digest         TEXT NOT NULL,  -- hex SHA-256 over the records
    row_count      INTEGER NOT NULL,
    ledger_json    TEXT NOT NULL,
    stored_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS extractions (
    document_id    TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    content_digest TEXT NOT NULL,  -- hex SHA-256 of the extracted content
    response_json  TEXT NOT NULL,
    stored_at      TEXT NOT NULL,
    PRIMARY KEY (document_id, schema_version)
);

CREATE INDEX IF NOT EXISTS documents_affair_idx ON documents(affair);
CREATE INDEX IF NOT EXISTS snapshots_affair_idx ON ledger_snapshots(affair, snapshot_id);

PRAGMA user_version = 2;
";
