//! SQLite backend for the Loyer document, ledger and extraction stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. One [`SqliteStore`] implements
//! all three store traits of `loyer-core`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_SNAPSHOT_RETENTION, SqliteStore};
