//! Core types and trait definitions for the Loyer contract ledger.
//!
//! Documents, product rows, the ledger schema and the store and oracle
//! traits. No IO happens here; the reconciliation engine, the storage
//! backends and the CLI build on these types.

// The store and oracle traits spell out `Send` bounds on returned futures.
#![allow(async_fn_in_trait)]

pub mod cadence;
pub mod document;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod product;
pub mod schema;
pub mod store;
pub mod terms;
pub mod value;

pub use error::{Error, Result};
pub use value::{Amount, Field};
