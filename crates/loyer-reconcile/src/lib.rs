//! Reconciliation engine for Loyer.
//!
//! Turns the documents of an affair into one ledger: classify the documents,
//! sequence the amendments, validate the oracle output, build the product
//! rows with their derived amounts, segment the contract into periods and
//! assemble the result. [`Pipeline`] drives this for many affairs at once
//! against any [`loyer_core::store`] backend and [`loyer_core::oracle`].

pub mod adapter;
pub mod assemble;
pub mod classify;
pub mod config;
pub mod derive;
pub mod engine;
pub mod error;
pub mod period;
pub mod pipeline;
pub mod precedence;
pub mod row;
pub mod sequence;
pub mod state;


pub use classify::Classifier;
pub use config::{ClassifierConfig, PipelineConfig, ReconcileConfig, SequencerConfig};
pub use error::{Error, Result};
pub use pipeline::{AffairOutcome, Pipeline};
pub use sequence::Sequencer;
