//! Layered settings: an optional TOML file, then `LOYER_` environment
//! variables (`__` separates nested keys, e.g.
//! `LOYER_PIPELINE__MAX_CONCURRENT_CALLS=4`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use loyer_reconcile::{ClassifierConfig, PipelineConfig, ReconcileConfig, SequencerConfig};
use loyer_store_sqlite::DEFAULT_SNAPSHOT_RETENTION;
use serde::Deserialize;

use crate::oracle::OracleSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite file holding documents, ledgers and cached extractions.
  pub store_path:         PathBuf,
  /// Ledger snapshots kept per affair, the current one included.
  pub snapshot_retention: usize,
  pub oracle:             OracleSettings,
  pub classifier:         ClassifierConfig,
  pub sequencer:          SequencerConfig,
  pub pipeline:           PipelineConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:         PathBuf::from("loyer.db"),
      snapshot_retention: DEFAULT_SNAPSHOT_RETENTION,
      oracle:             OracleSettings::default(),
      classifier:         ClassifierConfig::default(),
      sequencer:          SequencerConfig::default(),
      pipeline:           PipelineConfig::default(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("LOYER")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn reconcile(&self) -> ReconcileConfig {
    ReconcileConfig {
      classifier: self.classifier.clone(),
      sequencer:  self.sequencer.clone(),
      pipeline:   self.pipeline.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let settings = Settings::load(Path::new("/nonexistent/loyer.toml")).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("loyer.db"));
    assert_eq!(settings.snapshot_retention, DEFAULT_SNAPSHOT_RETENTION);
    assert_eq!(settings.pipeline.max_concurrent_calls, 8);
    assert_eq!(settings.sequencer.tail_window_chars, 4000);
  }

  #[test]
  fn example_file_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../loyer.example.toml");
    let settings = Settings::load(&path).unwrap();
    assert!(settings.classifier.amendment_markers.contains(&"avenant".to_string()));
    assert!(!settings.classifier.subscription_markers.is_empty());
    assert_eq!(settings.pipeline.call_timeout_secs, 180);
    assert_eq!(settings.snapshot_retention, 10);
  }
}
