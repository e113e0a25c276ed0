//! Engine settings. Deserialised by the binary from its config file.

use serde::{Deserialize, Serialize};

/// Case-insensitive substring markers matched against a document's
/// identifier and title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
  pub master_markers:       Vec<String>,
  pub subscription_markers: Vec<String>,
  pub amendment_markers:    Vec<String>,
  /// Documents matching any of these are dropped before classification.
  pub exclusion_markers:    Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
  /// Trailing characters of the content searched for a signature date.
  pub tail_window_chars: usize,
}

impl Default for SequencerConfig {
  fn default() -> Self { Self { tail_window_chars: 4000 } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Affairs reconciled at the same time.
  pub max_parallel_affairs: usize,
  /// Oracle calls in flight across all affairs.
  pub max_concurrent_calls: usize,
  pub call_timeout_secs:    u64,
  /// Ignore cached extractions and call the oracle again.
  pub reextract:            bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_parallel_affairs: 4,
      max_concurrent_calls: 8,
      call_timeout_secs:    180,
      reextract:            false,
    }
  }
}

/// Everything the pipeline needs besides its stores and oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  pub classifier: ClassifierConfig,
  pub sequencer:  SequencerConfig,
  pub pipeline:   PipelineConfig,
}
