//! Documents and affairs.
//!
//! A document is created once at ingestion and never mutated. Classification
//! and sequencing wrap it in a [`Document`] rather than editing it.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

// ─── Affair ──────────────────────────────────────────────────────────────────

/// Stable key of one client contract relationship (company/contract slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffairKey(String);

impl AffairKey {
  /// Build a key, normalising to lowercase and trimming whitespace.
  pub fn new(raw: impl AsRef<str>) -> Self {
    Self(raw.as_ref().trim().to_lowercase())
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for AffairKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Parameters for [`crate::store::DocumentStore::list`].
#[derive(Debug, Clone)]
pub struct AffairFilter {
  pub affair: AffairKey,
}

impl AffairFilter {
  pub fn new(affair: AffairKey) -> Self { Self { affair } }
}

// ─── Raw documents ───────────────────────────────────────────────────────────

/// Pointer to a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
  pub document_id: String,
  pub affair:      AffairKey,
}

/// A digitised document as it comes out of the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
  /// Identifier, usually the slugged original file name.
  pub document_id: String,
  pub affair:      AffairKey,
  /// Human-readable title (original file name).
  pub title:       String,
  /// Text content produced by layout extraction.
  pub content:     String,
  pub page_count:  u32,
  pub language:    Option<String>,
}

impl SourceDocument {
  /// Lowercase name/tag string the classifier and sequencer match against.
  pub fn name_tag(&self) -> String {
    format!("{} {}", self.document_id, self.title).to_lowercase()
  }
}

// ─── Classified documents ────────────────────────────────────────────────────

/// The role a document plays in an affair.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
  /// General terms ("conditions générales", cadre).
  Master,
  /// Client-specific terms ("conditions particulières", souscription).
  Subscription,
  /// A dated modification signed after the subscription (avenant).
  Amendment,
}

/// How an amendment's signature date was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
  /// Parsed from the signature block near the end of the content.
  Content,
  /// Derived from the `YYYYMM` token in the file name; low confidence.
  FileName,
  /// Neither signal was available.
  None,
}

/// A document after classification (and sequencing, for amendments).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub source:           SourceDocument,
  pub kind:             DocumentKind,
  /// 1-based chronological position; amendments only.
  pub amendment_number: Option<u32>,
  /// Signature date inferred by the sequencer; amendments only.
  pub signature_date:   Option<NaiveDate>,
  pub date_source:      Option<DateSource>,
}

impl Document {
  pub fn new(source: SourceDocument, kind: DocumentKind) -> Self {
    Self {
      source,
      kind,
      amendment_number: None,
      signature_date: None,
      date_source: None,
    }
  }

  pub fn id(&self) -> &str { &self.source.document_id }
}

/// The documents of one affair, bucketed and ordered.
#[derive(Debug, Clone)]
pub struct Affair {
  pub key:           AffairKey,
  pub master:        Option<Document>,
  /// Never empty once classification succeeded.
  pub subscriptions: Vec<Document>,
  /// In chronological order once sequenced.
  pub amendments:    Vec<Document>,
}

impl Affair {
  /// All documents in ledger order: master, subscriptions, amendments.
  pub fn documents(&self) -> impl Iterator<Item = &Document> {
    self
      .master
      .iter()
      .chain(self.subscriptions.iter())
      .chain(self.amendments.iter())
  }
}
