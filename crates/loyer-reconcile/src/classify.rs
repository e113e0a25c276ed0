//! Document classification: master, subscription or amendment.

use loyer_core::{
  document::{Affair, AffairKey, Document, DocumentKind, SourceDocument},
  ledger::Issue,
};
use tracing::{info, warn};

use crate::config::ClassifierConfig;

/// Buckets the documents of an affair by marker matching.
#[derive(Debug, Clone)]
pub struct Classifier {
  master:       Vec<String>,
  subscription: Vec<String>,
  amendment:    Vec<String>,
  exclusions:   Vec<String>,
}

/// An affair whose documents are bucketed but whose amendments are still in
/// listing order.
#[derive(Debug, Clone)]
pub struct Classified {
  pub affair: Affair,
  pub issues: Vec<Issue>,
}

fn lowered(markers: &[String]) -> Vec<String> {
  markers
    .iter()
    .map(|m| m.trim().to_lowercase())
    .filter(|m| !m.is_empty())
    .collect()
}

fn matches_any(tag: &str, markers: &[String]) -> bool {
  markers.iter().any(|m| tag.contains(m.as_str()))
}

impl Classifier {
  pub fn new(config: &ClassifierConfig) -> Self {
    Self {
      master:       lowered(&config.master_markers),
      subscription: lowered(&config.subscription_markers),
      amendment:    lowered(&config.amendment_markers),
      exclusions:   lowered(&config.exclusion_markers),
    }
  }

  pub fn is_excluded(&self, doc: &SourceDocument) -> bool {
    matches_any(&doc.name_tag(), &self.exclusions)
  }

  /// Kind of a single document. Amendment markers take precedence over
  /// subscription markers, which take precedence over master markers.
  pub fn kind_of(&self, doc: &SourceDocument) -> Option<DocumentKind> {
    let tag = doc.name_tag();
    if matches_any(&tag, &self.amendment) {
      Some(DocumentKind::Amendment)
    } else if matches_any(&tag, &self.subscription) {
      Some(DocumentKind::Subscription)
    } else if matches_any(&tag, &self.master) {
      Some(DocumentKind::Master)
    } else {
      None
    }
  }

  /// Bucket `docs` (in listing order) into an [`Affair`].
  ///
  /// Fails with [`loyer_core::Error::Classification`] when no subscription
  /// document is found.
  pub fn classify(
    &self,
    key: AffairKey,
    docs: Vec<SourceDocument>,
  ) -> loyer_core::Result<Classified> {
    let mut affair = Affair {
      key:           key.clone(),
      master:        None,
      subscriptions: Vec::new(),
      amendments:    Vec::new(),
    };
    let mut issues = Vec::new();

    for doc in docs {
      if self.is_excluded(&doc) {
        info!(affair = %key, document = %doc.document_id, "excluded by marker");
        continue;
      }
      match self.kind_of(&doc) {
        Some(DocumentKind::Master) if affair.master.is_some() => {
          warn!(affair = %key, document = %doc.document_id, "second master document ignored");
          issues.push(Issue::DuplicateMaster { document_id: doc.document_id });
        }
        Some(DocumentKind::Master) => {
          affair.master = Some(Document::new(doc, DocumentKind::Master));
        }
        Some(DocumentKind::Subscription) => {
          affair.subscriptions.push(Document::new(doc, DocumentKind::Subscription));
        }
        Some(DocumentKind::Amendment) => {
          affair.amendments.push(Document::new(doc, DocumentKind::Amendment));
        }
        None => {
          warn!(affair = %key, document = %doc.document_id, "document matches no marker");
          issues.push(Issue::Unclassified { document_id: doc.document_id });
        }
      }
    }

    if affair.subscriptions.is_empty() {
      return Err(loyer_core::Error::Classification {
        affair: key,
        reason: "no subscription document".into(),
      });
    }

    Ok(Classified { affair, issues })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tests::{classifier_config, source};

  #[test]
  fn amendment_marker_wins_over_subscription() {
    let classifier = Classifier::new(&classifier_config());
    // "souscription" and "avenant-" both match.
    let doc = source("acme-avenant-1-souscription", "");
    assert_eq!(classifier.kind_of(&doc), Some(DocumentKind::Amendment));
  }

  #[test]
  fn buckets_and_exclusions() {
    let classifier = Classifier::new(&classifier_config());
    let docs = vec![
      source("acme-cg-2015", ""),
      source("acme-souscription-2015", ""),
      source("acme-plan-projet-generix", ""),
      source("acme-avenant-201601", ""),
      source("acme-facture", ""),
    ];

    let classified = classifier.classify(AffairKey::new("acme"), docs).unwrap();
    let affair = classified.affair;

    assert_eq!(affair.master.as_ref().map(|d| d.id()), Some("acme-cg-2015"));
    assert_eq!(affair.subscriptions.len(), 1);
    assert_eq!(affair.amendments.len(), 1);
    assert_eq!(
      classified.issues,
      vec![Issue::Unclassified { document_id: "acme-facture".into() }]
    );
  }

  #[test]
  fn missing_subscription_is_a_classification_error() {
    let classifier = Classifier::new(&classifier_config());
    let docs = vec![source("acme-cg-2015", ""), source("acme-avenant-201601", "")];

    let err = classifier.classify(AffairKey::new("acme"), docs).unwrap_err();
    assert!(matches!(err, loyer_core::Error::Classification { .. }));
  }

  #[test]
  fn markers_are_case_insensitive() {
    let config = ClassifierConfig {
      subscription_markers: vec!["SOUSCRIPTION".into()],
      ..Default::default()
    };
    let classifier = Classifier::new(&config);
    assert_eq!(
      classifier.kind_of(&source("ACME-Souscription", "")),
      Some(DocumentKind::Subscription)
    );
  }
}
