//! The per-affair pipeline: fetch, classify, sequence, extract, reconcile,
//! persist.
//!
//! Affairs are independent. A failure in one affair is reported in its
//! outcome and never stops the others. Oracle calls are bounded by a
//! semaphore shared by every affair in flight.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{
  StreamExt,
  future::{join_all, try_join_all},
  stream,
};
use loyer_core::{
  document::{AffairFilter, AffairKey, Document},
  ledger::{Issue, UpsertAck},
  oracle::{ExtractionOracle, OracleRequest, OracleResponse},
  schema::LedgerSchema,
  store::{DocumentStore, ExtractionCache, ExtractionKey, LedgerStore},
};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result, adapter,
  classify::{Classified, Classifier},
  config::{PipelineConfig, ReconcileConfig},
  engine,
  sequence::Sequencer,
};

/// Result of reconciling one affair.
#[derive(Debug)]
pub enum AffairOutcome {
  Completed { ack: UpsertAck, issues: Vec<Issue> },
  Failed { affair: AffairKey, error: Error },
}

impl AffairOutcome {
  pub fn is_failed(&self) -> bool { matches!(self, Self::Failed { .. }) }
}

pub struct Pipeline<D, L, C, O> {
  documents:  D,
  ledgers:    L,
  cache:      C,
  oracle:     O,
  schema:     LedgerSchema,
  classifier: Classifier,
  sequencer:  Sequencer,
  config:     PipelineConfig,
  permits:    Arc<Semaphore>,
}

impl<D, L, C, O> Pipeline<D, L, C, O>
where
  D: DocumentStore,
  L: LedgerStore,
  C: ExtractionCache,
  O: ExtractionOracle,
{
  pub fn new(
    documents: D,
    ledgers: L,
    cache: C,
    oracle: O,
    schema: LedgerSchema,
    config: &ReconcileConfig,
  ) -> Self {
    Self {
      documents,
      ledgers,
      cache,
      oracle,
      schema,
      classifier: Classifier::new(&config.classifier),
      sequencer: Sequencer::new(&config.sequencer),
      config: config.pipeline.clone(),
      permits: Arc::new(Semaphore::new(config.pipeline.max_concurrent_calls.max(1))),
    }
  }

  pub fn schema(&self) -> &LedgerSchema { &self.schema }

  /// Every affair known to the document store.
  pub async fn affairs(&self) -> Result<Vec<AffairKey>> {
    self.documents.affairs().await.map_err(|e| Error::DocumentStore(Box::new(e)))
  }

  /// Reconcile `affairs`, at most `max_parallel_affairs` at a time. Outcomes
  /// come back in input order.
  pub async fn run(&self, affairs: Vec<AffairKey>) -> Vec<AffairOutcome> {
    stream::iter(affairs)
      .map(|key| async move {
        match self.reconcile(key.clone()).await {
          Ok((ack, issues)) => {
            info!(
              affair = %ack.affair,
              rows = ack.row_count,
              issues = issues.len(),
              replaced = ack.replaced,
              "ledger stored"
            );
            AffairOutcome::Completed { ack, issues }
          }
          Err(err) => {
            error!(affair = %key, error = %err, "affair failed");
            AffairOutcome::Failed { affair: key, error: err }
          }
        }
      })
      .buffered(self.config.max_parallel_affairs.max(1))
      .collect()
      .await
  }

  /// Reconcile one affair and replace its stored ledger.
  pub async fn reconcile(&self, key: AffairKey) -> Result<(UpsertAck, Vec<Issue>)> {
    let refs = self
      .documents
      .list(AffairFilter::new(key.clone()))
      .await
      .map_err(|e| Error::DocumentStore(Box::new(e)))?;
    if refs.is_empty() {
      return Err(Error::EmptyAffair { affair: key.to_string() });
    }
    let sources = try_join_all(refs.into_iter().map(|r| self.documents.fetch(r)))
      .await
      .map_err(|e| Error::DocumentStore(Box::new(e)))?;

    let Classified { mut affair, mut issues } = self.classifier.classify(key.clone(), sources)?;
    let (amendments, sequencing) = self.sequencer.sequence(std::mem::take(&mut affair.amendments));
    affair.amendments = amendments;
    issues.extend(sequencing);

    let mut responses = HashMap::new();
    for (document_id, result) in join_all(affair.documents().map(|doc| self.extract(doc))).await {
      match result {
        Ok(response) => {
          responses.insert(document_id, response);
        }
        Err(message) => issues.push(Issue::OracleCall { document_id, message }),
      }
    }

    let ledger = engine::reconcile(&self.schema, &affair, responses, issues)?;
    if ledger.subscription_row_count() == 0 {
      return Err(Error::NoSubscriptionRows { affair: key.to_string() });
    }
    let issues = ledger.issues.clone();
    let ack = self
      .ledgers
      .upsert(ledger)
      .await
      .map_err(|e| Error::LedgerStore(Box::new(e)))?;
    Ok((ack, issues))
  }

  /// Oracle response for one document, from the cache when allowed. Errors
  /// are returned as messages; they become issues, not failures.
  async fn extract(&self, doc: &Document) -> (String, Result<OracleResponse, String>) {
    let document_id = doc.id().to_string();
    let key = ExtractionKey {
      document_id:    document_id.clone(),
      schema_version: self.schema.version,
      content_digest: hex::encode(Sha256::digest(doc.source.content.as_bytes())),
    };

    if !self.config.reextract {
      match self.cache.load(key.clone()).await {
        Ok(Some(cached)) => {
          debug!(document = %document_id, "extraction cache hit");
          return (document_id, Ok(cached));
        }
        Ok(None) => {}
        Err(err) => warn!(document = %document_id, error = %err, "extraction cache unreadable"),
      }
    }

    let permit = match self.permits.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(err) => return (document_id, Err(err.to_string())),
    };
    let request = OracleRequest {
      document_id: doc.id(),
      kind:        doc.kind,
      content:     &doc.source.content,
      schema:      &self.schema,
    };
    let limit = Duration::from_secs(self.config.call_timeout_secs);
    let outcome = tokio::time::timeout(limit, self.oracle.extract(request)).await;
    drop(permit);

    let response = match outcome {
      Ok(Ok(response)) => response,
      Ok(Err(err)) => {
        warn!(document = %document_id, error = %err, "oracle call failed");
        return (document_id, Err(err.to_string()));
      }
      Err(_) => {
        warn!(document = %document_id, secs = limit.as_secs(), "oracle call timed out");
        return (document_id, Err(format!("timed out after {}s", limit.as_secs())));
      }
    };

    // A response that breaks the schema contract fails the affair and is
    // requested again on the next run.
    if let Err(mismatch) = adapter::adapt(&self.schema, &document_id, response.clone()) {
      debug!(document = %document_id, error = %mismatch, "invalid extraction not cached");
    } else if let Err(err) = self.cache.store(key, response.clone()).await {
      warn!(document = %document_id, error = %err, "extraction not cached");
    }
    (document_id, Ok(response))
  }
}
