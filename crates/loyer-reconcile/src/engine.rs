//! Reconciliation of one affair from its oracle responses.
//!
//! Pure apart from logging: the same affair and responses always yield the
//! same ledger and digest.

use std::collections::HashMap;

use chrono::NaiveDate;
use loyer_core::{
  Field,
  document::{Affair, Document},
  ledger::{Issue, Ledger},
  oracle::OracleResponse,
  product::ProductRow,
  schema::LedgerSchema,
  terms::DocumentTerms,
};
use tracing::{debug, warn};

use crate::{
  Result,
  adapter::{self, Extraction},
  assemble::assemble,
  period::{ExplicitTotal, segment},
  precedence::resolve,
  row::{self, RowContext},
  state::ContractState,
};

/// Adapted extractions of an affair, keyed by document id.
struct Extractions(HashMap<String, Extraction>);

impl Extractions {
  fn adapt(schema: &LedgerSchema, responses: HashMap<String, OracleResponse>) -> Result<Self> {
    let mut adapted = HashMap::with_capacity(responses.len());
    for (document_id, response) in responses {
      let extraction = adapter::adapt(schema, &document_id, response)?;
      adapted.insert(document_id, extraction);
    }
    Ok(Self(adapted))
  }

  fn terms(&self, doc: &Document) -> DocumentTerms {
    self.0.get(doc.id()).map(|e| e.terms.clone()).unwrap_or_default()
  }

  fn take_rows(&mut self, doc: &Document) -> Vec<adapter::AdaptedRow> {
    self.0.get_mut(doc.id()).map(|e| std::mem::take(&mut e.rows)).unwrap_or_default()
  }
}

/// Build the ledger of `affair`.
///
/// `responses` holds one oracle response per document that was extracted; a
/// document without one contributes no rows and no terms. `issues` carries
/// what earlier stages recorded and ends up on the ledger.
pub fn reconcile(
  schema: &LedgerSchema,
  affair: &Affair,
  responses: HashMap<String, OracleResponse>,
  mut issues: Vec<Issue>,
) -> Result<Ledger> {
  let mut extractions = Extractions::adapt(schema, responses)?;

  let master_terms = affair.master.as_ref().map(|doc| {
    let dropped = extractions.take_rows(doc).len();
    if dropped > 0 {
      warn!(affair = %affair.key, document = %doc.id(), dropped, "master product rows dropped");
      issues.push(Issue::MasterRowsDropped { document_id: doc.id().to_string(), count: dropped });
    }
    extractions.terms(doc)
  });
  let subscription_terms: Vec<DocumentTerms> =
    affair.subscriptions.iter().map(|doc| extractions.terms(doc)).collect();
  let baseline = resolve(master_terms.as_ref(), &subscription_terms.iter().collect::<Vec<_>>());

  let mut state = ContractState::new(&baseline);
  let mut rows: Vec<ProductRow> = Vec::new();
  let mut explicit: Vec<ExplicitTotal> = Vec::new();

  for (doc, terms) in affair.subscriptions.iter().zip(&subscription_terms) {
    let effective_date = terms
      .signature_date
      .prefer(baseline.signature_subscription)
      .into_known();
    note_total(&mut explicit, doc, terms, effective_date);

    let defaults = state.defaults().clone();
    let ctx = RowContext {
      document: doc,
      effective_date,
      defaults: &defaults,
      signature_master: baseline.signature_master,
      signature_subscription: terms.signature_date.prefer(baseline.signature_subscription),
      signature_amendment: Field::NotApplicable,
      anchor: state.anchor(),
    };
    for adapted in extractions.take_rows(doc) {
      rows.push(row::build(adapted, &ctx, &mut state));
    }
  }

  for doc in &affair.amendments {
    let terms = extractions.terms(doc);
    let signature = match doc.signature_date {
      Some(date) => Field::Known(date),
      None => terms.signature_date.prefer(Field::Unknown),
    };
    state.apply_amendment(&terms, signature);
    note_total(&mut explicit, doc, &terms, signature.into_known());

    let defaults = state.defaults().clone();
    let ctx = RowContext {
      document: doc,
      effective_date: signature.into_known(),
      defaults: &defaults,
      signature_master: baseline.signature_master,
      signature_subscription: baseline.signature_subscription,
      signature_amendment: signature,
      anchor: state.anchor(),
    };
    for adapted in extractions.take_rows(doc) {
      rows.push(row::build(adapted, &ctx, &mut state));
    }
  }

  let segmentation = segment(&rows, &explicit);
  debug!(
    affair = %affair.key,
    rows = rows.len(),
    periods = segmentation.periods.len(),
    "affair reconciled"
  );
  assemble(schema, affair.key.clone(), rows, segmentation, issues)
}

fn note_total(
  explicit: &mut Vec<ExplicitTotal>,
  doc: &Document,
  terms: &DocumentTerms,
  date: Option<NaiveDate>,
) {
  if let Field::Known(amount) = terms.period_total_monthly {
    explicit.push(ExplicitTotal { date, amount, document_id: doc.id().to_string() });
  }
}
