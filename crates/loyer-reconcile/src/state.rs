//! Contract state carried across amendments.
//!
//! Tracks the defaults in force and the last known terms of every product,
//! keyed by canonical identity. It only decides what an amendment row
//! changes; row values always come from the row itself.

use std::collections::HashMap;

use chrono::NaiveDate;
use loyer_core::{
  Field,
  cadence::Cadence,
  product::{ChangeKind, Overconsumption, Pricing, PricingMode},
  terms::{ContractDefaults, DocumentTerms, Revalorization},
};

use crate::precedence::{Baseline, overlay};

/// The terms of a product compared between documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
  pub mode:            PricingMode,
  pub pricing:         Pricing,
  pub usage:           Overconsumption,
  pub billing_cadence: Field<Cadence>,
  pub revalorization:  Revalorization,
}

#[derive(Debug, Clone)]
pub struct ContractState {
  defaults: ContractDefaults,
  anchor:   Field<NaiveDate>,
  products: HashMap<String, Fingerprint>,
}

impl ContractState {
  pub fn new(baseline: &Baseline) -> Self {
    Self {
      defaults: baseline.defaults.clone(),
      anchor:   baseline.anchor(),
      products: HashMap::new(),
    }
  }

  pub fn defaults(&self) -> &ContractDefaults { &self.defaults }

  /// Date the duration in force runs from.
  pub fn anchor(&self) -> Field<NaiveDate> { self.anchor }

  /// Overlay an amendment's own terms. An amendment that restates the
  /// duration also moves the anchor to its signature date.
  pub fn apply_amendment(&mut self, terms: &DocumentTerms, signature: Field<NaiveDate>) {
    self.defaults = overlay(&self.defaults, terms);
    if terms.defaults.service_duration_months.is_known() && signature.is_known() {
      self.anchor = signature;
    }
  }

  /// Record a subscription product.
  pub fn record(&mut self, key: String, fingerprint: Fingerprint) {
    self.products.insert(key, fingerprint);
  }

  /// Classify an amendment product against the state, then record it.
  pub fn observe(&mut self, key: String, fingerprint: Fingerprint) -> ChangeKind {
    let change = match self.products.get(&key) {
      None => ChangeKind::Added,
      Some(previous) if *previous != fingerprint => ChangeKind::Modified,
      Some(_) => ChangeKind::Relisted,
    };
    self.products.insert(key, fingerprint);
    change
  }

  /// Forget a product withdrawn by an amendment. Returns whether it was
  /// known.
  pub fn withdraw(&mut self, key: &str) -> bool { self.products.remove(key).is_some() }
}

#[cfg(test)]
mod tests {
  use loyer_core::Amount;

  use super::*;
  use crate::precedence::resolve;

  fn flat(price: i64) -> Fingerprint {
    Fingerprint {
      mode:            PricingMode::RecurringFlat,
      pricing:         Pricing {
        recurring_price: Field::Known(Amount::from(price)),
        recurring_cadence: Field::Known(Cadence::Monthly),
        ..Default::default()
      },
      usage:           Overconsumption::default(),
      billing_cadence: Field::Known(Cadence::Monthly),
      revalorization:  Revalorization::default(),
    }
  }

  #[test]
  fn classifies_added_modified_relisted() {
    let baseline = resolve(None, &[&DocumentTerms::default()]);
    let mut state = ContractState::new(&baseline);
    state.record("code:A".into(), flat(100));

    assert_eq!(state.observe("code:B".into(), flat(50)), ChangeKind::Added);
    assert_eq!(state.observe("code:A".into(), flat(100)), ChangeKind::Relisted);
    assert_eq!(state.observe("code:A".into(), flat(120)), ChangeKind::Modified);
    assert_eq!(state.observe("code:A".into(), flat(120)), ChangeKind::Relisted);
  }

  #[test]
  fn withdrawn_product_comes_back_as_added() {
    let baseline = resolve(None, &[&DocumentTerms::default()]);
    let mut state = ContractState::new(&baseline);
    state.record("code:A".into(), flat(100));

    assert!(state.withdraw("code:A"));
    assert!(!state.withdraw("code:A"));
    assert_eq!(state.observe("code:A".into(), flat(100)), ChangeKind::Added);
  }

  #[test]
  fn restated_duration_moves_the_anchor() {
    let mut sub = DocumentTerms::default();
    sub.signature_date = Field::Known(NaiveDate::from_ymd_opt(2015, 10, 1).unwrap());
    let mut state = ContractState::new(&resolve(None, &[&sub]));

    let mut amendment = DocumentTerms::default();
    amendment.defaults.service_duration_months = Field::Known(24);
    let signed = Field::Known(NaiveDate::from_ymd_opt(2017, 3, 1).unwrap());
    state.apply_amendment(&amendment, signed);

    assert_eq!(state.anchor(), signed);
    assert_eq!(state.defaults().service_duration_months, Field::Known(24));
  }
}
