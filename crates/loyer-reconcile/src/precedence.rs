//! Precedence of contract-level terms.
//!
//! Subscription beats master. Among several subscriptions the first one (in
//! listing order) that states a value wins. A field no document states is
//! explicitly unknown. Amendments then overlay their own terms on top of
//! whatever was in force before them.

use chrono::NaiveDate;
use loyer_core::{
  Field,
  terms::{ContractDefaults, DocumentTerms},
};

/// Contract defaults resolved once per affair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
  pub defaults:               ContractDefaults,
  pub signature_master:       Field<NaiveDate>,
  pub signature_subscription: Field<NaiveDate>,
}

impl Baseline {
  /// Date the contract duration runs from.
  pub fn anchor(&self) -> Field<NaiveDate> {
    self.signature_subscription.prefer(self.signature_master)
  }
}

pub fn resolve(master: Option<&DocumentTerms>, subscriptions: &[&DocumentTerms]) -> Baseline {
  let (sub_defaults, sub_signature) = subscriptions.iter().fold(
    (ContractDefaults::default(), Field::NotApplicable),
    |(defaults, signature), terms| {
      (defaults.prefer(terms.defaults.clone()), signature.prefer(terms.signature_date))
    },
  );

  match master {
    Some(master) => Baseline {
      defaults:               sub_defaults.prefer(master.defaults.clone()),
      signature_master:       master.signature_date.prefer(Field::Unknown),
      signature_subscription: sub_signature,
    },
    None => Baseline {
      defaults:               sub_defaults.prefer(ContractDefaults::default()),
      signature_master:       Field::NotApplicable,
      signature_subscription: sub_signature,
    },
  }
}

/// Defaults in force after an amendment: what it states, else what was in
/// force before it.
pub fn overlay(current: &ContractDefaults, amendment: &DocumentTerms) -> ContractDefaults {
  amendment.defaults.clone().prefer(current.clone())
}
