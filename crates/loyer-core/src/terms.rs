//! Contract-level terms stated by a single document.
//!
//! These are the fields that can originate from either the master or the
//! subscription (and later be overridden by an amendment). The precedence
//! resolver merges them into the defaults copied onto product rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Amount, Field, cadence::Cadence};

/// Price revalorisation (indexation) rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revalorization {
  /// `fixed_rate`, `index_formula` or `textual`.
  #[serde(default, rename = "reval_method")]
  pub method:       Field<String>,
  #[serde(default, rename = "reval_rate")]
  pub rate:         Field<Amount>,
  /// Index formula (Syntec, energy, ...) or free text.
  #[serde(default, rename = "reval_formula")]
  pub formula:      Field<String>,
  #[serde(default, rename = "reval_compute_when")]
  pub compute_when: Field<String>,
  #[serde(default, rename = "reval_apply_when")]
  pub apply_when:   Field<String>,
  #[serde(default, rename = "reval_apply_from")]
  pub apply_from:   Field<String>,
  /// Which document the rule came from, as stated by the extractor.
  #[serde(default, rename = "reval_source")]
  pub source:       Field<String>,
}

impl Revalorization {
  /// Field-wise precedence: `self` wins where known.
  pub fn prefer(self, fallback: Revalorization) -> Revalorization {
    Revalorization {
      method:       self.method.prefer(fallback.method),
      rate:         self.rate.prefer(fallback.rate),
      formula:      self.formula.prefer(fallback.formula),
      compute_when: self.compute_when.prefer(fallback.compute_when),
      apply_when:   self.apply_when.prefer(fallback.apply_when),
      apply_from:   self.apply_from.prefer(fallback.apply_from),
      source:       self.source.prefer(fallback.source),
    }
  }

  /// Every field `NotApplicable`; used for one-time and included rows.
  pub fn not_applicable() -> Self { Self::default() }
}

/// Default contract fields that precedence applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractDefaults {
  pub company_name:            Field<String>,
  pub contract_number:         Field<String>,
  pub currency:                Field<String>,
  /// `HT` or `TTC`, only when stated next to prices.
  pub tax_basis:               Field<String>,
  pub tacit_renewal:           Field<bool>,
  pub service_duration_months: Field<u32>,
  /// Non-numeric tail of the duration clause ("+ prorata de la période").
  pub service_duration_notes:  Field<String>,
  /// "À échoir" / "Échu".
  pub term_mode:               Field<String>,
  pub billing_cadence:         Field<Cadence>,
  /// Event that triggers billing (e.g. "PV VABF").
  pub billing_start_event:     Field<String>,
  pub payment_methods:         Field<Vec<String>>,
  pub payment_terms:           Field<String>,
  #[serde(flatten)]
  pub revalorization:          Revalorization,
}

impl ContractDefaults {
  /// Field-wise precedence: `self` wins where known, then `fallback`, else
  /// the field is explicitly unknown.
  pub fn prefer(self, fallback: ContractDefaults) -> ContractDefaults {
    ContractDefaults {
      company_name:            self.company_name.prefer(fallback.company_name),
      contract_number:         self.contract_number.prefer(fallback.contract_number),
      currency:                self.currency.prefer(fallback.currency),
      tax_basis:               self.tax_basis.prefer(fallback.tax_basis),
      tacit_renewal:           self.tacit_renewal.prefer(fallback.tacit_renewal),
      service_duration_months: self
        .service_duration_months
        .prefer(fallback.service_duration_months),
      service_duration_notes:  self
        .service_duration_notes
        .prefer(fallback.service_duration_notes),
      term_mode:               self.term_mode.prefer(fallback.term_mode),
      billing_cadence:         self.billing_cadence.prefer(fallback.billing_cadence),
      billing_start_event:     self.billing_start_event.prefer(fallback.billing_start_event),
      payment_methods:         self.payment_methods.prefer(fallback.payment_methods),
      payment_terms:           self.payment_terms.prefer(fallback.payment_terms),
      revalorization:          self.revalorization.prefer(fallback.revalorization),
    }
  }
}

/// Document-level metadata returned by the extraction oracle alongside the
/// product rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentTerms {
  /// Signature date stated in the document.
  pub signature_date:        Field<NaiveDate>,
  /// Explicit "total abonnement mensuel" stated for the period this
  /// document opens. Never computed by the extractor.
  pub period_total_monthly:  Field<Amount>,
  pub period_total_evidence: Field<String>,
  #[serde(flatten)]
  pub defaults:              ContractDefaults,
}
