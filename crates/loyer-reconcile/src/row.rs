//! Product row construction.
//!
//! Decides the pricing mode once, applies its field rules, copies the
//! contract defaults in force and computes the derived amounts. The row is
//! complete when it leaves [`build`].

use chrono::NaiveDate;
use loyer_core::{
  Amount, Field,
  document::{Document, DocumentKind},
  oracle::OracleRow,
  product::{
    Annotation, ChangeKind, DerivedAmounts, Overconsumption, Pricing, PricingMode,
    ProductIdentity, ProductRow, Provenance, RowTerms,
  },
  terms::{ContractDefaults, Revalorization},
};

use crate::{
  adapter::AdaptedRow,
  derive::{self, NonComputable},
  state::{ContractState, Fingerprint},
};

/// What a row inherits from its document and the contract.
#[derive(Debug, Clone)]
pub struct RowContext<'a> {
  pub document:               &'a Document,
  pub effective_date:         Option<NaiveDate>,
  pub defaults:               &'a ContractDefaults,
  pub signature_master:       Field<NaiveDate>,
  pub signature_subscription: Field<NaiveDate>,
  /// `NotApplicable` on subscription rows.
  pub signature_amendment:    Field<NaiveDate>,
  /// Date the contract duration runs from.
  pub anchor:                 Field<NaiveDate>,
}

/// Take `fallback` where `own` is not known, unless the fallback does not
/// apply at all.
fn fill<T>(own: Field<T>, fallback: Field<T>) -> Field<T> {
  match fallback {
    Field::NotApplicable => own,
    fallback => own.prefer(fallback),
  }
}

/// Pricing mode implied by the extractor flags. Conflicting flags are noted,
/// and the first matching mode in the order included, one-time, usage-based
/// wins.
pub fn pricing_mode(
  product: &ProductIdentity,
  pricing: &Pricing,
  notes: &mut Vec<Annotation>,
) -> PricingMode {
  let flags = [product.is_included, product.one_shot, product.volume];
  if flags.iter().filter(|f| **f).count() > 1 {
    notes.push(Annotation::data_quality(format!(
      "conflicting pricing flags: included={}, one_shot={}, volume={}",
      product.is_included, product.one_shot, product.volume
    )));
  }

  if product.is_included {
    PricingMode::Included
  } else if product.one_shot {
    PricingMode::OneTime
  } else if product.volume {
    if pricing.recurring_price.is_known() && !pricing.quantity.is_known() {
      notes.push(Annotation::data_quality(
        "usage-based row states a flat recurring price without a quantity",
      ));
    }
    PricingMode::RecurringUsageBased
  } else {
    PricingMode::RecurringFlat
  }
}

fn one_time(mut pricing: Pricing, notes: &mut Vec<Annotation>) -> Pricing {
  if !pricing.unit_price.is_known() && pricing.recurring_price.is_known() {
    notes.push(Annotation::reclassified("recurring price moved to unit price"));
    pricing.unit_price = pricing.recurring_price;
  } else if pricing.recurring_price.is_known() {
    notes.push(Annotation::data_quality("one-time row states a recurring price"));
  }
  pricing.without_recurring()
}

fn included(pricing: Pricing, notes: &mut Vec<Annotation>) -> Pricing {
  if pricing.unit_price.known().is_some_and(|p| !p.is_zero())
    || pricing.recurring_price.known().is_some_and(|p| !p.is_zero())
  {
    notes.push(Annotation::data_quality("included row states a price"));
  }
  Pricing { unit_price: Field::NotApplicable, ..pricing.without_recurring() }
}

fn require<T>(field: Field<T>, name: &str, notes: &mut Vec<Annotation>) -> Field<T> {
  match field {
    Field::Known(v) => Field::Known(v),
    _ => {
      notes.push(Annotation::data_quality(format!("{name} missing on a recurring row")));
      Field::Unknown
    }
  }
}

/// Amounts shared by both recurring modes once the monthly price is known.
fn recurring_amounts(
  monthly: Result<Amount, NonComputable>,
  monthly_quantity: Field<Amount>,
  defaults: &ContractDefaults,
  notes: &mut Vec<Annotation>,
) -> DerivedAmounts {
  let (billing, annual) = match &monthly {
    Ok(m) => (
      derive::into_field(derive::restate(*m, defaults.billing_cadence, "billing_cadence"), |r| {
        notes.push(Annotation::non_computable("billing_cycle_amount", r))
      }),
      derive::into_field(derive::annual_amount(*m), |r| {
        notes.push(Annotation::non_computable("annual_amount", r))
      }),
    ),
    Err(_) => (Field::Unknown, Field::Unknown),
  };
  let monthly = derive::into_field(monthly, |r| {
    notes.push(Annotation::non_computable("monthly_recurring_price", r))
  });
  DerivedAmounts {
    monthly_recurring_price: monthly,
    monthly_quantity,
    billing_cycle_amount: billing,
    annual_amount: annual,
    end_of_contract: Default::default(),
  }
}

fn flat(
  mut pricing: Pricing,
  defaults: &ContractDefaults,
  notes: &mut Vec<Annotation>,
) -> (Pricing, DerivedAmounts) {
  pricing.recurring_price = require(pricing.recurring_price, "recurring_price", notes);
  pricing.recurring_cadence = require(pricing.recurring_cadence, "recurring_cadence", notes);

  let monthly =
    derive::to_monthly(pricing.recurring_price, pricing.recurring_cadence, "recurring_price");
  let monthly_quantity = match (pricing.quantity, pricing.quantity_cadence) {
    (Field::Known(_), Field::Known(_)) => derive::into_field(
      derive::to_monthly(pricing.quantity, pricing.quantity_cadence, "quantity"),
      |r| notes.push(Annotation::non_computable("monthly_quantity", r)),
    ),
    _ => Field::NotApplicable,
  };
  let derived = recurring_amounts(monthly, monthly_quantity, defaults, notes);
  (pricing, derived)
}

fn usage_based(
  mut pricing: Pricing,
  defaults: &ContractDefaults,
  notes: &mut Vec<Annotation>,
) -> (Pricing, DerivedAmounts) {
  let monthly_quantity =
    derive::to_monthly(pricing.quantity, pricing.quantity_cadence, "quantity");
  let stated =
    derive::to_monthly(pricing.recurring_price, pricing.recurring_cadence, "recurring_price");
  let commitment = match (stated, pricing.unit_price, &monthly_quantity) {
    (Err(_), Field::Known(unit), Ok(quantity)) if !pricing.recurring_price.is_known() => {
      notes.push(Annotation::data_quality("commitment derived from unit price and quantity"));
      derive::usage_commitment(unit, *quantity)
    }
    (stated, ..) => stated,
  };

  match derive::usage_unit_price(commitment.clone(), monthly_quantity.clone()) {
    Ok(derived) => {
      if pricing.unit_price.known().is_some_and(|stated| *stated != derived) {
        notes.push(Annotation::data_quality(format!(
          "stated unit price {} differs from derived {derived}",
          pricing.unit_price
        )));
      }
      pricing.unit_price = Field::Known(derived);
    }
    Err(reason) if !pricing.unit_price.is_known() => {
      notes.push(Annotation::non_computable("unit_price", &reason));
      pricing.unit_price = Field::Unknown;
    }
    Err(_) => {}
  }

  let quantity = derive::into_field(monthly_quantity, |r| {
    notes.push(Annotation::non_computable("monthly_quantity", r))
  });
  let derived = recurring_amounts(commitment, quantity, defaults, notes);
  (pricing, derived)
}

/// Build the finished row for `adapted`, and let `state` classify what it
/// changes when it comes from an amendment.
pub fn build(adapted: AdaptedRow, ctx: &RowContext<'_>, state: &mut ContractState) -> ProductRow {
  let AdaptedRow { position, row, mut annotations } = adapted;
  let OracleRow { terms, product, pricing, usage, evidence, confidence } = row;
  let notes = &mut annotations;

  let kind = ctx.document.kind;
  let removal = product.removed && kind == DocumentKind::Amendment;
  if product.removed && !removal {
    notes.push(Annotation::data_quality("removal flag outside an amendment ignored"));
  }

  let mode = pricing_mode(&product, &pricing, notes);
  let mut defaults = terms.defaults.prefer(ctx.defaults.clone());

  let (pricing, usage, mut derived) = match mode {
    _ if removal => (pricing, usage, DerivedAmounts::default()),
    PricingMode::OneTime => {
      (one_time(pricing, notes), Overconsumption::default(), DerivedAmounts::default())
    }
    PricingMode::Included => {
      (included(pricing, notes), Overconsumption::default(), DerivedAmounts::default())
    }
    PricingMode::RecurringFlat => {
      let (pricing, derived) = flat(pricing, &defaults, notes);
      (pricing, usage, derived)
    }
    PricingMode::RecurringUsageBased => {
      let (pricing, derived) = usage_based(pricing, &defaults, notes);
      (pricing, usage, derived)
    }
  };

  if !mode.is_recurring() {
    defaults.billing_cadence = Field::NotApplicable;
    defaults.term_mode = Field::NotApplicable;
    defaults.billing_start_event = Field::NotApplicable;
    defaults.revalorization = Revalorization::not_applicable();
  }

  derived.end_of_contract =
    derive::end_of_contract(defaults.tacit_renewal, ctx.anchor, defaults.service_duration_months);

  let terms = RowTerms {
    signature_date_master: fill(terms.signature_date_master, ctx.signature_master),
    signature_date_subscription: fill(
      terms.signature_date_subscription,
      ctx.signature_subscription,
    ),
    signature_date_amendment: fill(terms.signature_date_amendment, ctx.signature_amendment),
    purchase_order: terms.purchase_order,
    purchase_order_code: terms.purchase_order_code,
    service_start_date: terms.service_start_date,
    billing_modality_notes: if mode.is_recurring() {
      terms.billing_modality_notes
    } else {
      Field::NotApplicable
    },
    defaults,
  };

  let fingerprint = Fingerprint {
    mode,
    pricing: pricing.clone(),
    usage: usage.clone(),
    billing_cadence: terms.defaults.billing_cadence,
    revalorization: terms.defaults.revalorization.clone(),
  };
  let change = match kind {
    DocumentKind::Amendment if removal => {
      if !state.withdraw(&product.canonical_key()) {
        notes.push(Annotation::data_quality("withdraws a product not listed before"));
      }
      Some(ChangeKind::Removed)
    }
    DocumentKind::Amendment => Some(state.observe(product.canonical_key(), fingerprint)),
    _ => {
      state.record(product.canonical_key(), fingerprint);
      None
    }
  };

  ProductRow {
    row_id: ProductRow::row_id_for(ctx.document.id(), position),
    provenance: Provenance {
      document_id: ctx.document.id().to_string(),
      kind,
      amendment_number: ctx.document.amendment_number,
      position,
      effective_date: ctx.effective_date,
    },
    terms,
    product,
    pricing,
    usage,
    evidence,
    confidence,
    pricing_mode: mode,
    change,
    derived,
    annotations,
  }
}

#[cfg(test)]
mod tests {
  use loyer_core::{
    cadence::Cadence,
    product::{AnnotationKind, ChangeKind, EndDate},
    terms::DocumentTerms,
  };

  use super::*;
  use crate::{precedence::resolve, tests::source};

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  fn money(v: i64) -> Field<Amount> { Field::Known(Amount::from(v)) }

  struct Fixture {
    document: Document,
    defaults: ContractDefaults,
    state:    ContractState,
  }

  impl Fixture {
    fn new(kind: DocumentKind, defaults: ContractDefaults) -> Self {
      let terms = DocumentTerms { defaults, ..Default::default() };
      let baseline = resolve(None, &[&terms]);
      Self {
        document: Document::new(source("doc-1", ""), kind),
        defaults: baseline.defaults.clone(),
        state: ContractState::new(&baseline),
      }
    }

    fn build(&mut self, row: OracleRow) -> ProductRow {
      let ctx = RowContext {
        document:               &self.document,
        effective_date:         Some(day(2015, 10, 1)),
        defaults:               &self.defaults,
        signature_master:       Field::NotApplicable,
        signature_subscription: Field::Known(day(2015, 10, 1)),
        signature_amendment:    Field::NotApplicable,
        anchor:                 Field::Known(day(2015, 10, 1)),
      };
      build(AdaptedRow { position: 0, row, annotations: vec![] }, &ctx, &mut self.state)
    }
  }

  fn quarterly_billing() -> ContractDefaults {
    ContractDefaults {
      billing_cadence: Field::Known(Cadence::Quarterly),
      tacit_renewal: Field::Known(false),
      service_duration_months: Field::Known(36),
      ..Default::default()
    }
  }

  fn flat_row(price: i64, cadence: Cadence) -> OracleRow {
    OracleRow {
      product: ProductIdentity { name: "Abonnement".into(), ..Default::default() },
      pricing: Pricing {
        recurring_price: money(price),
        recurring_cadence: Field::Known(cadence),
        ..Default::default()
      },
      ..Default::default()
    }
  }

  #[test]
  fn flat_quarterly_row_normalises_to_monthly() {
    let mut fx = Fixture::new(DocumentKind::Subscription, ContractDefaults {
      billing_cadence: Field::Known(Cadence::Annual),
      ..quarterly_billing()
    });
    let row = fx.build(flat_row(1200, Cadence::Quarterly));

    assert_eq!(row.pricing_mode, PricingMode::RecurringFlat);
    assert_eq!(row.derived.monthly_recurring_price, money(400));
    assert_eq!(row.derived.billing_cycle_amount, money(4800));
    assert_eq!(row.derived.annual_amount, money(4800));
    assert_eq!(row.derived.end_of_contract, EndDate::On(day(2018, 12, 1)));
    assert_eq!(row.change, None);
  }

  #[test]
  fn flat_row_without_cadence_is_unknown_and_annotated() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(500, Cadence::Monthly);
    oracle.pricing.recurring_cadence = Field::NotApplicable;
    let row = fx.build(oracle);

    assert_eq!(row.pricing.recurring_cadence, Field::Unknown);
    assert_eq!(row.derived.monthly_recurring_price, Field::Unknown);
    assert!(row.annotations.iter().any(|a| a.kind == AnnotationKind::NonComputable));
  }

  #[test]
  fn one_time_row_has_no_recurring_fields() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(2500, Cadence::Monthly);
    oracle.product.one_shot = true;
    let row = fx.build(oracle);

    assert_eq!(row.pricing_mode, PricingMode::OneTime);
    assert_eq!(row.pricing.unit_price, money(2500));
    assert_eq!(row.pricing.recurring_price, Field::NotApplicable);
    assert_eq!(row.pricing.recurring_cadence, Field::NotApplicable);
    assert_eq!(row.derived.monthly_recurring_price, Field::NotApplicable);
    assert_eq!(row.derived.billing_cycle_amount, Field::NotApplicable);
    assert_eq!(row.terms.defaults.billing_cadence, Field::NotApplicable);
    assert_eq!(row.terms.defaults.revalorization.method, Field::NotApplicable);
    assert_eq!(row.annotations[0].kind, AnnotationKind::Reclassified);
  }

  #[test]
  fn included_row_has_no_price() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(0, Cadence::Monthly);
    oracle.product.is_included = true;
    let row = fx.build(oracle);

    assert_eq!(row.pricing_mode, PricingMode::Included);
    assert_eq!(row.pricing.unit_price, Field::NotApplicable);
    assert_eq!(row.pricing.recurring_price, Field::NotApplicable);
    assert_eq!(row.derived.annual_amount, Field::NotApplicable);
    assert!(row.annotations.is_empty());
  }

  #[test]
  fn usage_row_derives_unit_price() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let oracle = OracleRow {
      product: ProductIdentity { name: "Flux EDI".into(), volume: true, ..Default::default() },
      pricing: Pricing {
        quantity: money(3000),
        quantity_cadence: Field::Known(Cadence::Quarterly),
        recurring_price: money(900),
        recurring_cadence: Field::Known(Cadence::Quarterly),
        ..Default::default()
      },
      ..Default::default()
    };
    let row = fx.build(oracle);

    assert_eq!(row.pricing_mode, PricingMode::RecurringUsageBased);
    assert_eq!(row.derived.monthly_recurring_price, money(300));
    assert_eq!(row.derived.monthly_quantity, money(1000));
    assert_eq!(row.pricing.unit_price, Field::Known(Amount::new(3, 1)));
  }

  #[test]
  fn out_of_range_price_is_unknown_not_a_panic() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(0, Cadence::Monthly);
    oracle.pricing.recurring_price =
      Field::Known(Amount::from_str_exact("70000000000000000000000000000").unwrap());
    let row = fx.build(oracle);

    assert_eq!(row.derived.monthly_recurring_price, row.pricing.recurring_price);
    assert_eq!(row.derived.billing_cycle_amount, Field::Unknown);
    assert_eq!(row.derived.annual_amount, Field::Unknown);
    let overflowed: Vec<_> = row
      .annotations
      .iter()
      .filter(|a| a.kind == AnnotationKind::NonComputable)
      .map(|a| a.detail.as_str())
      .collect();
    assert_eq!(overflowed, vec![
      "billing_cycle_amount: billing_cadence is out of range",
      "annual_amount: annual_amount is out of range",
    ]);
  }

  #[test]
  fn conflicting_flags_are_annotated() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(100, Cadence::Monthly);
    oracle.product.one_shot = true;
    oracle.product.volume = true;
    let row = fx.build(oracle);

    assert_eq!(row.pricing_mode, PricingMode::OneTime);
    assert_eq!(row.annotations[0].kind, AnnotationKind::DataQuality);
  }

  #[test]
  fn amendment_rows_are_classified() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    fx.build(flat_row(1200, Cadence::Quarterly));

    fx.document = Document::new(source("av-1", ""), DocumentKind::Amendment);
    let same = fx.build(flat_row(1200, Cadence::Quarterly));
    let raised = fx.build(flat_row(1500, Cadence::Quarterly));

    assert_eq!(same.change, Some(ChangeKind::Relisted));
    assert_eq!(raised.change, Some(ChangeKind::Modified));
    assert_eq!(raised.provenance.kind, DocumentKind::Amendment);
  }

  #[test]
  fn withdrawn_product_contributes_nothing() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    fx.build(flat_row(1200, Cadence::Quarterly));

    fx.document = Document::new(source("av-1", ""), DocumentKind::Amendment);
    let mut oracle = flat_row(1200, Cadence::Quarterly);
    oracle.product.removed = true;
    let removed = fx.build(oracle);

    assert_eq!(removed.change, Some(ChangeKind::Removed));
    assert!(removed.is_removal());
    assert_eq!(removed.derived.monthly_recurring_price, Field::NotApplicable);
    assert_eq!(removed.monthly_contribution(), None);
    assert!(removed.annotations.is_empty());

    let relisted = fx.build(flat_row(1200, Cadence::Quarterly));
    assert_eq!(relisted.change, Some(ChangeKind::Added));
  }

  #[test]
  fn removal_flag_on_a_subscription_is_ignored() {
    let mut fx = Fixture::new(DocumentKind::Subscription, quarterly_billing());
    let mut oracle = flat_row(1200, Cadence::Quarterly);
    oracle.product.removed = true;
    let row = fx.build(oracle);

    assert_eq!(row.change, None);
    assert_eq!(row.derived.monthly_recurring_price, money(400));
    assert_eq!(row.annotations[0].kind, AnnotationKind::DataQuality);
  }
}
