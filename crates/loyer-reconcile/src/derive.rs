//! Derived fields: contract end date and cadence arithmetic.
//!
//! Every function is pure. A value that cannot be computed is reported as a
//! [`NonComputable`] reason, never replaced by a default.

use chrono::{Datelike, Months, NaiveDate};
use loyer_core::{Amount, Field, cadence::Cadence, product::EndDate};
use thiserror::Error;

/// Why a derived value could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonComputable {
  #[error("{0} is missing")]
  Missing(&'static str),
  #[error("{0} is unknown")]
  Unknown(&'static str),
  #[error("cadence of {0} cannot be normalised")]
  UnsupportedCadence(&'static str),
  #[error("monthly quantity is zero")]
  ZeroQuantity,
  #[error("{0} is out of range")]
  Overflow(&'static str),
}

fn known<T: Copy>(field: Field<T>, name: &'static str) -> Result<T, NonComputable> {
  match field {
    Field::Known(v) => Ok(v),
    Field::NotApplicable => Err(NonComputable::Missing(name)),
    Field::Unknown => Err(NonComputable::Unknown(name)),
  }
}

fn months_of(cadence: Field<Cadence>, name: &'static str) -> Result<u32, NonComputable> {
  known(cadence, name)?
    .months()
    .ok_or(NonComputable::UnsupportedCadence(name))
}

/// Whole months from the signature month to the end of that year.
pub fn prorata_months(signature: NaiveDate) -> u32 { 12 - signature.month() }

/// End of the contract.
///
/// Tacit renewal means no defined end whatever the duration. Otherwise the
/// end is the signature date plus the duration plus the prorata of the
/// signature year.
pub fn end_of_contract(
  tacit_renewal: Field<bool>,
  signature: Field<NaiveDate>,
  duration_months: Field<u32>,
) -> EndDate {
  if tacit_renewal == Field::Known(true) {
    return EndDate::Open;
  }
  let (Field::Known(signature), Field::Known(duration)) = (signature, duration_months) else {
    return EndDate::Unknown;
  };
  signature
    .checked_add_months(Months::new(duration + prorata_months(signature)))
    .map_or(EndDate::Unknown, EndDate::On)
}

/// Monthly equivalent of `amount` stated per `cadence`.
pub fn to_monthly(
  amount: Field<Amount>,
  cadence: Field<Cadence>,
  name: &'static str,
) -> Result<Amount, NonComputable> {
  let amount = known(amount, name)?;
  let months = months_of(cadence, name)?;
  amount.checked_div(Amount::from(months)).ok_or(NonComputable::Overflow(name))
}

/// Amount per occurrence of `cadence` for a monthly figure.
pub fn restate(
  monthly: Amount,
  cadence: Field<Cadence>,
  name: &'static str,
) -> Result<Amount, NonComputable> {
  let months = months_of(cadence, name)?;
  monthly.checked_mul(Amount::from(months)).ok_or(NonComputable::Overflow(name))
}

/// Unit price of a usage commitment: monthly price over monthly quantity.
pub fn usage_unit_price(
  monthly_price: Result<Amount, NonComputable>,
  monthly_quantity: Result<Amount, NonComputable>,
) -> Result<Amount, NonComputable> {
  let price = monthly_price?;
  let quantity = monthly_quantity?;
  if quantity.is_zero() {
    return Err(NonComputable::ZeroQuantity);
  }
  price.checked_div(quantity).ok_or(NonComputable::Overflow("unit_price"))
}

/// Committed monthly amount of a usage row stating only a unit price.
pub fn usage_commitment(
  unit_price: Amount,
  monthly_quantity: Amount,
) -> Result<Amount, NonComputable> {
  unit_price.checked_mul(monthly_quantity).ok_or(NonComputable::Overflow("recurring_price"))
}

pub fn annual_amount(monthly: Amount) -> Result<Amount, NonComputable> {
  monthly.checked_mul(Amount::from(12)).ok_or(NonComputable::Overflow("annual_amount"))
}

/// Fold a derivation result into a field, noting the reason on failure.
pub fn into_field(
  result: Result<Amount, NonComputable>,
  on_error: impl FnOnce(&NonComputable),
) -> Field<Amount> {
  match result {
    Ok(v) => Field::Known(v),
    Err(reason) => {
      on_error(&reason);
      Field::Unknown
    }
  }
}
