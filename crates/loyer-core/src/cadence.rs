//! Billing and pricing cadences.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumIter, EnumString};

/// How often a price, quantity, or invoice recurs.
///
/// Labels are parsed leniently because contracts state them in French and
/// English ("Mensuelle", "loyer mensuel", "per quarter", ...).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Cadence {
  Monthly,
  Quarterly,
  SemiAnnual,
  Annual,
  /// A cadence was stated but it is not one the ledger can normalise.
  Other,
}

impl Cadence {
  /// Months covered by one occurrence, or `None` when not normalisable.
  pub fn months(self) -> Option<u32> {
    match self {
      Self::Monthly => Some(1),
      Self::Quarterly => Some(3),
      Self::SemiAnnual => Some(6),
      Self::Annual => Some(12),
      Self::Other => None,
    }
  }

  /// Map a free-form label onto a cadence. Unrecognised labels become
  /// [`Cadence::Other`], never a default.
  pub fn parse_label(label: &str) -> Self {
    let l = label.trim().to_lowercase();
    if let Ok(exact) = l.parse::<Self>() {
      return exact;
    }
    let has = |needles: &[&str]| needles.iter().any(|n| l.contains(n));
    if has(&["semestri", "semi-annu", "semiannu", "semi_annu", "half-year", "half year"]) {
      Self::SemiAnnual
    } else if has(&["trimestri", "quarter"]) {
      Self::Quarterly
    } else if has(&["mensuel", "mois", "month"]) {
      Self::Monthly
    } else if has(&["annuel", "annual", "yearly", "par an", "/an", "year"]) {
      Self::Annual
    } else {
      Self::Other
    }
  }
}

impl Serialize for Cadence {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_ref())
  }
}

impl<'de> Deserialize<'de> for Cadence {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let label = String::deserialize(deserializer)?;
    Ok(Self::parse_label(&label))
  }
}
