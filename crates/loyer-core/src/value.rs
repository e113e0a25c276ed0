//! Tri-state field values.
//!
//! Every nullable ledger column distinguishes a value that does not apply to
//! the row (`null` on the wire) from a value that applies but could not be
//! determined (`"unknown"` on the wire).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};

/// Monetary amounts and quantities.
pub type Amount = rust_decimal::Decimal;

/// Wire marker for [`Field::Unknown`].
pub const UNKNOWN_MARKER: &str = "unknown";

/// A column value with an explicit "not applicable" vs "unknown" distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field<T> {
  Known(T),
  /// The column does not apply to this row, or the source is silent.
  NotApplicable,
  /// The column applies but its value is not known or not computable.
  Unknown,
}

impl<T> Field<T> {
  pub fn known(&self) -> Option<&T> {
    match self {
      Self::Known(v) => Some(v),
      _ => None,
    }
  }

  pub fn into_known(self) -> Option<T> {
    match self {
      Self::Known(v) => Some(v),
      _ => None,
    }
  }

  pub fn is_known(&self) -> bool { matches!(self, Self::Known(_)) }

  pub fn as_ref(&self) -> Field<&T> {
    match self {
      Self::Known(v) => Field::Known(v),
      Self::NotApplicable => Field::NotApplicable,
      Self::Unknown => Field::Unknown,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
    match self {
      Self::Known(v) => Field::Known(f(v)),
      Self::NotApplicable => Field::NotApplicable,
      Self::Unknown => Field::Unknown,
    }
  }

  /// Precedence merge: `self` wins when known, then `fallback`; when neither
  /// is known the result is explicitly [`Field::Unknown`], never a guess.
  pub fn prefer(self, fallback: Field<T>) -> Field<T> {
    match (self, fallback) {
      (Self::Known(v), _) => Field::Known(v),
      (_, Field::Known(v)) => Field::Known(v),
      _ => Field::Unknown,
    }
  }
}

impl<T> Default for Field<T> {
  fn default() -> Self { Self::NotApplicable }
}

impl<T> From<Option<T>> for Field<T> {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(v) => Self::Known(v),
      None => Self::NotApplicable,
    }
  }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Known(v) => v.fmt(f),
      Self::NotApplicable => f.write_str("null"),
      Self::Unknown => f.write_str(UNKNOWN_MARKER),
    }
  }
}

impl<T: Serialize> Serialize for Field<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Known(v) => v.serialize(serializer),
      Self::NotApplicable => serializer.serialize_none(),
      Self::Unknown => serializer.serialize_str(UNKNOWN_MARKER),
    }
  }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    match &raw {
      serde_json::Value::Null => return Ok(Self::NotApplicable),
      serde_json::Value::String(s) => {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(UNKNOWN_MARKER) {
          return Ok(Self::Unknown);
        }
        // Extractors sometimes emit the literal string "null".
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
          return Ok(Self::NotApplicable);
        }
      }
      _ => {}
    }
    match T::deserialize(raw.clone()) {
      Ok(v) => Ok(Self::Known(v)),
      Err(err) => numeric_string(&raw)
        .and_then(|n| T::deserialize(n).ok())
        .map(Self::Known)
        .ok_or_else(|| serde::de::Error::custom(err)),
    }
  }
}

/// Reinterpret a quoted number ("1 200,50") as a JSON number.
fn numeric_string(raw: &serde_json::Value) -> Option<serde_json::Value> {
  let s = raw.as_str()?;
  let cleaned: String = s
    .chars()
    .filter(|c| !c.is_whitespace())
    .map(|c| if c == ',' { '.' } else { c })
    .collect();
  match serde_json::from_str::<serde_json::Value>(&cleaned).ok()? {
    n @ serde_json::Value::Number(_) => Some(n),
    _ => None,
  }
}
