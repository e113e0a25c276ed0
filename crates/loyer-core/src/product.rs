//! Product rows: the unit of the ledger.
//!
//! A [`ProductRow`] is built once from an oracle row, its provenance and the
//! resolved contract defaults, and is never mutated afterwards. Its flat serde
//! form uses the ledger column names, so [`ProductRow::to_record`] is a plain
//! serialisation.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{
  Amount, Field,
  cadence::Cadence,
  document::DocumentKind,
  schema::Record,
  terms::ContractDefaults,
};

/// Namespace for deterministic row ids.
const ROW_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_7965_722d_726f_772d_6e61_6d65_7370);

// ─── Enums ───────────────────────────────────────────────────────────────────

/// How a row is priced. Decided once when the row is created.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PricingMode {
  /// Billed once; the price lives in the unit price only.
  OneTime,
  /// Included at no charge.
  Included,
  /// A fixed recurring fee.
  RecurringFlat,
  /// A committed volume with a derived unit price.
  RecurringUsageBased,
}

impl PricingMode {
  pub fn is_recurring(self) -> bool {
    matches!(self, Self::RecurringFlat | Self::RecurringUsageBased)
  }
}

/// What an amendment row does to the contract.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
  /// A product not present before.
  Added,
  /// A product present before whose terms differ.
  Modified,
  /// A product present before, restated unchanged.
  Relisted,
  /// A product withdrawn from the contract as of the amendment.
  Removed,
}

/// Computed end of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndDate {
  /// Tacit renewal: no defined end.
  Open,
  On(NaiveDate),
  #[default]
  Unknown,
}

impl fmt::Display for EndDate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Open => f.write_str("open"),
      Self::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
      Self::Unknown => f.write_str(crate::value::UNKNOWN_MARKER),
    }
  }
}

impl Serialize for EndDate {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for EndDate {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::trim) {
      Some("open") => Self::Open,
      Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Self::On)
        .unwrap_or(Self::Unknown),
      None => Self::Unknown,
    })
  }
}

// ─── Annotations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationKind {
  /// The oracle returned a column outside the schema; it was stripped.
  UnexpectedColumn,
  /// Conflicting or implausible extractor output.
  DataQuality,
  /// A derived value could not be computed.
  NonComputable,
  /// A value was moved to the field its pricing mode expects.
  Reclassified,
}

/// A data-quality note attached to a row. Rendered as `kind: detail`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
  pub kind:   AnnotationKind,
  pub detail: String,
}

impl Annotation {
  pub fn new(kind: AnnotationKind, detail: impl Into<String>) -> Self {
    Self { kind, detail: detail.into() }
  }

  pub fn unexpected_column(column: &str) -> Self {
    Self::new(AnnotationKind::UnexpectedColumn, column)
  }

  pub fn data_quality(detail: impl Into<String>) -> Self {
    Self::new(AnnotationKind::DataQuality, detail)
  }

  pub fn non_computable(field: &str, reason: impl fmt::Display) -> Self {
    Self::new(AnnotationKind::NonComputable, format!("{field}: {reason}"))
  }

  pub fn reclassified(detail: impl Into<String>) -> Self {
    Self::new(AnnotationKind::Reclassified, detail)
  }
}

impl fmt::Display for Annotation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.kind.as_ref(), self.detail)
  }
}

impl FromStr for Annotation {
  type Err = strum::ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (kind, detail) = s.split_once(": ").unwrap_or((s, ""));
    Ok(Self { kind: kind.parse()?, detail: detail.to_string() })
  }
}

impl Serialize for Annotation {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Annotation {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    String::deserialize(deserializer)?
      .parse()
      .map_err(serde::de::Error::custom)
  }
}

// ─── Row parts ───────────────────────────────────────────────────────────────

/// Where a row came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub document_id:      String,
  #[serde(rename = "document_kind")]
  pub kind:             DocumentKind,
  pub amendment_number: Option<u32>,
  /// 0-based position of the row within its document.
  #[serde(rename = "row_position")]
  pub position:         u32,
  /// Signature date of the document, or the subscription's for
  /// subscription rows when the document itself is undated.
  pub effective_date:   Option<NaiveDate>,
}

/// Contract-level fields as they apply to one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowTerms {
  pub signature_date_master:       Field<NaiveDate>,
  pub signature_date_subscription: Field<NaiveDate>,
  pub signature_date_amendment:    Field<NaiveDate>,
  pub service_start_date:          Field<NaiveDate>,
  pub purchase_order:              Field<bool>,
  pub purchase_order_code:         Field<String>,
  pub billing_modality_notes:      Field<String>,
  #[serde(flatten)]
  pub defaults:                    ContractDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductIdentity {
  #[serde(rename = "product_code")]
  pub code:        Field<String>,
  #[serde(rename = "product_name")]
  pub name:        String,
  pub is_included: bool,
  #[serde(rename = "one_shot_service")]
  pub one_shot:    bool,
  #[serde(rename = "is_volume_product")]
  pub volume:      bool,
  /// Set by the oracle on an amendment row that withdraws the product.
  #[serde(rename = "product_removed")]
  pub removed:     bool,
}

impl ProductIdentity {
  /// Key used to recognise the same product across documents: the product
  /// code when known, else the normalised name.
  pub fn canonical_key(&self) -> String {
    match &self.code {
      Field::Known(code) if !code.trim().is_empty() => {
        format!("code:{}", code.trim().to_uppercase())
      }
      _ => format!("name:{}", normalise_name(&self.name)),
    }
  }
}

fn normalise_name(name: &str) -> String {
  let folded: String = name
    .chars()
    .flat_map(char::to_lowercase)
    .map(|c| match c {
      'à' | 'â' | 'ä' | 'á' => 'a',
      'é' | 'è' | 'ê' | 'ë' => 'e',
      'î' | 'ï' | 'í' => 'i',
      'ô' | 'ö' | 'ó' => 'o',
      'ù' | 'û' | 'ü' | 'ú' => 'u',
      'ç' => 'c',
      c if c.is_alphanumeric() => c,
      _ => ' ',
    })
    .collect();
  folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Price and quantity as stated by the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
  pub unit_price:        Field<Amount>,
  pub quantity:          Field<Amount>,
  pub quantity_cadence:  Field<Cadence>,
  pub recurring_price:   Field<Amount>,
  pub recurring_cadence: Field<Cadence>,
  pub commitment_start:  Field<NaiveDate>,
  /// Inclusive.
  pub commitment_end:    Field<NaiveDate>,
}

impl Pricing {
  /// Clear every recurring field.
  pub fn without_recurring(self) -> Self {
    Self {
      quantity_cadence: Field::NotApplicable,
      recurring_price: Field::NotApplicable,
      recurring_cadence: Field::NotApplicable,
      commitment_start: Field::NotApplicable,
      commitment_end: Field::NotApplicable,
      ..self
    }
  }
}

/// Usage terms beyond the committed volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overconsumption {
  #[serde(rename = "overconsumption_price")]
  pub price:                     Field<Amount>,
  #[serde(rename = "overconsumption_cadence")]
  pub cadence:                   Field<Cadence>,
  pub usage_term_mode:           Field<String>,
  pub overconsumption_term_mode: Field<String>,
  pub usage_notes:               Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evidence {
  #[serde(rename = "evidence_product")]
  pub product:         Field<String>,
  #[serde(rename = "evidence_price")]
  pub price:           Field<String>,
  #[serde(rename = "evidence_payment_methods")]
  pub payment_methods: Field<String>,
  #[serde(rename = "evidence_end_date")]
  pub end_date:        Field<String>,
  #[serde(rename = "evidence_amendment")]
  pub amendment:       Field<String>,
  #[serde(rename = "evidence_usage")]
  pub usage:           Field<String>,
  #[serde(rename = "evidence_revalorization")]
  pub revalorization:  Field<String>,
  #[serde(rename = "evidence_billing")]
  pub billing:         Field<String>,
  #[serde(rename = "evidence_dates")]
  pub dates:           Field<String>,
  #[serde(rename = "evidence_contract_errors")]
  pub contract_errors: Field<String>,
}

/// Extractor self-assessed confidence, 0 to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceScores {
  #[serde(rename = "confidence_price")]
  pub price:          Field<f64>,
  #[serde(rename = "confidence_usage")]
  pub usage:          Field<f64>,
  #[serde(rename = "confidence_revalorization")]
  pub revalorization: Field<f64>,
  #[serde(rename = "confidence_billing")]
  pub billing:        Field<f64>,
  #[serde(rename = "confidence_dates")]
  pub dates:          Field<f64>,
  #[serde(rename = "confidence_company")]
  pub company:        Field<f64>,
  #[serde(rename = "confidence_amendment")]
  pub amendment:      Field<f64>,
}

/// Values computed by the derived-field calculator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedAmounts {
  pub monthly_recurring_price: Field<Amount>,
  pub monthly_quantity:        Field<Amount>,
  pub billing_cycle_amount:    Field<Amount>,
  pub annual_amount:           Field<Amount>,
  pub end_of_contract:         EndDate,
}

// ─── Row ─────────────────────────────────────────────────────────────────────

/// One priced product line of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
  pub row_id:       Uuid,
  #[serde(flatten)]
  pub provenance:   Provenance,
  #[serde(flatten)]
  pub terms:        RowTerms,
  #[serde(flatten)]
  pub product:      ProductIdentity,
  #[serde(flatten)]
  pub pricing:      Pricing,
  #[serde(flatten)]
  pub usage:        Overconsumption,
  #[serde(flatten)]
  pub evidence:     Evidence,
  #[serde(flatten)]
  pub confidence:   ConfidenceScores,
  pub pricing_mode: PricingMode,
  #[serde(rename = "change_kind")]
  pub change:       Option<ChangeKind>,
  #[serde(flatten)]
  pub derived:      DerivedAmounts,
  pub annotations:  Vec<Annotation>,
}

impl ProductRow {
  /// Deterministic id of the row at `position` in `document_id`.
  pub fn row_id_for(document_id: &str, position: u32) -> Uuid {
    Uuid::new_v5(&ROW_NAMESPACE, format!("{document_id}#{position}").as_bytes())
  }

  /// Whether this row withdraws its product rather than pricing it.
  pub fn is_removal(&self) -> bool { self.change == Some(ChangeKind::Removed) }

  /// Monthly equivalent this row contributes to its period aggregate.
  ///
  /// Flat rows contribute their monthly recurring price; usage rows their
  /// committed monthly amount. Other modes and removals contribute nothing.
  pub fn monthly_contribution(&self) -> Option<Field<Amount>> {
    (self.pricing_mode.is_recurring() && !self.is_removal())
      .then_some(self.derived.monthly_recurring_price)
  }

  /// Flatten to a record keyed by ledger column names, without the period
  /// columns.
  pub fn to_record(&self) -> crate::Result<Record> {
    match serde_json::to_value(self)? {
      serde_json::Value::Object(map) => Ok(map),
      other => Err(crate::Error::Serialization(serde::ser::Error::custom(format!(
        "row serialised to {other}"
      )))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::{ColumnOrigin, LedgerSchema};

  pub(crate) fn sample_row() -> ProductRow {
    ProductRow {
      row_id:       ProductRow::row_id_for("cp-1", 0),
      provenance:   Provenance {
        document_id:      "cp-1".into(),
        kind:             DocumentKind::Subscription,
        amendment_number: None,
        position:         0,
        effective_date:   NaiveDate::from_ymd_opt(2015, 10, 1),
      },
      terms:        RowTerms::default(),
      product:      ProductIdentity {
        code: Field::Known("SAAS-01".into()),
        name: "Abonnement plateforme".into(),
        ..Default::default()
      },
      pricing:      Pricing {
        recurring_price: Field::Known(Amount::from(1200)),
        recurring_cadence: Field::Known(Cadence::Quarterly),
        ..Default::default()
      },
      usage:        Overconsumption::default(),
      evidence:     Evidence::default(),
      confidence:   ConfidenceScores::default(),
      pricing_mode: PricingMode::RecurringFlat,
      change:       None,
      derived:      DerivedAmounts {
        monthly_recurring_price: Field::Known(Amount::from(400)),
        end_of_contract: EndDate::Open,
        ..Default::default()
      },
      annotations:  vec![Annotation::data_quality("flat and usage flags both set")],
    }
  }

  #[test]
  fn record_covers_every_non_period_column() {
    let schema = LedgerSchema::current();
    let record = sample_row().to_record().unwrap();

    let expected: Vec<&str> = schema
      .columns
      .iter()
      .filter(|c| c.origin != ColumnOrigin::Period)
      .map(|c| c.name.as_str())
      .collect();
    let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
    let mut expected_sorted = expected.clone();
    keys.sort_unstable();
    expected_sorted.sort_unstable();
    assert_eq!(keys, expected_sorted);

    assert_eq!(record["end_of_contract"], "open");
    assert_eq!(record["recurring_cadence"], "quarterly");
    assert_eq!(record["annotations"][0], "data_quality: flat and usage flags both set");
  }

  #[test]
  fn row_snapshot_round_trips() {
    let row = sample_row();
    let json = serde_json::to_string(&row).unwrap();
    let back: ProductRow = serde_json::from_str(&json).unwrap();
    assert_eq!(back, row);
  }

  #[test]
  fn row_ids_are_deterministic() {
    assert_eq!(ProductRow::row_id_for("av-2", 3), ProductRow::row_id_for("av-2", 3));
    assert_ne!(ProductRow::row_id_for("av-2", 3), ProductRow::row_id_for("av-2", 4));
  }

  #[test]
  fn canonical_key_prefers_code_then_folded_name() {
    let coded = ProductIdentity { code: Field::Known(" saas-01 ".into()), ..Default::default() };
    assert_eq!(coded.canonical_key(), "code:SAAS-01");

    let named = ProductIdentity { name: "Hébergement  Sécurisé".into(), ..Default::default() };
    let other = ProductIdentity { name: "hebergement securise".into(), ..Default::default() };
    assert_eq!(named.canonical_key(), other.canonical_key());
  }
}
