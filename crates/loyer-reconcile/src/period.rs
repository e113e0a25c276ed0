//! Period segmentation and aggregation.
//!
//! Periods are recomputed from the full row sequence on every run. A new
//! period starts at every explicit total, every dated activation of a
//! recurring row, every end of a commitment range and every point where an
//! amendment supersedes or withdraws an earlier row for the same product.
//! Undated rows open the timeline with a period that has no start.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use loyer_core::{
  Amount, Field,
  document::DocumentKind,
  ledger::{Aggregate, Issue, Period},
  product::{PricingMode, ProductRow},
};
use tracing::debug;

/// A monthly total stated by a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitTotal {
  /// Effective date of the stating document; `None` applies to the first
  /// period.
  pub date:        Option<NaiveDate>,
  pub amount:      Amount,
  pub document_id: String,
}

/// Output of [`segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
  pub periods:    Vec<Period>,
  /// Period index of each input row, in input order.
  pub assignment: Vec<usize>,
  pub issues:     Vec<Issue>,
}

/// When a row is active. Bounds are `[start, end)`; `None` is unbounded.
#[derive(Debug, Clone, Copy)]
struct Validity {
  start: Option<NaiveDate>,
  end:   Option<NaiveDate>,
  /// Never active: a removal, or superseded by an undated later row.
  empty: bool,
}

impl Validity {
  /// Whether the row is active over the period starting at `at`. `None` is
  /// the open-start period before every boundary, which only undated rows
  /// reach.
  fn active_at(&self, at: Option<NaiveDate>) -> bool {
    if self.empty {
      return false;
    }
    if let (Some(s), Some(e)) = (self.start, self.end) {
      if s >= e {
        return false;
      }
    }
    match at {
      None => self.start.is_none(),
      Some(p) => self.start.is_none_or(|s| s <= p) && self.end.is_none_or(|e| e > p),
    }
  }
}

/// Date a row takes effect: its commitment start, else its document's date.
pub fn row_start(row: &ProductRow) -> Option<NaiveDate> {
  row.pricing.commitment_start.into_known().or(row.provenance.effective_date)
}

/// Whether `later` ends the validity of an earlier row for the same product.
/// Only amendments restate products; a one-time fee does not replace a
/// recurring one.
fn supersedes(later: &ProductRow) -> bool {
  later.provenance.kind == DocumentKind::Amendment
    && (later.is_removal() || later.pricing_mode != PricingMode::OneTime)
}

fn validities(rows: &[ProductRow]) -> (Vec<Validity>, Vec<NaiveDate>) {
  let keys: Vec<String> = rows.iter().map(|r| r.product.canonical_key()).collect();
  let mut first_seen: HashMap<&str, usize> = HashMap::new();
  let ranks: Vec<usize> = rows
    .iter()
    .map(|r| {
      let next = first_seen.len();
      *first_seen.entry(r.provenance.document_id.as_str()).or_insert(next)
    })
    .collect();

  let mut supersession_points = Vec::new();
  let validities = rows
    .iter()
    .enumerate()
    .map(|(i, row)| {
      let start = row_start(row);
      let mut end = row.pricing.commitment_end.into_known().and_then(|d| d.succ_opt());
      let mut empty = row.is_removal();

      let successor = (i + 1..rows.len())
        .find(|&j| ranks[j] > ranks[i] && keys[j] == keys[i] && supersedes(&rows[j]));
      if let Some(j) = successor {
        match row_start(&rows[j]).or(start) {
          Some(point) => {
            end = Some(end.map_or(point, |e| e.min(point)));
            supersession_points.push(point);
          }
          None => empty = true,
        }
      }
      Validity { start, end, empty }
    })
    .collect();
  (validities, supersession_points)
}

/// Split the timeline of `rows` into periods and compute their aggregates.
///
/// `rows` must be in ledger order: a row is only superseded by rows of a
/// later document.
pub fn segment(rows: &[ProductRow], explicit: &[ExplicitTotal]) -> Segmentation {
  let (validity, supersession_points) = validities(rows);
  let contributes: Vec<bool> = rows.iter().map(|r| r.monthly_contribution().is_some()).collect();

  let mut boundaries: BTreeSet<NaiveDate> = explicit.iter().filter_map(|t| t.date).collect();
  boundaries.extend(supersession_points);
  for ((row, v), _) in rows.iter().zip(&validity).zip(&contributes).filter(|(_, c)| **c) {
    boundaries.extend(v.start);
    boundaries.extend(row.pricing.commitment_end.into_known().and_then(|d| d.succ_opt()));
  }

  let dates: Vec<NaiveDate> = boundaries.into_iter().collect();
  let mut bounds: Vec<(Option<NaiveDate>, Option<NaiveDate>)> = dates
    .iter()
    .enumerate()
    .map(|(i, d)| (Some(*d), dates.get(i + 1).copied()))
    .collect();
  match dates.first() {
    None => bounds.push((None, None)),
    Some(&first) => {
      let undated_contributor = validity
        .iter()
        .zip(&contributes)
        .any(|(v, c)| *c && v.active_at(None));
      let dated_before = validity.iter().any(|v| v.start.is_some_and(|s| s < first));
      if undated_contributor || dated_before {
        bounds.insert(0, (None, Some(first)));
      }
    }
  }

  let explicit_by_start: HashMap<Option<NaiveDate>, &ExplicitTotal> = explicit
    .iter()
    .map(|t| (t.date.or(bounds[0].0), t))
    .collect();

  let mut issues = Vec::new();
  let periods: Vec<Period> = bounds
    .iter()
    .map(|&(start, end)| {
      let contributors: Vec<&ProductRow> = rows
        .iter()
        .zip(&validity)
        .zip(&contributes)
        .filter(|((_, v), c)| **c && v.active_at(start))
        .map(|((row, _), _)| row)
        .collect();
      let total = match explicit_by_start.get(&start) {
        Some(stated) => Aggregate::Explicit { amount: stated.amount },
        None => sum(&contributors),
      };
      if let Some(reason) = total.reason() {
        debug!(?start, reason, "period aggregate not computable");
        issues.push(Issue::AggregationNonComputable {
          period_start: start,
          reason:       reason.to_string(),
        });
      }
      Period { start, end, total, members: contributors.iter().map(|r| r.row_id).collect() }
    })
    .collect();

  let assignment = validity
    .iter()
    .map(|v| match v.start {
      Some(date) => periods.iter().rposition(|p| p.start.is_none_or(|s| s <= date)).unwrap_or(0),
      None => 0,
    })
    .collect();

  Segmentation { periods, assignment, issues }
}

fn sum(contributors: &[&ProductRow]) -> Aggregate {
  if contributors.is_empty() {
    return Aggregate::NonComputable { reason: "no recurring contributors".into() };
  }
  let mut amount = Amount::ZERO;
  for row in contributors {
    let next = match row.monthly_contribution() {
      Some(Field::Known(monthly)) => amount.checked_add(monthly),
      _ => {
        return Aggregate::NonComputable {
          reason: format!("monthly amount of {} is not computable", row.product.name),
        };
      }
    };
    match next {
      Some(total) => amount = total,
      None => return Aggregate::NonComputable { reason: "monthly total is out of range".into() },
    }
  }
  Aggregate::Computed { amount }
}

#[cfg(test)]
mod tests {
  use loyer_core::{Amount, product::ChangeKind};

  use super::*;
  use crate::tests::{ledger_row, money};

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  fn flat(doc: &str, pos: u32, name: &str, price: i64, from: Option<NaiveDate>) -> ProductRow {
    ledger_row(doc, pos, name, PricingMode::RecurringFlat, money(price), from)
  }

  fn amended(mut row: ProductRow) -> ProductRow {
    row.provenance.kind = DocumentKind::Amendment;
    row.provenance.amendment_number = Some(1);
    row
  }

  fn withdrawal(doc: &str, pos: u32, name: &str, on: Option<NaiveDate>) -> ProductRow {
    let mut row = amended(flat(doc, pos, name, 0, on));
    row.derived.monthly_recurring_price = Field::NotApplicable;
    row.change = Some(ChangeKind::Removed);
    row
  }

  fn huge() -> Field<Amount> {
    Field::Known(Amount::from_str_exact("50000000000000000000000000000").unwrap())
  }

  /// Invariants every segmentation holds: contiguous periods, each row in
  /// the period containing its start, contributors assigned to a period
  /// they are members of, computed totals equal to the sum over members.
  fn assert_consistent(name: &str, rows: &[ProductRow], seg: &Segmentation) {
    assert_eq!(seg.assignment.len(), rows.len(), "{name}");
    for pair in seg.periods.windows(2) {
      assert_eq!(pair[0].end, pair[1].start, "{name}: periods not contiguous");
    }
    assert_eq!(seg.periods.last().and_then(|p| p.end), None, "{name}: last period closed");

    for (row, &index) in rows.iter().zip(&seg.assignment) {
      let period = &seg.periods[index];
      let label = format!("{name}: {}#{}", row.provenance.document_id, row.provenance.position);
      match row_start(row) {
        Some(date) => assert!(period.contains(date), "{label} outside its period"),
        None => assert_eq!(index, 0, "{label}"),
      }
      if seg.periods.iter().any(|p| p.members.contains(&row.row_id)) {
        assert!(period.members.contains(&row.row_id), "{label} not a member of its period");
      }
    }

    for period in &seg.periods {
      if let Aggregate::Computed { amount } = &period.total {
        let members: Amount = period
          .members
          .iter()
          .map(|id| {
            let row = rows.iter().find(|r| r.row_id == *id).unwrap();
            row.monthly_contribution().and_then(Field::into_known).unwrap()
          })
          .sum();
        assert_eq!(*amount, members, "{name}: total differs from its members");
      }
    }
  }

  fn fixtures() -> Vec<(&'static str, Vec<ProductRow>)> {
    let signed = Some(day(2015, 10, 1));
    let amended_on = Some(day(2017, 1, 1));
    let mut usage = ledger_row("cp", 1, "Flux", PricingMode::RecurringUsageBased, money(300), None);
    usage.pricing.commitment_start = Field::Known(day(2016, 1, 1));
    usage.pricing.commitment_end = Field::Known(day(2016, 12, 31));

    vec![
      ("flat and usage", vec![
        flat("cp", 0, "Abonnement", 500, signed),
        ledger_row("cp", 1, "Flux", PricingMode::RecurringUsageBased, money(300), signed),
      ]),
      ("same document duplicates", vec![
        flat("cp", 0, "Licence", 500, signed),
        flat("cp", 1, "Licence", 300, signed),
      ]),
      ("undated subscription, dated amendment", vec![
        flat("cp", 0, "Abonnement", 500, None),
        amended(flat("av", 0, "Abonnement", 650, amended_on)),
      ]),
      ("undated subscription, amendment adds", vec![
        flat("cp", 0, "Abonnement", 500, None),
        amended(flat("av", 0, "Support", 100, amended_on)),
      ]),
      ("undated amendment replaces", vec![
        flat("cp", 0, "Abonnement", 500, None),
        amended(flat("av", 0, "Abonnement", 650, None)),
      ]),
      ("amendment supersedes", vec![
        flat("cp", 0, "Abonnement", 500, signed),
        flat("cp", 1, "Support", 100, signed),
        amended(flat("av", 0, "Abonnement", 650, amended_on)),
      ]),
      ("withdrawal", vec![
        flat("cp", 0, "Abonnement", 500, signed),
        flat("cp", 1, "Support", 100, signed),
        withdrawal("av", 0, "Support", amended_on),
      ]),
      ("two subscriptions", vec![
        flat("cp-a", 0, "Licence", 200, signed),
        flat("cp-b", 0, "Licence", 200, signed),
      ]),
      ("commitment range", vec![flat("cp", 0, "Abonnement", 500, Some(day(2016, 1, 1))), usage]),
      ("one-time before recurring", vec![
        ledger_row("cp", 0, "Installation", PricingMode::OneTime, Field::NotApplicable, signed),
        flat("cp", 1, "Abonnement", 500, Some(day(2016, 1, 1))),
      ]),
      ("out of range", vec![
        ledger_row("cp", 0, "Licence", PricingMode::RecurringFlat, huge(), signed),
        ledger_row("cp", 1, "Support", PricingMode::RecurringFlat, huge(), signed),
      ]),
    ]
  }

  fn fixture(name: &str) -> Vec<ProductRow> {
    fixtures().into_iter().find(|(n, _)| *n == name).map(|(_, rows)| rows).unwrap()
  }

  #[test]
  fn every_fixture_segments_consistently() {
    for (name, rows) in fixtures() {
      let seg = segment(&rows, &[]);
      assert_consistent(name, &rows, &seg);
    }
  }

  #[test]
  fn flat_and_usage_rows_share_one_aggregate() {
    let seg = segment(&fixture("flat and usage"), &[]);
    assert_eq!(seg.periods.len(), 1);
    assert_eq!(seg.periods[0].total, Aggregate::Computed { amount: Amount::from(800) });
    assert_eq!(seg.assignment, vec![0, 0]);
    assert_eq!(seg.periods[0].members.len(), 2);
  }

  #[test]
  fn same_product_twice_in_one_document_counts_twice() {
    let seg = segment(&fixture("same document duplicates"), &[]);
    assert_eq!(seg.periods.len(), 1);
    assert_eq!(seg.periods[0].total, Aggregate::Computed { amount: Amount::from(800) });
    assert_eq!(seg.periods[0].members.len(), 2);
  }

  #[test]
  fn separate_subscriptions_do_not_supersede() {
    let seg = segment(&fixture("two subscriptions"), &[]);
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(400)));
  }

  #[test]
  fn undated_rows_open_the_timeline() {
    let rows = fixture("undated subscription, dated amendment");
    let seg = segment(&rows, &[]);
    assert_eq!(seg.periods.len(), 2);
    assert_eq!(seg.periods[0].start, None);
    assert_eq!(seg.periods[0].end, Some(day(2017, 1, 1)));
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(500)));
    assert_eq!(seg.periods[0].members, vec![rows[0].row_id]);
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(650)));
    assert_eq!(seg.assignment, vec![0, 1]);

    let seg = segment(&fixture("undated subscription, amendment adds"), &[]);
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(500)));
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(600)));
  }

  #[test]
  fn undated_amendment_replaces_from_the_start() {
    let rows = fixture("undated amendment replaces");
    let seg = segment(&rows, &[]);
    assert_eq!(seg.periods.len(), 1);
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(650)));
    assert_eq!(seg.periods[0].members, vec![rows[1].row_id]);
  }

  #[test]
  fn explicit_total_wins_over_the_sum() {
    let explicit = ExplicitTotal {
      date:        Some(day(2015, 10, 1)),
      amount:      Amount::from(480),
      document_id: "cp".into(),
    };

    let seg = segment(&[flat("cp", 0, "Abonnement", 500, Some(day(2015, 10, 1)))], &[explicit]);
    assert_eq!(seg.periods[0].total, Aggregate::Explicit { amount: Amount::from(480) });
  }

  #[test]
  fn amendment_opens_a_new_period_and_supersedes() {
    let seg = segment(&fixture("amendment supersedes"), &[]);
    assert_eq!(seg.periods.len(), 2);
    assert_eq!(seg.periods[0].end, Some(day(2017, 1, 1)));
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(600)));
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(750)));
    assert_eq!(seg.assignment, vec![0, 0, 1]);
  }

  #[test]
  fn withdrawn_product_leaves_later_periods() {
    let rows = fixture("withdrawal");
    let seg = segment(&rows, &[]);
    assert_eq!(seg.periods.len(), 2);
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(600)));
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(500)));
    assert_eq!(seg.periods[1].members, vec![rows[0].row_id]);
    assert_eq!(seg.assignment, vec![0, 0, 1]);
  }

  #[test]
  fn unknown_contributor_makes_the_period_unknown() {
    let row = ledger_row("cp", 0, "Abonnement", PricingMode::RecurringFlat, Field::Unknown, None);

    let seg = segment(&[row], &[]);
    assert_eq!(seg.periods[0].total.amount(), Field::Unknown);
    assert_eq!(seg.issues.len(), 1);
  }

  #[test]
  fn no_recurring_rows_is_not_a_silent_zero() {
    let setup =
      ledger_row("cp", 0, "Installation", PricingMode::OneTime, Field::NotApplicable, None);

    let seg = segment(&[setup], &[]);
    assert_eq!(
      seg.periods[0].total,
      Aggregate::NonComputable { reason: "no recurring contributors".into() }
    );
  }

  #[test]
  fn one_time_row_before_the_first_boundary_keeps_its_date() {
    let seg = segment(&fixture("one-time before recurring"), &[]);
    assert_eq!(seg.periods.len(), 2);
    assert_eq!(seg.periods[0].start, None);
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(500)));
    assert_eq!(seg.assignment, vec![0, 1]);
  }

  #[test]
  fn commitment_range_closes_its_period() {
    let seg = segment(&fixture("commitment range"), &[]);
    assert_eq!(seg.periods.len(), 2);
    assert_eq!(seg.periods[0].total.amount(), Field::Known(Amount::from(800)));
    assert_eq!(seg.periods[1].start, Some(day(2017, 1, 1)));
    assert_eq!(seg.periods[1].total.amount(), Field::Known(Amount::from(500)));
  }

  #[test]
  fn overflowing_total_is_not_computable() {
    let seg = segment(&fixture("out of range"), &[]);
    assert_eq!(
      seg.periods[0].total,
      Aggregate::NonComputable { reason: "monthly total is out of range".into() }
    );
    assert_eq!(seg.issues.len(), 1);
  }
}
