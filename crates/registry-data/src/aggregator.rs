//! Pure aggregation primitives over normalized rows.
//!
//! Every function here takes its inputs by reference and returns fresh
//! output; nothing is mutated, so the same call on the same input always
//! produces the same result.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use registry_core::error::Result;
use registry_core::models::{AggregateRow, CellValue, Coverage, CoverageRow, Dataset, Row};
use registry_core::schema::{AGE_0_5, AGE_18_GREATER, AGE_5_17, BIO_AGE_17_, BIO_AGE_5_17};
use registry_core::stats::CorrelationMatrix;
use serde::{Deserialize, Serialize};

// ── Options ───────────────────────────────────────────────────────────────────

/// Sort direction for [`top_n`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Descending,
    Ascending,
}

/// Which enrolment cohorts count as the denominator of biometric coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBasis {
    /// Every enrolment cohort, infants included.
    #[default]
    TotalEnrolment,
    /// Only cohorts that biometric capture applies to (5 and over).
    EligibleEnrolment,
}

impl CoverageBasis {
    pub fn enrolment_columns(&self) -> &'static [&'static str] {
        match self {
            CoverageBasis::TotalEnrolment => &[AGE_0_5, AGE_5_17, AGE_18_GREATER],
            CoverageBasis::EligibleEnrolment => &[AGE_5_17, AGE_18_GREATER],
        }
    }
}

impl std::str::FromStr for CoverageBasis {
    type Err = registry_core::RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "total" | "total_enrolment" => Ok(CoverageBasis::TotalEnrolment),
            "eligible" | "eligible_enrolment" => Ok(CoverageBasis::EligibleEnrolment),
            other => Err(registry_core::RegistryError::Config(format!(
                "unknown coverage basis `{other}` (expected `total` or `eligible`)"
            ))),
        }
    }
}

/// Biometric cohorts summed into the coverage numerator.
pub const BIOMETRIC_COLUMNS: [&str; 2] = [BIO_AGE_5_17, BIO_AGE_17_];

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Group `rows` by `key_columns` and sum `value_columns` per group.
///
/// Groups appear in the order their key was first encountered. A missing key
/// cell forms its own [`CellValue::Null`] group; a missing value cell adds zero.
pub fn group_sum<'a, I>(rows: I, key_columns: &[&str], value_columns: &[&str]) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut index: HashMap<Vec<CellValue>, usize> = HashMap::new();
    let mut groups: Vec<AggregateRow> = Vec::new();

    for row in rows {
        let key: Vec<CellValue> = key_columns.iter().map(|c| row.get(c).clone()).collect();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push(AggregateRow {
                    keys: key_columns
                        .iter()
                        .zip(key.iter().cloned())
                        .map(|(name, value)| (name.to_string(), value))
                        .collect(),
                    values: value_columns.iter().map(|c| (c.to_string(), 0)).collect(),
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        for column in value_columns {
            let add = row.count(column).unwrap_or(0);
            if let Some(total) = group.values.get_mut(*column) {
                *total = total.saturating_add(add);
            }
        }
    }

    groups
}

/// Copy `rows`, adding `name` = sum of `components` to each.
///
/// A row lacking any component gets a total of zero rather than a partial sum.
pub fn add_derived_total(rows: &[AggregateRow], name: &str, components: &[&str]) -> Vec<AggregateRow> {
    rows.iter()
        .map(|row| {
            let mut out = row.clone();
            out.values.insert(name.to_string(), derived_total(row, components));
            out
        })
        .collect()
}

/// The first `n` rows ordered by `sort_column`.
///
/// The sort is stable: rows with equal values keep their input order. Rows
/// without the column sort as zero.
pub fn top_n(rows: &[AggregateRow], sort_column: &str, n: usize, direction: Direction) -> Vec<AggregateRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        let (va, vb) = (
            a.value(sort_column).unwrap_or(0),
            b.value(sort_column).unwrap_or(0),
        );
        match direction {
            Direction::Descending => vb.cmp(&va),
            Direction::Ascending => va.cmp(&vb),
        }
    });
    sorted.truncate(n);
    sorted
}

/// Sort aggregate rows by their key columns in order, missing keys last.
///
/// Gives grouped output an order that does not depend on which input row
/// was seen first. Combine with the stable [`top_n`] to break value ties.
pub fn sort_by_keys(rows: &mut [AggregateRow], keys: &[&str]) {
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ka = a.key(key).unwrap_or(&CellValue::Null);
                let kb = b.key(key).unwrap_or(&CellValue::Null);
                (ka.is_missing(), ka).cmp(&(kb.is_missing(), kb))
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Inner join of two aggregates on one key column.
///
/// Output follows `left` order. Value columns present on both sides keep the
/// left value. Missing keys never match anything.
pub fn join_on_key(left: &[AggregateRow], right: &[AggregateRow], key: &str) -> Vec<AggregateRow> {
    let mut right_index: HashMap<&CellValue, &AggregateRow> = HashMap::new();
    for row in right {
        if let Some(value) = row.key(key).filter(|v| !v.is_missing()) {
            right_index.entry(value).or_insert(row);
        }
    }

    left.iter()
        .filter_map(|row| {
            let value = row.key(key).filter(|v| !v.is_missing())?;
            let other = right_index.get(value)?;
            let mut joined = row.clone();
            for (column, v) in &other.values {
                joined.values.entry(column.clone()).or_insert(*v);
            }
            Some(joined)
        })
        .collect()
}

/// Number of distinct non-missing values of `column`.
pub fn distinct_count<'a, I>(rows: I, column: &str) -> usize
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .map(|row| row.get(column))
        .filter(|v| !v.is_missing())
        .collect::<HashSet<_>>()
        .len()
}

// ── Views ─────────────────────────────────────────────────────────────────────

/// Inclusive date window. An open bound accepts everything on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether a row dated `date` falls in the window.
    ///
    /// Unknown dates only pass an unbounded range.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        match date {
            None => self.is_unbounded(),
            Some(d) => self.from.map_or(true, |f| d >= f) && self.to.map_or(true, |t| d <= t),
        }
    }
}

/// Borrowed subset of a dataset's rows, in dataset order.
#[derive(Debug, Clone)]
pub struct DatasetView<'a> {
    rows: Vec<&'a Row>,
}

impl<'a> DatasetView<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            rows: dataset.rows().iter().collect(),
        }
    }

    /// Narrow the view to rows matching `predicate`.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Row) -> bool,
    {
        Self {
            rows: self.rows.into_iter().filter(|r| predicate(*r)).collect(),
        }
    }

    /// Rows whose `column` text equals `value` exactly.
    pub fn where_text(self, column: &str, value: &str) -> Self {
        self.filter(|r| r.text(column) == Some(value))
    }

    /// Rows whose `column` date falls within `range`.
    pub fn within(self, column: &str, range: DateRange) -> Self {
        if range.is_unbounded() {
            return self;
        }
        self.filter(|r| range.contains(r.date(column)))
    }

    pub fn rows(&self) -> &[&'a Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Row> + '_ {
        self.rows.iter().copied()
    }
}

/// Rows of `dataset` matching `predicate`.
pub fn filter_rows<F>(dataset: &Dataset, predicate: F) -> DatasetView<'_>
where
    F: Fn(&Row) -> bool,
{
    DatasetView::new(dataset).filter(predicate)
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Pearson correlation matrix of `columns` across aggregate rows.
///
/// Fails with `InsufficientData` for fewer than two rows.
pub fn correlation_matrix(columns: &[&str], rows: &[AggregateRow]) -> Result<CorrelationMatrix> {
    let series: Vec<Vec<f64>> = columns
        .iter()
        .map(|c| rows.iter().map(|r| r.value(c).unwrap_or(0) as f64).collect())
        .collect();
    CorrelationMatrix::from_series(columns.iter().map(|c| c.to_string()).collect(), &series)
}

/// Pending enrolments and biometric coverage per state.
///
/// Both inputs are aggregates keyed by `state`; only states present in both
/// are reported, ordered by state name.
pub fn pending_and_coverage(
    enrolment: &[AggregateRow],
    biometric: &[AggregateRow],
    basis: CoverageBasis,
) -> Vec<CoverageRow> {
    let key = registry_core::schema::STATE;
    let mut rows: Vec<CoverageRow> = join_on_key(enrolment, biometric, key)
        .iter()
        .map(|row| {
            let enrolment_total = derived_total(row, basis.enrolment_columns());
            let biometric_total = derived_total(row, &BIOMETRIC_COLUMNS);
            CoverageRow {
                state: row.key(key).map(|v| v.to_string()).unwrap_or_default(),
                enrolment_total,
                biometric_total,
                pending: signed_gap(enrolment_total, biometric_total),
                coverage_pct: Coverage::ratio(biometric_total, enrolment_total),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.state.cmp(&b.state));
    rows
}

/// `a - b` as a signed count, clamped to the `i64` range.
pub fn signed_gap(a: u64, b: u64) -> i64 {
    (a as i128 - b as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn derived_total(row: &AggregateRow, components: &[&str]) -> u64 {
    components
        .iter()
        .map(|c| row.value(c))
        .try_fold(0u64, |acc, v| v.map(|v| acc.saturating_add(v)))
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
