//! Named analytical queries over one snapshot.
//!
//! Each query composes the aggregation primitives and returns plain JSON
//! object rows. A query over an empty dataset returns no rows; it never
//! errors. Queries only read the snapshot, so repeated calls agree.

use std::sync::Arc;

use registry_core::error::Result;
use registry_core::formatting::percentage;
use registry_core::models::{saturating_sum, AggregateRow, Category, Coverage, CoverageRow};
use registry_core::schema::{
    SchemaContract, AGE_0_5, AGE_18_GREATER, AGE_5_17, BIO_AGE_17_, BIO_AGE_5_17, DATE, DISTRICT,
    STATE,
};
use registry_core::stats::CorrelationMatrix;
use registry_data::aggregator::{
    self, add_derived_total, distinct_count, filter_rows, group_sum, join_on_key,
    pending_and_coverage, sort_by_keys, top_n, CoverageBasis, DatasetView, DateRange, Direction,
    BIOMETRIC_COLUMNS,
};
use registry_data::snapshot::Snapshot;
use serde_json::{Map, Value};

/// One result row: column name → JSON value.
pub type QueryRow = Map<String, Value>;

/// Rows returned by [`Queries::district_rankings`] when no limit is given.
pub const DEFAULT_DISTRICT_LIMIT: usize = 20;

/// Rows returned by [`Queries::state_leaderboard`] when no limit is given.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

const ENROLMENT_COHORTS: [&str; 3] = [AGE_0_5, AGE_5_17, AGE_18_GREATER];
const CORRELATION_COLUMNS: [&str; 4] = [AGE_5_17, AGE_18_GREATER, BIO_AGE_5_17, BIO_AGE_17_];

// ── Queries ───────────────────────────────────────────────────────────────────

/// Read-only query facade bound to one snapshot.
#[derive(Debug, Clone)]
pub struct Queries {
    snapshot: Arc<Snapshot>,
}

impl Queries {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    // ── Core queries ──────────────────────────────────────────────────────

    /// Record count and per-cohort totals, one row per non-empty category.
    pub fn stats(&self) -> Vec<QueryRow> {
        Category::ALL
            .into_iter()
            .map(|category| self.snapshot.dataset(category))
            .filter(|dataset| !dataset.is_empty())
            .map(|dataset| {
                let mut row = QueryRow::new();
                row.insert("category".into(), Value::from(dataset.category().as_str()));
                row.insert("total_records".into(), Value::from(dataset.len()));
                for column in SchemaContract::for_category(dataset.category()).count_columns {
                    row.insert(
                        format!("{}_total", column),
                        Value::from(dataset.column_total(column)),
                    );
                }
                row
            })
            .collect()
    }

    /// Per-state cohort sums and a `total_<category>` column, ordered by state.
    pub fn state_summary(&self, category: Category) -> Vec<QueryRow> {
        let dataset = self.snapshot.dataset(category);
        let contract = SchemaContract::for_category(category);
        let grouped = group_sum(dataset.rows(), &[STATE], contract.count_columns);
        let mut rows = add_derived_total(&grouped, &contract.total_column(), contract.count_columns);
        sort_by_keys(&mut rows, &[STATE]);
        to_rows(&rows)
    }

    /// Per-date cohort sums in ascending date order.
    ///
    /// Rows with an unknown date are grouped together and come last with a
    /// `null` date. A bounded `range` excludes them.
    pub fn trends(&self, category: Category, range: DateRange) -> Vec<QueryRow> {
        let dataset = self.snapshot.dataset(category);
        let contract = SchemaContract::for_category(category);
        let view = DatasetView::new(dataset).within(DATE, range);
        let mut rows = group_sum(view.iter(), &[DATE], contract.count_columns);
        sort_by_keys(&mut rows, &[DATE]);
        to_rows(&rows)
    }

    /// Districts with the most enrolments, optionally within one state.
    ///
    /// Equal totals are ordered by state, then district.
    pub fn district_rankings(&self, state: Option<&str>, limit: usize) -> Vec<QueryRow> {
        let view = self.enrolment_view(state);
        let grouped = group_sum(view.iter(), &[STATE, DISTRICT], &ENROLMENT_COHORTS);
        let mut totals = add_derived_total(&grouped, "total", &ENROLMENT_COHORTS);
        sort_by_keys(&mut totals, &[STATE, DISTRICT]);
        top_n(&totals, "total", limit, Direction::Descending)
            .iter()
            .map(|row| select(row, &["total"]))
            .collect()
    }

    /// Typed coverage rows, ordered by state.
    pub fn coverage_rows(&self, basis: CoverageBasis) -> Vec<CoverageRow> {
        let enrolment = group_sum(self.snapshot.enrolment().rows(), &[STATE], &ENROLMENT_COHORTS);
        let biometric = group_sum(self.snapshot.biometric().rows(), &[STATE], &BIOMETRIC_COLUMNS);
        pending_and_coverage(&enrolment, &biometric, basis)
    }

    /// Enrolment vs biometric totals, pending count and coverage per state.
    pub fn coverage_gap(&self, basis: CoverageBasis) -> Vec<QueryRow> {
        self.coverage_rows(basis)
            .into_iter()
            .map(|row| {
                let mut out = QueryRow::new();
                out.insert("state".into(), Value::from(row.state));
                out.insert("enrolment_total".into(), Value::from(row.enrolment_total));
                out.insert("biometric_total".into(), Value::from(row.biometric_total));
                out.insert("pending".into(), Value::from(row.pending));
                out.insert("coverage_pct".into(), coverage_value(row.coverage_pct));
                out
            })
            .collect()
    }

    /// Pearson matrix between state-level enrolment and biometric cohorts.
    pub fn correlation_matrix(&self) -> Result<CorrelationMatrix> {
        let enrolment = group_sum(
            self.snapshot.enrolment().rows(),
            &[STATE],
            &[AGE_5_17, AGE_18_GREATER],
        );
        let biometric = group_sum(self.snapshot.biometric().rows(), &[STATE], &BIOMETRIC_COLUMNS);
        let joined = join_on_key(&enrolment, &biometric, STATE);
        aggregator::correlation_matrix(&CORRELATION_COLUMNS, &joined)
    }

    /// The correlation matrix as rows: `{column, <other>: r | null, ...}`.
    ///
    /// Empty when fewer than two states appear in both datasets.
    pub fn correlation(&self) -> Vec<QueryRow> {
        let matrix = match self.correlation_matrix() {
            Ok(matrix) => matrix,
            Err(e) => {
                tracing::debug!(error = %e, "correlation unavailable");
                return Vec::new();
            }
        };

        matrix
            .columns
            .iter()
            .zip(&matrix.values)
            .map(|(name, coefficients)| {
                let mut row = QueryRow::new();
                row.insert("column".into(), Value::from(name.as_str()));
                for (other, r) in matrix.columns.iter().zip(coefficients) {
                    row.insert(other.clone(), r.map(Value::from).unwrap_or(Value::Null));
                }
                row
            })
            .collect()
    }

    // ── Dashboard queries ─────────────────────────────────────────────────

    /// Headline figures across all three datasets, as a single row.
    pub fn overview(&self) -> Vec<QueryRow> {
        let snapshot = &self.snapshot;
        if Category::ALL
            .iter()
            .all(|c| snapshot.dataset(*c).is_empty())
        {
            return Vec::new();
        }

        let total_enrolment = saturating_sum(
            ENROLMENT_COHORTS
                .iter()
                .map(|c| snapshot.enrolment().column_total(c)),
        );
        let total_biometric = saturating_sum(
            BIOMETRIC_COLUMNS
                .iter()
                .map(|c| snapshot.biometric().column_total(c)),
        );

        let mut row = QueryRow::new();
        row.insert("total_enrolment".into(), Value::from(total_enrolment));
        row.insert("total_biometric".into(), Value::from(total_biometric));
        row.insert(
            "coverage_pct".into(),
            coverage_value(Coverage::ratio(total_biometric, total_enrolment)),
        );
        row.insert(
            "demographic_records".into(),
            Value::from(snapshot.demographic().len()),
        );
        row.insert(
            "states_covered".into(),
            Value::from(distinct_count(snapshot.enrolment().rows(), STATE)),
        );
        vec![row]
    }

    /// States ranked by total enrolment, ties in state order.
    pub fn state_leaderboard(&self, limit: usize) -> Vec<QueryRow> {
        let grouped = group_sum(self.snapshot.enrolment().rows(), &[STATE], &ENROLMENT_COHORTS);
        let mut totals = add_derived_total(&grouped, "total_enrolment", &ENROLMENT_COHORTS);
        sort_by_keys(&mut totals, &[STATE]);
        top_n(&totals, "total_enrolment", limit, Direction::Descending)
            .iter()
            .map(|row| select(row, &["total_enrolment"]))
            .collect()
    }

    /// Every district of `state` with cohort sums, largest first.
    pub fn district_breakdown(&self, state: &str) -> Vec<QueryRow> {
        let view = self.enrolment_view(Some(state));
        let grouped = group_sum(view.iter(), &[DISTRICT], &ENROLMENT_COHORTS);
        let mut totals = add_derived_total(&grouped, "total_enrolment", &ENROLMENT_COHORTS);
        sort_by_keys(&mut totals, &[DISTRICT]);
        to_rows(&top_n(&totals, "total_enrolment", totals.len(), Direction::Descending))
    }

    /// Enrolment totals per age cohort with each cohort's share in percent.
    pub fn age_distribution(&self) -> Vec<QueryRow> {
        let enrolment = self.snapshot.enrolment();
        if enrolment.is_empty() {
            return Vec::new();
        }

        let totals: Vec<(&str, u64)> = ENROLMENT_COHORTS
            .iter()
            .map(|c| (*c, enrolment.column_total(c)))
            .collect();
        let grand_total = saturating_sum(totals.iter().map(|(_, n)| *n));

        totals
            .into_iter()
            .map(|(cohort, count)| {
                let mut row = QueryRow::new();
                row.insert("age_group".into(), Value::from(cohort));
                row.insert("count".into(), Value::from(count));
                row.insert(
                    "share_pct".into(),
                    percentage(count as f64, grand_total as f64, 2)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                );
                row
            })
            .collect()
    }

    /// Infant vs adult enrolments per district, ordered by state and district.
    pub fn district_cohorts(&self, state: Option<&str>) -> Vec<QueryRow> {
        let view = self.enrolment_view(state);
        let mut rows = group_sum(view.iter(), &[STATE, DISTRICT], &[AGE_0_5, AGE_18_GREATER]);
        sort_by_keys(&mut rows, &[STATE, DISTRICT]);
        to_rows(&rows)
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn enrolment_view(&self, state: Option<&str>) -> DatasetView<'_> {
        let enrolment = self.snapshot.enrolment();
        match state {
            Some(state) => filter_rows(enrolment, |r| r.text(STATE) == Some(state)),
            None => DatasetView::new(enrolment),
        }
    }
}

fn to_rows(rows: &[AggregateRow]) -> Vec<QueryRow> {
    rows.iter().map(AggregateRow::to_json_map).collect()
}

/// Key columns plus only the named value columns.
fn select(row: &AggregateRow, values: &[&str]) -> QueryRow {
    let mut out = QueryRow::new();
    for (name, value) in &row.keys {
        out.insert(name.clone(), value.to_json());
    }
    for name in values {
        if let Some(v) = row.value(name) {
            out.insert(name.to_string(), Value::from(v));
        }
    }
    out
}

fn coverage_value(coverage: Coverage) -> Value {
    coverage.as_option().map(Value::from).unwrap_or(Value::Null)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
