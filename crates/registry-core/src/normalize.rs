use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};
use crate::models::{Category, CellValue, RawRecord, Row};
use crate::schema::{clean_column_name, is_date_column, SchemaContract};

/// The only accepted date layout in source files.
pub const SOURCE_DATE_FORMAT: &str = "%d-%m-%Y";

// ── DateParser ────────────────────────────────────────────────────────────────

/// Parses `DD-MM-YYYY` dates found in registry exports.
pub struct DateParser;

impl DateParser {
    /// `None` for empty input, a wrong layout, or an impossible calendar date
    /// such as `31-02-2024`.
    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(trimmed, SOURCE_DATE_FORMAT).ok()
    }
}

// ── CountParser ───────────────────────────────────────────────────────────────

/// Outcome of coercing one raw count value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountParse {
    /// Parsed cleanly.
    Value(u64),
    /// Empty cell, read as zero.
    Empty,
    /// Negative number, clamped to zero.
    Negative,
    /// Not a number at all, read as zero.
    Invalid,
}

impl CountParse {
    pub fn value(&self) -> u64 {
        match self {
            CountParse::Value(v) => *v,
            _ => 0,
        }
    }
}

/// Coerces raw count cells. A missing count is zero, not unknown.
pub struct CountParser;

impl CountParser {
    pub fn parse(raw: &str) -> CountParse {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CountParse::Empty;
        }
        if let Ok(v) = trimmed.parse::<u64>() {
            return CountParse::Value(v);
        }
        // Exports written through a float column carry values like "12.0".
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 => CountParse::Value(f.trunc() as u64),
            Ok(f) if f.is_finite() => CountParse::Negative,
            _ => CountParse::Invalid,
        }
    }

    /// `true` when `raw` is a number of any sign.
    pub fn looks_numeric(raw: &str) -> bool {
        let trimmed = raw.trim();
        trimmed.parse::<i64>().is_ok()
            || trimmed.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
    }
}

// ── Column typing ─────────────────────────────────────────────────────────────

/// Inferred type of a normalized column within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Date,
    Count,
    Text,
}

/// Counters describing what coercion had to repair in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    /// Date cells that did not parse and became the unknown-date marker.
    pub unknown_dates: u64,
    /// Empty or non-numeric count cells read as zero.
    pub zero_filled_counts: u64,
    /// Negative count cells clamped to zero.
    pub clamped_negatives: u64,
}

impl CoercionStats {
    pub fn merge(&mut self, other: &CoercionStats) {
        self.unknown_dates += other.unknown_dates;
        self.zero_filled_counts += other.zero_filled_counts;
        self.clamped_negatives += other.clamped_negatives;
    }
}

/// Rows of one file after normalization, plus what it took to get there.
#[derive(Debug, Clone, Default)]
pub struct NormalizedFile {
    /// Clean column names in first-seen order.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub stats: CoercionStats,
}

// ── KindInference ─────────────────────────────────────────────────────────────

/// Numeric evidence per clean column, gathered over any number of files.
///
/// Feeding every file of a category through one inference gives each extra
/// column a single type for the whole merged dataset.
#[derive(Debug, Default)]
pub struct KindInference {
    /// `true` while every non-empty value seen so far is numeric.
    numeric: HashMap<String, bool>,
}

impl KindInference {
    pub fn observe(&mut self, records: &[RawRecord]) {
        for record in records {
            for (raw_name, raw_value) in &record.fields {
                if raw_value.trim().is_empty() {
                    continue;
                }
                let entry = self.numeric.entry(clean_column_name(raw_name)).or_insert(true);
                *entry = *entry && CountParser::looks_numeric(raw_value);
            }
        }
    }

    /// Contract count columns are always counts and date-named columns are
    /// always dates. Any other column is a count when every non-empty value
    /// observed is numeric, and text otherwise.
    pub fn kinds(&self, contract: &SchemaContract, columns: &[String]) -> HashMap<String, ColumnKind> {
        columns
            .iter()
            .map(|column| {
                let kind = if is_date_column(column) {
                    ColumnKind::Date
                } else if contract.is_count_column(column) {
                    ColumnKind::Count
                } else if self.numeric.get(column).copied().unwrap_or(false) {
                    ColumnKind::Count
                } else {
                    ColumnKind::Text
                };
                (column.clone(), kind)
            })
            .collect()
    }
}

// ── Normalizer ────────────────────────────────────────────────────────────────

/// Turns the raw records of one source file into typed, clean-keyed rows.
pub struct Normalizer {
    contract: &'static SchemaContract,
}

impl Normalizer {
    pub fn new(category: Category) -> Self {
        Self {
            contract: SchemaContract::for_category(category),
        }
    }

    pub fn contract(&self) -> &'static SchemaContract {
        self.contract
    }

    /// Normalize every record of one file, inferring column types from that
    /// file alone.
    ///
    /// Fails only when the file as a whole violates the category contract;
    /// cell-level problems are repaired and counted in [`CoercionStats`].
    pub fn normalize_file(&self, file_id: &str, records: &[RawRecord]) -> Result<NormalizedFile> {
        let columns = self.check_header(file_id, records)?;
        let kinds = self.infer_kinds(&columns, records);
        Ok(self.normalize_with_kinds(file_id, records, columns, &kinds))
    }

    /// Clean the header of one file and check it against the contract.
    ///
    /// A file with no data rows passes with no columns.
    pub fn check_header(&self, file_id: &str, records: &[RawRecord]) -> Result<Vec<String>> {
        if records.is_empty() {
            debug!(category = %self.contract.category, file = file_id, "file has no data rows");
            return Ok(Vec::new());
        }

        let columns = clean_header(records);
        if let Some(missing) = self.contract.first_missing(&columns) {
            return Err(RegistryError::MissingColumn {
                category: self.contract.category,
                file: file_id.to_string(),
                column: missing.to_string(),
            });
        }
        Ok(columns)
    }

    /// Coerce the records of one file using column types decided elsewhere,
    /// typically across every file of the category.
    pub fn normalize_with_kinds(
        &self,
        file_id: &str,
        records: &[RawRecord],
        columns: Vec<String>,
        kinds: &HashMap<String, ColumnKind>,
    ) -> NormalizedFile {
        let mut stats = CoercionStats::default();
        let rows = records
            .iter()
            .map(|record| self.normalize_record(record, &columns, kinds, &mut stats))
            .collect();

        if stats.unknown_dates > 0 || stats.clamped_negatives > 0 {
            warn!(
                category = %self.contract.category,
                file = file_id,
                unknown_dates = stats.unknown_dates,
                clamped_negatives = stats.clamped_negatives,
                "repaired cells while normalizing file"
            );
        }

        NormalizedFile {
            columns,
            rows,
            stats,
        }
    }

    /// Decide the type of each clean column from the records of one file.
    pub fn infer_kinds(&self, columns: &[String], records: &[RawRecord]) -> HashMap<String, ColumnKind> {
        let mut inference = KindInference::default();
        inference.observe(records);
        inference.kinds(self.contract, columns)
    }

    fn normalize_record(
        &self,
        record: &RawRecord,
        columns: &[String],
        kinds: &HashMap<String, ColumnKind>,
        stats: &mut CoercionStats,
    ) -> Row {
        let mut by_clean: HashMap<String, &str> = HashMap::with_capacity(record.fields.len());
        for (raw_name, raw_value) in &record.fields {
            by_clean.insert(clean_column_name(raw_name), raw_value.as_str());
        }

        let mut row = Row::new();
        for column in columns {
            let raw = by_clean.get(column).copied().unwrap_or("");
            let kind = kinds.get(column).copied().unwrap_or(ColumnKind::Text);
            row.insert(column.clone(), coerce(kind, raw, stats));
        }
        row
    }
}

/// Coerce one raw cell to `kind`, recording any repair in `stats`.
pub fn coerce(kind: ColumnKind, raw: &str, stats: &mut CoercionStats) -> CellValue {
    match kind {
        ColumnKind::Date => {
            let parsed = DateParser::parse(raw);
            if parsed.is_none() {
                stats.unknown_dates += 1;
            }
            CellValue::Date(parsed)
        }
        ColumnKind::Count => {
            let parsed = CountParser::parse(raw);
            match parsed {
                CountParse::Value(_) => {}
                CountParse::Negative => stats.clamped_negatives += 1,
                CountParse::Empty | CountParse::Invalid => stats.zero_filled_counts += 1,
            }
            CellValue::Count(parsed.value())
        }
        ColumnKind::Text => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                CellValue::Null
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
    }
}

/// Union of the clean column names across `records`, in first-seen order.
fn clean_header(records: &[RawRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for (raw_name, _) in &record.fields {
            let clean = clean_column_name(raw_name);
            if !columns.contains(&clean) {
                columns.push(clean);
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn enrolment_record(date: &str, state: &str, a: &str, b: &str, c: &str) -> RawRecord {
        record(&[
            ("Date", date),
            ("State", state),
            ("District", "North"),
            ("Age 0 5", a),
            ("Age 5 17", b),
            ("Age 18 Greater", c),
        ])
    }

    // ── DateParser ────────────────────────────────────────────────────────────

    #[test]
    fn test_date_parser_day_month_year() {
        assert_eq!(
            DateParser::parse("09-03-2025"),
            NaiveDate::from_ymd_opt(2025, 3, 9)
        );
        assert_eq!(
            DateParser::parse(" 31-12-2024 "),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
    }

    #[test]
    fn test_date_parser_rejects_impossible_and_other_layouts() {
        assert_eq!(DateParser::parse("31-02-2024"), None);
        assert_eq!(DateParser::parse("2024-02-01"), None);
        assert_eq!(DateParser::parse(""), None);
        assert_eq!(DateParser::parse("soon"), None);
    }

    // ── CountParser ───────────────────────────────────────────────────────────

    #[test]
    fn test_count_parser() {
        assert_eq!(CountParser::parse("42"), CountParse::Value(42));
        assert_eq!(CountParser::parse(" 12.0 "), CountParse::Value(12));
        assert_eq!(CountParser::parse(""), CountParse::Empty);
        assert_eq!(CountParser::parse("-3"), CountParse::Negative);
        assert_eq!(CountParser::parse("n/a"), CountParse::Invalid);
        assert_eq!(CountParser::parse("NaN"), CountParse::Invalid);
        assert_eq!(CountParse::Negative.value(), 0);
    }

    // ── Normalizer ────────────────────────────────────────────────────────────

    #[test]
    fn test_normalize_cleans_headers_and_types() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let file = normalizer
            .normalize_file(
                "a.csv",
                &[enrolment_record("01-04-2025", " Goa ", "10", "5", "20")],
            )
            .unwrap();

        assert_eq!(
            file.columns,
            vec!["date", "state", "district", "age_0_5", "age_5_17", "age_18_greater"]
        );
        let row = &file.rows[0];
        assert_eq!(row.text("state"), Some("Goa"));
        assert_eq!(row.count("age_0_5"), Some(10));
        assert_eq!(row.count("age_18_greater"), Some(20));
        assert_eq!(row.date("date"), NaiveDate::from_ymd_opt(2025, 4, 1));
        assert_eq!(file.stats, CoercionStats::default());
    }

    #[test]
    fn test_invalid_date_keeps_row_with_unknown_marker() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let file = normalizer
            .normalize_file(
                "a.csv",
                &[enrolment_record("31-02-2024", "Goa", "1", "2", "3")],
            )
            .unwrap();

        assert_eq!(file.rows.len(), 1);
        let row = &file.rows[0];
        assert_eq!(row.get("date"), &CellValue::Date(None));
        assert_eq!(row.text("state"), Some("Goa"));
        assert_eq!(row.count("age_5_17"), Some(2));
        assert_eq!(file.stats.unknown_dates, 1);
    }

    #[test]
    fn test_missing_counts_are_zero_and_negatives_clamped() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let file = normalizer
            .normalize_file("a.csv", &[enrolment_record("01-01-2025", "Goa", "", "-4", "x")])
            .unwrap();

        let row = &file.rows[0];
        assert_eq!(row.count("age_0_5"), Some(0));
        assert_eq!(row.count("age_5_17"), Some(0));
        assert_eq!(row.count("age_18_greater"), Some(0));
        assert_eq!(file.stats.zero_filled_counts, 2);
        assert_eq!(file.stats.clamped_negatives, 1);
    }

    #[test]
    fn test_missing_required_column_rejects_file() {
        let normalizer = Normalizer::new(Category::Biometric);
        let err = normalizer
            .normalize_file(
                "bio.csv",
                &[record(&[
                    ("date", "01-01-2025"),
                    ("state", "Goa"),
                    ("district", "North"),
                    ("bio_age_5_17", "3"),
                ])],
            )
            .unwrap_err();

        match err {
            RegistryError::MissingColumn { column, file, .. } => {
                assert_eq!(column, "bio_age_17_");
                assert_eq!(file, "bio.csv");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extra_columns_are_inferred() {
        let normalizer = Normalizer::new(Category::Demographic);
        let records = vec![
            record(&[
                ("date", "01-01-2025"),
                ("state", "Goa"),
                ("district", "North"),
                ("demo_age_5_17", "1"),
                ("demo_age_17_", "2"),
                ("Pincode", "403001"),
                ("Sub District", "Tiswadi"),
            ]),
            record(&[
                ("date", "02-01-2025"),
                ("state", "Goa"),
                ("district", "South"),
                ("demo_age_5_17", "3"),
                ("demo_age_17_", "4"),
                ("Pincode", ""),
                ("Sub District", "Salcete"),
            ]),
        ];

        let file = normalizer.normalize_file("demo.csv", &records).unwrap();
        assert_eq!(file.rows[0].count("pincode"), Some(403001));
        assert_eq!(file.rows[1].count("pincode"), Some(0));
        assert_eq!(file.rows[1].text("sub_district"), Some("Salcete"));
    }

    #[test]
    fn test_kind_inference_spans_files() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let mut first = enrolment_record("01-01-2025", "Goa", "1", "1", "1");
        first.fields.push(("Pincode".into(), "403001".into()));
        let mut second = enrolment_record("02-01-2025", "Goa", "1", "1", "1");
        second.fields.push(("Pincode".into(), "403 001".into()));

        let mut inference = KindInference::default();
        inference.observe(std::slice::from_ref(&first));
        inference.observe(std::slice::from_ref(&second));

        let columns = normalizer.check_header("a.csv", std::slice::from_ref(&first)).unwrap();
        let kinds = inference.kinds(normalizer.contract(), &columns);
        assert_eq!(kinds["pincode"], ColumnKind::Text);
        assert_eq!(kinds["age_0_5"], ColumnKind::Count);
        assert_eq!(kinds["date"], ColumnKind::Date);

        // On its own the first file types the column as a count.
        let alone = normalizer.infer_kinds(&columns, std::slice::from_ref(&first));
        assert_eq!(alone["pincode"], ColumnKind::Count);

        let file = normalizer.normalize_with_kinds("a.csv", &[first], columns, &kinds);
        assert_eq!(file.rows[0].text("pincode"), Some("403001"));
    }

    #[test]
    fn test_empty_text_becomes_null() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let file = normalizer
            .normalize_file("a.csv", &[enrolment_record("01-01-2025", "  ", "1", "1", "1")])
            .unwrap();
        assert_eq!(file.rows[0].get("state"), &CellValue::Null);
    }

    #[test]
    fn test_no_records_is_empty_not_error() {
        let normalizer = Normalizer::new(Category::Enrolment);
        let file = normalizer.normalize_file("empty.csv", &[]).unwrap();
        assert!(file.rows.is_empty());
        assert!(file.columns.is_empty());
    }

    #[test]
    fn test_coercion_stats_merge() {
        let mut total = CoercionStats::default();
        total.merge(&CoercionStats {
            unknown_dates: 1,
            zero_filled_counts: 2,
            clamped_negatives: 3,
        });
        total.merge(&CoercionStats {
            unknown_dates: 1,
            zero_filled_counts: 0,
            clamped_negatives: 0,
        });
        assert_eq!(total.unknown_dates, 2);
        assert_eq!(total.zero_filled_counts, 2);
        assert_eq!(total.clamped_negatives, 3);
    }
}
