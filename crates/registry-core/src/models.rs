use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Output format for dates in query results.
pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// The three logical dataset categories exported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Enrolment,
    Demographic,
    Biometric,
}

impl Category {
    /// Every category, in load order.
    pub const ALL: [Category; 3] = [
        Category::Enrolment,
        Category::Demographic,
        Category::Biometric,
    ];

    /// Lower-case name used in logs, CLI flags and query output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Enrolment => "enrolment",
            Category::Demographic => "demographic",
            Category::Biometric => "biometric",
        }
    }

    /// Folder name the registry's bulk export uses for this category.
    pub fn default_folder(&self) -> &'static str {
        match self {
            Category::Enrolment => "api_data_aadhar_enrolment",
            Category::Demographic => "api_data_aadhar_demographic",
            Category::Biometric => "api_data_aadhar_biometric",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enrolment" | "enrollment" => Ok(Category::Enrolment),
            "demographic" => Ok(Category::Demographic),
            "biometric" => Ok(Category::Biometric),
            other => Err(RegistryError::InvalidCategory(other.to_string())),
        }
    }
}

/// One row exactly as it came out of a source file, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Raw header → raw value, in source column order.
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Build a record by zipping a header with one line of values.
    pub fn from_header(headers: &[String], values: &[String]) -> Self {
        Self {
            fields: headers
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        }
    }
}

/// A typed cell value after coercion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellValue {
    /// Column absent for this row.
    Null,
    /// Free text, trimmed.
    Text(String),
    /// Non-negative count; a missing count is zero.
    Count(u64),
    /// Calendar date. `None` is the explicit unknown-date marker.
    Date(Option<NaiveDate>),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            CellValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// `Some(None)` for an unknown date, `None` when the cell is not a date.
    pub fn as_date(&self) -> Option<Option<NaiveDate>> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// `true` for [`CellValue::Null`] and the unknown-date marker.
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Null | CellValue::Date(None))
    }

    /// Plain JSON rendering used by the query layer. Missing values become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null | CellValue::Date(None) => serde_json::Value::Null,
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Count(n) => serde_json::Value::from(*n),
            CellValue::Date(Some(d)) => {
                serde_json::Value::String(d.format(DATE_OUTPUT_FORMAT).to_string())
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("null"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Count(n) => write!(f, "{}", n),
            CellValue::Date(Some(d)) => write!(f, "{}", d.format(DATE_OUTPUT_FORMAT)),
            CellValue::Date(None) => f.write_str("unknown-date"),
        }
    }
}

/// One normalized row keyed by clean column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for constructing fixtures.
    pub fn with(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.cells.insert(column.into(), value);
        self
    }

    pub(crate) fn insert(&mut self, column: String, value: CellValue) {
        self.cells.insert(column, value);
    }

    /// Cell for `column`; absent columns read as [`CellValue::Null`].
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&CellValue::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).as_text()
    }

    /// Count value of `column`, or `None` when the column is absent or not a count.
    pub fn count(&self, column: &str) -> Option<u64> {
        self.get(column).as_count()
    }

    /// Date of `column`; `None` covers both "absent" and "unknown date".
    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).as_date().flatten()
    }

}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// An immutable, merged set of rows for one category.
///
/// There is no mutable access once constructed; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Dataset {
    category: Category,
    contract_version: u32,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(
        category: Category,
        contract_version: u32,
        columns: Vec<String>,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            category,
            contract_version,
            columns,
            rows,
        }
    }

    /// The explicit "no data available" dataset.
    pub fn empty(category: Category) -> Self {
        Self::new(
            category,
            crate::schema::SchemaContract::for_category(category).version,
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn contract_version(&self) -> u32 {
        self.contract_version
    }

    /// Union of clean column names seen across all merged files, in first-seen order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of a count column over every row (absent cells count as zero).
    ///
    /// Saturates at `u64::MAX` instead of overflowing.
    pub fn column_total(&self, column: &str) -> u64 {
        saturating_sum(self.rows.iter().filter_map(|r| r.count(column)))
    }
}

/// Sum counts, saturating at `u64::MAX`.
pub fn saturating_sum<I: IntoIterator<Item = u64>>(values: I) -> u64 {
    values.into_iter().fold(0, u64::saturating_add)
}

/// Result of grouping rows by key columns and summing value columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRow {
    /// Key column → key value, in the order the keys were requested.
    pub keys: Vec<(String, CellValue)>,
    /// Summed (and derived) value columns.
    pub values: BTreeMap<String, u64>,
}

impl AggregateRow {
    pub fn key(&self, column: &str) -> Option<&CellValue> {
        self.keys
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn value(&self, column: &str) -> Option<u64> {
        self.values.get(column).copied()
    }

    /// Flatten into a JSON object: keys first, then values.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.keys {
            map.insert(name.clone(), value.to_json());
        }
        for (name, value) in &self.values {
            map.insert(name.clone(), serde_json::Value::from(*value));
        }
        map
    }
}

/// A percentage that is undefined when its denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coverage {
    Defined(f64),
    Undefined,
}

impl Coverage {
    /// `numerator / denominator × 100`, or [`Coverage::Undefined`] for a zero denominator.
    pub fn ratio(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Coverage::Undefined
        } else {
            Coverage::Defined(numerator as f64 / denominator as f64 * 100.0)
        }
    }

    pub fn as_option(&self) -> Option<f64> {
        match self {
            Coverage::Defined(v) => Some(*v),
            Coverage::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Coverage::Defined(_))
    }
}

/// Enrolment vs biometric totals for one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRow {
    pub state: String,
    pub enrolment_total: u64,
    pub biometric_total: u64,
    /// Enrolments not yet matched by a biometric capture. Negative when
    /// biometric captures exceed enrolments.
    pub pending: i64,
    pub coverage_pct: Coverage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert_eq!("Enrollment".parse::<Category>().unwrap(), Category::Enrolment);
        assert!("census".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_lowercase() {
        let json = serde_json::to_string(&Category::Biometric).unwrap();
        assert_eq!(json, "\"biometric\"");
    }

    #[test]
    fn test_raw_record_from_header() {
        let headers = vec!["State".to_string(), "Age 0 5".to_string()];
        let values = vec!["Goa".to_string(), "4".to_string()];
        let record = RawRecord::from_header(&headers, &values);
        assert_eq!(
            record.fields,
            vec![
                ("State".to_string(), "Goa".to_string()),
                ("Age 0 5".to_string(), "4".to_string())
            ]
        );
    }

    #[test]
    fn test_row_accessors() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let row = Row::new()
            .with("state", CellValue::Text("Goa".into()))
            .with("age_0_5", CellValue::Count(7))
            .with("date", CellValue::Date(Some(date)));

        assert_eq!(row.text("state"), Some("Goa"));
        assert_eq!(row.count("age_0_5"), Some(7));
        assert_eq!(row.date("date"), Some(date));
        assert_eq!(row.get("district"), &CellValue::Null);
        assert_eq!(row.count("state"), None);
    }

    #[test]
    fn test_unknown_date_is_missing_and_null_in_json() {
        let cell = CellValue::Date(None);
        assert!(cell.is_missing());
        assert_eq!(cell.as_date(), Some(None));
        assert_eq!(cell.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_cell_json_rendering() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(CellValue::Date(Some(date)).to_json(), "2025-12-31");
        assert_eq!(CellValue::Count(3).to_json(), 3);
        assert_eq!(CellValue::Text("X".into()).to_json(), "X");
    }

    #[test]
    fn test_dataset_empty_and_totals() {
        let empty = Dataset::empty(Category::Enrolment);
        assert!(empty.is_empty());
        assert_eq!(empty.column_total("age_0_5"), 0);

        let rows = vec![
            Row::new().with("age_0_5", CellValue::Count(2)),
            Row::new().with("age_0_5", CellValue::Count(5)),
            Row::new(),
        ];
        let ds = Dataset::new(Category::Enrolment, 1, vec!["age_0_5".into()], rows);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.column_total("age_0_5"), 7);
    }

    #[test]
    fn test_column_total_saturates() {
        let rows = vec![
            Row::new().with("age_0_5", CellValue::Count(u64::MAX)),
            Row::new().with("age_0_5", CellValue::Count(1)),
        ];
        let ds = Dataset::new(Category::Enrolment, 1, vec!["age_0_5".into()], rows);
        assert_eq!(ds.column_total("age_0_5"), u64::MAX);
        assert_eq!(saturating_sum([u64::MAX - 1, 1, 1]), u64::MAX);
        assert_eq!(saturating_sum([2, 3]), 5);
    }

    #[test]
    fn test_coverage_ratio() {
        assert_eq!(Coverage::ratio(80, 100), Coverage::Defined(80.0));
        assert_eq!(Coverage::ratio(5, 0), Coverage::Undefined);
        assert_eq!(Coverage::Undefined.as_option(), None);
        assert_eq!(serde_json::to_value(Coverage::Undefined).unwrap(), serde_json::Value::Null);
        assert_eq!(serde_json::to_value(Coverage::Defined(12.5)).unwrap(), 12.5);
    }

    #[test]
    fn test_aggregate_row_json_map() {
        let mut row = AggregateRow {
            keys: vec![("state".to_string(), CellValue::Text("X".into()))],
            values: BTreeMap::new(),
        };
        row.values.insert("total".to_string(), 9);
        let map = row.to_json_map();
        assert_eq!(map["state"], "X");
        assert_eq!(map["total"], 9);
        assert_eq!(row.value("missing"), None);
    }
}
