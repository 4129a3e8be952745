//! Column-name normalization and the per-category schema contracts.
//!
//! Every source file's header is cleaned with [`clean_column_name`] before it
//! is checked against the [`SchemaContract`] of its category. The contract is
//! the single place that names the columns downstream code relies on.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Category;

// ── Well-known column names ───────────────────────────────────────────────────

pub const STATE: &str = "state";
pub const DISTRICT: &str = "district";
pub const DATE: &str = "date";

pub const AGE_0_5: &str = "age_0_5";
pub const AGE_5_17: &str = "age_5_17";
pub const AGE_18_GREATER: &str = "age_18_greater";

pub const DEMO_AGE_5_17: &str = "demo_age_5_17";
pub const DEMO_AGE_17_: &str = "demo_age_17_";

pub const BIO_AGE_5_17: &str = "bio_age_5_17";
pub const BIO_AGE_17_: &str = "bio_age_17_";

/// Substring that marks a column as a `DD-MM-YYYY` date column.
pub const DATE_MARKER: &str = "date";

// ── Column-name cleaning ──────────────────────────────────────────────────────

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("regex is valid"))
}

/// Normalize a raw header: trim, lower-case, collapse interior whitespace to `_`.
///
/// ```
/// use registry_core::schema::clean_column_name;
///
/// assert_eq!(clean_column_name("  Age 0 5 "), "age_0_5");
/// assert_eq!(clean_column_name("Bio\tAge  5 17"), "bio_age_5_17");
/// assert_eq!(clean_column_name("age_0_5"), "age_0_5");
/// ```
pub fn clean_column_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    whitespace_run().replace_all(&lowered, "_").into_owned()
}

/// `true` when a clean column name should be parsed as a date.
pub fn is_date_column(clean_name: &str) -> bool {
    clean_name.contains(DATE_MARKER)
}

// ── SchemaContract ────────────────────────────────────────────────────────────

/// Columns every file of a category must provide after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    pub category: Category,
    /// Bumped whenever the required column set changes.
    pub version: u32,
    /// Text columns identifying the geography.
    pub key_columns: &'static [&'static str],
    /// The date column, parsed as `DD-MM-YYYY`.
    pub date_column: &'static str,
    /// Age-cohort count columns.
    pub count_columns: &'static [&'static str],
}

const ENROLMENT_CONTRACT: SchemaContract = SchemaContract {
    category: Category::Enrolment,
    version: 1,
    key_columns: &[STATE, DISTRICT],
    date_column: DATE,
    count_columns: &[AGE_0_5, AGE_5_17, AGE_18_GREATER],
};

const DEMOGRAPHIC_CONTRACT: SchemaContract = SchemaContract {
    category: Category::Demographic,
    version: 1,
    key_columns: &[STATE, DISTRICT],
    date_column: DATE,
    count_columns: &[DEMO_AGE_5_17, DEMO_AGE_17_],
};

const BIOMETRIC_CONTRACT: SchemaContract = SchemaContract {
    category: Category::Biometric,
    version: 1,
    key_columns: &[STATE, DISTRICT],
    date_column: DATE,
    count_columns: &[BIO_AGE_5_17, BIO_AGE_17_],
};

impl SchemaContract {
    pub fn for_category(category: Category) -> &'static SchemaContract {
        match category {
            Category::Enrolment => &ENROLMENT_CONTRACT,
            Category::Demographic => &DEMOGRAPHIC_CONTRACT,
            Category::Biometric => &BIOMETRIC_CONTRACT,
        }
    }

    /// All required columns: keys, then the date column, then the counts.
    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.key_columns
            .iter()
            .copied()
            .chain(std::iter::once(self.date_column))
            .chain(self.count_columns.iter().copied())
    }

    /// First required column absent from `clean_header`, if any.
    pub fn first_missing(&self, clean_header: &[String]) -> Option<&'static str> {
        self.required_columns()
            .find(|required| !clean_header.iter().any(|h| h.as_str() == *required))
    }

    pub fn is_count_column(&self, clean_name: &str) -> bool {
        self.count_columns.contains(&clean_name)
    }

    /// Name of the derived total column for this category, e.g. `total_enrolment`.
    pub fn total_column(&self) -> String {
        format!("total_{}", self.category.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_is_case_and_whitespace_invariant() {
        let variants = ["Age 0 5", "age 0 5", "  AGE 0 5  ", "Age\t0  5", "age_0_5"];
        for raw in variants {
            assert_eq!(clean_column_name(raw), "age_0_5", "raw = {:?}", raw);
        }
    }

    #[test]
    fn test_clean_is_idempotent() {
        for raw in ["State", " District Name ", "Bio Age 17_", "date", ""] {
            let once = clean_column_name(raw);
            assert_eq!(clean_column_name(&once), once);
        }
    }

    #[test]
    fn test_is_date_column() {
        assert!(is_date_column("date"));
        assert!(is_date_column("update_date"));
        assert!(!is_date_column("district"));
    }

    #[test]
    fn test_contract_required_columns_order() {
        let required: Vec<&str> = SchemaContract::for_category(Category::Biometric)
            .required_columns()
            .collect();
        assert_eq!(
            required,
            vec!["state", "district", "date", "bio_age_5_17", "bio_age_17_"]
        );
    }

    #[test]
    fn test_contract_first_missing() {
        let contract = SchemaContract::for_category(Category::Enrolment);
        let header: Vec<String> = ["date", "state", "district", "age_0_5", "age_5_17"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(contract.first_missing(&header), Some("age_18_greater"));

        let mut full = header.clone();
        full.push("age_18_greater".to_string());
        full.push("pincode".to_string());
        assert_eq!(contract.first_missing(&full), None);
    }

    #[test]
    fn test_total_column_names() {
        assert_eq!(
            SchemaContract::for_category(Category::Enrolment).total_column(),
            "total_enrolment"
        );
        assert_eq!(
            SchemaContract::for_category(Category::Biometric).total_column(),
            "total_biometric"
        );
    }
}
