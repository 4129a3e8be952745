use std::path::PathBuf;
use thiserror::Error;

use crate::models::Category;

/// All errors produced by the registry analytics pipeline.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The ingestion source for a category could not be reached or listed.
    #[error("Source unavailable for {category}: {reason}")]
    SourceUnavailable { category: Category, reason: String },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One row of a source file was malformed; the whole file is rejected.
    #[error("Malformed row in {file} (line {line}): {reason}")]
    RowParse {
        file: String,
        line: u64,
        reason: String,
    },

    /// A file's normalized header lacks a column the category contract requires.
    #[error("{file} is missing required {category} column `{column}`")]
    MissingColumn {
        category: Category,
        file: String,
        column: String,
    },

    /// A statistic was requested over fewer observations than it needs.
    #[error("Insufficient data for {statistic}: need at least {required} rows, got {actual}")]
    InsufficientData {
        statistic: String,
        required: usize,
        actual: usize,
    },

    /// A category name string is not one of the recognised categories.
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the registry crates.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = RegistryError::FileRead {
            path: PathBuf::from("/drops/enrolment_1.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/drops/enrolment_1.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_source_unavailable() {
        let err = RegistryError::SourceUnavailable {
            category: Category::Biometric,
            reason: "directory /missing does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Source unavailable for biometric: directory /missing does not exist"
        );
    }

    #[test]
    fn test_error_display_row_parse() {
        let err = RegistryError::RowParse {
            file: "part_3.csv".to_string(),
            line: 17,
            reason: "found record with 2 fields, but the previous record has 6 fields"
                .to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Malformed row in part_3.csv (line 17)"));
    }

    #[test]
    fn test_error_display_missing_column() {
        let err = RegistryError::MissingColumn {
            category: Category::Enrolment,
            file: "a.csv".to_string(),
            column: "age_0_5".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "a.csv is missing required enrolment column `age_0_5`"
        );
    }

    #[test]
    fn test_error_display_insufficient_data() {
        let err = RegistryError::InsufficientData {
            statistic: "pearson correlation".to_string(),
            required: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data for pearson correlation: need at least 2 rows, got 1"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = RegistryError::Config("no data directory".to_string());
        assert_eq!(err.to_string(), "Configuration error: no data directory");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RegistryError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: RegistryError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
