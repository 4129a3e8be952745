//! Category loader: list, read, normalize and merge every file of a category.
//!
//! Loading never fails as a whole. Unreadable or non-conforming files are
//! skipped and recorded in the [`LoadReport`]; an unreachable source yields an
//! empty [`Dataset`].

use std::time::Instant;

use registry_core::models::{Category, Dataset, RawRecord, Row};
use registry_core::normalize::{CoercionStats, KindInference, Normalizer};
use registry_core::schema::SchemaContract;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::reader::{IngestionSource, SourceHandle};

// ── Public types ──────────────────────────────────────────────────────────────

/// A file the loader rejected, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

/// What happened while loading one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub category: Option<Category>,
    pub files_discovered: usize,
    pub files_loaded: usize,
    pub rows_loaded: usize,
    pub skipped: Vec<SkippedFile>,
    /// Set when the source could not even be listed.
    pub source_error: Option<String>,
    /// Cell repairs summed over every loaded file.
    pub coercion: CoercionStats,
    /// Wall-clock seconds spent on this category.
    pub load_time_seconds: f64,
}

impl LoadReport {
    fn new(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// `true` when every discovered file was loaded and the source was reachable.
    pub fn is_clean(&self) -> bool {
        self.source_error.is_none() && self.skipped.is_empty()
    }
}

// ── DatasetLoader ─────────────────────────────────────────────────────────────

/// Loads one category at a time from an [`IngestionSource`].
pub struct DatasetLoader<'a> {
    source: &'a dyn IngestionSource,
}

impl<'a> DatasetLoader<'a> {
    pub fn new(source: &'a dyn IngestionSource) -> Self {
        Self { source }
    }

    /// Load and merge every file of `category`.
    ///
    /// The returned dataset holds exactly the rows of the files that were
    /// read and normalized successfully, concatenated in listing order.
    pub fn load(&self, category: Category) -> (Dataset, LoadReport) {
        let start = Instant::now();
        let mut report = LoadReport::new(category);
        let contract = SchemaContract::for_category(category);

        let handles = match self.source.list_files(category) {
            Ok(handles) => handles,
            Err(e) => {
                warn!(category = %category, error = %e, "source unavailable; using empty dataset");
                report.source_error = Some(e.to_string());
                report.load_time_seconds = start.elapsed().as_secs_f64();
                return (Dataset::empty(category), report);
            }
        };
        report.files_discovered = handles.len();

        if handles.is_empty() {
            warn!(category = %category, "no source files found");
        }

        let normalizer = Normalizer::new(category);
        let mut accepted: Vec<(&SourceHandle, Vec<RawRecord>, Vec<String>)> = Vec::new();
        let mut inference = KindInference::default();

        for handle in &handles {
            match self.read_file(&normalizer, handle) {
                Ok((records, columns)) => {
                    inference.observe(&records);
                    accepted.push((handle, records, columns));
                }
                Err(reason) => {
                    warn!(
                        category = %category,
                        file = %handle.id,
                        reason = %reason,
                        "skipping source file"
                    );
                    report.skipped.push(SkippedFile {
                        file: handle.id.clone(),
                        reason,
                    });
                }
            }
        }

        // Column types are decided once for the whole category so that an
        // extra column has the same type in every merged row.
        let mut columns: Vec<String> = Vec::new();
        for (_, _, file_columns) in &accepted {
            for column in file_columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let kinds = inference.kinds(normalizer.contract(), &columns);

        let mut rows: Vec<Row> = Vec::new();
        for (handle, records, file_columns) in accepted {
            let file = normalizer.normalize_with_kinds(&handle.id, &records, file_columns, &kinds);
            report.rows_loaded += file.rows.len();
            report.files_loaded += 1;
            report.coercion.merge(&file.stats);
            rows.extend(file.rows);
        }

        report.load_time_seconds = start.elapsed().as_secs_f64();
        info!(
            category = %category,
            files_loaded = report.files_loaded,
            files_skipped = report.skipped.len(),
            rows = report.rows_loaded,
            elapsed_secs = report.load_time_seconds,
            "category loaded"
        );

        (
            Dataset::new(category, contract.version, columns, rows),
            report,
        )
    }

    /// Read one file and check its header; the error is the skip reason.
    fn read_file(
        &self,
        normalizer: &Normalizer,
        handle: &SourceHandle,
    ) -> Result<(Vec<RawRecord>, Vec<String>), String> {
        let records = self.source.read_rows(handle).map_err(|e| e.to_string())?;
        debug!(file = %handle.id, records = records.len(), "read source file");
        let columns = normalizer
            .check_header(&handle.id, &records)
            .map_err(|e| e.to_string())?;
        Ok((records, columns))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
