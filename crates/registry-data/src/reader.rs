//! Ingestion sources: where raw tabular rows come from.
//!
//! The loader only talks to the [`IngestionSource`] trait. The default
//! implementation, [`CsvDirectorySource`], discovers `.csv` files under one or
//! more directories per category and reads them with the `csv` crate;
//! [`MemorySource`] serves pre-built records (tests, or a host that already
//! pulled rows from a database).

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use registry_core::error::{RegistryError, Result};
use registry_core::models::{Category, RawRecord};
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Opaque reference to one tabular file (or table, or object) of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceHandle {
    /// Identifier used in logs and load reports.
    pub id: String,
    /// Filesystem location, when the source is file-backed.
    pub path: Option<PathBuf>,
}

impl SourceHandle {
    pub fn from_path(path: PathBuf) -> Self {
        Self {
            id: path.display().to_string(),
            path: Some(path),
        }
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
        }
    }
}

/// Provider of raw tabular files per category.
pub trait IngestionSource: Send + Sync {
    /// Enumerate the files holding `category` rows.
    ///
    /// An `Err` means the category as a whole is unreachable.
    fn list_files(&self, category: Category) -> Result<Vec<SourceHandle>>;

    /// Read every row of one file. Any malformed row fails the whole file.
    fn read_rows(&self, handle: &SourceHandle) -> Result<Vec<RawRecord>>;
}

/// Find `.csv` files under `dir`.
///
/// Files directly inside `dir` win; only when there are none is the whole tree
/// searched, which copes with exports that nest the data one folder deeper.
/// Results are sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Data path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files = walk_csv(dir, Some(1));
    if files.is_empty() {
        debug!(
            "No CSV files directly in {}; searching subdirectories",
            dir.display()
        );
        files = walk_csv(dir, None);
    }

    files.sort();
    files
}

// ── CsvDirectorySource ────────────────────────────────────────────────────────

/// Filesystem source: one or more directories of CSV exports per category.
#[derive(Debug, Clone, Default)]
pub struct CsvDirectorySource {
    dirs: BTreeMap<Category, Vec<PathBuf>>,
}

impl CsvDirectorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the registry's standard export folder names under `base`.
    pub fn from_base_dir(base: &Path) -> Self {
        Category::ALL
            .into_iter()
            .fold(Self::new(), |source, category| {
                source.with_dir(category, base.join(category.default_folder()))
            })
    }

    /// Add a directory for `category`.
    pub fn with_dir(mut self, category: Category, dir: impl Into<PathBuf>) -> Self {
        self.dirs.entry(category).or_default().push(dir.into());
        self
    }

    pub fn dirs(&self, category: Category) -> &[PathBuf] {
        self.dirs.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl IngestionSource for CsvDirectorySource {
    fn list_files(&self, category: Category) -> Result<Vec<SourceHandle>> {
        let dirs = self.dirs(category);
        if dirs.is_empty() {
            return Err(RegistryError::SourceUnavailable {
                category,
                reason: "no source directory configured".to_string(),
            });
        }

        let existing: Vec<&PathBuf> = dirs.iter().filter(|d| d.is_dir()).collect();
        if existing.is_empty() {
            let listed: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
            return Err(RegistryError::SourceUnavailable {
                category,
                reason: format!("no such directory: {}", listed.join(", ")),
            });
        }

        let mut handles = Vec::new();
        for dir in existing {
            let files = find_csv_files(dir);
            debug!(
                category = %category,
                dir = %dir.display(),
                files = files.len(),
                "scanned source directory"
            );
            handles.extend(files.into_iter().map(SourceHandle::from_path));
        }
        Ok(handles)
    }

    fn read_rows(&self, handle: &SourceHandle) -> Result<Vec<RawRecord>> {
        let path = handle
            .path
            .as_deref()
            .ok_or_else(|| RegistryError::Config(format!("{} has no path", handle.id)))?;
        read_csv_file(path)
    }
}

/// Read a CSV file with a header row into raw records.
///
/// Field counts must be consistent and the content must be UTF-8; the first
/// violation fails the file with [`RegistryError::RowParse`].
pub fn read_csv_file(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path).map_err(|source| RegistryError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let file_id = path.display().to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| row_error(&file_id, &e, 1))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // +2: one for the header, one for 1-based lines.
        let record = result.map_err(|e| row_error(&file_id, &e, idx as u64 + 2))?;
        let values: Vec<String> = record.iter().map(str::to_string).collect();
        records.push(RawRecord::from_header(&headers, &values));
    }

    Ok(records)
}

// ── MemorySource ──────────────────────────────────────────────────────────────

/// In-memory source; each "file" is a named list of records, or a read error.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<Category, Vec<(String, std::result::Result<Vec<RawRecord>, String>)>>,
    unavailable: BTreeMap<Category, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, category: Category, id: &str, records: Vec<RawRecord>) -> Self {
        self.files
            .entry(category)
            .or_default()
            .push((id.to_string(), Ok(records)));
        self
    }

    /// A file whose read fails with `reason`.
    pub fn with_broken_file(mut self, category: Category, id: &str, reason: &str) -> Self {
        self.files
            .entry(category)
            .or_default()
            .push((id.to_string(), Err(reason.to_string())));
        self
    }

    /// Make listing `category` fail.
    pub fn with_unavailable(mut self, category: Category, reason: &str) -> Self {
        self.unavailable.insert(category, reason.to_string());
        self
    }
}

impl IngestionSource for MemorySource {
    fn list_files(&self, category: Category) -> Result<Vec<SourceHandle>> {
        if let Some(reason) = self.unavailable.get(&category) {
            return Err(RegistryError::SourceUnavailable {
                category,
                reason: reason.clone(),
            });
        }
        Ok(self
            .files
            .get(&category)
            .map(|files| {
                files
                    .iter()
                    .map(|(id, _)| SourceHandle::named(format!("{}/{}", category, id)))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_rows(&self, handle: &SourceHandle) -> Result<Vec<RawRecord>> {
        let (category, id) = handle
            .id
            .split_once('/')
            .ok_or_else(|| RegistryError::Config(format!("unknown handle {}", handle.id)))?;
        let category: Category = category.parse()?;
        let (_, content) = self
            .files
            .get(&category)
            .and_then(|files| files.iter().find(|(name, _)| name == id))
            .ok_or_else(|| RegistryError::Config(format!("unknown handle {}", handle.id)))?;

        content.clone().map_err(|reason| RegistryError::RowParse {
            file: handle.id.clone(),
            line: 0,
            reason,
        })
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn walk_csv(dir: &Path, max_depth: Option<usize>) -> Vec<PathBuf> {
    let mut walker = walkdir::WalkDir::new(dir).follow_links(true);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn row_error(file_id: &str, err: &csv::Error, fallback_line: u64) -> RegistryError {
    let line = err
        .position()
        .map(|p| p.line())
        .unwrap_or(fallback_line);
    RegistryError::RowParse {
        file: file_id.to_string(),
        line,
        reason: err.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
