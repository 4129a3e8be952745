//! Snapshot construction: load all three categories into one immutable value.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use registry_core::models::{Category, Dataset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::loader::{DatasetLoader, LoadReport};
use crate::reader::IngestionSource;

// ── Public types ──────────────────────────────────────────────────────────────

/// The three category datasets as loaded at one point in time.
///
/// Never mutated after construction; readers share it through an `Arc` and a
/// reload builds a whole new value.
#[derive(Debug, Clone)]
pub struct Snapshot {
    enrolment: Arc<Dataset>,
    demographic: Arc<Dataset>,
    biometric: Arc<Dataset>,
    reports: Vec<LoadReport>,
    loaded_at: DateTime<Utc>,
    load_time_seconds: f64,
}

/// Compact description of a snapshot, suitable for logs and status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// ISO-8601 load timestamp.
    pub loaded_at: String,
    pub enrolment_rows: usize,
    pub demographic_rows: usize,
    pub biometric_rows: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    /// Categories whose source could not be reached.
    pub unavailable: Vec<Category>,
    pub load_time_seconds: f64,
}

impl Snapshot {
    /// A snapshot with every dataset empty; what readers see before the first load.
    pub fn empty() -> Self {
        Self {
            enrolment: Arc::new(Dataset::empty(Category::Enrolment)),
            demographic: Arc::new(Dataset::empty(Category::Demographic)),
            biometric: Arc::new(Dataset::empty(Category::Biometric)),
            reports: Vec::new(),
            loaded_at: Utc::now(),
            load_time_seconds: 0.0,
        }
    }

    /// Assemble a snapshot from already-built datasets.
    pub fn from_datasets(enrolment: Dataset, demographic: Dataset, biometric: Dataset) -> Self {
        Self {
            enrolment: Arc::new(enrolment),
            demographic: Arc::new(demographic),
            biometric: Arc::new(biometric),
            reports: Vec::new(),
            loaded_at: Utc::now(),
            load_time_seconds: 0.0,
        }
    }

    pub fn dataset(&self, category: Category) -> &Dataset {
        match category {
            Category::Enrolment => &self.enrolment,
            Category::Demographic => &self.demographic,
            Category::Biometric => &self.biometric,
        }
    }

    pub fn enrolment(&self) -> &Dataset {
        &self.enrolment
    }

    pub fn demographic(&self) -> &Dataset {
        &self.demographic
    }

    pub fn biometric(&self) -> &Dataset {
        &self.biometric
    }

    /// Load reports, one per category, in load order.
    pub fn reports(&self) -> &[LoadReport] {
        &self.reports
    }

    pub fn report(&self, category: Category) -> Option<&LoadReport> {
        self.reports.iter().find(|r| r.category == Some(category))
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            loaded_at: self.loaded_at.to_rfc3339(),
            enrolment_rows: self.enrolment.len(),
            demographic_rows: self.demographic.len(),
            biometric_rows: self.biometric.len(),
            files_loaded: self.reports.iter().map(|r| r.files_loaded).sum(),
            files_skipped: self.reports.iter().map(|r| r.skipped.len()).sum(),
            unavailable: self
                .reports
                .iter()
                .filter(|r| r.source_error.is_some())
                .filter_map(|r| r.category)
                .collect(),
            load_time_seconds: self.load_time_seconds,
        }
    }
}

// ── Public function ───────────────────────────────────────────────────────────

/// Load every category from `source` into a new [`Snapshot`].
///
/// Categories load one after another on the calling thread. Failures only
/// ever shrink the data; this function cannot fail.
pub fn load_snapshot(source: &dyn IngestionSource) -> Snapshot {
    let start = Instant::now();
    let loader = DatasetLoader::new(source);

    let (enrolment, enrolment_report) = loader.load(Category::Enrolment);
    let (demographic, demographic_report) = loader.load(Category::Demographic);
    let (biometric, biometric_report) = loader.load(Category::Biometric);

    let snapshot = Snapshot {
        enrolment: Arc::new(enrolment),
        demographic: Arc::new(demographic),
        biometric: Arc::new(biometric),
        reports: vec![enrolment_report, demographic_report, biometric_report],
        loaded_at: Utc::now(),
        load_time_seconds: start.elapsed().as_secs_f64(),
    };

    let summary = snapshot.summary();
    info!(
        enrolment_rows = summary.enrolment_rows,
        demographic_rows = summary.demographic_rows,
        biometric_rows = summary.biometric_rows,
        files_skipped = summary.files_skipped,
        elapsed_secs = summary.load_time_seconds,
        "snapshot loaded"
    );

    snapshot
}

// ── Tests ─────────────────────────────────────────────────────────────────────
