//! Snapshot manager: owns the published [`Snapshot`] and replaces it on reload.
//!
//! Readers call [`DataManager::snapshot`] to get an `Arc` and query it without
//! holding any lock. A reload builds the next snapshot entirely off to the
//! side and publishes it with a single pointer swap, so no reader ever sees a
//! half-loaded dataset. Failed or timed-out reloads leave the last good
//! snapshot in place. At most one load runs at a time, including one that
//! has already timed out.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use registry_data::reader::IngestionSource;
use registry_data::snapshot::{load_snapshot, Snapshot, SnapshotSummary};

use crate::queries::Queries;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default budget for one full load, in seconds.
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 300;

// ── ReloadOutcome ─────────────────────────────────────────────────────────────

/// What a reload attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// A new snapshot is live.
    Published {
        generation: u64,
        summary: SnapshotSummary,
    },
    /// The load did not finish in time; the previous snapshot is still live.
    TimedOut { after: Duration },
    /// The load aborted; the previous snapshot is still live.
    Failed { reason: String },
    /// An earlier load is still running, so no new one was started.
    InProgress,
}

impl ReloadOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, ReloadOutcome::Published { .. })
    }
}

// ── DataManager ───────────────────────────────────────────────────────────────

/// Holder of the current snapshot and the source it is loaded from.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use registry_data::reader::CsvDirectorySource;
/// use registry_runtime::data_manager::DataManager;
///
/// let source = CsvDirectorySource::from_base_dir(std::path::Path::new("data"));
/// let manager = DataManager::new(Arc::new(source));
/// manager.reload();
/// println!("{} enrolment rows", manager.snapshot().enrolment().len());
/// ```
pub struct DataManager {
    source: Arc<dyn IngestionSource>,
    current: RwLock<Arc<Snapshot>>,
    /// Bumped on every publish; 0 means nothing has been loaded yet.
    generation: AtomicU64,
    published_at: Mutex<Option<Instant>>,
    last_error: Mutex<Option<String>>,
    /// Set while a load is running, cleared when it returns or panics.
    loading: Arc<AtomicBool>,
}

impl DataManager {
    /// Create a manager publishing an empty snapshot until the first reload.
    pub fn new(source: Arc<dyn IngestionSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            generation: AtomicU64::new(0),
            published_at: Mutex::new(None),
            last_error: Mutex::new(None),
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Query facade over the currently published snapshot.
    pub fn queries(&self) -> Queries {
        Queries::new(self.snapshot())
    }

    /// Load a fresh snapshot on the calling thread and publish it.
    pub fn reload(&self) -> ReloadOutcome {
        let Some(_guard) = LoadGuard::acquire(&self.loading) else {
            return self.load_in_progress();
        };
        let source = Arc::clone(&self.source);
        match std::panic::catch_unwind(AssertUnwindSafe(|| load_snapshot(source.as_ref()))) {
            Ok(snapshot) => self.publish(snapshot),
            Err(panic) => self.record_failure(panic_message(panic.as_ref())),
        }
    }

    /// Load a fresh snapshot on tokio's blocking pool, giving up after `timeout`.
    ///
    /// A load that outlives the timeout keeps running in the background and
    /// its result is discarded. Until it returns, further reloads report
    /// [`ReloadOutcome::InProgress`] instead of starting another load.
    pub async fn reload_with_timeout(&self, timeout: Duration) -> ReloadOutcome {
        let Some(guard) = LoadGuard::acquire(&self.loading) else {
            return self.load_in_progress();
        };
        let source = Arc::clone(&self.source);
        // The guard travels with the load so an abandoned load still holds it.
        let task = tokio::task::spawn_blocking(move || (load_snapshot(source.as_ref()), guard));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok((snapshot, _guard))) => self.publish(snapshot),
            Ok(Err(join_error)) => {
                let reason = if join_error.is_panic() {
                    panic_message(join_error.into_panic().as_ref())
                } else {
                    join_error.to_string()
                };
                self.record_failure(reason)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "load timed out; keeping last known good snapshot"
                );
                self.set_last_error(Some(format!(
                    "load timed out after {:.1}s",
                    timeout.as_secs_f64()
                )));
                ReloadOutcome::TimedOut { after: timeout }
            }
        }
    }

    /// Make `snapshot` the live one.
    pub fn publish(&self, snapshot: Snapshot) -> ReloadOutcome {
        let summary = snapshot.summary();
        let next = Arc::new(snapshot);
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = next;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.published_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.set_last_error(None);

        tracing::debug!(
            generation,
            enrolment_rows = summary.enrolment_rows,
            biometric_rows = summary.biometric_rows,
            "snapshot published"
        );
        ReloadOutcome::Published {
            generation,
            summary,
        }
    }

    /// Whether a load, possibly one that already timed out, is still running.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Time since the live snapshot was published, or `None` before the first load.
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.published_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|ts| ts.elapsed())
    }

    /// Why the most recent reload failed, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn record_failure(&self, reason: String) -> ReloadOutcome {
        tracing::warn!(error = %reason, "load failed; keeping last known good snapshot");
        self.set_last_error(Some(reason.clone()));
        ReloadOutcome::Failed { reason }
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    fn load_in_progress(&self) -> ReloadOutcome {
        tracing::warn!("previous load still running; not starting another");
        ReloadOutcome::InProgress
    }
}

/// Holds the single-load slot; releases it on drop, including during unwinding.
struct LoadGuard(Arc<AtomicBool>);

impl LoadGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("load panicked: {}", detail)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
