use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use registry_core::models::Category;
use registry_core::settings::{Settings, STATE_DIR_NAME};
use registry_data::reader::CsvDirectorySource;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the per-user `~/.registry-analytics/` hierarchy exists.
///
/// Creates the following directories if absent (including any missing parents):
/// - `~/.registry-analytics/`
/// - `~/.registry-analytics/logs/`
///
/// Returns the state directory.
pub fn ensure_directories() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let state_dir = home.join(STATE_DIR_NAME);
    std::fs::create_dir_all(state_dir.join("logs"))?;
    Ok(state_dir)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a user-facing level name to an `EnvFilter` directive.
///
/// Accepts `DEBUG`, `INFO`, `WARNING` and `ERROR` in any case; anything else is
/// passed through so full directives like `registry_data=debug` still work.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Events go to stderr so stdout stays clean for query output. When
/// `log_file` is given, events are also appended to it without ANSI colours.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Source wiring ──────────────────────────────────────────────────────────────

/// Build the CSV source from the resolved settings, one directory per category.
pub fn build_source(settings: &Settings) -> CsvDirectorySource {
    Category::ALL
        .into_iter()
        .fold(CsvDirectorySource::new(), |source, category| {
            let dir = settings.category_dir(category);
            tracing::debug!(category = %category, dir = %dir.display(), "source directory");
            source.with_dir(category, dir)
        })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
