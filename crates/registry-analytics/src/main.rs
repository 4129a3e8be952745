mod bootstrap;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use registry_core::settings::{Command, Settings};
use registry_runtime::data_manager::{DataManager, ReloadOutcome};
use registry_runtime::orchestrator::ReloadOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Registry Analytics v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data root: {}", settings.data_root().display());

    let source = bootstrap::build_source(&settings);
    let manager = Arc::new(DataManager::new(Arc::new(source)));
    let load_timeout = Duration::from_secs(settings.load_timeout_secs);
    let command = settings.command.clone().unwrap_or(Command::Overview);

    if let Command::Watch { interval_secs } = command {
        return watch(manager, load_timeout, Duration::from_secs(interval_secs)).await;
    }

    match manager.reload_with_timeout(load_timeout).await {
        ReloadOutcome::Published { summary, .. } => {
            if summary.files_skipped > 0 {
                tracing::warn!(
                    files_skipped = summary.files_skipped,
                    "some source files were skipped; run `report` for details"
                );
            }
        }
        ReloadOutcome::TimedOut { after } => {
            tracing::error!(
                "Loading data took longer than {}s; answering from an empty dataset",
                after.as_secs()
            );
        }
        ReloadOutcome::Failed { reason } => {
            tracing::error!("Loading data failed ({}); answering from an empty dataset", reason);
        }
        ReloadOutcome::InProgress => {
            tracing::error!("Another load is still running; answering from an empty dataset");
        }
    }

    let rendered = output::execute(&manager.queries(), &command, settings.pretty)?;
    println!("{}", rendered);

    Ok(())
}

/// Keep reloading on `interval` and print one JSON line per reload until Ctrl+C.
async fn watch(manager: Arc<DataManager>, load_timeout: Duration, interval: Duration) -> Result<()> {
    tracing::info!("Watching sources; reloading every {}s", interval.as_secs());

    let (mut rx, handle) = ReloadOrchestrator::new(manager, load_timeout)
        .with_interval(interval)
        .start();

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) => println!("{}", output::render_update(&update)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping reload task");
                handle.abort();
                break;
            }
        }
    }

    Ok(())
}
