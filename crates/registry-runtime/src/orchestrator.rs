//! Async reload orchestrator.
//!
//! Runs reloads of a shared [`DataManager`] in a tokio task, triggered on
//! demand through a [`ReloadHandle`] and optionally on a fixed interval. Every
//! attempt's [`ReloadOutcome`] is forwarded through an `mpsc` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::data_manager::{DataManager, ReloadOutcome};

// ── Public types ──────────────────────────────────────────────────────────────

/// Why a reload ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    Startup,
    Requested,
    Interval,
}

/// One reload attempt as reported to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadUpdate {
    pub reason: ReloadReason,
    pub outcome: ReloadOutcome,
}

// ── ReloadOrchestrator ────────────────────────────────────────────────────────

/// Background reload coordinator.
///
/// Call [`ReloadOrchestrator::start`] to spawn the loop and receive a channel
/// of [`ReloadUpdate`]s plus a handle for requesting reloads.
pub struct ReloadOrchestrator {
    manager: Arc<DataManager>,
    /// Time between automatic reloads; `None` reloads only on request.
    interval: Option<Duration>,
    /// Budget for each load.
    load_timeout: Duration,
    /// Whether to load once as soon as the loop starts.
    load_on_start: bool,
}

impl ReloadOrchestrator {
    pub fn new(manager: Arc<DataManager>, load_timeout: Duration) -> Self {
        Self {
            manager,
            interval: None,
            load_timeout,
            load_on_start: true,
        }
    }

    /// Also reload every `interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Skip the initial load, e.g. when the caller already loaded once.
    pub fn skip_initial_load(mut self) -> Self {
        self.load_on_start = false;
        self
    }

    /// Start the reload loop in a tokio task.
    ///
    /// The loop stops when every [`ReloadHandle`] clone is dropped, when the
    /// update receiver is dropped, or on [`ReloadHandle::abort`].
    pub fn start(self) -> (mpsc::Receiver<ReloadUpdate>, ReloadHandle) {
        let (update_tx, update_rx) = mpsc::channel(16);
        let (trigger_tx, trigger_rx) = mpsc::channel(4);

        let task = tokio::spawn(async move {
            self.reload_loop(trigger_rx, update_tx).await;
        });

        (
            update_rx,
            ReloadHandle {
                triggers: trigger_tx,
                task: Arc::new(task),
            },
        )
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn reload_loop(
        self,
        mut triggers: mpsc::Receiver<()>,
        updates: mpsc::Sender<ReloadUpdate>,
    ) {
        if self.load_on_start && !self.run(ReloadReason::Startup, &updates).await {
            return;
        }

        let mut ticker = self.interval.map(|period| {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        // The first tick fires immediately; startup already covered it.
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        loop {
            let reason = tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(()) => ReloadReason::Requested,
                    None => {
                        tracing::debug!("reload trigger channel closed; exiting loop");
                        break;
                    }
                },
                _ = next_tick(&mut ticker) => ReloadReason::Interval,
            };

            if !self.run(reason, &updates).await {
                break;
            }
        }
    }

    /// Reload once and forward the outcome. `false` once nobody is listening.
    async fn run(&self, reason: ReloadReason, updates: &mpsc::Sender<ReloadUpdate>) -> bool {
        tracing::debug!(?reason, "reloading snapshot");
        let outcome = self.manager.reload_with_timeout(self.load_timeout).await;
        if updates.send(ReloadUpdate { reason, outcome }).await.is_err() {
            tracing::debug!("reload update receiver dropped; exiting loop");
            return false;
        }
        true
    }
}

// ── ReloadHandle ──────────────────────────────────────────────────────────────

/// Handle to the background reload task.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    triggers: mpsc::Sender<()>,
    task: Arc<tokio::task::JoinHandle<()>>,
}

impl ReloadHandle {
    /// Ask for a reload. Returns `false` if the loop has already stopped.
    pub async fn request_reload(&self) -> bool {
        self.triggers.send(()).await.is_ok()
    }

    /// Immediately abort the reload loop.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
