//! Watch loop: receives arrival notifications, hands each file to its own
//! task, counts failures and decides when to stop.

use crate::common::should_skip_file;
use crate::config::WatchConfig;
use crate::error::UploaderError;
use crate::pipeline::{FileTask, TaskOutcome, TaskReport};
use crate::shutdown::ShutdownCoordinator;
use crate::transfer::TransferBackend;
use crate::watcher::{arrived_path, DirectoryWatcher, WatchEvents};
use chrono::{DateTime, Utc};
use notify::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Running,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Shutdown was requested from outside (signal or coordinator)
    Interrupted,
    ErrorThreshold { failures: u64 },
    /// The OS notification stream ended
    EventStreamClosed,
}

/// Process-wide count of transfer failures.
///
/// Shared handle; only the supervisor loop mutates it.
#[derive(Debug, Clone, Default)]
pub struct ErrorTally {
    count: Arc<AtomicU64>,
}

impl ErrorTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new total
    pub fn record_failure(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// A threshold of zero never triggers
    pub fn threshold_reached(&self, threshold: u32) -> bool {
        threshold > 0 && self.count() >= u64::from(threshold)
    }
}

/// How a run ended, plus counters for the final log line
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: ShutdownReason,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub files_dispatched: u64,
    pub transferred: u64,
    pub failed: u64,
    pub abandoned: u64,
    /// Error tally at the moment of shutdown
    pub error_count: u64,
}

#[derive(Debug, Default)]
struct RunCounters {
    dispatched: u64,
    transferred: u64,
    failed: u64,
    abandoned: u64,
}

pub struct WatchSupervisor {
    config: Arc<WatchConfig>,
    backend: Arc<dyn TransferBackend>,
    shutdown_rx: broadcast::Receiver<()>,
    admission: Option<Arc<Semaphore>>,
    tally: ErrorTally,
    state: SupervisorState,
    counters: RunCounters,
}

impl WatchSupervisor {
    /// Validate the configuration and initialize the backend.
    ///
    /// Subscribes to `shutdown` right away so a signal arriving before
    /// [`start`](Self::start) is not lost.
    pub fn initialize(
        config: WatchConfig,
        mut backend: Box<dyn TransferBackend>,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Self, UploaderError> {
        let shutdown_rx = shutdown.subscribe();

        config.validate()?;
        backend.initialize()?;
        info!("Using {} transfer backend", backend.name());

        let admission = match config.max_concurrent_transfers {
            0 => None,
            limit => Some(Arc::new(Semaphore::new(limit))),
        };

        Ok(Self {
            config: Arc::new(config),
            backend: Arc::from(backend),
            shutdown_rx,
            admission,
            tally: ErrorTally::new(),
            state: SupervisorState::Initializing,
            counters: RunCounters::default(),
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn tally(&self) -> ErrorTally {
        self.tally.clone()
    }

    /// Subscribe to the watch directory and run until shutdown
    pub async fn start(self) -> Result<RunSummary, UploaderError> {
        let (watcher, events) = DirectoryWatcher::subscribe(&self.config.watch_dir)?;
        let summary = self.run(events).await;
        drop(watcher);
        Ok(summary)
    }

    /// Event loop over an already-open notification stream.
    ///
    /// Returns once a shutdown condition is met. In-flight tasks are not
    /// awaited; they finish or are dropped with the runtime.
    pub async fn run(mut self, mut events: WatchEvents) -> RunSummary {
        let started_at = Utc::now();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<TaskReport>();

        // Cleared once every coordinator handle is gone
        let mut shutdown_open = true;

        self.transition(SupervisorState::Running);
        info!("Successfully started. Waiting for new files ...");

        let reason = loop {
            tokio::select! {
                signal = self.shutdown_rx.recv(), if shutdown_open => match signal {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        info!("Shutdown requested");
                        break ShutdownReason::Interrupted;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Shutdown coordinator dropped, ignoring further signals");
                        shutdown_open = false;
                    }
                },
                event = events.recv() => match event {
                    Some(Ok(event)) => self.handle_event(&event, &report_tx).await,
                    Some(Err(e)) => {
                        error!("File watcher error: {}", e);
                        if let Some(reason) = self.record_failure() {
                            break reason;
                        }
                    }
                    None => {
                        warn!("File watcher channel closed");
                        break ShutdownReason::EventStreamClosed;
                    }
                },
                Some(report) = report_rx.recv() => {
                    if let Some(reason) = self.handle_report(report) {
                        break reason;
                    }
                }
            }
        };

        self.transition(SupervisorState::ShuttingDown);

        let summary = RunSummary {
            reason,
            started_at,
            stopped_at: Utc::now(),
            files_dispatched: self.counters.dispatched,
            transferred: self.counters.transferred,
            failed: self.counters.failed,
            abandoned: self.counters.abandoned,
            error_count: self.tally.count(),
        };
        info!(
            reason = ?summary.reason,
            dispatched = summary.files_dispatched,
            transferred = summary.transferred,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Shutting down!"
        );
        summary
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!("Supervisor state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn handle_event(&mut self, event: &Event, reports: &mpsc::UnboundedSender<TaskReport>) {
        let Some(path) = arrived_path(event) else {
            return;
        };

        if self.config.skip_hidden_files && should_skip_file(&path) {
            debug!("Skipping hidden file {}", path.display());
            return;
        }
        if matches!(tokio::fs::metadata(&path).await, Ok(meta) if meta.is_dir()) {
            debug!("Skipping directory {}", path.display());
            return;
        }

        self.counters.dispatched += 1;
        FileTask::new(path, Arc::clone(&self.config), Arc::clone(&self.backend))
            .with_admission(self.admission.clone())
            .spawn(reports.clone());
    }

    fn handle_report(&mut self, report: TaskReport) -> Option<ShutdownReason> {
        if report.outcome.is_failure() {
            self.counters.failed += 1;
            return self.record_failure();
        }

        match report.outcome {
            TaskOutcome::Abandoned => self.counters.abandoned += 1,
            _ => {
                self.counters.transferred += 1;
                if self.config.reset_errors_on_success && self.tally.count() > 0 {
                    debug!("Transfer succeeded, resetting error count");
                    self.tally.reset();
                }
            }
        }
        None
    }

    fn record_failure(&mut self) -> Option<ShutdownReason> {
        let failures = self.tally.record_failure();
        let threshold = self.config.shutdown_after_errors;

        if self.tally.threshold_reached(threshold) {
            error!(
                "Too many errors occurred ({} of {} allowed). Giving up",
                failures, threshold
            );
            return Some(ShutdownReason::ErrorThreshold { failures });
        }
        if threshold > 0 {
            warn!("{} of {} allowed errors occurred", failures, threshold);
        }
        None
    }
}
