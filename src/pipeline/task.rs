use super::{FileRouter, FileState, PendingFile, StabilityDetector, TaskOutcome, TaskReport};
use crate::config::WatchConfig;
use crate::error::UploaderError;
use crate::transfer::{TransferBackend, TransferOutcome};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives one file from detection to a terminal outcome
pub struct FileTask {
    pending: PendingFile,
    config: Arc<WatchConfig>,
    backend: Arc<dyn TransferBackend>,
    admission: Option<Arc<Semaphore>>,
}

impl FileTask {
    pub fn new(path: PathBuf, config: Arc<WatchConfig>, backend: Arc<dyn TransferBackend>) -> Self {
        Self {
            pending: PendingFile::new(path),
            config,
            backend,
            admission: None,
        }
    }

    /// Bound how many tasks may be inside a transfer at once.
    /// Stability checks are never throttled.
    pub fn with_admission(mut self, admission: Option<Arc<Semaphore>>) -> Self {
        self.admission = admission;
        self
    }

    /// Run on the runtime and send the report when done.
    /// A closed report channel just means the supervisor is gone.
    pub fn spawn(self, reports: mpsc::UnboundedSender<TaskReport>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let report = self.run().await;
            if reports.send(report).is_err() {
                debug!("Supervisor stopped listening, dropping task report");
            }
        })
    }

    pub async fn run(self) -> TaskReport {
        let span = info_span!(
            "file",
            id = %self.pending.id,
            name = %self.pending.display_name()
        );
        self.process().instrument(span).await
    }

    async fn process(mut self) -> TaskReport {
        let name = self.pending.display_name();
        info!("New file found: {}. Checking if it is still changing ...", name);

        let detector = StabilityDetector::new(self.config.poll_interval);
        let state = detector
            .wait_until_stable(&mut self.pending, self.config.max_poll_attempts)
            .await;

        if state == FileState::Abandoned {
            warn!(
                attempts = self.pending.attempts,
                "File {} is continuously changing and will be ignored now. \
                 Consider raising the poll interval or attempt limit",
                name
            );
            return self.report(TaskOutcome::Abandoned, None);
        }

        match tokio::fs::metadata(&self.pending.path).await {
            Ok(meta) => info!("File {} seems to be complete ({} bytes)", name, meta.len()),
            Err(_) => info!("File {} seems to be complete", name),
        }

        let result = self.transfer().await;
        let outcome = TransferOutcome::from(&result);
        self.pending.state = match &result {
            Ok(()) => FileState::Transferred,
            Err(e) => {
                error!("Error uploading file {}: {}", name, e);
                FileState::TransferFailed
            }
        };

        let router = FileRouter::from_config(&self.config);
        let route_error = match router.route(&self.pending.path, &outcome).await {
            Ok(action) => {
                debug!(?action, "File routed");
                None
            }
            Err(e) => {
                // The file stays in the watch directory either way
                if outcome.is_success() {
                    error!("{}", e);
                } else {
                    warn!("{}", e);
                }
                Some(e.to_string())
            }
        };

        let task_outcome = match outcome {
            TransferOutcome::Success => TaskOutcome::Transferred,
            TransferOutcome::Failure(reason) => TaskOutcome::TransferFailed(reason),
        };
        self.report(task_outcome, route_error)
    }

    async fn transfer(&self) -> Result<(), UploaderError> {
        let _permit = match &self.admission {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| UploaderError::Other("transfer admission closed".to_string()))?,
            ),
            None => None,
        };

        debug!(backend = self.backend.name(), "Starting transfer");
        let backend = Arc::clone(&self.backend);
        let path = self.pending.path.clone();
        tokio::task::spawn_blocking(move || backend.transfer(&path))
            .await
            .map_err(|e| UploaderError::Transfer(format!("transfer task did not complete: {}", e)))?
    }

    fn report(self, outcome: TaskOutcome, route_error: Option<String>) -> TaskReport {
        let elapsed = Utc::now() - self.pending.detected_at;
        info!(
            outcome = ?outcome,
            elapsed_ms = elapsed.num_milliseconds(),
            "Done with {}",
            self.pending.display_name()
        );
        TaskReport {
            id: self.pending.id,
            path: self.pending.path,
            outcome,
            attempts: self.pending.attempts,
            route_error,
        }
    }
}
