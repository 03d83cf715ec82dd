//! Per-file pipeline: stabilize, transfer, route.
//!
//! Every file announced by the watcher gets its own [`FileTask`]. The task
//! walks the file through [`FileState`] on its own and finally reports a
//! [`TaskReport`] back to the supervisor.

mod router;
mod stability;
mod task;

pub use router::{FileRouter, RouteAction};
pub use stability::StabilityDetector;
pub use task::FileTask;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// Where a single file is in its journey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Checking,
    ReadyToTransfer,
    Abandoned,
    Transferred,
    TransferFailed,
}

/// A file under evaluation, owned by exactly one task
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub id: Uuid,
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub attempts: u32,
    pub state: FileState,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            detected_at: Utc::now(),
            attempts: 0,
            state: FileState::Checking,
        }
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Terminal result of one file's task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Transferred,
    TransferFailed(String),
    /// Never stopped changing; left untouched in the watch directory
    Abandoned,
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::TransferFailed(_))
    }
}

/// What a task sends back to the supervisor when it finishes
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: Uuid,
    pub path: PathBuf,
    pub outcome: TaskOutcome,
    pub attempts: u32,
    /// Set when the post-transfer move/delete failed
    pub route_error: Option<String>,
}
