use super::{FileState, PendingFile};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Decides whether a file's writer is done by comparing its size across
/// two reads one poll interval apart.
///
/// This is a heuristic: a writer that pauses for longer than the interval
/// and then resumes will be reported as finished.
#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    interval: Duration,
}

impl StabilityDetector {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// One check pair. Any read error (including a vanished file) counts as
    /// "not stable yet".
    pub async fn is_stable(&self, path: &Path) -> bool {
        let Ok(first) = file_size(path).await else {
            return false;
        };

        sleep(self.interval).await;

        let Ok(second) = file_size(path).await else {
            return false;
        };

        first == second
    }

    /// Poll until the file is stable or `max_attempts` checks have failed.
    /// Leaves `pending` in `ReadyToTransfer` or `Abandoned`.
    pub async fn wait_until_stable(&self, pending: &mut PendingFile, max_attempts: u32) -> FileState {
        pending.state = FileState::Checking;

        while pending.attempts < max_attempts {
            pending.attempts += 1;

            if self.is_stable(&pending.path).await {
                pending.state = FileState::ReadyToTransfer;
                return pending.state;
            }

            debug!(
                attempt = pending.attempts,
                max_attempts, "File {} is still changing", pending.display_name()
            );

            if pending.attempts < max_attempts {
                sleep(self.interval).await;
            }
        }

        pending.state = FileState::Abandoned;
        pending.state
    }
}

async fn file_size(path: &Path) -> std::io::Result<u64> {
    tokio::fs::metadata(path).await.map(|meta| meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const INTERVAL: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_unchanged_file_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, vec![b'x'; 1024]).unwrap();

        assert!(StabilityDetector::new(INTERVAL).is_stable(&path).await);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_stable() {
        let dir = tempdir().unwrap();
        let detector = StabilityDetector::new(INTERVAL);
        assert!(!detector.is_stable(&dir.path().join("gone.csv")).await);
    }

    #[tokio::test]
    async fn test_stable_after_exactly_one_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, b"done").unwrap();

        let mut pending = PendingFile::new(path);
        let state = StabilityDetector::new(INTERVAL)
            .wait_until_stable(&mut pending, 5)
            .await;

        assert_eq!(state, FileState::ReadyToTransfer);
        assert_eq!(pending.attempts, 1);
    }

    #[tokio::test]
    async fn test_growing_file_is_abandoned_after_max_attempts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.log");
        std::fs::write(&path, b"start").unwrap();

        let keep_writing = Arc::new(AtomicBool::new(true));
        let writer = {
            let path = path.clone();
            let keep_writing = Arc::clone(&keep_writing);
            std::thread::spawn(move || {
                let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
                while keep_writing.load(Ordering::SeqCst) {
                    file.write_all(b"more").unwrap();
                    file.flush().unwrap();
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
        };

        let mut pending = PendingFile::new(path);
        let state = StabilityDetector::new(INTERVAL)
            .wait_until_stable(&mut pending, 3)
            .await;

        keep_writing.store(false, Ordering::SeqCst);
        writer.join().unwrap();

        assert_eq!(state, FileState::Abandoned);
        assert_eq!(pending.attempts, 3);
    }

    #[tokio::test]
    async fn test_file_appearing_late_becomes_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.csv");

        let creator = {
            let path = path.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(30)).await;
                tokio::fs::write(&path, b"payload").await.unwrap();
            })
        };

        let mut pending = PendingFile::new(path);
        let state = StabilityDetector::new(INTERVAL)
            .wait_until_stable(&mut pending, 10)
            .await;
        creator.await.unwrap();

        assert_eq!(state, FileState::ReadyToTransfer);
        assert!(pending.attempts > 1);
    }
}
