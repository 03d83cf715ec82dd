use crate::common::relocation_target;
use crate::config::WatchConfig;
use crate::error::UploaderError;
use crate::transfer::TransferOutcome;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What happened to a local file after its transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    Archived(PathBuf),
    Deleted,
    MovedToFailed(PathBuf),
    LeftInPlace,
}

/// Applies the configured disposition to a file once its transfer is decided.
///
/// Success: archive if configured, else delete if configured, else leave.
/// Failure: move to the failed directory if configured, else leave.
#[derive(Debug, Clone)]
pub struct FileRouter {
    archive_dir: Option<PathBuf>,
    failed_dir: Option<PathBuf>,
    delete_after_upload: bool,
}

impl FileRouter {
    pub fn new(archive_dir: Option<PathBuf>, failed_dir: Option<PathBuf>, delete_after_upload: bool) -> Self {
        Self {
            archive_dir,
            failed_dir,
            delete_after_upload,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(
            config.archive_dir.clone(),
            config.failed_dir.clone(),
            config.delete_after_upload,
        )
    }

    pub async fn route(&self, path: &Path, outcome: &TransferOutcome) -> Result<RouteAction, UploaderError> {
        match outcome {
            TransferOutcome::Success => self.route_success(path).await,
            TransferOutcome::Failure(_) => self.route_failure(path).await,
        }
    }

    async fn route_success(&self, path: &Path) -> Result<RouteAction, UploaderError> {
        if let Some(archive_dir) = &self.archive_dir {
            let target = destination(archive_dir, path)?;
            move_file(path, &target).await.map_err(|e| {
                UploaderError::Route(format!(
                    "file {} could not be moved to archive directory {}: {}",
                    path.display(),
                    archive_dir.display(),
                    e
                ))
            })?;
            info!("File moved to archive directory {}", archive_dir.display());
            return Ok(RouteAction::Archived(target));
        }

        if self.delete_after_upload {
            tokio::fs::remove_file(path).await.map_err(|e| {
                UploaderError::Route(format!("could not delete file {}: {}", path.display(), e))
            })?;
            info!("File {} was deleted", path.display());
            return Ok(RouteAction::Deleted);
        }

        debug!("Leaving {} in place", path.display());
        Ok(RouteAction::LeftInPlace)
    }

    async fn route_failure(&self, path: &Path) -> Result<RouteAction, UploaderError> {
        let Some(failed_dir) = &self.failed_dir else {
            return Ok(RouteAction::LeftInPlace);
        };

        let target = destination(failed_dir, path)?;
        move_file(path, &target).await.map_err(|e| {
            UploaderError::Route(format!(
                "file {} could not be moved to failed directory {}: {}",
                path.display(),
                failed_dir.display(),
                e
            ))
        })?;
        info!("File moved to failed directory {}", failed_dir.display());
        Ok(RouteAction::MovedToFailed(target))
    }
}

fn destination(dir: &Path, path: &Path) -> Result<PathBuf, UploaderError> {
    relocation_target(dir, path)
        .ok_or_else(|| UploaderError::Route(format!("{} has no file name", path.display())))
}

/// Rename, falling back to copy + remove when the target is on another filesystem
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("{} crosses devices, copying instead", from.display());
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failure() -> TransferOutcome {
        TransferOutcome::Failure("connection refused".to_string())
    }

    #[tokio::test]
    async fn test_success_archives() {
        let watch = tempdir().unwrap();
        let archive = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();

        // Archive wins over delete
        let router = FileRouter::new(Some(archive.path().to_path_buf()), None, true);
        let action = router.route(&path, &TransferOutcome::Success).await.unwrap();

        let archived = archive.path().join("report.csv");
        assert_eq!(action, RouteAction::Archived(archived.clone()));
        assert!(!path.exists());
        assert_eq!(std::fs::metadata(archived).unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn test_success_deletes() {
        let watch = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"data").unwrap();

        let router = FileRouter::new(None, None, true);
        let action = router.route(&path, &TransferOutcome::Success).await.unwrap();

        assert_eq!(action, RouteAction::Deleted);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_success_without_disposition_leaves_file() {
        let watch = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"data").unwrap();

        let router = FileRouter::new(None, None, false);
        let action = router.route(&path, &TransferOutcome::Success).await.unwrap();

        assert_eq!(action, RouteAction::LeftInPlace);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failure_moves_to_failed_dir() {
        let watch = tempdir().unwrap();
        let failed = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"data").unwrap();

        let router = FileRouter::new(None, Some(failed.path().to_path_buf()), true);
        let action = router.route(&path, &failure()).await.unwrap();

        assert_eq!(action, RouteAction::MovedToFailed(failed.path().join("report.csv")));
        assert!(!path.exists());
        assert!(failed.path().join("report.csv").exists());
    }

    #[tokio::test]
    async fn test_failure_never_deletes() {
        let watch = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"data").unwrap();

        let router = FileRouter::new(None, None, true);
        let action = router.route(&path, &failure()).await.unwrap();

        assert_eq!(action, RouteAction::LeftInPlace);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_archive_overwrites_existing_file() {
        let watch = tempdir().unwrap();
        let archive = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"new").unwrap();
        std::fs::write(archive.path().join("report.csv"), b"old contents").unwrap();

        let router = FileRouter::new(Some(archive.path().to_path_buf()), None, false);
        router.route(&path, &TransferOutcome::Success).await.unwrap();

        assert_eq!(std::fs::read(archive.path().join("report.csv")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_error_is_reported() {
        let watch = tempdir().unwrap();
        let path = watch.path().join("report.csv");
        std::fs::write(&path, b"data").unwrap();

        let missing = watch.path().join("no-such-archive");
        let router = FileRouter::new(Some(missing), None, false);
        let err = router.route(&path, &TransferOutcome::Success).await.unwrap_err();

        assert!(matches!(err, UploaderError::Route(_)));
        assert!(path.exists());
    }
}
