use crate::common::FILE_WATCH_POLL_INTERVAL;
use crate::error::UploaderError;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

/// Raw notifications from the OS, including subscription errors
pub type WatchEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Non-recursive subscription to one directory.
/// Events stop when this value is dropped.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub fn subscribe(dir: &Path) -> Result<(Self, WatchEvents), UploaderError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                // Receiver gone means the supervisor already stopped
                let _ = tx.send(result);
            },
            Config::default().with_poll_interval(FILE_WATCH_POLL_INTERVAL),
        )?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("Will watch directory {} for new files", dir.display());

        Ok((Self { _watcher: watcher }, rx))
    }
}

/// The path a "file arrived" notification refers to, if this is one.
///
/// Arrivals are creations and renames into the directory. Writes, removals
/// and renames away are ignored, as are folder creations.
pub fn arrived_path(event: &Event) -> Option<PathBuf> {
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => event.paths.first().cloned(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.first().cloned(),
        _ => None,
    }
}
