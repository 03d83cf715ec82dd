//! Watch a drop directory, wait for new files to stop changing, upload them
//! over SFTP or FTPS, then archive, delete or quarantine the local copy.

pub mod common;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod shutdown;
pub mod supervisor;
pub mod transfer;
pub mod watcher;

pub use config::{Settings, TransferConfig, WatchConfig};
pub use error::UploaderError;
pub use supervisor::{ErrorTally, RunSummary, ShutdownReason, WatchSupervisor};
pub use transfer::{build_backend, TransferBackend};
