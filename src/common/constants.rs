use std::time::Duration;

// Stability detection
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

// Remote connections
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SFTP_DIR_MODE: i32 = 0o755;

// Directory watching (only used by the polling fallback backend)
pub const FILE_WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

// Logging
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const LOG_FILE_PREFIX: &str = "drop-uploader.log";
