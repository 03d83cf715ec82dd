use crate::common::{DEFAULT_LOG_FILTER, LOG_FILE_PREFIX};
use crate::error::{ErrorContext, UploaderError};
use std::path::Path;
use std::sync::{LazyLock, Mutex, Once};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER_INITIALIZED: Once = Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: LazyLock<Mutex<Option<WorkerGuard>>> =
    LazyLock::new(|| Mutex::new(None));

/// Console logging always; a daily-rotated file in `log_dir` when given.
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(log_dir: Option<&Path>) -> Result<(), UploaderError> {
    if let Some(dir) = log_dir {
        ensure_logs_dir(dir)?;
    }

    LOGGER_INITIALIZED.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let console_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_filter(env_filter.clone());

        let file_layer = log_dir.map(|dir| {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            if let Ok(mut guard_mutex) = FILE_APPENDER_GUARD.lock() {
                *guard_mutex = Some(guard);
            }

            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(env_filter.clone())
        });

        if let Err(e) = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
        {
            eprintln!("Failed to install log subscriber: {}", e);
        }
    });

    Ok(())
}

/// Create the log directory, owner-only on unix
pub fn ensure_logs_dir(dir: &Path) -> Result<(), UploaderError> {
    std::fs::create_dir_all(dir)
        .context(&format!("Failed to create log directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .context("Failed to set log directory permissions")?;
    }

    Ok(())
}
