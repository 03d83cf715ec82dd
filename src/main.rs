use anyhow::{Context, Result};
use clap::Parser;
use drop_uploader::config::{CliArgs, Settings};
use drop_uploader::shutdown::{spawn_signal_listener, ShutdownCoordinator};
use drop_uploader::{build_backend, logging, WatchSupervisor};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Values already in the environment win over .env
    let dotenv = match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => return Err(e).context("Could not read .env configuration"),
    };

    let args = CliArgs::parse();
    let settings = Settings::resolve(args).context("Invalid configuration")?;

    if let Err(e) = logging::init_logging(settings.log_dir.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!("Starting drop-uploader {}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Some(path) => info!("Loaded environment from {}", path.display()),
        None => debug!("No .env file found"),
    }

    let shutdown = ShutdownCoordinator::new();
    let backend = build_backend(settings.transfer);
    let supervisor = WatchSupervisor::initialize(settings.watch, backend, &shutdown)
        .context("Initialization failed")?;

    let _signals = spawn_signal_listener(shutdown.clone());

    let summary = supervisor.start().await.context("Could not watch directory")?;
    info!(
        "Stopped after {} files ({} uploaded, {} failed, {} abandoned)",
        summary.files_dispatched, summary.transferred, summary.failed, summary.abandoned
    );

    Ok(())
}
