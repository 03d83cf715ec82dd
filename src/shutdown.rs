use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Coordinates graceful shutdown between the signal listener and the watch loop
///
/// Usage:
/// ```no_run
/// use drop_uploader::shutdown::ShutdownCoordinator;
/// use tokio::sync::mpsc;
///
/// # async fn example() {
/// let coordinator = ShutdownCoordinator::new();
///
/// let mut shutdown_rx = coordinator.subscribe();
/// let (tx, mut event_rx) = mpsc::channel::<String>(10);
/// loop {
///     tokio::select! {
///         event = event_rx.recv() => { /* handle event */ }
///         _ = shutdown_rx.recv() => break,
///     }
/// }
///
/// // To trigger shutdown:
/// coordinator.shutdown();
/// # }
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(10);
        Self { shutdown_tx }
    }

    /// Returns a receiver that gets a message once shutdown is initiated
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every current subscriber
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn has_subscribers(&self) -> bool {
        self.shutdown_tx.receiver_count() > 0
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger `coordinator` on Ctrl-C or (on unix) SIGTERM
pub fn spawn_signal_listener(coordinator: ShutdownCoordinator) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        coordinator.shutdown();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_signal() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        let task = tokio::spawn(async move {
            rx.recv().await.ok();
            "shutdown received"
        });

        coordinator.shutdown();

        let result = timeout(Duration::from_millis(100), task).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().unwrap(), "shutdown received");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx1 = coordinator.subscribe();
        let mut rx2 = coordinator.subscribe();

        assert!(coordinator.has_subscribers());

        coordinator.shutdown();

        let r1 = timeout(Duration::from_millis(100), rx1.recv()).await;
        let r2 = timeout(Duration::from_millis(100), rx2.recv()).await;

        assert!(r1.is_ok());
        assert!(r2.is_ok());
    }

    #[test]
    fn test_clone() {
        let coordinator1 = ShutdownCoordinator::new();
        let coordinator2 = coordinator1.clone();

        let mut rx = coordinator1.subscribe();
        coordinator2.shutdown();

        // Should receive signal from cloned coordinator
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_signal_listener_stays_idle_without_signal() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        let listener = spawn_signal_listener(coordinator);

        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
        listener.abort();
    }
}
