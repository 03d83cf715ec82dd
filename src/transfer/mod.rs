//! Remote transfer backends.
//!
//! A backend is chosen once at startup from [`TransferConfig::protocol`],
//! initialized once, and then shared by every per-file task. Each call to
//! [`TransferBackend::transfer`] opens its own connection and tears it down
//! before returning, so no connection state is shared between files.

mod ftps;
mod sftp;

pub use ftps::FtpsBackend;
pub use sftp::{SftpAuth, SftpBackend};

use crate::config::{Protocol, TransferConfig};
use crate::error::UploaderError;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Result of a single transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failure(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }
}

impl From<&Result<(), UploaderError>> for TransferOutcome {
    fn from(result: &Result<(), UploaderError>) -> Self {
        match result {
            Ok(()) => TransferOutcome::Success,
            Err(e) => TransferOutcome::Failure(e.to_string()),
        }
    }
}

/// Authenticate to a remote endpoint and copy local files onto it.
///
/// `transfer` is blocking and is always run on the blocking thread pool.
pub trait TransferBackend: Send + Sync {
    /// Short protocol label for logs
    fn name(&self) -> &str;

    /// Resolve settings and credentials. Fails when no usable credential exists.
    fn initialize(&mut self) -> Result<(), UploaderError>;

    /// Upload `local_path` under its base name into the remote target directory
    fn transfer(&self, local_path: &Path) -> Result<(), UploaderError>;
}

/// Pick the backend for the configured protocol
pub fn build_backend(config: TransferConfig) -> Box<dyn TransferBackend> {
    match config.protocol {
        Protocol::Sftp => Box::new(SftpBackend::new(config)),
        Protocol::Ftps => Box::new(FtpsBackend::new(config)),
    }
}

/// Host, port and login shared by both protocols
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Endpoint {
    pub fn resolve(config: &TransferConfig) -> Result<Self, UploaderError> {
        let host = match &config.host {
            Some(host) => host.clone(),
            None => {
                info!("No remote server hostname set, assuming 'localhost'");
                "localhost".to_string()
            }
        };

        let port = config.port.unwrap_or_else(|| {
            let port = config.protocol.default_port();
            info!("No remote server port set, using default {} port ({})", config.protocol, port);
            port
        });

        let user = config
            .user
            .clone()
            .ok_or_else(|| UploaderError::Config("user not set. Cannot continue".to_string()))?;

        Ok(Self { host, port, user })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open a TCP connection, trying every resolved address in turn
    pub fn connect(&self, timeout: Duration) -> Result<TcpStream, UploaderError> {
        let addrs = (self.host.as_str(), self.port).to_socket_addrs().map_err(|e| {
            UploaderError::Connection(format!("cannot resolve {}: {}", self.address(), e))
        })?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = if timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, timeout)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(UploaderError::Connection(format!(
            "error connecting to {}: {}",
            self.address(),
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(protocol: Protocol) -> TransferConfig {
        TransferConfig {
            protocol,
            user: Some("drop".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_backend_picks_protocol() {
        assert_eq!(build_backend(config(Protocol::Sftp)).name(), "sftp");
        assert_eq!(build_backend(config(Protocol::Ftps)).name(), "ftps");
    }

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = Endpoint::resolve(&config(Protocol::Sftp)).unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 22);
        assert_eq!(endpoint.address(), "localhost:22");

        let endpoint = Endpoint::resolve(&config(Protocol::Ftps)).unwrap();
        assert_eq!(endpoint.port, 21);
    }

    #[test]
    fn test_endpoint_requires_user() {
        let mut cfg = config(Protocol::Sftp);
        cfg.user = None;
        let err = Endpoint::resolve(&cfg).unwrap_err();
        assert!(matches!(err, UploaderError::Config(_)));
    }

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(TransferOutcome::from(&Ok(())), TransferOutcome::Success);

        let failed: Result<(), UploaderError> = Err(UploaderError::SizeMismatch {
            local: 10,
            remote: 4,
        });
        let outcome = TransferOutcome::from(&failed);
        assert!(!outcome.is_success());
        assert!(matches!(outcome, TransferOutcome::Failure(ref reason) if reason.contains("mismatch")));
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            user: "drop".to_string(),
        };

        let err = endpoint.connect(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, UploaderError::Connection(_)));
    }
}
