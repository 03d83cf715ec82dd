use super::{Endpoint, TransferBackend};
use crate::common::base_name;
use crate::config::TransferConfig;
use crate::error::UploaderError;
use ftp::types::FileType;
use ftp::FtpStream;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

struct FtpsSettings {
    endpoint: Endpoint,
    password: String,
    remote_dir: String,
    connector: SslConnector,
}

/// Explicit FTPS (AUTH TLS) uploads with a size check after every file
pub struct FtpsBackend {
    config: TransferConfig,
    settings: Option<FtpsSettings>,
}

impl FtpsBackend {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            settings: None,
        }
    }

    fn settings(&self) -> Result<&FtpsSettings, UploaderError> {
        self.settings
            .as_ref()
            .ok_or_else(|| UploaderError::Other("FTPS backend used before initialize".to_string()))
    }
}

impl TransferBackend for FtpsBackend {
    fn name(&self) -> &str {
        "ftps"
    }

    fn initialize(&mut self) -> Result<(), UploaderError> {
        let endpoint = Endpoint::resolve(&self.config)?;

        let password = self.config.password.clone().ok_or_else(|| {
            UploaderError::Auth("no password set. No authentication possible".to_string())
        })?;

        let remote_dir = normalize_remote_dir(self.config.target_dir.as_deref());
        if self.config.target_dir.is_none() {
            info!("No TARGET_DIR provided, assuming / as remote directory");
        }

        if !self.config.verify_certificate {
            warn!("FTPS certificate verification is disabled");
        }
        let connector = build_connector(self.config.verify_certificate)?;

        info!("Using FTPS {}", endpoint.address());
        self.settings = Some(FtpsSettings {
            endpoint,
            password,
            remote_dir,
            connector,
        });

        info!("FTPS client successfully initialized");
        Ok(())
    }

    fn transfer(&self, local_path: &Path) -> Result<(), UploaderError> {
        let settings = self.settings()?;
        let endpoint = &settings.endpoint;
        let name = base_name(local_path).ok_or_else(|| {
            UploaderError::Transfer(format!("{} has no file name", local_path.display()))
        })?;

        // Open the upload file before connecting
        let mut source = File::open(local_path).map_err(|e| {
            UploaderError::Transfer(format!("cannot open file {}: {}", local_path.display(), e))
        })?;
        let local_size = source.metadata()?.len();

        info!(file = name, "Start uploading file to remote ...");

        let stream = FtpStream::connect(endpoint.address()).map_err(|e| {
            UploaderError::Connection(format!(
                "error creating FTPS connection to {}: {}",
                endpoint.address(),
                e
            ))
        })?;
        let stream = stream
            .into_secure(settings.connector.clone(), &endpoint.host)
            .map_err(|e| {
                UploaderError::Connection(format!(
                    "error negotiating TLS with {}: {}",
                    endpoint.address(),
                    e
                ))
            })?;
        let mut connection = FtpConnection { stream };
        let stream = &mut connection.stream;

        stream.login(&endpoint.user, &settings.password).map_err(|e| {
            UploaderError::Auth(format!("error authenticating against FTPS server: {}", e))
        })?;
        stream.transfer_type(FileType::Binary)?;

        ensure_remote_dir(stream, &settings.remote_dir)?;

        stream.put(name, &mut source).map_err(|e| {
            UploaderError::Transfer(format!("error uploading file {}: {}", name, e))
        })?;

        let remote_size = stream.size(name).map_err(|e| {
            UploaderError::Transfer(format!("error reading remote size of {}: {}", name, e))
        })?;
        match remote_size {
            Some(size) if size as u64 == local_size => {}
            Some(size) => {
                return Err(UploaderError::SizeMismatch {
                    local: local_size,
                    remote: size as u64,
                });
            }
            None => {
                return Err(UploaderError::Transfer(format!(
                    "server did not report a size for {}",
                    name
                )));
            }
        }

        info!("File {} was successfully uploaded to {}", name, endpoint.host);
        Ok(())
    }
}

/// Logs out of the control connection on every exit path
struct FtpConnection {
    stream: FtpStream,
}

impl Drop for FtpConnection {
    fn drop(&mut self) {
        let _ = self.stream.quit();
    }
}

fn build_connector(verify_certificate: bool) -> Result<SslConnector, UploaderError> {
    let tls_error = |e: openssl::error::ErrorStack| {
        UploaderError::Config(format!("error creating TLS context: {}", e))
    };

    let mut builder = SslConnector::builder(SslMethod::tls()).map_err(tls_error)?;
    builder
        .set_min_proto_version(Some(SslVersion::TLS1_2))
        .map_err(tls_error)?;
    if !verify_certificate {
        builder.set_verify(SslVerifyMode::NONE);
    }
    Ok(builder.build())
}

/// Change into the upload directory, creating it first if the change fails
fn ensure_remote_dir(stream: &mut FtpStream, dir: &str) -> Result<(), UploaderError> {
    if stream.cwd(dir).is_ok() {
        info!("Changed to upload directory {}", dir);
        return Ok(());
    }

    stream.mkdir(dir).map_err(|e| {
        UploaderError::RemoteDir(format!("error creating upload directory {}: {}", dir, e))
    })?;

    stream.cwd(dir).map_err(|e| {
        UploaderError::RemoteDir(format!(
            "error changing into created directory {}: {}",
            dir, e
        ))
    })?;
    Ok(())
}

fn normalize_remote_dir(dir: Option<&str>) -> String {
    let trimmed = dir.map(str::trim).unwrap_or("").trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TransferConfig {
        TransferConfig {
            protocol: crate::config::Protocol::Ftps,
            host: Some("ftp.example.com".to_string()),
            user: Some("drop".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_requires_password() {
        let mut cfg = config();
        cfg.password = None;

        let mut backend = FtpsBackend::new(cfg);
        assert!(matches!(
            backend.initialize().unwrap_err(),
            UploaderError::Auth(_)
        ));
    }

    #[test]
    fn test_initialize_requires_user() {
        let mut cfg = config();
        cfg.user = None;

        let mut backend = FtpsBackend::new(cfg);
        assert!(backend.initialize().is_err());
    }

    #[test]
    fn test_initialize_defaults() {
        let mut backend = FtpsBackend::new(config());
        backend.initialize().unwrap();

        let settings = backend.settings().unwrap();
        assert_eq!(settings.endpoint.address(), "ftp.example.com:21");
        assert_eq!(settings.remote_dir, "/");
    }

    #[test]
    fn test_transfer_missing_local_file() {
        let mut backend = FtpsBackend::new(config());
        backend.initialize().unwrap();

        let err = backend
            .transfer(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, UploaderError::Transfer(_)));
    }

    #[test]
    fn test_normalize_remote_dir() {
        assert_eq!(normalize_remote_dir(None), "/");
        assert_eq!(normalize_remote_dir(Some("/upload/")), "/upload");
        assert_eq!(normalize_remote_dir(Some("/")), "/");
    }
}
