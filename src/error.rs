use thiserror::Error;

/// Drop uploader errors
#[derive(Debug, Error)]
pub enum UploaderError {
    /// Missing or invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication against the remote server failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Could not reach or talk to the remote server
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote target directory is missing and could not be created
    #[error("Remote directory error: {0}")]
    RemoteDir(String),

    /// Writing the file to the remote server failed
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Bytes were written but the remote object has the wrong size
    #[error("File size mismatch after upload: local {local} bytes, remote {remote} bytes")]
    SizeMismatch { local: u64, remote: u64 },

    /// Moving or deleting a local file after the transfer failed
    #[error("Routing error: {0}")]
    Route(String),

    /// Filesystem subscription errors
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH / SFTP protocol errors
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// FTP protocol errors
    #[error("FTP error: {0}")]
    Ftp(#[from] ftp::FtpError),

    /// Config file parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, UploaderError>;
}

impl<T, E: Into<UploaderError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, UploaderError> {
        self.map_err(|e| match e.into() {
            UploaderError::Other(s) => UploaderError::Other(format!("{}: {}", msg, s)),
            UploaderError::Config(s) => UploaderError::Config(format!("{}: {}", msg, s)),
            UploaderError::Auth(s) => UploaderError::Auth(format!("{}: {}", msg, s)),
            UploaderError::Connection(s) => UploaderError::Connection(format!("{}: {}", msg, s)),
            UploaderError::RemoteDir(s) => UploaderError::RemoteDir(format!("{}: {}", msg, s)),
            UploaderError::Transfer(s) => UploaderError::Transfer(format!("{}: {}", msg, s)),
            UploaderError::Route(s) => UploaderError::Route(format!("{}: {}", msg, s)),
            UploaderError::Io(e) => UploaderError::Other(format!("{}: {}", msg, e)),
            UploaderError::Ssh(e) => UploaderError::Connection(format!("{}: {}", msg, e)),
            UploaderError::Ftp(e) => UploaderError::Connection(format!("{}: {}", msg, e)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploaderError::Config("watch directory not set".to_string());
        assert_eq!(err.to_string(), "Configuration error: watch directory not set");
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = UploaderError::SizeMismatch {
            local: 1024,
            remote: 512,
        };
        assert_eq!(
            err.to_string(),
            "File size mismatch after upload: local 1024 bytes, remote 512 bytes"
        );
    }

    #[test]
    fn test_error_context() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let err = result.context("Failed to open report.csv").unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Failed to open report.csv"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_context_keeps_variant() {
        let result: Result<(), UploaderError> = Err(UploaderError::Auth("bad key".to_string()));
        let err = result.context("sftp").unwrap_err();
        assert!(matches!(err, UploaderError::Auth(ref s) if s == "sftp: bad key"));
    }
}
