use crate::common::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
use crate::error::{ErrorContext, UploaderError};
use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "drop-uploader";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Watch pipeline settings. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub watch_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub delete_after_upload: bool,
    /// 0 disables the error shutdown
    pub shutdown_after_errors: u32,
    pub reset_errors_on_success: bool,
    /// 0 means no admission limit
    pub max_concurrent_transfers: usize,
    pub skip_hidden_files: bool,
}

impl WatchConfig {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            archive_dir: None,
            failed_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            delete_after_upload: false,
            shutdown_after_errors: 0,
            reset_errors_on_success: false,
            max_concurrent_transfers: 0,
            skip_hidden_files: false,
        }
    }

    /// Check that every configured directory exists and the limits make sense
    pub fn validate(&self) -> Result<(), UploaderError> {
        if !directory_exists(&self.watch_dir) {
            return Err(UploaderError::Config(format!(
                "watch directory {} not set properly",
                self.watch_dir.display()
            )));
        }

        for (label, dir) in [
            ("archive", self.archive_dir.as_ref()),
            ("failed file", self.failed_dir.as_ref()),
        ] {
            let Some(dir) = dir else { continue };
            if !directory_exists(dir) {
                return Err(UploaderError::Config(format!(
                    "{} directory {} not set properly",
                    label,
                    dir.display()
                )));
            }
            if same_directory(dir, &self.watch_dir) {
                return Err(UploaderError::Config(format!(
                    "{} directory {} must differ from the watch directory",
                    label,
                    dir.display()
                )));
            }
        }

        if self.max_poll_attempts == 0 {
            return Err(UploaderError::Config(
                "max stability poll attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Sftp,
    Ftps,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Sftp => 22,
            Protocol::Ftps => 21,
        }
    }

    /// Prefix of the per-protocol `HOST`/`PORT`/`USER`/`PASSWORD` variables
    pub fn env_prefix(self) -> &'static str {
        match self {
            Protocol::Sftp => "SFTP",
            Protocol::Ftps => "FTPS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Sftp => write!(f, "sftp"),
            Protocol::Ftps => write!(f, "ftps"),
        }
    }
}

/// Remote endpoint settings. Required-field checks happen when the backend
/// initializes, so a missing user or credential surfaces as an init failure.
#[derive(Clone, Default)]
pub struct TransferConfig {
    pub protocol: Protocol,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub private_key_file: Option<PathBuf>,
    pub private_key_passphrase: Option<String>,
    pub target_dir: Option<String>,
    pub known_hosts_file: Option<PathBuf>,
    pub verify_certificate: bool,
    pub connect_timeout: Duration,
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_file", &self.private_key_file)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("target_dir", &self.target_dir)
            .field("known_hosts_file", &self.known_hosts_file)
            .field("verify_certificate", &self.verify_certificate)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Command line flags. Every flag falls back to an environment variable.
/// Host, port, user and password additionally accept the per-protocol names
/// (`SFTP_HOST`, `FTPS_USER`, ...), see [`Settings::resolve_with_env`].
#[derive(Debug, Default, Parser)]
#[command(name = "drop-uploader", version, about)]
pub struct CliArgs {
    /// TOML config file; defaults to <config dir>/drop-uploader/config.toml if present
    #[arg(long, env = "DROP_UPLOADER_CONFIG")]
    pub config: Option<String>,

    #[arg(long, env = "WATCH_DIR")]
    pub watch_dir: Option<String>,

    #[arg(long, env = "ARCHIVE_DIR")]
    pub archive_dir: Option<String>,

    #[arg(long, env = "FAILED_DIR")]
    pub failed_dir: Option<String>,

    #[arg(long, env = "DELETE_FILE_AFTER", value_parser = BoolishValueParser::new())]
    pub delete_after_upload: Option<bool>,

    /// Seconds between the two size reads of a stability check
    #[arg(long, env = "WATCH_FILE_CHANGE_INTERVAL")]
    pub poll_interval: Option<u64>,

    #[arg(long, env = "WATCH_FILE_CHANGE_MAX_TIME")]
    pub max_poll_attempts: Option<u32>,

    #[arg(long, env = "SHUT_DOWN_AFTER_ERRORS")]
    pub shutdown_after_errors: Option<u32>,

    #[arg(long, env = "RESET_ERRORS_ON_SUCCESS", value_parser = BoolishValueParser::new())]
    pub reset_errors_on_success: Option<bool>,

    #[arg(long, env = "MAX_CONCURRENT_TRANSFERS")]
    pub max_concurrent_transfers: Option<usize>,

    #[arg(long, env = "SKIP_HIDDEN_FILES", value_parser = BoolishValueParser::new())]
    pub skip_hidden_files: Option<bool>,

    #[arg(long, env = "TRANSFER_PROTOCOL", value_enum)]
    pub protocol: Option<Protocol>,

    #[arg(long, env = "REMOTE_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "REMOTE_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "REMOTE_USER")]
    pub user: Option<String>,

    #[arg(long, env = "REMOTE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "SFTP_PRIV_KEY_FILE")]
    pub private_key_file: Option<String>,

    #[arg(long, env = "SFTP_PRIV_KEY_PASSWORD", hide_env_values = true)]
    pub private_key_passphrase: Option<String>,

    #[arg(long, env = "TARGET_DIR")]
    pub target_dir: Option<String>,

    #[arg(long, env = "KNOWN_HOSTS")]
    pub known_hosts: Option<String>,

    #[arg(long, env = "FTPS_VERIFY_CERT", value_parser = BoolishValueParser::new())]
    pub verify_certificate: Option<bool>,

    /// Seconds allowed for connecting and for each SSH round trip
    #[arg(long, env = "CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub log_dir: Option<String>,
    pub watch: WatchSection,
    pub remote: RemoteSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSection {
    pub dir: Option<String>,
    pub archive_dir: Option<String>,
    pub failed_dir: Option<String>,
    pub delete_after_upload: Option<bool>,
    pub poll_interval_secs: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub shutdown_after_errors: Option<u32>,
    pub reset_errors_on_success: Option<bool>,
    pub max_concurrent_transfers: Option<usize>,
    pub skip_hidden_files: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    pub protocol: Option<Protocol>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub private_key_file: Option<String>,
    pub private_key_passphrase: Option<String>,
    pub target_dir: Option<String>,
    pub known_hosts_file: Option<String>,
    pub verify_certificate: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
}

/// Everything the binary needs to start
#[derive(Debug, Clone)]
pub struct Settings {
    pub watch: WatchConfig,
    pub transfer: TransferConfig,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Merge flags, environment and config file (in that order of precedence)
    /// and validate the watch settings.
    pub fn resolve(args: CliArgs) -> Result<Self, UploaderError> {
        Self::resolve_with_env(args, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve), reading the per-protocol endpoint
    /// variables through `env`. They rank below flags and the generic
    /// `REMOTE_*` variables and above the config file.
    pub fn resolve_with_env<F>(args: CliArgs, env: F) -> Result<Self, UploaderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match args.config.as_deref() {
            Some(path) => load_config_file(&expand_path(path))?,
            None => match default_config_file() {
                Some(path) if path.is_file() => load_config_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        let FileConfig {
            log_dir,
            watch,
            remote,
        } = file;

        let watch_dir = args
            .watch_dir
            .or(watch.dir)
            .filter(|dir| !dir.trim().is_empty())
            .ok_or_else(|| UploaderError::Config("watch directory not set".to_string()))?;

        let poll_secs = args
            .poll_interval
            .or(watch.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL.as_secs());
        if poll_secs == 0 {
            return Err(UploaderError::Config(
                "stability poll interval must be at least one second".to_string(),
            ));
        }

        let watch_config = WatchConfig {
            watch_dir: expand_path(&watch_dir),
            archive_dir: non_empty(args.archive_dir.or(watch.archive_dir)).map(|d| expand_path(&d)),
            failed_dir: non_empty(args.failed_dir.or(watch.failed_dir)).map(|d| expand_path(&d)),
            poll_interval: Duration::from_secs(poll_secs),
            max_poll_attempts: args
                .max_poll_attempts
                .or(watch.max_poll_attempts)
                .unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS),
            delete_after_upload: args
                .delete_after_upload
                .or(watch.delete_after_upload)
                .unwrap_or(false),
            shutdown_after_errors: args
                .shutdown_after_errors
                .or(watch.shutdown_after_errors)
                .unwrap_or(0),
            reset_errors_on_success: args
                .reset_errors_on_success
                .or(watch.reset_errors_on_success)
                .unwrap_or(false),
            max_concurrent_transfers: args
                .max_concurrent_transfers
                .or(watch.max_concurrent_transfers)
                .unwrap_or(0),
            skip_hidden_files: args
                .skip_hidden_files
                .or(watch.skip_hidden_files)
                .unwrap_or(false),
        };
        watch_config.validate()?;

        let protocol = args.protocol.or(remote.protocol).unwrap_or_default();
        let endpoint_env = |field: &str| {
            let key = format!("{}_{}", protocol.env_prefix(), field);
            non_empty(env(&key)).map(|value| (key, value))
        };
        let env_port = match endpoint_env("PORT") {
            Some((key, raw)) => Some(raw.trim().parse::<u16>().map_err(|e| {
                UploaderError::Config(format!("invalid value {:?} for {}: {}", raw, key, e))
            })?),
            None => None,
        };

        let transfer = TransferConfig {
            protocol,
            host: non_empty(args.host)
                .or_else(|| endpoint_env("HOST").map(|(_, v)| v))
                .or_else(|| non_empty(remote.host)),
            port: args.port.or(env_port).or(remote.port),
            user: non_empty(args.user)
                .or_else(|| endpoint_env("USER").map(|(_, v)| v))
                .or_else(|| non_empty(remote.user)),
            password: non_empty(args.password)
                .or_else(|| endpoint_env("PASSWORD").map(|(_, v)| v))
                .or_else(|| non_empty(remote.password)),
            private_key_file: non_empty(args.private_key_file.or(remote.private_key_file))
                .map(|p| expand_path(&p)),
            private_key_passphrase: non_empty(
                args.private_key_passphrase.or(remote.private_key_passphrase),
            ),
            target_dir: non_empty(args.target_dir.or(remote.target_dir)),
            known_hosts_file: non_empty(args.known_hosts.or(remote.known_hosts_file))
                .map(|p| expand_path(&p)),
            verify_certificate: args
                .verify_certificate
                .or(remote.verify_certificate)
                .unwrap_or(false),
            connect_timeout: args
                .connect_timeout
                .or(remote.connect_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        };

        Ok(Self {
            watch: watch_config,
            transfer,
            log_dir: non_empty(args.log_dir.or(log_dir)).map(|d| expand_path(&d)),
        })
    }
}

pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn load_config_file(path: &Path) -> Result<FileConfig, UploaderError> {
    let content = fs::read_to_string(path)
        .context(&format!("Failed to read config file {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Expand a leading `~` the way a shell would
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).as_ref())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn directory_exists(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_dir(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(path = %path.display(), "Could not inspect directory: {}", e);
            }
            false
        }
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
