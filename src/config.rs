use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use httpscope_logs::LogFormat;
use httpscope_tail::MonitorConfig;
use httpscope_tui::{DisplayConfig, Thresholds};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_INTERVAL_SECS: u64 = 120;
const DEFAULT_REFRESH_SECS: u64 = 10;
const DEFAULT_TOP_COUNT: usize = 12;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_BACKOFF_SECS: u64 = 2;

/// httpscope - live statistics for HTTP access logs
#[derive(Parser, Debug, Default)]
#[command(name = "httpscope")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Access log files to follow
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Log format of the files
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Sliding window length in seconds [default: 120]
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Seconds between dashboard refreshes [default: 10]
    #[arg(long, value_name = "SECS")]
    pub refresh: Option<u64>,

    /// Rows in the top table, at most 15 are shown [default: 12]
    #[arg(long)]
    pub count: Option<usize>,

    /// Alert when total hits in the window reach this value
    #[arg(long)]
    pub total_hits: Option<u64>,

    /// Alert when total bytes in the window reach this value
    #[arg(long)]
    pub total_size: Option<u64>,

    /// Alert when hits for one section reach this value
    #[arg(long)]
    pub hits: Option<u64>,

    /// Alert when bytes for one section reach this value
    #[arg(long)]
    pub size: Option<u64>,

    /// Milliseconds between file checks [default: 1000]
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for a removed file to reappear [default: 2]
    #[arg(long, value_name = "SECS")]
    pub backoff: Option<u64>,

    /// Use OS file notifications instead of polling
    #[arg(long)]
    pub notify: bool,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatArg {
    Clf,
    W3c,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Clf => LogFormat::Clf,
            FormatArg::W3c => LogFormat::W3c,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Config file
// ============================================================================

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub files: Vec<PathBuf>,
    pub format: Option<FormatArg>,
    pub display: DisplaySection,
    pub alerts: AlertSection,
    pub monitor: MonitorSection,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySection {
    /// Window length in seconds
    pub interval: Option<u64>,
    /// Refresh period in seconds
    pub refresh: Option<u64>,
    pub count: Option<usize>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AlertSection {
    pub total_hits: Option<u64>,
    pub total_size: Option<u64>,
    pub hits: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSection {
    /// Milliseconds
    pub poll_interval: Option<u64>,
    /// Seconds
    pub backoff: Option<u64>,
    pub notify: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Resolved config
// ============================================================================

/// Fully resolved settings: command line over file over defaults
#[derive(Debug, Clone)]
pub struct Config {
    pub files: Vec<PathBuf>,
    pub format: LogFormat,
    pub retention: Duration,
    pub poll_interval: Duration,
    /// Native notifications instead of `poll_interval` polling
    pub notify: bool,
    pub display: DisplayConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Read the config file named by `args`, if any, and merge
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    pub fn merge(args: &Args, file: FileConfig) -> Self {
        let files = if args.files.is_empty() {
            file.files
        } else {
            args.files.clone()
        };

        let format = args
            .format
            .or(file.format)
            .map(LogFormat::from)
            .unwrap_or_default();

        let interval = args
            .interval
            .or(file.display.interval)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let refresh = args
            .refresh
            .or(file.display.refresh)
            .unwrap_or(DEFAULT_REFRESH_SECS);
        let top_count = args
            .count
            .or(file.display.count)
            .unwrap_or(DEFAULT_TOP_COUNT);
        let poll_interval = args
            .poll_interval
            .or(file.monitor.poll_interval)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let backoff = args
            .backoff
            .or(file.monitor.backoff)
            .unwrap_or(DEFAULT_BACKOFF_SECS);

        let thresholds = Thresholds {
            total_hits: args.total_hits.or(file.alerts.total_hits),
            total_size: args.total_size.or(file.alerts.total_size),
            hits: args.hits.or(file.alerts.hits),
            size: args.size.or(file.alerts.size),
        };

        let poll_interval = Duration::from_millis(poll_interval);
        Self {
            files,
            format,
            retention: Duration::from_secs(interval),
            poll_interval,
            notify: args.notify || file.monitor.notify.unwrap_or(false),
            display: DisplayConfig {
                refresh: Duration::from_secs(refresh),
                top_count,
                thresholds,
            },
            monitor: MonitorConfig {
                backoff: Duration::from_secs(backoff),
                // Never wait on events longer than one poll period
                wait_timeout: poll_interval.min(MonitorConfig::default().wait_timeout),
                ..MonitorConfig::default()
            },
        }
    }

    /// Reject settings the process cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.is_empty() {
            return Err(ConfigError::Invalid("no input files given".to_string()));
        }
        for path in &self.files {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "{} is not a regular file",
                        path.display()
                    )));
                }
                Err(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
            }
        }
        if self.retention.is_zero() {
            return Err(ConfigError::Invalid("interval must be positive".to_string()));
        }
        if self.display.refresh.is_zero() {
            return Err(ConfigError::Invalid("refresh must be positive".to_string()));
        }
        if self.display.top_count == 0 {
            return Err(ConfigError::Invalid("count must be positive".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
