//! Command-line options for the standalone harness

use clap::{Parser, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

/// OnDemand metrics provider harness
#[derive(Parser, Debug)]
#[command(name = "ood-metrics")]
#[command(author, version, about = "Prints OnDemand portal metrics at a fixed interval", long_about = None)]
pub struct Cli {
    /// Log to stdout and/or syslog
    #[arg(long, value_enum, default_value = "stdout")]
    pub log: LogTarget,

    /// Minimum level of log records to emit
    #[arg(long = "log-level", value_enum, default_value = "WARNING")]
    pub log_level: LogLevel,

    /// Facility to use when logging to syslog
    #[arg(long = "log-facility", default_value = "user")]
    pub log_facility: String,

    /// Emit stdout logs as JSON
    #[arg(long)]
    pub json: bool,

    /// Override the minimum seconds between refreshes
    #[arg(long, env = "OOD_METRICS_MIN_POLL_SECONDS")]
    pub min_poll_seconds: Option<u64>,

    /// Also serve /metrics, /healthz and /readyz on this port
    #[arg(long)]
    pub serve: Option<u16>,

    /// Print a single round of values and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Stdout,
    Syslog,
    Both,
}

impl LogTarget {
    pub fn stdout(self) -> bool {
        matches!(self, LogTarget::Stdout | LogTarget::Both)
    }

    pub fn syslog(self) -> bool {
        matches!(self, LogTarget::Syslog | LogTarget::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    #[value(name = "CRITICAL")]
    Critical,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "INFO")]
    Info,
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "NOTSET")]
    NotSet,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            // tracing has no level above ERROR
            LogLevel::Critical | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::NotSet => LevelFilter::TRACE,
        }
    }
}
