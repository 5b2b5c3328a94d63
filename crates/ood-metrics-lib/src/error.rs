//! Error types for the metrics provider

use thiserror::Error;

/// Failures raised while refreshing or querying metrics
///
/// Only `UnknownMetric` escapes [`crate::provider::MetricsProvider::get`];
/// the other variants are soft failures recovered inside a refresh cycle.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The owner listing command exited non-zero, could not be spawned or timed out
    #[error("command `{command}` failed ({reason})")]
    ExternalCommand { command: String, reason: String },

    /// The status page could not be retrieved
    #[error("failed to fetch {url}: {reason}")]
    Network { url: String, reason: String },

    /// The fetched page had no connection table
    #[error("no connection table found at {url}")]
    TableNotFound { url: String },

    /// Query for a metric name outside the registered set
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
