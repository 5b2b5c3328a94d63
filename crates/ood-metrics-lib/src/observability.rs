//! Observability infrastructure for the metrics provider
//!
//! Provides:
//! - Prometheus metrics (refresh latency, failure counters, one gauge per published metric)
//! - Structured event logging with tracing, injected into each component

use crate::models::{Metric, MetricSnapshot};
use prometheus::{register_gauge, register_histogram, register_int_counter, Gauge, Histogram, IntCounter, Opts};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default histogram buckets for refresh latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ProviderMetricsInner> = OnceLock::new();

struct ProviderMetricsInner {
    refresh_latency_seconds: Histogram,
    refreshes: IntCounter,
    owner_listing_failures: IntCounter,
    status_page_failures: IntCounter,
    values: Vec<Gauge>,
}

impl ProviderMetricsInner {
    fn new() -> Self {
        Self {
            refresh_latency_seconds: register_histogram!(
                "ood_metrics_refresh_latency_seconds",
                "Time spent running a full refresh cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register refresh_latency_seconds"),

            refreshes: register_int_counter!(
                "ood_metrics_refreshes_total",
                "Total number of completed refresh cycles"
            )
            .expect("Failed to register refreshes_total"),

            owner_listing_failures: register_int_counter!(
                "ood_metrics_owner_listing_failures_total",
                "Total number of failed active PUN listings"
            )
            .expect("Failed to register owner_listing_failures_total"),

            status_page_failures: register_int_counter!(
                "ood_metrics_status_page_failures_total",
                "Total number of status page fetch or parse failures"
            )
            .expect("Failed to register status_page_failures_total"),

            values: Metric::ALL
                .iter()
                .map(|m| {
                    register_gauge!(Opts::new(m.prefixed_name(), m.description()))
                        .expect("Failed to register metric gauge")
                })
                .collect(),
        }
    }
}

/// Provider metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct ProviderMetrics {
    _private: (),
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProviderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProviderMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a finished refresh cycle
    pub fn observe_refresh(&self, elapsed: Duration) {
        self.inner().refresh_latency_seconds.observe(elapsed.as_secs_f64());
        self.inner().refreshes.inc();
    }

    pub fn inc_owner_listing_failures(&self) {
        self.inner().owner_listing_failures.inc();
    }

    pub fn inc_status_page_failures(&self) {
        self.inner().status_page_failures.inc();
    }

    /// Mirror a snapshot into the per-metric gauges
    pub fn publish(&self, snapshot: &MetricSnapshot) {
        for (metric, value) in snapshot.iter() {
            self.inner().values[metric.index()].set(value);
        }
    }

    pub fn refresh_count(&self) -> u64 {
        self.inner().refreshes.get()
    }
}

/// Structured logger for provider events
///
/// Handed to each component at construction so every record carries the
/// host it was produced on.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn log_startup(&self, version: &str, min_poll_seconds: u64) {
        info!(
            event = "provider_started",
            host = %self.host,
            version = %version,
            min_poll_seconds = min_poll_seconds,
            "Metrics provider started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "provider_shutdown",
            host = %self.host,
            reason = %reason,
            "Metrics provider shutting down"
        );
    }

    pub fn log_command(&self, command: &str) {
        debug!(event = "command_exec", host = %self.host, command = %command, "Executing");
    }

    /// Log a failed owner listing with everything it produced
    pub fn log_command_failure(&self, command: &str, exit_code: Option<i32>, stdout: &str, stderr: &str) {
        error!(
            event = "owner_listing_failed",
            host = %self.host,
            command = %command,
            exit_code = ?exit_code,
            stdout = %stdout,
            stderr = %stderr,
            "Active PUN listing failed"
        );
    }

    pub fn log_table_missing(&self, url: &str) {
        warn!(
            event = "status_table_missing",
            host = %self.host,
            url = %url,
            "Unable to find connections table"
        );
    }

    pub fn log_status_fetch_failed(&self, url: &str, reason: &str) {
        warn!(
            event = "status_fetch_failed",
            host = %self.host,
            url = %url,
            reason = %reason,
            "Status page unavailable, keeping previous connection metrics"
        );
    }

    pub fn log_refresh(&self, elapsed: Duration, active_puns: usize, matched_processes: usize, connections_updated: bool) {
        info!(
            event = "refresh_completed",
            host = %self.host,
            elapsed_ms = elapsed.as_millis() as u64,
            active_puns = active_puns,
            matched_processes = matched_processes,
            connections_updated = connections_updated,
            "Refreshed metrics"
        );
    }
}
