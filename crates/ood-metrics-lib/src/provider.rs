//! The pollable metrics provider
//!
//! Queries go through a [`PollGate`]; when it is open a refresh cycle runs
//! owner listing, process aggregation, status page parsing and connection
//! classification in order, then replaces the snapshot in one step. Gate
//! check, refresh and snapshot replacement happen under a single lock, so
//! concurrent callers never see a half-built snapshot.

use crate::classifier::{classify, SelfIdentity};
use crate::collector::{aggregate, create_process_source, ProcessSource};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::gate::PollGate;
use crate::health::{components, HealthRegistry};
use crate::models::{descriptors, Metric, MetricDescriptor, MetricSnapshot};
use crate::observability::{ProviderMetrics, StructuredLogger};
use crate::owners::{CommandOwnerLister, OwnerLister};
use crate::status::{HttpStatusSource, StatusPageParser, StatusSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct ProviderState {
    gate: PollGate,
    snapshot: MetricSnapshot,
}

/// Pollable provider of the portal metrics
pub struct MetricsProvider {
    owners: Arc<dyn OwnerLister>,
    processes: Arc<dyn ProcessSource>,
    status: StatusPageParser,
    identity: SelfIdentity,
    logger: StructuredLogger,
    metrics: ProviderMetrics,
    health: HealthRegistry,
    state: Mutex<ProviderState>,
}

impl MetricsProvider {
    /// Wire up the production collaborators from configuration
    pub fn from_config(config: &ProviderConfig, logger: StructuredLogger, health: HealthRegistry) -> anyhow::Result<Self> {
        let owners = CommandOwnerLister::new(
            config.nginx_stage_command.clone(),
            Duration::from_secs(config.command_timeout_secs),
            logger.clone(),
        );
        let source = HttpStatusSource::from_portal_config(
            &config.portal_config_path,
            &config.self_fqdn,
            Duration::from_secs(config.http_timeout_secs),
        )?;
        debug!(url = %source.url(), "Status page source configured");

        MetricsProviderBuilder::new()
            .owner_lister(Arc::new(owners))
            .process_source(create_process_source(&config.proc_path))
            .status_parser(StatusPageParser::new(Box::new(source), logger.clone()))
            .self_identity(SelfIdentity::new(config.self_fqdn.clone()))
            .min_poll_seconds(config.min_poll_seconds)
            .logger(logger)
            .health(health)
            .build()
    }

    /// Descriptors for every metric this provider answers
    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        descriptors()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Value of a metric by host name (`ood_` prefix optional)
    ///
    /// Unknown names are rejected before the gate is consulted.
    pub async fn get(&self, name: &str) -> Result<f64> {
        let metric = Metric::from_name(name)?;
        Ok(self.get_metric(metric).await)
    }

    /// Value of a metric, refreshing first if the gate is open
    pub async fn get_metric(&self, metric: Metric) -> f64 {
        let mut state = self.state.lock().await;
        if state.gate.should_refresh(Instant::now()) {
            self.refresh_locked(&mut state).await;
        }
        state.snapshot.get(metric)
    }

    /// Refresh if due; returns whether a cycle ran
    pub async fn refresh_if_due(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.gate.should_refresh(Instant::now()) {
            return false;
        }
        self.refresh_locked(&mut state).await;
        true
    }

    /// Run a refresh cycle regardless of the gate
    pub async fn refresh(&self) -> MetricSnapshot {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await;
        state.snapshot
    }

    /// Current snapshot without refreshing
    pub async fn snapshot(&self) -> MetricSnapshot {
        self.state.lock().await.snapshot
    }

    async fn refresh_locked(&self, state: &mut ProviderState) {
        debug!("Refreshing metrics");
        let started = Instant::now();
        let mut next = MetricSnapshot::default();

        let owners = self.owners.list_active_owners().await;
        self.health.record(components::OWNER_LISTER, &owners).await;
        let owners = owners.unwrap_or_else(|e| {
            self.metrics.inc_owner_listing_failures();
            warn!(error = %e, "Treating active PUN list as empty");
            Vec::new()
        });
        next.set(Metric::ActivePuns, owners.len() as f64);

        let samples = self.processes.snapshot().await;
        self.health.record(components::PROCESS_COLLECTOR, &samples).await;
        let samples = samples.unwrap_or_else(|e| {
            warn!(error = %e, "Process scan failed");
            Vec::new()
        });
        let aggregate = aggregate(&samples, &owners);
        next.apply_aggregate(&aggregate);

        let records = self.status.fetch_and_parse().await;
        self.health.record(components::STATUS_PAGE, &records).await;
        let connections_updated = match records {
            Ok(records) => {
                next.apply_connections(&classify(&records, &self.identity));
                true
            }
            Err(_) => {
                self.metrics.inc_status_page_failures();
                next.carry_connections_from(&state.snapshot);
                false
            }
        };

        state.snapshot = next;
        state.gate.record_refresh(Instant::now());

        let elapsed = started.elapsed();
        self.metrics.publish(&state.snapshot);
        self.metrics.observe_refresh(elapsed);
        self.health.set_ready(true).await;
        self.logger
            .log_refresh(elapsed, owners.len(), aggregate.matched, connections_updated);
    }
}

/// Builder for assembling a provider from its collaborators
pub struct MetricsProviderBuilder {
    owners: Option<Arc<dyn OwnerLister>>,
    processes: Option<Arc<dyn ProcessSource>>,
    status: Option<StatusPageParser>,
    identity: Option<SelfIdentity>,
    min_poll_seconds: u64,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl MetricsProviderBuilder {
    pub fn new() -> Self {
        Self {
            owners: None,
            processes: None,
            status: None,
            identity: None,
            min_poll_seconds: 30,
            logger: None,
            health: None,
        }
    }

    pub fn owner_lister(mut self, owners: Arc<dyn OwnerLister>) -> Self {
        self.owners = Some(owners);
        self
    }

    pub fn process_source(mut self, processes: Arc<dyn ProcessSource>) -> Self {
        self.processes = Some(processes);
        self
    }

    pub fn status_parser(mut self, status: StatusPageParser) -> Self {
        self.status = Some(status);
        self
    }

    pub fn self_identity(mut self, identity: SelfIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn min_poll_seconds(mut self, secs: u64) -> Self {
        self.min_poll_seconds = secs;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> anyhow::Result<MetricsProvider> {
        let owners = self
            .owners
            .ok_or_else(|| anyhow::anyhow!("Owner lister is required"))?;
        let processes = self
            .processes
            .ok_or_else(|| anyhow::anyhow!("Process source is required"))?;
        let status = self
            .status
            .ok_or_else(|| anyhow::anyhow!("Status page parser is required"))?;
        if self.min_poll_seconds == 0 {
            anyhow::bail!("Minimum poll interval must be positive");
        }
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new(crate::config::default_fqdn()));
        let identity = self
            .identity
            .unwrap_or_else(|| SelfIdentity::new(logger.host().to_string()));

        Ok(MetricsProvider {
            owners,
            processes,
            status,
            identity,
            logger,
            metrics: ProviderMetrics::new(),
            health: self.health.unwrap_or_default(),
            state: Mutex::new(ProviderState {
                gate: PollGate::new(self.min_poll_seconds),
                snapshot: MetricSnapshot::default(),
            }),
        })
    }
}

impl Default for MetricsProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
