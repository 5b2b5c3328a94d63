//! Provider wired to in-memory fakes

use async_trait::async_trait;
use ood_metrics_lib::collector::ProcessSource;
use ood_metrics_lib::owners::OwnerLister;
use ood_metrics_lib::status::{StatusPageParser, StatusSource};
use ood_metrics_lib::{HealthRegistry, MetricsError, MetricsProvider, MetricsProviderBuilder, ProcessSample, StructuredLogger};
use std::sync::Arc;

pub const FQDN: &str = "ondemand.example.edu";

struct StaticOwners(Vec<String>);

#[async_trait]
impl OwnerLister for StaticOwners {
    async fn list_active_owners(&self) -> ood_metrics_lib::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

struct StaticProcesses(Vec<ProcessSample>);

#[async_trait]
impl ProcessSource for StaticProcesses {
    async fn snapshot(&self) -> anyhow::Result<Vec<ProcessSample>> {
        Ok(self.0.clone())
    }
}

struct StaticStatus(Option<String>);

#[async_trait]
impl StatusSource for StaticStatus {
    fn url(&self) -> String {
        "http://ondemand.example.edu:80/server-status".to_string()
    }

    async fn fetch_page(&self) -> ood_metrics_lib::Result<String> {
        self.0.clone().ok_or_else(|| MetricsError::Network {
            url: self.url(),
            reason: "connection refused".to_string(),
        })
    }
}

pub const STATUS_PAGE: &str = r#"<html><body><table>
<tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>10.0.0.1</td><td>/node/host/8080</td></tr>
<tr><td>1-0</td><td>10.0.0.2</td><td>/pun/sys/dashboard</td></tr>
<tr><td>2-0</td><td>127.0.0.1</td><td>/pun/sys/files</td></tr>
</table></body></html>"#;

fn sample(pid: u32, owner: &str, cmdline: &str, rss: f64) -> ProcessSample {
    ProcessSample {
        pid,
        owner: owner.to_string(),
        cmdline: vec![cmdline.to_string()],
        cpu_time_user: 2.0,
        cpu_time_system: 1.0,
        cpu_percent: 4.5,
        memory_rss: rss,
        memory_vms: rss * 4.0,
        memory_percent: 0.5,
    }
}

pub async fn provider(status_page: Option<&str>) -> (Arc<MetricsProvider>, HealthRegistry) {
    let health = HealthRegistry::with_refresh_components().await;
    let logger = StructuredLogger::new(FQDN);
    let provider = MetricsProviderBuilder::new()
        .owner_lister(Arc::new(StaticOwners(vec!["alice".to_string(), "bob".to_string()])))
        .process_source(Arc::new(StaticProcesses(vec![
            sample(100, "alice", "Passenger RackApp: /home/alice/rack-loader.rb", 1024.0),
            sample(200, "bob", "Passenger NodeApp: /home/bob/app", 3072.0),
            sample(300, "mallory", "Passenger NodeApp: /home/mallory/app", 99999.0),
        ])))
        .status_parser(StatusPageParser::new(
            Box::new(StaticStatus(status_page.map(str::to_string))),
            logger.clone(),
        ))
        .logger(logger)
        .health(health.clone())
        .min_poll_seconds(3600)
        .build()
        .expect("provider");
    (Arc::new(provider), health)
}
