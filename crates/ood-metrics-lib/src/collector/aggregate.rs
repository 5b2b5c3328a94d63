//! Owner filtering, runtime classification and max/average reduction

use crate::models::{AggregatedMetric, AppCounts, ProcessAggregate, ProcessSample, ResourceStats};
use std::collections::HashSet;

/// Command-line marker of a Passenger Rack application
pub const RACK_MARKER: &str = "rack-loader.rb";

/// Command-line marker of a Passenger Node.js application
pub const NODE_MARKER: &str = "Passenger NodeApp";

/// A resource series seeded with a single zero sample
struct Series(Vec<f64>);

impl Series {
    fn new() -> Self {
        Self(vec![0.0])
    }

    fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    fn summarize(&self) -> AggregatedMetric {
        let max = self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = self.0.iter().sum::<f64>() / self.0.len() as f64;
        AggregatedMetric { max, avg }
    }
}

/// Aggregate the samples owned by `active_owners`
pub fn aggregate(samples: &[ProcessSample], active_owners: &[String]) -> ProcessAggregate {
    let owners: HashSet<&str> = active_owners.iter().map(String::as_str).collect();

    let mut apps = AppCounts::default();
    let mut cpu_time_user = Series::new();
    let mut cpu_time_system = Series::new();
    let mut cpu_percent = Series::new();
    let mut memory_rss = Series::new();
    let mut memory_vms = Series::new();
    let mut memory_percent = Series::new();
    let mut matched = 0;

    for sample in samples {
        if !owners.contains(sample.owner.as_str()) {
            continue;
        }
        matched += 1;

        let cmd = sample.cmdline.join(" ");
        if cmd.contains(RACK_MARKER) {
            apps.rack_apps += 1;
        }
        if cmd.contains(NODE_MARKER) {
            apps.node_apps += 1;
        }

        cpu_time_user.push(sample.cpu_time_user);
        cpu_time_system.push(sample.cpu_time_system);
        cpu_percent.push(sample.cpu_percent);
        memory_rss.push(sample.memory_rss);
        memory_vms.push(sample.memory_vms);
        memory_percent.push(sample.memory_percent);
    }

    ProcessAggregate {
        apps,
        resources: ResourceStats {
            cpu_time_user: cpu_time_user.summarize(),
            cpu_time_system: cpu_time_system.summarize(),
            cpu_percent: cpu_percent.summarize(),
            memory_rss: memory_rss.summarize(),
            memory_vms: memory_vms.summarize(),
            memory_percent: memory_percent.summarize(),
        },
        matched,
    }
}
