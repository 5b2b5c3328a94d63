//! Core data models for the metrics provider

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MetricsError;

/// Prefix the host uses for every metric name
pub const METRIC_PREFIX: &str = "ood_";

/// Every metric the provider publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ActivePuns,
    RackApps,
    NodeApps,
    MaxPunCpuTimeUser,
    AvgPunCpuTimeUser,
    MaxPunCpuTimeSystem,
    AvgPunCpuTimeSystem,
    MaxPunCpuPercent,
    AvgPunCpuPercent,
    MaxPunMemoryRss,
    AvgPunMemoryRss,
    MaxPunMemoryVms,
    AvgPunMemoryVms,
    MaxPunMemoryPercent,
    AvgPunMemoryPercent,
    WebsocketConnections,
    UniqueWebsocketClients,
    ClientConnections,
    UniqueClientConnections,
}

/// Value type advertised to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Uint,
    Float,
}

impl ValueType {
    /// printf-style format the host renders values with
    pub fn format(&self) -> &'static str {
        match self {
            ValueType::Uint => "%d",
            ValueType::Float => "%f",
        }
    }

    /// Render a value the way `format()` would
    pub fn render(&self, value: f64) -> String {
        match self {
            ValueType::Uint => format!("{}", value.max(0.0).round() as u64),
            ValueType::Float => format!("{:.6}", value),
        }
    }
}

/// Registration record for one metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricDescriptor {
    pub name: String,
    pub metric: Metric,
    pub value_type: ValueType,
    pub format: &'static str,
    pub description: &'static str,
    pub units: &'static str,
    pub slope: &'static str,
    pub time_max: u32,
    pub groups: &'static str,
}

impl Metric {
    pub const COUNT: usize = 19;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::ActivePuns,
        Metric::RackApps,
        Metric::NodeApps,
        Metric::MaxPunCpuTimeUser,
        Metric::AvgPunCpuTimeUser,
        Metric::MaxPunCpuTimeSystem,
        Metric::AvgPunCpuTimeSystem,
        Metric::MaxPunCpuPercent,
        Metric::AvgPunCpuPercent,
        Metric::MaxPunMemoryRss,
        Metric::AvgPunMemoryRss,
        Metric::MaxPunMemoryVms,
        Metric::AvgPunMemoryVms,
        Metric::MaxPunMemoryPercent,
        Metric::AvgPunMemoryPercent,
        Metric::WebsocketConnections,
        Metric::UniqueWebsocketClients,
        Metric::ClientConnections,
        Metric::UniqueClientConnections,
    ];

    /// The four metrics derived from the status page
    pub const CONNECTIONS: [Metric; 4] = [
        Metric::WebsocketConnections,
        Metric::UniqueWebsocketClients,
        Metric::ClientConnections,
        Metric::UniqueClientConnections,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Bare metric name, without the host prefix
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::ActivePuns => "active_puns",
            Metric::RackApps => "rack_apps",
            Metric::NodeApps => "node_apps",
            Metric::MaxPunCpuTimeUser => "max_pun_cpu_time_user",
            Metric::AvgPunCpuTimeUser => "avg_pun_cpu_time_user",
            Metric::MaxPunCpuTimeSystem => "max_pun_cpu_time_system",
            Metric::AvgPunCpuTimeSystem => "avg_pun_cpu_time_system",
            Metric::MaxPunCpuPercent => "max_pun_cpu_percent",
            Metric::AvgPunCpuPercent => "avg_pun_cpu_percent",
            Metric::MaxPunMemoryRss => "max_pun_memory_rss",
            Metric::AvgPunMemoryRss => "avg_pun_memory_rss",
            Metric::MaxPunMemoryVms => "max_pun_memory_vms",
            Metric::AvgPunMemoryVms => "avg_pun_memory_vms",
            Metric::MaxPunMemoryPercent => "max_pun_memory_percent",
            Metric::AvgPunMemoryPercent => "avg_pun_memory_percent",
            Metric::WebsocketConnections => "websocket_connections",
            Metric::UniqueWebsocketClients => "unique_websocket_clients",
            Metric::ClientConnections => "client_connections",
            Metric::UniqueClientConnections => "unique_client_connections",
        }
    }

    /// Full name as registered with the host
    pub fn prefixed_name(self) -> String {
        format!("{}{}", METRIC_PREFIX, self.as_str())
    }

    /// Resolve a host-supplied name, with or without the prefix
    pub fn from_name(name: &str) -> Result<Self, MetricsError> {
        let bare = name.strip_prefix(METRIC_PREFIX).unwrap_or(name);
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == bare)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Metric::ActivePuns
            | Metric::RackApps
            | Metric::NodeApps
            | Metric::WebsocketConnections
            | Metric::UniqueWebsocketClients
            | Metric::ClientConnections
            | Metric::UniqueClientConnections => ValueType::Uint,
            _ => ValueType::Float,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Metric::ActivePuns => "Active PUNs",
            Metric::RackApps => "Number of Rack Apps",
            Metric::NodeApps => "Number of NodeJS Apps",
            Metric::MaxPunCpuTimeUser => "Max user CPU time of a PUN",
            Metric::AvgPunCpuTimeUser => "Average user CPU time of a PUN",
            Metric::MaxPunCpuTimeSystem => "Max system CPU time of a PUN",
            Metric::AvgPunCpuTimeSystem => "Average system CPU time of a PUN",
            Metric::MaxPunCpuPercent => "Max CPU percent used by a PUN",
            Metric::AvgPunCpuPercent => "Average CPU percent used by a PUN",
            Metric::MaxPunMemoryRss => "Max Memory RSS used by PUN",
            Metric::AvgPunMemoryRss => "Average Memory RSS used by PUN",
            Metric::MaxPunMemoryVms => "Max Virtual Memory used by PUN",
            Metric::AvgPunMemoryVms => "Average Virtual Memory used by PUN",
            Metric::MaxPunMemoryPercent => "Max Memory percent used by PUN",
            Metric::AvgPunMemoryPercent => "Average Memory percent used by PUN",
            Metric::WebsocketConnections => "Number of Websocket Connections",
            Metric::UniqueWebsocketClients => "Number of unique Websocket Clients",
            Metric::ClientConnections => "Number of client connections",
            Metric::UniqueClientConnections => "Number of unique client connections",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            Metric::ActivePuns => "puns",
            Metric::RackApps | Metric::NodeApps => "apps",
            Metric::MaxPunCpuTimeUser
            | Metric::AvgPunCpuTimeUser
            | Metric::MaxPunCpuTimeSystem
            | Metric::AvgPunCpuTimeSystem => "seconds",
            Metric::MaxPunCpuPercent
            | Metric::AvgPunCpuPercent
            | Metric::MaxPunMemoryPercent
            | Metric::AvgPunMemoryPercent => "percent",
            Metric::MaxPunMemoryRss
            | Metric::AvgPunMemoryRss
            | Metric::MaxPunMemoryVms
            | Metric::AvgPunMemoryVms => "bytes",
            Metric::UniqueWebsocketClients => "clients",
            Metric::WebsocketConnections
            | Metric::ClientConnections
            | Metric::UniqueClientConnections => "connections",
        }
    }

    pub fn descriptor(self) -> MetricDescriptor {
        let value_type = self.value_type();
        MetricDescriptor {
            name: self.prefixed_name(),
            metric: self,
            value_type,
            format: value_type.format(),
            description: self.description(),
            units: self.units(),
            slope: "both",
            time_max: 60,
            groups: "OOD",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::from_name(s)
    }
}

/// Descriptors for every published metric, in registration order
pub fn descriptors() -> Vec<MetricDescriptor> {
    Metric::ALL.iter().map(|m| m.descriptor()).collect()
}

/// Current value of every metric
///
/// Replaced wholesale by each refresh; readers always see values from a
/// single cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSnapshot {
    values: [f64; Metric::COUNT],
}

impl Default for MetricSnapshot {
    fn default() -> Self {
        Self {
            values: [0.0; Metric::COUNT],
        }
    }
}

impl MetricSnapshot {
    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values[metric.index()] = value;
    }

    /// Copy the status-page metrics over from another snapshot
    pub fn carry_connections_from(&mut self, previous: &MetricSnapshot) {
        for metric in Metric::CONNECTIONS {
            self.set(metric, previous.get(metric));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.iter().map(move |m| (*m, self.get(*m)))
    }

    /// Name/value map keyed by bare metric names
    pub fn to_map(&self) -> HashMap<&'static str, f64> {
        self.iter().map(|(m, v)| (m.as_str(), v)).collect()
    }
}

/// One process observed during a scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub owner: String,
    pub cmdline: Vec<String>,
    pub cpu_time_user: f64,
    pub cpu_time_system: f64,
    pub cpu_percent: f64,
    pub memory_rss: f64,
    pub memory_vms: f64,
    pub memory_percent: f64,
}

/// One row of the status page connection table, keyed by column header
pub type ConnectionRecord = HashMap<String, String>;

/// Application runtime counts among active PUN processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppCounts {
    pub rack_apps: u64,
    pub node_apps: u64,
}

/// Max and average of one resource series
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregatedMetric {
    pub max: f64,
    pub avg: f64,
}

/// Aggregated resource usage across active PUN processes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceStats {
    pub cpu_time_user: AggregatedMetric,
    pub cpu_time_system: AggregatedMetric,
    pub cpu_percent: AggregatedMetric,
    pub memory_rss: AggregatedMetric,
    pub memory_vms: AggregatedMetric,
    pub memory_percent: AggregatedMetric,
}

/// Result of one aggregation pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessAggregate {
    pub apps: AppCounts,
    pub resources: ResourceStats,
    /// Processes that passed the owner filter
    pub matched: usize,
}

/// Connection counters derived from the status page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub websocket_connections: u64,
    pub unique_websocket_clients: u64,
    pub client_connections: u64,
    pub unique_client_connections: u64,
}

impl MetricSnapshot {
    pub fn apply_aggregate(&mut self, aggregate: &ProcessAggregate) {
        self.set(Metric::RackApps, aggregate.apps.rack_apps as f64);
        self.set(Metric::NodeApps, aggregate.apps.node_apps as f64);

        let r = &aggregate.resources;
        let pairs = [
            (Metric::MaxPunCpuTimeUser, Metric::AvgPunCpuTimeUser, r.cpu_time_user),
            (Metric::MaxPunCpuTimeSystem, Metric::AvgPunCpuTimeSystem, r.cpu_time_system),
            (Metric::MaxPunCpuPercent, Metric::AvgPunCpuPercent, r.cpu_percent),
            (Metric::MaxPunMemoryRss, Metric::AvgPunMemoryRss, r.memory_rss),
            (Metric::MaxPunMemoryVms, Metric::AvgPunMemoryVms, r.memory_vms),
            (Metric::MaxPunMemoryPercent, Metric::AvgPunMemoryPercent, r.memory_percent),
        ];
        for (max, avg, stat) in pairs {
            self.set(max, stat.max);
            self.set(avg, stat.avg);
        }
    }

    pub fn apply_connections(&mut self, counts: &ConnectionCounts) {
        self.set(Metric::WebsocketConnections, counts.websocket_connections as f64);
        self.set(Metric::UniqueWebsocketClients, counts.unique_websocket_clients as f64);
        self.set(Metric::ClientConnections, counts.client_connections as f64);
        self.set(Metric::UniqueClientConnections, counts.unique_client_connections as f64);
    }
}
