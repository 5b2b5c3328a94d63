//! Metrics provider for Open OnDemand portal hosts
//!
//! This crate provides:
//! - Throttled refresh scheduling
//! - Active PUN owner discovery via nginx_stage
//! - Per-process resource aggregation over active PUNs
//! - Apache status page parsing and connection classification
//! - Health checks and observability

pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod models;
pub mod observability;
pub mod owners;
pub mod provider;
pub mod status;

pub use error::{MetricsError, Result};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{ProviderMetrics, StructuredLogger};
pub use provider::{MetricsProvider, MetricsProviderBuilder};
