//! Process metrics collection
//!
//! This module scans the process table, keeps the processes owned by active
//! PUN users and reduces their resource usage to max/average figures.
//! Process inspection goes through the [`ProcessSource`] trait; the default
//! implementation is backed by sysinfo, with owners resolved through NSS.

mod aggregate;
mod system;
mod users;


pub use aggregate::{aggregate, NODE_MARKER, RACK_MARKER};
pub use system::{
    parse_stat_times, read_cpu_split, to_samples, ProcessInfo, SystemProcessSource, CLOCK_TICKS_PER_SEC,
};
pub use users::{NssUserResolver, OwnerCache, UserResolver};

use crate::models::ProcessSample;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Trait for process table inspection
#[async_trait]
pub trait ProcessSource: Send + Sync {
    /// Sample every process visible to the caller
    ///
    /// Processes that exit while being read are left out of the result.
    async fn snapshot(&self) -> Result<Vec<ProcessSample>>;
}

/// Create the process source for this platform
pub fn create_process_source(proc_path: &Path) -> Arc<dyn ProcessSource> {
    tracing::info!(proc_path = %proc_path.display(), "Using sysinfo process source");
    Arc::new(SystemProcessSource::with_resolver(Arc::new(NssUserResolver), proc_path))
}
