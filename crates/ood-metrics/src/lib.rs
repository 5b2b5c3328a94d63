//! Harness and HTTP exporter for the OnDemand metrics provider

pub mod api;
pub mod cli;
pub mod harness;
pub mod logging;
