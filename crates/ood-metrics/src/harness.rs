//! Standalone polling loop
//!
//! Mirrors what a monitoring daemon does with the provider: read every
//! declared metric, print it, sleep, repeat.

use ood_metrics_lib::MetricsProvider;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tracing::debug;

pub const SEPARATOR: &str = "----------------------------";

/// Read every declared metric once and write one line per value
pub async fn print_round<W: Write>(provider: &MetricsProvider, out: &mut W) -> anyhow::Result<()> {
    for descriptor in provider.descriptors() {
        let value = provider.get(&descriptor.name).await?;
        writeln!(
            out,
            "value for {} is {}",
            descriptor.name,
            descriptor.value_type.render(value)
        )?;
    }
    writeln!(out, "{}", SEPARATOR)?;
    out.flush()?;
    Ok(())
}

/// Print rounds every `interval` until `shutdown` resolves
///
/// With `once` set a single round is printed.
pub async fn run<W, F>(
    provider: &MetricsProvider,
    out: &mut W,
    interval: Duration,
    once: bool,
    shutdown: F,
) -> anyhow::Result<()>
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        print_round(provider, out).await?;
        if once {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => {
                debug!("Polling loop stopped");
                return Ok(());
            }
        }
    }
}
