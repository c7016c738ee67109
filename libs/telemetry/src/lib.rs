//! Lightweight telemetry helpers for wabridge services.
//! Provides the shared tracing subscriber plus metric recorders used by the
//! dispatcher and the sink adapters.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

mod labels;

pub use labels::TelemetryLabels;

/// Installs the fmt subscriber configured from `RUST_LOG`.
///
/// Safe to call once per process; a second call returns an error from the
/// subscriber registry, which callers may ignore in tests.
pub fn install(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!("install tracing subscriber: {err}"))?;
    tracing::info!(service = %service_name, "telemetry installed");
    Ok(())
}

/// Increments a counter with the given labels.
pub fn record_counter(name: &'static str, value: u64, labels: &TelemetryLabels) {
    let labels: Vec<metrics::Label> = labels
        .tags()
        .into_iter()
        .map(|(key, val)| metrics::Label::new(key, val))
        .collect();
    metrics::counter!(name, labels).increment(value);
}

/// Records a histogram sample with the given labels.
pub fn record_histogram(name: &'static str, value: f64, labels: &TelemetryLabels) {
    let labels: Vec<metrics::Label> = labels
        .tags()
        .into_iter()
        .map(|(key, val)| metrics::Label::new(key, val))
        .collect();
    metrics::histogram!(name, labels).record(value);
}
