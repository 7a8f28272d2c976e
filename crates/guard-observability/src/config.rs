//! Configuration for tracing initialization, grounded on
//! `dashflow-observability::config::TracingConfig` minus the
//! OTLP/propagator surface this crate doesn't carry.

use serde::{Deserialize, Serialize};

/// How verbosely to sample/emit spans. Mirrors `TracingConfig`'s
/// `SamplingStrategy` shape without the OTLP-specific parent-based variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum LogFormat {
    /// Human-readable, colorized (development).
    #[default]
    Pretty,
    /// Newline-delimited JSON (production/log aggregation).
    Json,
    /// Compact single-line (CI logs).
    Compact,
}

/// Configuration for [`crate::exporter::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Service name attached to every span as a field.
    pub service_name: String,
    /// `tracing_subscriber::EnvFilter` directive string, e.g.
    /// `"guard_core=debug,info"`. Falls back to `RUST_LOG` if unset.
    pub filter_directives: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Whether to include file/line in each event.
    pub with_source_location: bool,
}

impl TracingConfig {
    /// A config with sane defaults for the named service.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        TracingConfig {
            service_name: service_name.into(),
            filter_directives: None,
            format: LogFormat::Pretty,
            with_source_location: false,
        }
    }

    /// Set the filter directive string.
    #[must_use]
    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter_directives = Some(directives.into());
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig::new("llm-guard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_pretty_format() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "llm-guard");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.filter_directives.is_none());
    }

    #[test]
    fn builder_sets_filter_and_format() {
        let config = TracingConfig::new("guard-cli").with_filter("guard_core=debug").with_format(LogFormat::Json);
        assert_eq!(config.filter_directives.as_deref(), Some("guard_core=debug"));
        assert_eq!(config.format, LogFormat::Json);
    }
}
