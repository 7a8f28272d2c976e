//! Tracing and metrics instrumentation for the guard runtime.
//!
//! Grounded on `dashflow-observability`'s structure (`config`/`error`/
//! `exporter`/`metrics` modules), narrowed to what a guard deployment
//! needs: local structured logging and a Prometheus registry of guard
//! counters. The OpenTelemetry OTLP export pipeline and multi-provider
//! cost-tracking module of the larger reference system are not carried
//! here — see DESIGN.md.

pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;

pub use config::{LogFormat, TracingConfig};
pub use error::{Error, Result};
pub use exporter::init_tracing;
pub use metrics::MetricsRegistry;
