//! Error types for guard observability.

use thiserror::Error;

/// Error type for observability operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Tracing subscriber initialization failed.
    #[error("failed to initialize tracing: {0}")]
    InitializationError(String),

    /// Invalid tracing/metrics configuration.
    #[error("invalid observability configuration: {0}")]
    ConfigurationError(String),

    /// A metrics registration or export operation failed.
    #[error("metrics operation failed: {0}")]
    Metrics(String),

    /// Generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for observability operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialization_error_display() {
        let err = Error::InitializationError("subscriber already set".to_string());
        assert_eq!(err.to_string(), "failed to initialize tracing: subscriber already set");
    }

    #[test]
    fn metrics_error_display() {
        let err = Error::Metrics("duplicate metric name".to_string());
        assert_eq!(err.to_string(), "metrics operation failed: duplicate metric name");
    }

    #[test]
    fn other_error_from_anyhow() {
        let err = Error::from(anyhow::anyhow!("generic failure"));
        assert!(matches!(err, Error::Other(_)));
    }
}
