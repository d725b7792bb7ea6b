//! Runtime bootstrap errors.

use phasebus_config::ConfigError;
use phasebus_pipeline::PipelineError;
use phasebus_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while building a [`Runtime`](crate::Runtime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The configured phases do not form a valid pipeline.
    #[error("invalid pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    /// Logging could not be installed.
    #[error("telemetry setup failed: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The worker runtime could not be started.
    #[error("failed to start worker runtime: {0}")]
    Executor(#[source] std::io::Error),
}

/// Result alias for runtime bootstrap.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
