//! Observability for phasebus.
//!
//! - **Logging**: `tracing-subscriber` setup with JSON or pretty output
//! - **Metrics**: chain run, fault and resolution metrics via the `metrics`
//!   facade
//!
//! Exporters are left to the embedding application: install any `metrics`
//! recorder before calling [`metrics::describe_metrics`].

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
