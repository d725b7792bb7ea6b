//! Typed configuration for phasebus.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides (`PREFIX__SECTION__KEY`)
//! - Strict parsing: unknown sections and keys are errors
//! - Layering: defaults or preset, then file, then environment
//!
//! # Configuration File Format
//!
//! ```toml
//! [phases]
//! inbound = ["receive", "unmarshal", "pre-logical", "invoke", "post-invoke"]
//! outbound = ["setup", "marshal", "write", "send"]
//!
//! [executor]
//! mode = "tokio"
//! worker_threads = 4
//!
//! [chain]
//! cache_resolved = true
//!
//! [faults]
//! expose_details = false
//! redacted_message = "An internal error occurred"
//!
//! [client]
//! timeout_ms = 30000
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! payload_limit = 1024
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `PHASEBUS__EXECUTOR__MODE=tokio`
//! - `PHASEBUS__PHASES__OUTBOUND=marshal,write,send`
//! - `PHASEBUS__LOGGING__LEVEL=phasebus_pipeline=trace`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{PhasebusConfig, PhasebusConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    ChainConfig, ClientConfig, ExecutorConfig, ExecutorMode, FaultsConfig, LogFormat,
    LoggingConfig, PhasesConfig,
};
